//! Document references and resolution results
//!
//! `DocumentRef` is what the listing service hands the UI. Everything else
//! here is produced by the resolver: validated local files, placeholders and
//! encoded thumbnails.

mod listing;
mod types;

pub use listing::{ListingService, StaticListing};
pub use types::{
    Artifact, DocumentRef, LocalDocument, PlaceholderRecord, Resolution, ResolutionSource,
    Thumbnail, ThumbnailResolution, ValidatedDocument,
};
