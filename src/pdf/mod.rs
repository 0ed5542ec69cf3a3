//! PDF handling via MuPDF
//!
//! Validation (is this an openable, paged document?), first-page thumbnail
//! rendering, and the placeholder artwork used when neither is possible.

mod placeholder;
mod renderer;
mod validator;

pub use placeholder::{placeholder_record, placeholder_thumbnail};
pub use renderer::{flatten_onto_white, CanvasSpec, ThumbnailRenderer};
pub use validator::DocumentValidator;
