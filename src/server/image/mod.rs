pub mod managed;
pub mod models;
pub mod reference;

pub use managed::is_image_managed;
pub use models::{Image, StreamMapping, TrackedStream};
pub use reference::{Digest, ImageReference, ReferenceError};
