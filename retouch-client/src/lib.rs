pub mod api;
pub mod dictation;

pub use api::{ImageUpload, RetouchClient};
pub use dictation::take_dictation;
