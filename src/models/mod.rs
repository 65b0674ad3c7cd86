//! Data models for the photoshare backend.

mod photo;
mod user;

pub use photo::*;
pub use user::*;
