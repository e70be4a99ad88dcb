//! Credential commands that work without starting the core.

mod logout;
mod status;

pub use logout::logout;
pub use status::status;
