pub mod error;
pub mod models;
pub mod portals;
pub mod services;

pub use error::{FestError, Result};
