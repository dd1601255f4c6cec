pub mod error;

pub use error::{MeterdError, Result};
