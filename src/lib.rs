pub mod app;
pub mod assume_role;
pub mod device_auth;
pub mod error;
pub mod function;
pub mod paginate;
pub mod profile;
pub mod prompt;
pub mod run;
pub mod select;
pub mod session;

pub use error::{Error, ProviderError, Result};
