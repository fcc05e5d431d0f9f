pub mod credentials;
pub mod deploy;
