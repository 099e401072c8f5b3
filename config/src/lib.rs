//! Layered configuration for the audience syncer.
//!
//! Configuration is read from `configuration/base.yaml`, then from the file named after the
//! current [`Environment`], then from `APP_`-prefixed environment variables.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
