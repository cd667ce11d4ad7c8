// promptgen-types: Layer 1. Error taxonomy, call context, backend and hook contracts.
#![allow(clippy::result_large_err)]

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod hook;

pub use backend::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use hook::*;
