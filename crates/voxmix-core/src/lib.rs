//! # voxmix-core
//!
//! Core types, configuration, and error handling shared by the voxmix
//! mixing engine and its front ends.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
