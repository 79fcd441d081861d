//! # FaceUp Common Library
//!
//! Shared code for the FaceUp backend services including:
//! - Common error type
//! - Configuration resolution (CLI → ENV → TOML → defaults)
//! - Event types and the in-process event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
