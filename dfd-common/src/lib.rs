//! # DFD Common Library
//!
//! Shared code for the DFD analysis services:
//! - Event types (DfdEvent enum) and the EventBus
//! - Analysis value types carried by events and API responses
//! - Bootstrap configuration loading and root folder resolution
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
