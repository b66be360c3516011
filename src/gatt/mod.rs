//! GATT data model
//!
//! This module provides the types the explorer works with:
//! - Advertisement snapshots and peripheral addresses
//! - The discovered profile tree (services, characteristics, descriptors)
//! - Fixed UUIDs, well-known names and report formatting

pub mod constants;
pub mod format;
pub mod names;
pub mod types;

// Re-export commonly used items
pub use btleplug::api::CharPropFlags;
pub use constants::*;
pub use types::*;
