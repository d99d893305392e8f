//! Error types for nestgen.

use std::alloc::{Layout, LayoutError};
use thiserror::Error;

/// Frame allocation errors
///
/// Raised while obtaining backing storage for a generator's activation record.
/// Failures reported by a [`FrameAllocator`](crate::alloc::FrameAllocator) pass
/// through unchanged as `Exhausted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("Frame allocation failed: {size} bytes, align {align}", size = .layout.size(), align = .layout.align())]
    Exhausted { layout: Layout },

    #[error("Frame layout overflow: {0}")]
    Layout(#[from] LayoutError),
}

impl AllocError {
    /// Exhaustion error for a block of the given layout
    pub fn exhausted(layout: Layout) -> Self {
        AllocError::Exhausted { layout }
    }
}

/// Errors raised while loading settings or installing the log subscriber
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting '{key}': {message}")]
    InvalidSetting { key: String, message: String },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}
