use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the conversion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The glyph palette has no characters.
    #[error("glyph palette must contain at least one character")]
    InvalidPalette,

    /// A render parameter is out of its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A resize target or image size collapsed to zero.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Width value.
        width: u32,
        /// Height value.
        height: u32,
    },

    /// The source video could not be opened or read.
    #[error("source video {path} unavailable: {reason}")]
    SourceUnavailable {
        /// Path of the source video.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// Nothing to rasterize or assemble.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Writing the output video failed.
    #[error("failed to write {path}: {reason}")]
    EncodeWrite {
        /// Path of the output file.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// A custom font could not be read or parsed.
    #[error("failed to load font {path}: {reason}")]
    FontLoad {
        /// Path of the font file.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// A configuration file is unreadable or invalid.
    #[error("invalid config {path}: {reason}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },
}

impl Error {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::EncodeWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
