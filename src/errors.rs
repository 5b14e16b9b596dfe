//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`VolumetraError`] covers all failure modes including:
//! - Voxel and segment addressing errors
//! - Invalid partitioning or renderer configuration
//! - Shader compilation failures
//! - Video resource acquisition failures (e.g. out of video memory)
//! - Framebuffer / viewport setup failures
//!
//! # Propagation
//!
//! Setup-time errors (grid partitioning, shader compilation) are returned to
//! the caller. Per-frame errors raised by a single render stage are isolated
//! by the [`FrameRenderer`](crate::renderer::FrameRenderer) and reported in the
//! frame report; only [`VolumetraError::Framebuffer`] aborts a whole frame.
//!
//! ```rust,ignore
//! use volumetra::errors::{VolumetraError, Result};
//!
//! fn partition() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use glam::UVec3;
use thiserror::Error;

/// The main error type for the Volumetra engine.
#[derive(Error, Debug)]
pub enum VolumetraError {
    // ========================================================================
    // Volume Addressing & Configuration
    // ========================================================================
    /// A voxel or segment coordinate lies outside `[0, size)`.
    #[error("Coordinate {coord} is out of bounds (size: {size})")]
    OutOfBounds {
        /// The offending coordinate
        coord: UVec3,
        /// The exclusive upper bound that was violated
        size: UVec3,
    },

    /// Invalid partition or renderer parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader source failed to compile on the video device.
    #[error("Shader '{source_name}' failed to compile: {message}")]
    ShaderCompilation {
        /// Name of the offending shader source
        source_name: String,
        /// Compiler diagnostics
        message: String,
    },

    /// A material or stage references a shader source that was never registered.
    #[error("Shader source not found: {0}")]
    ShaderNotFound(String),

    /// Template expansion of a shader source failed.
    #[error("Shader template error: {0}")]
    ShaderTemplate(String),

    // ========================================================================
    // Video Resources & Output
    // ========================================================================
    /// Uploading a geometry feature to video memory failed.
    #[error("Failed to acquire video resource '{label}': {reason}")]
    ResourceAcquisition {
        /// Label of the geometry feature
        label: String,
        /// Why the upload failed
        reason: String,
    },

    /// The output framebuffer or viewport could not be set up.
    #[error("Framebuffer error: {0}")]
    Framebuffer(String),

    // ========================================================================
    // Scene Graph
    // ========================================================================
    /// Invalid scene graph operation.
    #[error("Scene graph error: {0}")]
    Hierarchy(String),

    // ========================================================================
    // Format & Parsing Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // GPU Backend Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[cfg(feature = "wgpu")]
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[cfg(feature = "wgpu")]
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),
}

impl VolumetraError {
    /// Returns `true` for framebuffer or viewport setup errors, which abort the
    /// whole frame. Raised by a stage, the same error only fails that stage.
    #[must_use]
    pub fn is_frame_fatal(&self) -> bool {
        matches!(self, Self::Framebuffer(_))
    }

    /// Returns `true` for errors that permanently disable the stage that raised them.
    #[must_use]
    pub fn disables_stage(&self) -> bool {
        matches!(
            self,
            Self::ShaderCompilation { .. } | Self::ShaderNotFound(_) | Self::ShaderTemplate(_)
        )
    }
}

impl From<minijinja::Error> for VolumetraError {
    fn from(err: minijinja::Error) -> Self {
        VolumetraError::ShaderTemplate(err.to_string())
    }
}

/// Alias for `Result<T, VolumetraError>`.
pub type Result<T> = std::result::Result<T, VolumetraError>;
