//! Utility Module
//!
//! - [`FpsCounter`]: frame rate measurement, reported by the frame renderer

pub mod fps_counter;

pub use fps_counter::FpsCounter;
