//! Helpers
//!
//! Convenience layers over the core types:
//!
//! - [`VolumeGridHelper`]: partitions, populates and instantiates a volume
//! - [`PointMarkerHelper`]: creates colored point markers
//! - [`StageOrder`]: arranges stages in their canonical order

pub mod point_marker;
pub mod stage_order;
pub mod volume_grid;

pub use point_marker::{MARKER_PALETTE, PointMarkerHelper};
pub use stage_order::StageOrder;
pub use volume_grid::{Dimensions, VolumeGridHelper};
