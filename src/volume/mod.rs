//! Volume Partitioning
//!
//! Dense voxel buffers, their partition into GPU-texture-sized segments and the
//! [`VolumeGrid`] that addresses all segments as one logical volume.

pub mod buffer;
pub mod grid;
pub mod normals;
pub mod partition;
pub mod segment;
pub mod voxel;

pub use buffer::{SharedVoxelBuffer, VoxelBuffer};
pub use grid::VolumeGrid;
pub use normals::compute_normals;
pub use partition::{AxisPartition, GridPartition, PartitionPolicy};
pub use segment::Segment;
pub use voxel::{Hounsfield, IntensityVoxel, Normal, TexelFormat, VoxelValue};
