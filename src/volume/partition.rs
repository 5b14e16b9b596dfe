//! Per-axis partitioning of a full-resolution volume into segments.

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VolumetraError};

/// How segment sizes are chosen from the per-segment byte budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Segments are as large as the budget permits; only the last segment
    /// along each axis is smaller.
    #[default]
    MaximalSegments,
    /// The same segment count, but the resolution is spread evenly so that the
    /// tail segment is as close to the regular size as possible.
    Balanced,
}

/// Partition of a single axis.
///
/// `count - 1` regular segments of `regular_size` voxels are followed by one
/// tail segment of `tail_size` voxels, where `0 < tail_size <= regular_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPartition {
    pub resolution: u32,
    pub regular_size: u32,
    pub count: u32,
    pub tail_size: u32,
}

impl AxisPartition {
    /// Partitions `resolution` voxels into segments of at most `max_size`.
    pub fn new(resolution: u32, max_size: u32, policy: PartitionPolicy) -> Result<Self> {
        if resolution == 0 {
            return Err(VolumetraError::Configuration(
                "volume resolution must be positive along every axis".into(),
            ));
        }
        if max_size == 0 {
            return Err(VolumetraError::Configuration(
                "maximum segment size must be positive".into(),
            ));
        }

        let mut regular_size = max_size.min(resolution);
        let count = resolution.div_ceil(regular_size);
        if policy == PartitionPolicy::Balanced {
            regular_size = resolution.div_ceil(count);
        }
        // Balancing can shrink the required count; never leave an empty segment.
        let count = resolution.div_ceil(regular_size);
        let tail_size = resolution - (count - 1) * regular_size;

        Ok(Self {
            resolution,
            regular_size,
            count,
            tail_size,
        })
    }

    /// Size of the segment at `index` along this axis.
    #[inline]
    #[must_use]
    pub fn segment_size(&self, index: u32) -> u32 {
        if index + 1 == self.count {
            self.tail_size
        } else {
            self.regular_size
        }
    }
}

/// Side length of the largest cubic segment whose voxels fit into
/// `max_segment_bytesize`.
pub fn max_segment_side(max_segment_bytesize: usize, bytes_per_voxel: usize) -> Result<u32> {
    if bytes_per_voxel == 0 || max_segment_bytesize < bytes_per_voxel {
        return Err(VolumetraError::Configuration(format!(
            "maximum segment byte size {max_segment_bytesize} cannot hold a single {bytes_per_voxel}-byte voxel"
        )));
    }
    let voxels = (max_segment_bytesize / bytes_per_voxel) as u64;
    let mut side = (voxels as f64).cbrt().floor() as u64;
    while (side + 1).checked_pow(3).is_some_and(|cube| cube <= voxels) {
        side += 1;
    }
    while side > 1 && side.checked_pow(3).is_none_or(|cube| cube > voxels) {
        side -= 1;
    }
    Ok(side.clamp(1, u64::from(u32::MAX)) as u32)
}

/// Partition of all three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPartition {
    pub x: AxisPartition,
    pub y: AxisPartition,
    pub z: AxisPartition,
}

impl GridPartition {
    /// Computes the partition of `resolution` for voxels of `bytes_per_voxel`.
    ///
    /// `max_texture_dimension` caps the segment side further, e.g. by the
    /// device's largest supported 3D texture.
    pub fn compute(
        resolution: UVec3,
        max_segment_bytesize: usize,
        bytes_per_voxel: usize,
        max_texture_dimension: Option<u32>,
        policy: PartitionPolicy,
    ) -> Result<Self> {
        let mut side = max_segment_side(max_segment_bytesize, bytes_per_voxel)?;
        if let Some(limit) = max_texture_dimension {
            if limit == 0 {
                return Err(VolumetraError::Configuration(
                    "maximum texture dimension must be positive".into(),
                ));
            }
            side = side.min(limit);
        }
        Ok(Self {
            x: AxisPartition::new(resolution.x, side, policy)?,
            y: AxisPartition::new(resolution.y, side, policy)?,
            z: AxisPartition::new(resolution.z, side, policy)?,
        })
    }

    #[must_use]
    pub fn segment_counts(&self) -> UVec3 {
        UVec3::new(self.x.count, self.y.count, self.z.count)
    }

    #[must_use]
    pub fn segment_extent(&self) -> UVec3 {
        UVec3::new(self.x.regular_size, self.y.regular_size, self.z.regular_size)
    }

    #[must_use]
    pub fn resolution(&self) -> UVec3 {
        UVec3::new(self.x.resolution, self.y.resolution, self.z.resolution)
    }
}
