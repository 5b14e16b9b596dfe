//! Volume Grid
//!
//! A [`VolumeGrid`] presents a 3D array of [`Segment`]s as one logical volume
//! addressed by global voxel coordinates.
//!
//! The partition is fixed at construction: every segment along an axis has the
//! regular extent except the last, which covers the remainder. Resolving a
//! global coordinate is therefore a division per axis:
//!
//! ```text
//! segment = min(global / extent, count - 1)
//! local   = global - segment * extent
//! ```

use glam::UVec3;

use crate::errors::{Result, VolumetraError};
use crate::volume::partition::GridPartition;
use crate::volume::segment::Segment;
use crate::volume::voxel::{Normal, VoxelValue};

/// Partitioned volume of intensity voxels `I` with optional normals `N`.
#[derive(Debug)]
pub struct VolumeGrid<I: VoxelValue, N: VoxelValue = Normal> {
    size: UVec3,
    segment_extent: UVec3,
    segment_counts: UVec3,
    /// Segments with `x` varying fastest.
    segments: Vec<Segment<I, N>>,
    with_normals: bool,
}

impl<I: VoxelValue, N: VoxelValue> VolumeGrid<I, N> {
    /// Builds a grid covering `size` voxels with segments of at most
    /// `segment_extent` voxels per axis.
    pub fn new(size: UVec3, segment_extent: UVec3, with_normals: bool) -> Result<Self> {
        if size.cmpeq(UVec3::ZERO).any() {
            return Err(VolumetraError::Configuration(format!(
                "volume size {size} must be positive along every axis"
            )));
        }
        if segment_extent.cmpeq(UVec3::ZERO).any() {
            return Err(VolumetraError::Configuration(format!(
                "segment extent {segment_extent} must be positive along every axis"
            )));
        }

        let segment_extent = segment_extent.min(size);
        let segment_counts = UVec3::new(
            size.x.div_ceil(segment_extent.x),
            size.y.div_ceil(segment_extent.y),
            size.z.div_ceil(segment_extent.z),
        );

        let total = segment_counts.x as usize * segment_counts.y as usize * segment_counts.z as usize;
        let mut segments = Vec::with_capacity(total);
        for z in 0..segment_counts.z {
            for y in 0..segment_counts.y {
                for x in 0..segment_counts.x {
                    let coord = UVec3::new(x, y, z);
                    let offset = coord * segment_extent;
                    let segment_size = (size - offset).min(segment_extent);
                    segments.push(Segment::new(coord, offset, segment_size, with_normals));
                }
            }
        }

        Ok(Self {
            size,
            segment_extent,
            segment_counts,
            segments,
            with_normals,
        })
    }

    /// Builds the grid described by a computed partition.
    pub fn from_partition(partition: &GridPartition, with_normals: bool) -> Result<Self> {
        Self::new(partition.resolution(), partition.segment_extent(), with_normals)
    }

    /// Full logical resolution.
    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec3 {
        self.size
    }

    /// Extent of a regular (non-tail) segment.
    #[inline]
    #[must_use]
    pub fn segment_extent(&self) -> UVec3 {
        self.segment_extent
    }

    #[inline]
    #[must_use]
    pub fn segment_counts(&self) -> UVec3 {
        self.segment_counts
    }

    #[inline]
    #[must_use]
    pub fn has_normals(&self) -> bool {
        self.with_normals
    }

    #[must_use]
    pub fn total_voxel_count(&self) -> usize {
        self.segments.iter().map(Segment::voxel_count).sum()
    }

    pub(crate) fn segment_index(&self, coord: UVec3) -> Result<usize> {
        if coord.cmplt(self.segment_counts).all() {
            Ok(coord.x as usize
                + self.segment_counts.x as usize
                    * (coord.y as usize + self.segment_counts.y as usize * coord.z as usize))
        } else {
            Err(VolumetraError::OutOfBounds {
                coord,
                size: self.segment_counts,
            })
        }
    }

    /// Segment at grid coordinate `coord`.
    pub fn segment(&self, coord: UVec3) -> Result<&Segment<I, N>> {
        let index = self.segment_index(coord)?;
        Ok(&self.segments[index])
    }

    pub fn segment_mut(&mut self, coord: UVec3) -> Result<&mut Segment<I, N>> {
        let index = self.segment_index(coord)?;
        Ok(&mut self.segments[index])
    }

    /// All segments, `x` varying fastest.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = &Segment<I, N>> {
        self.segments.iter()
    }

    /// Resolves a global voxel coordinate to `(segment coordinate, local coordinate)`.
    pub fn locate(&self, global: UVec3) -> Result<(UVec3, UVec3)> {
        if !global.cmplt(self.size).all() {
            return Err(VolumetraError::OutOfBounds {
                coord: global,
                size: self.size,
            });
        }
        let segment = (global / self.segment_extent).min(self.segment_counts - UVec3::ONE);
        Ok((segment, global - segment * self.segment_extent))
    }

    /// Resolves a global voxel coordinate to its owning segment and the local coordinate within it.
    pub fn segment_at(&self, global: UVec3) -> Result<(&Segment<I, N>, UVec3)> {
        let (coord, local) = self.locate(global)?;
        Ok((self.segment(coord)?, local))
    }

    pub fn segment_at_mut(&mut self, global: UVec3) -> Result<(&mut Segment<I, N>, UVec3)> {
        let (coord, local) = self.locate(global)?;
        Ok((self.segment_mut(coord)?, local))
    }

    pub fn voxel(&self, global: UVec3) -> Result<I> {
        let (segment, local) = self.segment_at(global)?;
        segment.intensities().read().get(local)
    }

    pub fn set_voxel(&mut self, global: UVec3, value: I) -> Result<()> {
        let (segment, local) = self.segment_at_mut(global)?;
        segment.intensities().write().set(local, value)
    }

    /// Normal at a global coordinate; fails with `Configuration` when the grid carries no normals.
    pub fn normal(&self, global: UVec3) -> Result<N> {
        let (segment, local) = self.segment_at(global)?;
        match segment.normals() {
            Some(normals) => normals.read().get(local),
            None => Err(no_normals()),
        }
    }

    pub fn set_normal(&mut self, global: UVec3, value: N) -> Result<()> {
        let (segment, local) = self.segment_at_mut(global)?;
        match segment.normals() {
            Some(normals) => normals.write().set(local, value),
            None => Err(no_normals()),
        }
    }
}

fn no_normals() -> VolumetraError {
    VolumetraError::Configuration("volume grid was built without normals".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_segments_cover_remainder() {
        let grid = VolumeGrid::<u8>::new(UVec3::new(10, 4, 7), UVec3::new(4, 4, 3), false).unwrap();
        assert_eq!(grid.segment_counts(), UVec3::new(3, 1, 3));
        assert_eq!(grid.segment(UVec3::new(2, 0, 2)).unwrap().size(), UVec3::new(2, 4, 1));
        assert_eq!(grid.total_voxel_count(), 10 * 4 * 7);
    }

    #[test]
    fn locate_maps_into_owning_segment() {
        let grid = VolumeGrid::<u8>::new(UVec3::splat(10), UVec3::splat(4), false).unwrap();
        let (segment, local) = grid.locate(UVec3::new(9, 4, 3)).unwrap();
        assert_eq!(segment, UVec3::new(2, 1, 0));
        assert_eq!(local, UVec3::new(1, 0, 3));
        assert!(grid.locate(UVec3::new(10, 0, 0)).is_err());
    }

    #[test]
    fn normals_require_normal_buffers() {
        let mut grid = VolumeGrid::<u8>::new(UVec3::splat(2), UVec3::splat(2), false).unwrap();
        assert!(matches!(
            grid.set_normal(UVec3::ZERO, Normal::ZERO),
            Err(VolumetraError::Configuration(_))
        ));
    }
}
