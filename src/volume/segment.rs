use glam::UVec3;

use crate::volume::buffer::{SharedVoxelBuffer, VoxelBuffer};
use crate::volume::voxel::VoxelValue;

/// One partition of a [`VolumeGrid`](super::VolumeGrid).
///
/// Owns the intensity buffer and, if the grid carries normals, a normals
/// buffer of the same size. The buffers are shared with the geometry
/// features that upload them.
#[derive(Debug)]
pub struct Segment<I: VoxelValue, N: VoxelValue> {
    coord: UVec3,
    offset: UVec3,
    size: UVec3,
    intensities: SharedVoxelBuffer<I>,
    normals: Option<SharedVoxelBuffer<N>>,
}

impl<I: VoxelValue, N: VoxelValue> Segment<I, N> {
    pub(crate) fn new(coord: UVec3, offset: UVec3, size: UVec3, with_normals: bool) -> Self {
        Self {
            coord,
            offset,
            size,
            intensities: VoxelBuffer::new(size).into_shared(),
            normals: with_normals.then(|| VoxelBuffer::new(size).into_shared()),
        }
    }

    /// Grid coordinate of this segment.
    #[inline]
    #[must_use]
    pub fn coord(&self) -> UVec3 {
        self.coord
    }

    /// Global voxel coordinate of this segment's first voxel.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> UVec3 {
        self.offset
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec3 {
        self.size
    }

    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.size.x as usize * self.size.y as usize * self.size.z as usize
    }

    /// Whether the global voxel coordinate lies in this segment.
    #[must_use]
    pub fn contains(&self, global: UVec3) -> bool {
        global.cmpge(self.offset).all() && global.cmplt(self.offset + self.size).all()
    }

    #[must_use]
    pub fn intensities(&self) -> &SharedVoxelBuffer<I> {
        &self.intensities
    }

    #[must_use]
    pub fn normals(&self) -> Option<&SharedVoxelBuffer<N>> {
        self.normals.as_ref()
    }

    #[must_use]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }
}
