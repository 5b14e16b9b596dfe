//! Dense voxel storage.

use std::sync::Arc;

use glam::UVec3;
use parking_lot::RwLock;

use crate::errors::{Result, VolumetraError};
use crate::resources::version_tracker::{ChangeTracker, MutGuard};
use crate::volume::voxel::VoxelValue;

/// A voxel buffer shared between its owning segment and the geometry features
/// that upload it to video memory.
pub type SharedVoxelBuffer<V> = Arc<RwLock<VoxelBuffer<V>>>;

/// Dense, fixed-size 3D array of voxels.
///
/// Voxels are laid out with `x` varying fastest, then `y`, then `z`, which is
/// the row/slice order a 3D texture upload expects.
#[derive(Debug, Clone)]
pub struct VoxelBuffer<V: VoxelValue> {
    size: UVec3,
    data: Vec<V>,
    tracker: ChangeTracker,
}

impl<V: VoxelValue> VoxelBuffer<V> {
    /// Creates a buffer of `size` filled with `V::default()`.
    #[must_use]
    pub fn new(size: UVec3) -> Self {
        let len = size.x as usize * size.y as usize * size.z as usize;
        Self {
            size,
            data: vec![V::default(); len],
            tracker: ChangeTracker::new(),
        }
    }

    /// Creates a buffer whose voxels are produced by `f(coord)`.
    pub fn from_fn(size: UVec3, mut f: impl FnMut(UVec3) -> V) -> Self {
        let mut buffer = Self::new(size);
        let mut index = 0;
        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    buffer.data[index] = f(UVec3::new(x, y, z));
                    index += 1;
                }
            }
        }
        buffer
    }

    /// Wraps the buffer for sharing with geometry features.
    #[must_use]
    pub fn into_shared(self) -> SharedVoxelBuffer<V> {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec3 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the buffer in video memory.
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.data.len() * V::BYTES
    }

    /// Version of the voxel data, bumped by every mutation.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[inline]
    fn index_of(&self, coord: UVec3) -> Result<usize> {
        if coord.cmplt(self.size).all() {
            Ok(coord.x as usize
                + self.size.x as usize * (coord.y as usize + self.size.y as usize * coord.z as usize))
        } else {
            Err(VolumetraError::OutOfBounds {
                coord,
                size: self.size,
            })
        }
    }

    pub fn get(&self, coord: UVec3) -> Result<V> {
        self.index_of(coord).map(|index| self.data[index])
    }

    pub fn set(&mut self, coord: UVec3, value: V) -> Result<()> {
        let index = self.index_of(coord)?;
        self.data[index] = value;
        self.tracker.changed();
        Ok(())
    }

    pub fn fill(&mut self, value: V) {
        self.data.fill(value);
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[V] {
        &self.data
    }

    /// Mutable access to all voxels at once; the version is bumped once when
    /// the guard goes out of scope.
    pub fn voxels_mut(&mut self) -> MutGuard<'_, Vec<V>> {
        MutGuard::new(&mut self.data, &mut self.tracker)
    }

    /// Encodes all voxels into a tightly packed texel buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.byte_size()];
        for (chunk, voxel) in bytes.chunks_exact_mut(V::BYTES).zip(&self.data) {
            voxel.encode(chunk);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access_fails() {
        let mut buffer = VoxelBuffer::<u16>::new(UVec3::new(2, 3, 4));
        assert!(matches!(
            buffer.get(UVec3::new(2, 0, 0)),
            Err(VolumetraError::OutOfBounds { .. })
        ));
        assert!(buffer.set(UVec3::new(0, 0, 4), 1).is_err());
        assert!(buffer.set(UVec3::new(1, 2, 3), 7).is_ok());
        assert_eq!(buffer.get(UVec3::new(1, 2, 3)).unwrap(), 7);
    }

    #[test]
    fn layout_is_x_fastest() {
        let buffer = VoxelBuffer::<u8>::from_fn(UVec3::new(2, 2, 2), |c| (c.x + 2 * c.y + 4 * c.z) as u8);
        assert_eq!(buffer.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buffer.to_bytes(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn bulk_edit_bumps_version_once() {
        let mut buffer = VoxelBuffer::<f32>::new(UVec3::splat(2));
        let before = buffer.version();
        {
            let mut voxels = buffer.voxels_mut();
            voxels[0] = 1.0;
            voxels[7] = 2.0;
        }
        assert_eq!(buffer.version(), before + 1);
        assert_eq!(buffer.get(UVec3::ONE).unwrap(), 2.0);
    }
}
