use std::sync::Arc;

use crate::errors::Result;
use crate::renderer::device::{ResourceId, TextureDesc};
use crate::resources::feature::{UploadContext, VideoResourceSource};
use crate::volume::buffer::SharedVoxelBuffer;
use crate::volume::voxel::VoxelValue;

/// Uploads a voxel buffer as a 3D texture.
///
/// The buffer stays shared with its segment; edits made between frames are
/// picked up through the buffer's version.
pub struct VolumeTexture<V: VoxelValue> {
    label: String,
    buffer: SharedVoxelBuffer<V>,
}

impl<V: VoxelValue> VolumeTexture<V> {
    pub fn new(label: impl Into<String>, buffer: SharedVoxelBuffer<V>) -> Self {
        Self {
            label: label.into(),
            buffer,
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &SharedVoxelBuffer<V> {
        &self.buffer
    }
}

impl<V: VoxelValue> VideoResourceSource for VolumeTexture<V> {
    fn label(&self) -> &str {
        &self.label
    }

    fn upload(&self, ctx: &mut UploadContext<'_>) -> Result<ResourceId> {
        let buffer = self.buffer.read();
        let desc = TextureDesc {
            label: &self.label,
            size: buffer.size(),
            format: V::FORMAT,
        };
        ctx.device.create_texture_3d(&desc, &buffer.to_bytes())
    }

    fn version(&self) -> u64 {
        self.buffer.read().version()
    }

    fn update(&self, ctx: &mut UploadContext<'_>, current: ResourceId) -> Result<ResourceId> {
        let bytes = self.buffer.read().to_bytes();
        ctx.device.write_texture_3d(current, &bytes)?;
        Ok(current)
    }

    fn data_key(&self) -> usize {
        Arc::as_ptr(&self.buffer) as usize
    }
}
