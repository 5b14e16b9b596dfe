//! Color Maps
//!
//! A [`ColorMap`] is a 1D lookup table from normalized intensity to RGBA
//! color, used by direct volume rendering. It is uploaded as a
//! `resolution × 1 × 1` RGBA8 texture.

use std::sync::Arc;

use glam::{UVec3, Vec4};
use parking_lot::RwLock;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{ResourceId, TextureDesc};
use crate::resources::feature::{UploadContext, VideoResourceSource};
use crate::resources::version_tracker::ChangeTracker;
use crate::volume::voxel::{Hounsfield, IntensityVoxel, TexelFormat};

pub type SharedColorMap = Arc<RwLock<ColorMap>>;

#[derive(Debug, Clone)]
pub struct ColorMap {
    colors: Vec<[u8; 4]>,
    tracker: ChangeTracker,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self {
            colors: vec![[0; 4]; Self::DEFAULT_RESOLUTION],
            tracker: ChangeTracker::new(),
        }
    }
}

impl ColorMap {
    pub const DEFAULT_RESOLUTION: usize = 256;

    /// Creates a transparent color map with `resolution` entries.
    pub fn new(resolution: usize) -> Result<Self> {
        if resolution == 0 {
            return Err(VolumetraError::Configuration(
                "color map resolution must be positive".into(),
            ));
        }
        Ok(Self {
            colors: vec![[0; 4]; resolution],
            tracker: ChangeTracker::new(),
        })
    }

    #[must_use]
    pub fn into_shared(self) -> SharedColorMap {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[must_use]
    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    fn location(&self, intensity: f32) -> usize {
        let max = self.colors.len() - 1;
        let location = intensity.clamp(0.0, 1.0) * max as f32 + 0.5;
        (location as usize).min(max)
    }

    /// Color at a normalized intensity.
    #[must_use]
    pub fn lookup(&self, intensity: f32) -> Vec4 {
        let [r, g, b, a] = self.colors[self.location(intensity)];
        Vec4::new(r.into(), g.into(), b.into(), a.into()) / 255.0
    }

    /// Resets every entry to transparent black.
    pub fn clear(&mut self) -> &mut Self {
        self.colors.fill([0; 4]);
        self.tracker.changed();
        self
    }

    /// Linearly interpolates from `color_first` at `intensity_first` to
    /// `color_last` at `intensity_last`, overwriting that range.
    pub fn write_linear_segment(
        &mut self,
        intensity_first: f32,
        intensity_last: f32,
        color_first: Vec4,
        color_last: Vec4,
    ) -> &mut Self {
        let (first, last) = if intensity_first <= intensity_last {
            (self.location(intensity_first), self.location(intensity_last))
        } else {
            (self.location(intensity_last), self.location(intensity_first))
        };
        let count = last - first + 1;
        for offset in 0..count {
            let lambda = if count == 1 {
                0.5
            } else {
                offset as f32 / (count - 1) as f32
            };
            self.colors[first + offset] = to_rgba8(color_first.lerp(color_last, lambda));
        }
        self.tracker.changed();
        self
    }

    /// Same as [`Self::write_linear_segment`], addressed in Hounsfield units.
    pub fn write_linear_segment_hu(
        &mut self,
        hu_first: Hounsfield,
        hu_last: Hounsfield,
        color_first: Vec4,
        color_last: Vec4,
    ) -> &mut Self {
        self.write_linear_segment(hu_first.intensity(), hu_last.intensity(), color_first, color_last)
    }

    /// Spreads `colors` evenly over the whole intensity range, interpolating
    /// linearly between neighbours.
    pub fn write_linear_spline(&mut self, colors: &[Vec4]) -> Result<&mut Self> {
        if colors.len() < 2 {
            return Err(VolumetraError::Configuration(format!(
                "a linear color spline needs at least two colors, got {}",
                colors.len()
            )));
        }
        let segments = (colors.len() - 1) as f32;
        for (index, pair) in colors.windows(2).enumerate() {
            self.write_linear_segment(
                index as f32 / segments,
                (index + 1) as f32 / segments,
                pair[0],
                pair[1],
            );
        }
        Ok(self)
    }
}

fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

/// Uploads a shared [`ColorMap`] as a `resolution × 1 × 1` texture.
pub struct ColorMapTexture {
    label: String,
    map: SharedColorMap,
}

impl ColorMapTexture {
    pub fn new(label: impl Into<String>, map: SharedColorMap) -> Self {
        Self {
            label: label.into(),
            map,
        }
    }

    fn bytes(map: &ColorMap) -> Vec<u8> {
        map.colors.iter().flatten().copied().collect()
    }
}

impl VideoResourceSource for ColorMapTexture {
    fn label(&self) -> &str {
        &self.label
    }

    fn upload(&self, ctx: &mut UploadContext<'_>) -> Result<ResourceId> {
        let map = self.map.read();
        let desc = TextureDesc {
            label: &self.label,
            size: UVec3::new(map.resolution() as u32, 1, 1),
            format: TexelFormat::Rgba8Unorm,
        };
        ctx.device.create_texture_3d(&desc, &Self::bytes(&map))
    }

    fn version(&self) -> u64 {
        self.map.read().version()
    }

    fn update(&self, ctx: &mut UploadContext<'_>, current: ResourceId) -> Result<ResourceId> {
        let bytes = Self::bytes(&self.map.read());
        ctx.device.write_texture_3d(current, &bytes)?;
        Ok(current)
    }

    fn data_key(&self) -> usize {
        Arc::as_ptr(&self.map) as usize
    }
}
