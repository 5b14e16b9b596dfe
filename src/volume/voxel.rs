//! Voxel Value Types
//!
//! Every concrete voxel type implements the [`VoxelValue`] capability: it knows
//! its byte size, the texel format it is uploaded with, and how to encode itself
//! into a texture staging buffer. Intensity-like voxels additionally implement
//! [`IntensityVoxel`] so that they can be loaded from normalized `[0, 1]` data.

use glam::Vec3;
use half::f16;

/// Texel format a voxel type is uploaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    R8Unorm,
    R16Unorm,
    R16Float,
    R32Float,
    R16Sint,
    Rgba8Snorm,
    Rgba8Unorm,
}

impl TexelFormat {
    /// Size of a single texel in bytes.
    #[must_use]
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8Unorm => 1,
            Self::R16Unorm | Self::R16Float | Self::R16Sint => 2,
            Self::R32Float | Self::Rgba8Snorm | Self::Rgba8Unorm => 4,
        }
    }
}

/// Capability shared by all voxel types.
pub trait VoxelValue: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Byte size of one voxel in video memory.
    const BYTES: usize;
    /// Texel format used for the 3D texture upload.
    const FORMAT: TexelFormat;

    /// Writes the little-endian texel representation into `out`.
    ///
    /// `out` is exactly [`Self::BYTES`] long.
    fn encode(self, out: &mut [u8]);
}

/// Voxels that carry a scalar intensity normalized to `[0, 1]`.
pub trait IntensityVoxel: VoxelValue {
    fn from_intensity(intensity: f32) -> Self;
    fn intensity(self) -> f32;
}

impl VoxelValue for u8 {
    const BYTES: usize = 1;
    const FORMAT: TexelFormat = TexelFormat::R8Unorm;

    fn encode(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl IntensityVoxel for u8 {
    fn from_intensity(intensity: f32) -> Self {
        (intensity.clamp(0.0, 1.0) * f32::from(u8::MAX)).round() as u8
    }

    fn intensity(self) -> f32 {
        f32::from(self) / f32::from(u8::MAX)
    }
}

impl VoxelValue for u16 {
    const BYTES: usize = 2;
    const FORMAT: TexelFormat = TexelFormat::R16Unorm;

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl IntensityVoxel for u16 {
    fn from_intensity(intensity: f32) -> Self {
        (intensity.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
    }

    fn intensity(self) -> f32 {
        f32::from(self) / f32::from(u16::MAX)
    }
}

impl VoxelValue for f16 {
    const BYTES: usize = 2;
    const FORMAT: TexelFormat = TexelFormat::R16Float;

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_bits().to_le_bytes());
    }
}

impl IntensityVoxel for f16 {
    fn from_intensity(intensity: f32) -> Self {
        f16::from_f32(intensity.clamp(0.0, 1.0))
    }

    fn intensity(self) -> f32 {
        self.to_f32()
    }
}

impl VoxelValue for f32 {
    const BYTES: usize = 4;
    const FORMAT: TexelFormat = TexelFormat::R32Float;

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl IntensityVoxel for f32 {
    fn from_intensity(intensity: f32) -> Self {
        intensity.clamp(0.0, 1.0)
    }

    fn intensity(self) -> f32 {
        self
    }
}

// ============================================================================
// Hounsfield Units
// ============================================================================

/// A CT voxel in Hounsfield units, clamped to `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hounsfield(i16);

impl Hounsfield {
    pub const MIN: i16 = -1024;
    pub const MAX: i16 = 3071;
    /// Radiodensity of air.
    pub const AIR: Self = Self(Self::MIN);
    /// Radiodensity of distilled water.
    pub const WATER: Self = Self(0);

    #[must_use]
    pub fn new(value: i16) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    #[inline]
    #[must_use]
    pub fn value(self) -> i16 {
        self.0
    }
}

impl Default for Hounsfield {
    fn default() -> Self {
        Self::AIR
    }
}

impl From<i16> for Hounsfield {
    fn from(value: i16) -> Self {
        Self::new(value)
    }
}

impl VoxelValue for Hounsfield {
    const BYTES: usize = 2;
    const FORMAT: TexelFormat = TexelFormat::R16Sint;

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_le_bytes());
    }
}

impl IntensityVoxel for Hounsfield {
    fn from_intensity(intensity: f32) -> Self {
        let range = f32::from(Self::MAX) - f32::from(Self::MIN);
        let hu = f32::from(Self::MIN) + intensity.clamp(0.0, 1.0) * range;
        Self::new(hu.round() as i16)
    }

    fn intensity(self) -> f32 {
        let range = f32::from(Self::MAX) - f32::from(Self::MIN);
        (f32::from(self.0) - f32::from(Self::MIN)) / range
    }
}

// ============================================================================
// Normals
// ============================================================================

/// A normal vector packed into signed 8-bit components (`w` is padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Normal([i8; 4]);

impl Normal {
    pub const ZERO: Self = Self([0; 4]);

    /// Packs `v`; components are clamped to `[-1, 1]`, not renormalized.
    #[must_use]
    pub fn from_vec3(v: Vec3) -> Self {
        let pack = |c: f32| (c.clamp(-1.0, 1.0) * 127.0).round() as i8;
        Self([pack(v.x), pack(v.y), pack(v.z), 0])
    }

    #[must_use]
    pub fn to_vec3(self) -> Vec3 {
        let unpack = |c: i8| f32::from(c) / 127.0;
        Vec3::new(unpack(self.0[0]), unpack(self.0[1]), unpack(self.0[2]))
    }

    #[inline]
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0[..3] == [0, 0, 0]
    }
}

impl VoxelValue for Normal {
    const BYTES: usize = 4;
    const FORMAT: TexelFormat = TexelFormat::Rgba8Snorm;

    fn encode(self, out: &mut [u8]) {
        for (dst, src) in out.iter_mut().zip(self.0) {
            *dst = src.to_le_bytes()[0];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hounsfield_clamps_and_maps_to_intensity() {
        assert_eq!(Hounsfield::new(5000).value(), Hounsfield::MAX);
        assert_eq!(Hounsfield::new(-3000).value(), Hounsfield::MIN);
        assert!(Hounsfield::AIR.intensity().abs() < 1e-6);
        assert!((Hounsfield::new(Hounsfield::MAX).intensity() - 1.0).abs() < 1e-6);
        assert_eq!(Hounsfield::from_intensity(Hounsfield::WATER.intensity()), Hounsfield::WATER);
    }

    #[test]
    fn normal_packing_preserves_axis_vectors() {
        let n = Normal::from_vec3(Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(n.to_vec3(), Vec3::new(0.0, -1.0, 0.0));
        let mut bytes = [0u8; 4];
        n.encode(&mut bytes);
        assert_eq!(bytes, [0, 0x81, 0, 0]);
    }

    #[test]
    fn u16_intensity_round_trips_extremes() {
        assert_eq!(u16::from_intensity(1.0), u16::MAX);
        assert_eq!(u16::from_intensity(-0.5), 0);
        assert!((u16::MAX.intensity() - 1.0).abs() < 1e-6);
    }
}
