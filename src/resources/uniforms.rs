//! Named Uniform Values
//!
//! Materials and stages describe shader parameters as `name → value` pairs.
//! A [`UniformLayout`] maps those names to byte offsets following the WGSL
//! uniform address-space rules, so that a backend can pack them into a single
//! uniform buffer:
//!
//! | Type      | Size | Align |
//! |-----------|------|-------|
//! | `f32` / `i32` / `u32` / `bool` | 4 | 4 |
//! | `vec2<f32>` | 8  | 8  |
//! | `vec3<f32>` | 12 | 16 |
//! | `vec4<f32>` | 16 | 16 |
//! | `mat4x4<f32>` | 64 | 16 |
//!
//! Booleans are stored as `u32`, since WGSL forbids `bool` in uniform buffers.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A typed uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    #[must_use]
    pub fn uniform_type(&self) -> UniformType {
        match self {
            Self::Float(_) => UniformType::Float,
            Self::Int(_) => UniformType::Int,
            Self::UInt(_) => UniformType::UInt,
            Self::Bool(_) => UniformType::Bool,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            Self::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::UInt(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Bool(v) => out.copy_from_slice(bytemuck::bytes_of(&u32::from(*v))),
            Self::Vec2(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec3(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec4(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Mat4(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
        }
    }
}

macro_rules! impl_from_uniform {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_uniform! {
    f32 => Float,
    i32 => Int,
    u32 => UInt,
    bool => Bool,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat4 => Mat4,
}

/// Name → value mapping of a material or draw call.
pub type UniformValues = FxHashMap<String, UniformValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UniformType {
    Float,
    Int,
    UInt,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    #[must_use]
    pub const fn align(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Bool => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat4 => 16,
        }
    }

    /// WGSL spelling of the type inside a uniform struct.
    #[must_use]
    pub const fn wgsl(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Int => "i32",
            Self::UInt | Self::Bool => "u32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }
}

/// One member of a [`UniformLayout`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UniformEntry {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
    /// WGSL type, exposed to shader templates.
    pub wgsl: &'static str,
}

/// Byte layout of a shader's uniform block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct UniformLayout {
    entries: Vec<UniformEntry>,
    size: usize,
}

impl UniformLayout {
    /// Lays the members out in declaration order.
    pub fn new<'a>(members: impl IntoIterator<Item = (&'a str, UniformType)>) -> Self {
        let mut entries = Vec::new();
        let mut offset: usize = 0;
        for (name, ty) in members {
            offset = offset.next_multiple_of(ty.align());
            entries.push(UniformEntry {
                name: name.to_owned(),
                ty,
                offset,
                wgsl: ty.wgsl(),
            });
            offset += ty.size();
        }
        Self {
            entries,
            size: offset.next_multiple_of(16).max(16),
        }
    }

    /// Size of the packed block, a multiple of 16 bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn entries(&self) -> &[UniformEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&UniformEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Packs `values` into a block of [`Self::size`] bytes.
    ///
    /// Members without a value, or whose value has a different type, are
    /// left zeroed; the mismatching names are returned.
    pub fn pack(&self, values: &UniformValues) -> (Vec<u8>, Vec<String>) {
        let mut block = vec![0u8; self.size];
        let mut mismatched = Vec::new();
        for entry in &self.entries {
            match values.get(&entry.name) {
                Some(value) if value.uniform_type() == entry.ty => {
                    value.write(&mut block[entry.offset..entry.offset + entry.ty.size()]);
                }
                Some(_) => mismatched.push(entry.name.clone()),
                None => {}
            }
        }
        (block, mismatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_wgsl_alignment() {
        let layout = UniformLayout::new([
            ("model_view", UniformType::Mat4),
            ("step", UniformType::Float),
            ("color", UniformType::Vec3),
            ("flag", UniformType::Bool),
            ("uv", UniformType::Vec2),
        ]);
        let offsets: Vec<_> = layout.entries().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 64, 80, 92, 96]);
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn pack_skips_type_mismatches() {
        let layout = UniformLayout::new([("a", UniformType::Float), ("b", UniformType::UInt)]);
        let mut values = UniformValues::default();
        values.insert("a".into(), 2.0f32.into());
        values.insert("b".into(), UniformValue::Float(1.0));
        let (block, mismatched) = layout.pack(&values);
        assert_eq!(&block[0..4], &2.0f32.to_le_bytes());
        assert_eq!(&block[4..8], &[0, 0, 0, 0]);
        assert_eq!(mismatched, vec!["b".to_string()]);
    }
}
