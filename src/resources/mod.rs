//! Geometry features and their CPU-side data
//!
//! Everything a geometry can reference and that ends up in video memory:
//! - [`GeometryFeature`]: shared handle with acquisition-counted upload
//! - [`VolumeTexture`]: one voxel buffer as a 3D texture
//! - [`ColorMap`] / [`ColorMapTexture`]: intensity → color lookup tables
//! - [`Mesh`] / [`MeshFactory`]: triangle meshes
//! - [`Material`]: shader, defines, uniforms and render state

pub mod color_map;
pub mod feature;
pub mod material;
pub mod mesh;
pub mod render_state;
pub mod shader_defines;
pub mod uniforms;
pub mod version_tracker;
pub mod volume_texture;

pub use color_map::{ColorMap, ColorMapTexture, SharedColorMap};
pub use feature::{FeatureId, GeometryFeature, UploadContext, VideoResource, VideoResourceSource};
pub use material::{Material, MaterialBuilder};
pub use mesh::{Mesh, MeshFactory, PrimitiveType, Vertex};
pub use render_state::RenderState;
pub use shader_defines::ShaderDefines;
pub use uniforms::{UniformLayout, UniformType, UniformValue, UniformValues};
pub use version_tracker::{ChangeTracker, MutGuard};
pub use volume_texture::VolumeTexture;
