//! Materials
//!
//! A [`Material`] names a shader source, a set of defines, typed uniform
//! values and the fixed-function [`RenderState`] used to draw a mesh. As a
//! geometry feature it resolves to a compiled program; the program itself is
//! cached and owned by the [`ShaderManager`](crate::renderer::ShaderManager),
//! so materials sharing a shader and defines share one program.

use glam::{Mat4, Vec4};
use parking_lot::RwLock;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::ResourceId;
use crate::renderer::shader_manager::ProgramRequest;
use crate::resources::feature::{UploadContext, VideoResourceSource};
use crate::resources::render_state::RenderState;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::{UniformLayout, UniformType, UniformValue, UniformValues};

/// Uniforms every mesh program receives from the stage, in block order.
pub const BUILTIN_UNIFORMS: [(&str, UniformType); 3] = [
    ("model_view", UniformType::Mat4),
    ("projection", UniformType::Mat4),
    ("model_view_projection", UniformType::Mat4),
];

/// Name of the built-in flat-shaded mesh source.
pub const SOLID_SHADER: &str = "mesh";

pub struct Material {
    label: String,
    shader: String,
    defines: ShaderDefines,
    render_state: RenderState,
    layout: UniformLayout,
    values: RwLock<UniformValues>,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("label", &self.label)
            .field("shader", &self.shader)
            .field("defines", &self.defines)
            .field("render_state", &self.render_state)
            .finish_non_exhaustive()
    }
}

impl Material {
    /// Starts a material using the shader source `shader`.
    pub fn builder(label: impl Into<String>, shader: impl Into<String>) -> MaterialBuilder {
        MaterialBuilder {
            label: label.into(),
            shader: shader.into(),
            defines: ShaderDefines::new(),
            render_state: RenderState::default(),
            uniforms: Vec::new(),
        }
    }

    /// Flat-shaded material of a single color. Colors with alpha below one
    /// are drawn with blending enabled.
    #[must_use]
    pub fn solid(label: impl Into<String>, color: Vec4) -> Self {
        let state = if color.w < 1.0 {
            RenderState::translucent()
        } else {
            RenderState::default()
        };
        Self::builder(label, SOLID_SHADER)
            .with_uniform("color", color)
            .with_render_state(state)
            .build()
    }

    #[must_use]
    pub fn shader(&self) -> &str {
        &self.shader
    }

    #[must_use]
    pub fn defines(&self) -> &ShaderDefines {
        &self.defines
    }

    #[must_use]
    pub fn render_state(&self) -> RenderState {
        self.render_state
    }

    /// Layout of the program's uniform block: the built-in matrices followed
    /// by the material's own uniforms in name order.
    #[must_use]
    pub fn uniform_layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Snapshot of the material's uniform values.
    #[must_use]
    pub fn uniforms(&self) -> UniformValues {
        self.values.read().clone()
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.values.read().get(name).copied()
    }

    /// Changes the value of a declared uniform.
    ///
    /// The uniform set is fixed when the material is built; setting an
    /// undeclared name or a value of another type is a configuration error.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) -> Result<()> {
        let value = value.into();
        let Some(entry) = self.layout.entry(name) else {
            return Err(VolumetraError::Configuration(format!(
                "material '{}' declares no uniform '{name}'",
                self.label
            )));
        };
        if BUILTIN_UNIFORMS.iter().any(|(builtin, _)| *builtin == name) {
            return Err(VolumetraError::Configuration(format!(
                "uniform '{name}' is provided by the render stage"
            )));
        }
        if entry.ty != value.uniform_type() {
            return Err(VolumetraError::Configuration(format!(
                "uniform '{name}' of material '{}' is {:?}, got {:?}",
                self.label,
                entry.ty,
                value.uniform_type()
            )));
        }
        self.values.write().insert(name.to_owned(), value);
        Ok(())
    }

    /// Uniform values for one draw: the material's values plus the matrices.
    #[must_use]
    pub fn draw_uniforms(&self, model_view: Mat4, projection: Mat4) -> UniformValues {
        let mut values = self.uniforms();
        values.insert("model_view".into(), model_view.into());
        values.insert("projection".into(), projection.into());
        values.insert("model_view_projection".into(), (projection * model_view).into());
        values
    }
}

impl VideoResourceSource for Material {
    fn label(&self) -> &str {
        &self.label
    }

    fn upload(&self, ctx: &mut UploadContext<'_>) -> Result<ResourceId> {
        ctx.shaders.acquire_program(
            &mut *ctx.device,
            &ProgramRequest {
                source_name: &self.shader,
                defines: &self.defines,
                uniforms: &self.layout,
                texture_slots: 0,
            },
        )
    }

    fn owns_video_resource(&self) -> bool {
        false
    }
}

pub struct MaterialBuilder {
    label: String,
    shader: String,
    defines: ShaderDefines,
    render_state: RenderState,
    uniforms: Vec<(String, UniformValue)>,
}

impl MaterialBuilder {
    /// Declares a uniform with its initial value. Declaring a name twice
    /// keeps the last value.
    #[must_use]
    pub fn with_uniform(mut self, name: &str, value: impl Into<UniformValue>) -> Self {
        let value = value.into();
        self.uniforms.retain(|(existing, _)| existing != name);
        self.uniforms.push((name.to_owned(), value));
        self
    }

    #[must_use]
    pub fn with_define(mut self, key: &str, value: &str) -> Self {
        self.defines.set(key, value);
        self
    }

    #[must_use]
    pub fn with_render_state(mut self, state: RenderState) -> Self {
        self.render_state = state;
        self
    }

    #[must_use]
    pub fn build(mut self) -> Material {
        self.uniforms
            .retain(|(name, _)| !BUILTIN_UNIFORMS.iter().any(|(builtin, _)| builtin == name));
        self.uniforms.sort_by(|(a, _), (b, _)| a.cmp(b));

        let layout = UniformLayout::new(
            BUILTIN_UNIFORMS.iter().copied().chain(
                self.uniforms
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.uniform_type())),
            ),
        );
        let values = self.uniforms.into_iter().collect();

        Material {
            label: self.label,
            shader: self.shader,
            defines: self.defines,
            render_state: self.render_state,
            layout,
            values: RwLock::new(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_starts_with_builtin_matrices() {
        let material = Material::builder("m", "mesh")
            .with_uniform("shininess", 8.0f32)
            .with_uniform("color", Vec4::ONE)
            .build();
        let names: Vec<_> = material
            .uniform_layout()
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["model_view", "projection", "model_view_projection", "color", "shininess"]
        );
    }

    #[test]
    fn set_uniform_checks_declaration_and_type() {
        let material = Material::solid("m", Vec4::ONE);
        material.set_uniform("color", Vec4::ZERO).unwrap();
        assert_eq!(material.uniform("color"), Some(UniformValue::Vec4(Vec4::ZERO)));
        assert!(material.set_uniform("color", 1.0f32).is_err());
        assert!(material.set_uniform("unknown", 1.0f32).is_err());
        assert!(material.set_uniform("projection", Mat4::IDENTITY).is_err());
    }

    #[test]
    fn translucent_solid_enables_blending() {
        assert!(Material::solid("m", Vec4::new(1.0, 0.0, 0.0, 0.5)).render_state().is_blending());
        assert!(!Material::solid("m", Vec4::ONE).render_state().is_blending());
    }
}
