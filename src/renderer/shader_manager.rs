//! Shader Manager
//!
//! Registry of named shader sources plus a cache of compiled programs.
//!
//! Sources are minijinja templates. Built-in sources are embedded from
//! `src/renderer/shaders`; hosts may register their own with
//! [`ShaderManager::register_source`]. A template is expanded with two
//! variables:
//!
//! | Variable   | Content |
//! |------------|---------|
//! | `defines`  | the [`ShaderDefines`] map |
//! | `uniforms` | entries of the program's [`UniformLayout`] (`name`, `wgsl`, `offset`) |
//!
//! Compiled programs are deduplicated by the xxh3-128 hash of the **final**
//! source. The manager is an explicit value owned by the
//! [`FrameRenderer`](super::FrameRenderer) and lent to stages and features
//! through the frame context; there is no global instance.

use std::borrow::Cow;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind, context};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{ProgramDesc, ResourceId, VideoDevice};
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::UniformLayout;

#[derive(RustEmbed)]
#[folder = "src/renderer/shaders"]
struct BuiltinShaders;

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    if let Some(file) = BuiltinShaders::get(&filename) {
        return match std::str::from_utf8(file.data.as_ref()) {
            Ok(source) => Ok(Some(source.to_owned())),
            Err(e) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("shader '{filename}' is not UTF-8: {e}"),
            )),
        };
    }

    Ok(None)
}

/// Parameters of a program request.
#[derive(Debug, Clone, Copy)]
pub struct ProgramRequest<'a> {
    pub source_name: &'a str,
    pub defines: &'a ShaderDefines,
    pub uniforms: &'a UniformLayout,
    pub texture_slots: u32,
}

pub struct ShaderManager {
    env: Environment<'static>,
    /// xxh3-128 of the final source → compiled program.
    programs: FxHashMap<u128, ResourceId>,
}

impl ShaderManager {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        Ok(Self {
            env,
            programs: FxHashMap::default(),
        })
    }

    /// Registers (or replaces) a shader source under `name`.
    pub fn register_source(&mut self, name: &str, source: &str) -> Result<()> {
        self.env.add_template_owned(name.to_owned(), source.to_owned())?;
        Ok(())
    }

    #[must_use]
    pub fn has_source(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Expands the template `name`.
    pub fn render(&self, name: &str, defines: &ShaderDefines, uniforms: &UniformLayout) -> Result<String> {
        let template = self.env.get_template(name).map_err(|err| {
            if matches!(err.kind(), ErrorKind::TemplateNotFound) {
                VolumetraError::ShaderNotFound(name.to_owned())
            } else {
                err.into()
            }
        })?;
        let source = template.render(context! {
            defines => defines,
            uniforms => uniforms.entries(),
        })?;
        Ok(source)
    }

    /// Returns the compiled program for `request`, compiling it on first use.
    pub fn acquire_program(
        &mut self,
        device: &mut dyn VideoDevice,
        request: &ProgramRequest<'_>,
    ) -> Result<ResourceId> {
        let source = self.render(request.source_name, request.defines, request.uniforms)?;
        let hash = xxh3_128(source.as_bytes());

        if let Some(&id) = self.programs.get(&hash)
            && device.contains(id)
        {
            return Ok(id);
        }

        let id = device.create_program(&ProgramDesc {
            source_name: request.source_name,
            source: &source,
            uniforms: request.uniforms,
            texture_slots: request.texture_slots,
        })?;
        log::debug!(
            "Compiled shader program '{}' on {} ({} bytes)",
            request.source_name,
            device.backend_name(),
            source.len()
        );
        self.programs.insert(hash, id);
        Ok(id)
    }

    /// Number of cached programs.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Hands every cached program back to `device` for release.
    pub fn release_programs(&mut self, device: &dyn VideoDevice) {
        let queue = device.release_queue();
        for (_, id) in self.programs.drain() {
            queue.release(id);
        }
    }
}
