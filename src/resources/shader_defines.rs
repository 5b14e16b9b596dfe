//! Shader Macro Definitions
//!
//! Defines are handed to the shader template as the `defines` map, so a
//! template can branch on them:
//!
//! ```text
//! {$ if defines.USE_NORMALS $}
//!     let n = textureSample(normals, normals_sampler, uvw).xyz;
//! {$ endif $}
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

/// An ordered set of `name → value` shader defines.
///
/// Ordering makes identical define sets expand to identical shader sources,
/// so they share one compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ShaderDefines {
    defines: BTreeMap<String, String>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a define, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.defines.insert(key.to_owned(), value.to_owned());
    }

    /// Builder form of [`Self::set`].
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.defines.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.defines.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }
}
