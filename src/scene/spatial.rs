//! Scene graph elements
//!
//! Every element of the scene graph is a [`Spatial`]. A spatial is either an
//! inner [`SpatialKind::Node`] that groups children, or a leaf
//! [`SpatialKind::Geometry`] that references geometry features by role.

use std::any::Any;
use std::fmt;

use glam::{Affine3A, Mat4};
use smallvec::SmallVec;

use crate::resources::feature::GeometryFeature;
use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

/// Renderable leaf of the scene graph.
///
/// The geometry type is a bit pattern matched by render queues; features are
/// kept unique per role.
#[derive(Debug, Clone)]
pub struct Geometry {
    geometry_type: u32,
    features: SmallVec<[(u32, GeometryFeature); 4]>,
}

impl Geometry {
    #[must_use]
    pub fn new(geometry_type: u32) -> Self {
        Self {
            geometry_type,
            features: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn geometry_type(&self) -> u32 {
        self.geometry_type
    }

    /// Attaches `feature` under `role`, returning the feature it replaced.
    pub fn put_feature(&mut self, role: u32, feature: GeometryFeature) -> Option<GeometryFeature> {
        match self.features.binary_search_by_key(&role, |(r, _)| *r) {
            Ok(index) => Some(std::mem::replace(&mut self.features[index].1, feature)),
            Err(index) => {
                self.features.insert(index, (role, feature));
                None
            }
        }
    }

    pub fn remove_feature(&mut self, role: u32) -> Option<GeometryFeature> {
        let index = self.features.binary_search_by_key(&role, |(r, _)| *r).ok()?;
        Some(self.features.remove(index).1)
    }

    /// Removes `feature` from every role it is attached under.
    pub fn remove_feature_instance(&mut self, feature: &GeometryFeature) -> usize {
        let before = self.features.len();
        self.features.retain(|(_, f)| f != feature);
        before - self.features.len()
    }

    pub fn clear_features(&mut self) {
        self.features.clear();
    }

    #[must_use]
    pub fn has_feature(&self, role: u32) -> bool {
        self.feature(role).is_some()
    }

    #[must_use]
    pub fn has_feature_instance(&self, feature: &GeometryFeature) -> bool {
        self.features.iter().any(|(_, f)| f == feature)
    }

    #[must_use]
    pub fn feature(&self, role: u32) -> Option<&GeometryFeature> {
        self.features
            .binary_search_by_key(&role, |(r, _)| *r)
            .ok()
            .map(|index| &self.features[index].1)
    }

    /// `(role, feature)` pairs in ascending role order.
    pub fn features(&self) -> impl ExactSizeIterator<Item = (u32, &GeometryFeature)> {
        self.features.iter().map(|(role, feature)| (*role, feature))
    }

    #[must_use]
    pub fn features_count(&self) -> usize {
        self.features.len()
    }
}

#[derive(Debug, Clone)]
pub enum SpatialKind {
    Node,
    Geometry(Geometry),
}

/// An element of the scene graph.
pub struct Spatial {
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,
    /// Hint for interaction tools; volume segments are created non-movable.
    pub movable: bool,
    pub tag: String,
    pub user_data: Option<Box<dyn Any + Send + Sync>>,

    pub(crate) kind: SpatialKind,
}

impl fmt::Debug for Spatial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spatial")
            .field("tag", &self.tag)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("movable", &self.movable)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Spatial {
    #[must_use]
    pub fn node() -> Self {
        Self::with_kind(SpatialKind::Node)
    }

    #[must_use]
    pub fn geometry(geometry_type: u32) -> Self {
        Self::with_kind(SpatialKind::Geometry(Geometry::new(geometry_type)))
    }

    fn with_kind(kind: SpatialKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            movable: true,
            tag: String::new(),
            user_data: None,
            kind,
        }
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[must_use]
    pub fn kind(&self) -> &SpatialKind {
        &self.kind
    }

    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(self.kind, SpatialKind::Geometry(_))
    }

    #[must_use]
    pub fn as_geometry(&self) -> Option<&Geometry> {
        match &self.kind {
            SpatialKind::Geometry(geometry) => Some(geometry),
            SpatialKind::Node => None,
        }
    }

    pub fn as_geometry_mut(&mut self) -> Option<&mut Geometry> {
        match &mut self.kind {
            SpatialKind::Geometry(geometry) => Some(geometry),
            SpatialKind::Node => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        self.transform.world_matrix()
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        self.transform.world_matrix_as_mat4()
    }

    /// Attached user data, if it has type `T`.
    #[must_use]
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref().and_then(|data| {
            let data: &dyn Any = data;
            data.downcast_ref()
        })
    }

    pub fn set_user_data<T: Any + Send + Sync>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }
}
