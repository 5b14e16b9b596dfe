//! Render Queues
//!
//! A [`RenderQueue`] collects the geometries of one geometry type each frame
//! and hands them out in the order a stage asks for. Entries are never
//! carried over between frames: [`RenderQueue::build`] clears the queue
//! before collecting.
//!
//! Polling advances a cursor. Switching the order mid-queue re-sorts the
//! entries that have not been polled yet; [`RenderQueue::rewind`] restarts
//! from the first entry.

use std::cmp::Ordering;

use glam::Mat4;
use smallvec::SmallVec;

use crate::resources::feature::{FeatureId, GeometryFeature};
use crate::scene::{Geometry, NodeHandle, Scene};

/// A geometry prepared for drawing in the current frame.
#[derive(Debug, Clone)]
pub struct Renderable {
    geometry: NodeHandle,
    geometry_type: u32,
    features: SmallVec<[(u32, GeometryFeature); 4]>,
    world: Mat4,
    model_view: Mat4,
    depth: f32,
    sequence: usize,
}

impl Renderable {
    /// Snapshots `geometry` with its world matrix, as seen through `view`.
    #[must_use]
    pub fn new(handle: NodeHandle, geometry: &Geometry, world: Mat4, view: Mat4) -> Self {
        let mut renderable = Self {
            geometry: handle,
            geometry_type: geometry.geometry_type(),
            features: geometry
                .features()
                .map(|(role, feature)| (role, feature.clone()))
                .collect(),
            world,
            model_view: Mat4::IDENTITY,
            depth: 0.0,
            sequence: 0,
        };
        renderable.update_model_view(view);
        renderable
    }

    fn update_model_view(&mut self, view: Mat4) {
        self.model_view = view * self.world;
        // Distance along the viewing direction (-Z in view space).
        self.depth = -self.model_view.w_axis.z;
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self) -> NodeHandle {
        self.geometry
    }

    #[inline]
    #[must_use]
    pub fn geometry_type(&self) -> u32 {
        self.geometry_type
    }

    #[must_use]
    pub fn feature(&self, role: u32) -> Option<&GeometryFeature> {
        self.features
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, feature)| feature)
    }

    pub fn features(&self) -> impl Iterator<Item = (u32, &GeometryFeature)> {
        self.features.iter().map(|(role, feature)| (*role, feature))
    }

    #[inline]
    #[must_use]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    #[inline]
    #[must_use]
    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    /// Distance from the eye along the viewing direction.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> f32 {
        self.depth
    }
}

/// Total orders a queue can be polled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderOrder {
    /// Traversal order of the scene graph.
    Insertion,
    /// Ascending depth; opaque geometry.
    FrontToBack,
    /// Descending depth; translucent geometry.
    BackToFront,
    /// Groups geometries sharing the feature of the given role, so its video
    /// resource is bound once. Geometries without that role come last.
    VideoResources(u32),
}

impl RenderOrder {
    fn compare(self, a: &Renderable, b: &Renderable) -> Ordering {
        let primary = match self {
            Self::Insertion => Ordering::Equal,
            Self::FrontToBack => a.depth.total_cmp(&b.depth),
            Self::BackToFront => b.depth.total_cmp(&a.depth),
            Self::VideoResources(role) => {
                let key = |r: &Renderable| -> (bool, Option<FeatureId>) {
                    let id = r.feature(role).map(GeometryFeature::id);
                    (id.is_none(), id)
                };
                key(a).cmp(&key(b))
            }
        };
        primary.then(a.sequence.cmp(&b.sequence))
    }
}

/// Per-geometry-type queue of [`Renderable`]s.
#[derive(Debug)]
pub struct RenderQueue {
    geometry_type: u32,
    mask: u32,
    entries: Vec<Renderable>,
    cursor: usize,
    sorted_by: Option<RenderOrder>,
}

impl RenderQueue {
    /// Queue accepting geometries whose type equals `geometry_type`.
    #[must_use]
    pub fn new(geometry_type: u32) -> Self {
        Self::with_mask(geometry_type, u32::MAX)
    }

    /// Queue accepting geometries whose type `t` satisfies
    /// `t & mask == geometry_type`.
    #[must_use]
    pub fn with_mask(geometry_type: u32, mask: u32) -> Self {
        Self {
            geometry_type,
            mask,
            entries: Vec::new(),
            cursor: 0,
            sorted_by: None,
        }
    }

    #[must_use]
    pub fn geometry_type(&self) -> u32 {
        self.geometry_type
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, geometry_type: u32) -> bool {
        geometry_type & self.mask == self.geometry_type
    }

    /// Rebuilds the queue from the geometries below `root`.
    ///
    /// World matrices are read as they are; update them beforehand.
    pub fn build(&mut self, scene: &Scene, root: NodeHandle, view: Mat4) {
        self.clear();
        for (handle, spatial) in scene.traverse(root) {
            if let Some(geometry) = spatial.as_geometry()
                && self.matches(geometry.geometry_type())
            {
                self.insert(Renderable::new(
                    handle,
                    geometry,
                    spatial.world_matrix_as_mat4(),
                    view,
                ));
            }
        }
    }

    /// Appends an entry. Entries are polled in insertion order unless an
    /// order says otherwise.
    pub fn insert(&mut self, mut renderable: Renderable) {
        renderable.sequence = self.entries.len();
        self.entries.push(renderable);
        self.sorted_by = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.sorted_by = None;
    }

    /// Every entry of this frame, polled or not.
    pub fn entries(&self) -> &[Renderable] {
        &self.entries
    }

    /// Makes every entry available for polling again.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.sorted_by = None;
    }

    /// Recomputes model-view matrices and depths for `view`.
    pub fn update_model_view_transforms(&mut self, view: Mat4) {
        for entry in &mut self.entries {
            entry.update_model_view(view);
        }
        self.sorted_by = None;
    }

    fn sort_remaining(&mut self, order: RenderOrder) {
        if self.sorted_by == Some(order) {
            return;
        }
        self.entries[self.cursor..].sort_by(|a, b| order.compare(a, b));
        self.sorted_by = Some(order);
    }

    /// Takes the next entry in `order`.
    pub fn poll(&mut self, order: RenderOrder) -> Option<&Renderable> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.sort_remaining(order);
        let index = self.cursor;
        self.cursor += 1;
        self.entries.get(index)
    }

    /// Peeks at the entry [`Self::poll`] would return next.
    pub fn first(&mut self, order: RenderOrder) -> Option<&Renderable> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.sort_remaining(order);
        self.entries.get(self.cursor)
    }

    /// Peeks at the entry that would be polled last.
    pub fn last(&mut self, order: RenderOrder) -> Option<&Renderable> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.sort_remaining(order);
        self.entries.last()
    }

    /// Total number of entries this frame, polled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet polled.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }
}
