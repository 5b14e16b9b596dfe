use glam::Vec3;
use slotmap::SlotMap;

use crate::errors::{Result, VolumetraError};
use crate::scene::NodeHandle;
use crate::scene::spatial::{Geometry, Spatial};
use crate::scene::transform_system;

/// A spatial detached from a scene together with its descendants.
///
/// Detaching moves ownership of the whole subtree to the caller; it can be
/// dropped or inserted into a scene again.
#[derive(Debug)]
pub struct Subtree {
    pub spatial: Spatial,
    pub children: Vec<Subtree>,
}

impl Subtree {
    /// Number of spatials in the subtree.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(subtree) = stack.pop() {
            count += 1;
            stack.extend(&subtree.children);
        }
        count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Arena-backed scene graph with a single root node.
///
/// Every spatial in the arena is reachable from the root. Children are kept
/// in insertion order.
pub struct Scene {
    nodes: SlotMap<NodeHandle, Spatial>,
    root: NodeHandle,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let mut root = Spatial::node();
        root.tag = "root".to_owned();
        let root = nodes.insert(root);
        Self { nodes, root }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of spatials, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> Option<&Spatial> {
        self.nodes.get(handle)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Spatial> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn geometry(&self, handle: NodeHandle) -> Option<&Geometry> {
        self.nodes.get(handle).and_then(Spatial::as_geometry)
    }

    pub fn geometry_mut(&mut self, handle: NodeHandle) -> Option<&mut Geometry> {
        self.nodes.get_mut(handle).and_then(Spatial::as_geometry_mut)
    }

    #[must_use]
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(handle).and_then(Spatial::parent)
    }

    #[must_use]
    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.nodes.get(handle).map_or(&[], Spatial::children)
    }

    /// Starts building a node.
    pub fn build_node(&mut self) -> NodeBuilder<'_> {
        NodeBuilder::new(self, Spatial::node())
    }

    /// Starts building a geometry of `geometry_type`.
    pub fn build_geometry(&mut self, geometry_type: u32) -> NodeBuilder<'_> {
        NodeBuilder::new(self, Spatial::geometry(geometry_type))
    }

    /// Adds an empty node below `parent`.
    pub fn create_node(&mut self, parent: NodeHandle) -> Result<NodeHandle> {
        self.add(Spatial::node(), parent)
    }

    /// Adds a geometry without features below `parent`.
    pub fn create_geometry(&mut self, parent: NodeHandle, geometry_type: u32) -> Result<NodeHandle> {
        self.add(Spatial::geometry(geometry_type), parent)
    }

    /// Inserts `spatial` as the last child of `parent`.
    pub fn add(&mut self, mut spatial: Spatial, parent: NodeHandle) -> Result<NodeHandle> {
        self.check_parent(parent)?;
        spatial.parent = Some(parent);
        spatial.children.clear();
        spatial.transform.mark_dirty();
        let handle = self.nodes.insert(spatial);
        self.nodes[parent].children.push(handle);
        Ok(handle)
    }

    /// Moves `child` (with its subtree) to the end of `parent`'s children.
    ///
    /// World matrices of the moved subtree follow the new parent right away.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        self.check_live(child)?;
        self.check_parent(parent)?;
        if child == self.root {
            return Err(VolumetraError::Hierarchy("the root cannot be re-attached".into()));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(VolumetraError::Hierarchy(
                "cannot attach a spatial below itself".into(),
            ));
        }

        self.unlink(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        transform_system::update_subtree(&mut self.nodes, child);
        Ok(())
    }

    /// Removes `handle` and its descendants from the scene, returning them.
    pub fn detach(&mut self, handle: NodeHandle) -> Result<Subtree> {
        self.check_live(handle)?;
        if handle == self.root {
            return Err(VolumetraError::Hierarchy("the root cannot be detached".into()));
        }
        self.unlink(handle);
        self.take_subtree(handle)
            .ok_or_else(|| VolumetraError::Hierarchy(format!("stale spatial handle {handle:?}")))
    }

    /// Removes `handle` and its descendants, dropping them.
    ///
    /// Features referenced only by the removed geometries are dropped with
    /// them; any video resource they still hold is released by the stage that
    /// acquired it.
    pub fn remove(&mut self, handle: NodeHandle) -> Result<()> {
        let subtree = self.detach(handle)?;
        log::debug!("Removed {} spatial(s) from the scene", subtree.len());
        Ok(())
    }

    /// Inserts a previously detached subtree as the last child of `parent`
    /// and computes its world matrices.
    pub fn insert_subtree(&mut self, subtree: Subtree, parent: NodeHandle) -> Result<NodeHandle> {
        self.check_parent(parent)?;
        let Subtree { spatial, children } = subtree;
        let handle = self.add(spatial, parent)?;

        // (subtree, parent handle)
        let mut pending: Vec<(Subtree, NodeHandle)> =
            children.into_iter().rev().map(|child| (child, handle)).collect();
        while let Some((Subtree { mut spatial, children }, parent)) = pending.pop() {
            spatial.parent = Some(parent);
            spatial.children.clear();
            spatial.transform.mark_dirty();
            let child = self.nodes.insert(spatial);
            self.nodes[parent].children.push(child);
            pending.extend(children.into_iter().rev().map(|grandchild| (grandchild, child)));
        }
        transform_system::update_subtree(&mut self.nodes, handle);
        Ok(handle)
    }

    /// Recomputes world matrices of the whole scene.
    pub fn update_world_transforms(&mut self) {
        transform_system::update_hierarchy_iterative(&mut self.nodes, self.root);
    }

    /// Depth-first pre-order traversal of the subtree of `from`.
    #[must_use]
    pub fn traverse(&self, from: NodeHandle) -> Traverse<'_> {
        let stack = if self.nodes.contains_key(from) {
            vec![from]
        } else {
            Vec::new()
        };
        Traverse { scene: self, stack }
    }

    /// Geometries in the subtree of `from`, in traversal order.
    pub fn geometries(&self, from: NodeHandle) -> impl Iterator<Item = (NodeHandle, &Geometry)> {
        self.traverse(from)
            .filter_map(|(handle, spatial)| spatial.as_geometry().map(|geometry| (handle, geometry)))
    }

    /// First spatial with `tag`, in traversal order from the root.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeHandle> {
        self.traverse(self.root)
            .find(|(_, spatial)| spatial.tag == tag)
            .map(|(handle, _)| handle)
    }

    fn check_live(&self, handle: NodeHandle) -> Result<()> {
        if self.nodes.contains_key(handle) {
            Ok(())
        } else {
            Err(VolumetraError::Hierarchy(format!("stale spatial handle {handle:?}")))
        }
    }

    fn check_parent(&self, parent: NodeHandle) -> Result<()> {
        match self.nodes.get(parent) {
            None => Err(VolumetraError::Hierarchy(format!("stale parent handle {parent:?}"))),
            Some(spatial) if spatial.is_geometry() => Err(VolumetraError::Hierarchy(
                "geometries are leaves and cannot have children".into(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeHandle, mut handle: NodeHandle) -> bool {
        loop {
            if handle == ancestor {
                return true;
            }
            match self.parent(handle) {
                Some(parent) => handle = parent,
                None => return false,
            }
        }
    }

    fn unlink(&mut self, handle: NodeHandle) {
        if let Some(parent) = self.nodes.get_mut(handle).and_then(|s| s.parent.take())
            && let Some(parent) = self.nodes.get_mut(parent)
        {
            parent.children.retain(|&child| child != handle);
        }
    }

    fn take_subtree(&mut self, handle: NodeHandle) -> Option<Subtree> {
        // Pre-order (spatial, index of its parent in `taken`).
        let mut taken: Vec<(Spatial, Option<usize>)> = Vec::new();
        let mut stack: Vec<(NodeHandle, Option<usize>)> = vec![(handle, None)];
        while let Some((current, parent_index)) = stack.pop() {
            let Some(mut spatial) = self.nodes.remove(current) else {
                continue;
            };
            let index = taken.len();
            stack.extend(
                std::mem::take(&mut spatial.children)
                    .into_iter()
                    .rev()
                    .map(|child| (child, Some(index))),
            );
            spatial.parent = None;
            taken.push((spatial, parent_index));
        }

        // Children are complete before their parent is assembled.
        let mut assembled: Vec<Vec<Subtree>> = std::iter::repeat_with(Vec::new).take(taken.len()).collect();
        let mut root = None;
        while let Some((spatial, parent_index)) = taken.pop() {
            let mut children = std::mem::take(&mut assembled[taken.len()]);
            children.reverse();
            let subtree = Subtree { spatial, children };
            match parent_index {
                Some(parent) => assembled[parent].push(subtree),
                None => root = Some(subtree),
            }
        }
        root
    }
}

/// Iterator returned by [`Scene::traverse`].
///
/// Holds its own stack, so a new traversal can be started every frame.
pub struct Traverse<'a> {
    scene: &'a Scene,
    stack: Vec<NodeHandle>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = (NodeHandle, &'a Spatial);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.stack.pop()?;
        let spatial = self.scene.nodes.get(handle)?;
        self.stack.extend(spatial.children.iter().rev().copied());
        Some((handle, spatial))
    }
}

/// Fluent construction of a spatial.
pub struct NodeBuilder<'a> {
    scene: &'a mut Scene,
    spatial: Spatial,
    parent: Option<NodeHandle>,
}

impl<'a> NodeBuilder<'a> {
    fn new(scene: &'a mut Scene, spatial: Spatial) -> Self {
        Self {
            scene,
            spatial,
            parent: None,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.spatial.tag = tag.to_owned();
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.spatial.transform.position = position;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.spatial.transform.scale = scale;
        self
    }

    #[must_use]
    pub fn with_movable(mut self, movable: bool) -> Self {
        self.spatial.movable = movable;
        self
    }

    /// Parent to attach to; the root if unset.
    #[must_use]
    pub fn with_parent(mut self, parent: NodeHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Attaches a feature. Ignored for nodes.
    #[must_use]
    pub fn with_feature(mut self, role: u32, feature: crate::resources::GeometryFeature) -> Self {
        if let Some(geometry) = self.spatial.as_geometry_mut() {
            geometry.put_feature(role, feature);
        }
        self
    }

    pub fn build(self) -> Result<NodeHandle> {
        let parent = self.parent.unwrap_or(self.scene.root);
        self.scene.add(self.spatial, parent)
    }
}
