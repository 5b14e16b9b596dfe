//! Transform System
//!
//! Propagates world matrices down the scene graph. It borrows only the
//! spatial arena, so it can run while other parts of the scene are borrowed.
//!
//! A spatial's world matrix is recomputed when its own TRS changed or when
//! an ancestor's world matrix changed during the same pass.

use glam::Affine3A;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::spatial::Spatial;

/// Updates every world matrix below (and including) `root`.
///
/// Uses an explicit stack instead of recursion, so deep hierarchies cannot
/// overflow the call stack. Parents are always processed before children.
pub fn update_hierarchy_iterative(nodes: &mut SlotMap<NodeHandle, Spatial>, root: NodeHandle) {
    let parent_world = nodes
        .get(root)
        .and_then(|spatial| spatial.parent)
        .and_then(|parent| nodes.get(parent))
        .map_or(Affine3A::IDENTITY, |parent| parent.transform.world_matrix);

    update_from(nodes, root, parent_world, false);
}

/// Updates the subtree of `root`, recomputing its world matrices even if
/// nothing is marked dirty. Run by the scene after a subtree moved to a new
/// parent.
pub fn update_subtree(nodes: &mut SlotMap<NodeHandle, Spatial>, root: NodeHandle) {
    let parent_world = nodes
        .get(root)
        .and_then(|spatial| spatial.parent)
        .and_then(|parent| nodes.get(parent))
        .map_or(Affine3A::IDENTITY, |parent| parent.transform.world_matrix);

    update_from(nodes, root, parent_world, true);
}

fn update_from(
    nodes: &mut SlotMap<NodeHandle, Spatial>,
    root: NodeHandle,
    parent_world: Affine3A,
    force: bool,
) {
    // (spatial, parent world matrix, parent changed)
    let mut stack: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(64);
    stack.push((root, parent_world, force));

    while let Some((handle, parent_world_matrix, parent_changed)) = stack.pop() {
        let Some(spatial) = nodes.get_mut(handle) else {
            continue;
        };

        let local_changed = spatial.transform.update_local_matrix();
        let world_needs_update = local_changed || parent_changed;

        if world_needs_update {
            let new_world = parent_world_matrix * *spatial.transform.local_matrix();
            spatial.transform.set_world_matrix(new_world);
        }

        let current_world = spatial.transform.world_matrix;
        // Reverse push keeps children in declaration order.
        for &child in spatial.children.iter().rev() {
            stack.push((child, current_world, world_needs_update));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn children_inherit_parent_motion() {
        let mut nodes: SlotMap<NodeHandle, Spatial> = SlotMap::with_key();

        let mut parent = Spatial::node();
        parent.transform.position = Vec3::new(1.0, 0.0, 0.0);
        let parent_handle = nodes.insert(parent);

        let mut child = Spatial::node();
        child.transform.position = Vec3::new(0.0, 1.0, 0.0);
        child.parent = Some(parent_handle);
        let child_handle = nodes.insert(child);
        nodes[parent_handle].children.push(child_handle);

        update_hierarchy_iterative(&mut nodes, parent_handle);
        let world = nodes[child_handle].transform.world_matrix.translation;
        assert!((world.x - 1.0).abs() < 1e-5);
        assert!((world.y - 1.0).abs() < 1e-5);

        // Only the parent moves; the child must follow.
        nodes[parent_handle].transform.position.x = 5.0;
        update_hierarchy_iterative(&mut nodes, parent_handle);
        let world = nodes[child_handle].transform.world_matrix.translation;
        assert!((world.x - 5.0).abs() < 1e-5);
    }
}
