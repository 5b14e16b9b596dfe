//! Scene graph
//!
//! The scene is an arena of [`Spatial`]s addressed by [`NodeHandle`]s:
//! - [`Scene`]: the arena with its root node, hierarchy editing and traversal
//! - [`Spatial`]: transform, tag, user data and kind (node or geometry)
//! - [`Geometry`]: renderable leaf referencing geometry features by role
//! - [`Transform`]: TRS with cached local/world matrices
//! - [`Camera`]: view and projection of a frame
//! - `transform_system`: world matrix propagation

pub mod camera;
pub mod scene;
pub mod spatial;
pub mod transform;
pub mod transform_system;

pub use camera::Camera;
pub use scene::{NodeBuilder, Scene, Subtree, Traverse};
pub use spatial::{Geometry, Spatial, SpatialKind};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle of a spatial inside a [`Scene`].
    pub struct NodeHandle;
}
