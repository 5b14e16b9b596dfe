pub mod cutting_planes;
pub mod mesh;
pub mod picking;
pub mod volume;

pub use cutting_planes::{CUTTING_PLANE_SHADER, CuttingPlanesRenderer, CuttingPlanesStage, plane_tangent_model};
pub use mesh::{MeshRenderer, MeshRenderingStage};
pub use picking::{MeshPickingRenderer, MeshPickingStage};
pub use volume::{
    DrrSettings, DvrSettings, MaskSettings, VOLUME_SHADER, VolumeMode, VolumeRenderer, VolumeRenderingStage,
};
