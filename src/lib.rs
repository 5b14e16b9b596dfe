#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Volumetra
//!
//! Real-time rendering of partitioned volumetric (CT) data.
//!
//! A volume too large for a single 3D texture is split into segments
//! ([`volume`]), instantiated as scene geometries ([`helpers::VolumeGridHelper`])
//! and rendered by a sequence of stages ([`renderer`]) that ray march the
//! segments (MIP, DVR, DRR) and draw meshes alongside them.
//!
//! ```rust,ignore
//! use volumetra::prelude::*;
//!
//! let mut scene = Scene::new();
//! let mut helper = VolumeGridHelper::<Hounsfield>::new(UVec3::splat(256), 2 * 128 * 128 * 128, true)?;
//! helper.load_hounsfield(|coord| sample_ct(coord))?;
//! helper.create_node(&mut scene, scene.root(), 2, Dimensions::Spacing(Vec3::splat(0.5)))?;
//!
//! let mut renderer = FrameRenderer::new(HeadlessDevice::new(), Framebuffer::new(512, 512), RendererSettings::default())?;
//! renderer.sequence_mut().append_stage(VolumeRenderingStage::dvr(2)?);
//! let report = renderer.render(&mut scene, scene.root(), &camera)?;
//! ```

pub mod errors;
pub mod helpers;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;
pub mod volume;

pub use errors::{Result, VolumetraError};
pub use helpers::{Dimensions, PointMarkerHelper, StageOrder, VolumeGridHelper};
pub use renderer::{
    CuttingPlanesStage, FrameRenderer, FrameReport, Framebuffer, HeadlessDevice, MeshPickingStage, MeshRenderingStage,
    RenderOrder, RenderQueue, RenderStage, RenderStageSequence, RendererSettings, VideoDevice, Viewport, VolumeMode,
    VolumeRenderingStage,
};
pub use resources::{ColorMap, GeometryFeature, Material, Mesh, MeshFactory, RenderState};
pub use scene::{Camera, Geometry, NodeHandle, Scene, Spatial};
pub use volume::{Hounsfield, Normal, Segment, VolumeGrid, VoxelBuffer};

/// Common imports for hosts.
pub mod prelude {
    pub use glam::{Mat4, UVec3, Vec3, Vec4};

    pub use crate::errors::{Result, VolumetraError};
    pub use crate::helpers::{Dimensions, PointMarkerHelper, StageOrder, VolumeGridHelper};
    pub use crate::renderer::{
        CuttingPlanesStage, DrrSettings, DvrSettings, FrameRenderer, Framebuffer, HeadlessDevice, MaskSettings,
        MeshPickingStage, MeshRenderingStage, RendererSettings, StageCategory, VideoDevice, Viewport, VolumeMode,
        VolumeRenderingStage,
    };
    pub use crate::resources::{ColorMap, GeometryFeature, Material, MeshFactory, RenderState};
    pub use crate::scene::{Camera, NodeHandle, Scene};
    pub use crate::volume::{Hounsfield, IntensityVoxel, Normal, VolumeGrid, VoxelBuffer};
}
