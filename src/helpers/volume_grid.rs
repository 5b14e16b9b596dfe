//! Volume Grid Helper
//!
//! Builds a [`VolumeGrid`] for a volume of a given native resolution, fills
//! it from a caller-supplied sampling function and creates the scene nodes
//! that render it.
//!
//! ```rust,ignore
//! let mut helper = VolumeGridHelper::<Hounsfield>::new(UVec3::splat(300), 2 * 128 * 128 * 128, true)?;
//! helper.load_hounsfield(|coord| ct.sample(coord))?;
//! let volume = helper.create_node(&mut scene, scene.root(), GEOMETRY_TYPE_VOLUME, Dimensions::Spacing(Vec3::splat(0.5)))?;
//! ```
//!
//! # Node layout
//!
//! ```text
//! pivot (Node, non-movable, centers the volume)
//!   ├─ segment (0,0,0)  Geometry: unit box scaled to the segment's extent
//!   ├─ segment (1,0,0)
//!   └─ ...
//! ```
//!
//! A voxel occupies one `spacing`-sized cell, so a volume of resolution `r`
//! spans `r * spacing` and neighbouring segments share their faces.

use std::time::Instant;

use glam::{UVec3, Vec3};
use smallvec::SmallVec;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::VideoDevice;
use crate::renderer::settings::RendererSettings;
use crate::renderer::stages::VolumeRenderer;
use crate::resources::feature::GeometryFeature;
use crate::resources::volume_texture::VolumeTexture;
use crate::scene::{NodeHandle, Scene};
use crate::volume::grid::VolumeGrid;
use crate::volume::normals::compute_normals;
use crate::volume::partition::{GridPartition, PartitionPolicy};
use crate::volume::segment::Segment;
use crate::volume::voxel::{Hounsfield, IntensityVoxel, Normal};

/// Physical size of a volume, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimensions {
    /// Size of a single voxel.
    Spacing(Vec3),
    /// Size of the whole volume.
    Extent(Vec3),
}

/// Geometry features of one segment, created on first use.
#[derive(Default)]
struct SegmentFeatures {
    intensities: Option<GeometryFeature>,
    normals: Option<GeometryFeature>,
}

impl SegmentFeatures {
    /// Features of `segment` keyed by role, sharing the cached ones.
    fn by_role<I: IntensityVoxel>(
        &mut self,
        segment: &Segment<I, Normal>,
        intensities_role: u32,
        normals_role: u32,
    ) -> SmallVec<[(u32, GeometryFeature); 2]> {
        let coord = segment.coord();
        let mut features = SmallVec::new();
        let intensities = self.intensities.get_or_insert_with(|| {
            GeometryFeature::new(VolumeTexture::new(
                format!("segment {coord} intensities"),
                segment.intensities().clone(),
            ))
        });
        features.push((intensities_role, intensities.clone()));

        if let Some(buffer) = segment.normals() {
            let normals = self.normals.get_or_insert_with(|| {
                GeometryFeature::new(VolumeTexture::new(format!("segment {coord} normals"), buffer.clone()))
            });
            features.push((normals_role, normals.clone()));
        }
        features
    }
}

/// Partitions, populates and instantiates a volume.
pub struct VolumeGridHelper<I: IntensityVoxel> {
    native_resolution: UVec3,
    max_segment_bytesize: usize,
    policy: PartitionPolicy,
    max_texture_dimension: Option<u32>,
    with_normals: bool,

    grid: VolumeGrid<I, Normal>,
    intensities_role: u32,
    normals_role: u32,
    features: Vec<SegmentFeatures>,
}

impl<I: IntensityVoxel> VolumeGridHelper<I> {
    /// Partitions `native_resolution` so that no segment's intensity
    /// texture exceeds `max_segment_bytesize`.
    pub fn new(native_resolution: UVec3, max_segment_bytesize: usize, with_normals: bool) -> Result<Self> {
        let policy = PartitionPolicy::default();
        let grid = Self::build_grid(native_resolution, max_segment_bytesize, policy, None, with_normals)?;
        Ok(Self {
            native_resolution,
            max_segment_bytesize,
            policy,
            max_texture_dimension: None,
            with_normals,
            features: Self::empty_features(&grid),
            grid,
            intensities_role: VolumeRenderer::ROLE_INTENSITIES,
            normals_role: VolumeRenderer::ROLE_NORMALS,
        })
    }

    /// Helper partitioned per `settings` and the texture limit of `device`.
    pub fn for_device(
        native_resolution: UVec3,
        settings: &RendererSettings,
        device: &dyn VideoDevice,
        with_normals: bool,
    ) -> Result<Self> {
        Self::new(native_resolution, settings.max_segment_bytesize, with_normals)?
            .with_policy(settings.partition_policy)?
            .with_max_texture_dimension(device.max_texture_3d_size())
    }

    /// Re-partitions with `policy`. Discards populated data.
    pub fn with_policy(mut self, policy: PartitionPolicy) -> Result<Self> {
        self.policy = policy;
        self.repartition()?;
        Ok(self)
    }

    /// Caps the segment side at `dimension`. Discards populated data.
    pub fn with_max_texture_dimension(mut self, dimension: u32) -> Result<Self> {
        self.max_texture_dimension = Some(dimension);
        self.repartition()?;
        Ok(self)
    }

    fn build_grid(
        resolution: UVec3,
        max_segment_bytesize: usize,
        policy: PartitionPolicy,
        max_texture_dimension: Option<u32>,
        with_normals: bool,
    ) -> Result<VolumeGrid<I, Normal>> {
        let partition = GridPartition::compute(
            resolution,
            max_segment_bytesize,
            I::BYTES,
            max_texture_dimension,
            policy,
        )?;
        VolumeGrid::from_partition(&partition, with_normals)
    }

    fn empty_features(grid: &VolumeGrid<I, Normal>) -> Vec<SegmentFeatures> {
        std::iter::repeat_with(SegmentFeatures::default)
            .take(grid.segments().len())
            .collect()
    }

    fn repartition(&mut self) -> Result<()> {
        self.grid = Self::build_grid(
            self.native_resolution,
            self.max_segment_bytesize,
            self.policy,
            self.max_texture_dimension,
            self.with_normals,
        )?;
        self.features = Self::empty_features(&self.grid);
        Ok(())
    }

    #[must_use]
    pub fn native_resolution(&self) -> UVec3 {
        self.native_resolution
    }

    #[must_use]
    pub fn grid(&self) -> &VolumeGrid<I, Normal> {
        &self.grid
    }

    /// Direct voxel access. Cached features stay valid; edits are uploaded
    /// through the buffers' versions.
    pub fn grid_mut(&mut self) -> &mut VolumeGrid<I, Normal> {
        &mut self.grid
    }

    #[must_use]
    pub fn intensities_role(&self) -> u32 {
        self.intensities_role
    }

    /// Role of the intensity feature on nodes created from now on.
    pub fn set_intensities_role(&mut self, role: u32) {
        self.intensities_role = role;
    }

    #[must_use]
    pub fn normals_role(&self) -> u32 {
        self.normals_role
    }

    pub fn set_normals_role(&mut self, role: u32) {
        self.normals_role = role;
    }

    /// Fills every voxel with `voxel_at(global coordinate)`, one segment at
    /// a time, then recomputes the normals if the grid has them.
    ///
    /// Nodes created before keep their features; the new data reaches them
    /// because they share the segments' buffers.
    pub fn populate(&mut self, mut voxel_at: impl FnMut(UVec3) -> I) -> Result<()> {
        let started = Instant::now();
        for segment in self.grid.segments() {
            let offset = segment.offset();
            let size = segment.size();
            let mut buffer = segment.intensities().write();
            let mut voxels = buffer.voxels_mut();
            let mut index = 0;
            for z in 0..size.z {
                for y in 0..size.y {
                    for x in 0..size.x {
                        voxels[index] = voxel_at(offset + UVec3::new(x, y, z));
                        index += 1;
                    }
                }
            }
        }

        if self.grid.has_normals() {
            compute_normals(&self.grid)?;
        }
        self.release_geometry_features();

        let counts = self.grid.segment_counts();
        log::debug!(
            "Computed {}-bit grid data using {}×{}×{} segments in {:.1?}",
            I::BYTES * 8,
            counts.x,
            counts.y,
            counts.z,
            started.elapsed()
        );
        Ok(())
    }

    /// Fills the volume from intensities in `[0, 1]`.
    pub fn load_intensities(&mut self, mut intensity_at: impl FnMut(UVec3) -> f32) -> Result<()> {
        self.populate(|coord| I::from_intensity(intensity_at(coord)))
    }

    /// Ends the helper's ownership of the segment features. Nodes created
    /// later get fresh features.
    pub fn release_geometry_features(&mut self) {
        for features in &mut self.features {
            *features = SegmentFeatures::default();
        }
    }

    /// Creates the pivot node of the volume under `parent`, with one
    /// geometry of `geometry_type` per segment.
    pub fn create_node(
        &mut self,
        scene: &mut Scene,
        parent: NodeHandle,
        geometry_type: u32,
        dimensions: Dimensions,
    ) -> Result<NodeHandle> {
        let resolution = self.native_resolution.as_vec3();
        let spacing = match dimensions {
            Dimensions::Spacing(spacing) => spacing,
            Dimensions::Extent(extent) => extent / resolution,
        };
        if !(spacing.is_finite() && spacing.cmpgt(Vec3::ZERO).all()) {
            return Err(VolumetraError::Configuration(format!(
                "voxel spacing {spacing} must be positive and finite"
            )));
        }
        let extent = resolution * spacing;

        let pivot = scene
            .build_node()
            .with_tag("volume")
            .with_parent(parent)
            .with_position(-extent / 2.0)
            .with_movable(false)
            .build()?;

        for (segment, cached) in self.grid.segments().zip(self.features.iter_mut()) {
            let features = cached.by_role(segment, self.intensities_role, self.normals_role);
            let size = segment.size().as_vec3();
            let center = (segment.offset().as_vec3() + size / 2.0) * spacing;

            let mut builder = scene
                .build_geometry(geometry_type)
                .with_tag(&format!("segment {}", segment.coord()))
                .with_parent(pivot)
                .with_position(center)
                .with_scale(size * spacing)
                .with_movable(false);
            for (role, feature) in features {
                builder = builder.with_feature(role, feature);
            }
            builder.build()?;
        }
        Ok(pivot)
    }

    /// Puts this helper's segment features onto the segments below `pivot`,
    /// a node created by a helper with the same partitioning. Used to layer
    /// a mask over an intensity volume:
    ///
    /// ```rust,ignore
    /// let mut mask = VolumeGridHelper::<u8>::new(resolution, budget, false)?;
    /// mask.set_intensities_role(VolumeRenderer::ROLE_MASK);
    /// mask.load_intensities(|coord| f32::from(inside(coord)))?;
    /// mask.put_features(&mut scene, pivot)?;
    /// ```
    pub fn put_features(&mut self, scene: &mut Scene, pivot: NodeHandle) -> Result<()> {
        let children = scene.children(pivot).to_vec();
        if children.len() != self.features.len() {
            return Err(VolumetraError::Configuration(format!(
                "node has {} children but the volume has {} segments",
                children.len(),
                self.features.len()
            )));
        }

        for ((segment, cached), child) in self.grid.segments().zip(self.features.iter_mut()).zip(children) {
            let tag = format!("segment {}", segment.coord());
            let geometry = scene
                .get_mut(child)
                .filter(|spatial| spatial.tag == tag)
                .and_then(|spatial| spatial.as_geometry_mut())
                .ok_or_else(|| VolumetraError::Configuration(format!("no geometry tagged '{tag}' below the pivot")))?;
            for (role, feature) in cached.by_role(segment, self.intensities_role, self.normals_role) {
                geometry.put_feature(role, feature);
            }
        }
        Ok(())
    }
}

impl VolumeGridHelper<Hounsfield> {
    /// Fills the volume from Hounsfield units; values outside
    /// `[-1024, 3071]` are clamped.
    pub fn load_hounsfield(&mut self, mut hu_at: impl FnMut(UVec3) -> i16) -> Result<()> {
        self.populate(|coord| Hounsfield::new(hu_at(coord)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_change_repartitions() {
        let helper = VolumeGridHelper::<u8>::new(UVec3::splat(10), 64, false).unwrap();
        assert_eq!(helper.grid().segment_counts(), UVec3::splat(3));
        assert_eq!(helper.grid().segment_extent(), UVec3::splat(4));

        let helper = helper.with_policy(PartitionPolicy::Balanced).unwrap();
        assert_eq!(helper.grid().segment_counts(), UVec3::splat(3));
        assert_eq!(helper.features.len(), 27);
    }

    #[test]
    fn rejects_degenerate_spacing() {
        let mut helper = VolumeGridHelper::<u8>::new(UVec3::splat(4), 64, false).unwrap();
        let mut scene = Scene::new();
        let root = scene.root();
        assert!(matches!(
            helper.create_node(&mut scene, root, 1, Dimensions::Spacing(Vec3::new(1.0, 0.0, 1.0))),
            Err(VolumetraError::Configuration(_))
        ));
    }
}
