//! Geometry Stages
//!
//! [`GeometryStage`] is the common machinery of stages that draw scene
//! geometries: it owns the stage's [`RenderQueue`], polls it in the stage's
//! [`RenderOrder`], resolves the feature roles every geometry needs into
//! video resources and hands one [`DrawItem`] per geometry to a
//! [`GeometryRenderer`], which issues the actual draw call.
//!
//! # Resource handling
//!
//! The stage keeps one [`VideoResource`] acquisition per feature it draws
//! with. A feature is synced with its CPU-side data at most once per frame.
//! Acquisitions of features that were not drawn in a frame are ended after
//! that frame's pass, so detached geometries free their video memory one
//! frame later.
//!
//! A geometry lacking a required role, or whose feature fails to upload
//! with [`VolumetraError::ResourceAcquisition`], is skipped for the frame.

use glam::Mat4;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{ClearOp, ResourceId};
use crate::renderer::queue::{RenderOrder, RenderQueue, Renderable};
use crate::renderer::stage::{FrameContext, RenderStage, StageCategory, StageState, StageStats};
use crate::resources::feature::{FeatureId, GeometryFeature, VideoResource};
use crate::scene::{NodeHandle, Scene};

/// One geometry ready to be drawn.
pub struct DrawItem<'a> {
    pub renderable: &'a Renderable,
    /// Acquired video resource per resolved role.
    pub resources: &'a [(u32, ResourceId)],
    pub view: Mat4,
    pub projection: Mat4,
}

impl DrawItem<'_> {
    #[must_use]
    pub fn resource(&self, role: u32) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, id)| *id)
    }
}

/// Per-stage draw logic plugged into a [`GeometryStage`].
pub trait GeometryRenderer: 'static {
    /// Roles a geometry must carry to be drawn.
    fn required_roles(&self) -> &[u32];

    /// Roles resolved when present.
    fn optional_roles(&self) -> &[u32] {
        &[]
    }

    /// Clear operation of the stage's pass.
    fn clear(&self) -> ClearOp {
        ClearOp::NONE
    }

    /// Collects anything besides the stage's own queue the renderer draws
    /// with, such as the planes cutting a volume.
    fn update_queues(&mut self, scene: &Scene, root: NodeHandle, view: Mat4) {
        let _ = (scene, root, view);
    }

    /// Called once per pass before the first draw.
    fn begin(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Issues the draw calls of one geometry and returns how many.
    fn draw(&mut self, ctx: &mut FrameContext<'_>, item: &DrawItem<'_>) -> Result<usize>;

    /// Ends acquisitions owned by the renderer itself.
    fn release(&mut self) {}
}

/// A render stage drawing every geometry of one geometry type.
pub struct GeometryStage<R: GeometryRenderer> {
    name: String,
    category: StageCategory,
    state: StageState,
    queue: RenderQueue,
    order: RenderOrder,
    acquired: FxHashMap<FeatureId, VideoResource>,
    used: FxHashSet<FeatureId>,
    renderer: R,
    last_stats: StageStats,
}

impl<R: GeometryRenderer> GeometryStage<R> {
    pub fn new(
        name: impl Into<String>,
        category: StageCategory,
        queue: RenderQueue,
        order: RenderOrder,
        renderer: R,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            state: StageState::default(),
            queue,
            order,
            acquired: FxHashMap::default(),
            used: FxHashSet::default(),
            renderer,
            last_stats: StageStats::default(),
        }
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    #[must_use]
    pub fn order(&self) -> RenderOrder {
        self.order
    }

    pub fn set_order(&mut self, order: RenderOrder) {
        self.order = order;
    }

    /// Number of features the stage currently holds an acquisition of.
    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.acquired.len()
    }

    /// Statistics of the most recent pass.
    #[must_use]
    pub fn last_stats(&self) -> StageStats {
        self.last_stats
    }

    fn draw_queue(&mut self, ctx: &mut FrameContext<'_>, view: Mat4, projection: Mat4) -> Result<StageStats> {
        let Self {
            name,
            queue,
            order,
            acquired,
            used,
            renderer,
            ..
        } = self;
        let name = name.as_str();

        renderer.begin(ctx)?;

        let mut stats = StageStats::default();
        let mut resources: SmallVec<[(u32, ResourceId); 4]> = SmallVec::new();

        'geometries: while let Some(renderable) = queue.poll(*order) {
            resources.clear();

            for &role in renderer.required_roles() {
                let Some(feature) = renderable.feature(role) else {
                    log::debug!(
                        "Stage '{name}' skips {:?}: no feature for role {role}",
                        renderable.geometry()
                    );
                    stats.skipped += 1;
                    continue 'geometries;
                };
                match resolve(acquired, used, feature, ctx) {
                    Ok(id) => resources.push((role, id)),
                    Err(err) => {
                        skip_or_fail(name, renderable, err)?;
                        stats.skipped += 1;
                        continue 'geometries;
                    }
                }
            }
            for &role in renderer.optional_roles() {
                if let Some(feature) = renderable.feature(role) {
                    match resolve(acquired, used, feature, ctx) {
                        Ok(id) => resources.push((role, id)),
                        Err(err) => {
                            skip_or_fail(name, renderable, err)?;
                            stats.skipped += 1;
                            continue 'geometries;
                        }
                    }
                }
            }

            let item = DrawItem {
                renderable,
                resources: &resources,
                view,
                projection,
            };
            match renderer.draw(ctx, &item) {
                Ok(draw_calls) => stats.draw_calls += draw_calls,
                Err(err) => {
                    skip_or_fail(name, renderable, err)?;
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    fn release_unused(&mut self) {
        let before = self.acquired.len();
        let used = &self.used;
        self.acquired.retain(|id, _| used.contains(id));
        let released = before - self.acquired.len();
        if released > 0 {
            log::debug!("Stage '{}' ended {released} unused acquisition(s)", self.name);
        }
    }
}

/// Returns the acquired resource of `feature`, acquiring it on first use and
/// syncing it once per frame.
fn resolve(
    acquired: &mut FxHashMap<FeatureId, VideoResource>,
    used: &mut FxHashSet<FeatureId>,
    feature: &GeometryFeature,
    ctx: &mut FrameContext<'_>,
) -> Result<ResourceId> {
    let id = feature.id();
    let guard = match acquired.entry(id) {
        std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
        std::collections::hash_map::Entry::Vacant(entry) => {
            entry.insert(feature.acquire_video_resource(&mut ctx.upload_context())?)
        }
    };
    if used.insert(id) {
        guard.sync(&mut ctx.upload_context())?;
    }
    Ok(guard.id())
}

fn skip_or_fail(stage: &str, renderable: &Renderable, err: VolumetraError) -> Result<()> {
    if matches!(err, VolumetraError::ResourceAcquisition { .. }) {
        log::warn!(
            "Stage '{stage}' skips geometry {:?} this frame: {err}",
            renderable.geometry()
        );
        Ok(())
    } else {
        Err(err)
    }
}

impl<R: GeometryRenderer> RenderStage for GeometryStage<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> StageCategory {
        self.category
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    fn update_render_queues(&mut self, scene: &Scene, root: NodeHandle, view: Mat4) {
        self.queue.build(scene, root, view);
        self.queue.update_model_view_transforms(view);
        self.renderer.update_queues(scene, root, view);
    }

    fn render_pass(&mut self, ctx: &mut FrameContext<'_>, view: Mat4, projection: Mat4) -> Result<StageStats> {
        self.used.clear();
        ctx.device.begin_pass(&self.name, self.renderer.clear())?;

        let drawn = self.draw_queue(ctx, view, projection);
        let ended = ctx.device.end_pass();
        self.release_unused();

        let stats = drawn?;
        ended?;
        self.last_stats = stats;
        Ok(stats)
    }

    fn release_video_resources(&mut self) {
        self.acquired.clear();
        self.used.clear();
        self.renderer.release();
    }
}
