//! Geometry Features
//!
//! A [`GeometryFeature`] is a shareable, GPU-backed asset (volume texture,
//! mesh, material, color map) that any number of geometries may reference.
//!
//! # Acquisition protocol
//!
//! Video memory is managed through an acquisition count:
//!
//! 1. [`GeometryFeature::acquire_video_resource`] uploads the source on the
//!    first acquisition and returns a [`VideoResource`] guard; later
//!    acquisitions reuse the uploaded resource.
//! 2. Dropping a guard ends its acquisition. When the last one ends, the
//!    resource handle is posted to the device's release queue exactly once.
//!
//! The count can never go negative: only guards decrement it, and each guard
//! decrements it once.
//!
//! ```rust,ignore
//! let texture = GeometryFeature::new(VolumeTexture::new(segment.intensities().clone()));
//! let guard = texture.acquire_video_resource(&mut ctx)?;   // uploads
//! let again = texture.acquire_video_resource(&mut ctx)?;   // no-op
//! drop((guard, again));                                     // released once
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{ReleaseQueue, ResourceId, VideoDevice};
use crate::renderer::shader_manager::ShaderManager;

static NEXT_FEATURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a geometry feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u64);

impl FeatureId {
    fn next() -> Self {
        Self(NEXT_FEATURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Collaborators available while uploading video resources.
pub struct UploadContext<'a> {
    pub device: &'a mut dyn VideoDevice,
    pub shaders: &'a mut ShaderManager,
}

/// CPU-side data that can be mirrored into video memory.
pub trait VideoResourceSource: Any + Send + Sync {
    fn label(&self) -> &str;

    /// Creates the video resource.
    fn upload(&self, ctx: &mut UploadContext<'_>) -> Result<ResourceId>;

    /// Version of the CPU-side data; a change triggers [`Self::update`].
    fn version(&self) -> u64 {
        0
    }

    /// Brings `current` up to date with the CPU-side data, returning the
    /// handle that is valid afterwards.
    fn update(&self, ctx: &mut UploadContext<'_>, current: ResourceId) -> Result<ResourceId> {
        let _ = ctx;
        Ok(current)
    }

    /// `false` when the video resource is owned elsewhere and must not be
    /// released with the last acquisition.
    fn owns_video_resource(&self) -> bool {
        true
    }

    /// Identity of the underlying data. Sources of the same type with equal
    /// keys control the same video resource.
    fn data_key(&self) -> usize {
        (self as *const Self).cast::<()>() as usize
    }
}

#[derive(Default)]
struct VideoState {
    acquisitions: usize,
    resource: Option<ResourceId>,
    uploaded_version: u64,
    release_queue: Option<ReleaseQueue>,
}

struct FeatureInner {
    id: FeatureId,
    source: Box<dyn VideoResourceSource>,
    state: Mutex<VideoState>,
}

/// Shared handle to a GPU-backed asset.
///
/// Cloning is cheap and yields a handle to the same feature.
#[derive(Clone)]
pub struct GeometryFeature {
    inner: Arc<FeatureInner>,
}

impl fmt::Debug for GeometryFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryFeature")
            .field("id", &self.inner.id)
            .field("label", &self.label())
            .field("acquisitions", &self.video_resource_acquisitions_count())
            .finish()
    }
}

impl GeometryFeature {
    pub fn new(source: impl VideoResourceSource) -> Self {
        Self {
            inner: Arc::new(FeatureInner {
                id: FeatureId::next(),
                source: Box::new(source),
                state: Mutex::new(VideoState::default()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> FeatureId {
        self.inner.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.inner.source.label()
    }

    #[must_use]
    pub fn source(&self) -> &dyn VideoResourceSource {
        self.inner.source.as_ref()
    }

    /// The source as its concrete type.
    #[must_use]
    pub fn downcast_ref<T: VideoResourceSource>(&self) -> Option<&T> {
        let source: &dyn Any = self.inner.source.as_ref();
        source.downcast_ref::<T>()
    }

    #[must_use]
    pub fn video_resource_acquisitions_count(&self) -> usize {
        self.inner.state.lock().acquisitions
    }

    /// Whether the video resource currently exists.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.inner.state.lock().resource.is_some()
    }

    /// Whether both features are backed by the same video resource.
    #[must_use]
    pub fn controls_same_video_resource(&self, other: &GeometryFeature) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let (a, b): (&dyn Any, &dyn Any) = (self.inner.source.as_ref(), other.inner.source.as_ref());
        a.type_id() == b.type_id() && self.inner.source.data_key() == other.inner.source.data_key()
    }

    /// Starts an acquisition, uploading the source if this is the first one.
    ///
    /// Upload failures surface as [`VolumetraError::ResourceAcquisition`];
    /// shader errors are passed through unchanged.
    pub fn acquire_video_resource(&self, ctx: &mut UploadContext<'_>) -> Result<VideoResource> {
        let mut state = self.inner.state.lock();
        let resource = match state.resource {
            Some(id) => id,
            None => {
                let id = self
                    .inner
                    .source
                    .upload(ctx)
                    .map_err(|err| self.acquisition_error(err))?;
                state.resource = Some(id);
                state.uploaded_version = self.inner.source.version();
                state.release_queue = Some(ctx.device.release_queue());
                log::debug!("Uploaded video resource of '{}' ({id:?})", self.label());
                id
            }
        };
        state.acquisitions += 1;
        Ok(VideoResource {
            feature: self.clone(),
            acquired: resource,
        })
    }

    fn acquisition_error(&self, err: VolumetraError) -> VolumetraError {
        if err.disables_stage() || matches!(err, VolumetraError::ResourceAcquisition { .. }) {
            err
        } else {
            VolumetraError::ResourceAcquisition {
                label: self.label().to_owned(),
                reason: err.to_string(),
            }
        }
    }
}

impl PartialEq for GeometryFeature {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for GeometryFeature {}

/// One acquisition of a feature's video resource.
///
/// Keeps the feature alive; dropping the guard ends the acquisition.
pub struct VideoResource {
    feature: GeometryFeature,
    acquired: ResourceId,
}

impl fmt::Debug for VideoResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoResource")
            .field("feature", &self.feature.id())
            .field("id", &self.id())
            .finish()
    }
}

impl VideoResource {
    /// Current handle of the video resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.feature.inner.state.lock().resource.unwrap_or(self.acquired)
    }

    #[must_use]
    pub fn feature(&self) -> &GeometryFeature {
        &self.feature
    }

    /// Re-uploads the source if its CPU-side data changed since the last
    /// upload. Returns whether anything was uploaded.
    pub fn sync(&self, ctx: &mut UploadContext<'_>) -> Result<bool> {
        let inner = &self.feature.inner;
        let mut state = inner.state.lock();
        let version = inner.source.version();
        let Some(current) = state.resource else {
            return Ok(false);
        };
        if version == state.uploaded_version {
            return Ok(false);
        }

        let id = inner
            .source
            .update(ctx, current)
            .map_err(|err| self.feature.acquisition_error(err))?;
        if id != current
            && inner.source.owns_video_resource()
            && let Some(queue) = &state.release_queue
        {
            queue.release(current);
        }
        state.resource = Some(id);
        state.uploaded_version = version;
        log::debug!("Updated video resource of '{}' to version {version}", inner.source.label());
        Ok(true)
    }
}

impl Drop for VideoResource {
    fn drop(&mut self) {
        let inner = &self.feature.inner;
        let mut state = inner.state.lock();
        state.acquisitions = state.acquisitions.saturating_sub(1);
        if state.acquisitions > 0 {
            return;
        }
        if let Some(id) = state.resource.take() {
            let queue = state.release_queue.take();
            if inner.source.owns_video_resource()
                && let Some(queue) = queue
            {
                queue.release(id);
            }
            log::debug!("Released video resource of '{}' ({id:?})", inner.source.label());
        }
    }
}
