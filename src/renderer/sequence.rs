use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::renderer::stage::RenderStage;

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a stage inside a [`RenderStageSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    fn next() -> Self {
        Self(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct StageEntry {
    id: StageId,
    stage: Box<dyn RenderStage>,
}

/// Ordered list of render stages. Insertion order is execution order.
#[derive(Default)]
pub struct RenderStageSequence {
    stages: Vec<StageEntry>,
}

impl RenderStageSequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `stage`; it runs after every stage appended before it.
    pub fn append_stage(&mut self, stage: impl RenderStage) -> StageId {
        self.append_boxed(Box::new(stage))
    }

    pub fn append_boxed(&mut self, stage: Box<dyn RenderStage>) -> StageId {
        let id = StageId::next();
        log::debug!("Appending stage '{}' as #{}", stage.name(), self.stages.len());
        self.stages.push(StageEntry { id, stage });
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn stage_at(&self, index: usize) -> Option<&dyn RenderStage> {
        self.stages.get(index).map(|entry| entry.stage.as_ref())
    }

    pub fn stage_at_mut(&mut self, index: usize) -> Option<&mut dyn RenderStage> {
        match self.stages.get_mut(index) {
            Some(entry) => Some(entry.stage.as_mut()),
            None => None,
        }
    }

    /// Stages in execution order.
    pub fn stages(&self) -> impl ExactSizeIterator<Item = (StageId, &dyn RenderStage)> {
        self.stages.iter().map(|entry| (entry.id, entry.stage.as_ref()))
    }

    pub(crate) fn stages_mut(&mut self) -> impl Iterator<Item = (StageId, &mut Box<dyn RenderStage>)> {
        self.stages.iter_mut().map(|entry| (entry.id, &mut entry.stage))
    }

    #[must_use]
    pub fn stage_by_id(&self, id: StageId) -> Option<&dyn RenderStage> {
        self.stages
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.stage.as_ref())
    }

    pub fn stage_by_id_mut(&mut self, id: StageId) -> Option<&mut dyn RenderStage> {
        match self.stages.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => Some(entry.stage.as_mut()),
            None => None,
        }
    }

    /// First stage of type `T`.
    #[must_use]
    pub fn find_stage<T: RenderStage>(&self) -> Option<&T> {
        self.stages.iter().find_map(|entry| {
            let stage: &dyn Any = entry.stage.as_ref();
            stage.downcast_ref::<T>()
        })
    }

    pub fn find_stage_mut<T: RenderStage>(&mut self) -> Option<&mut T> {
        self.stages.iter_mut().find_map(|entry| {
            let stage: &mut dyn Any = entry.stage.as_mut();
            stage.downcast_mut::<T>()
        })
    }

    /// Id of the first stage of type `T`.
    #[must_use]
    pub fn find_stage_id<T: RenderStage>(&self) -> Option<StageId> {
        self.stages.iter().find_map(|entry| {
            let stage: &dyn Any = entry.stage.as_ref();
            stage.is::<T>().then_some(entry.id)
        })
    }

    /// Takes a stage out of the sequence. Its acquisitions end when it is dropped.
    pub fn remove_stage(&mut self, id: StageId) -> Option<Box<dyn RenderStage>> {
        let index = self.stages.iter().position(|entry| entry.id == id)?;
        Some(self.stages.remove(index).stage)
    }

    pub fn clear_stages(&mut self) {
        for entry in &mut self.stages {
            entry.stage.release_video_resources();
        }
        self.stages.clear();
    }
}
