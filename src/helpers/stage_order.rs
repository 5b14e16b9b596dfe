use crate::renderer::sequence::{RenderStageSequence, StageId};
use crate::renderer::stage::RenderStage;

/// Collects stages in any order and commits them to a
/// [`RenderStageSequence`] sorted by [`StageCategory`](crate::renderer::StageCategory).
///
/// Stages of the same category keep the order they were added in.
///
/// ```rust,ignore
/// let ids = StageOrder::new()
///     .with(VolumeRenderingStage::dvr(GEOMETRY_TYPE_VOLUME)?)
///     .with(MeshRenderingStage::opaque(GEOMETRY_TYPE_OPAQUE))
///     .commit(renderer.sequence_mut(), true);
/// ```
#[derive(Default)]
pub struct StageOrder {
    stages: Vec<Box<dyn RenderStage>>,
}

impl StageOrder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: impl RenderStage) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    #[must_use]
    pub fn with(mut self, stage: impl RenderStage) -> Self {
        self.push(stage);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Drops every collected stage.
    pub fn reset(&mut self) {
        self.stages.clear();
    }

    /// Appends the collected stages to `sequence` in category order and
    /// returns their ids in that order. With `clear`, the sequence's
    /// previous stages are removed first.
    pub fn commit(mut self, sequence: &mut RenderStageSequence, clear: bool) -> Vec<StageId> {
        if clear {
            sequence.clear_stages();
        }
        self.stages.sort_by_key(|stage| stage.category().order());
        for stage in &self.stages {
            log::debug!("Stage '{}' ({})", stage.name(), stage.category().name());
        }
        self.stages
            .into_iter()
            .map(|stage| sequence.append_boxed(stage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::stages::{MeshRenderingStage, VolumeRenderingStage};

    #[test]
    fn commit_sorts_by_category_and_keeps_ties_stable() {
        let mut sequence = RenderStageSequence::new();
        sequence.append_stage(MeshRenderingStage::opaque(9));

        let ids = StageOrder::new()
            .with(VolumeRenderingStage::mip(2).unwrap())
            .with(MeshRenderingStage::transparent(1))
            .with(MeshRenderingStage::opaque(1))
            .with(MeshRenderingStage::opaque(3))
            .commit(&mut sequence, true);

        assert_eq!(ids.len(), 4);
        let names: Vec<_> = sequence.stages().map(|(_, stage)| stage.name().to_owned()).collect();
        assert_eq!(names, ["Opaque", "Opaque", "Transparent", "MIP"]);
        assert_eq!(
            sequence.find_stage::<MeshRenderingStage>().map(|s| s.queue().geometry_type()),
            Some(1)
        );
    }
}
