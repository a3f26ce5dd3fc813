use std::sync::Arc;

use super::transform::{EngineFault, TransformEngine};
use crate::params::store::ParameterSnapshot;
use crate::params::voice::VoiceSelection;

/// Outcome of transforming one filled region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionReport {
    pub emitted: usize,
    pub dropped: usize,
    pub first_fault: Option<EngineFault>,
}

/// Feeds filled regions through the engine, block by block, in place.
pub struct TransformInvoker {
    engine: Arc<dyn TransformEngine>,
    block_length: usize,
}

impl TransformInvoker {
    pub fn new(engine: Arc<dyn TransformEngine>, block_length: usize) -> Self {
        Self {
            engine,
            block_length,
        }
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    /// Push the voice selection to the engine. Must precede `transform`.
    pub fn apply_selection(&self, selection: &VoiceSelection) -> Result<(), EngineFault> {
        match selection {
            VoiceSelection::Single(id) => self.engine.select_voice(*id),
            VoiceSelection::Blend { ids, weights } => self.engine.select_voices(ids, weights),
        }
    }

    /// Transform a region holding a whole number of blocks.
    ///
    /// `emit` is called with the block index and samples of each block the
    /// engine transformed successfully. A failed selection drops the whole
    /// region; a failed transform drops only that block.
    pub fn process<F>(&self, region: &mut [f32], snapshot: &ParameterSnapshot, mut emit: F) -> RegionReport
    where
        F: FnMut(usize, &[f32]),
    {
        let block_count = region.len() / self.block_length;
        let mut report = RegionReport::default();

        let selection = VoiceSelection::from_snapshot(snapshot);
        if let Err(fault) = self.apply_selection(&selection) {
            report.dropped = block_count;
            report.first_fault = Some(fault);
            return report;
        }

        let params = snapshot.engine_params();
        for (index, block) in region.chunks_exact_mut(self.block_length).enumerate() {
            match self.engine.transform(&params, block) {
                Ok(()) => {
                    emit(index, block);
                    report.emitted += 1;
                }
                Err(fault) => {
                    report.dropped += 1;
                    report.first_fault.get_or_insert(fault);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EngineCall, RecordingEngine};

    fn invoker(engine: &Arc<RecordingEngine>) -> TransformInvoker {
        TransformInvoker::new(Arc::clone(engine) as Arc<dyn TransformEngine>, 4)
    }

    fn snapshot(primary: i32, secondary: i32, amount: f32) -> ParameterSnapshot {
        ParameterSnapshot {
            primary_voice: primary,
            secondary_voice: secondary,
            blend_amount: amount,
            ..Default::default()
        }
    }

    #[test]
    fn single_voice_when_secondary_disabled() {
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        let mut region = vec![0.5; 4];

        invoker(&engine).process(&mut region, &snapshot(2, -1, 0.5), |_, _| {});

        let calls = engine.calls();
        assert_eq!(calls[0], EngineCall::SelectVoice(2));
        assert!(!calls.iter().any(|c| matches!(c, EngineCall::SelectVoices(..))));
    }

    #[test]
    fn weighted_selection_precedes_transform() {
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        let mut region = vec![0.5; 8];

        invoker(&engine).process(&mut region, &snapshot(1, 3, 0.25), |_, _| {});

        let calls = engine.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], EngineCall::SelectVoices(vec![1, 3], vec![0.75, 0.25]));
        assert!(matches!(calls[1], EngineCall::Transform { frames: 4, .. }));
        assert!(matches!(calls[2], EngineCall::Transform { frames: 4, .. }));
    }

    #[test]
    fn transforms_in_place_per_block() {
        // RecordingEngine scales by input_gain × output_gain
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        let mut region: Vec<f32> = (1..=8).map(|i| i as f32).collect();
        let snap = ParameterSnapshot {
            input_gain: 3.0,
            output_gain: 0.5,
            secondary_voice: -1,
            ..Default::default()
        };
        let mut seen = Vec::new();

        let report = invoker(&engine).process(&mut region, &snap, |i, b| seen.push((i, b.to_vec())));

        assert_eq!(report.emitted, 2);
        assert_eq!(seen[0], (0, vec![1.5, 3.0, 4.5, 6.0]));
        assert_eq!(seen[1].0, 1);
        assert_eq!(region[7], 12.0);
    }

    #[test]
    fn params_passed_in_engine_order() {
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        let mut region = vec![0.0; 4];
        let snap = ParameterSnapshot {
            pitch_shift: 0.25,
            pitch_snap: 0.5,
            secondary_voice: -1,
            ..Default::default()
        };

        invoker(&engine).process(&mut region, &snap, |_, _| {});

        let EngineCall::Transform { params, .. } = &engine.calls()[1] else {
            panic!("expected transform call");
        };
        assert_eq!(params, &vec![1.0, 1.0, 0.25, 1.0, 0.5]);
    }

    #[test]
    fn failed_selection_drops_region() {
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        engine.fail_call("set_voice", 3);
        let mut region = vec![1.0; 12];
        let mut emitted = 0;

        let report = invoker(&engine).process(&mut region, &snapshot(0, -1, 0.0), |_, _| emitted += 1);

        assert_eq!(emitted, 0);
        assert_eq!(report.dropped, 3);
        assert_eq!(report.first_fault, Some(EngineFault::new("set_voice", 3)));
        assert_eq!(engine.transform_count(), 0);
    }

    #[test]
    fn failed_transform_drops_only_that_block() {
        let engine = Arc::new(RecordingEngine::new(24_000, 4));
        engine.fail_transform_at(1);
        let mut region = vec![1.0; 12];
        let mut indices = Vec::new();

        let report = invoker(&engine).process(&mut region, &snapshot(0, -1, 0.0), |i, _| indices.push(i));

        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.emitted, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.first_fault.map(|f| f.call), Some("process"));
    }
}
