//! Progress-callback trait for stage-level pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to follow a
//! run: forward the events to a spinner, a log, or the status column of a
//! paper record. Map phases run concurrently, so `on_unit_error` may be
//! called from several tasks at once.
//!
//! # Example
//!
//! ```rust
//! use paper_digest::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, _stage: Stage, _units: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(StageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::Stage;
use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once, before input validation.
    fn on_pipeline_start(&self, paper_id: i64) {
        let _ = paper_id;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage has written its results.
    ///
    /// # Arguments
    /// * `units`: pages, batches or assets the stage produced
    fn on_stage_complete(&self, stage: Stage, units: usize) {
        let _ = (stage, units);
    }

    /// Called for a non-fatal failure of one unit (a crop or a caption).
    fn on_unit_error(&self, stage: Stage, unit: &str, error: &str) {
        let _ = (stage, unit, error);
    }

    /// Called once, after the final status has been persisted.
    fn on_pipeline_complete(&self, paper_id: i64, succeeded: bool) {
        let _ = (paper_id, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
        unit_errors: AtomicUsize,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_complete(&self, stage: Stage, _units: usize) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_unit_error(&self, _stage: Stage, _unit: &str, _error: &str) {
            self.unit_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_pipeline_start(1);
        cb.on_stage_start(Stage::Split);
        cb.on_stage_complete(Stage::Split, 2);
        cb.on_unit_error(Stage::Crop, "element 3", "empty region");
        cb.on_pipeline_complete(1, true);
    }

    #[test]
    fn recorder_receives_events_through_arc_dyn() {
        let recorder = Arc::new(Recorder::default());
        let cb: ProgressCallback = recorder.clone();

        cb.on_stage_complete(Stage::Split, 1);
        cb.on_stage_complete(Stage::Layout, 1);
        cb.on_unit_error(Stage::MediaCaptions, "equation 4", "timeout");

        assert_eq!(*recorder.stages.lock().unwrap(), vec![Stage::Split, Stage::Layout]);
        assert_eq!(recorder.unit_errors.load(Ordering::SeqCst), 1);
    }
}
