//! Progress observers injected into the orchestrator.

use super::stage::AnalysisStage;
use crate::progress::{ProgressManager, TEMPLATE_TASKS};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Receives stage lifecycle events. `on_progress` is called from the pool's
/// control loop, once per settled task.
pub trait ProgressObserver: Send + Sync {
    fn on_stage_started(&self, _stage: AnalysisStage, _total: usize) {}

    fn on_progress(&self, _stage: AnalysisStage, _done: usize, _total: usize) {}

    fn on_stage_completed(&self, _stage: AnalysisStage, _duration: Duration) {}

    fn on_stage_skipped(&self, _stage: AnalysisStage, _reason: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Logs stage events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_stage_started(&self, stage: AnalysisStage, total: usize) {
        info!(stage = %stage, total, "stage started");
    }

    fn on_progress(&self, stage: AnalysisStage, done: usize, total: usize) {
        debug!(stage = %stage, done, total, "progress");
    }

    fn on_stage_completed(&self, stage: AnalysisStage, duration: Duration) {
        info!(stage = %stage, "stage completed in {:.2?}", duration);
    }

    fn on_stage_skipped(&self, stage: AnalysisStage, reason: &str) {
        info!(stage = %stage, "stage skipped: {reason}");
    }
}

/// One `indicatif` bar per stage.
pub struct ProgressBarObserver {
    manager: ProgressManager,
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressBarObserver {
    pub fn new(manager: ProgressManager) -> Self {
        Self {
            manager,
            bar: Mutex::new(None),
        }
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_stage_started(&self, stage: AnalysisStage, total: usize) {
        let bar = if total == 0 {
            self.manager.create_spinner(stage.label())
        } else {
            let bar = self.manager.create_bar(total as u64, TEMPLATE_TASKS);
            bar.set_message(stage.label());
            bar
        };
        if let Some(previous) = self.bar.lock().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, _stage: AnalysisStage, done: usize, _total: usize) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.set_position(done as u64);
        }
    }

    fn on_stage_completed(&self, stage: AnalysisStage, duration: Duration) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish_and_clear();
        }
        if self.manager.verbosity() > 0 {
            self.manager
                .println(&format!("✓ {} ({:.2?})", stage.label(), duration));
        }
    }

    fn on_stage_skipped(&self, stage: AnalysisStage, reason: &str) {
        if self.manager.verbosity() > 0 {
            self.manager
                .println(&format!("- {} skipped: {reason}", stage.label()));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    Started { stage: AnalysisStage, total: usize },
    Progress { stage: AnalysisStage, done: usize, total: usize },
    Completed { stage: AnalysisStage },
    Skipped { stage: AnalysisStage, reason: String },
}

/// Captures events, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObserverEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.lock().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_stage_started(&self, stage: AnalysisStage, total: usize) {
        self.events.lock().push(ObserverEvent::Started { stage, total });
    }

    fn on_progress(&self, stage: AnalysisStage, done: usize, total: usize) {
        self.events
            .lock()
            .push(ObserverEvent::Progress { stage, done, total });
    }

    fn on_stage_completed(&self, stage: AnalysisStage, _duration: Duration) {
        self.events.lock().push(ObserverEvent::Completed { stage });
    }

    fn on_stage_skipped(&self, stage: AnalysisStage, reason: &str) {
        self.events.lock().push(ObserverEvent::Skipped {
            stage,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressConfig;

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        observer.on_stage_started(AnalysisStage::Loading, 0);
        observer.on_stage_completed(AnalysisStage::Loading, Duration::from_millis(1));
        observer.on_stage_skipped(AnalysisStage::ComparingPatterns, "not requested");

        assert_eq!(
            observer.events(),
            vec![
                ObserverEvent::Started {
                    stage: AnalysisStage::Loading,
                    total: 0
                },
                ObserverEvent::Completed {
                    stage: AnalysisStage::Loading
                },
                ObserverEvent::Skipped {
                    stage: AnalysisStage::ComparingPatterns,
                    reason: "not requested".into()
                },
            ]
        );
    }

    #[test]
    fn test_progress_bar_observer_in_quiet_mode() {
        let manager = ProgressManager::new(ProgressConfig {
            quiet_mode: true,
            verbosity: 1,
        });
        let observer = ProgressBarObserver::new(manager);
        observer.on_stage_started(AnalysisStage::AnalyzingBlocks, 3);
        observer.on_progress(AnalysisStage::AnalyzingBlocks, 2, 3);
        observer.on_stage_completed(AnalysisStage::AnalyzingBlocks, Duration::ZERO);
        assert!(observer.bar.lock().is_none());
    }
}
