use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::RunState;

/// Receives run state transitions and per-segment progress.
pub trait ProgressReporter: Send + Sync {
    fn on_state(&self, state: &RunState);

    /// Called after each speech segment completes.
    fn on_segment(&self, completed: usize, total: usize);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn on_state(&self, _state: &RunState) {}

    fn on_segment(&self, _completed: usize, _total: usize) {}
}

/// Terminal progress bar.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_bar(total: usize) -> ProgressBar {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

impl ProgressReporter for ConsoleProgress {
    fn on_state(&self, state: &RunState) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };

        match state {
            RunState::Processing { current: 0, total } => {
                *guard = Some(Self::create_bar(*total));
            }
            RunState::Assembling => {
                if let Some(pb) = guard.as_ref() {
                    pb.finish_with_message("Synthesis complete");
                }
            }
            RunState::Completed | RunState::Failed(_) => {
                if let Some(pb) = guard.take() {
                    if !pb.is_finished() {
                        pb.abandon();
                    }
                }
            }
            _ => {}
        }
    }

    fn on_segment(&self, completed: usize, total: usize) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let pb = guard.get_or_insert_with(|| Self::create_bar(total));
        pb.set_position(completed as u64);
    }
}
