use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use orrery_core::pipeline::{PipelineStage, ProgressReporter};

/// Draws one progress bar per pipeline stage.
#[derive(Default)]
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                let style = ProgressStyle::default_bar().template("{msg:20} [{bar:40}] {pos}/{len}");
                if let Ok(style) = style {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(stage.to_string());
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = guard.replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn advance(&self, items_done: usize) {
        self.with_bar(|bar| bar.set_position(items_done as u64));
    }

    fn finish_stage(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}
