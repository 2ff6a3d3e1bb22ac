use std::sync::Mutex;

use anyhow::Result;
use beamcon_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// One progress bar per pipeline stage; stages without a known item count
/// get a spinner.
pub struct BarReporter {
    bar_style: ProgressStyle,
    spinner_style: ProgressStyle,
    current: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bar_style: ProgressStyle::default_bar()
                .template("{msg:24} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
            spinner_style: ProgressStyle::default_spinner().template("{spinner} {msg}")?,
            current: Mutex::new(None),
        })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let bar = match total_items {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(self.bar_style.clone());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(self.spinner_style.clone());
                bar
            }
        };
        bar.set_message(stage.to_string());
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn advance(&self, items_done: usize) {
        if let Ok(current) = self.current.lock() {
            if let Some(bar) = current.as_ref() {
                // Ranks report out of order.
                bar.set_position((items_done as u64).max(bar.position()));
            }
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(bar) = current.take() {
                bar.finish();
            }
        }
    }
}
