//! Progress display for flow execution

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use stageflow::{FlowListener, StageStatus};

/// Flow listener drawing one progress bar over all stages
pub struct ProgressListener {
    bar: ProgressBar,
}

impl ProgressListener {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    /// Listener that draws nothing (for `--quiet`)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl FlowListener for ProgressListener {
    fn on_flow_start(&self, _flow_id: &str, stages: usize) {
        self.bar.set_length(stages as u64);
    }

    fn on_stage_start(&self, _stage_id: &str, description: &str) {
        self.bar.set_message(description.to_string());
    }

    fn on_stage_complete(&self, stage_id: &str, status: StageStatus, error: Option<&str>) {
        match status {
            StageStatus::Succeeded => self.bar.inc(1),
            StageStatus::Failed => {
                self.bar.inc(1);
                self.bar.suspend(|| {
                    println!("  {} {} ({})", "✗".red(), stage_id, error.unwrap_or("failed"));
                });
            }
            StageStatus::Cancelled => {
                self.bar
                    .suspend(|| println!("  {} {} rolled back", "↺".yellow(), stage_id));
            }
            StageStatus::CancellationFailed => {
                self.bar.suspend(|| {
                    println!(
                        "  {} {} rollback failed ({})",
                        "✗".red(),
                        stage_id,
                        error.unwrap_or("unknown error")
                    );
                });
            }
            StageStatus::Queued | StageStatus::InProgress => {}
        }
    }

    fn on_flow_complete(&self, _flow_id: &str, _status: StageStatus) {
        self.bar.finish_and_clear();
    }
}
