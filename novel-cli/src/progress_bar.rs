//! Terminal progress for a processing run.

use indicatif::{ProgressBar, ProgressStyle};
use novel_analysis::StepOutcome;

/// Chunk bar driven by processor step outcomes.
pub struct ChunkBar {
    pb: ProgressBar,
}

impl ChunkBar {
    pub fn new(done: u64, total: u64) -> Self {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_position(done);
        Self { pb }
    }

    /// Moves the bar to `done` and describes the step.
    pub fn step(&self, outcome: &StepOutcome, done: u64) {
        self.pb.set_position(done);
        let msg = match outcome {
            StepOutcome::Processed { index, cached: true, .. } => format!("chunk {index} (cached)"),
            StepOutcome::Processed { index, .. } => format!("chunk {index}"),
            StepOutcome::Skipped { index, .. } => format!("chunk {index} blank"),
            StepOutcome::Failed { index, message } => format!("chunk {index} failed: {message}"),
            StepOutcome::Cancelled => "cancelled".to_string(),
            StepOutcome::Exhausted => "done".to_string(),
        };
        self.pb.set_message(msg);
    }

    /// Leaves the bar on screen so prompts print below it.
    pub fn finish(&self) {
        self.pb.abandon();
    }
}
