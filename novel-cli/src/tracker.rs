//! `progress status|approve|complete`.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use novel_analysis::{NextTask, ProgressTracker};

use crate::cli::ProgressCommands;

pub fn run(command: ProgressCommands) -> Result<()> {
    match command {
        ProgressCommands::Status { progress_file } => status(&progress_file),
        ProgressCommands::Approve { progress_file } => {
            let mut tracker = open(&progress_file)?;
            tracker.approve()?;
            println!("{} 已确认检查点, 继续处理", "✔".green());
            Ok(())
        }
        ProgressCommands::Complete {
            count,
            progress_file,
        } => {
            let mut tracker = open(&progress_file)?;
            let checkpoint = tracker.complete_chunk(count - 1, true)?;
            println!("{} 已完成 {count} 个片段", "✔".green());
            if checkpoint.is_some_and(|cp| cp.awaiting_review) {
                println!("{} 到达检查点, 需要确认", "!".yellow());
            }
            Ok(())
        }
    }
}

fn open(path: &Path) -> Result<ProgressTracker> {
    ProgressTracker::load_or_init(path, 0)
        .with_context(|| format!("cannot open progress file {}", path.display()))
}

fn status(path: &Path) -> Result<()> {
    let tracker = open(path)?;
    println!("{}", serde_json::to_string_pretty(tracker.state())?);
    println!();
    println!("下一步: {}", describe(tracker.next_task()));
    Ok(())
}

fn describe(task: NextTask) -> String {
    match task {
        NextTask::Process { chunk_index } => format!("处理片段 {}", chunk_index + 1),
        NextTask::AwaitReview { checkpoint } => {
            format!("等待确认 (已完成 {checkpoint} 个片段)")
        }
        NextTask::Finished => "全部完成".to_string(),
    }
}
