//! Operator prompt shown at review checkpoints.

use std::io::{BufRead, Write};

use colored::Colorize;
use novel_analysis::processor::{DetailedStats, ReviewReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Quit,
}

pub fn print_report(out: &mut impl Write, report: &ReviewReport) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!(
            "检查点: 片段 {} - {}",
            report.first_chunk + 1,
            report.last_chunk + 1
        )
        .bold()
    )?;
    writeln!(
        out,
        "  角色 {} · 地点 {} · 物品 {}",
        report.characters, report.locations, report.items
    )?;
    if !report.recent_events.is_empty() {
        writeln!(out, "  近期核心事件:")?;
        for event in &report.recent_events {
            writeln!(out, "    - {event}")?;
        }
    }
    Ok(())
}

pub fn print_stats(out: &mut impl Write, stats: &DetailedStats) -> std::io::Result<()> {
    writeln!(out, "{}", "世界观:".bold())?;
    for (category, count) in &stats.world_setting {
        writeln!(out, "  {category}: {count}")?;
    }
    writeln!(out, "{} {}", "角色:".bold(), stats.first_characters.join("、"))?;
    if !stats.recent_errors.is_empty() {
        writeln!(out, "{}", "最近错误:".red().bold())?;
        for err in &stats.recent_errors {
            writeln!(out, "  片段 {} ({:?}): {}", err.chunk_index, err.stage, err.message)?;
        }
    }
    Ok(())
}

/// Asks until the operator answers `y` or `q`; `s` prints `stats` first.
/// End of input counts as `q`.
pub fn ask(
    input: &mut impl BufRead,
    out: &mut impl Write,
    stats: impl Fn() -> DetailedStats,
) -> std::io::Result<Decision> {
    loop {
        write!(out, "继续分析? [y] 继续 / [q] 退出 / [s] 详细统计: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::Quit);
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(Decision::Approve),
            "q" | "quit" => return Ok(Decision::Quit),
            "s" => print_stats(out, &stats())?,
            other => writeln!(out, "无法识别的输入: {other}")?,
        }
    }
}
