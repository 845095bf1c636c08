//! Rolling context threaded through the chunk loop.
//!
//! [`AccumulatedContext::update`] is the only way the context changes during a run. It
//! is a pure function of the previous context and one [`ChunkAnalysis`], so replaying
//! cached analyses in index order rebuilds exactly the context an uninterrupted run
//! would hold.

use serde::{Deserialize, Serialize};

use crate::discovery::{ChunkAnalysis, ChunkSummary, Discovery, SettingFact};

/// Recent chunk summaries kept for the prompt.
pub const RECENT_SUMMARY_WINDOW: usize = 10;
/// Core events joined into the recent-events line.
pub const RECENT_EVENTS: usize = 5;
/// Setting facts kept for the periodic world-setting extraction.
pub const RECENT_SETTING_FACTS: usize = 20;
/// Characters of each fact remembered as a known world element.
const WORLD_ELEMENT_CHARS: usize = 100;
/// Chapter summaries per volume summary.
pub const VOLUME_INTERVAL: usize = 100;
/// Chapter digests quoted in a volume's plot, and the characters kept of each.
const VOLUME_PLOT_CHAPTERS: usize = 10;
const VOLUME_PLOT_CHARS: usize = 200;

/// Local digest of a range of chunks, built at every summary boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    #[serde(rename = "章节序号")]
    pub sequence: usize,
    #[serde(rename = "片段范围")]
    pub chunk_range: String,
    #[serde(rename = "内容概要")]
    pub digest: String,
    #[serde(rename = "重要事件")]
    pub key_events: Vec<String>,
}

/// Rolled up from the chapter summaries every [`VOLUME_INTERVAL`] chapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSummary {
    #[serde(rename = "卷序号")]
    pub sequence: usize,
    /// 1-based chapter summaries covered, e.g. `101 - 200`.
    #[serde(rename = "章节范围")]
    pub chapter_range: String,
    #[serde(rename = "主要剧情")]
    pub main_plot: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedContext {
    /// Insertion ordered, no duplicates.
    #[serde(rename = "已识别角色")]
    pub known_characters: Vec<String>,
    #[serde(rename = "已知世界观元素")]
    pub known_world_elements: Vec<String>,
    #[serde(rename = "前文摘要")]
    pub recent_events: String,
    #[serde(rename = "片段摘要列表")]
    pub recent_summaries: Vec<ChunkSummary>,
    #[serde(rename = "章节总结列表")]
    pub chapter_summaries: Vec<ChapterSummary>,
    #[serde(rename = "卷总结列表")]
    pub volume_summaries: Vec<VolumeSummary>,
    #[serde(rename = "发现的设定")]
    pub recent_setting_facts: Vec<SettingFact>,
}

/// Coarse position in the story, derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NarrativeStage {
    #[serde(rename = "起")]
    Opening,
    #[serde(rename = "承")]
    Development,
    #[serde(rename = "转")]
    Turn,
    #[serde(rename = "合")]
    Resolution,
}

impl NarrativeStage {
    /// Thresholds at 20 %, 50 % and 80 % of `total`. An unknown total counts as the opening.
    pub fn from_progress(done: usize, total: usize) -> Self {
        if total == 0 {
            return NarrativeStage::Opening;
        }
        // done/total < p  <=>  10*done < 10p*total
        let scaled = done.saturating_mul(10);
        if scaled < total.saturating_mul(2) {
            NarrativeStage::Opening
        } else if scaled < total.saturating_mul(5) {
            NarrativeStage::Development
        } else if scaled < total.saturating_mul(8) {
            NarrativeStage::Turn
        } else {
            NarrativeStage::Resolution
        }
    }
}

/// What the oracle sees of the context for one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot<'a> {
    #[serde(rename = "已识别角色")]
    pub known_characters: &'a [String],
    #[serde(rename = "已知世界观元素")]
    pub known_world_elements: &'a [String],
    #[serde(rename = "前文摘要")]
    pub recent_events: &'a str,
    #[serde(rename = "当前剧情阶段")]
    pub stage: NarrativeStage,
    #[serde(rename = "片段摘要列表")]
    pub recent_summaries: &'a [ChunkSummary],
}

impl AccumulatedContext {
    /// Folds one analysis into the context.
    pub fn update(mut self, analysis: &ChunkAnalysis) -> Self {
        for discovery in analysis.discoveries() {
            match discovery {
                Discovery::Character(c) => {
                    if let Some(name) = c.name.as_deref().filter(|n| !n.is_empty()) {
                        if !self.known_characters.iter().any(|k| k == name) {
                            self.known_characters.push(name.to_string());
                        }
                    }
                }
                Discovery::SettingFact(fact) => {
                    if let Some(text) = fact.content_text() {
                        self.known_world_elements
                            .push(text.chars().take(WORLD_ELEMENT_CHARS).collect());
                    }
                    self.recent_setting_facts.push(fact.clone());
                    keep_last(&mut self.recent_setting_facts, RECENT_SETTING_FACTS);
                }
                Discovery::Summary(summary) => {
                    self.recent_summaries.push(summary.clone());
                    keep_last(&mut self.recent_summaries, RECENT_SUMMARY_WINDOW);
                    self.recent_events = self.joined_recent_events();
                }
                Discovery::Location(_) | Discovery::Item(_) => {}
            }
        }
        self
    }

    /// Replays analyses in index order.
    pub fn replay<'a, I>(analyses: I) -> Self
    where
        I: IntoIterator<Item = &'a ChunkAnalysis>,
    {
        analyses
            .into_iter()
            .fold(Self::default(), |ctx, analysis| ctx.update(analysis))
    }

    /// Digest of the last `span` chunk summaries, ending at `end_index`.
    pub fn summarize_chapter(&self, end_index: usize, span: usize) -> ChapterSummary {
        let span = span.max(1);
        let start = self.recent_summaries.len().saturating_sub(span);
        let recent = &self.recent_summaries[start..];

        let digest = recent
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let details: String = s
                    .details
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(100)
                    .collect();
                format!(
                    "片段{}: {} - {}",
                    i + 1,
                    s.core_event.as_deref().unwrap_or_default(),
                    details
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        ChapterSummary {
            sequence: end_index / span,
            chunk_range: format!("{} - {}", (end_index + 1).saturating_sub(span), end_index),
            digest,
            key_events: recent
                .iter()
                .filter(|s| s.is_key_event())
                .filter_map(|s| s.core_event.clone())
                .collect(),
        }
    }

    /// Appends a chapter summary; every [`VOLUME_INTERVAL`]th one also closes a volume.
    pub fn with_chapter_summary(mut self, summary: ChapterSummary) -> Self {
        self.chapter_summaries.push(summary);
        if self.chapter_summaries.len() % VOLUME_INTERVAL == 0 {
            let volume = self.summarize_volume();
            self.volume_summaries.push(volume);
        }
        self
    }

    /// Volume over the chapters since the previous volume, quoting the latest digests.
    pub fn summarize_volume(&self) -> VolumeSummary {
        let chapters = self.chapter_summaries.len();
        let first = self.volume_summaries.len() * VOLUME_INTERVAL + 1;
        let start = chapters.saturating_sub(VOLUME_PLOT_CHAPTERS);
        VolumeSummary {
            sequence: self.volume_summaries.len(),
            chapter_range: format!("{} - {chapters}", first.min(chapters)),
            main_plot: self.chapter_summaries[start..]
                .iter()
                .map(|c| c.digest.chars().take(VOLUME_PLOT_CHARS).collect())
                .collect(),
        }
    }

    /// Serializable view for the prompt of chunk `done` out of `total`.
    pub fn snapshot(&self, done: usize, total: usize) -> ContextSnapshot<'_> {
        ContextSnapshot {
            known_characters: &self.known_characters,
            known_world_elements: &self.known_world_elements,
            recent_events: &self.recent_events,
            stage: NarrativeStage::from_progress(done, total),
            recent_summaries: &self.recent_summaries,
        }
    }

    /// `角色动态` entries of the recent summaries, oldest first.
    pub fn recent_character_dynamics(&self) -> Vec<serde_json::Value> {
        self.recent_summaries
            .iter()
            .flat_map(|s| s.character_dynamics.iter().cloned())
            .collect()
    }

    fn joined_recent_events(&self) -> String {
        let start = self.recent_summaries.len().saturating_sub(RECENT_EVENTS);
        self.recent_summaries[start..]
            .iter()
            .map(|s| s.core_event.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("；")
    }
}

fn keep_last<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis(v: serde_json::Value) -> ChunkAnalysis {
        ChunkAnalysis::from_value(&v).unwrap()
    }

    fn sample_run() -> Vec<ChunkAnalysis> {
        (0..15)
            .map(|i| {
                analysis(json!({
                    "新发现": {
                        "新角色": [{ "名称": format!("角色{}", i % 4) }, { "名称": "萧炎" }],
                        "新设定": [{ "类型": "地理", "内容": format!("设定{i}") }]
                    },
                    "片段摘要": {
                        "核心事件": format!("事件{i}"),
                        "剧情重要性": if i % 3 == 0 { "高潮" } else { "日常" },
                        "角色动态": [format!("动态{i}")]
                    }
                }))
            })
            .collect()
    }

    #[test]
    fn known_characters_grow_monotonically_without_duplicates() {
        let mut ctx = AccumulatedContext::default();
        let mut last_len = 0;
        for a in sample_run() {
            ctx = ctx.update(&a);
            assert!(ctx.known_characters.len() >= last_len);
            last_len = ctx.known_characters.len();
            let mut sorted = ctx.known_characters.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), ctx.known_characters.len());
        }
        assert_eq!(ctx.known_characters.len(), 5);
        assert_eq!(ctx.known_characters[0], "角色0");
    }

    #[test]
    fn recent_summary_window_is_bounded() {
        let ctx = AccumulatedContext::replay(&sample_run());
        assert_eq!(ctx.recent_summaries.len(), RECENT_SUMMARY_WINDOW);
        assert_eq!(ctx.recent_events, "事件10；事件11；事件12；事件13；事件14");
        assert_eq!(ctx.known_world_elements.len(), 15);
        assert_eq!(ctx.recent_setting_facts.len(), 15);
    }

    #[test]
    fn replay_matches_incremental_run() {
        let run = sample_run();
        let mut live = AccumulatedContext::default();
        for a in &run[..9] {
            live = live.update(a);
        }
        let resumed = AccumulatedContext::replay(&run[..9]);
        assert_eq!(live, resumed);
        assert_eq!(
            serde_json::to_string(&live).unwrap(),
            serde_json::to_string(&resumed).unwrap()
        );
    }

    #[test]
    fn missing_discoveries_leave_characters_untouched() {
        let ctx = AccumulatedContext::default().update(&analysis(json!({ "raw_response": "x" })));
        assert_eq!(ctx, AccumulatedContext::default());
    }

    #[test]
    fn stage_thresholds() {
        assert_eq!(NarrativeStage::from_progress(0, 0), NarrativeStage::Opening);
        assert_eq!(NarrativeStage::from_progress(1, 10), NarrativeStage::Opening);
        assert_eq!(NarrativeStage::from_progress(2, 10), NarrativeStage::Development);
        assert_eq!(NarrativeStage::from_progress(5, 10), NarrativeStage::Turn);
        assert_eq!(NarrativeStage::from_progress(8, 10), NarrativeStage::Resolution);
        let ctx = AccumulatedContext::default();
        let snap = ctx.snapshot(9, 10);
        assert_eq!(serde_json::to_value(&snap).unwrap()["当前剧情阶段"], "合");
    }

    #[test]
    fn chapter_summary_collects_key_events() {
        let ctx = AccumulatedContext::replay(&sample_run()[..10]);
        let summary = ctx.summarize_chapter(9, 10);
        assert_eq!(summary.sequence, 0);
        assert_eq!(summary.chunk_range, "0 - 9");
        assert_eq!(summary.key_events, vec!["事件0", "事件3", "事件6", "事件9"]);
        assert!(summary.digest.starts_with("片段1: 事件0 - "));
        assert_eq!(ctx.recent_character_dynamics().len(), 10);
    }

    #[test]
    fn every_hundredth_chapter_closes_a_volume() {
        let mut ctx = AccumulatedContext::default();
        for i in 0..2 * VOLUME_INTERVAL {
            ctx = ctx.with_chapter_summary(ChapterSummary {
                sequence: i,
                chunk_range: format!("{i} - {i}"),
                digest: format!("第{}章 {}", i + 1, "长".repeat(300)),
                key_events: Vec::new(),
            });
            if i == VOLUME_INTERVAL - 2 {
                assert!(ctx.volume_summaries.is_empty());
            }
        }

        assert_eq!(ctx.volume_summaries.len(), 2);
        let second = &ctx.volume_summaries[1];
        assert_eq!(second.sequence, 1);
        assert_eq!(second.chapter_range, "101 - 200");
        assert_eq!(second.main_plot.len(), 10);
        assert!(second.main_plot[0].starts_with("第191章"));
        assert_eq!(second.main_plot[9].chars().count(), 200);
        assert_eq!(ctx.volume_summaries[0].chapter_range, "1 - 100");
    }
}
