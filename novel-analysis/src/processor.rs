//! The chunk loop.
//!
//! One step, for the chunk at the cursor:
//!
//! 1. blank chunks are skipped (the index still advances);
//! 2. the cached result is reused, otherwise the analyzer is called and its reply cached;
//! 3. the reply is validated, folded into the context and merged into the project;
//! 4. `analysis_progress` moves past the chunk and the project is saved;
//! 5. at a summary boundary the chapter summary is built (closing a volume every
//!    hundred chapters) and the world-setting and character passes run;
//! 6. the progress tracker records the outcome and may raise a checkpoint.
//!
//! Opening a processor replays the cached results below `analysis_progress`, so a
//! resumed run continues with the exact context the interrupted one held.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::AnalysisConfig,
    context::AccumulatedContext,
    discovery::{ChunkAnalysis, OracleReply},
    error::{AnalysisError, OracleError, Result},
    merge::{merge_analysis, merge_character_profiles, merge_world_setting},
    oracle::{LlmOracle, call_guarded},
    progress::{Checkpoint, ProgressTracker},
    prompts::{PromptCatalog, PromptKind},
    repository::AnalysisRepository,
    segment::{SegmentMode, Segments, count_chunks},
    state::{AnalysisStatus, ProjectState},
};

/// Collaborators shared by the processor and the finalize pass.
pub struct Pipeline<'a, O, R> {
    pub oracle: &'a O,
    pub repo: &'a R,
    pub prompts: &'a PromptCatalog,
    pub cancel: CancellationToken,
}

impl<O, R> Clone for Pipeline<'_, O, R> {
    fn clone(&self) -> Self {
        Self {
            oracle: self.oracle,
            repo: self.repo,
            prompts: self.prompts,
            cancel: self.cancel.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Analyze,
    Shape,
    WorldSetting,
    Characters,
}

/// A recorded, never retried, failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub chunk_index: u64,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Processed {
        index: u64,
        cached: bool,
        checkpoint: Option<Checkpoint>,
    },
    Skipped {
        index: u64,
        checkpoint: Option<Checkpoint>,
    },
    Failed {
        index: u64,
        message: String,
    },
    Cancelled,
    Exhausted,
}

impl StepOutcome {
    fn checkpoint(&self) -> Option<Checkpoint> {
        match self {
            StepOutcome::Processed { checkpoint, .. } | StepOutcome::Skipped { checkpoint, .. } => {
                *checkpoint
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped at a review checkpoint; `checkpoint` chunks are done.
    Paused { checkpoint: u64 },
    /// Every chunk has been visited.
    Completed,
    /// A chunk failed in interactive mode.
    Halted { index: u64, message: String },
    Cancelled,
}

/// Operator view at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewReport {
    pub first_chunk: u64,
    pub last_chunk: u64,
    pub characters: usize,
    pub locations: usize,
    pub items: usize,
    pub recent_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailedStats {
    /// Category → number of facts.
    pub world_setting: BTreeMap<String, usize>,
    pub first_characters: Vec<String>,
    pub recent_errors: Vec<FailureRecord>,
}

pub struct NovelProcessor<'a, O, R> {
    project_id: i64,
    deps: Pipeline<'a, O, R>,
    config: AnalysisConfig,
    text: String,
    mode: SegmentMode,
    segments: Segments,
    total_chunks: u64,
    state: ProjectState,
    context: AccumulatedContext,
    tracker: ProgressTracker,
    errors: Vec<FailureRecord>,
}

impl<'a, O, R> NovelProcessor<'a, O, R>
where
    O: LlmOracle,
    R: AnalysisRepository,
{
    /// Positions the processor at `state.analysis_progress` and rebuilds the context
    /// from the cached results before it.
    #[instrument(level = "debug", skip_all, fields(project_id = project_id))]
    pub fn open(
        project_id: i64,
        text: String,
        mut state: ProjectState,
        deps: Pipeline<'a, O, R>,
        config: AnalysisConfig,
        mut tracker: ProgressTracker,
    ) -> Result<Self> {
        let mode = config.segment_mode();
        let total_chunks = count_chunks(&text, mode) as u64;
        let start = state.analysis_progress.min(total_chunks);
        state.total_chunks = total_chunks;
        state.analysis_progress = start;

        let cached = deps
            .repo
            .cached_results(project_id, start)
            .map_err(AnalysisError::repository)?;
        let cached: BTreeMap<u64, Value> = cached.into_iter().collect();

        let mut context = AccumulatedContext::default();
        for index in 0..start {
            if let Some(value) = cached.get(&index) {
                match ChunkAnalysis::from_value(value) {
                    Ok(analysis) => context = context.update(&analysis),
                    Err(err) => debug!(chunk = index, %err, "cached result skipped during replay"),
                }
            }
            if is_summary_boundary(&config, index) {
                let summary = context.summarize_chapter(index as usize, summary_span(&config));
                context = context.with_chapter_summary(summary);
            }
        }

        tracker.set_total_chapters(total_chunks)?;
        if tracker.cursor() != start {
            tracker.sync_cursor(start)?;
        }

        info!(
            project_id,
            total_chunks,
            resume_at = start,
            replayed = cached.len(),
            "novel processor opened"
        );

        Ok(Self {
            project_id,
            segments: Segments::resume_at(&text, mode, start as usize),
            deps,
            config,
            text,
            mode,
            total_chunks,
            state,
            context,
            tracker,
            errors: Vec::new(),
        })
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn into_state(self) -> ProjectState {
        self.state
    }

    pub fn context(&self) -> &AccumulatedContext {
        &self.context
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn errors(&self) -> &[FailureRecord] {
        &self.errors
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Index of the chunk the next step will handle.
    pub fn next_index(&self) -> u64 {
        self.segments.next_index() as u64
    }

    /// Marks the project as processing.
    pub fn begin(&mut self) -> Result<()> {
        self.tracker.mark_started();
        self.state.analysis_status = AnalysisStatus::Processing;
        self.save()
    }

    /// Clears a pending review gate.
    pub fn approve(&mut self) -> Result<()> {
        self.tracker.approve()?;
        Ok(())
    }

    /// Performs exactly one chunk step.
    #[instrument(level = "debug", skip(self), fields(project_id = self.project_id))]
    pub async fn process_next(&mut self) -> Result<StepOutcome> {
        if self.deps.cancel.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }
        let Some(chunk) = self.segments.next() else {
            return Ok(StepOutcome::Exhausted);
        };
        let index = chunk.index as u64;

        if chunk.is_blank() {
            debug!(chunk = index, "blank chunk skipped");
            self.finish_index(index).await?;
            let checkpoint = self.tracker.complete_chunk(index, true)?;
            return Ok(StepOutcome::Skipped { index, checkpoint });
        }

        let cached = self
            .deps
            .repo
            .cached_result(self.project_id, index)
            .map_err(AnalysisError::repository)?;
        let (value, from_cache) = match cached {
            Some(value) => (value, true),
            None => match self.analyze(index, &chunk.content).await {
                Ok(value) => {
                    self.deps
                        .repo
                        .store_result(self.project_id, index, &chunk.content, &value)
                        .map_err(AnalysisError::repository)?;
                    (value, false)
                }
                Err(OracleError::Cancelled) => {
                    self.rewind(index);
                    info!(chunk = index, "analysis cancelled");
                    return Ok(StepOutcome::Cancelled);
                }
                Err(err) => return self.fail(index, err.to_string()).await,
            },
        };

        let analysis = match ChunkAnalysis::from_value(&value) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(chunk = index, %err, "analysis ignored");
                self.record(index, FailureStage::Shape, err.to_string());
                ChunkAnalysis::default()
            }
        };

        self.context = std::mem::take(&mut self.context).update(&analysis);
        let merged = merge_analysis(&mut self.state, &analysis, index);
        self.finish_index(index).await?;
        let checkpoint = self.tracker.complete_chunk(index, true)?;

        info!(
            project_id = self.project_id,
            chunk = index,
            total = self.total_chunks,
            cached = from_cache,
            characters_added = merged.characters_added,
            facts_added = merged.facts_added,
            "chunk processed"
        );
        Ok(StepOutcome::Processed {
            index,
            cached: from_cache,
            checkpoint,
        })
    }

    /// Steps until a review checkpoint, completion, a halting failure or cancellation.
    ///
    /// `on_step` sees every outcome together with `(analysis_progress, total_chunks)`.
    pub async fn run<F>(&mut self, mut on_step: F) -> Result<RunOutcome>
    where
        F: FnMut(&StepOutcome, u64, u64),
    {
        if self.tracker.state().needs_review {
            return Ok(RunOutcome::Paused {
                checkpoint: self.tracker.cursor(),
            });
        }
        self.begin()?;

        loop {
            let outcome = self.process_next().await?;
            on_step(&outcome, self.state.analysis_progress, self.total_chunks);

            if let Some(cp) = outcome.checkpoint().filter(|cp| cp.awaiting_review) {
                self.pause()?;
                return Ok(RunOutcome::Paused {
                    checkpoint: cp.processed,
                });
            }
            match outcome {
                StepOutcome::Failed { index, message } if !self.config.auto_approve => {
                    return Ok(RunOutcome::Halted { index, message });
                }
                StepOutcome::Cancelled => {
                    self.pause()?;
                    return Ok(RunOutcome::Cancelled);
                }
                StepOutcome::Exhausted => {
                    info!(project_id = self.project_id, errors = self.errors.len(), "all chunks visited");
                    return Ok(RunOutcome::Completed);
                }
                _ => {}
            }
        }
    }

    /// Summary of the chunks behind the latest checkpoint.
    pub fn review_report(&self) -> ReviewReport {
        let last = self.state.analysis_progress;
        let span = self.tracker.state().review_milestone.max(1);
        let start = self.context.recent_summaries.len().saturating_sub(5);
        ReviewReport {
            first_chunk: last.saturating_sub(span),
            last_chunk: last.saturating_sub(1),
            characters: self.state.characters.len(),
            locations: self.state.exploration.areas.len(),
            items: self.state.items.items.len(),
            recent_events: self.context.recent_summaries[start..]
                .iter()
                .filter_map(|s| s.core_event.clone())
                .collect(),
        }
    }

    pub fn detailed_stats(&self) -> DetailedStats {
        DetailedStats {
            world_setting: self
                .state
                .world_setting
                .iter()
                .map(|(k, v)| (k.clone(), v.as_array().map_or(1, Vec::len)))
                .collect(),
            first_characters: self
                .state
                .characters
                .values()
                .filter_map(|c| c.name.clone())
                .take(10)
                .collect(),
            recent_errors: self.errors[self.errors.len().saturating_sub(5)..].to_vec(),
        }
    }

    /* ----------------------------------------------------------------- */
    /* Step internals                                                    */
    /* ----------------------------------------------------------------- */

    async fn analyze(&self, index: u64, content: &str) -> std::result::Result<Value, OracleError> {
        let user = json!({
            "片段序号": index,
            "片段内容": content,
            "累积上下文": self.context.snapshot(index as usize, self.total_chunks as usize),
        })
        .to_string();
        let reply = self.call(PromptKind::NovelAnalyzer, &user).await?;
        Ok(OracleReply::parse(&reply).into_value())
    }

    async fn call(&self, kind: PromptKind, user: &str) -> std::result::Result<String, OracleError> {
        call_guarded(
            self.deps.oracle,
            &self.deps.cancel,
            self.config.oracle_timeout,
            self.deps.prompts.get(kind),
            &[],
            user,
        )
        .await
    }

    /// Moves progress past `index`, saves, and runs the boundary work.
    async fn finish_index(&mut self, index: u64) -> Result<()> {
        self.state.analysis_progress = index + 1;
        self.save()?;

        if is_summary_boundary(&self.config, index) {
            let summary = self
                .context
                .summarize_chapter(index as usize, summary_span(&self.config));
            debug!(chunk = index, range = %summary.chunk_range, "chapter summary");
            let volumes = self.context.volume_summaries.len();
            self.context = std::mem::take(&mut self.context).with_chapter_summary(summary);
            if let Some(volume) = self.context.volume_summaries.get(volumes) {
                info!(chunk = index, chapters = %volume.chapter_range, "volume summary");
            }

            let changed = self.refresh_world_setting(index).await + self.refresh_characters(index).await;
            if changed > 0 {
                self.save()?;
            }
        }
        Ok(())
    }

    async fn refresh_world_setting(&mut self, index: u64) -> usize {
        if self.context.recent_setting_facts.is_empty() {
            return 0;
        }
        let user = json!({
            "任务类型": "增量更新",
            "当前世界观": self.state.world_setting,
            "新发现的设定": self.context.recent_setting_facts,
        })
        .to_string();
        match self.call(PromptKind::WorldExtractor, &user).await {
            Ok(reply) => match OracleReply::parse(&reply).structured() {
                Some(update) => merge_world_setting(&mut self.state, update),
                None => 0,
            },
            Err(err) => {
                self.record(index, FailureStage::WorldSetting, err.to_string());
                0
            }
        }
    }

    async fn refresh_characters(&mut self, index: u64) -> usize {
        let dynamics = self.context.recent_character_dynamics();
        if dynamics.is_empty() {
            return 0;
        }
        let user = json!({
            "任务类型": "更新角色",
            "当前角色库": self.state.characters,
            "新角色信息": dynamics,
        })
        .to_string();
        match self.call(PromptKind::CharacterAnalyzer, &user).await {
            Ok(reply) => match OracleReply::parse(&reply).structured() {
                Some(update) => merge_character_profiles(&mut self.state, update),
                None => 0,
            },
            Err(err) => {
                self.record(index, FailureStage::Characters, err.to_string());
                0
            }
        }
    }

    async fn fail(&mut self, index: u64, message: String) -> Result<StepOutcome> {
        warn!(project_id = self.project_id, chunk = index, %message, "chunk failed");
        self.record(index, FailureStage::Analyze, message.clone());

        if self.config.auto_approve {
            self.finish_index(index).await?;
            self.tracker.pass_failed_chunk(index)?;
        } else {
            self.tracker.complete_chunk(index, false)?;
            self.rewind(index);
            self.state.analysis_status = AnalysisStatus::Failed;
            self.save()?;
        }
        Ok(StepOutcome::Failed { index, message })
    }

    fn record(&mut self, chunk_index: u64, stage: FailureStage, message: String) {
        self.errors.push(FailureRecord {
            chunk_index,
            stage,
            message,
        });
    }

    fn rewind(&mut self, index: u64) {
        self.segments = Segments::resume_at(&self.text, self.mode, index as usize);
    }

    fn pause(&mut self) -> Result<()> {
        self.state.analysis_status = AnalysisStatus::Paused;
        self.save()
    }

    fn save(&self) -> Result<()> {
        self.deps
            .repo
            .save_project(self.project_id, &self.state)
            .map_err(AnalysisError::repository)
    }
}

/// Chapter mode summarizes after every chunk, fixed-window mode every `summary_interval`.
fn is_summary_boundary(config: &AnalysisConfig, index: u64) -> bool {
    config.chapter_mode || (index + 1) % config.summary_interval.max(1) as u64 == 0
}

fn summary_span(config: &AnalysisConfig) -> usize {
    if config.chapter_mode {
        1
    } else {
        config.summary_interval.max(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ai_llm_service::ChatMessage;

    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::repository::testing::MemoryRepository;

    /// Derives a deterministic analysis from the chunk text.
    #[derive(Default)]
    struct EchoOracle {
        analyzer_calls: AtomicUsize,
    }

    impl LlmOracle for EchoOracle {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatMessage],
            user: &str,
        ) -> std::result::Result<String, OracleError> {
            let input: Value = serde_json::from_str(user).unwrap();
            if input.get("任务类型").is_some() {
                return Ok("{}".into());
            }
            self.analyzer_calls.fetch_add(1, Ordering::SeqCst);
            let content = input["片段内容"].as_str().unwrap();
            Ok(json!({
                "新发现": {
                    "新角色": [{ "名称": content }],
                    "新设定": [{ "类型": "地理", "内容": content }]
                },
                "片段摘要": { "核心事件": content, "角色动态": [content] }
            })
            .to_string())
        }
    }

    const TEXT: &str = "甲乙丙丁戊己庚辛壬癸子丑";

    fn config(auto: bool) -> AnalysisConfig {
        AnalysisConfig {
            chunk_size: 2,
            summary_interval: 3,
            review_interval: 100,
            auto_approve: auto,
            ..AnalysisConfig::default()
        }
    }

    fn open<'a, O: LlmOracle>(
        oracle: &'a O,
        repo: &'a MemoryRepository,
        prompts: &'a PromptCatalog,
        state: ProjectState,
        config: AnalysisConfig,
        tracker: ProgressTracker,
    ) -> NovelProcessor<'a, O, MemoryRepository> {
        let deps = Pipeline {
            oracle,
            repo,
            prompts,
            cancel: CancellationToken::new(),
        };
        NovelProcessor::open(1, TEXT.to_string(), state, deps, config, tracker).unwrap()
    }

    fn auto_tracker() -> ProgressTracker {
        let mut t = ProgressTracker::new(0);
        t.set_auto_mode(true).unwrap();
        t
    }

    #[tokio::test]
    async fn resumed_run_matches_uninterrupted_run() {
        let prompts = PromptCatalog::builtin();

        let full_oracle = EchoOracle::default();
        let full_repo = MemoryRepository::new();
        let mut full = open(&full_oracle, &full_repo, &prompts, ProjectState::new(), config(true), auto_tracker());
        assert_eq!(full.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);

        let oracle = EchoOracle::default();
        let repo = MemoryRepository::new();
        let mut first = open(&oracle, &repo, &prompts, ProjectState::new(), config(true), auto_tracker());
        first.begin().unwrap();
        for _ in 0..4 {
            first.process_next().await.unwrap();
        }
        let context_at_stop = first.context().clone();
        drop(first);

        let saved = repo.project(1).unwrap();
        assert_eq!(saved.analysis_progress, 4);
        let mut resumed = open(&oracle, &repo, &prompts, saved, config(true), auto_tracker());
        assert_eq!(resumed.context(), &context_at_stop);
        assert_eq!(resumed.next_index(), 4);

        assert_eq!(resumed.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(resumed.context(), full.context());
        assert_eq!(resumed.state().characters, full.state().characters);
        assert_eq!(oracle.analyzer_calls.load(Ordering::SeqCst), 6);
        assert_eq!(resumed.context().chapter_summaries.len(), 2);
    }

    #[tokio::test]
    async fn interactive_run_pauses_at_each_checkpoint() {
        let prompts = PromptCatalog::builtin();
        let oracle = EchoOracle::default();
        let repo = MemoryRepository::new();
        let mut tracker = ProgressTracker::new(0);
        tracker.set_review_milestone(2).unwrap();
        let mut p = open(&oracle, &repo, &prompts, ProjectState::new(), config(false), tracker);

        let mut seen = Vec::new();
        let outcome = p.run(|_, done, total| seen.push((done, total))).await.unwrap();
        assert_eq!(outcome, RunOutcome::Paused { checkpoint: 2 });
        assert_eq!(seen, vec![(1, 6), (2, 6)]);
        assert_eq!(p.state().analysis_status, AnalysisStatus::Paused);
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Paused { checkpoint: 2 });

        let report = p.review_report();
        assert_eq!((report.first_chunk, report.last_chunk), (0, 1));
        assert_eq!(report.recent_events, vec!["甲乙", "丙丁"]);

        p.approve().unwrap();
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Paused { checkpoint: 4 });
        p.approve().unwrap();
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Paused { checkpoint: 6 });
        p.approve().unwrap();
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn interactive_failure_halts_and_retries_the_same_chunk() {
        let prompts = PromptCatalog::builtin();
        let mut oracle = ScriptedOracle::new(["{}"]);
        oracle.push_failure("connection reset");
        oracle.fallback = Some("{}".into());
        let repo = MemoryRepository::new();
        let mut p = open(&oracle, &repo, &prompts, ProjectState::new(), config(false), ProgressTracker::new(0));

        let outcome = p.run(|_, _, _| {}).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Halted { index: 1, .. }));
        assert_eq!(p.state().analysis_status, AnalysisStatus::Failed);
        assert_eq!(p.state().analysis_progress, 1);
        assert_eq!(p.next_index(), 1);

        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(p.errors().len(), 1);
        assert_eq!(p.errors()[0].stage, FailureStage::Analyze);
        assert_eq!(repo.cached_count(1), 6);
    }

    #[tokio::test]
    async fn auto_mode_moves_past_failures() {
        let prompts = PromptCatalog::builtin();
        let mut oracle = ScriptedOracle::new(["{}"]);
        oracle.push_failure("boom");
        oracle.fallback = Some("{}".into());
        let repo = MemoryRepository::new();
        let mut p = open(&oracle, &repo, &prompts, ProjectState::new(), config(true), auto_tracker());

        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(p.state().analysis_progress, 6);
        assert_eq!(p.detailed_stats().recent_errors.len(), 1);
        assert_eq!(repo.cached_count(1), 5);
    }

    #[tokio::test]
    async fn auto_mode_failure_on_a_milestone_still_counts_it() {
        let prompts = PromptCatalog::builtin();
        let mut oracle = ScriptedOracle::new(["{}"]);
        oracle.push_failure("boom");
        oracle.fallback = Some("{}".into());
        let repo = MemoryRepository::new();
        let mut tracker = auto_tracker();
        tracker.set_review_milestone(2).unwrap();
        let mut p = open(&oracle, &repo, &prompts, ProjectState::new(), config(true), tracker);

        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(p.tracker().state().reviews_completed, 3);
        assert_eq!(p.tracker().cursor(), 6);
    }

    #[tokio::test]
    async fn raw_and_misshapen_replies_contribute_nothing() {
        let prompts = PromptCatalog::builtin();
        let mut oracle = ScriptedOracle::new(["我不确定", r#"{"新发现": {"新角色": "张三"}}"#]);
        oracle.fallback = Some("{}".into());
        let repo = MemoryRepository::new();
        let mut p = open(&oracle, &repo, &prompts, ProjectState::new(), config(true), auto_tracker());

        p.run(|_, _, _| {}).await.unwrap();
        assert!(p.state().characters.is_empty());
        assert_eq!(
            repo.cached_result(1, 0).unwrap(),
            Some(json!({ "raw_response": "我不确定" }))
        );
        assert_eq!(p.errors().len(), 1);
        assert_eq!(p.errors()[0].stage, FailureStage::Shape);
    }

    #[tokio::test]
    async fn chapter_mode_skips_blank_preface() {
        let prompts = PromptCatalog::builtin();
        let oracle = ScriptedOracle::answering("{}");
        let repo = MemoryRepository::new();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel: CancellationToken::new(),
        };
        let cfg = AnalysisConfig {
            chapter_mode: true,
            auto_approve: true,
            ..AnalysisConfig::default()
        };
        let text = "第1章 开始\n内容A第2章 终结\n内容B".to_string();
        let mut p = NovelProcessor::open(7, text, ProjectState::new(), deps, cfg, auto_tracker()).unwrap();

        assert_eq!(
            p.process_next().await.unwrap(),
            StepOutcome::Skipped {
                index: 0,
                checkpoint: None
            }
        );
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(oracle.call_count(), 2);
        assert_eq!(p.context().chapter_summaries.len(), 3);
    }

    #[tokio::test]
    async fn volume_summaries_survive_replay() {
        let prompts = PromptCatalog::builtin();
        let oracle = ScriptedOracle::answering("{}");
        let repo = MemoryRepository::new();
        let cfg = AnalysisConfig {
            chapter_mode: true,
            auto_approve: true,
            ..AnalysisConfig::default()
        };
        let text: String = (1..=100).map(|i| format!("第{i}章 标题\n内容{i}\n")).collect();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel: CancellationToken::new(),
        };

        let mut full = NovelProcessor::open(3, text.clone(), ProjectState::new(), deps.clone(), cfg.clone(), auto_tracker()).unwrap();
        assert_eq!(full.run(|_, _, _| {}).await.unwrap(), RunOutcome::Completed);
        assert_eq!(full.context().volume_summaries.len(), 1);
        assert_eq!(full.context().volume_summaries[0].chapter_range, "1 - 100");

        let saved = repo.project(3).unwrap();
        let resumed = NovelProcessor::open(3, text, saved, deps, cfg, auto_tracker()).unwrap();
        assert_eq!(resumed.context(), full.context());
    }

    #[tokio::test]
    async fn cancelled_step_leaves_progress_untouched() {
        let prompts = PromptCatalog::builtin();
        let oracle = ScriptedOracle::answering("{}");
        let repo = MemoryRepository::new();
        let cancel = CancellationToken::new();
        let deps = Pipeline {
            oracle: &oracle,
            repo: &repo,
            prompts: &prompts,
            cancel: cancel.clone(),
        };
        let mut p =
            NovelProcessor::open(1, TEXT.into(), ProjectState::new(), deps, config(true), auto_tracker()).unwrap();
        cancel.cancel();
        assert_eq!(p.run(|_, _, _| {}).await.unwrap(), RunOutcome::Cancelled);
        assert_eq!(p.state().analysis_progress, 0);
        assert_eq!(oracle.call_count(), 0);
    }
}
