//! `process`: analyze a novel into the project store, then finalize the design.

use std::io;

use ai_llm_service::{ChatService, config::default_config::config_with_overrides};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use game_store::{NewProject, ProjectRecord, Store};
use novel_analysis::{
    AnalysisConfig, NovelProcessor, ProgressTracker, ProjectState, RunOutcome,
    finalize::finalize_design, processor::Pipeline, prompts::PromptCatalog, text::read_novel,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::ProcessArgs,
    progress_bar::ChunkBar,
    review::{self, Decision},
};

pub async fn run(args: ProcessArgs) -> Result<()> {
    let text = read_novel(&args.novel)
        .with_context(|| format!("cannot read novel {}", args.novel.display()))?;

    let mut config = AnalysisConfig::from_env();
    config.chapter_mode = args.chapter_mode;
    config.review_interval = args.review_interval;
    config.auto_approve = args.auto_approve;

    let prompts = PromptCatalog::from_dir(config.prompt_dir.as_deref())?;
    let store = Store::open(&args.files.database)
        .with_context(|| format!("cannot open database {}", args.files.database.display()))?;
    let llm = config_with_overrides(Some(&args.provider), args.api_key.clone())?
        .with_timeout_secs(config.oracle_timeout.as_secs());
    let oracle = ChatService::new(llm)?;

    let project = ensure_project(&store, &args)?;
    let project_id = project.id;
    println!("项目: {} (ID: {project_id})", project.name.bold());

    let state = if args.resume {
        project.state
    } else {
        // Cached chunk analyses survive a restart, so replaying them costs no oracle calls.
        ProjectState::new()
    };

    let mut tracker = ProgressTracker::load_or_init(&args.files.progress_file, 0)?;
    tracker.set_review_milestone(args.review_interval)?;
    tracker.set_auto_mode(args.auto_approve)?;
    if !args.resume {
        tracker.sync_cursor(0)?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let deps = Pipeline {
        oracle: &oracle,
        repo: &store,
        prompts: &prompts,
        cancel,
    };
    let timeout = config.oracle_timeout;
    let mut processor =
        NovelProcessor::open(project_id, text, state, deps.clone(), config, tracker)?;

    loop {
        let bar = ChunkBar::new(processor.state().analysis_progress, processor.total_chunks());
        let outcome = processor.run(|step, done, _| bar.step(step, done)).await;
        bar.finish();

        match outcome? {
            RunOutcome::Paused { checkpoint } => {
                info!(project_id, checkpoint, "waiting for review");
                review::print_report(&mut io::stdout(), &processor.review_report())?;
                let decision = review::ask(&mut io::stdin().lock(), &mut io::stdout(), || {
                    processor.detailed_stats()
                })?;
                match decision {
                    Decision::Approve => processor.approve()?,
                    Decision::Quit => {
                        println!("已暂停, 使用 --resume 继续");
                        return Ok(());
                    }
                }
            }
            RunOutcome::Completed => break,
            RunOutcome::Halted { index, message } => {
                bail!("chunk {index} failed: {message}; rerun with --resume to retry");
            }
            RunOutcome::Cancelled => {
                println!("{} 已取消, 使用 --resume 继续", "!".yellow());
                return Ok(());
            }
        }
    }

    let errors = processor.errors().len();
    if errors > 0 {
        warn!(project_id, errors, "analysis finished with recorded failures");
    }
    println!("{} 小说分析完成, 正在生成游戏设计...", "✔".green());

    let mut state = processor.into_state();
    let report = finalize_design(project_id, &deps, &mut state, timeout).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{} 游戏设计已生成", "✔".green());
    Ok(())
}

/// Reuses the latest project with the same name, creating it on first use.
fn ensure_project(store: &Store, args: &ProcessArgs) -> Result<ProjectRecord> {
    if let Some(project) = store.find_project_by_name(&args.name)? {
        return Ok(project);
    }
    let id = store.create_project(&NewProject {
        name: args.name.clone(),
        description: format!("由 {} 生成", args.novel.display()),
        novel_path: args.novel.display().to_string(),
        chapter_mode: args.chapter_mode,
    })?;
    info!(project_id = id, name = %args.name, "project created");
    Ok(store.get_project(id)?)
}
