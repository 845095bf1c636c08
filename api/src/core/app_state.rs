use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use ai_llm_service::{ChatService, LlmModelConfig, config::default_config::config_with_overrides};
use game_store::Store;
use novel_analysis::{AnalysisConfig, SharedOracle, prompts::PromptCatalog};
use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8000";
pub const DEFAULT_DATABASE_PATH: &str = "data/game.db";
pub const DEFAULT_NOVEL_DIR: &str = "data/novels";

/// Sampling temperature of creative-mode conversations.
pub const CREATIVE_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open database: {0}")]
    Store(#[from] game_store::StoreError),

    #[error("cannot load prompts: {0}")]
    Prompts(#[from] novel_analysis::AnalysisError),
}

/// Turns the resolved LLM config of one request into the oracle that serves it.
pub type OracleFactory =
    Arc<dyn Fn(LlmModelConfig) -> ai_llm_service::Result<SharedOracle> + Send + Sync>;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub prompts: Arc<PromptCatalog>,
    /// Chunking and timeout settings applied to every analysis step.
    pub analysis: AnalysisConfig,
    /// Where uploaded novels are written.
    pub novel_dir: PathBuf,
    oracles: OracleFactory,
}

impl AppState {
    pub fn new(
        store: Store,
        prompts: PromptCatalog,
        analysis: AnalysisConfig,
        novel_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            prompts: Arc::new(prompts),
            analysis,
            novel_dir: novel_dir.into(),
            oracles: Arc::new(|config| Ok(SharedOracle::new(ChatService::new(config)?))),
        }
    }

    /// Replaces the HTTP chat client, e.g. with a scripted oracle.
    pub fn with_oracle_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(LlmModelConfig) -> ai_llm_service::Result<SharedOracle> + Send + Sync + 'static,
    {
        self.oracles = Arc::new(factory);
        self
    }

    /// Load shared state from environment variables.
    ///
    /// - `DATABASE_PATH` (default `data/game.db`)
    /// - `NOVEL_DATA_DIR` (default `data/novels`)
    /// - `PROMPT_DIR`, `CHUNK_SIZE`, `SUMMARY_INTERVAL`, `LLM_TIMEOUT_SECS` via [`AnalysisConfig`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let db = env_or("DATABASE_PATH", DEFAULT_DATABASE_PATH);
        let novel_dir = env_or("NOVEL_DATA_DIR", DEFAULT_NOVEL_DIR);
        let analysis = AnalysisConfig::from_env();
        let prompts = PromptCatalog::from_dir(analysis.prompt_dir.as_deref())?;
        let store = Store::open(Path::new(&db))?;
        Ok(Self::new(store, prompts, analysis, novel_dir))
    }

    /// Oracle for one request. The key in the request wins over the environment;
    /// it is used for this call only and never stored.
    pub fn oracle(
        &self,
        provider: Option<&str>,
        api_key: Option<String>,
    ) -> ai_llm_service::Result<SharedOracle> {
        self.oracle_for(self.llm_config(provider, api_key)?)
    }

    pub fn oracle_for(&self, config: LlmModelConfig) -> ai_llm_service::Result<SharedOracle> {
        (self.oracles)(config)
    }

    pub fn llm_config(
        &self,
        provider: Option<&str>,
        api_key: Option<String>,
    ) -> ai_llm_service::Result<LlmModelConfig> {
        let provider = provider.map(str::trim).filter(|p| !p.is_empty());
        config_with_overrides(provider, api_key)
    }
}

pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
