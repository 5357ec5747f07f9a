//! Configuration parsing and validation.
//!
//! Configuration is loaded from a TOML file (default: `config/cctx.toml`).
//! Every section is optional and falls back to the defaults below.
//!
//! # Example Configuration
//!
//! ```toml
//! [state]
//! dir = "./data"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [context]
//! max_tokens = 4000
//! model = "gpt-4"
//!
//! [context.tokenizers]
//! "bert-base-uncased" = "./models/bert/tokenizer.json"
//!
//! [indexing]
//! extensions = [".py", ".rs"]
//! service_timeout_secs = 5
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//!
//! [watcher]
//! enabled = true
//! debounce_secs = 2.0
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use code_context_core::budget::FORMATTING_OVERHEAD;

/// One day.
const MAX_DEBOUNCE_SECS: f64 = 86_400.0;
/// One year.
const MAX_CACHE_TTL_SECS: u64 = 365 * 86_400;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where persisted index state and the SQLite database live.
#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl StateConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("cctx.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

/// Token budget for assembled contexts and the tokenizer to count with.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_context_model")]
    pub model: String,
    /// Model id → path of a `tokenizer.json`.
    #[serde(default)]
    pub tokenizers: BTreeMap<String, PathBuf>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            model: default_context_model(),
            tokenizers: BTreeMap::new(),
        }
    }
}

fn default_max_tokens() -> usize {
    4000
}
fn default_context_model() -> String {
    "gpt-4".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_service_timeout_secs")]
    pub service_timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            service_timeout_secs: default_service_timeout_secs(),
        }
    }
}

impl IndexingConfig {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}

pub fn default_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cs", ".cpp", ".h", ".go", ".rs", ".vue",
        ".rb", ".php", ".swift", ".kt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_service_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound for one embedding-backed call, retries included.
    pub fn request_budget(&self) -> Duration {
        self.timeout() * (self.max_retries + 2)
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "paraphrase-multilingual-minilm-l12-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Poll the filesystem instead of using native notifications.
    #[serde(default = "default_true")]
    pub polling: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_secs: default_debounce_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            polling: true,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_debounce_secs() -> f64 {
    2.0
}
fn default_tick_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate context budget
    if config.context.max_tokens <= FORMATTING_OVERHEAD {
        bail!("context.max_tokens must be > {FORMATTING_OVERHEAD}");
    }

    // Validate watcher
    if !config.watcher.debounce_secs.is_finite() || config.watcher.debounce_secs < 0.0 {
        bail!("watcher.debounce_secs must be >= 0");
    }
    if config.watcher.debounce_secs > MAX_DEBOUNCE_SECS {
        bail!("watcher.debounce_secs must be <= {MAX_DEBOUNCE_SECS}");
    }
    if config.watcher.tick_interval_ms == 0 {
        bail!("watcher.tick_interval_ms must be > 0");
    }

    if config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
        bail!("cache.ttl_secs must be <= {MAX_CACHE_TTL_SECS}");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "local" | "openai" | "ollama" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if config.indexing.extensions.is_empty() {
        bail!("indexing.extensions must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.context.max_tokens, 4000);
        assert_eq!(config.context.model, "gpt-4");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.dims, 384);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert!(config.watcher.enabled);
        assert_eq!(config.watcher.debounce(), Duration::from_secs(2));
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(config.indexing.extensions.contains(&".py".to_string()));
        assert_eq!(config.state.db_path(), PathBuf::from("./data/cctx.sqlite"));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse_config(
            r#"
[state]
dir = "/tmp/cctx"

[chunking]
chunk_size = 400
chunk_overlap = 50

[context.tokenizers]
"my-model" = "/models/tokenizer.json"

[embedding]
provider = "hash"
dims = 64
"#,
        )
        .unwrap();
        assert_eq!(config.state.dir, PathBuf::from("/tmp/cctx"));
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(
            config.context.tokenizers.get("my-model"),
            Some(&PathBuf::from("/models/tokenizer.json"))
        );
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dims, 64);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_budget_must_exceed_overhead() {
        assert!(parse_config("[context]\nmax_tokens = 150\n").is_err());
    }

    #[test]
    fn test_huge_debounce_rejected() {
        let err = parse_config("[watcher]\ndebounce_secs = 1e300\n").unwrap_err();
        assert!(err.to_string().contains("watcher.debounce_secs must be <="));
        assert!(parse_config("[watcher]\ndebounce_secs = 86400.0\n").is_ok());
    }

    #[test]
    fn test_huge_ttl_rejected() {
        let err = parse_config("[cache]\nttl_secs = 18446744073709551615\n").unwrap_err();
        assert!(err.to_string().contains("cache.ttl_secs must be <="));
        assert!(parse_config("[cache]\nttl_secs = 31536000\n").is_ok());
    }

    #[test]
    fn test_missing_file_errors() {
        let err = load_config(Path::new("/nonexistent/cctx.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
