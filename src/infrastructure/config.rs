use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::application::{KnowledgeBaseSettings, SynthesisPrompts};
use crate::domain::DomainError;

/// Process-wide configuration, built once at startup and handed to whatever
/// needs it.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub vector_store: VectorStoreConfig,
    pub crews: CrewsConfig,
    pub queue: QueueConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub redis_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            vector_store: VectorStoreConfig::default(),
            crews: CrewsConfig::default(),
            queue: QueueConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Anthropic,
    OpenAi,
}

impl FromStr for LlmProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(DomainError::config(format!("unknown llm provider '{other}'"))),
        }
    }
}

impl LlmProvider {
    /// Environment variable holding the provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local feature hashing, no network calls.
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "text-embedding-3-small".to_string(),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub documents_dir: PathBuf,
    pub persist_dir: PathBuf,
    pub collection: String,
    pub extensions: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        let settings = KnowledgeBaseSettings::default();
        Self {
            documents_dir: settings.documents_dir,
            persist_dir: settings.persist_dir,
            collection: settings.collection,
            extensions: settings.extensions,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            top_k: settings.top_k,
        }
    }
}

impl RagConfig {
    pub fn settings(&self) -> KnowledgeBaseSettings {
        KnowledgeBaseSettings {
            documents_dir: self.documents_dir.clone(),
            persist_dir: self.persist_dir.clone(),
            collection: self.collection.clone(),
            extensions: self.extensions.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub qdrant_url: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::Local,
            qdrant_url: "http://localhost:6334".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrewsConfig {
    pub dir: PathBuf,
    /// Extra attempts a task gets after its output fails a guardrail.
    pub max_retries: usize,
    /// Root directory the file tools may read and write.
    pub workspace_dir: PathBuf,
}

impl Default for CrewsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("config/crews"),
            max_retries: 3,
            workspace_dir: PathBuf::from("./shared/workspace"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub job_ttl_seconds: u64,
    pub concurrency: usize,
    pub poll_timeout_seconds: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_ttl_seconds: 86_400,
            concurrency: 2,
            poll_timeout_seconds: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted `X-API-Key` values. Empty disables the check.
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty or `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub rag: RagPrompts,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    pub system: String,
    pub template: String,
    pub no_context_answer: String,
}

impl Default for RagPrompts {
    fn default() -> Self {
        let prompts = SynthesisPrompts::default();
        Self {
            system: prompts.system,
            template: prompts.template,
            no_context_answer: prompts.no_context_answer,
        }
    }
}

impl PromptsConfig {
    pub fn synthesis(&self) -> SynthesisPrompts {
        SynthesisPrompts {
            system: self.rag.system.clone(),
            template: self.rag.template.clone(),
            no_context_answer: self.rag.no_context_answer.clone(),
        }
    }
}

impl AppConfig {
    /// Reads `config/app.yaml` and `config/prompts.yaml` (relative to
    /// `CONFIG_DIR` when set) and applies environment overrides.
    pub fn from_env() -> Result<Self, DomainError> {
        let dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        let mut config = Self::load(Path::new(&dir))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Missing files fall back to defaults; malformed files are errors.
    pub fn load(dir: &Path) -> Result<Self, DomainError> {
        Ok(Self {
            config: read_yaml(&dir.join("app.yaml"))?.unwrap_or_default(),
            prompts: read_yaml(&dir.join("prompts.yaml"))?.unwrap_or_default(),
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = &mut self.config;

        if let Some(host) = lookup("HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| DomainError::config(format!("PORT must be a number, got '{port}'")))?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            config.vector_store.qdrant_url = url;
        }
        if let Some(dir) = lookup("DOCUMENTS_DIR") {
            config.rag.documents_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PERSIST_DIR") {
            config.rag.persist_dir = PathBuf::from(dir);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(keys) = lookup("API_KEYS") {
            config.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(())
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, DomainError> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| DomainError::config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path()).unwrap();

        assert_eq!(config.config.rag.chunk_size, 512);
        assert_eq!(config.config.rag.chunk_overlap, 50);
        assert_eq!(config.config.rag.top_k, 3);
        assert_eq!(config.config.rag.collection, "internal_docs");
        assert_eq!(config.config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.config.vector_store.backend, VectorStoreBackend::Local);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("app.yaml"),
            "rag:\n  top_k: 5\nllm:\n  provider: anthropic\n  model: claude-sonnet-4-5\n",
        )
        .unwrap();

        let config = AppConfig::load(dir.path()).unwrap().config;

        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.chunk_size, 512);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_malformed_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.yaml"), "rag: [not, a, map]").unwrap();

        assert!(matches!(AppConfig::load(dir.path()), Err(DomainError::Config(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let env = HashMap::from([
            ("PORT", "8080"),
            ("DOCUMENTS_DIR", "/data/docs"),
            ("LLM_PROVIDER", "OpenAI"),
            ("API_KEYS", "alpha, beta,"),
        ]);
        let mut config = AppConfig::default();

        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.config.server.port, 8080);
        assert_eq!(config.config.rag.documents_dir, PathBuf::from("/data/docs"));
        assert_eq!(config.config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.config.auth.api_keys, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "LLM_PROVIDER").then(|| "llama".to_string()))
            .is_err());
    }

    #[test]
    fn test_shipped_config_files_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let config = AppConfig::load(&dir).unwrap();

        assert!(config.config.rag.settings().validate().is_ok());
        assert!(config.prompts.synthesis().template.contains("{context}"));
    }
}
