use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docpipe server.
#[derive(Debug)]
pub struct Config {
    /// LLM backend used by operators that delegate to a model.
    pub llm_provider: LlmProvider,
    /// Model applied when neither operator nor pipeline names one.
    pub default_model: String,
    /// API key for the OpenAI-compatible provider.
    pub openai_api_key: Option<String>,
    /// Base URL override for the OpenAI-compatible provider.
    pub openai_base_url: Option<String>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: Option<String>,
    /// Per-call timeout applied at the LLM transport layer, in seconds.
    pub llm_timeout_secs: u64,
    /// Optional wall-clock budget for a whole run, in seconds.
    pub run_deadline_secs: Option<u64>,
    /// Upper bound on concurrent per-item LLM calls inside map.
    pub map_concurrency: usize,
    /// Persistence backend for pipelines and runs.
    pub store_backend: StoreBackend,
    /// Base URL of the PostgREST backend (required for `rest`).
    pub rest_store_url: Option<String>,
    /// Service-role key for the PostgREST backend (required for `rest`).
    pub rest_store_key: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported LLM backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Hosted OpenAI API or any compatible endpoint.
    OpenAi,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline simulation.
    Simulated,
}

/// Supported persistence backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local maps; state dies with the process.
    Memory,
    /// PostgREST-fronted managed Postgres.
    Rest,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match load_env_optional("DOCPIPE_STORE_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("DOCPIPE_STORE_BACKEND".to_string()))?,
            None => StoreBackend::Memory,
        };

        let rest_store_url = load_env_optional("DOCPIPE_REST_URL");
        let rest_store_key = load_env_optional("DOCPIPE_REST_KEY");
        if store_backend == StoreBackend::Rest {
            if rest_store_url.is_none() {
                return Err(ConfigError::MissingVariable("DOCPIPE_REST_URL".to_string()));
            }
            if rest_store_key.is_none() {
                return Err(ConfigError::MissingVariable("DOCPIPE_REST_KEY".to_string()));
            }
        }

        Ok(Self {
            llm_provider: match load_env_optional("DOCPIPE_LLM_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("DOCPIPE_LLM_PROVIDER".to_string()))?,
                None => LlmProvider::Simulated,
            },
            default_model: load_env_optional("DOCPIPE_DEFAULT_MODEL")
                .unwrap_or_else(|| crate::llm::DEFAULT_MODEL.to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            llm_timeout_secs: parse_optional("DOCPIPE_LLM_TIMEOUT_SECS")?.unwrap_or(60),
            run_deadline_secs: parse_optional("DOCPIPE_RUN_DEADLINE_SECS")?,
            map_concurrency: parse_optional("DOCPIPE_MAP_CONCURRENCY")?.unwrap_or(4),
            store_backend,
            rest_store_url,
            rest_store_key,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "simulated" => Ok(Self::Simulated),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rest" => Ok(Self::Rest),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_provider = ?config.llm_provider,
        default_model = %config.default_model,
        store_backend = ?config.store_backend,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
