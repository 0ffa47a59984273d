//! Process configuration, read once from environment variables.
//!
//! Everything is validated up front so a bad value fails at startup instead
//! of halfway through an index build.

use crate::chunking::ChunkingConfig;
use crate::cleaning::NormalizerOptions;
use crate::embeddings::{
    EmbeddingProvider, LocalEmbedder, LocalEmbeddingConfig, RemoteEmbedder,
    RemoteEmbeddingConfig, DEFAULT_BATCH_SIZE, DEFAULT_LOCAL_DEVICE, DEFAULT_LOCAL_HOST,
    DEFAULT_LOCAL_MODEL, DEFAULT_MAX_LENGTH,
};
use crate::error::ConfigError;
use crate::retriever::ResponseMode;
use crate::synthesis::{LlmConfig, DEFAULT_TEMPERATURE};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_DOCUMENTS_DIR: &str = "./documents";
pub const DEFAULT_STORAGE_DIR: &str = "./storage";
pub const DEFAULT_TOP_K: usize = 5;

/// The embedding backend and its connection details.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingSettings {
    Remote(RemoteEmbeddingConfig),
    Local(LocalEmbeddingConfig),
}

impl EmbeddingSettings {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local(_) => "local",
        }
    }

    pub fn batch_size(&self) -> usize {
        match self {
            Self::Remote(config) => config.batch_size,
            Self::Local(config) => config.batch_size,
        }
    }

    pub fn into_provider(self) -> EmbeddingProvider {
        match self {
            Self::Remote(config) => EmbeddingProvider::Remote(RemoteEmbedder::new(config)),
            Self::Local(config) => EmbeddingProvider::Local(LocalEmbedder::new(config)),
        }
    }
}

/// Language model settings. Only required by commands that synthesize answers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmSettings {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub temperature: f32,
}

impl LlmSettings {
    pub fn is_configured(&self) -> bool {
        self.model.is_some() && self.api_key.is_some() && self.api_base.is_some()
    }

    pub fn resolve(&self) -> Result<LlmConfig, ConfigError> {
        let missing = |key: &'static str| ConfigError::MissingKey {
            key,
            context: "answer synthesis".to_string(),
        };
        Ok(LlmConfig {
            model: self.model.clone().ok_or_else(|| missing("LLM_MODEL_NAME"))?,
            api_key: self.api_key.clone().ok_or_else(|| missing("LLM_API_KEY"))?,
            api_base: self.api_base.clone().ok_or_else(|| missing("LLM_API_BASE"))?,
            temperature: self.temperature,
        })
    }
}

/// Which documents are read and how they are cleaned.
///
/// Needs no embedding credentials, so corpus inspection can use it on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusSettings {
    pub documents_dir: PathBuf,
    pub clean_text: bool,
    pub normalizer: NormalizerOptions,
    pub recursive_load: bool,
}

impl CorpusSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        corpus_settings(&Lookup(&lookup))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub documents_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub response_mode: ResponseMode,
    pub clean_text: bool,
    pub normalizer: NormalizerOptions,
    pub rebuild_on_model_mismatch: bool,
    pub recursive_load: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let embedding = embedding_settings(&env)?;

        let chunking = ChunkingConfig::new(
            env.parse("CHUNK_SIZE", ChunkingConfig::default().chunk_size())?,
            env.parse("CHUNK_OVERLAP", ChunkingConfig::default().chunk_overlap())?,
        )?;

        let top_k = env.parse("TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOP_K",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let response_mode = match env.get("RESPONSE_MODE") {
            None => ResponseMode::default(),
            Some(value) => value
                .parse::<ResponseMode>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "RESPONSE_MODE",
                    value,
                    reason,
                })?,
        };

        let corpus = corpus_settings(&env)?;
        let storage_dir = env
            .get("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        if storage_dir == corpus.documents_dir {
            return Err(ConfigError::InvalidValue {
                key: "STORAGE_DIR",
                value: storage_dir.display().to_string(),
                reason: "must differ from DOCUMENTS_DIR".to_string(),
            });
        }

        let llm = LlmSettings {
            model: env.get("LLM_MODEL_NAME"),
            api_key: env.get("LLM_API_KEY"),
            api_base: match env.get("LLM_API_BASE") {
                Some(base) => Some(validated_url("LLM_API_BASE", base)?),
                None => None,
            },
            temperature: env.parse("LLM_TEMPERATURE", DEFAULT_TEMPERATURE)?,
        };

        Ok(Self {
            embedding,
            llm,
            documents_dir: corpus.documents_dir,
            storage_dir,
            chunking,
            top_k,
            response_mode,
            clean_text: corpus.clean_text,
            normalizer: corpus.normalizer,
            rebuild_on_model_mismatch: env.flag("REBUILD_ON_MODEL_MISMATCH", false)?,
            recursive_load: corpus.recursive_load,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Remote,
    Local,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" | "azure" | "openai" => Ok(Self::Remote),
            "local" | "ollama" | "huggingface" => Ok(Self::Local),
            _ => Err(ConfigError::UnknownProvider {
                value: value.to_string(),
            }),
        }
    }
}

fn corpus_settings(env: &Lookup<'_>) -> Result<CorpusSettings, ConfigError> {
    let defaults = NormalizerOptions::default();
    let min_header_repetition =
        env.parse("MIN_HEADER_REPETITION", defaults.min_header_repetition)?;
    // One occurrence would make every short line a header.
    if min_header_repetition < 2 {
        return Err(ConfigError::InvalidValue {
            key: "MIN_HEADER_REPETITION",
            value: min_header_repetition.to_string(),
            reason: "must be at least 2".to_string(),
        });
    }

    Ok(CorpusSettings {
        documents_dir: env
            .get("DOCUMENTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENTS_DIR)),
        clean_text: env.flag("CLEAN_TEXT", true)?,
        normalizer: NormalizerOptions {
            remove_urls: env.flag("REMOVE_URLS", defaults.remove_urls)?,
            normalize_medical: env.flag("NORMALIZE_MEDICAL", defaults.normalize_medical)?,
            min_header_repetition,
        },
        recursive_load: env.flag("RECURSIVE_LOAD", false)?,
    })
}

fn embedding_settings(env: &Lookup<'_>) -> Result<EmbeddingSettings, ConfigError> {
    let kind = match env.get("EMBEDDING_PROVIDER") {
        Some(value) => value.parse::<ProviderKind>()?,
        None => ProviderKind::Remote,
    };
    let batch_size = env.parse("EMBEDDING_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
    if batch_size == 0 {
        return Err(ConfigError::InvalidValue {
            key: "EMBEDDING_BATCH_SIZE",
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    match kind {
        ProviderKind::Remote => {
            let context = || "the remote embedding provider".to_string();
            let api_key = env.require("EMBEDDING_API_KEY", context)?;
            let api_base = env.require("EMBEDDING_API_BASE", context)?;
            let model = env.require("EMBEDDING_MODEL_NAME", context)?;
            Ok(EmbeddingSettings::Remote(RemoteEmbeddingConfig {
                api_base: validated_url("EMBEDDING_API_BASE", api_base)?,
                api_key,
                model,
                batch_size,
            }))
        }
        ProviderKind::Local => {
            let host = env
                .get("EMBEDDING_API_BASE")
                .unwrap_or_else(|| DEFAULT_LOCAL_HOST.to_string());
            Ok(EmbeddingSettings::Local(LocalEmbeddingConfig {
                host: validated_url("EMBEDDING_API_BASE", host)?,
                model: env
                    .get("EMBEDDING_MODEL_NAME")
                    .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
                device: env
                    .get("EMBEDDING_DEVICE")
                    .unwrap_or_else(|| DEFAULT_LOCAL_DEVICE.to_string()),
                max_length: env.parse("EMBEDDING_MAX_LENGTH", DEFAULT_MAX_LENGTH)?,
                batch_size,
            }))
        }
    }
}

fn validated_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        Ok(url) => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(error) => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: error.to_string(),
        }),
    }
}

struct Lookup<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Lookup<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn require(
        &self,
        key: &'static str,
        context: impl Fn() -> String,
    ) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            key,
            context: context(),
        })
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse::<T>()
                .map_err(|error| ConfigError::InvalidValue {
                    key,
                    reason: error.to_string(),
                    value,
                }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key,
                    value,
                    reason: "expected true or false".to_string(),
                }),
            },
        }
    }
}
