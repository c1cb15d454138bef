//! Run configuration, read from the environment once per binary and passed down.
use std::time::Duration;

use crate::error::IngestError;
use crate::normalization::MapperOptions;
use crate::util::env::{db_url_prefer_session, env_flag, env_opt, env_parse, env_req};

pub const DEFAULT_MAX_CONNS: u32 = 5;
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 1000;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;
pub const DEFAULT_EMBED_CONCURRENCY: usize = 16;
pub const DEFAULT_EMBED_DELAY_MS: u64 = 1000;
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBED_DIMENSIONS: usize = 1536;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Ok(Self {
            url: db_url_prefer_session()?,
            max_connections: env_parse("DB_MAX_CONNS", DEFAULT_MAX_CONNS).max(1),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub reject_ambiguous_dates: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
            reject_ambiguous_dates: false,
        }
    }
}

impl IngestConfig {
    /// `batch_size` from the command line overrides `INGEST_BATCH_SIZE`.
    pub fn from_env(batch_size: Option<usize>) -> Self {
        Self {
            batch_size: batch_size
                .unwrap_or_else(|| env_parse("INGEST_BATCH_SIZE", DEFAULT_INGEST_BATCH_SIZE))
                .max(1),
            reject_ambiguous_dates: env_flag("INGEST_REJECT_AMBIGUOUS_DATES", false),
        }
    }

    pub fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            reject_ambiguous_dates: self.reject_ambiguous_dates,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub batch_size: usize,
    /// In-flight embedding requests per batch.
    pub concurrency: usize,
    /// Pause between consecutive batches.
    pub delay: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
            delay: Duration::from_millis(DEFAULT_EMBED_DELAY_MS),
        }
    }
}

impl BackfillConfig {
    pub fn from_env(batch_size: Option<usize>) -> Self {
        Self {
            batch_size: batch_size
                .unwrap_or_else(|| env_parse("EMBED_BATCH_SIZE", DEFAULT_EMBED_BATCH_SIZE))
                .max(1),
            concurrency: env_parse("EMBED_CONCURRENCY", DEFAULT_EMBED_CONCURRENCY).max(1),
            delay: Duration::from_millis(env_parse("EMBED_BATCH_DELAY_MS", DEFAULT_EMBED_DELAY_MS)),
        }
    }
}

#[derive(Clone)]
pub struct EmbedderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for EmbedderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Ok(Self {
            api_key: env_req("OPENAI_API_KEY")?,
            base_url: env_opt("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            model: env_opt("EMBED_MODEL").unwrap_or_else(|| DEFAULT_EMBED_MODEL.into()),
            dimensions: env_parse("EMBED_DIMENSIONS", DEFAULT_EMBED_DIMENSIONS),
            timeout_secs: env_parse("EMBED_TIMEOUT_SECS", 30),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_batch_size_wins_and_is_at_least_one() {
        assert_eq!(IngestConfig::from_env(Some(250)).batch_size, 250);
        assert_eq!(IngestConfig::from_env(Some(0)).batch_size, 1);
        assert_eq!(BackfillConfig::from_env(Some(7)).batch_size, 7);
    }

    #[test]
    fn defaults_match_documented_values() {
        let b = BackfillConfig::default();
        assert_eq!(b.batch_size, 100);
        assert_eq!(b.delay, Duration::from_secs(1));
        assert_eq!(IngestConfig::default().batch_size, 1000);
    }

    #[test]
    fn embedder_config_debug_hides_key() {
        let cfg = EmbedderConfig {
            api_key: "sk-secret".into(),
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBED_MODEL.into(),
            dimensions: DEFAULT_EMBED_DIMENSIONS,
            timeout_secs: 30,
        };
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }
}
