use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub codes: CodeConfig,
    pub idempotency: IdempotencyConfig,
    pub node: NodeConfig,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Path prefixes excluded from idempotency protection
    pub exempt_paths: Vec<String>,
    /// Captured bodies above this size are served but never cached
    pub max_body_bytes: usize,
    pub missing_key_policy: MissingKeyPolicy,
    /// How long a captured response stays replayable
    pub ttl_seconds: u64,
}

/// What to do with a protected request that carries no idempotency key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MissingKeyPolicy {
    /// Run the request unprotected
    Passthrough,
    /// Reject with a client error
    #[default]
    Reject,
}

#[derive(Debug, Clone)]
pub struct CodeConfig {
    pub code_ttl_seconds: u64,
    /// Minimum gap between two send-code requests for one phone
    pub send_frequency_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub refresh_ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            exempt_paths: Vec::new(),
            max_body_bytes: 1024 * 1024,
            missing_key_policy: MissingKeyPolicy::Reject,
            ttl_seconds: 3600, // 1 hour
        }
    }
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            code_ttl_seconds: 600, // 10 minutes
            send_frequency_seconds: 60,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_seconds: 3600,        // 1 hour
            cleanup_interval_seconds: 60,
            refresh_ttl_seconds: 2_592_000, // 30 days
        }
    }
}

impl IdempotencyConfig {
    /// Whether a request path is excluded from protection
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let missing_key_policy = std::env::var("IDEMPOTENCY_MISSING_KEY")
            .ok()
            .map(|s| match s.to_lowercase().as_str() {
                "passthrough" => MissingKeyPolicy::Passthrough,
                _ => MissingKeyPolicy::Reject,
            })
            .unwrap_or_default();

        let exempt_paths: Vec<String> = std::env::var("IDEMPOTENCY_EXEMPT_PATHS")
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            codes: CodeConfig {
                code_ttl_seconds: env_u64("CODE_TTL_SECONDS", 600),
                send_frequency_seconds: env_u64("CODE_SEND_FREQUENCY_SECONDS", 60),
            },
            idempotency: IdempotencyConfig {
                exempt_paths,
                max_body_bytes: env_u64("IDEMPOTENCY_MAX_BODY_BYTES", 1024 * 1024) as usize,
                missing_key_policy,
                ttl_seconds: env_u64("IDEMPOTENCY_TTL_SECONDS", 3600),
            },
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            tokens: TokenConfig {
                access_ttl_seconds: env_u64("ACCESS_TTL_SECONDS", 3600),
                cleanup_interval_seconds: env_u64("CLEANUP_INTERVAL_SECONDS", 60),
                refresh_ttl_seconds: env_u64("REFRESH_TTL_SECONDS", 2_592_000),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idempotency.ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "IDEMPOTENCY_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.idempotency.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "IDEMPOTENCY_MAX_BODY_BYTES must be greater than 0".to_string(),
            ));
        }
        if self.codes.code_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "CODE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.tokens.access_ttl_seconds >= self.tokens.refresh_ttl_seconds {
            tracing::warn!(
                "Access token TTL ({}s) is not shorter than refresh token TTL ({}s). \
                 Clients will have no reason to refresh.",
                self.tokens.access_ttl_seconds,
                self.tokens.refresh_ttl_seconds
            );
        }

        Ok(())
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
