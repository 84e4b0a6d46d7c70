use parcelio_core::{BackendBuilder, ChunkBackend, DEFAULT_CHUNK_SIZE, ParcelError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Expose the full catalog as JSON under `/cdn/`.
    #[serde(default)]
    pub cdn_enabled: bool,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Identifier of the storage channel every object is written to.
    #[serde(default = "default_channel")]
    pub channel: String,
}

/// HTTP Basic credentials. Auth is only enforced when both fields are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            root: None,
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Fs,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Memory => "memory",
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_channel() -> String {
    "default".to_string()
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Memory
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cdn_enabled: false,
            auth: None,
            backend: BackendConfig::default(),
            channel: default_channel(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("PARCELIO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ParcelError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ParcelError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(ParcelError::Config("channel cannot be empty".to_string()));
        }

        if self.backend.chunk_size == 0 {
            return Err(ParcelError::Config(
                "backend.chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.backend.kind == BackendKind::Fs && self.backend.root.is_none() {
            return Err(ParcelError::Config(
                "backend.root is required for the fs backend".to_string(),
            ));
        }

        Ok(())
    }

    /// Credentials to enforce, if auth is fully configured.
    pub fn active_auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref().filter(|auth| auth.is_enabled())
    }

    pub fn build_backend(&self) -> Result<Arc<dyn ChunkBackend>> {
        let mut builder = BackendBuilder::new()
            .kind(self.backend.kind.as_str())
            .chunk_size(self.backend.chunk_size);
        if let Some(root) = &self.backend.root {
            builder = builder.root(root.clone());
        }
        builder.build()
    }
}
