use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub memory: MemorySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub api_key: Option<String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: deskmate_core::conversation::DEFAULT_MODEL.to_string(),
            max_tokens: deskmate_core::conversation::DEFAULT_MAX_TOKENS,
            max_retries: 2,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// Replaces the built-in persona when set.
    pub persona: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: deskmate_core::DEFAULT_MAX_ITERATIONS,
            persona: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub command_timeout_secs: u64,
    pub max_output_bytes: usize,
    pub dispatch_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            max_output_bytes: 64 * 1024,
            dispatch_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub data_dir: Option<PathBuf>,
    pub scope_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub remote: Option<RemoteSection>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            data_dir: None,
            scope_key: None,
            cache_ttl_secs: deskmate_memory::DEFAULT_CACHE_TTL.as_secs(),
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSection {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "ai_memory".to_string()
}

impl AppConfig {
    /// `~/.deskmate/config.yaml`
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.yaml")
    }

    /// Load from `path`; a missing or empty file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Invalid YAML")
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay `ANTHROPIC_API_KEY`, `DESKMATE_MODEL`, `DESKMATE_BASE_URL`,
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` as returned by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("DESKMATE_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("DESKMATE_BASE_URL") {
            self.model.base_url = url;
        }

        match (lookup("SUPABASE_URL"), lookup("SUPABASE_ANON_KEY")) {
            (Some(url), Some(api_key)) => {
                let table = self
                    .memory
                    .remote
                    .as_ref()
                    .map(|r| r.table.clone())
                    .unwrap_or_else(default_table);
                self.memory.remote = Some(RemoteSection { url, api_key, table });
            }
            (url, api_key) => {
                if let Some(remote) = self.memory.remote.as_mut() {
                    if let Some(url) = url {
                        remote.url = url;
                    }
                    if let Some(api_key) = api_key {
                        remote.api_key = api_key;
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            bail!("No API key configured: set model.api_key or ANTHROPIC_API_KEY");
        }
        if self.model.base_url.trim().is_empty() {
            bail!("model.base_url must not be empty");
        }
        if self.model.max_tokens == 0 {
            bail!("model.max_tokens must be greater than 0");
        }
        if self.agent.max_iterations == 0 {
            bail!("agent.max_iterations must be greater than 0");
        }
        if self.tools.command_timeout_secs == 0 || self.tools.dispatch_timeout_secs == 0 {
            bail!("tool timeouts must be greater than 0");
        }
        if self.tools.max_output_bytes == 0 {
            bail!("tools.max_output_bytes must be greater than 0");
        }
        if let Some(remote) = &self.memory.remote {
            if remote.url.trim().is_empty() || remote.api_key.trim().is_empty() {
                bail!("memory.remote needs both url and api_key");
            }
        }
        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.memory.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn scope_key(&self) -> String {
        self.memory
            .scope_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(default_scope_key)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deskmate")
}

/// `device:<hostname>`
pub fn default_scope_key() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    format!("device:{}", host)
}
