use crate::config::AppConfig;
use anyhow::{Context, Result};
use deskmate_core::{ConversationLoop, LoopSettings, DEFAULT_PERSONA};
use deskmate_memory::{
    LocalMemory, MemoryStore, RemoteMemory, SupabaseConfig, SupabaseMemory, UserProfileStore,
};
use deskmate_providers::{AnthropicClient, AnthropicConfig};
use deskmate_tools::{DesktopTools, PathGuard, SystemTrash, ToolDispatcher, ToolSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// stderr logging filtered by `DESKMATE_LOG` (default `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("DESKMATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Wire memory, tools and transport into a conversation loop.
pub async fn build_engine(config: &AppConfig) -> Result<ConversationLoop> {
    let data_dir = config.data_dir();
    let scope_key = config.scope_key();

    let local = LocalMemory::new(data_dir.join("memory"));
    local
        .initialize()
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let remote: Option<Arc<dyn RemoteMemory>> = config.memory.remote.as_ref().map(|r| {
        let mut supabase = SupabaseConfig::new(r.url.clone(), r.api_key.clone());
        supabase.table = r.table.clone();
        Arc::new(SupabaseMemory::new(supabase)) as Arc<dyn RemoteMemory>
    });
    info!(
        "Memory scope {} ({})",
        scope_key,
        if remote.is_some() { "remote + local" } else { "local only" }
    );

    let memory = Arc::new(MemoryStore::new(
        scope_key,
        local,
        remote,
        Duration::from_secs(config.memory.cache_ttl_secs),
    ));

    let registry = DesktopTools {
        settings: ToolSettings {
            command_timeout: Duration::from_secs(config.tools.command_timeout_secs),
            max_output_bytes: config.tools.max_output_bytes,
        },
        guard: PathGuard::new(),
        memory: memory.clone(),
        profile: Arc::new(UserProfileStore::new(data_dir.join("user_info.json"))),
        trash: SystemTrash::detect(),
        browser: None,
    }
    .into_registry();
    info!("Registered {} tools", registry.len());

    let dispatcher = Arc::new(ToolDispatcher::with_timeout(
        Arc::new(registry),
        Duration::from_secs(config.tools.dispatch_timeout_secs),
    ));

    let api_key = config.api_key().context("No API key configured")?;
    let mut transport_config = AnthropicConfig::new(config.model.base_url.clone(), api_key);
    transport_config.max_retries = config.model.max_retries;
    let transport = Arc::new(AnthropicClient::new(transport_config));

    let settings = LoopSettings {
        model: config.model.model.clone(),
        max_tokens: config.model.max_tokens,
        max_iterations: config.agent.max_iterations,
        persona: config
            .agent
            .persona
            .clone()
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
    };

    Ok(ConversationLoop::new(transport, dispatcher, memory, settings))
}
