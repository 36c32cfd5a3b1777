//! Conversation loop: one user message in, one streamed answer out.

use crate::error::EngineError;
use crate::prompt::{build_system_prompt, Environment, DEFAULT_PERSONA};
use crate::relay::DeltaRelay;
use crate::types::{TurnOutcome, TurnRequest};
use deskmate_memory::MemoryStore;
use deskmate_providers::{
    collect_turn, CompletionRequest, ContentBlock, Message, ModelTransport, Role, ToolResult,
    Usage,
};
use deskmate_tools::ToolDispatcher;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Hard cap on model calls per turn.
    pub max_iterations: usize,
    pub persona: String,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

pub struct ConversationLoop {
    transport: Arc<dyn ModelTransport>,
    dispatcher: Arc<ToolDispatcher>,
    memory: Arc<MemoryStore>,
    settings: LoopSettings,
}

impl ConversationLoop {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        dispatcher: Arc<ToolDispatcher>,
        memory: Arc<MemoryStore>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            memory,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Run one turn. Text fragments are relayed as they stream; tool calls
    /// are dispatched in order between model calls. Hitting the iteration
    /// ceiling returns the text so far with `reached_iteration_ceiling` set.
    pub async fn run(
        &self,
        request: TurnRequest,
        relay: &DeltaRelay,
    ) -> Result<TurnOutcome, EngineError> {
        let memory = self.memory.get().await;
        let registry = self.dispatcher.registry();
        let system = build_system_prompt(
            &self.settings.persona,
            &Environment::current(),
            &registry.summaries(),
            &memory,
        );
        let tools = registry.schemas();

        let mut messages = vec![opening_message(&request)];
        let mut full_text = String::new();
        let mut usage = Usage::default();
        let mut iterations = 0;
        let mut reached_iteration_ceiling = false;

        info!(
            "Starting turn via {} ({} tools)",
            self.transport.name(),
            tools.len()
        );

        while iterations < self.settings.max_iterations {
            iterations += 1;
            debug!("Model call {}/{}", iterations, self.settings.max_iterations);

            let completion = CompletionRequest {
                model: self.settings.model.clone(),
                max_tokens: self.settings.max_tokens,
                system: system.clone(),
                tools: tools.clone(),
                messages: messages.clone(),
                stream: true,
            };

            let stream = self.transport.stream(completion).await.map_err(|e| {
                error!("Model call failed: {}", e);
                e
            })?;
            let turn = collect_turn(stream, |fragment| {
                full_text.push_str(fragment);
                relay.send(fragment, &full_text);
            })
            .await
            .map_err(|e| {
                error!("Model stream failed: {}", e);
                e
            })?;
            usage.add(&turn.usage);

            if turn.tool_calls.is_empty() {
                break;
            }

            messages.push(Message::assistant_tool_calls(&turn.text, &turn.tool_calls));
            for call in &turn.tool_calls {
                info!("Model requested tool: {}", call.name);
                let content = self.dispatcher.invoke(&call.name, call.input.clone()).await;
                messages.push(Message::tool_result(ToolResult {
                    tool_use_id: call.id.clone(),
                    content,
                }));
            }

            if turn.text.is_empty() {
                relay.send("", &full_text);
            }

            if iterations == self.settings.max_iterations {
                warn!(
                    "Iteration ceiling ({}) reached with tool calls pending",
                    self.settings.max_iterations
                );
                reached_iteration_ceiling = true;
            }
        }

        info!(
            "Turn finished after {} model calls ({} in / {} out tokens)",
            iterations, usage.input_tokens, usage.output_tokens
        );

        let memory_update = self.spawn_memory_update(request.text, full_text.clone());

        Ok(TurnOutcome {
            text: full_text,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            iterations,
            reached_iteration_ceiling,
            memory_update,
        })
    }

    fn spawn_memory_update(
        &self,
        user_text: String,
        assistant_text: String,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.memory.clone();
        tokio::spawn(async move {
            let at = chrono::Local::now().naive_local();
            if let Err(e) = store.record_exchange(&user_text, &assistant_text, at).await {
                warn!("Memory update failed: {}", e);
            }
        })
    }
}

fn opening_message(request: &TurnRequest) -> Message {
    let mut content: Vec<ContentBlock> = request
        .attachments
        .iter()
        .map(|attachment| attachment.to_block())
        .collect();
    if !request.text.is_empty() || content.is_empty() {
        content.push(ContentBlock::Text {
            text: request.text.clone(),
        });
    }
    Message::new(Role::User, content)
}
