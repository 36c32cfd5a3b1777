//! Server-sent event handling for streamed Messages API responses.
//!
//! The HTTP body is split into SSE events by `eventsource-stream`; each event
//! is folded into a [`TurnAccumulator`], which yields text fragments as they
//! arrive, a [`ToolCall`] once a tool-use block closes, and the finalized
//! [`ModelTurn`] on `message_stop`.

use crate::traits::{TransportError, TurnStream};
use crate::types::{ModelTurn, StreamEvent, ToolCall, Usage};
use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{trace, warn};

/// Longest gap allowed between two SSE events before the turn fails.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    index: usize,
    content_block: StartBlock,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    index: usize,
    delta: BlockDelta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStop {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    delta: MessageDeltaBody,
    #[serde(default)]
    usage: Option<DeltaUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SseError {
    error: SseErrorBody,
}

#[derive(Debug, Deserialize)]
struct SseErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

enum PendingBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
        initial_input: serde_json::Value,
        partial_json: String,
    },
}

fn parse<'a, T: Deserialize<'a>>(event: &str, data: &'a str) -> Result<T, TransportError> {
    serde_json::from_str(data)
        .map_err(|e| TransportError::Parse(format!("invalid {event} event: {e} (data: {data})")))
}

/// Folds SSE events of one model call into stream items and a final turn.
#[derive(Default)]
pub struct TurnAccumulator {
    turn: ModelTurn,
    blocks: HashMap<usize, PendingBlock>,
    complete: bool,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Handle one SSE event and return the stream items it produces.
    pub fn handle(&mut self, event: &str, data: &str) -> Result<Vec<StreamEvent>, TransportError> {
        match event {
            "message_start" => {
                let start: MessageStart = parse(event, data)?;
                if let Some(usage) = start.message.usage {
                    self.turn.usage.input_tokens = usage.input_tokens;
                    self.turn.usage.output_tokens = usage.output_tokens;
                }
                Ok(vec![])
            }
            "content_block_start" => {
                let start: ContentBlockStart = parse(event, data)?;
                let mut items = Vec::new();
                let block = match start.content_block {
                    StartBlock::Text { text } => {
                        if !text.is_empty() {
                            self.turn.text.push_str(&text);
                            items.push(StreamEvent::TextDelta(text));
                        }
                        PendingBlock::Text
                    }
                    StartBlock::ToolUse { id, name, input } => PendingBlock::ToolUse {
                        id,
                        name,
                        initial_input: input,
                        partial_json: String::new(),
                    },
                    StartBlock::Other => return Ok(items),
                };
                self.blocks.insert(start.index, block);
                Ok(items)
            }
            "content_block_delta" => {
                let delta: ContentBlockDelta = parse(event, data)?;
                match (delta.delta, self.blocks.get_mut(&delta.index)) {
                    (BlockDelta::TextDelta { text }, _) => {
                        if text.is_empty() {
                            return Ok(vec![]);
                        }
                        self.turn.text.push_str(&text);
                        Ok(vec![StreamEvent::TextDelta(text)])
                    }
                    (
                        BlockDelta::InputJsonDelta { partial_json: piece },
                        Some(PendingBlock::ToolUse { partial_json, .. }),
                    ) => {
                        partial_json.push_str(&piece);
                        Ok(vec![])
                    }
                    (BlockDelta::InputJsonDelta { .. }, _) => Err(TransportError::Parse(format!(
                        "input_json_delta for unknown block {}",
                        delta.index
                    ))),
                    (BlockDelta::Other, _) => Ok(vec![]),
                }
            }
            "content_block_stop" => {
                let stop: ContentBlockStop = parse(event, data)?;
                match self.blocks.remove(&stop.index) {
                    Some(PendingBlock::ToolUse {
                        id,
                        name,
                        initial_input,
                        partial_json,
                    }) => {
                        let input = if partial_json.trim().is_empty() {
                            if initial_input.is_null() {
                                serde_json::json!({})
                            } else {
                                initial_input
                            }
                        } else {
                            serde_json::from_str(&partial_json).map_err(|e| {
                                TransportError::Parse(format!(
                                    "invalid tool input for {name}: {e}"
                                ))
                            })?
                        };
                        let call = ToolCall { id, name, input };
                        self.turn.tool_calls.push(call.clone());
                        Ok(vec![StreamEvent::ToolCall(call)])
                    }
                    Some(PendingBlock::Text) | None => Ok(vec![]),
                }
            }
            "message_delta" => {
                let delta: MessageDelta = parse(event, data)?;
                if delta.delta.stop_reason.is_some() {
                    self.turn.stop_reason = delta.delta.stop_reason;
                }
                if let Some(usage) = delta.usage {
                    self.turn.usage.output_tokens = usage.output_tokens;
                }
                Ok(vec![])
            }
            "message_stop" => {
                self.complete = true;
                Ok(vec![StreamEvent::Completed(std::mem::take(&mut self.turn))])
            }
            "error" => {
                let err: SseError = parse(event, data)?;
                Err(TransportError::Stream(format!(
                    "{}: {}",
                    err.error.kind, err.error.message
                )))
            }
            // ping and unknown event types
            _ => Ok(vec![]),
        }
    }
}

/// Turn a raw SSE byte stream into a [`TurnStream`]. A gap longer than
/// `idle_timeout` between events ends the stream with a stream error.
pub fn turn_stream<S, B, E>(bytes: S, idle_timeout: Duration) -> TurnStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let events = Box::pin(bytes.eventsource());
    let state = (events, TurnAccumulator::new(), VecDeque::new(), false);

    stream::unfold(
        state,
        move |(mut events, mut acc, mut queue, mut finished)| async move {
            loop {
                if let Some(item) = queue.pop_front() {
                    return Some((Ok(item), (events, acc, queue, finished)));
                }
                if finished {
                    return None;
                }
                let next = match tokio::time::timeout(idle_timeout, events.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        finished = true;
                        warn!("No stream event for {:?}", idle_timeout);
                        let err = TransportError::Stream(format!(
                            "no event received for {}s",
                            idle_timeout.as_secs_f32()
                        ));
                        return Some((Err(err), (events, acc, queue, finished)));
                    }
                };
                match next {
                    Some(Ok(sse)) => {
                        trace!("SSE event {}: {}", sse.event, sse.data);
                        match acc.handle(&sse.event, &sse.data) {
                            Ok(items) => {
                                queue.extend(items);
                                finished = acc.is_complete();
                            }
                            Err(e) => {
                                finished = true;
                                return Some((Err(e), (events, acc, queue, finished)));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        finished = true;
                        let err = TransportError::Stream(format!("SSE error: {e}"));
                        return Some((Err(err), (events, acc, queue, finished)));
                    }
                    None => {
                        finished = true;
                        let err = TransportError::Stream(
                            "stream closed before response completed".to_string(),
                        );
                        return Some((Err(err), (events, acc, queue, finished)));
                    }
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(acc: &mut TurnAccumulator, events: &[(&str, serde_json::Value)]) -> Vec<StreamEvent> {
        events
            .iter()
            .flat_map(|(name, data)| acc.handle(name, &data.to_string()).unwrap())
            .collect()
    }

    #[test]
    fn test_text_only_turn() {
        let mut acc = TurnAccumulator::new();
        let items = feed(
            &mut acc,
            &[
                ("message_start", json!({"type": "message_start", "message": {"usage": {"input_tokens": 12, "output_tokens": 1}}})),
                ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
                ("ping", json!({"type": "ping"})),
                ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "你好"}})),
                ("content_block_delta", json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "！"}})),
                ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
                ("message_delta", json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 7}})),
                ("message_stop", json!({"type": "message_stop"})),
            ],
        );

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], StreamEvent::TextDelta("你好".into()));
        match &items[2] {
            StreamEvent::Completed(turn) => {
                assert_eq!(turn.text, "你好！");
                assert!(turn.tool_calls.is_empty());
                assert_eq!(turn.usage, Usage { input_tokens: 12, output_tokens: 7 });
                assert_eq!(turn.stop_reason.as_deref(), Some("end_turn"));
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(acc.is_complete());
    }

    #[test]
    fn test_tool_use_input_is_assembled_from_fragments() {
        let mut acc = TurnAccumulator::new();
        let items = feed(
            &mut acc,
            &[
                ("content_block_start", json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_9", "name": "read_file", "input": {}}})),
                ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"path\": "}})),
                ("content_block_delta", json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"~/a.txt\"}"}})),
                ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
                ("message_stop", json!({"type": "message_stop"})),
            ],
        );

        assert_eq!(
            items[0],
            StreamEvent::ToolCall(ToolCall {
                id: "toolu_9".into(),
                name: "read_file".into(),
                input: json!({"path": "~/a.txt"}),
            })
        );
        match &items[1] {
            StreamEvent::Completed(turn) => assert_eq!(turn.tool_calls.len(), 1),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_use_without_input_defaults_to_empty_object() {
        let mut acc = TurnAccumulator::new();
        let items = feed(
            &mut acc,
            &[
                ("content_block_start", json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "empty_trash", "input": {}}})),
                ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ],
        );
        match &items[0] {
            StreamEvent::ToolCall(call) => assert_eq!(call.input, json!({})),
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_error_event_fails() {
        let mut acc = TurnAccumulator::new();
        let result = acc.handle(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        match result {
            Err(TransportError::Stream(msg)) => assert!(msg.contains("overloaded_error")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_event_is_parse_error() {
        let mut acc = TurnAccumulator::new();
        let result = acc.handle("content_block_delta", "{not json");
        assert!(matches!(result, Err(TransportError::Parse(_))));
    }

    #[tokio::test]
    async fn test_turn_stream_splits_chunks_across_boundaries() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        // Split mid-event to exercise buffering.
        let (a, b) = body.split_at(70);
        let chunks: Vec<Result<String, std::io::Error>> = vec![Ok(a.to_string()), Ok(b.to_string())];
        let items: Vec<_> = turn_stream(futures::stream::iter(chunks), DEFAULT_IDLE_TIMEOUT).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &StreamEvent::TextDelta("Hi".into()));
        assert!(matches!(items[1], Ok(StreamEvent::Completed(_))));
    }

    #[tokio::test]
    async fn test_turn_stream_truncated_body_is_error() {
        let body = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"x\"}}\n\n";
        let chunks: Vec<Result<String, std::io::Error>> = vec![Ok(body.to_string())];
        let items: Vec<_> = turn_stream(futures::stream::iter(chunks), DEFAULT_IDLE_TIMEOUT).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(TransportError::Stream(_))));
    }

    #[tokio::test]
    async fn test_turn_stream_idle_gap_is_error() {
        let delta = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"x\"}}\n\n";
        let chunks: Vec<Result<String, std::io::Error>> = vec![Ok(delta.to_string())];
        let stalled = futures::stream::iter(chunks).chain(futures::stream::pending());
        let items: Vec<_> = turn_stream(stalled, Duration::from_millis(50)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(TransportError::Stream(msg)) => assert!(msg.contains("no event received")),
            other => panic!("expected idle timeout, got {other:?}"),
        }
    }
}
