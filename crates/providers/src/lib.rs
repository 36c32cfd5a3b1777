//! Streaming model transport: wire types, the SSE turn accumulator and the
//! Anthropic Messages client.

pub mod anthropic;
pub mod sse;
pub mod traits;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use traits::{collect_turn, ModelTransport, TransportError, TurnStream};
pub use types::*;
