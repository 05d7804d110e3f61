//! Protocol translation core for Polyglot
//!
//! Accepts a chat-completion call in one LLM wire protocol, forwards it to
//! an upstream speaking another, and translates the reply back, including
//! live streams. Every protocol converts to and from one canonical model;
//! [`Gateway`] drives a single call end to end.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod codec;
pub mod convert;
pub mod error;
pub mod gateway;
#[cfg(feature = "http")]
pub mod handler;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod resolve;
pub mod routes;
pub mod sigv4;
pub mod types;

pub use adapter::{InboundTransformer, OutboundTransformer, ProtocolAdapter, SerializedRequest};
pub use error::LlmError;
pub use gateway::{Gateway, GatewayReply};
#[cfg(feature = "http")]
pub use handler::{GatewayState, gateway_router};
pub use registry::AdapterRegistry;
pub use resolve::resolve_model;
pub use routes::{ConfigResolver, StaticRoutes};
pub use types::{CompletionRequest, CompletionResponse, StreamEvent};
