//! Conversions between the canonical model and each wire format
//!
//! Every module pairs `From` impls for requests and responses with an
//! inbound stream transformer (wire bytes to canonical events) and an
//! outbound one (canonical events to wire bytes).

pub mod anthropic;
pub mod blocks;
pub mod cohere;
pub mod gemini;
pub mod ollama;
pub mod openai;
