//! Wire format types for each supported protocol
//!
//! Each module contains pure serde structs matching the respective
//! protocol's JSON format. They only appear at the boundary; everything in
//! between works on the canonical types.

pub mod anthropic;
pub mod cohere;
pub mod gemini;
pub mod ollama;
pub mod openai;
