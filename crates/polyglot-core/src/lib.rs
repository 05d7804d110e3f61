//! Shared primitives for the polyglot gateway crates

mod error;

pub use error::{HttpError, anthropic_error_body, openai_error_body};
