//! Model name resolution
//!
//! Order: forced model, then the route's model map, then the built-in
//! defaults for the target protocol, then the name unchanged. Map lookups
//! try the name without a trailing bracket annotation (`claude-sonnet-4-6[1m]`)
//! before the name as sent.

use std::sync::OnceLock;

use indexmap::IndexMap;
use polyglot_config::ProtocolId;
use regex::Regex;

/// Built-in aliases for clients that only know Claude model names
fn default_map(target: ProtocolId) -> &'static [(&'static str, &'static str)] {
    match target {
        ProtocolId::Openai => &[
            ("claude-opus-4-6", "gpt-4o"),
            ("claude-sonnet-4-6", "gpt-4o-mini"),
            ("claude-haiku-4-5", "gpt-4o-mini"),
        ],
        ProtocolId::Gemini => &[
            ("claude-opus-4-6", "gemini-2.0-flash"),
            ("claude-sonnet-4-6", "gemini-2.0-flash"),
            ("claude-haiku-4-5", "gemini-1.5-flash"),
        ],
        _ => &[],
    }
}

fn bracket_suffix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\[\]]*\]$").ok()).as_ref()
}

/// `name` without its final `[...]` group, trimmed
pub fn normalize(name: &str) -> &str {
    bracket_suffix()
        .and_then(|re| re.find(name))
        .map_or(name, |m| &name[..m.start()])
        .trim()
}

/// Upstream model name for a client-requested one
pub fn resolve_model(
    requested: &str,
    target: ProtocolId,
    model_map: Option<&IndexMap<String, String>>,
    force_model: Option<&str>,
) -> String {
    if let Some(forced) = force_model.filter(|m| !m.is_empty()) {
        return forced.to_owned();
    }

    let normalized = normalize(requested);
    let candidates = [normalized, requested];

    if let Some(map) = model_map
        && let Some(mapped) = candidates.iter().find_map(|name| map.get(*name))
    {
        return mapped.clone();
    }

    let defaults = default_map(target);
    candidates
        .iter()
        .find_map(|name| defaults.iter().find(|(from, _)| from == name).map(|(_, to)| *to))
        .unwrap_or(requested)
        .to_owned()
}
