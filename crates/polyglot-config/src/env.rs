use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
fn placeholder() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).ok())
        .as_ref()
}

/// Expand environment placeholders in raw TOML text
///
/// Lines whose first non-blank character is `#` are copied through
/// untouched so commented-out secrets never need to be set.
pub fn expand_env(input: &str) -> Result<String, String> {
    let re = placeholder().ok_or_else(|| "placeholder pattern failed to compile".to_string())?;

    let expanded = input
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_string())
            } else {
                expand_line(re, line)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expanded.join("\n"))
}

fn expand_line(re: &Regex, line: &str) -> Result<String, String> {
    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;

    for caps in re.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&line[cursor..whole.start()]);
        out.push_str(&resolve(&caps)?);
        cursor = whole.end();
    }

    out.push_str(&line[cursor..]);
    Ok(out)
}

fn resolve(caps: &Captures<'_>) -> Result<String, String> {
    let key = caps.get(1).map_or("", |m| m.as_str());
    let fallback = caps.get(2).map(|m| m.as_str());

    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}
