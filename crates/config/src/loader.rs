use std::fmt::Write;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, bail};
use indoc::indoc;
use regex::Regex;
use serde::Deserialize;
use toml::Value;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read configuration from {}", path.display()))?;

    parse(&content)
}

pub(crate) fn parse(content: &str) -> anyhow::Result<Config> {
    let mut raw_config: Value = toml::from_str(content)?;

    expand_env_references(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_upstreams(&config)?;

    Ok(config)
}

pub(crate) fn validate_has_upstreams(config: &Config) -> anyhow::Result<()> {
    if config.models.is_empty() && config.gateway.url.is_none() {
        bail!(indoc! {r#"
            No upstreams configured. Chorus requires at least one self-hosted model URL or a gateway endpoint.

            Example configuration:

            For a self-hosted model:

              [models.qwen3-4b]
              url = "http://localhost:8001"

            For the hosted gateway:

              [gateway]
              url = "https://models.github.ai/inference/chat/completions"
              token = "{{ env.GATEWAY_TOKEN }}"
        "#});
    }

    Ok(())
}

fn env_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("env reference pattern should be valid")
    })
}

/// Walks the raw TOML tree and substitutes `{{ env.NAME }}` references in
/// every string value, so credentials can stay out of the file itself.
fn expand_env_references<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            if let Some(expanded) = expand_string(s).map_err(|unset| {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(key) => {
                            p.push_str(key);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                anyhow::anyhow!("environment variable '{unset}' referenced at '{p}' is not set")
            })? {
                *s = expanded;
            }
        }
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_env_references(path, value)?;
                path.pop();
            }
        }
        Value::Table(table) => {
            for (key, value) in table.iter_mut() {
                path.push(Ok(key.as_str()));
                expand_env_references(path, value)?;
                path.pop();
            }
        }
        _ => {}
    }

    Ok(())
}

/// Returns the expanded string, `Ok(None)` when nothing referenced the
/// environment, or the name of the first unset variable.
fn expand_string(input: &str) -> Result<Option<String>, String> {
    let pattern = env_reference_pattern();

    if !pattern.is_match(input) {
        return Ok(None);
    }

    let mut output = String::with_capacity(input.len());
    let mut last_end = 0;

    for captures in pattern.captures_iter(input) {
        let whole = captures.get(0).expect("capture group zero always exists");
        let name = &captures[1];

        let value = std::env::var(name).map_err(|_| name.to_string())?;

        output.push_str(&input[last_end..whole.start()]);
        output.push_str(&value);
        last_end = whole.end();
    }

    output.push_str(&input[last_end..]);

    Ok(Some(output))
}
