//! `{{ placeholder }}` rendering
//!
//! Templates use a single construct: `{{ key }}` is replaced by the value of
//! the dotted attribute `key`. Referencing an undefined attribute is an
//! error, so a typo never renders as an empty string.

use anyhow::{Context, Result};
use declarative::{Attributes, TemplateRenderer};
use regex::Regex;
use std::sync::OnceLock;

use super::assets::AssetStore;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("Valid regex"))
}

/// Expand every placeholder in `template`
pub fn render_str(template: &str, variables: &Attributes) -> Result<String> {
    let pattern = placeholder_pattern();

    if let Some(missing) = pattern
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .find(|key| !variables.contains_key(key))
    {
        anyhow::bail!("Undefined variable '{missing}'");
    }

    Ok(pattern
        .replace_all(template, |caps: &regex::Captures| {
            variables.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Renders named templates from an [`AssetStore`]
pub struct TemplateEngine {
    store: AssetStore,
}

impl TemplateEngine {
    pub fn new(store: AssetStore) -> Self {
        Self { store }
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, template_id: &str, variables: &Attributes) -> Result<Vec<u8>> {
        let raw = self.store.load(template_id)?;
        let source = String::from_utf8(raw)
            .with_context(|| format!("Template '{template_id}' is not valid UTF-8"))?;
        let rendered = render_str(&source, variables)
            .with_context(|| format!("Failed to render template '{template_id}'"))?;
        Ok(rendered.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_placeholders() {
        let out = render_str(
            "NODENAME={{ rabbitmq.nodename }}\nPORT={{rabbitmq.port}}\n",
            &vars(&[("rabbitmq.nodename", "rabbit"), ("rabbitmq.port", "5672")]),
        )
        .unwrap();
        assert_eq!(out, "NODENAME=rabbit\nPORT=5672\n");
    }

    #[test]
    fn test_erlang_braces_survive() {
        let out = render_str(
            "{listener, [{port, {{ port }}}]}",
            &vars(&[("port", "55672")]),
        )
        .unwrap();
        assert_eq!(out, "{listener, [{port, 55672}]}");
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let err = render_str("{{ rabbitmq.nodname }}", &Attributes::new()).unwrap_err();
        assert!(err.to_string().contains("rabbitmq.nodname"));
    }

    #[test]
    fn test_engine_renders_builtin_config() {
        let engine = TemplateEngine::new(AssetStore::templates(None));
        let rendered = engine
            .render(
                "rabbitmq.config",
                &vars(&[
                    ("rabbitmq.address", "0.0.0.0"),
                    ("rabbitmq.port", "5672"),
                    ("rabbitmq.cluster_nodes", "'rabbit@a'"),
                    ("rabbitmq.management_port", "55672"),
                ]),
            )
            .unwrap();
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("{cluster_nodes, ['rabbit@a']}"));
        assert!(text.contains("{port, 55672}"));
    }
}
