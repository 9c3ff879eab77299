//! Built-in tools and the process-wide tool registry.
//!
//! The global registry is populated once on first use and is read-only
//! afterwards. Runs layer their own tools over it with
//! [`ToolRegistry::child_of`].

pub mod current_time;
pub mod http_get;
pub mod weather_lookup;

use agentloom_core::tool::ToolRegistry;
use std::sync::{Arc, OnceLock};

pub use current_time::CurrentTimeTool;
pub use http_get::HttpGetTool;
pub use weather_lookup::WeatherLookupTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CurrentTimeTool));
    registry.register(Arc::new(WeatherLookupTool));
    registry.register(Arc::new(HttpGetTool::new()));
    registry
}

static GLOBAL: OnceLock<Arc<ToolRegistry>> = OnceLock::new();

/// Install the process-wide registry. Fails if it was already set or read.
pub fn install_global(registry: ToolRegistry) -> Result<(), Arc<ToolRegistry>> {
    GLOBAL.set(Arc::new(registry))
}

/// The process-wide registry, defaulting to the built-ins on first read.
pub fn global() -> Arc<ToolRegistry> {
    GLOBAL.get_or_init(|| Arc::new(default_registry())).clone()
}

/// Interpret tool input: a JSON value when it parses as one, otherwise a string.
pub fn parse_input(input: &str) -> serde_json::Value {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }
    serde_json::Value::String(trimmed.to_string())
}

/// Read `field` from an object input, or the whole input when it is plain text.
pub fn field_or_text(args: &serde_json::Value, field: &str) -> Option<String> {
    match args {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(map) => map.get(field).and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["current_time", "http_get", "weather_lookup"]);
    }

    #[test]
    fn global_registry_is_shared() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.get("current_time").is_some());
    }

    #[test]
    fn input_parsing() {
        assert_eq!(parse_input(" Paris "), serde_json::json!("Paris"));
        assert_eq!(parse_input(r#"{"a": 1}"#)["a"], 1);
        assert_eq!(parse_input("{not json"), serde_json::json!("{not json"));

        let obj = parse_input(r#"{"url": "http://x"}"#);
        assert_eq!(field_or_text(&obj, "url").as_deref(), Some("http://x"));
        assert_eq!(field_or_text(&obj, "other"), None);
    }
}
