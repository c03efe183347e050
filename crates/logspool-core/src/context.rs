use std::collections::BTreeMap;

use logspool_types::LogContext;

/// Turns a caller's context into attributes merged into each event
pub trait ContextExtractor: Send + Sync {
    fn extract(&self, context: &LogContext) -> BTreeMap<String, String>;
}

/// Context keys picked up when no list is given
pub const DEFAULT_CONTEXT_KEYS: [&str; 3] = ["request_id", "user_id", "session_id"];

/// Extracts trace/span ids and a fixed list of context keys
#[derive(Debug, Clone)]
pub struct DefaultContextExtractor {
    keys: Vec<String>,
}

impl DefaultContextExtractor {
    pub fn new() -> Self {
        Self {
            keys: DEFAULT_CONTEXT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Also extract `key`
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Default for DefaultContextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextExtractor for DefaultContextExtractor {
    fn extract(&self, context: &LogContext) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        if let Some(trace_id) = &context.trace_id {
            values.insert("trace_id".to_string(), trace_id.clone());
        }
        if let Some(span_id) = &context.span_id {
            values.insert("span_id".to_string(), span_id.clone());
        }
        for key in &self.keys {
            if let Some(value) = context.get(key) {
                values.insert(key.clone(), value.to_string());
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_trace_and_known_keys() {
        let context = LogContext::new()
            .with_trace("abc", "def")
            .with_value("request_id", "r-1")
            .with_value("password", "hunter2");

        let values = DefaultContextExtractor::new().extract(&context);

        assert_eq!(values.get("trace_id").map(String::as_str), Some("abc"));
        assert_eq!(values.get("span_id").map(String::as_str), Some("def"));
        assert_eq!(values.get("request_id").map(String::as_str), Some("r-1"));
        assert!(!values.contains_key("password"));
        assert!(!values.contains_key("user_id"));
    }

    #[test]
    fn test_extra_keys() {
        let context = LogContext::new().with_value("tenant", "acme");
        let extractor = DefaultContextExtractor::new().with_key("tenant").with_key("tenant");

        assert_eq!(extractor.keys().len(), 4);
        assert_eq!(
            extractor.extract(&context).get("tenant").map(String::as_str),
            Some("acme")
        );
    }

    #[test]
    fn test_empty_context() {
        assert!(DefaultContextExtractor::new().extract(&LogContext::new()).is_empty());
    }
}
