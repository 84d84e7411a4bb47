use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error context information attached to logged failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    pub request_id: Option<String>,
    pub actor_id: Option<String>,
    pub entity_id: Option<String>,
    pub additional: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn add_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let ctx = ErrorContext::new()
            .with_request_id("req-1")
            .with_actor_id("nurse-7")
            .add_context("case_id", "c-1");

        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
        assert_eq!(ctx.actor_id.as_deref(), Some("nurse-7"));
        assert_eq!(ctx.additional.get("case_id").map(String::as_str), Some("c-1"));
        assert!(ctx.entity_id.is_none());
    }
}
