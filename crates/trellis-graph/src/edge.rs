use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A static, unconditional transition between two nodes.
///
/// Multiple edges may share a `start` only when a router disambiguates them;
/// without a router, the last edge registered for a `start` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub start: String,
    pub end: String,
    /// Optional label distinguishing parallel edges (e.g. "approve", "revise").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Edge {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            kind: None,
            metadata: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edge_builders() {
        let e = Edge::new("a", "b")
            .with_kind("approve")
            .with_metadata(json!({"weight": 1}));
        assert_eq!(e.start, "a");
        assert_eq!(e.end, "b");
        assert_eq!(e.kind.as_deref(), Some("approve"));
        assert_eq!(e.metadata, Some(json!({"weight": 1})));
    }

    #[test]
    fn serialization_roundtrip() {
        let e = Edge::new("draft", "review").with_kind("submit");
        let json = serde_json::to_string(&e).unwrap();
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.start, "draft");
        assert_eq!(parsed.end, "review");
        assert_eq!(parsed.kind.as_deref(), Some("submit"));
        assert!(parsed.metadata.is_none());
    }
}
