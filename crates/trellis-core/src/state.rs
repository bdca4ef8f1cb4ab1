use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::STATUS_PAUSED;

/// A structured entry in the workflow's message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub sender: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Message {
    pub fn new(sender: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            kind: None,
            recipient: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// One audit-log record of a state mutation.
///
/// The history is monotonically growing and is never rewritten; a
/// checkpoint/resume cycle must reproduce it byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub action: String,
    pub payload: Value,
}

/// The mutable record threaded through every node invocation.
///
/// `data` and `scratchpad` are insertion-ordered maps (`serde_json::Map`
/// with the `preserve_order` feature). Mutations to `data` go through
/// [`WorkflowState::update`] and are merges, never wholesale replacement;
/// each one is recorded in `history`. `scratchpad` writes are transient
/// node-local signalling and leave no history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub scratchpad: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_feedback: Option<Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from initial working data. No history is recorded
    /// for the seed values.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Merge a partial update into `data` and record it in `history`.
    pub fn update(&mut self, partial: Map<String, Value>) {
        for (k, v) in &partial {
            self.data.insert(k.clone(), v.clone());
        }
        self.history.push(HistoryEntry {
            action: "update".to_string(),
            payload: Value::Object(partial),
        });
    }

    /// Append a message and record it in `history`.
    pub fn add_message(&mut self, message: Message) {
        let payload = serde_json::to_value(&message).unwrap_or(Value::Null);
        self.messages.push(message);
        self.history.push(HistoryEntry {
            action: "add_message".to_string(),
            payload,
        });
    }

    /// Record a free-form audit entry (e.g. a learned `"procedure"`).
    pub fn record(&mut self, action: impl Into<String>, payload: Value) {
        self.history.push(HistoryEntry {
            action: action.into(),
            payload,
        });
    }

    /// Write a transient scratchpad value. Not audited.
    pub fn set_scratch(&mut self, key: impl Into<String>, value: Value) {
        self.scratchpad.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn is_paused(&self) -> bool {
        self.status.as_deref() == Some(STATUS_PAUSED)
    }

    pub fn set_evaluator_feedback(&mut self, feedback: Value) {
        self.evaluator_feedback = Some(feedback);
    }

    /// Increment the router-level self-correction counter. Independent of
    /// the engine's per-node retry mechanism, which never touches the state.
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Clone a view for a parallel branch: working data and scratchpad are
    /// copied, while `messages`/`history` start empty so that merging back
    /// concatenates only what the branch itself produced.
    pub fn branch_clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            messages: Vec::new(),
            history: Vec::new(),
            scratchpad: self.scratchpad.clone(),
            status: None,
            retry_count: self.retry_count,
            evaluator_feedback: self.evaluator_feedback.clone(),
        }
    }

    /// Merge a finished branch back into this state.
    ///
    /// `data` merges key-by-key (the branch wins on collision), messages and
    /// history are appended, and the branch's `status`, `evaluator_feedback`
    /// and `retry_count` fully supersede the parent's.
    pub fn absorb_branch(&mut self, branch: WorkflowState) {
        for (k, v) in branch.data {
            self.data.insert(k, v);
        }
        self.messages.extend(branch.messages);
        self.history.extend(branch.history);
        for (k, v) in branch.scratchpad {
            self.scratchpad.insert(k, v);
        }
        self.status = branch.status;
        self.evaluator_feedback = branch.evaluator_feedback;
        self.retry_count = branch.retry_count;
    }
}
