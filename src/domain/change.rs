use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A table in the event store the feed can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    GameEvents,
    Substitutions,
    GameRosters,
}

impl Resource {
    pub fn table(&self) -> &'static str {
        match self {
            Resource::GameEvents => "game_events",
            Resource::Substitutions => "substitutions",
            Resource::GameRosters => "game_rosters",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Equality filter on one column (`column=eq.value`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn by_game(game_id: &str) -> Self {
        Self::eq("gameId", game_id)
    }

    /// Query-string pair for the REST interface
    pub fn query_pair(&self) -> (String, String) {
        (self.column.clone(), format!("eq.{}", self.value))
    }

    /// Filter expression used in push topic names
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    pub fn matches(&self, record: &Value) -> bool {
        match record.get(&self.column) {
            Some(Value::String(s)) => s == &self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Which delivery path produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliverySource {
    Push,
    Poll,
}

/// Uniform change notification, identical whether pushed or synthesized
/// from a polling diff.
///
/// For deletes `record` holds the row as it was before deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub resource: Resource,
    pub kind: ChangeKind,
    pub record: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,
    pub source: DeliverySource,
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        resource: Resource,
        kind: ChangeKind,
        record: Value,
        old_record: Option<Value>,
        source: DeliverySource,
    ) -> Self {
        Self {
            resource,
            kind,
            record,
            old_record,
            source,
            received_at: Utc::now(),
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record
            .get("id")
            .or_else(|| self.old_record.as_ref().and_then(|r| r.get("id")))
            .and_then(Value::as_str)
    }
}
