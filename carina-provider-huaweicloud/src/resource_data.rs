//! Typed access to the attributes of one resource during an operation

use std::collections::HashMap;
use std::time::Duration;

use carina_core::differ::attribute_changed;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{ResourceId, Value};
use carina_core::schema::{AttributeSchema, Timeouts};

/// Which operation timeout to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Create,
    Read,
    Update,
    Delete,
}

impl TimeoutKind {
    fn key(self) -> &'static str {
        match self {
            TimeoutKind::Create => "create",
            TimeoutKind::Read => "read",
            TimeoutKind::Update => "update",
            TimeoutKind::Delete => "delete",
        }
    }
}

/// Attributes of a resource as seen by an adapter.
///
/// `attributes` holds the desired values (create/update) or the last known
/// state (read/delete); `prior` holds the last known state during updates.
#[derive(Debug, Clone)]
pub struct ResourceData {
    pub id: ResourceId,
    identifier: Option<String>,
    attributes: HashMap<String, Value>,
    prior: HashMap<String, Value>,
    timeouts: Timeouts,
    schema: HashMap<String, AttributeSchema>,
}

impl ResourceData {
    pub fn new(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            prior: HashMap::new(),
            timeouts: Timeouts::default(),
            schema: HashMap::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_prior(mut self, prior: HashMap<String, Value>) -> Self {
        self.prior = prior;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Attribute schemas used by change detection
    pub fn with_schema(mut self, attributes: HashMap<String, AttributeSchema>) -> Self {
        self.schema = attributes;
        self
    }

    /// Cloud-side ID
    pub fn identifier(&self) -> ProviderResult<&str> {
        self.identifier.as_deref().ok_or_else(|| {
            ProviderError::new("resource has no identifier yet").for_resource(self.id.clone())
        })
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Non-empty string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Required string attribute
    pub fn require_str(&self, key: &str) -> ProviderResult<&str> {
        self.get_str(key).ok_or_else(|| {
            ProviderError::new(format!("attribute `{}` is required", key))
                .for_resource(self.id.clone())
        })
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key).and_then(Value::as_list).unwrap_or_default()
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn get_map(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.get(key).and_then(Value::as_map)
    }

    /// First element of a nested block attribute
    pub fn get_block(&self, key: &str) -> Option<&HashMap<String, Value>> {
        match self.get(key)? {
            Value::List(items) => items.first().and_then(Value::as_map),
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Value in the last known state
    pub fn old(&self, key: &str) -> Option<&Value> {
        self.prior.get(key)
    }

    /// Whether the desired value differs from the last known state.
    ///
    /// Follows the differ: sets ignore order, and removing a value the user
    /// had set counts as a change.
    pub fn has_change(&self, key: &str) -> bool {
        attribute_changed(
            self.schema.get(key),
            self.attributes.get(key),
            self.prior.get(key),
        )
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    /// Operation timeout, honouring a `timeouts` block in configuration
    pub fn timeout(&self, kind: TimeoutKind) -> Duration {
        let default = match kind {
            TimeoutKind::Create => self.timeouts.create,
            TimeoutKind::Read => self.timeouts.read,
            TimeoutKind::Update => self.timeouts.update,
            TimeoutKind::Delete => self.timeouts.delete,
        };
        self.get_block("timeouts")
            .and_then(|t| t.get(kind.key()))
            .and_then(Value::as_str)
            .and_then(parse_duration)
            .unwrap_or(default)
    }
}

/// Parse durations such as `30m`, `1h`, `90s` or `1h30m`
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let mut total = 0u64;
    let mut digits = String::new();
    for c in raw.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let secs = match c {
            'h' => n.checked_mul(3600)?,
            'm' => n.checked_mul(60)?,
            's' => n,
            _ => return None,
        };
        total = total.checked_add(secs)?;
    }
    if !digits.is_empty() {
        return None;
    }
    (total > 0).then(|| Duration::from_secs(total))
}
