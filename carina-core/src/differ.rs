//! Differ - Compare desired state with current state
//!
//! Compares the "desired state" declared in configuration with the "current
//! state" fetched from the Provider and decides what has to happen to the
//! resource. Providers also use it to answer "has this attribute changed"
//! during updates.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> destroy and recreate
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: &ResourceSchema) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed: Vec<String> = changed_attributes(&desired.attributes, &current.attributes)
        .into_iter()
        .filter(|key| {
            let attr = schema.attributes.get(key);
            if attr.is_some_and(AttributeSchema::is_computed_only) {
                return false;
            }
            attribute_changed(
                attr,
                desired.attributes.get(key),
                current.attributes.get(key),
            )
        })
        .collect();

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    if changed.iter().any(|key| schema.is_force_new(key)) {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Whether one attribute differs between the desired and the current state.
///
/// An attribute missing from the desired state only counts as changed when
/// the user could have set it, the provider does not fill it in, and the
/// current value is not blank. Without a schema, unset never counts.
pub fn attribute_changed(
    attr: Option<&AttributeSchema>,
    desired: Option<&Value>,
    current: Option<&Value>,
) -> bool {
    match (desired, current) {
        (Some(d), Some(c)) => match attr {
            Some(attr) => !values_equal(&attr.attr_type, d, c),
            None => d != c,
        },
        (Some(_), None) => true,
        (None, Some(c)) => attr.is_some_and(is_clearable) && !is_blank(c),
        (None, None) => false,
    }
}

/// Sets compare without regard to order
pub fn values_equal(attr_type: &AttributeType, a: &Value, b: &Value) -> bool {
    match (attr_type, a, b) {
        (AttributeType::Set(_), Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
        }
        _ => a == b,
    }
}

fn is_clearable(attr: &AttributeSchema) -> bool {
    (attr.required || attr.optional) && !attr.computed
}

/// Zero values all the way down; a block whose fields are all zero is blank
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::List(items) => items.iter().all(is_blank),
        Value::Map(map) => map.values().all(is_blank),
        other => other.is_empty(),
    }
}

/// Find candidate changed attributes between desired and current state
///
/// Reports keys whose values differ, keys only present in `desired`, and
/// keys only present in `current`. Callers holding a schema narrow the
/// result with [`attribute_changed`].
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }
    for key in current.keys() {
        if !key.starts_with('_') && !desired.contains_key(key) {
            changed.push(key.clone());
        }
    }

    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("ddm_instance")
            .attribute(
                AttributeSchema::new("engine_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
            .attribute(AttributeSchema::new("availability_zones", types::string_set()))
            .attribute(AttributeSchema::new("tags", types::tags()).optional())
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .optional()
                    .computed(),
            )
    }

    fn current(attrs: Vec<(&str, Value)>) -> State {
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        State::existing(ResourceId::new("ddm_instance", "db"), attrs)
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("ddm_instance", "db");
        let current = State::not_found(ResourceId::new("ddm_instance", "db"));

        let result = diff(&desired, &current, &schema());
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("ddm_instance", "db").with_attribute("name", "ddm-1");
        let current = current(vec![
            ("name", Value::from("ddm-1")),
            ("status", Value::from("RUNNING")),
        ]);

        let result = diff(&desired, &current, &schema());
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("ddm_instance", "db").with_attribute("name", "ddm-2");
        let current = current(vec![("name", Value::from("ddm-1"))]);

        match diff(&desired, &current, &schema()) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["name".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_on_force_new() {
        let desired = Resource::new("ddm_instance", "db")
            .with_attribute("name", "ddm-2")
            .with_attribute("engine_id", "e2");
        let current = current(vec![
            ("name", Value::from("ddm-1")),
            ("engine_id", Value::from("e1")),
        ]);

        assert!(matches!(
            diff(&desired, &current, &schema()),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn set_order_is_ignored() {
        let desired = Resource::new("ddm_instance", "db").with_attribute(
            "availability_zones",
            Value::List(vec![Value::from("az1"), Value::from("az2")]),
        );
        let current = current(vec![(
            "availability_zones",
            Value::List(vec![Value::from("az2"), Value::from("az1")]),
        )]);

        assert!(!diff(&desired, &current, &schema()).is_change());
    }

    #[test]
    fn removed_optional_attribute_is_an_update() {
        let desired = Resource::new("ddm_instance", "db").with_attribute("name", "ddm-1");
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), Value::from("dev"));
        let current = current(vec![
            ("name", Value::from("ddm-1")),
            ("tags", Value::Map(tags)),
        ]);

        match diff(&desired, &current, &schema()) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["tags".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn unset_computed_or_blank_attributes_are_kept() {
        let desired = Resource::new("ddm_instance", "db").with_attribute("name", "ddm-1");
        let current = current(vec![
            ("name", Value::from("ddm-1")),
            ("description", Value::from("filled in by the service")),
            ("tags", Value::Map(HashMap::new())),
            ("unknown", Value::from("x")),
        ]);

        assert!(!diff(&desired, &current, &schema()).is_change());
    }

    #[test]
    fn blank_blocks() {
        let mut block = HashMap::new();
        block.insert("enabled".to_string(), Value::Bool(false));
        block.insert("crl_name".to_string(), Value::from(""));
        assert!(is_blank(&Value::List(vec![Value::Map(block.clone())])));

        block.insert("enabled".to_string(), Value::Bool(true));
        assert!(!is_blank(&Value::List(vec![Value::Map(block)])));
    }

    #[test]
    fn set_equality_needs_the_same_members() {
        let set = types::string_set();
        let a = Value::List(vec![Value::from("az1"), Value::from("az1"), Value::from("az2")]);
        let b = Value::List(vec![Value::from("az2"), Value::from("az2"), Value::from("az1")]);
        assert!(values_equal(&set, &a, &b));
        let c = Value::List(vec![Value::from("az1"), Value::from("az3"), Value::from("az2")]);
        assert!(!values_equal(&set, &a, &c));
        assert!(!values_equal(&types::string_list(), &a, &b));
    }

    #[test]
    fn changed_attributes_skips_internal_keys() {
        let mut desired = HashMap::new();
        desired.insert("_binding".to_string(), Value::from("x"));
        desired.insert("name".to_string(), Value::from("a"));
        let mut current = HashMap::new();
        current.insert("_state".to_string(), Value::from("y"));
        current.insert("status".to_string(), Value::from("RUNNING"));
        let changed = changed_attributes(&desired, &current);
        assert_eq!(changed, vec!["name".to_string(), "status".to_string()]);
    }
}
