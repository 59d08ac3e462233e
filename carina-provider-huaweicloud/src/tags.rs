//! Resource tags
//!
//! Tags are a `key = value` map in configuration and a list of
//! `{"key": ..., "value": ...}` objects on the wire. Services expose
//! `{resource}/tags` (read), `{resource}/tags/create` and
//! `{resource}/tags/delete` action APIs.

use std::collections::HashMap;

use carina_core::resource::Value;
use reqwest::Method;
use serde_json::{Value as Json, json};

use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::utils::path_array;

/// Tag map into the wire list, sorted by key
pub fn expand_resource_tags(tags: &HashMap<String, Value>) -> Vec<Json> {
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| {
            let value = tags[k].as_str().unwrap_or_default();
            json!({"key": k, "value": value})
        })
        .collect()
}

/// Wire list into a tag map; entries without a key are skipped
pub fn flatten_tag_list(list: &[Json]) -> HashMap<String, Value> {
    list.iter()
        .filter_map(|tag| {
            let key = tag.get("key")?.as_str()?;
            let value = tag.get("value").and_then(|v| v.as_str()).unwrap_or_default();
            Some((key.to_string(), Value::from(value)))
        })
        .collect()
}

/// Provider default tags beneath the resource's own tags
pub fn merge_default_tags(
    defaults: &HashMap<String, String>,
    tags: Option<&HashMap<String, Value>>,
) -> HashMap<String, Value> {
    let mut merged: HashMap<String, Value> = defaults
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
        .collect();
    if let Some(tags) = tags {
        merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Tags to remove and tags to add when going from `old` to `new`.
///
/// A changed value shows up in both sets.
pub fn diff_tags(
    old: &HashMap<String, Value>,
    new: &HashMap<String, Value>,
) -> (HashMap<String, Value>, HashMap<String, Value>) {
    let removed = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let added = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (removed, added)
}

/// `POST {resource_path}/tags/create`
pub async fn create_tags(
    client: &ServiceClient,
    resource_path: &str,
    tags: &HashMap<String, Value>,
) -> SdkResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let opts = RequestOpts::new()
        .ok_codes(&[200, 204])
        .json(json!({"tags": expand_resource_tags(tags)}));
    client
        .request(Method::POST, &format!("{}/tags/create", resource_path), opts)
        .await?;
    Ok(())
}

/// `DELETE {resource_path}/tags/delete`
pub async fn delete_tags(
    client: &ServiceClient,
    resource_path: &str,
    tags: &HashMap<String, Value>,
) -> SdkResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let opts = RequestOpts::new()
        .ok_codes(&[200, 204])
        .json(json!({"tags": expand_resource_tags(tags)}));
    client
        .request(Method::DELETE, &format!("{}/tags/delete", resource_path), opts)
        .await?;
    Ok(())
}

/// `GET {resource_path}/tags`
pub async fn get_tags(
    client: &ServiceClient,
    resource_path: &str,
) -> SdkResult<HashMap<String, Value>> {
    let body = client.get(&format!("{}/tags", resource_path)).await?;
    Ok(flatten_tag_list(&path_array("tags", &body)))
}

/// Apply a tag change through the action APIs
pub async fn update_tags(
    client: &ServiceClient,
    resource_path: &str,
    old: &HashMap<String, Value>,
    new: &HashMap<String, Value>,
) -> SdkResult<()> {
    let (removed, added) = diff_tags(old, new);
    delete_tags(client, resource_path, &removed).await?;
    create_tags(client, resource_path, &added).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn expand_and_flatten() {
        let t = tags(&[("owner", "infra"), ("env", "dev")]);
        let wire = expand_resource_tags(&t);
        assert_eq!(
            wire,
            vec![
                json!({"key": "env", "value": "dev"}),
                json!({"key": "owner", "value": "infra"})
            ]
        );
        assert_eq!(flatten_tag_list(&wire), t);
    }

    #[test]
    fn diff_reports_changed_values_on_both_sides() {
        let old = tags(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let new = tags(&[("a", "1"), ("b", "20"), ("d", "4")]);
        let (removed, added) = diff_tags(&old, &new);
        assert_eq!(removed, tags(&[("b", "2"), ("c", "3")]));
        assert_eq!(added, tags(&[("b", "20"), ("d", "4")]));
    }

    #[test]
    fn default_tags_are_overridden() {
        let mut defaults = HashMap::new();
        defaults.insert("owner".to_string(), "infra".to_string());
        defaults.insert("env".to_string(), "dev".to_string());
        let merged = merge_default_tags(&defaults, Some(&tags(&[("env", "prod")])));
        assert_eq!(merged, tags(&[("owner", "infra"), ("env", "prod")]));
    }
}
