//! DDM (Distributed Database Middleware) adapters

pub mod account;
pub mod accounts;
pub mod instance;

use std::collections::HashMap;
use std::time::Duration;

use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use serde_json::Value as Json;

use crate::client::{SdkResult, ServiceClient};
use crate::pagination::{DEFAULT_PAGE_LIMIT, list_all_by_offset};
use crate::utils::{flatten_fields, path_array, path_str, replace_vars};
use crate::wait::WaitError;

pub(crate) const SERVICE: &str = "ddm";

/// Error codes DDM answers with while another operation holds the instance
pub(crate) const OPERATION_CONFLICT_CODES: &[&str] = &["DBS.200019", "DBS.280343"];

pub(crate) const CONFLICT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn instance_path(instance_id: &str) -> String {
    replace_vars(
        "v1/{project_id}/instances/{instance_id}",
        &[("instance_id", instance_id)],
    )
}

pub(crate) fn users_path(instance_id: &str) -> String {
    format!("{}/users", instance_path(instance_id))
}

/// Instance status as seen by waiters.
///
/// A missing instance reports `DELETED`; every transitional status is
/// folded into `PENDING`.
pub(crate) async fn instance_status(
    client: &ServiceClient,
    instance_id: &str,
) -> Result<(Json, String), WaitError> {
    let body = match client.get(&instance_path(instance_id)).await {
        Ok(body) => body,
        Err(e) if e.is_not_found() => return Ok((Json::Null, "DELETED".to_string())),
        Err(e) => return Err(e.into()),
    };

    let status = path_str("status", &body).unwrap_or_default();
    match status.as_str() {
        "CREATEFAILED" | "ERROR" => Err(WaitError::Failed(format!(
            "instance {} is in status {}",
            instance_id, status
        ))),
        "RUNNING" | "DELETED" => Ok((body, status)),
        _ => Ok((body, "PENDING".to_string())),
    }
}

/// Split an account ID of the form `<instance_id>/<name>`
pub(crate) fn parse_account_id(id: &str) -> ProviderResult<(&str, &str)> {
    match id.split_once('/') {
        Some((instance_id, name)) if !instance_id.is_empty() && !name.is_empty() => {
            Ok((instance_id, name))
        }
        _ => Err(ProviderError::new(format!(
            "invalid ID format for DDM account ({}), want '<instance_id>/<name>'",
            id
        ))),
    }
}

/// All accounts of an instance
pub(crate) async fn list_accounts(
    client: &ServiceClient,
    instance_id: &str,
) -> SdkResult<Vec<Json>> {
    list_all_by_offset(client, &users_path(instance_id), "users", DEFAULT_PAGE_LIMIT).await
}

/// Account fields shared by the resource and the data source
pub(crate) fn flatten_account(user: &Json) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    flatten_fields(
        user,
        &[
            ("name", "name"),
            ("status", "status"),
            ("permissions", "base_authority"),
            ("description", "description"),
        ],
        &mut attributes,
    );
    let schemas: Vec<Value> = path_array("databases", user)
        .iter()
        .filter_map(|db| {
            let mut block = HashMap::new();
            flatten_fields(db, &[("name", "name"), ("description", "description")], &mut block);
            (!block.is_empty()).then_some(Value::Map(block))
        })
        .collect();
    attributes.insert("schemas".to_string(), Value::List(schemas));
    attributes
}
