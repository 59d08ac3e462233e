//! `ddm_account`: database accounts of a DDM instance

use std::collections::HashMap;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use reqwest::Method;
use serde_json::{Value as Json, json};

use super::{
    CONFLICT_RETRY_INTERVAL, OPERATION_CONFLICT_CODES, SERVICE, flatten_account, list_accounts,
    parse_account_id, users_path,
};
use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::errors::{check_deleted, provider_error};
use crate::resource_data::{ResourceData, TimeoutKind};
use crate::resources::{ProviderContext, ResourceHandler};
use crate::retry::retry_on_operation_conflict;
use crate::schemas;
use crate::utils::{attr_ignore_empty, path_str, remove_nil, value_to_json};

pub struct DdmAccount;

#[async_trait]
impl ResourceHandler for DdmAccount {
    fn type_name(&self) -> &'static str {
        "ddm_account"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ddm::account_schema()
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let instance_id = data.require_str("instance_id")?.to_string();

        let path = users_path(&instance_id);
        let body = build_create_body(data);
        let resp = with_conflict_retry(ctx, data, TimeoutKind::Create, || {
            request_ok_200(&client, Method::POST, &path, Some(body.clone()))
        })
        .await
        .map_err(|e| provider_error(&data.id, "error creating DDM account", e))?;

        let name = path_str("users[0].name", &resp).ok_or_else(|| {
            ProviderError::new("error creating DDM account, name is not found in API response")
                .for_resource(data.id.clone())
        })?;
        data.set_identifier(format!("{}/{}", instance_id, name));
        Ok(())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>> {
        let client = ctx.client(SERVICE, data).await?;
        let (instance_id, name) = parse_account_id(data.identifier()?)
            .map_err(|e| e.for_resource(data.id.clone()))?;

        let users = match check_deleted(list_accounts(&client, instance_id).await)
            .map_err(|e| provider_error(&data.id, "error retrieving DDM accounts", e))?
        {
            Some(users) => users,
            None => return Ok(None),
        };
        let Some(user) = users
            .iter()
            .find(|u| path_str("name", u).as_deref() == Some(name))
        else {
            return Ok(None);
        };

        let mut attributes = flatten_account(user);
        attributes.insert("region".to_string(), Value::from(client.region()));
        attributes.insert("instance_id".to_string(), Value::from(instance_id));
        Ok(Some(attributes))
    }

    async fn update(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let (instance_id, name) = parse_account_id(data.identifier()?)
            .map_err(|e| e.for_resource(data.id.clone()))?;
        let path = format!("{}/{}", users_path(instance_id), name);

        if data.has_changes(&["permissions", "description", "schemas"]) {
            let body = build_update_body(data);
            with_conflict_retry(ctx, data, TimeoutKind::Update, || {
                request_ok_200(&client, Method::PUT, &path, Some(body.clone()))
            })
            .await
            .map_err(|e| provider_error(&data.id, "error updating DDM account", e))?;
        }

        if data.has_change("password") {
            let password_path = format!(
                "v2/{{project_id}}/instances/{}/users/{}/password",
                instance_id, name
            );
            let body = json!({"password": data.get_str("password")});
            with_conflict_retry(ctx, data, TimeoutKind::Update, || {
                request_ok_200(&client, Method::POST, &password_path, Some(body.clone()))
            })
            .await
            .map_err(|e| provider_error(&data.id, "error updating DDM account password", e))?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let (instance_id, name) = parse_account_id(data.identifier()?)
            .map_err(|e| e.for_resource(data.id.clone()))?;
        let path = format!("{}/{}", users_path(instance_id), name);

        let result = with_conflict_retry(ctx, data, TimeoutKind::Delete, || {
            request_ok_200(&client, Method::DELETE, &path, None)
        })
        .await;
        check_deleted(result)
            .map_err(|e| provider_error(&data.id, "error deleting DDM account", e))?;
        Ok(())
    }
}

async fn request_ok_200(
    client: &ServiceClient,
    method: Method,
    path: &str,
    body: Option<Json>,
) -> SdkResult<Json> {
    let mut opts = RequestOpts::new().ok_codes(&[200]);
    if let Some(body) = body {
        opts = opts.json(body);
    }
    client.request(method, path, opts).await
}

async fn with_conflict_retry<F, Fut>(
    ctx: &ProviderContext,
    data: &ResourceData,
    kind: TimeoutKind,
    call: F,
) -> SdkResult<Json>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SdkResult<Json>>,
{
    retry_on_operation_conflict(
        OPERATION_CONFLICT_CODES,
        data.timeout(kind),
        ctx.wait_policy.apply(CONFLICT_RETRY_INTERVAL),
        call,
    )
    .await
}

/// `databases` entries; only the schema name is sent
fn build_databases(data: &ResourceData) -> Json {
    let databases: Vec<Json> = data
        .get_list("schemas")
        .iter()
        .filter_map(Value::as_map)
        .map(|s| json!({"name": s.get("name").map(value_to_json)}))
        .collect();
    Json::Array(databases)
}

fn build_create_body(data: &ResourceData) -> Json {
    remove_nil(json!({
        "users": [{
            "name": attr_ignore_empty(data.get("name")),
            "password": attr_ignore_empty(data.get("password")),
            "base_authority": attr_ignore_empty(data.get("permissions")),
            "description": attr_ignore_empty(data.get("description")),
            "databases": build_databases(data),
        }]
    }))
}

fn build_update_body(data: &ResourceData) -> Json {
    let mut user = remove_nil(json!({
        "base_authority": attr_ignore_empty(data.get("permissions")),
        "description": attr_ignore_empty(data.get("description")),
        "databases": build_databases(data),
    }));
    // Removed values are sent empty so the service clears them
    if let Json::Object(fields) = &mut user {
        if data.get_str("description").is_none() && data.has_change("description") {
            fields.insert("description".to_string(), json!(""));
        }
        if data.get_list("schemas").is_empty() && data.has_change("schemas") {
            fields.insert("databases".to_string(), json!([]));
        }
    }
    json!({ "user": user })
}
