//! `ddm_instance`: DDM instances (pay-per-use)

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use log::{debug, warn};
use reqwest::Method;
use serde_json::{Value as Json, json};

use super::{
    CONFLICT_RETRY_INTERVAL, OPERATION_CONFLICT_CODES, SERVICE, instance_path, instance_status,
};
use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::errors::{check_deleted, convert_expected_400_into_404, provider_error};
use crate::orders::{self, is_pre_paid};
use crate::pagination::{DEFAULT_PAGE_LIMIT, list_all_by_offset};
use crate::resource_data::{ResourceData, TimeoutKind};
use crate::resources::{ProviderContext, ResourceHandler};
use crate::retry::retry_on_operation_conflict;
use crate::schemas;
use crate::utils::{
    attr_ignore_empty, flatten_fields, path_array, path_i64, path_str, path_string, remove_nil,
    replace_vars, value_to_json,
};
use crate::wait::{StateChangeConf, WaitError};

const CREATE_DELAY: Duration = Duration::from_secs(200);
const PRE_PAID_CREATE_DELAY: Duration = Duration::from_secs(20);
const RESIZE_DELAY: Duration = Duration::from_secs(100);
const RESTART_DELAY: Duration = Duration::from_secs(10);
const PARAMETERS_DELAY: Duration = Duration::from_secs(5);
const DELETE_DELAY: Duration = Duration::from_secs(30);
const UNSUBSCRIBE_DELAY: Duration = Duration::from_secs(50);
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const RENAME_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct DdmInstance;

#[async_trait]
impl ResourceHandler for DdmInstance {
    fn type_name(&self) -> &'static str {
        "ddm_instance"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ddm::instance_schema()
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        if is_pre_paid(data) && (data.get_str("period_unit").is_none() || data.get_int("period").is_none())
        {
            return Err(ProviderError::new(
                "`period_unit` and `period` are required when `charging_mode` is prePaid",
            )
            .for_resource(data.id.clone()));
        }
        let client = ctx.client(SERVICE, data).await?;

        let body = build_create_body(data, ctx.enterprise_project_id(data));
        let resp = client
            .post("v1/{project_id}/instances", body)
            .await
            .map_err(|e| provider_error(&data.id, "error creating DDM instance", e))?;

        let (instance_id, delay) = if is_pre_paid(data) {
            (create_pre_paid(ctx, data, &resp).await?, PRE_PAID_CREATE_DELAY)
        } else {
            let instance_id = path_str("id", &resp).ok_or_else(|| {
                ProviderError::new("unable to find the DDM instance ID from the API response")
                    .for_resource(data.id.clone())
            })?;
            (instance_id, CREATE_DELAY)
        };
        data.set_identifier(instance_id.clone());

        wait_running(
            ctx,
            &client,
            &instance_id,
            data.timeout(TimeoutKind::Create),
            delay,
            POLL_INTERVAL,
        )
        .await
        .map_err(|e| {
            provider_error(
                &data.id,
                format!("error waiting for instance ({}) to running", instance_id),
                e,
            )
        })?;

        let parameters = data.get_list("parameters").to_vec();
        if !parameters.is_empty() {
            let need_restart = modify_parameters(ctx, &client, &instance_id, &parameters, data)
                .await
                .map_err(|e| provider_error(&data.id, "error initializing DDM instance parameters", e))?;
            if need_restart {
                restart(ctx, &client, &instance_id, data.timeout(TimeoutKind::Update))
                    .await
                    .map_err(|e| provider_error(&data.id, "error restarting DDM instance", e))?;
            }
        }
        Ok(())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>> {
        let client = ctx.client(SERVICE, data).await?;
        let instance_id = data.identifier()?;

        let body = match check_deleted(client.get(&instance_path(instance_id)).await)
            .map_err(|e| provider_error(&data.id, "error retrieving DDM instance", e))?
        {
            Some(body) => body,
            None => return Ok(None),
        };
        if path_str("status", &body).as_deref() == Some("DELETED") {
            return Ok(None);
        }

        let mut attributes = flatten_instance(&body);
        attributes.insert("region".to_string(), Value::from(client.region()));

        let configured = data.get_list("parameters");
        if !configured.is_empty() {
            match read_parameters(&client, instance_id, configured).await {
                Ok(parameters) => {
                    attributes.insert("parameters".to_string(), Value::List(parameters));
                }
                Err(e) => warn!(
                    "error fetching parameters of instance ({}): {}",
                    instance_id, e
                ),
            }
        }
        Ok(Some(attributes))
    }

    async fn update(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let instance_id = data.identifier()?;
        let path = instance_path(instance_id);
        let timeout = data.timeout(TimeoutKind::Update);

        if data.has_change("name") {
            client
                .put(&format!("{}/modify-name", path), json!({"name": data.get_str("name")}))
                .await
                .map_err(|e| provider_error(&data.id, "error updating DDM instance name", e))?;
            wait_running(ctx, &client, instance_id, timeout, Duration::ZERO, RENAME_POLL_INTERVAL)
                .await
                .map_err(|e| provider_error(&data.id, "error waiting for instance rename", e))?;
        }

        if data.has_change("security_group_id") {
            client
                .put(
                    &format!("{}/modify-security-group", path),
                    json!({"security_group_id": data.get_str("security_group_id")}),
                )
                .await
                .map_err(|e| {
                    provider_error(&data.id, "error updating DDM instance security group", e)
                })?;
        }

        if data.has_change("flavor_id") {
            update_flavor(ctx, &client, data, instance_id, timeout).await?;
        }

        if data.has_change("node_num") {
            update_node_num(ctx, &client, data, instance_id, timeout).await?;
        }

        if data.has_change("admin_password") {
            let body = json!({
                "name": attr_ignore_empty(data.get("admin_user")),
                "password": attr_ignore_empty(data.get("admin_password")),
            });
            let admin_path = replace_vars(
                "v3/{project_id}/instances/{instance_id}/admin-user",
                &[("instance_id", instance_id)],
            );
            client
                .put(&admin_path, body)
                .await
                .map_err(|e| provider_error(&data.id, "error updating DDM instance admin password", e))?;
        }

        if data.has_change("parameters") {
            let old = data.old("parameters").and_then(Value::as_list).unwrap_or_default();
            let changes: Vec<Value> = data
                .get_list("parameters")
                .iter()
                .filter(|p| !old.contains(p))
                .cloned()
                .collect();
            if !changes.is_empty() {
                let need_restart = modify_parameters(ctx, &client, instance_id, &changes, data)
                    .await
                    .map_err(|e| provider_error(&data.id, "error updating DDM instance parameters", e))?;
                if need_restart {
                    warn!(
                        "parameters of DDM instance {} changed, restart the instance to apply them",
                        instance_id
                    );
                }
            }
        }

        if data.has_change("auto_renew") && is_pre_paid(data) {
            let bss = ctx.client(orders::SERVICE, data).await?;
            orders::update_auto_renew(&bss, instance_id, data.get_str("auto_renew") == Some("true"))
                .await
                .map_err(|e| {
                    provider_error(&data.id, "error updating the auto-renew of the DDM instance", e)
                })?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let instance_id = data.identifier()?;

        let delay = if is_pre_paid(data) {
            let bss = ctx.client(orders::SERVICE, data).await?;
            let result = orders::unsubscribe(&bss, &[instance_id]).await.map_err(|e| {
                convert_expected_400_into_404(e, "error_code", orders::SUBSCRIPTION_NOT_FOUND_CODES)
            });
            check_deleted(result)
                .map_err(|e| provider_error(&data.id, "error unsubscribing DDM instance", e))?;
            UNSUBSCRIBE_DELAY
        } else {
            let mut path = instance_path(instance_id);
            if let Some(delete_rds_data) = data.get_str("delete_rds_data") {
                path = format!("{}?delete_rds_data={}", path, delete_rds_data);
            }
            check_deleted(client.delete(&path).await)
                .map_err(|e| provider_error(&data.id, "error deleting DDM instance", e))?;
            DELETE_DELAY
        };

        let conf = StateChangeConf::new(&["RUNNING", "PENDING"], &["DELETED"])
            .timeout(data.timeout(TimeoutKind::Delete))
            .delay(delay)
            .poll_interval(POLL_INTERVAL);
        ctx.state_change(conf)
            .wait(|| instance_status(&client, instance_id))
            .await
            .map_err(|e| {
                provider_error(
                    &data.id,
                    format!("error waiting for instance ({}) to be deleted", instance_id),
                    e,
                )
            })?;
        Ok(())
    }
}

// =============================================================================
// Request bodies
// =============================================================================

fn build_create_body(data: &ResourceData, enterprise_project_id: Option<String>) -> Json {
    let availability_zones: Vec<Json> = data
        .get_list("availability_zones")
        .iter()
        .map(value_to_json)
        .collect();

    remove_nil(json!({
        "instance": {
            "name": attr_ignore_empty(data.get("name")),
            "flavor_id": attr_ignore_empty(data.get("flavor_id")),
            "node_num": attr_ignore_empty(data.get("node_num")),
            "engine_id": attr_ignore_empty(data.get("engine_id")),
            "enterprise_project_id": enterprise_project_id,
            "available_zones": availability_zones,
            "vpc_id": attr_ignore_empty(data.get("vpc_id")),
            "security_group_id": attr_ignore_empty(data.get("security_group_id")),
            "subnet_id": attr_ignore_empty(data.get("subnet_id")),
            "param_group_id": attr_ignore_empty(data.get("param_group_id")),
            "time_zone": attr_ignore_empty(data.get("time_zone")),
            "admin_user_name": attr_ignore_empty(data.get("admin_user")),
            "admin_user_password": attr_ignore_empty(data.get("admin_password")),
        },
        "extend_param": {
            "charge_mode": data.get_str("charging_mode").unwrap_or("postPaid"),
            "period_type": attr_ignore_empty(data.get("period_unit")),
            "period_num": attr_ignore_empty(data.get("period")),
            "is_auto_renew": attr_ignore_empty(data.get("auto_renew")),
            "is_auto_pay": "true",
        },
    }))
}

/// `{"values": {name: value}}` from parameter blocks
fn build_parameters_body(parameters: &[Value]) -> Json {
    let values: serde_json::Map<String, Json> = parameters
        .iter()
        .filter_map(Value::as_map)
        .filter_map(|p| {
            let name = p.get("name").and_then(Value::as_str)?;
            let value = p.get("value").and_then(Value::as_str)?;
            Some((name.to_string(), Json::from(value)))
        })
        .collect();
    json!({"values": values})
}

fn build_resize_body(data: &ResourceData, node_number: i64) -> Json {
    remove_nil(json!({
        "flavor_id": attr_ignore_empty(data.get("flavor_id")),
        "group_id": attr_ignore_empty(data.get("param_group_id")),
        "node_number": node_number,
        "is_auto_pay": true,
    }))
}

// =============================================================================
// Flattening
// =============================================================================

fn flatten_instance(body: &Json) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    flatten_fields(
        body,
        &[
            ("status", "status"),
            ("name", "name"),
            ("vpc_id", "vpc_id"),
            ("subnet_id", "subnet_id"),
            ("security_group_id", "security_group_id"),
            ("node_num", "node_count"),
            ("access_ip", "access_ip"),
            ("enterprise_project_id", "enterprise_project_id"),
            ("engine_version", "engine_version"),
            ("admin_user", "admin_user_name"),
        ],
        &mut attributes,
    );
    if let Some(port) = path_string("access_port", body) {
        attributes.insert("access_port".to_string(), Value::String(port));
    }

    // The API returns the zones as one comma separated string
    let zones: Vec<Value> = path_str("available_zone", body)
        .unwrap_or_default()
        .split(',')
        .filter(|z| !z.is_empty())
        .map(Value::from)
        .collect();
    attributes.insert("availability_zones".to_string(), Value::List(zones));

    let nodes: Vec<Value> = path_array("nodes", body)
        .iter()
        .map(|node| {
            let mut block = HashMap::new();
            for key in ["status", "port", "ip"] {
                if let Some(v) = path_string(key, node) {
                    block.insert(key.to_string(), Value::String(v));
                }
            }
            Value::Map(block)
        })
        .collect();
    attributes.insert("nodes".to_string(), Value::List(nodes));
    attributes
}

// =============================================================================
// Helpers
// =============================================================================

/// Follow the order of a pre-paid instance; returns the instance ID
async fn create_pre_paid(
    ctx: &ProviderContext,
    data: &ResourceData,
    resp: &Json,
) -> ProviderResult<String> {
    let order_id = path_str("order_id", resp).ok_or_else(|| {
        ProviderError::new("unable to find order_id of the DDM instance from the API response")
            .for_resource(data.id.clone())
    })?;
    let bss = ctx.client(orders::SERVICE, data).await?;
    let timeout = data.timeout(TimeoutKind::Create);
    orders::wait_order_complete(ctx, &bss, &order_id, timeout)
        .await
        .map_err(|e| provider_error(&data.id, format!("error waiting for order {}", order_id), e))?;
    orders::wait_order_resource(ctx, &bss, &order_id, timeout)
        .await
        .map_err(|e| {
            provider_error(
                &data.id,
                format!("error waiting for order resource {} complete", order_id),
                e,
            )
        })
}

async fn wait_running(
    ctx: &ProviderContext,
    client: &ServiceClient,
    instance_id: &str,
    timeout: Duration,
    delay: Duration,
    poll_interval: Duration,
) -> Result<(), WaitError> {
    let conf = StateChangeConf::new(&["PENDING"], &["RUNNING"])
        .timeout(timeout)
        .delay(delay)
        .poll_interval(poll_interval);
    ctx.state_change(conf)
        .wait(|| instance_status(client, instance_id))
        .await
        .map(|_| ())
}

/// Apply parameter values and wait for the instance to settle; returns
/// whether a restart is needed
async fn modify_parameters(
    ctx: &ProviderContext,
    client: &ServiceClient,
    instance_id: &str,
    parameters: &[Value],
    data: &ResourceData,
) -> Result<bool, WaitError> {
    let path = replace_vars(
        "v3/{project_id}/instances/{instance_id}/configurations",
        &[("instance_id", instance_id)],
    );
    let body = build_parameters_body(parameters);
    let resp = retry_on_operation_conflict(
        OPERATION_CONFLICT_CODES,
        data.timeout(TimeoutKind::Update),
        ctx.wait_policy.apply(CONFLICT_RETRY_INTERVAL),
        || client.put(&path, body.clone()),
    )
    .await?;
    wait_running(
        ctx,
        client,
        instance_id,
        data.timeout(TimeoutKind::Update),
        PARAMETERS_DELAY,
        POLL_INTERVAL,
    )
    .await?;
    Ok(resp
        .get("needRestart")
        .and_then(Json::as_bool)
        .unwrap_or(false))
}

async fn restart(
    ctx: &ProviderContext,
    client: &ServiceClient,
    instance_id: &str,
    timeout: Duration,
) -> Result<(), WaitError> {
    let path = format!("{}/action", instance_path(instance_id));
    let body = json!({"restart": {"type": "soft"}});
    retry_on_operation_conflict(
        OPERATION_CONFLICT_CODES,
        timeout,
        ctx.wait_policy.apply(CONFLICT_RETRY_INTERVAL),
        || client.post(&path, body.clone()),
    )
    .await?;
    debug!("restart of DDM instance {} accepted", instance_id);
    wait_running(ctx, client, instance_id, timeout, RESTART_DELAY, POLL_INTERVAL).await
}

/// Current values of the configured parameters
async fn read_parameters(
    client: &ServiceClient,
    instance_id: &str,
    configured: &[Value],
) -> SdkResult<Vec<Value>> {
    let path = replace_vars(
        "v3/{project_id}/instances/{instance_id}/configurations",
        &[("instance_id", instance_id)],
    );
    let configs =
        list_all_by_offset(client, &path, "configuration_parameter", DEFAULT_PAGE_LIMIT).await?;

    let wanted: Vec<&str> = configured
        .iter()
        .filter_map(Value::as_map)
        .filter_map(|p| p.get("name").and_then(Value::as_str))
        .collect();
    Ok(configs
        .iter()
        .filter_map(|c| {
            let name = path_str("name", c)?;
            if !wanted.contains(&name.as_str()) {
                return None;
            }
            let mut block = HashMap::new();
            block.insert("name".to_string(), Value::String(name));
            block.insert(
                "value".to_string(),
                Value::String(path_string("value", c).unwrap_or_default()),
            );
            Some(Value::Map(block))
        })
        .collect())
}

async fn update_flavor(
    ctx: &ProviderContext,
    client: &ServiceClient,
    data: &ResourceData,
    instance_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let flavor_id = data.require_str("flavor_id")?;
    let engine_id = data.require_str("engine_id")?;
    let spec_code = find_spec_code(client, flavor_id, engine_id)
        .await
        .map_err(|e| provider_error(&data.id, "error querying DDM flavors", e))?
        .ok_or_else(|| {
            ProviderError::new(format!("can not find flavor by flavor ID: {}", flavor_id))
                .for_resource(data.id.clone())
        })?;

    let path = replace_vars(
        "v3/{project_id}/instances/{instance_id}/flavor",
        &[("instance_id", instance_id)],
    );
    let body = remove_nil(json!({
        "spec_code": spec_code,
        "group_id": attr_ignore_empty(data.get("param_group_id")),
        "is_auto_pay": true,
    }));
    client
        .put(&path, body)
        .await
        .map_err(|e| provider_error(&data.id, "error updating DDM instance flavor", e))?;

    wait_running(ctx, client, instance_id, timeout, RESIZE_DELAY, POLL_INTERVAL)
        .await
        .map_err(|e| provider_error(&data.id, "error waiting for flavor change", e))
}

async fn update_node_num(
    ctx: &ProviderContext,
    client: &ServiceClient,
    data: &ResourceData,
    instance_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let old = data.old("node_num").and_then(Value::as_int).unwrap_or(0);
    let new = data.get_int("node_num").unwrap_or(0);
    let (action, node_number) = if old < new {
        ("enlarge", new - old)
    } else {
        ("reduce", old - new)
    };

    let path = replace_vars(
        "v2/{project_id}/instances/{instance_id}/action/{action}",
        &[("instance_id", instance_id), ("action", action)],
    );
    client
        .request(
            Method::POST,
            &path,
            RequestOpts::new().json(build_resize_body(data, node_number)),
        )
        .await
        .map_err(|e| provider_error(&data.id, "error updating DDM instance node number", e))?;

    wait_running(ctx, client, instance_id, timeout, RESIZE_DELAY, POLL_INTERVAL)
        .await
        .map_err(|e| provider_error(&data.id, "error waiting for node number change", e))
}

/// Spec code of a compute flavor, searched across the paged flavor list
async fn find_spec_code(
    client: &ServiceClient,
    flavor_id: &str,
    engine_id: &str,
) -> SdkResult<Option<String>> {
    let mut offset = 0;
    loop {
        let path = format!(
            "v2/{{project_id}}/flavors?engine_id={}&offset={}",
            urlencoding::encode(engine_id),
            offset
        );
        let body = client.get(&path).await?;
        let groups = path_array("computeFlavorGroups", &body);

        let found = groups
            .iter()
            .flat_map(|g| path_array("computeFlavors", g))
            .find(|f| path_str("id", f).as_deref() == Some(flavor_id))
            .and_then(|f| path_str("code", &f));
        if found.is_some() {
            return Ok(found);
        }

        // Each CPU architecture group pages independently
        let mut page_end = 0;
        let mut remaining = false;
        for group in &groups {
            let end = path_i64("offset", group).unwrap_or(0) + path_i64("limit", group).unwrap_or(0);
            page_end = page_end.max(end);
            if end < path_i64("total", group).unwrap_or(0) {
                remaining = true;
            }
        }
        if !remaining || page_end <= offset {
            return Ok(None);
        }
        offset = page_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::ResourceId;

    fn data(pairs: &[(&str, Value)]) -> ResourceData {
        ResourceData::new(
            ResourceId::new("ddm_instance", "db"),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn parameter(name: &str, value: &str) -> Value {
        let mut map = HashMap::new();
        map.insert("name".to_string(), Value::from(name));
        map.insert("value".to_string(), Value::from(value));
        Value::Map(map)
    }

    #[test]
    fn create_body_drops_empty_fields() {
        let d = data(&[
            ("name", Value::from("ddm-test")),
            ("flavor_id", Value::from("f1")),
            ("node_num", Value::Int(2)),
            ("engine_id", Value::from("e1")),
            (
                "availability_zones",
                Value::List(vec![Value::from("az1"), Value::from("az2")]),
            ),
            ("vpc_id", Value::from("vpc")),
            ("subnet_id", Value::from("subnet")),
            ("security_group_id", Value::from("sg")),
            ("time_zone", Value::from("")),
        ]);
        let body = build_create_body(&d, None);
        assert_eq!(body["instance"]["node_num"], json!(2));
        assert_eq!(body["instance"]["available_zones"], json!(["az1", "az2"]));
        assert!(body["instance"].get("time_zone").is_none());
        assert!(body["instance"].get("enterprise_project_id").is_none());
        assert_eq!(body["extend_param"]["charge_mode"], json!("postPaid"));
        assert_eq!(body["extend_param"]["is_auto_pay"], json!("true"));
        assert!(body["extend_param"].get("period_type").is_none());
    }

    #[test]
    fn pre_paid_create_body() {
        let d = data(&[
            ("name", Value::from("ddm-test")),
            ("charging_mode", Value::from("prePaid")),
            ("period_unit", Value::from("month")),
            ("period", Value::Int(3)),
            ("auto_renew", Value::from("true")),
        ]);
        let body = build_create_body(&d, None);
        assert_eq!(
            body["extend_param"],
            json!({
                "charge_mode": "prePaid",
                "period_type": "month",
                "period_num": 3,
                "is_auto_renew": "true",
                "is_auto_pay": "true"
            })
        );
    }

    #[test]
    fn parameters_body() {
        let body = build_parameters_body(&[
            parameter("bind_table", "t1"),
            parameter("max_connections", "2000"),
        ]);
        assert_eq!(
            body,
            json!({"values": {"bind_table": "t1", "max_connections": "2000"}})
        );
    }

    #[test]
    fn flattens_instance() {
        let body = json!({
            "id": "i1",
            "status": "RUNNING",
            "name": "ddm-test",
            "available_zone": "az1,az2",
            "node_count": 2,
            "access_port": 5066,
            "admin_user_name": "root",
            "nodes": [{"status": "normal", "port": 5066, "ip": "192.168.0.10"}]
        });
        let attrs = flatten_instance(&body);
        assert_eq!(attrs["node_num"], Value::Int(2));
        assert_eq!(attrs["access_port"], Value::from("5066"));
        assert_eq!(attrs["admin_user"], Value::from("root"));
        assert_eq!(
            attrs["availability_zones"],
            Value::List(vec![Value::from("az1"), Value::from("az2")])
        );
        let Value::List(nodes) = &attrs["nodes"] else {
            panic!("nodes should be a list");
        };
        assert_eq!(nodes[0].as_map().unwrap()["port"], Value::from("5066"));
    }

    #[test]
    fn resize_body() {
        let d = data(&[("flavor_id", Value::from("f1"))]);
        assert_eq!(
            build_resize_body(&d, 2),
            json!({"flavor_id": "f1", "node_number": 2, "is_auto_pay": true})
        );
    }
}
