//! `ccm_private_ca`: private certificate authorities, pay-per-use or pre-paid

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use log::debug;
use reqwest::Method;
use serde_json::{Value as Json, json};

use crate::client::{RequestOpts, SdkError, SdkResult, ServiceClient};
use crate::errors::{check_deleted, convert_expected_400_into_404, provider_error};
use crate::orders::{self, is_pre_paid};
use crate::resource_data::{ResourceData, TimeoutKind};
use crate::resources::{ProviderContext, ResourceHandler};
use crate::schemas;
use crate::tags::{create_tags, get_tags, update_tags};
use crate::utils::{
    attr_ignore_empty, flatten_block, flatten_fields, format_timestamp_rfc3339, path_i64,
    path_str, remove_nil, value_to_json,
};
use crate::wait::{StateChangeConf, WaitError};

const SERVICE: &str = "ccm";

/// Error code CCM answers with for a CA that does not exist
const CA_NOT_FOUND_CODES: &[&str] = &["PCA.10010002"];

const DEFAULT_KEY_USAGES: [&str; 3] = ["digitalSignature", "keyCertSign", "cRLSign"];

const UNSUBSCRIBE_DELAY: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct PrivateCa;

#[async_trait]
impl ResourceHandler for PrivateCa {
    fn type_name(&self) -> &'static str {
        "ccm_private_ca"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ccm::private_ca_schema()
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        if data.get_str("type") == Some("SUBORDINATE") && data.get_str("issuer_id").is_none() {
            return Err(ProviderError::new(
                "the parameter `issuer_id` is required when creating a subordinate private CA",
            )
            .for_resource(data.id.clone()));
        }
        let client = ctx.client(SERVICE, data).await?;

        let ca_id = if is_pre_paid(data) {
            create_pre_paid(ctx, &client, data).await?
        } else {
            let body = build_create_body(data, ctx.enterprise_project_id(data));
            let resp = client
                .post("v1/private-certificate-authorities", body)
                .await
                .map_err(|e| provider_error(&data.id, "error creating CCM private CA", e))?;
            let ca_id = path_str("ca_id", &resp).ok_or_else(|| {
                ProviderError::new("unable to find the CCM private CA ID from the API response")
                    .for_resource(data.id.clone())
            })?;
            data.set_identifier(ca_id.clone());
            ca_id
        };

        if let Some(tags) = data.get_map("tags") {
            create_tags(&client, &ca_path(&ca_id), tags)
                .await
                .map_err(|e| provider_error(&data.id, "error creating CCM private CA tags", e))?;
        }

        if data.get_str("action") == Some("disable") {
            ca_action(&client, &ca_id, "disable")
                .await
                .map_err(|e| provider_error(&data.id, "error disabling CCM private CA", e))?;
        }
        Ok(())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>> {
        let client = ctx.client(SERVICE, data).await?;
        let ca_id = data.identifier()?;

        let body = match get_ca(&client, ca_id)
            .await
            .map_err(|e| provider_error(&data.id, "error retrieving CCM private CA", e))?
        {
            Some(body) => body,
            None => return Ok(None),
        };
        if path_str("status", &body).as_deref() == Some("DELETED") {
            return Ok(None);
        }

        let tags = get_tags(&client, &ca_path(ca_id))
            .await
            .map_err(|e| provider_error(&data.id, "error fetching CCM private CA tags", e))?;

        let mut attributes = flatten_private_ca(&body);
        attributes.insert("region".to_string(), Value::from(client.region()));
        attributes.insert("tags".to_string(), Value::Map(tags));
        Ok(Some(attributes))
    }

    async fn update(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let ca_id = data.identifier()?;

        if data.has_change("tags") {
            let empty = HashMap::new();
            let old = data.old("tags").and_then(Value::as_map).unwrap_or(&empty);
            let new = data.get_map("tags").unwrap_or(&empty);
            update_tags(&client, &ca_path(ca_id), old, new)
                .await
                .map_err(|e| provider_error(&data.id, "error updating CCM private CA tags", e))?;
        }

        let old_crl_enabled = data
            .old("crl_configuration")
            .and_then(first_block)
            .and_then(|b| b.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        // A removed block means publishing is off
        let crl = data.get_block("crl_configuration");
        let crl_enabled = crl
            .and_then(|b| b.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if crl_enabled != old_crl_enabled {
            update_crl_configuration(&client, ca_id, crl_enabled, crl)
                .await
                .map_err(|e| {
                    provider_error(&data.id, "error updating CRL configuration of CCM private CA", e)
                })?;
        }

        if data.has_change("action") {
            if let Some(action) = data.get_str("action") {
                ca_action(&client, ca_id, action).await.map_err(|e| {
                    provider_error(&data.id, format!("error applying action {} to CCM private CA", action), e)
                })?;
            }
        }
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let ca_id = data.identifier()?;
        if is_pre_paid(data) {
            return delete_pre_paid(ctx, &client, data, ca_id).await;
        }

        let body = match get_ca(&client, ca_id)
            .await
            .map_err(|e| provider_error(&data.id, "error retrieving CCM private CA", e))?
        {
            Some(body) => body,
            None => return Ok(()),
        };
        match path_str("status", &body).as_deref() {
            Some("DELETED") => return Ok(()),
            Some("ACTIVED") | Some("EXPIRED") => {
                ca_action(&client, ca_id, "disable")
                    .await
                    .map_err(|e| provider_error(&data.id, "error disabling CCM private CA", e))?;
            }
            _ => {}
        }

        let pending_days = data.get_str("pending_days").unwrap_or("7");
        let path = format!("{}?pending_days={}", ca_path(ca_id), pending_days);
        client
            .request(Method::DELETE, &path, RequestOpts::new().ok_codes(&[200, 204]))
            .await
            .map_err(|e| provider_error(&data.id, "error deleting CCM private CA", e))?;
        Ok(())
    }
}

fn ca_path(ca_id: &str) -> String {
    format!("v1/private-certificate-authorities/{}", ca_id)
}

fn first_block(value: &Value) -> Option<&HashMap<String, Value>> {
    match value {
        Value::List(items) => items.first().and_then(Value::as_map),
        Value::Map(map) => Some(map),
        _ => None,
    }
}

/// Buy a CA through an order, then activate it; returns the CA ID
async fn create_pre_paid(
    ctx: &ProviderContext,
    client: &ServiceClient,
    data: &mut ResourceData,
) -> ProviderResult<String> {
    let enterprise_project_id = ctx.enterprise_project_id(data);
    let body = build_pre_paid_body(data, enterprise_project_id.clone())?;
    let resp = client
        .post("v1/private-certificate-authorities/order", body)
        .await
        .map_err(|e| provider_error(&data.id, "error creating CCM prepaid private CA", e))?;
    let ca_id = path_str("ca_ids[0]", &resp).ok_or_else(|| {
        ProviderError::new("unable to find the CCM prepaid private CA ID from the API response")
            .for_resource(data.id.clone())
    })?;
    data.set_identifier(ca_id.clone());

    let order_id = path_str("order_id", &resp).ok_or_else(|| {
        ProviderError::new(
            "unable to find the order ID of the CCM prepaid private CA from the API response",
        )
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
        })?;

    client
        .request(
            Method::POST,
            &format!("{}/activate", ca_path(&ca_id)),
            RequestOpts::new()
                .ok_codes(&[204])
                .json(build_create_body(data, enterprise_project_id)),
        )
        .await
        .map_err(|e| provider_error(&data.id, "error activating CCM private CA", e))?;
    Ok(ca_id)
}

async fn delete_pre_paid(
    ctx: &ProviderContext,
    client: &ServiceClient,
    data: &ResourceData,
    ca_id: &str,
) -> ProviderResult<()> {
    let bss = ctx.client(orders::SERVICE, data).await?;
    let result = orders::unsubscribe(&bss, &[ca_id]).await.map_err(|e| {
        convert_expected_400_into_404(e, "error_code", orders::SUBSCRIPTION_NOT_FOUND_CODES)
    });
    if check_deleted(result)
        .map_err(|e| provider_error(&data.id, "error unsubscribing CCM private CA", e))?
        .is_none()
    {
        return Ok(());
    }

    let conf = StateChangeConf::new(&["PENDING"], &["COMPLETED"])
        .timeout(data.timeout(TimeoutKind::Delete))
        .delay(UNSUBSCRIBE_DELAY)
        .poll_interval(POLL_INTERVAL);
    ctx.state_change(conf)
        .wait(|| ca_deletion_state(client, ca_id))
        .await
        .map_err(|e| {
            provider_error(
                &data.id,
                format!("error waiting for CCM prepaid private CA ({}) to be deleted", ca_id),
                e,
            )
        })
}

async fn ca_deletion_state(client: &ServiceClient, ca_id: &str) -> Result<((), String), WaitError> {
    let state = match get_ca(client, ca_id).await? {
        None => "COMPLETED",
        Some(body) if path_str("status", &body).as_deref() == Some("DELETED") => "COMPLETED",
        Some(_) => "PENDING",
    };
    Ok(((), state.to_string()))
}

/// The CA, or `None` once CCM reports it unknown
async fn get_ca(client: &ServiceClient, ca_id: &str) -> SdkResult<Option<Json>> {
    let result = client
        .get(&ca_path(ca_id))
        .await
        .map_err(|e: SdkError| convert_expected_400_into_404(e, "error_code", CA_NOT_FOUND_CODES));
    check_deleted(result)
}

/// `enable` or `disable` the CA
async fn ca_action(client: &ServiceClient, ca_id: &str, action: &str) -> SdkResult<()> {
    debug!("{} CCM private CA {}", action, ca_id);
    client
        .request(
            Method::POST,
            &format!("{}/{}", ca_path(ca_id), action),
            RequestOpts::new().ok_codes(&[204]),
        )
        .await?;
    Ok(())
}

async fn update_crl_configuration(
    client: &ServiceClient,
    ca_id: &str,
    enabled: bool,
    crl: Option<&HashMap<String, Value>>,
) -> SdkResult<()> {
    let mut opts = RequestOpts::new().ok_codes(&[204]);
    let action = if enabled {
        if let Some(crl) = crl {
            opts = opts.json(remove_nil(json!({
                "crl_name": attr_ignore_empty(crl.get("crl_name")),
                "obs_bucket_name": crl.get("obs_bucket_name").map(value_to_json),
                "valid_days": crl.get("valid_days").map(value_to_json),
            })));
        }
        "enable"
    } else {
        "disable"
    };
    client
        .request(
            Method::POST,
            &format!("{}/crl/{}", ca_path(ca_id), action),
            opts,
        )
        .await?;
    Ok(())
}

// =============================================================================
// Request bodies
// =============================================================================

fn build_create_body(data: &ResourceData, enterprise_project_id: Option<String>) -> Json {
    let distinguished_name = data.get_block("distinguished_name").map(|dn| {
        json!({
            "common_name": dn.get("common_name").map(value_to_json),
            "country": dn.get("country").map(value_to_json),
            "state": dn.get("state").map(value_to_json),
            "locality": dn.get("locality").map(value_to_json),
            "organization": dn.get("organization").map(value_to_json),
            "organizational_unit": dn.get("organizational_unit").map(value_to_json),
        })
    });
    let validity = data.get_block("validity").map(|v| {
        json!({
            "type": v.get("type").map(value_to_json),
            "value": v.get("value").map(value_to_json),
            "start_from": attr_ignore_empty(v.get("started_at")),
        })
    });

    remove_nil(json!({
        "type": data.get_str("type"),
        "distinguished_name": distinguished_name,
        "key_algorithm": data.get_str("key_algorithm"),
        "signature_algorithm": data.get_str("signature_algorithm"),
        "validity": validity,
        "issuer_id": data.get_str("issuer_id"),
        "path_length": attr_ignore_empty(data.get("path_length")),
        "key_usages": build_key_usages(data),
        "crl_configuration": build_crl_configuration(data),
        "enterprise_project_id": enterprise_project_id,
    }))
}

/// Order body of a pre-paid CA; the validity decides the subscription period
fn build_pre_paid_body(
    data: &ResourceData,
    enterprise_project_id: Option<String>,
) -> ProviderResult<Json> {
    let validity = data.get_block("validity");
    let validity_type = validity
        .and_then(|v| v.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let period_type = match validity_type {
        "YEAR" => 3,
        "MONTH" => 2,
        other => {
            return Err(ProviderError::new(format!(
                "the validity type value ({}) is invalid, only `YEAR` or `MONTH` is supported when creating a prepaid private CA",
                other
            ))
            .for_resource(data.id.clone()));
        }
    };
    let period_num = validity
        .and_then(|v| v.get("value"))
        .and_then(Value::as_int)
        .unwrap_or(1);
    let auto_renew = if data.get_str("auto_renew") == Some("true") { 1 } else { 0 };

    Ok(remove_nil(json!({
        "cloud_service_type": "hws.service.type.ccm",
        "charging_mode": 0,
        "period_type": period_type,
        "period_num": period_num,
        "is_auto_renew": auto_renew,
        "is_auto_pay": 1,
        "subscription_num": 1,
        "enterprise_project_id": enterprise_project_id,
        "product_infos": [{
            "cloud_service_type": "hws.service.type.ccm",
            "resource_type": "hws.resource.type.pca.duration",
            "resource_spec_code": "ca.duration",
        }],
    })))
}

/// Root CAs always use the default usages
fn build_key_usages(data: &ResourceData) -> Vec<String> {
    let usages = data.get_string_list("key_usages");
    if data.get_str("type") == Some("ROOT") || usages.is_empty() {
        return DEFAULT_KEY_USAGES.iter().map(|u| u.to_string()).collect();
    }
    usages
}

/// Only sent when CRL publishing is enabled
fn build_crl_configuration(data: &ResourceData) -> Option<Json> {
    let crl = data.get_block("crl_configuration")?;
    if crl.get("enabled").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    Some(json!({
        "enabled": true,
        "crl_name": crl.get("crl_name").map(value_to_json),
        "obs_bucket_name": crl.get("obs_bucket_name").map(value_to_json),
        "valid_days": crl.get("valid_days").map(value_to_json),
    }))
}

// =============================================================================
// Flattening
// =============================================================================

fn flatten_private_ca(body: &Json) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    flatten_fields(
        body,
        &[
            ("type", "type"),
            ("key_algorithm", "key_algorithm"),
            ("signature_algorithm", "signature_algorithm"),
            ("issuer_id", "issuer_id"),
            ("issuer_name", "issuer_name"),
            ("path_length", "path_length"),
            ("enterprise_project_id", "enterprise_project_id"),
            ("status", "status"),
            ("gen_mode", "gen_mode"),
            ("serial_number", "serial_number"),
            ("free_quota", "free_quota"),
        ],
        &mut attributes,
    );

    // 1 is pay-per-use, 0 a pre-paid subscription
    match path_i64("charging_mode", body) {
        Some(1) => {
            attributes.insert("charging_mode".to_string(), Value::from("postPaid"));
        }
        Some(0) => {
            attributes.insert("charging_mode".to_string(), Value::from("prePaid"));
        }
        _ => {}
    }

    // Timestamps are milliseconds since the epoch
    for (attr, key) in [("created_at", "create_time"), ("expired_at", "not_after")] {
        let secs = path_i64(key, body).unwrap_or(0) / 1000;
        attributes.insert(attr.to_string(), Value::String(format_timestamp_rfc3339(secs)));
    }

    if let Some(dn) = flatten_block(
        body.get("distinguished_name"),
        &[
            ("common_name", "common_name"),
            ("country", "country"),
            ("state", "state"),
            ("locality", "locality"),
            ("organization", "organization"),
            ("organizational_unit", "organizational_unit"),
        ],
    ) {
        attributes.insert("distinguished_name".to_string(), dn);
    }
    if let Some(crl) = flatten_block(
        body.get("crl_configuration"),
        &[
            ("enabled", "enabled"),
            ("crl_name", "crl_name"),
            ("obs_bucket_name", "obs_bucket_name"),
            ("valid_days", "valid_days"),
            ("crl_dis_point", "crl_dis_point"),
        ],
    ) {
        attributes.insert("crl_configuration".to_string(), crl);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::ResourceId;

    fn block(pairs: &[(&str, Value)]) -> Value {
        Value::List(vec![Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )])
    }

    fn data(pairs: &[(&str, Value)]) -> ResourceData {
        ResourceData::new(
            ResourceId::new("ccm_private_ca", "ca"),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn root_ca_uses_default_key_usages() {
        let d = data(&[
            ("type", Value::from("ROOT")),
            (
                "key_usages",
                Value::List(vec![Value::from("digitalSignature")]),
            ),
        ]);
        assert_eq!(
            build_key_usages(&d),
            vec!["digitalSignature", "keyCertSign", "cRLSign"]
        );

        let d = data(&[
            ("type", Value::from("SUBORDINATE")),
            (
                "key_usages",
                Value::List(vec![Value::from("digitalSignature")]),
            ),
        ]);
        assert_eq!(build_key_usages(&d), vec!["digitalSignature"]);
    }

    #[test]
    fn create_body() {
        let d = data(&[
            ("type", Value::from("ROOT")),
            (
                "distinguished_name",
                block(&[
                    ("common_name", Value::from("example")),
                    ("country", Value::from("CN")),
                ]),
            ),
            ("key_algorithm", Value::from("RSA2048")),
            ("signature_algorithm", Value::from("SHA256")),
            (
                "validity",
                block(&[("type", Value::from("YEAR")), ("value", Value::Int(1))]),
            ),
            (
                "crl_configuration",
                block(&[("enabled", Value::Bool(false))]),
            ),
        ]);
        let body = build_create_body(&d, Some("0".to_string()));
        assert_eq!(body["validity"], json!({"type": "YEAR", "value": 1}));
        assert_eq!(body["distinguished_name"]["country"], json!("CN"));
        assert!(body.get("crl_configuration").is_none());
        assert!(body.get("issuer_id").is_none());
        assert_eq!(body["enterprise_project_id"], json!("0"));
    }

    #[test]
    fn flattens_ca() {
        let body = json!({
            "ca_id": "ca-1",
            "type": "ROOT",
            "status": "ACTIVED",
            "charging_mode": 1,
            "create_time": 1700000000000i64,
            "not_after": 0,
            "path_length": 7,
            "distinguished_name": {"common_name": "example", "country": "CN"},
            "crl_configuration": {"enabled": false}
        });
        let attrs = flatten_private_ca(&body);
        assert_eq!(attrs["charging_mode"], Value::from("postPaid"));
        assert!(!flatten_private_ca(&json!({"status": "ACTIVED"})).contains_key("charging_mode"));
        assert_eq!(attrs["created_at"], Value::from("2023-11-14T22:13:20Z"));
        assert_eq!(attrs["expired_at"], Value::from(""));
        assert_eq!(attrs["path_length"], Value::Int(7));
        let dn = first_block(&attrs["distinguished_name"]).unwrap();
        assert_eq!(dn["common_name"], Value::from("example"));
    }

    #[test]
    fn pre_paid_order_body() {
        let d = data(&[
            ("type", Value::from("ROOT")),
            (
                "validity",
                block(&[("type", Value::from("YEAR")), ("value", Value::Int(2))]),
            ),
            ("auto_renew", Value::from("true")),
        ]);
        let body = build_pre_paid_body(&d, None).unwrap();
        assert_eq!(body["period_type"], json!(3));
        assert_eq!(body["period_num"], json!(2));
        assert_eq!(body["is_auto_renew"], json!(1));
        assert_eq!(body["product_infos"][0]["resource_spec_code"], json!("ca.duration"));
        assert!(body.get("enterprise_project_id").is_none());

        let d = data(&[(
            "validity",
            block(&[("type", Value::from("DAY")), ("value", Value::Int(30))]),
        )]);
        assert!(build_pre_paid_body(&d, None).is_err());
    }
}
