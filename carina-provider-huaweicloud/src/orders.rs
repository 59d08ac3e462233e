//! Pre-paid subscriptions
//!
//! Pre-paid resources are bought through a BSS order. The service answers
//! the create call with an order ID; the resource exists once the order is
//! paid and its main resource has been provisioned. Deleting a pre-paid
//! resource means unsubscribing it.

use std::time::Duration;

use log::debug;
use reqwest::Method;
use serde_json::{Value as Json, json};

use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::resource_data::ResourceData;
use crate::resources::ProviderContext;
use crate::utils::{path_str, path_string};
use crate::wait::{StateChangeConf, WaitError};

pub(crate) const SERVICE: &str = "bss";

const ORDER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Order statuses reported by BSS
const ORDER_PROCESSING: &str = "3";
const ORDER_COMPLETED: &str = "5";
const ORDER_CANCELLED: &str = "6";

/// Error code BSS answers with when the resource to unsubscribe is unknown
pub(crate) const SUBSCRIPTION_NOT_FOUND_CODES: &[&str] = &["CBC.30000067"];

pub fn is_pre_paid(data: &ResourceData) -> bool {
    data.get_str("charging_mode") == Some("prePaid")
}

async fn order_status(client: &ServiceClient, order_id: &str) -> Result<(Json, String), WaitError> {
    let body = client
        .get(&format!("v2/orders/customer-orders/details/{}", order_id))
        .await?;
    let status = path_string("order_info.status", &body).unwrap_or_default();
    if status == ORDER_CANCELLED {
        return Err(WaitError::Failed(format!("order {} was cancelled", order_id)));
    }
    Ok((body, status))
}

/// Wait until the order is paid and processed
pub async fn wait_order_complete(
    ctx: &ProviderContext,
    client: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> Result<(), WaitError> {
    let conf = StateChangeConf::new(&[ORDER_PROCESSING], &[ORDER_COMPLETED])
        .timeout(timeout)
        .poll_interval(ORDER_POLL_INTERVAL);
    ctx.state_change(conf)
        .wait(|| order_status(client, order_id))
        .await
        .map(|_| ())
}

async fn order_resource(client: &ServiceClient, order_id: &str) -> Result<(String, String), WaitError> {
    let body = client
        .post(
            "v2/orders/suscriptions/resources/query",
            json!({"order_id": order_id, "only_main_resource": 1}),
        )
        .await?;
    match path_str("data[0].resource_id", &body) {
        Some(id) if !id.is_empty() => Ok((id, "DONE".to_string())),
        _ => Ok((String::new(), "PENDING".to_string())),
    }
}

/// Wait until the order's main resource exists and return its ID
pub async fn wait_order_resource(
    ctx: &ProviderContext,
    client: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> Result<String, WaitError> {
    let conf = StateChangeConf::new(&["PENDING"], &["DONE"])
        .timeout(timeout)
        .poll_interval(ORDER_POLL_INTERVAL);
    let resource_id = ctx
        .state_change(conf)
        .wait(|| order_resource(client, order_id))
        .await?;
    debug!("order {} provisioned resource {}", order_id, resource_id);
    Ok(resource_id)
}

/// Unsubscribe pre-paid resources, releasing them immediately
pub async fn unsubscribe(client: &ServiceClient, resource_ids: &[&str]) -> SdkResult<()> {
    client
        .post(
            "v2/orders/subscriptions/resources/unsubscribe",
            json!({"resource_ids": resource_ids, "unsubscribe_type": 1}),
        )
        .await?;
    Ok(())
}

/// Turn automatic renewal of a subscription on or off
pub async fn update_auto_renew(
    client: &ServiceClient,
    resource_id: &str,
    enabled: bool,
) -> SdkResult<()> {
    let path = format!("v2/orders/subscriptions/resources/autorenew/{}", resource_id);
    let (method, action) = if enabled {
        (Method::POST, "autorenew")
    } else {
        (Method::DELETE, "delete_autorenew")
    };
    client
        .request(
            method,
            &format!("{}?action_id={}", path, action),
            RequestOpts::new().ok_codes(&[200, 204]),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::{ResourceId, Value};
    use std::collections::HashMap;

    #[test]
    fn pre_paid_only_when_asked() {
        let mut attrs = HashMap::new();
        let id = ResourceId::new("ddm_instance", "db");
        assert!(!is_pre_paid(&ResourceData::new(id.clone(), attrs.clone())));

        attrs.insert("charging_mode".to_string(), Value::from("postPaid"));
        assert!(!is_pre_paid(&ResourceData::new(id.clone(), attrs.clone())));

        attrs.insert("charging_mode".to_string(), Value::from("prePaid"));
        assert!(is_pre_paid(&ResourceData::new(id, attrs)));
    }
}
