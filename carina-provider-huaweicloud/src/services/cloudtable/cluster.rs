//! `cloudtable_cluster`: CloudTable HBase clusters
//!
//! Clusters are immutable once created; every input forces a replacement,
//! so `update` has nothing to send.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use reqwest::Method;
use serde_json::{Value as Json, json};

use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::errors::{check_deleted, provider_error};
use crate::resource_data::{ResourceData, TimeoutKind};
use crate::resources::{ProviderContext, ResourceHandler};
use crate::schemas;
use crate::tags::expand_resource_tags;
use crate::utils::{flatten_fields, path_int, path_str, path_string, remove_nil, replace_vars};
use crate::wait::{StateChangeConf, WaitError};

const SERVICE: &str = "cloudtable";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

const STATUS_CREATING: &str = "100";
const STATUS_RUNNING: &str = "200";

pub struct CloudTableCluster;

#[async_trait]
impl ResourceHandler for CloudTableCluster {
    fn type_name(&self) -> &'static str {
        "cloudtable_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::cloudtable::cluster_schema()
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;

        let resp = send(
            &client,
            Method::POST,
            "v2/{project_id}/clusters",
            Some(build_create_body(data)),
        )
        .await
        .map_err(|e| provider_error(&data.id, "error creating CloudTable cluster", e))?;
        let cluster_id = path_str("cluster_id", &resp).ok_or_else(|| {
            ProviderError::new("unable to find the CloudTable cluster ID from the API response")
                .for_resource(data.id.clone())
        })?;
        data.set_identifier(cluster_id.clone());

        let conf = StateChangeConf::new(&[STATUS_CREATING], &[STATUS_RUNNING])
            .timeout(data.timeout(TimeoutKind::Create))
            .poll_interval(POLL_INTERVAL);
        ctx.state_change(conf)
            .wait(|| cluster_status(&client, &cluster_id))
            .await
            .map_err(|e| {
                provider_error(
                    &data.id,
                    format!("error waiting for CloudTable cluster ({}) to become ready", cluster_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>> {
        let client = ctx.client(SERVICE, data).await?;
        let cluster_id = data.identifier()?;

        let body = check_deleted(send(&client, Method::GET, &cluster_path(cluster_id), None).await)
            .map_err(|e| provider_error(&data.id, "error retrieving CloudTable cluster", e))?;
        Ok(body.map(|body| {
            let mut attributes = flatten_cluster(&body);
            attributes.insert("region".to_string(), Value::from(client.region()));
            attributes
        }))
    }

    async fn update(&self, _ctx: &ProviderContext, _data: &ResourceData) -> ProviderResult<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let cluster_id = data.identifier()?;

        check_deleted(send(&client, Method::DELETE, &cluster_path(cluster_id), None).await)
            .map_err(|e| provider_error(&data.id, "error deleting CloudTable cluster", e))?;

        let conf = StateChangeConf::new(&["DELETING"], &["DELETED"])
            .timeout(data.timeout(TimeoutKind::Delete))
            .poll_interval(POLL_INTERVAL);
        ctx.state_change(conf)
            .wait(|| deletion_status(&client, cluster_id))
            .await
            .map_err(|e| {
                provider_error(
                    &data.id,
                    format!("error waiting for CloudTable cluster ({}) to be deleted", cluster_id),
                    e,
                )
            })?;
        Ok(())
    }
}

fn cluster_path(cluster_id: &str) -> String {
    replace_vars(
        "v2/{project_id}/clusters/{cluster_id}",
        &[("cluster_id", cluster_id)],
    )
}

/// CloudTable answers in the language of `X-Language`
async fn send(
    client: &ServiceClient,
    method: Method,
    path: &str,
    body: Option<Json>,
) -> SdkResult<Json> {
    let mut opts = RequestOpts::new().header("X-Language", "en-us");
    if let Some(body) = body {
        opts = opts.json(body);
    }
    client.request(method, path, opts).await
}

async fn cluster_status(client: &ServiceClient, cluster_id: &str) -> Result<(Json, String), WaitError> {
    let body = send(client, Method::GET, &cluster_path(cluster_id), None).await?;
    let status = path_string("status", &body).unwrap_or_default();
    Ok((body, status))
}

/// `DELETED` once the cluster answers 404
async fn deletion_status(
    client: &ServiceClient,
    cluster_id: &str,
) -> Result<(Json, String), WaitError> {
    match send(client, Method::GET, &cluster_path(cluster_id), None).await {
        Ok(body) => Ok((body, "DELETING".to_string())),
        Err(e) if e.is_not_found() => Ok((Json::Null, "DELETED".to_string())),
        Err(e) => Err(e.into()),
    }
}

fn build_create_body(data: &ResourceData) -> Json {
    let lemon_num = data.get_int("lemon_num").unwrap_or(0);
    let tsd_num = data.get_int("opentsdb_num").unwrap_or(0);
    let sys_tags = data
        .get_map("tags")
        .map(expand_resource_tags)
        .unwrap_or_default();

    remove_nil(json!({
        "cluster": {
            "name": data.get_str("name"),
            "storage_type": data.get_str("storage_type"),
            "vpc_id": data.get_str("vpc_id"),
            "auth_mode": data.get_bool("enable_iam_auth"),
            "enable_lemon": lemon_num > 0,
            "enable_openTSDB": tsd_num > 0,
            "datastore": {
                "type": "hbase",
                "version": "1.0.6",
            },
            "instance": {
                "availability_zone": data.get_str("availability_zone"),
                "cu_num": data.get_int("rs_num"),
                "lemon_num": lemon_num,
                "tsd_num": tsd_num,
                "nics": [{
                    "net_id": data.get_str("subnet_id"),
                    "security_group_id": data.get_str("security_group_id"),
                }],
            },
            "sys_tags": sys_tags,
        }
    }))
}

fn flatten_cluster(body: &Json) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    flatten_fields(
        body,
        &[
            ("name", "cluster_name"),
            ("created", "created"),
            ("hbase_public_endpoint", "hbase_public_endpoint"),
            ("lemon_link", "lemon_link"),
            ("open_tsdb_link", "openTSDB_link"),
            ("opentsdb_public_endpoint", "tsd_public_endpoint"),
            ("security_group_id", "security_group_id"),
            ("storage_type", "storage_type"),
            ("subnet_id", "sub_net_id"),
            ("vpc_id", "vpc_id"),
            ("zookeeper_link", "zookeeper_link"),
        ],
        &mut attributes,
    );

    // Numbers arrive either as JSON numbers or numeric strings
    for (attr, key) in [
        ("status", "status"),
        ("storage_quota", "storage_quota"),
        ("used_storage_size", "used_storage_size"),
    ] {
        if let Some(v) = path_string(key, body) {
            attributes.insert(attr.to_string(), Value::String(v));
        }
    }
    for (attr, key) in [
        ("rs_num", "cu_num"),
        ("lemon_num", "lemon_num"),
        ("opentsdb_num", "tsd_num"),
    ] {
        if let Some(n) = path_int(key, body) {
            attributes.insert(attr.to_string(), Value::Int(n));
        }
    }
    if let Some(auth) = body.get("auth_mode") {
        let enabled = match auth {
            Json::Bool(b) => Some(*b),
            Json::String(s) => s.parse().ok(),
            _ => None,
        };
        if let Some(enabled) = enabled {
            attributes.insert("enable_iam_auth".to_string(), Value::Bool(enabled));
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::ResourceId;

    fn data(pairs: &[(&str, Value)]) -> ResourceData {
        ResourceData::new(
            ResourceId::new("cloudtable_cluster", "ct"),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn create_body() {
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), Value::from("dev"));
        let d = data(&[
            ("name", Value::from("ct-test")),
            ("storage_type", Value::from("COMMON")),
            ("vpc_id", Value::from("vpc")),
            ("subnet_id", Value::from("subnet")),
            ("security_group_id", Value::from("sg")),
            ("availability_zone", Value::from("az1")),
            ("rs_num", Value::Int(2)),
            ("opentsdb_num", Value::Int(2)),
            ("tags", Value::Map(tags)),
        ]);
        let body = build_create_body(&d);
        let cluster = &body["cluster"];
        assert_eq!(cluster["enable_lemon"], json!(false));
        assert_eq!(cluster["enable_openTSDB"], json!(true));
        assert!(cluster.get("auth_mode").is_none());
        assert_eq!(cluster["instance"]["cu_num"], json!(2));
        assert_eq!(
            cluster["instance"]["nics"],
            json!([{"net_id": "subnet", "security_group_id": "sg"}])
        );
        assert_eq!(cluster["datastore"]["version"], json!("1.0.6"));
        assert_eq!(cluster["sys_tags"], json!([{"key": "env", "value": "dev"}]));
    }

    #[test]
    fn flattens_string_numbers() {
        let body = json!({
            "cluster_name": "ct-test",
            "status": "200",
            "cu_num": "3",
            "tsd_num": 0,
            "sub_net_id": "subnet",
            "openTSDB_link": "10.0.0.1:4242",
            "auth_mode": "true",
            "storage_quota": 10240
        });
        let attrs = flatten_cluster(&body);
        assert_eq!(attrs["name"], Value::from("ct-test"));
        assert_eq!(attrs["rs_num"], Value::Int(3));
        assert_eq!(attrs["opentsdb_num"], Value::Int(0));
        assert_eq!(attrs["subnet_id"], Value::from("subnet"));
        assert_eq!(attrs["open_tsdb_link"], Value::from("10.0.0.1:4242"));
        assert_eq!(attrs["enable_iam_auth"], Value::Bool(true));
        assert_eq!(attrs["storage_quota"], Value::from("10240"));
    }
}
