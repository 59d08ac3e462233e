//! `mapreduce_clusters` data source

use std::collections::HashMap;

use async_trait::async_trait;
use carina_core::provider::ProviderResult;
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use serde_json::Value as Json;

use crate::errors::provider_error;
use crate::pagination::list_all_by_page;
use crate::resource_data::ResourceData;
use crate::resources::{DataSourceHandler, ProviderContext};
use crate::schemas;
use crate::utils::{path_array, path_int, path_str, path_string};

const SERVICE: &str = "mrs";

const CLUSTER_STRING_FIELDS: &[(&str, &str)] = &[
    ("id", "clusterId"),
    ("name", "clusterName"),
    ("master_node_num", "masterNodeNum"),
    ("core_node_num", "coreNodeNum"),
    ("total_node_num", "totalNodeNum"),
    ("status", "clusterState"),
    ("billing_type", "billingType"),
    ("vpc_id", "vpcId"),
    ("subnet_id", "subnetId"),
    ("duration", "duration"),
    ("fee", "fee"),
    ("hadoop_version", "hadoopVersion"),
    ("master_node_size", "masterNodeSize"),
    ("core_node_size", "coreNodeSize"),
    ("external_ip", "externalIp"),
    ("external_alternate_ip", "externalAlternateIp"),
    ("internal_ip", "internalIp"),
    ("deployment_id", "deploymentId"),
    ("description", "remark"),
    ("order_id", "orderId"),
    ("master_node_product_id", "masterNodeProductId"),
    ("master_node_spec_id", "masterNodeSpecId"),
    ("core_node_product_id", "coreNodeProductId"),
    ("core_node_spec_id", "coreNodeSpecId"),
    ("availability_zone", "availabilityZoneId"),
    ("vnc", "vnc"),
    ("volume_type", "volumeType"),
    ("enterprise_project_id", "enterpriseProjectId"),
    ("security_group_id", "securityGroupsId"),
    ("slave_security_group_id", "slaveSecurityGroupsId"),
    ("stage_desc", "stageDesc"),
    ("version", "clusterVersion"),
    ("node_public_cert_name", "nodePublicCertName"),
    ("master_node_ip", "masterNodeIp"),
    ("private_ip_first", "privateIpFirst"),
    ("master_data_volume_type", "masterDataVolumeType"),
    ("core_data_volume_type", "coreDataVolumeType"),
    ("scale", "scale"),
    ("eip_id", "eipId"),
    ("eip_address", "eipAddress"),
    ("eipv6_address", "eipv6Address"),
    ("mrs_ecs_default_agency", "mrsEcsDefaultAgency"),
];

const CLUSTER_INT_FIELDS: &[(&str, &str)] = &[
    ("volume_size", "volumeSize"),
    ("type", "clusterType"),
    ("safe_mode", "safeMode"),
    ("log_collection", "logCollection"),
    ("master_data_volume_size", "masterDataVolumeSize"),
    ("master_data_volume_count", "masterDataVolumeCount"),
    ("core_data_volume_size", "coreDataVolumeSize"),
    ("core_data_volume_count", "coreDataVolumeCount"),
    ("period_type", "periodType"),
];

const COMPONENT_FIELDS: &[(&str, &str)] = &[
    ("component_id", "componentId"),
    ("component_name", "componentName"),
    ("component_version", "componentVersion"),
    ("component_desc", "componentDesc"),
];

const NODE_GROUP_STRING_FIELDS: &[(&str, &str)] = &[
    ("group_name", "groupName"),
    ("node_size", "nodeSize"),
    ("node_spec_id", "nodeSpecId"),
    ("node_product_id", "nodeProductId"),
    ("vm_product_id", "vmProductId"),
    ("vm_spec_code", "vmSpecCode"),
    ("root_volume_type", "rootVolumeType"),
    ("root_volume_product_id", "rootVolumeProductId"),
    ("root_volume_resource_spec_code", "rootVolumeResourceSpecCode"),
    ("root_volume_resource_type", "rootVolumeResourceType"),
    ("data_volume_type", "dataVolumeType"),
    ("data_volume_product_id", "dataVolumeProductId"),
    ("data_volume_resource_spec_code", "dataVolumeResourceSpecCode"),
    ("data_volume_resource_type", "dataVolumeResourceType"),
];

const NODE_GROUP_INT_FIELDS: &[(&str, &str)] = &[
    ("node_num", "nodeNum"),
    ("root_volume_size", "rootVolumeSize"),
    ("data_volume_count", "dataVolumeCount"),
    ("data_volume_size", "dataVolumeSize"),
];

pub struct MapReduceClusters;

#[async_trait]
impl DataSourceHandler for MapReduceClusters {
    fn type_name(&self) -> &'static str {
        "mapreduce_clusters"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::mrs::clusters_schema()
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<(String, HashMap<String, Value>)> {
        let client = ctx.client(SERVICE, data).await?;

        let path = format!("v1.1/{{project_id}}/cluster_infos{}", build_query(data));
        let clusters = list_all_by_page(&client, &path, "clusters", "currentPage")
            .await
            .map_err(|e| provider_error(&data.id, "error retrieving MRS clusters", e))?;

        let mut attributes = data.attributes().clone();
        attributes.insert("region".to_string(), Value::from(client.region()));
        attributes.insert(
            "clusters".to_string(),
            Value::List(clusters.iter().map(flatten_cluster).collect()),
        );
        Ok((uuid::Uuid::new_v4().to_string(), attributes))
    }
}

fn build_query(data: &ResourceData) -> String {
    let mut query = String::from("?pageSize=100");
    for (attr, param) in [
        ("name", "clusterName"),
        ("status", "clusterState"),
        ("enterprise_project_id", "enterpriseProjectId"),
        ("tags", "tags"),
    ] {
        if let Some(v) = data.get_str(attr) {
            query.push_str(&format!("&{}={}", param, urlencoding::encode(v)));
        }
    }
    query
}

/// Cluster tags come as one `k1=v1,k2=v2` string
fn parse_tags(raw: &str) -> HashMap<String, Value> {
    raw.split(',')
        .filter_map(|item| item.split_once('='))
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect()
}

fn flatten_object(
    json: &Json,
    string_fields: &[(&str, &str)],
    int_fields: &[(&str, &str)],
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for (attr, key) in string_fields {
        if let Some(v) = path_string(key, json) {
            attributes.insert(attr.to_string(), Value::String(v));
        }
    }
    for (attr, key) in int_fields {
        if let Some(n) = path_int(key, json) {
            attributes.insert(attr.to_string(), Value::Int(n));
        }
    }
    attributes
}

fn flatten_node_groups(cluster: &Json, key: &str) -> Value {
    Value::List(
        path_array(key, cluster)
            .iter()
            .map(|g| Value::Map(flatten_object(g, NODE_GROUP_STRING_FIELDS, NODE_GROUP_INT_FIELDS)))
            .collect(),
    )
}

fn flatten_cluster(cluster: &Json) -> Value {
    let mut attributes = flatten_object(cluster, CLUSTER_STRING_FIELDS, CLUSTER_INT_FIELDS);

    let tags = path_str("tags", cluster).unwrap_or_default();
    attributes.insert("tags".to_string(), Value::Map(parse_tags(&tags)));

    let components = path_array("componentList", cluster)
        .iter()
        .map(|c| Value::Map(flatten_object(c, COMPONENT_FIELDS, &[])))
        .collect();
    attributes.insert("component_list".to_string(), Value::List(components));
    attributes.insert(
        "task_node_groups".to_string(),
        flatten_node_groups(cluster, "taskNodeGroups"),
    );
    attributes.insert(
        "node_groups".to_string(),
        flatten_node_groups(cluster, "nodeGroups"),
    );
    Value::Map(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::ResourceId;
    use serde_json::json;

    #[test]
    fn tags_string() {
        let tags = parse_tags("env=dev,owner=a=b,broken");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["env"], Value::from("dev"));
        assert_eq!(tags["owner"], Value::from("a=b"));
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn query_from_filters() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("mrs 1"));
        attrs.insert("status".to_string(), Value::from("running"));
        let data = ResourceData::new(ResourceId::new("mapreduce_clusters", "all"), attrs);
        assert_eq!(
            build_query(&data),
            "?pageSize=100&clusterName=mrs%201&clusterState=running"
        );
    }

    #[test]
    fn flattens_camel_case_cluster() {
        let cluster = json!({
            "clusterId": "c1",
            "clusterName": "mrs",
            "clusterState": "running",
            "masterNodeNum": "2",
            "clusterType": 0,
            "safeMode": "1",
            "remark": "analytics",
            "tags": "env=dev",
            "componentList": [{"componentId": "MRS 3.1.0_001", "componentName": "Hadoop"}],
            "nodeGroups": [{"groupName": "master_node_default_group", "nodeNum": 2}]
        });
        let Value::Map(attrs) = flatten_cluster(&cluster) else {
            panic!("cluster should flatten to a map");
        };
        assert_eq!(attrs["id"], Value::from("c1"));
        assert_eq!(attrs["status"], Value::from("running"));
        assert_eq!(attrs["master_node_num"], Value::from("2"));
        assert_eq!(attrs["type"], Value::Int(0));
        assert_eq!(attrs["safe_mode"], Value::Int(1));
        assert_eq!(attrs["description"], Value::from("analytics"));
        assert_eq!(
            attrs["tags"].as_map().unwrap()["env"],
            Value::from("dev")
        );
        let Value::List(groups) = &attrs["node_groups"] else {
            panic!("node groups should be a list");
        };
        assert_eq!(groups[0].as_map().unwrap()["node_num"], Value::Int(2));
        assert_eq!(attrs["task_node_groups"], Value::List(vec![]));
    }
}
