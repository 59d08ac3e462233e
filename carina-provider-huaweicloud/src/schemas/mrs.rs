//! MRS (MapReduce Service) schema definitions

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::region_attribute;

fn computed(name: &str, attr_type: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, attr_type).computed()
}

fn string_fields(names: &[&str]) -> Vec<AttributeSchema> {
    names
        .iter()
        .map(|n| computed(n, AttributeType::String))
        .collect()
}

fn node_group_block() -> AttributeType {
    let mut fields = string_fields(&[
        "group_name",
        "node_size",
        "node_spec_id",
        "node_product_id",
        "vm_product_id",
        "vm_spec_code",
        "root_volume_type",
        "root_volume_product_id",
        "root_volume_resource_spec_code",
        "root_volume_resource_type",
        "data_volume_type",
        "data_volume_product_id",
        "data_volume_resource_spec_code",
        "data_volume_resource_type",
    ]);
    for name in [
        "node_num",
        "root_volume_size",
        "data_volume_count",
        "data_volume_size",
    ] {
        fields.push(computed(name, AttributeType::Int));
    }
    types::block_list(fields)
}

fn component_block() -> AttributeType {
    types::block_list(string_fields(&[
        "component_id",
        "component_name",
        "component_version",
        "component_desc",
    ]))
}

fn cluster_block() -> AttributeType {
    let mut fields = string_fields(&[
        "id",
        "name",
        "master_node_num",
        "core_node_num",
        "total_node_num",
        "status",
        "billing_type",
        "vpc_id",
        "subnet_id",
        "duration",
        "fee",
        "hadoop_version",
        "master_node_size",
        "core_node_size",
        "external_ip",
        "external_alternate_ip",
        "internal_ip",
        "deployment_id",
        "description",
        "order_id",
        "master_node_product_id",
        "master_node_spec_id",
        "core_node_product_id",
        "core_node_spec_id",
        "availability_zone",
        "vnc",
        "volume_type",
        "enterprise_project_id",
        "security_group_id",
        "slave_security_group_id",
        "stage_desc",
        "version",
        "node_public_cert_name",
        "master_node_ip",
        "private_ip_first",
        "master_data_volume_type",
        "core_data_volume_type",
        "scale",
        "eip_id",
        "eip_address",
        "eipv6_address",
        "mrs_ecs_default_agency",
    ]);
    for name in [
        "volume_size",
        "type",
        "safe_mode",
        "log_collection",
        "master_data_volume_size",
        "master_data_volume_count",
        "core_data_volume_size",
        "core_data_volume_count",
        "period_type",
    ] {
        fields.push(computed(name, AttributeType::Int));
    }
    fields.push(computed("tags", types::tags()));
    fields.push(computed("component_list", component_block()));
    fields.push(computed("task_node_groups", node_group_block()));
    fields.push(computed("node_groups", node_group_block()));
    types::block_list(fields)
}

/// Returns the schema for the MRS clusters data source
pub fn clusters_schema() -> ResourceSchema {
    ResourceSchema::data_source("mapreduce_clusters")
        .with_description("MapReduce clusters matching the given filters")
        .attribute(region_attribute())
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .optional()
                .with_description("The name of cluster"),
        )
        .attribute(
            AttributeSchema::new("status", AttributeType::String)
                .optional()
                .with_description("The status of cluster"),
        )
        .attribute(AttributeSchema::new("enterprise_project_id", AttributeType::String).optional())
        .attribute(
            AttributeSchema::new("tags", AttributeType::String)
                .optional()
                .with_description("Tag filter, as `key*value` pairs separated by commas"),
        )
        .attribute(computed("clusters", cluster_block()))
}

/// Returns all MRS-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![clusters_schema()]
}
