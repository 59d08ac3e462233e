//! CloudTable schema definitions

use std::time::Duration;

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::common_attributes;

/// Returns the schema for CloudTable clusters.
///
/// Clusters cannot be modified after creation, so every input forces a
/// replacement.
pub fn cluster_schema() -> ResourceSchema {
    let inputs = [
        ("availability_zone", AttributeType::String),
        ("name", types::string_len_between(4, 64)),
        ("security_group_id", AttributeType::String),
        ("storage_type", types::string_in(&["ULTRAHIGH", "COMMON"])),
        ("subnet_id", AttributeType::String),
        ("vpc_id", AttributeType::String),
    ];

    let mut schema = common_attributes(
        ResourceSchema::new("cloudtable_cluster")
            .with_description("A CloudTable HBase cluster")
            .with_timeouts(Timeouts::default().with_create(Duration::from_secs(30 * 60))),
    );
    for (name, attr_type) in inputs {
        schema = schema.attribute(AttributeSchema::new(name, attr_type).required().force_new());
    }

    schema
        .attribute(
            AttributeSchema::new("rs_num", types::positive_int())
                .required()
                .force_new()
                .with_provider_name("cu_num")
                .with_description("The number of region servers"),
        )
        .attribute(
            AttributeSchema::new("enable_iam_auth", AttributeType::Bool)
                .optional()
                .computed()
                .force_new()
                .with_provider_name("auth_mode"),
        )
        .attribute(
            AttributeSchema::new("lemon_num", AttributeType::Int)
                .optional()
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("opentsdb_num", AttributeType::Int)
                .optional()
                .computed()
                .force_new()
                .with_provider_name("tsd_num"),
        )
        .attribute(
            AttributeSchema::new("tags", types::tags())
                .optional()
                .force_new()
                .with_provider_name("sys_tags"),
        )
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("created", AttributeType::String).computed())
        .attribute(AttributeSchema::new("hbase_public_endpoint", AttributeType::String).computed())
        .attribute(AttributeSchema::new("lemon_link", AttributeType::String).computed())
        .attribute(AttributeSchema::new("open_tsdb_link", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("opentsdb_public_endpoint", AttributeType::String).computed(),
        )
        .attribute(AttributeSchema::new("storage_quota", AttributeType::String).computed())
        .attribute(AttributeSchema::new("used_storage_size", AttributeType::String).computed())
        .attribute(AttributeSchema::new("zookeeper_link", AttributeType::String).computed())
}

/// Returns all CloudTable-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![cluster_schema()]
}
