//! DDM (Distributed Database Middleware) schema definitions

use std::time::Duration;

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::types::{bool_string, ddm_account_name, ddm_permissions};
use super::{
    auto_renew_attribute, charging_mode_attribute, common_attributes, period_attributes,
    region_attribute,
};

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn node_block() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("status", AttributeType::String).computed(),
        AttributeSchema::new("port", AttributeType::String).computed(),
        AttributeSchema::new("ip", AttributeType::String).computed(),
    ])
}

fn parameter_block() -> AttributeType {
    AttributeType::Set(Box::new(AttributeType::Object(vec![
        AttributeSchema::new("name", AttributeType::String).required(),
        AttributeSchema::new("value", AttributeType::String).required(),
    ])))
}

/// Returns the schema for DDM instances
pub fn instance_schema() -> ResourceSchema {
    period_attributes(common_attributes(
        ResourceSchema::new("ddm_instance")
            .with_description("A DDM instance")
            .with_timeouts(
                Timeouts::default()
                    .with_create(minutes(15))
                    .with_update(minutes(60))
                    .with_delete(minutes(10)),
            ),
    ))
    .attribute(
        AttributeSchema::new("name", types::string_len_between(4, 64))
            .required()
            .with_description("The name of the DDM instance"),
    )
    .attribute(
        AttributeSchema::new("flavor_id", AttributeType::String)
            .required()
            .with_description("The ID of the product flavor"),
    )
    .attribute(
        AttributeSchema::new("node_num", types::positive_int())
            .required()
            .with_description("The number of nodes"),
    )
    .attribute(
        AttributeSchema::new("engine_id", AttributeType::String)
            .required()
            .force_new()
            .with_description("The ID of the engine"),
    )
    .attribute(
        AttributeSchema::new("availability_zones", types::string_set())
            .required()
            .force_new()
            .with_description("The availability zones"),
    )
    .attribute(
        AttributeSchema::new("vpc_id", AttributeType::String)
            .required()
            .force_new(),
    )
    .attribute(AttributeSchema::new("security_group_id", AttributeType::String).required())
    .attribute(
        AttributeSchema::new("subnet_id", AttributeType::String)
            .required()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("enterprise_project_id", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("param_group_id", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("time_zone", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("admin_user", AttributeType::String)
            .optional()
            .computed()
            .force_new()
            .with_description("The username of the administrator"),
    )
    .attribute(
        AttributeSchema::new("admin_password", AttributeType::String)
            .optional()
            .sensitive()
            .with_description("The password of the administrator"),
    )
    .attribute(
        AttributeSchema::new("parameters", parameter_block())
            .optional()
            .computed()
            .with_description("Instance parameters to set"),
    )
    .attribute(
        AttributeSchema::new("delete_rds_data", bool_string())
            .optional()
            .with_description("Whether data on the associated RDS instances is deleted with the instance"),
    )
    .attribute(charging_mode_attribute())
    .attribute(auto_renew_attribute())
    .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    .attribute(AttributeSchema::new("access_ip", AttributeType::String).computed())
    .attribute(AttributeSchema::new("access_port", AttributeType::String).computed())
    .attribute(AttributeSchema::new("engine_version", AttributeType::String).computed())
    .attribute(AttributeSchema::new("nodes", node_block()).computed())
}

fn account_schema_block() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("name", AttributeType::String).optional(),
        AttributeSchema::new("description", AttributeType::String).computed(),
    ])
}

/// Returns the schema for DDM accounts
pub fn account_schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new("ddm_account")
            .with_description("An account of a DDM instance")
            .with_timeouts(
                Timeouts::default()
                    .with_create(minutes(30))
                    .with_update(minutes(10))
                    .with_delete(minutes(10)),
            ),
    )
    .attribute(
        AttributeSchema::new("instance_id", AttributeType::String)
            .required()
            .force_new()
            .with_description("The ID of the DDM instance"),
    )
    .attribute(
        AttributeSchema::new("name", ddm_account_name())
            .required()
            .force_new()
            .with_description("The name of the account"),
    )
    .attribute(
        AttributeSchema::new("password", AttributeType::String)
            .required()
            .sensitive(),
    )
    .attribute(
        AttributeSchema::new("permissions", ddm_permissions())
            .required()
            .with_description("The basic permissions of the account"),
    )
    .attribute(
        AttributeSchema::new("description", AttributeType::String).optional(),
    )
    .attribute(
        AttributeSchema::new("schemas", account_schema_block())
            .optional()
            .with_description("Schemas associated with the account"),
    )
    .attribute(AttributeSchema::new("status", AttributeType::String).computed())
}

/// Returns the schema for the DDM accounts data source
pub fn accounts_schema() -> ResourceSchema {
    ResourceSchema::data_source("ddm_accounts")
        .with_description("Accounts of a DDM instance")
        .attribute(region_attribute())
        .attribute(
            AttributeSchema::new("instance_id", AttributeType::String)
                .required()
                .with_description("The ID of the DDM instance"),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).optional())
        .attribute(AttributeSchema::new("status", AttributeType::String).optional())
        .attribute(
            AttributeSchema::new(
                "accounts",
                types::block_list(vec![
                    AttributeSchema::new("name", AttributeType::String).computed(),
                    AttributeSchema::new("status", AttributeType::String).computed(),
                    AttributeSchema::new("permissions", types::string_list()).computed(),
                    AttributeSchema::new("description", AttributeType::String).computed(),
                    AttributeSchema::new("schemas", account_schema_block()).computed(),
                ]),
            )
            .computed(),
        )
}

/// Returns all DDM-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![instance_schema(), account_schema(), accounts_schema()]
}
