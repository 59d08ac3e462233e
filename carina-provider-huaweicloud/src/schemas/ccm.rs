//! CCM (Cloud Certificate Manager) schema definitions

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types::{bool_string, ca_action, ca_type};
use super::{charging_mode_attribute, common_attributes};

fn distinguished_name_block() -> AttributeType {
    let fields = [
        "common_name",
        "country",
        "state",
        "locality",
        "organization",
        "organizational_unit",
    ];
    types::block_list(
        fields
            .iter()
            .map(|f| AttributeSchema::new(*f, AttributeType::String).required())
            .collect(),
    )
}

fn validity_block() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("type", types::string_in(&["YEAR", "MONTH", "DAY", "HOUR"])).required(),
        AttributeSchema::new("value", types::positive_int()).required(),
        AttributeSchema::new("started_at", AttributeType::String).optional(),
    ])
}

fn crl_configuration_block() -> AttributeType {
    types::block_list(vec![
        AttributeSchema::new("enabled", AttributeType::Bool).optional(),
        AttributeSchema::new("obs_bucket_name", AttributeType::String).optional(),
        AttributeSchema::new("valid_days", AttributeType::Int).optional(),
        AttributeSchema::new("crl_name", AttributeType::String).optional(),
        AttributeSchema::new("crl_dis_point", AttributeType::String).computed(),
    ])
}

/// Returns the schema for private certificate authorities
pub fn private_ca_schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new("ccm_private_ca").with_description("A private certificate authority"),
    )
    .attribute(
        AttributeSchema::new("type", ca_type())
            .required()
            .force_new()
            .with_description("ROOT or SUBORDINATE"),
    )
    .attribute(
        AttributeSchema::new("distinguished_name", distinguished_name_block())
            .required()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("key_algorithm", AttributeType::String)
            .required()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("signature_algorithm", AttributeType::String)
            .required()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("validity", validity_block())
            .required()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("pending_days", AttributeType::String)
            .required()
            .force_new()
            .with_description("Days to wait before the CA is actually deleted"),
    )
    .attribute(
        AttributeSchema::new("issuer_id", AttributeType::String)
            .optional()
            .force_new()
            .with_description("The parent CA, required for SUBORDINATE"),
    )
    .attribute(
        AttributeSchema::new("path_length", AttributeType::Int)
            .optional()
            .computed()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("key_usages", types::string_list())
            .optional()
            .force_new(),
    )
    .attribute(
        AttributeSchema::new("crl_configuration", crl_configuration_block()).optional(),
    )
    .attribute(
        AttributeSchema::new("enterprise_project_id", AttributeType::String)
            .optional()
            .computed()
            .force_new(),
    )
    .attribute(AttributeSchema::new("action", ca_action()).optional())
    .attribute(AttributeSchema::new("tags", types::tags()).optional())
    .attribute(charging_mode_attribute())
    .attribute(AttributeSchema::new("auto_renew", bool_string()).optional().force_new())
    .attribute(AttributeSchema::new("status", AttributeType::String).computed())
    .attribute(AttributeSchema::new("issuer_name", AttributeType::String).computed())
    .attribute(AttributeSchema::new("gen_mode", AttributeType::String).computed())
    .attribute(AttributeSchema::new("serial_number", AttributeType::String).computed())
    .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    .attribute(AttributeSchema::new("expired_at", AttributeType::String).computed())
    .attribute(AttributeSchema::new("free_quota", AttributeType::Int).computed())
}

/// Returns all CCM-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![private_ca_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::resource::Value;
    use std::collections::HashMap;

    fn block(pairs: &[(&str, Value)]) -> Value {
        Value::List(vec![Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )])
    }

    #[test]
    fn valid_root_ca() {
        let mut attrs = HashMap::new();
        attrs.insert("type".to_string(), Value::from("ROOT"));
        attrs.insert(
            "distinguished_name".to_string(),
            block(&[
                ("common_name", Value::from("example")),
                ("country", Value::from("CN")),
                ("state", Value::from("GD")),
                ("locality", Value::from("SZ")),
                ("organization", Value::from("org")),
                ("organizational_unit", Value::from("ou")),
            ]),
        );
        attrs.insert("key_algorithm".to_string(), Value::from("RSA2048"));
        attrs.insert("signature_algorithm".to_string(), Value::from("SHA256"));
        attrs.insert(
            "validity".to_string(),
            block(&[("type", Value::from("YEAR")), ("value", Value::Int(1))]),
        );
        attrs.insert("pending_days".to_string(), Value::from("7"));
        assert!(private_ca_schema().validate(&attrs).is_ok());

        attrs.insert(
            "distinguished_name".to_string(),
            block(&[("common_name", Value::from("example"))]),
        );
        assert!(private_ca_schema().validate(&attrs).is_err());
    }

    #[test]
    fn action_and_tags_update_in_place() {
        let schema = private_ca_schema();
        assert!(!schema.is_force_new("action"));
        assert!(!schema.is_force_new("tags"));
        assert!(!schema.is_force_new("crl_configuration"));
        assert!(schema.is_force_new("validity"));
        assert!(schema.is_force_new("charging_mode"));
        assert!(schema.is_force_new("auto_renew"));
    }
}
