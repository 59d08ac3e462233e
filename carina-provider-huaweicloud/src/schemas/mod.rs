//! HuaweiCloud resource schema definitions

pub mod ccm;
pub mod cloudtable;
pub mod ddm;
pub mod ims;
pub mod mrs;
pub mod types;

use carina_core::schema::{self, AttributeSchema, AttributeType, ResourceSchema};

/// `region`, inherited from the provider when unset
pub fn region_attribute() -> AttributeSchema {
    AttributeSchema::new("region", AttributeType::String)
        .optional()
        .computed()
        .force_new()
        .with_description("The region of the resource (inherited from provider if not specified)")
}

/// `timeouts` block with per-operation overrides such as `"30m"`
pub fn timeouts_attribute() -> AttributeSchema {
    AttributeSchema::new(
        "timeouts",
        AttributeType::Object(vec![
            AttributeSchema::new("create", AttributeType::String).optional(),
            AttributeSchema::new("read", AttributeType::String).optional(),
            AttributeSchema::new("update", AttributeType::String).optional(),
            AttributeSchema::new("delete", AttributeType::String).optional(),
        ]),
    )
    .optional()
    .with_description("Operation timeouts")
}

/// `charging_mode`: `postPaid` (the default) or `prePaid`
pub fn charging_mode_attribute() -> AttributeSchema {
    AttributeSchema::new("charging_mode", schema::types::string_in(&["prePaid", "postPaid"]))
        .optional()
        .computed()
        .force_new()
        .with_description("The charging mode, `prePaid` resources are bought through an order")
}

/// `auto_renew` of a pre-paid subscription, `"true"` or `"false"`
pub fn auto_renew_attribute() -> AttributeSchema {
    AttributeSchema::new("auto_renew", types::bool_string()).optional()
}

/// `period_unit` and `period` of a pre-paid subscription
pub fn period_attributes(resource: ResourceSchema) -> ResourceSchema {
    resource
        .attribute(
            AttributeSchema::new("period_unit", schema::types::string_in(&["month", "year"]))
                .optional()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("period", schema::types::positive_int())
                .optional()
                .force_new(),
        )
}

/// Attributes every managed resource carries
pub fn common_attributes(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(region_attribute())
        .attribute(timeouts_attribute())
}

/// Returns all HuaweiCloud schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(ccm::schemas());
    schemas.extend(cloudtable::schemas());
    schemas.extend(ddm::schemas());
    schemas.extend(ims::schemas());
    schemas.extend(mrs::schemas());
    schemas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_unique() {
        let schemas = all_schemas();
        let mut names: Vec<&str> = schemas.iter().map(|s| s.resource_type.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn timeouts_block_accepts_known_keys() {
        let attr = timeouts_attribute();
        let mut block = std::collections::HashMap::new();
        block.insert(
            "create".to_string(),
            carina_core::resource::Value::from("30m"),
        );
        assert!(
            attr.attr_type
                .validate(&carina_core::resource::Value::Map(block))
                .is_ok()
        );
    }
}
