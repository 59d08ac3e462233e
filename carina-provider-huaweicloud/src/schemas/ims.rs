//! IMS (Image Management Service) schema definitions

use std::time::Duration;

use carina_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Timeouts, types};

use super::common_attributes;

fn image_attributes() -> Vec<(&'static str, AttributeType)> {
    use AttributeType::{Bool, Int, String};
    vec![
        ("name", String),
        ("status", String),
        ("visibility", String),
        ("file", String),
        ("self", String),
        ("schema", String),
        ("protected", Bool),
        ("container_format", String),
        ("disk_format", String),
        ("min_ram", Int),
        ("max_ram", String),
        ("min_disk", Int),
        ("virtual_env_type", String),
        ("enterprise_project_id", String),
        ("created_at", String),
        ("updated_at", String),
        ("active_at", String),
        ("os_type", String),
        ("os_version", String),
        ("os_bit", String),
        ("platform", String),
        ("image_type", String),
        ("image_size", String),
        ("image_source_type", String),
        ("is_registered", String),
        ("hw_firmware_type", String),
    ]
}

/// Returns the schema for IMS image registrations
pub fn image_registration_schema() -> ResourceSchema {
    let schema = common_attributes(
        ResourceSchema::new("ims_image_registration")
            .with_description("Registers an image file uploaded to OBS as a private image")
            .with_timeouts(
                Timeouts::default()
                    .with_create(Duration::from_secs(20 * 60))
                    .with_delete(Duration::from_secs(10 * 60)),
            ),
    )
    .attribute(
        AttributeSchema::new("image_id", AttributeType::String)
            .required()
            .force_new()
            .with_description("The ID of the image to register"),
    )
    .attribute(
        AttributeSchema::new("image_url", AttributeType::String)
            .required()
            .force_new()
            .with_description("The OBS URL of the image file, as `bucket:file`"),
    )
    .attribute(AttributeSchema::new("tags", types::string_set()).computed());

    image_attributes()
        .into_iter()
        .fold(schema, |schema, (name, attr_type)| {
            schema.attribute(AttributeSchema::new(name, attr_type).computed())
        })
}

/// Returns all IMS-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![image_registration_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_inputs() {
        let schema = image_registration_schema();
        assert!(schema.attributes["image_id"].required);
        assert!(schema.is_force_new("image_url"));
        assert!(schema.attributes["status"].is_computed_only());
        assert!(schema.attributes["os_type"].is_computed_only());
        assert_eq!(schema.timeouts.delete, Duration::from_secs(600));
    }
}
