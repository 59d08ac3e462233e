//! `ims_image_registration`: register an image file stored in OBS
//!
//! A one-shot action: the registration job runs on create and nothing can be
//! changed afterwards. Deleting the resource deletes the image.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use reqwest::Method;
use serde_json::{Value as Json, json};

use crate::client::{RequestOpts, SdkResult, ServiceClient};
use crate::errors::provider_error;
use crate::resource_data::{ResourceData, TimeoutKind};
use crate::resources::{ProviderContext, ResourceHandler};
use crate::schemas;
use crate::utils::{flatten_fields, path_search, path_str, replace_vars};
use crate::wait::{StateChangeConf, WaitError};

const SERVICE: &str = "ims";
const JOB_DELAY: Duration = Duration::from_secs(10);
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DELETE_DELAY: Duration = Duration::from_secs(5);
const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Image fields and their API keys.
///
/// IMS prefixes its extension properties with `__`; they are exposed
/// without the prefix.
const IMAGE_FIELDS: &[(&str, &str)] = &[
    ("image_id", "id"),
    ("name", "name"),
    ("status", "status"),
    ("visibility", "visibility"),
    ("file", "file"),
    ("self", "self"),
    ("schema", "schema"),
    ("protected", "protected"),
    ("container_format", "container_format"),
    ("disk_format", "disk_format"),
    ("min_ram", "min_ram"),
    ("max_ram", "max_ram"),
    ("min_disk", "min_disk"),
    ("virtual_env_type", "virtual_env_type"),
    ("enterprise_project_id", "enterprise_project_id"),
    ("created_at", "created_at"),
    ("updated_at", "updated_at"),
    ("active_at", "active_at"),
    ("hw_firmware_type", "hw_firmware_type"),
    ("os_type", "__os_type"),
    ("os_version", "__os_version"),
    ("os_bit", "__os_bit"),
    ("platform", "__platform"),
    ("image_type", "__imagetype"),
    ("image_size", "__image_size"),
    ("image_source_type", "__image_source_type"),
    ("is_registered", "__isregistered"),
    ("tags", "tags"),
];

pub struct ImageRegistration;

#[async_trait]
impl ResourceHandler for ImageRegistration {
    fn type_name(&self) -> &'static str {
        "ims_image_registration"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ims::image_registration_schema()
    }

    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let image_id = data.require_str("image_id")?;

        let path = replace_vars(
            "v1/cloudimages/{image_id}/upload",
            &[("image_id", image_id)],
        );
        let body = json!({"image_url": data.get_str("image_url")});
        let resp = client
            .request(Method::PUT, &path, RequestOpts::new().json(body))
            .await
            .map_err(|e| provider_error(&data.id, "error registering IMS image", e))?;
        let job_id = path_str("job_id", &resp).ok_or_else(|| {
            ProviderError::new("error registering IMS image: job ID is not found in API response")
                .for_resource(data.id.clone())
        })?;

        let conf = StateChangeConf::new(&["PENDING"], &["COMPLETED"])
            .timeout(data.timeout(TimeoutKind::Create))
            .delay(JOB_DELAY)
            .poll_interval(JOB_POLL_INTERVAL);
        let job = ctx
            .state_change(conf)
            .wait(|| job_status(&client, &job_id))
            .await
            .map_err(|e| {
                provider_error(
                    &data.id,
                    format!("error waiting for IMS image registration job ({}) to succeed", job_id),
                    e,
                )
            })?;

        let registered = path_str("entities.image_id", &job).ok_or_else(|| {
            ProviderError::new("the image ID is not found in the registration job")
                .for_resource(data.id.clone())
        })?;
        data.set_identifier(registered);
        Ok(())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>> {
        let client = ctx.client(SERVICE, data).await?;
        let image_id = data.identifier()?;

        let image = find_image(&client, image_id)
            .await
            .map_err(|e| provider_error(&data.id, "error retrieving IMS image", e))?;
        Ok(image.map(|image| {
            let mut attributes = HashMap::new();
            flatten_fields(&image, IMAGE_FIELDS, &mut attributes);
            attributes.insert("region".to_string(), Value::from(client.region()));
            attributes
        }))
    }

    async fn update(&self, _ctx: &ProviderContext, _data: &ResourceData) -> ProviderResult<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()> {
        let client = ctx.client(SERVICE, data).await?;
        let image_id = data.identifier()?;

        client
            .delete(&format!("v2/images/{}", image_id))
            .await
            .map_err(|e| provider_error(&data.id, "error deleting IMS image", e))?;

        // The delete API always answers 204, so watch the list API instead
        let conf = StateChangeConf::new(&["PENDING"], &["COMPLETED"])
            .timeout(data.timeout(TimeoutKind::Delete))
            .delay(DELETE_DELAY)
            .poll_interval(DELETE_POLL_INTERVAL);
        ctx.state_change(conf)
            .wait(|| image_gone(&client, image_id))
            .await
            .map_err(|e| provider_error(&data.id, "error waiting for IMS image to be deleted", e))?;
        Ok(())
    }
}

/// First image matching the ID, if any
async fn find_image(client: &ServiceClient, image_id: &str) -> SdkResult<Option<Json>> {
    let path = format!("v2/cloudimages?id={}", urlencoding::encode(image_id));
    let body = client.get(&path).await?;
    Ok(path_search("images[0]", &body))
}

/// Registration job state: `COMPLETED` on success, `PENDING` while running
async fn job_status(client: &ServiceClient, job_id: &str) -> Result<(Json, String), WaitError> {
    let path = replace_vars("v1/{project_id}/jobs/{job_id}", &[("job_id", job_id)]);
    let body = client.get(&path).await?;
    match path_str("status", &body).as_deref() {
        Some("SUCCESS") => Ok((body, "COMPLETED".to_string())),
        Some("FAIL") => Err(WaitError::Failed(
            "the image registration job execution has failed".to_string(),
        )),
        Some(_) => Ok((body, "PENDING".to_string())),
        None => Err(WaitError::Failed(
            "status field is not found in the job".to_string(),
        )),
    }
}

async fn image_gone(client: &ServiceClient, image_id: &str) -> Result<((), String), WaitError> {
    let state = match find_image(client, image_id).await? {
        Some(_) => "PENDING",
        None => "COMPLETED",
    };
    Ok(((), state.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_extension_properties() {
        let image = json!({
            "id": "img-1",
            "name": "ubuntu",
            "status": "active",
            "min_disk": 40,
            "protected": false,
            "tags": ["a", "b"],
            "__os_type": "Linux",
            "__imagetype": "private",
            "__isregistered": "true"
        });
        let mut attrs = HashMap::new();
        flatten_fields(&image, IMAGE_FIELDS, &mut attrs);
        assert_eq!(attrs["image_id"], Value::from("img-1"));
        assert_eq!(attrs["os_type"], Value::from("Linux"));
        assert_eq!(attrs["image_type"], Value::from("private"));
        assert_eq!(attrs["is_registered"], Value::from("true"));
        assert_eq!(attrs["min_disk"], Value::Int(40));
        assert_eq!(attrs["protected"], Value::Bool(false));
        assert!(attrs.keys().all(|k| !k.starts_with('_')));
    }
}
