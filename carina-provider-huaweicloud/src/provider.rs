//! HuaweiCloud Provider implementation
//!
//! Dispatches engine operations to the service adapters registered in
//! [`crate::resources`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use carina_core::differ::{self, Diff};
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State, Value};
use carina_core::schema::ResourceSchema;
use log::{debug, info, warn};

use crate::client::ClientFactory;
use crate::config::{ConfigError, ProviderConfig};
use crate::resource_data::ResourceData;
use crate::resources::{
    DataSourceHandler, ProviderContext, ResourceHandler, data_source_handlers, resource_handlers,
};
use crate::tags::merge_default_tags;
use crate::wait::WaitPolicy;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// HuaweiCloud Provider
pub struct HuaweiCloudProvider {
    ctx: ProviderContext,
    resources: HashMap<&'static str, Arc<dyn ResourceHandler>>,
    data_sources: HashMap<&'static str, Arc<dyn DataSourceHandler>>,
}

impl HuaweiCloudProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        Self::with_wait_policy(config, WaitPolicy::default())
    }

    /// Build from provider block attributes (with `HW_*` environment fallback)
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> ProviderResult<Self> {
        let config = ProviderConfig::from_attributes(attributes).map_err(config_error)?;
        Self::new(config)
    }

    /// Provider whose polling and retry sleeps follow `policy`
    pub fn with_wait_policy(config: ProviderConfig, policy: WaitPolicy) -> ProviderResult<Self> {
        let factory = ClientFactory::new(config, policy.apply(DEFAULT_RETRY_DELAY))
            .map_err(|e| ProviderError::new("failed to build HTTP client").with_cause(e))?;

        Ok(Self {
            ctx: ProviderContext {
                factory,
                wait_policy: policy,
            },
            resources: resource_handlers()
                .into_iter()
                .map(|h| (h.type_name(), h))
                .collect(),
            data_sources: data_source_handlers()
                .into_iter()
                .map(|h| (h.type_name(), h))
                .collect(),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        self.ctx.factory.config()
    }

    fn handler(&self, id: &ResourceId) -> ProviderResult<&Arc<dyn ResourceHandler>> {
        self.resources.get(id.resource_type.as_str()).ok_or_else(|| {
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    fn data_source(&self, id: &ResourceId) -> ProviderResult<&Arc<dyn DataSourceHandler>> {
        self.data_sources
            .get(id.resource_type.as_str())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown data source: {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }

    /// Desired attributes with provider default tags merged in
    fn desired_attributes(
        &self,
        schema: &ResourceSchema,
        attributes: &HashMap<String, Value>,
    ) -> HashMap<String, Value> {
        let mut attributes = attributes.clone();
        let defaults = &self.config().default_tags;
        if schema.attributes.contains_key("tags") && !defaults.is_empty() {
            let merged = merge_default_tags(defaults, attributes.get("tags").and_then(Value::as_map));
            attributes.insert("tags".to_string(), Value::Map(merged));
        }
        attributes
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its cloud-side identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        known: HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let identifier = match identifier {
            Some(identifier) => identifier,
            None => return Ok(State::not_found(id.clone())),
        };

        let schema = handler.schema();
        let data = ResourceData::new(id.clone(), known)
            .with_identifier(identifier)
            .with_timeouts(schema.timeouts);
        match handler.read(&self.ctx, &data).await? {
            Some(mut attributes) => {
                // Inputs the API never returns (passwords, delete options) keep their known value
                for (key, value) in data.attributes() {
                    if schema.attributes.contains_key(key) && !attributes.contains_key(key) {
                        attributes.insert(key.clone(), value.clone());
                    }
                }
                Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
            }
            None => {
                debug!("{}.{} ({}) no longer exists", id.resource_type, id.name, identifier);
                Ok(State::not_found(id.clone()))
            }
        }
    }

    /// Create a resource and return its state
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.handler(&resource.id)?;
        let schema = handler.schema();
        validate(&schema, resource)?;

        let attributes = self.desired_attributes(&schema, &resource.attributes);
        let mut data =
            ResourceData::new(resource.id.clone(), attributes).with_timeouts(schema.timeouts);
        let created = handler.create(&self.ctx, &mut data).await;

        // Once the service has assigned an ID, every failure carries it
        let identifier = match (created, data.identifier()) {
            (Ok(()), Ok(identifier)) => identifier.to_string(),
            (Err(e), Ok(identifier)) => {
                warn!(
                    "{}.{} ({}) was created but did not finish setting up",
                    resource.id.resource_type, resource.id.name, identifier
                );
                return Err(e.with_identifier(identifier));
            }
            (Ok(()), Err(e)) | (Err(e), Err(_)) => return Err(e),
        };
        info!(
            "created {}.{} ({})",
            resource.id.resource_type, resource.id.name, identifier
        );

        let state = self
            .read_resource(&resource.id, Some(&identifier), data.attributes().clone())
            .await
            .map_err(|e| e.with_identifier(identifier.as_str()))?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "resource {} disappeared right after creation",
                identifier
            ))
            .for_resource(resource.id.clone())
            .with_identifier(identifier));
        }
        Ok(state)
    }

    /// Update a resource in place
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let schema = handler.schema();
        validate(&schema, to)?;

        let mut attributes = self.desired_attributes(&schema, &to.attributes);
        carry_computed(&schema, &mut attributes, &from.attributes);
        let desired = Resource {
            attributes: attributes.clone(),
            ..to.clone()
        };
        match differ::diff(&desired, from, &schema) {
            Diff::NoChange(_) => return Ok(from.clone()),
            Diff::Replace {
                changed_attributes, ..
            } => {
                let forced: Vec<&str> = changed_attributes
                    .iter()
                    .filter(|k| schema.is_force_new(k))
                    .map(String::as_str)
                    .collect();
                return Err(ProviderError::new(format!(
                    "cannot update {} in place, delete and recreate",
                    forced.join(", ")
                ))
                .for_resource(id.clone()));
            }
            Diff::Create(_) | Diff::Update { .. } => {}
        }

        let data = ResourceData::new(id.clone(), attributes.clone())
            .with_identifier(identifier)
            .with_prior(from.attributes.clone())
            .with_timeouts(schema.timeouts)
            .with_schema(schema.attributes);
        handler.update(&self.ctx, &data).await?;
        info!("updated {}.{} ({})", id.resource_type, id.name, identifier);

        self.read_resource(id, Some(identifier), attributes).await
    }

    /// Delete a resource
    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let handler = self.handler(id)?;
        let data = ResourceData::new(id.clone(), from.attributes.clone())
            .with_identifier(identifier)
            .with_timeouts(handler.schema().timeouts);
        handler.delete(&self.ctx, &data).await?;
        info!("deleted {}.{} ({})", id.resource_type, id.name, identifier);
        Ok(())
    }

    /// Run a data source query
    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let handler = self.data_source(&resource.id)?;
        let schema = handler.schema();
        validate(&schema, resource)?;

        let data = ResourceData::new(resource.id.clone(), resource.attributes.clone())
            .with_timeouts(schema.timeouts);
        let (identifier, attributes) = handler.read(&self.ctx, &data).await?;
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }
}

/// Unset optional values the service fills in keep their current value
fn carry_computed(
    schema: &ResourceSchema,
    attributes: &mut HashMap<String, Value>,
    current: &HashMap<String, Value>,
) {
    for (key, attr) in &schema.attributes {
        if attr.computed && !attr.is_computed_only() && !attributes.contains_key(key) {
            if let Some(value) = current.get(key) {
                attributes.insert(key.clone(), value.clone());
            }
        }
    }
}

fn validate(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<()> {
    schema.validate(&resource.attributes).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ProviderError::new(format!("invalid configuration: {}", messages.join("; ")))
            .for_resource(resource.id.clone())
    })
}

fn config_error(e: ConfigError) -> ProviderError {
    ProviderError::new("invalid provider configuration").with_cause(e)
}
