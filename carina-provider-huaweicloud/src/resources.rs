//! Resource type registry
//!
//! This module defines:
//! - The handler traits every service adapter implements
//! - The shared context adapters receive (clients, region, wait policy)
//! - The list of resource and data source types of the provider

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult, ResourceType};
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;

use crate::client::{ClientFactory, ServiceClient};
use crate::resource_data::ResourceData;
use crate::services;
use crate::wait::{StateChangeConf, WaitPolicy};

// =============================================================================
// Context
// =============================================================================

/// Shared state handed to every adapter call
pub struct ProviderContext {
    pub factory: ClientFactory,
    pub wait_policy: WaitPolicy,
}

impl ProviderContext {
    /// Resource-level region, else the provider region
    pub fn region(&self, data: &ResourceData) -> String {
        data.get_str("region")
            .unwrap_or(&self.factory.config().region)
            .to_string()
    }

    /// Resource-level enterprise project, else the provider one
    pub fn enterprise_project_id(&self, data: &ResourceData) -> Option<String> {
        data.get_str("enterprise_project_id")
            .map(str::to_string)
            .or_else(|| self.factory.config().enterprise_project_id.clone())
    }

    pub async fn client(&self, service: &str, data: &ResourceData) -> ProviderResult<ServiceClient> {
        let region = self.region(data);
        self.factory
            .service_client(service, &region)
            .await
            .map_err(|e| {
                ProviderError::new(format!("error creating {} client", service.to_uppercase()))
                    .for_resource(data.id.clone())
                    .with_cause(e)
            })
    }

    /// Apply the provider wait policy to a state change configuration
    pub fn state_change(&self, conf: StateChangeConf) -> StateChangeConf {
        conf.with_policy(&self.wait_policy)
    }
}

// =============================================================================
// Handler traits
// =============================================================================

/// CRUD adapter of one managed resource type
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create the resource and record its identifier in `data`
    async fn create(&self, ctx: &ProviderContext, data: &mut ResourceData) -> ProviderResult<()>;

    /// Flattened attributes, or `None` when the resource is gone
    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<Option<HashMap<String, Value>>>;

    async fn update(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()>;

    async fn delete(&self, ctx: &ProviderContext, data: &ResourceData) -> ProviderResult<()>;
}

/// Read-only query adapter
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Returns the data source ID and its flattened attributes
    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<(String, HashMap<String, Value>)>;
}

// =============================================================================
// Resource Type Definitions
// =============================================================================

/// Resource type exposed to the engine
struct RegisteredType {
    name: &'static str,
    schema: ResourceSchema,
}

impl ResourceType for RegisteredType {
    fn name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }
}

/// All managed resource handlers
pub fn resource_handlers() -> Vec<Arc<dyn ResourceHandler>> {
    vec![
        Arc::new(services::cloudtable::cluster::CloudTableCluster),
        Arc::new(services::ddm::instance::DdmInstance),
        Arc::new(services::ddm::account::DdmAccount),
        Arc::new(services::ccm::private_ca::PrivateCa),
        Arc::new(services::ims::image_registration::ImageRegistration),
    ]
}

/// All data source handlers
pub fn data_source_handlers() -> Vec<Arc<dyn DataSourceHandler>> {
    vec![
        Arc::new(services::mrs::clusters::MapReduceClusters),
        Arc::new(services::ddm::accounts::DdmAccounts),
    ]
}

/// Returns all resource and data source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    let resources = resource_handlers().into_iter().map(|h| RegisteredType {
        name: h.type_name(),
        schema: h.schema(),
    });
    let data_sources = data_source_handlers().into_iter().map(|h| RegisteredType {
        name: h.type_name(),
        schema: h.schema(),
    });
    resources
        .chain(data_sources)
        .map(|t| Box::new(t) as Box<dyn ResourceType>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carina_core::schema::SchemaKind;

    #[test]
    fn registry_names_are_unique() {
        let types = resource_types();
        let mut names: Vec<&str> = types.iter().map(|t| t.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"ddm_instance"));
        assert!(names.contains(&"mapreduce_clusters"));
    }

    #[test]
    fn schema_kinds_match_handler_kind() {
        for h in resource_handlers() {
            assert_eq!(h.schema().kind, SchemaKind::Resource, "{}", h.type_name());
            assert_eq!(h.schema().resource_type, h.type_name());
        }
        for h in data_source_handlers() {
            assert_eq!(h.schema().kind, SchemaKind::DataSource, "{}", h.type_name());
            assert_eq!(h.schema().resource_type, h.type_name());
        }
    }

    #[test]
    fn every_resource_has_region() {
        for h in resource_handlers() {
            let schema = h.schema();
            let region = &schema.attributes["region"];
            assert!(region.computed && region.force_new, "{}", h.type_name());
        }
    }
}
