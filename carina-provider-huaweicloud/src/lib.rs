//! Carina HuaweiCloud Provider
//!
//! Manages HuaweiCloud resources through the services' REST APIs.
//!
//! ## Module Structure
//!
//! - `provider` - HuaweiCloudProvider implementation
//! - `resources` - Handler traits and the resource type registry
//! - `schemas` - Resource and data source schemas
//! - `services` - Per-service CRUD adapters
//! - `client` - Signed REST client and service catalog
//! - `config` - Provider configuration
//! - `orders` - Pre-paid subscriptions through BSS orders
//! - `utils`, `tags`, `pagination`, `wait`, `retry`, `errors` - Shared helpers

pub mod client;
pub mod config;
pub mod errors;
pub mod orders;
pub mod pagination;
pub mod provider;
pub mod resource_data;
pub mod resources;
pub mod retry;
pub mod schemas;
pub mod services;
pub mod tags;
pub mod utils;
pub mod wait;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use provider::HuaweiCloudProvider;
pub use wait::WaitPolicy;

use carina_core::provider::{BoxFuture, Provider, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for HuaweiCloudProvider {
    fn name(&self) -> &'static str {
        "huaweicloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn carina_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        from: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        let known = from.map(|s| s.attributes.clone()).unwrap_or_default();
        Box::pin(async move {
            self.read_resource(&id, identifier.as_deref(), known)
                .await
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &from).await })
    }
}
