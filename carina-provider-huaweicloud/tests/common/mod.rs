//! Shared setup for the wiremock-backed tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use carina_core::resource::Value;
use carina_provider_huaweicloud::{HuaweiCloudProvider, ProviderConfig, WaitPolicy};
use wiremock::MockServer;

pub const REGION: &str = "cn-north-4";
pub const PROJECT_ID: &str = "p1";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config pointing `services` at the mock server, with a fixed project ID
pub fn config(server: &MockServer, services: &[&str]) -> ProviderConfig {
    services.iter().fold(
        ProviderConfig::new(REGION).with_project_id(PROJECT_ID),
        |config, service| config.with_endpoint(*service, server.uri()),
    )
}

/// Provider that polls without sleeping
pub fn provider(config: ProviderConfig) -> HuaweiCloudProvider {
    init_logging();
    HuaweiCloudProvider::with_wait_policy(config, WaitPolicy::fixed(Duration::from_millis(1)))
        .expect("provider should build")
}

pub fn block(pairs: &[(&str, Value)]) -> Value {
    Value::List(vec![Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )])
}

pub fn string_list(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::from(*s)).collect())
}

pub fn tags(pairs: &[(&str, &str)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect::<HashMap<_, _>>(),
    )
}
