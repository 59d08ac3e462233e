//! `ddm_accounts` data source

use std::collections::HashMap;

use async_trait::async_trait;
use carina_core::provider::ProviderResult;
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use serde_json::Value as Json;

use super::{SERVICE, flatten_account, list_accounts};
use crate::errors::provider_error;
use crate::resource_data::ResourceData;
use crate::resources::{DataSourceHandler, ProviderContext};
use crate::schemas;
use crate::utils::path_str;

pub struct DdmAccounts;

#[async_trait]
impl DataSourceHandler for DdmAccounts {
    fn type_name(&self) -> &'static str {
        "ddm_accounts"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ddm::accounts_schema()
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        data: &ResourceData,
    ) -> ProviderResult<(String, HashMap<String, Value>)> {
        let client = ctx.client(SERVICE, data).await?;
        let instance_id = data.require_str("instance_id")?;

        let users = list_accounts(&client, instance_id)
            .await
            .map_err(|e| provider_error(&data.id, "error retrieving DDM accounts", e))?;
        let accounts: Vec<Value> = filter_accounts(&users, data.get_str("name"), data.get_str("status"))
            .into_iter()
            .map(|u| Value::Map(flatten_account(u)))
            .collect();

        let mut attributes = data.attributes().clone();
        attributes.insert("region".to_string(), Value::from(client.region()));
        attributes.insert("accounts".to_string(), Value::List(accounts));
        Ok((uuid::Uuid::new_v4().to_string(), attributes))
    }
}

fn filter_accounts<'a>(
    users: &'a [Json],
    name: Option<&str>,
    status: Option<&str>,
) -> Vec<&'a Json> {
    let matches = |field: &str, want: Option<&str>, user: &Json| match want {
        Some(want) => path_str(field, user).as_deref() == Some(want),
        None => true,
    };
    users
        .iter()
        .filter(|u| matches("name", name, u) && matches("status", status, u))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_client_side() {
        let users = vec![
            json!({"name": "a", "status": "RUNNING"}),
            json!({"name": "b", "status": "RUNNING"}),
            json!({"name": "c", "status": "ABNORMAL"}),
        ];
        assert_eq!(filter_accounts(&users, None, None).len(), 3);
        assert_eq!(filter_accounts(&users, None, Some("RUNNING")).len(), 2);
        let only_b = filter_accounts(&users, Some("b"), Some("RUNNING"));
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0]["name"], json!("b"));
        assert!(filter_accounts(&users, Some("c"), Some("RUNNING")).is_empty());
    }
}
