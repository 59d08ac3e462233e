//! Listing APIs that return results page by page

use log::debug;
use serde_json::Value as Json;

use crate::client::{SdkResult, ServiceClient};
use crate::utils::path_array;

pub const DEFAULT_PAGE_LIMIT: usize = 100;

fn with_query(path: &str, query: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, sep, query)
}

/// Collect `items_key` from every page of an `offset`/`limit` API.
///
/// `offset` is the number of items already read; iteration stops on the
/// first empty page.
pub async fn list_all_by_offset(
    client: &ServiceClient,
    path: &str,
    items_key: &str,
    limit: usize,
) -> SdkResult<Vec<Json>> {
    let mut all = Vec::new();
    loop {
        let page_path = with_query(path, &format!("offset={}&limit={}", all.len(), limit));
        let body = client.get(&page_path).await?;
        let items = path_array(items_key, &body);
        debug!("{}: {} items at offset {}", path, items.len(), all.len());
        if items.is_empty() {
            return Ok(all);
        }
        all.extend(items);
    }
}

/// Collect `items_key` from every page of a page-number API, starting at
/// page 1 and stopping on the first empty page
pub async fn list_all_by_page(
    client: &ServiceClient,
    path: &str,
    items_key: &str,
    page_param: &str,
) -> SdkResult<Vec<Json>> {
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let page_path = with_query(path, &format!("{}={}", page_param, page));
        let body = client.get(&page_path).await?;
        let items = path_array(items_key, &body);
        debug!("{}: {} items on page {}", path, items.len(), page);
        if items.is_empty() {
            return Ok(all);
        }
        all.extend(items);
        page += 1;
    }
}
