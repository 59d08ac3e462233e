//! Service clients
//!
//! A [`ClientFactory`] owns the shared HTTP client and credentials and hands
//! out a [`ServiceClient`] bound to one service endpoint and region.

pub mod error;
pub mod signer;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use reqwest::{Method, Url};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::ProviderConfig;

pub use error::SdkError;
use error::sanitize_for_log;
use signer::{HEADER_SDK_DATE, Signer};

pub type SdkResult<T> = Result<T, SdkError>;

const USER_AGENT: &str = concat!("carina-provider-huaweicloud/", env!("CARGO_PKG_VERSION"));

/// Whether an endpoint includes the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regional,
    Global,
}

/// Endpoint naming of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: &'static str,
    /// Host prefix, e.g. "ddm" in `ddm.cn-north-4.myhuaweicloud.com`
    pub prefix: &'static str,
    pub scope: Scope,
}

/// Services this provider talks to
pub struct ServiceCatalog;

impl ServiceCatalog {
    const ENTRIES: &'static [ServiceEndpoint] = &[
        ServiceEndpoint {
            name: "iam",
            prefix: "iam",
            scope: Scope::Global,
        },
        ServiceEndpoint {
            name: "bss",
            prefix: "bss",
            scope: Scope::Global,
        },
        ServiceEndpoint {
            name: "cloudtable",
            prefix: "cloudtable",
            scope: Scope::Regional,
        },
        ServiceEndpoint {
            name: "ddm",
            prefix: "ddm",
            scope: Scope::Regional,
        },
        ServiceEndpoint {
            name: "ccm",
            prefix: "ccm",
            scope: Scope::Regional,
        },
        ServiceEndpoint {
            name: "ims",
            prefix: "ims",
            scope: Scope::Regional,
        },
        ServiceEndpoint {
            name: "mrs",
            prefix: "mrs",
            scope: Scope::Regional,
        },
    ];

    pub fn lookup(name: &str) -> Option<ServiceEndpoint> {
        Self::ENTRIES.iter().copied().find(|e| e.name == name)
    }

    /// Default endpoint URL, always ending with `/`
    pub fn endpoint_url(entry: &ServiceEndpoint, region: &str, cloud: &str) -> String {
        match entry.scope {
            Scope::Regional => format!("https://{}.{}.{}/", entry.prefix, region, cloud),
            Scope::Global => format!("https://{}.{}/", entry.prefix, cloud),
        }
    }
}

/// Options of a single request
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    /// Accepted status codes; any 2xx when empty
    pub ok_codes: Vec<u16>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn accepts(&self, status: u16) -> bool {
        if self.ok_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.ok_codes.contains(&status)
        }
    }
}

/// Client bound to one service endpoint in one region
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    service: &'static str,
    endpoint: String,
    region: String,
    project_id: String,
    signer: Option<Signer>,
    security_token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ServiceClient {
    pub fn service(&self) -> &str {
        self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Absolute URL for a path relative to the endpoint.
    /// `{project_id}` is filled in.
    pub fn url(&self, path: &str) -> String {
        let path = path.replace("{project_id}", &self.project_id);
        if path.starts_with("http://") || path.starts_with("https://") {
            return path;
        }
        format!("{}{}", self.endpoint, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> SdkResult<serde_json::Value> {
        self.request(Method::GET, path, RequestOpts::new()).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> SdkResult<serde_json::Value> {
        self.request(Method::POST, path, RequestOpts::new().json(body))
            .await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> SdkResult<serde_json::Value> {
        self.request(Method::PUT, path, RequestOpts::new().json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> SdkResult<serde_json::Value> {
        self.request(Method::DELETE, path, RequestOpts::new()).await
    }

    /// Send a request, retrying throttled and gateway failures.
    ///
    /// The response body is returned as JSON; an empty body yields `Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts,
    ) -> SdkResult<serde_json::Value> {
        let url = Url::parse(&self.url(path))
            .map_err(|e| SdkError::Config(format!("invalid URL for {}: {}", path, e)))?;
        let body = match &opts.body {
            Some(json) => serde_json::to_vec(json)
                .map_err(|e| SdkError::Config(format!("failed to encode body: {}", e)))?,
            None => Vec::new(),
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&method, &url, &opts, &body).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt.min(6));
                    warn!(
                        "{} {} failed ({}), retrying in {:?} (attempt {}/{})",
                        method,
                        url,
                        e,
                        delay,
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        opts: &RequestOpts,
        body: &[u8],
    ) -> SdkResult<serde_json::Value> {
        debug!("{} {}", method, url);

        let mut headers: Vec<(String, String)> = Vec::new();
        if let Some(host) = url.host_str() {
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            headers.push(("Host".to_string(), host));
        }
        headers.push((HEADER_SDK_DATE.to_string(), Signer::sdk_date(Utc::now())));
        if opts.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if !self.project_id.is_empty() {
            headers.push(("X-Project-Id".to_string(), self.project_id.clone()));
        }
        if let Some(token) = &self.security_token {
            headers.push(("X-Security-Token".to_string(), token.clone()));
        }
        headers.extend(opts.headers.iter().cloned());

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .body(body.to_vec());
        if let Some(signer) = &self.signer {
            let auth = signer.authorization(method.as_str(), url, &headers, body)?;
            request = request.header("Authorization", auth);
        }
        for (key, value) in headers.iter().filter(|(k, _)| k != "Host") {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if !opts.accepts(status) {
            debug!(
                "{} {} returned {}: {}",
                method,
                url,
                status,
                sanitize_for_log(&text)
            );
            return Err(SdkError::http(status, method.as_str(), url.as_str(), text));
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            SdkError::Decode(format!(
                "{} {}: {} (body: {})",
                method,
                url,
                e,
                sanitize_for_log(&text)
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    name: String,
}

/// Creates service clients and caches the project ID of every region
pub struct ClientFactory {
    config: ProviderConfig,
    http: reqwest::Client,
    project_ids: Mutex<HashMap<String, String>>,
    retry_delay: Duration,
}

impl ClientFactory {
    pub fn new(config: ProviderConfig, retry_delay: Duration) -> SdkResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let mut project_ids = HashMap::new();
        if let Some(project_id) = &config.project_id {
            project_ids.insert(config.region.clone(), project_id.clone());
        }

        Ok(Self {
            config,
            http,
            project_ids: Mutex::new(project_ids),
            retry_delay,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Endpoint of a service, honouring `endpoints` overrides
    pub fn endpoint(&self, service: &str, region: &str) -> SdkResult<String> {
        if let Some(url) = self.config.endpoints.get(service) {
            return Ok(if url.ends_with('/') {
                url.clone()
            } else {
                format!("{}/", url)
            });
        }
        let entry = ServiceCatalog::lookup(service)
            .ok_or_else(|| SdkError::Config(format!("unsupported service: {}", service)))?;
        Ok(ServiceCatalog::endpoint_url(&entry, region, &self.config.cloud))
    }

    /// Project ID of a region, queried from IAM on first use
    pub async fn project_id(&self, region: &str) -> SdkResult<String> {
        let mut cache = self.project_ids.lock().await;
        if let Some(id) = cache.get(region) {
            return Ok(id.clone());
        }

        let iam = self.build_client("iam", region, String::new())?;
        let path = format!("v3/projects?name={}", urlencoding::encode(region));
        let body = iam.get(&path).await?;
        let list: ProjectList = serde_json::from_value(body)
            .map_err(|e| SdkError::Decode(format!("IAM project list: {}", e)))?;
        let project = list
            .projects
            .into_iter()
            .find(|p| p.name == region)
            .ok_or_else(|| SdkError::Config(format!("no IAM project found for region {}", region)))?;

        debug!("resolved project {} for region {}", project.id, region);
        cache.insert(region.to_string(), project.id.clone());
        Ok(project.id)
    }

    pub async fn service_client(&self, service: &str, region: &str) -> SdkResult<ServiceClient> {
        let project_id = self.project_id(region).await?;
        self.build_client(service, region, project_id)
    }

    fn build_client(
        &self,
        service: &str,
        region: &str,
        project_id: String,
    ) -> SdkResult<ServiceClient> {
        let entry = ServiceCatalog::lookup(service)
            .ok_or_else(|| SdkError::Config(format!("unsupported service: {}", service)))?;
        let signer = match (&self.config.access_key, &self.config.secret_key) {
            (Some(ak), Some(sk)) => Some(Signer::new(ak, sk)),
            _ => None,
        };

        Ok(ServiceClient {
            http: self.http.clone(),
            service: entry.name,
            endpoint: self.endpoint(service, region)?,
            region: region.to_string(),
            project_id,
            signer,
            security_token: self.config.security_token.clone(),
            max_retries: self.config.max_retries,
            retry_delay: self.retry_delay,
        })
    }
}
