use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::config::HubSpotConfig;
use super::models::{BatchCreateBody, BatchReadBody, ContactsPage, ErrorBody, IdInput};
use super::rate_limit::RateLimiter;
use crmsync::remote::{RemoteDirectory, RemoteError};
use crmsync_api::{
    AccessToken, BatchReadRequest, BatchResponse, CreateContactInput, ListRequest,
    RemoteContactRecord,
};

const CONTACTS_PATH: &str = "/crm/v3/objects/contacts";
const BATCH_READ_PATH: &str = "/crm/v3/objects/contacts/batch/read";
const BATCH_CREATE_PATH: &str = "/crm/v3/objects/contacts/batch/create";

/// Shared HTTP plumbing: one reqwest client, one rate limiter, one base URL
///
/// Every call through a `HubSpotTransport` (directory calls and token
/// exchanges alike) waits on the same limiter.
pub struct HubSpotTransport {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl HubSpotTransport {
    pub fn new(config: &HubSpotConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        let limiter = RateLimiter::new(&config.rate_limit);
        info!(
            "[HubSpotTransport] Using {} (min interval {:?}, max {} concurrent calls)",
            config.base_url,
            limiter.min_interval(),
            config.rate_limit.max_concurrent
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn format_reqwest_error(e: reqwest::Error, url: &str, operation: &str) -> String {
        if e.is_timeout() {
            format!(
                "Failed to {} for {}: timeout - request took too long (check network or increase timeout)",
                operation, url
            )
        } else if e.is_connect() {
            format!(
                "Failed to {} for {}: connection error - check network connectivity, DNS resolution, and firewall settings. Error: {}",
                operation, url, e
            )
        } else if e.is_request() {
            format!(
                "Failed to {} for {}: request error - invalid URL format or malformed request parameters. Error: {}",
                operation, url, e
            )
        } else {
            format!("Failed to {} for {}: {}. Debug details: {:?}", operation, url, e, e)
        }
    }

    /// Body text of a 2xx response, `RemoteError::Http` otherwise
    async fn handle_response(response: reqwest::Response, url: &str) -> Result<String, RemoteError> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            RemoteError::Transport(format!("Failed to read response body from {}: {}", url, e))
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&response_text) {
                Ok(body) => match body.category {
                    Some(category) => format!("{}: {}", category, body.message),
                    None => body.message,
                },
                Err(_) if response_text.chars().count() > 500 => format!(
                    "{}... (truncated)",
                    response_text.chars().take(500).collect::<String>()
                ),
                Err(_) => response_text,
            };
            return Err(RemoteError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                message,
            });
        }

        Ok(response_text)
    }

    fn decode<T: DeserializeOwned>(text: &str, url: &str) -> Result<T, RemoteError> {
        serde_json::from_str(text).map_err(|e| {
            let error = format!(
                "Failed to parse response from {}: {} - Response (first 500): {}",
                url,
                e,
                text.chars().take(500).collect::<String>()
            );
            error!("[HubSpotTransport] {}", error);
            RemoteError::Decode(error)
        })
    }

    /// Headers for one call: bearer token plus the current trace context
    fn headers(token: Option<&AccessToken>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token.as_str())) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        inject_trace_context(headers)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<String, RemoteError> {
        let _permit = self.limiter.acquire().await?;
        let response = request.send().await.map_err(|e| {
            let error_msg = Self::format_reqwest_error(e, url, operation);
            error!("[HubSpotTransport] Request failed: {}", error_msg);
            RemoteError::Transport(error_msg)
        })?;

        let text = Self::handle_response(response, url).await.map_err(|e| {
            error!("[HubSpotTransport] Failed to {}: {}", operation, e);
            e
        })?;
        debug!(
            "[HubSpotTransport] {} response received: length={}",
            operation,
            text.len()
        );
        Ok(text)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&AccessToken>,
        query: &[(&str, String)],
        operation: &str,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let request = self
            .client
            .get(&url)
            .headers(Self::headers(token))
            .query(query);
        let text = self.send(request, &url, operation).await?;
        Self::decode(&text, &url)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&AccessToken>,
        body: &B,
        operation: &str,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let request = self
            .client
            .post(&url)
            .headers(Self::headers(token))
            .json(body);
        let text = self.send(request, &url, operation).await?;
        Self::decode(&text, &url)
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
        operation: &str,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let request = self.client.post(&url).headers(Self::headers(None)).form(form);
        let text = self.send(request, &url, operation).await?;
        Self::decode(&text, &url)
    }
}

/// Copy the current OpenTelemetry context into outgoing HTTP headers
pub fn inject_trace_context(headers: HeaderMap) -> HeaderMap {
    use opentelemetry::global;
    use opentelemetry::Context;

    struct HeaderInjector {
        headers: HeaderMap,
    }
    impl opentelemetry::propagation::Injector for HeaderInjector {
        fn set(&mut self, key: &str, value: String) {
            if let Ok(header_name) = HeaderName::from_bytes(key.as_bytes()) {
                if let Ok(header_value) = HeaderValue::from_str(&value) {
                    self.headers.insert(header_name, header_value);
                }
            }
        }
    }

    let mut injector = HeaderInjector { headers };
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&Context::current(), &mut injector);
    });
    injector.headers
}

/// Contact directory backed by the HubSpot CRM v3 objects API
pub struct HubSpotClient {
    transport: Arc<HubSpotTransport>,
}

impl HubSpotClient {
    pub fn new(transport: Arc<HubSpotTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &HubSpotConfig) -> Result<Self, RemoteError> {
        Ok(Self::new(Arc::new(HubSpotTransport::new(config)?)))
    }

    pub fn transport(&self) -> Arc<HubSpotTransport> {
        self.transport.clone()
    }

    fn list_query(request: &ListRequest, after: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("limit", request.page_size.to_string()),
            ("properties", request.properties.join(",")),
            ("archived", request.archived.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        query
    }
}

#[async_trait]
impl RemoteDirectory for HubSpotClient {
    fn directory_name(&self) -> &str {
        "hubspot"
    }

    async fn list_all(
        &self,
        token: &AccessToken,
        request: ListRequest,
    ) -> Result<Vec<RemoteContactRecord>, RemoteError> {
        let mut records = Vec::new();
        let mut after = request.after.clone();
        let mut pages = 0;

        loop {
            let query = Self::list_query(&request, after.as_deref());
            let page: ContactsPage = self
                .transport
                .get_json(CONTACTS_PATH, Some(token), &query, "list contacts")
                .await?;
            pages += 1;
            after = page.next_after().map(str::to_string);
            records.extend(page.results);
            if after.is_none() {
                break;
            }
        }

        info!(
            "[HubSpotClient] Listed {} contacts in {} pages",
            records.len(),
            pages
        );
        Ok(records)
    }

    async fn batch_read(
        &self,
        token: &AccessToken,
        request: BatchReadRequest,
    ) -> Result<BatchResponse, RemoteError> {
        let body = BatchReadBody {
            id_property: request.id_property,
            inputs: request.ids.into_iter().map(|id| IdInput { id }).collect(),
            properties: request.properties,
        };
        debug!(
            "[HubSpotClient] Batch reading {} contacts by {}",
            body.inputs.len(),
            body.id_property
        );
        self.transport
            .post_json(BATCH_READ_PATH, Some(token), &body, "batch read contacts")
            .await
    }

    async fn batch_create(
        &self,
        token: &AccessToken,
        inputs: Vec<CreateContactInput>,
    ) -> Result<BatchResponse, RemoteError> {
        let count = inputs.len();
        let response: BatchResponse = self
            .transport
            .post_json(
                BATCH_CREATE_PATH,
                Some(token),
                &BatchCreateBody { inputs },
                "batch create contacts",
            )
            .await?;
        info!(
            "[HubSpotClient] Batch create: {} sent, {} created, {} errors",
            count,
            response.results.len(),
            response.errors.len()
        );
        Ok(response)
    }
}
