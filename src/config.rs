use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Workspace base URL, e.g. "https://my-workspace.cloud.example.com"
    pub workspace_url: String,
    /// Static bearer token fallback; the per-request forwarded token wins
    pub token: Option<String>,
    /// Name of the RAG serving endpoint to query
    pub serving_endpoint: String,
    /// Token budget passed to the endpoint per query
    pub max_output_tokens: u32,
    /// Upstream query timeout in seconds
    pub query_timeout_secs: u64,
    /// Maximum retained UI sessions (oldest pruned first)
    pub max_sessions: usize,
    /// Access-request submission settings
    pub access_request: AccessRequestConfig,
}

/// Where access requests land when the caller does not name a securable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestConfig {
    pub catalog: String,
    pub schema: String,
    /// Comma-separated privilege list sent with each request
    pub privileges: String,
}

impl Default for AccessRequestConfig {
    fn default() -> Self {
        Self {
            catalog: "data_product_catalog".to_string(),
            schema: "default".to_string(),
            privileges: "USE_SCHEMA,SELECT".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            workspace_url: String::new(),
            token: None,
            serving_endpoint: String::new(),
            max_output_tokens: 2000,
            query_timeout_secs: 120,
            max_sessions: 256,
            access_request: AccessRequestConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DATA_DISCOVERY_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("DATABRICKS_HOST") {
            config.workspace_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(token) = std::env::var("DATABRICKS_TOKEN") {
            config.token = Some(token);
        }
        if let Ok(endpoint) = std::env::var("SERVING_ENDPOINT") {
            config.serving_endpoint = endpoint;
        }
        if let Ok(val) = std::env::var("DATA_DISCOVERY_MAX_OUTPUT_TOKENS") {
            if let Ok(v) = val.parse() {
                config.max_output_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("DATA_DISCOVERY_QUERY_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.query_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("DATA_DISCOVERY_MAX_SESSIONS") {
            if let Ok(v) = val.parse() {
                config.max_sessions = v;
            }
        }
        if let Ok(catalog) = std::env::var("ACCESS_REQUEST_CATALOG") {
            config.access_request.catalog = catalog;
        }
        if let Ok(schema) = std::env::var("ACCESS_REQUEST_SCHEMA") {
            config.access_request.schema = schema;
        }
        if let Ok(privileges) = std::env::var("ACCESS_REQUEST_PRIVILEGES") {
            config.access_request.privileges = privileges;
        }

        config
    }

    /// Invocation URL for the configured serving endpoint.
    pub fn invocations_url(&self) -> String {
        format!(
            "{}/serving-endpoints/{}/invocations",
            self.workspace_url, self.serving_endpoint
        )
    }

    /// Metadata URL used to read the endpoint's task type.
    pub fn endpoint_info_url(&self) -> String {
        format!(
            "{}/api/2.0/serving-endpoints/{}",
            self.workspace_url, self.serving_endpoint
        )
    }

    /// Workspace API URL for access-request submission.
    pub fn access_request_url(&self) -> String {
        format!("{}/api/2.0/rfa/request", self.workspace_url)
    }

    /// Default securable (catalog.schema) for access requests.
    pub fn securable_full_name(&self) -> String {
        format!(
            "{}.{}",
            self.access_request.catalog, self.access_request.schema
        )
    }
}
