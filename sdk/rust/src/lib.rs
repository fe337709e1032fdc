use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// JSON-RPC 2.0 request as accepted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(id: &str, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// HTTP status plus the decoded body.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl GatewayResponse {
    /// JSON-RPC error code, if the body carries an error.
    pub fn error_code(&self) -> Option<i64> {
        self.body.get("error")?.get("code")?.as_i64()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error")?.get("message")?.as_str()
    }
}

pub struct GatewayClient {
    client: Client,
    gateway_url: String,
    auth: Option<String>,
}

impl GatewayClient {
    pub fn new(gateway_url: &str) -> Self {
        Self {
            client: Client::new(),
            gateway_url: gateway_url.to_string(),
            auth: None,
        }
    }

    /// Send `token` in the `Authorization` header of every request.
    pub fn with_auth(mut self, token: &str) -> Self {
        self.auth = Some(token.to_string());
        self
    }

    /// Send a JSON-RPC request.
    pub async fn send(&self, request: &RpcRequest) -> Result<GatewayResponse, Error> {
        self.send_raw(serde_json::to_vec(request)?).await
    }

    /// Send an already encoded body, e.g. a signed legacy message.
    pub async fn send_raw(&self, body: Vec<u8>) -> Result<GatewayResponse, Error> {
        let mut builder = self
            .client
            .post(&self.gateway_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth {
            builder = builder.header(AUTHORIZATION, token);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body = serde_json::from_str(&text)
            .map_err(|e| format!("Gateway returned non-JSON body (status {}): {}: {}", status, e, text))?;
        Ok(GatewayResponse { status, body })
    }
}
