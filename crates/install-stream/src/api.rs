use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::StreamConfig;
use crate::errors::OrchestratorError;
use crate::orchestrator::{InstallerApi, OperationRequest, OperationTicket};

const OPERATION_ID_KEYS: [&str; 4] = ["operationId", "OperationId", "operation_id", "id"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    component_id: &'a str,
    version: &'a str,
}

/// `InstallerApi` over the installer's JSON endpoints.
pub struct HttpInstallerApi {
    client: reqwest::Client,
    config: StreamConfig,
}

impl HttpInstallerApi {
    /// The whole start request, body included, is bounded by `request_timeout`.
    pub fn new(config: StreamConfig) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OrchestratorError::transport(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl InstallerApi for HttpInstallerApi {
    async fn start(&self, request: &OperationRequest) -> Result<OperationTicket, OrchestratorError> {
        let url = self.config.start_url(request.mode);
        debug!(%url, component_id = %request.component_id, "sending start request");

        let mut builder = self.client.post(&url).json(&StartBody {
            component_id: &request.component_id,
            version: &request.version,
        });
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("X-Api-Key", api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                OrchestratorError::transport(format!(
                    "start request timed out after {}ms",
                    self.config.request_timeout.as_millis()
                ))
            } else {
                OrchestratorError::transport(format!("start request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrchestratorError::transport(format!("failed to read start response: {e}")))?;
        if !status.is_success() {
            return Err(OrchestratorError::rejected(status.as_u16(), body));
        }
        ticket_from_body(&body)
    }
}

fn ticket_from_body(body: &str) -> Result<OperationTicket, OrchestratorError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| OrchestratorError::Protocol(format!("start response is not JSON: {e}")))?;
    let operation_id = OPERATION_ID_KEYS
        .iter()
        .filter_map(|key| value.get(key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| OrchestratorError::Protocol("start response has no operation id".into()))?;
    Ok(OperationTicket { operation_id })
}
