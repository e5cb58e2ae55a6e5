use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use voxcore::{Credentials, ExternalServiceError, IntegrationAdapter, SecretError, SecretProvider, Value};

/// Secret provider backed by a fixed in-process map.
#[derive(Default)]
pub struct StaticSecretProvider {
    credentials: HashMap<String, Credentials>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(service.into(), credentials);
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn resolve(&self, service: &str) -> Result<Credentials, SecretError> {
        self.credentials
            .get(service)
            .cloned()
            .ok_or_else(|| SecretError::MissingConfiguration(service.to_string()))
    }
}

/// Adapter that forwards operations to an HTTP endpoint as JSON.
///
/// Each call POSTs `{endpoint}/{operation}` with the params as the body,
/// authenticated with a bearer token from the secret provider. HTTP 429
/// and 5xx responses are reported as retryable.
pub struct HttpAdapter {
    service: String,
    endpoint: String,
    client: reqwest::Client,
    secrets: Arc<dyn SecretProvider>,
}

impl HttpAdapter {
    pub fn new(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            secrets,
        }
    }

    fn error(&self, operation: &str, message: String, retryable: bool, status_hint: Option<u16>) -> ExternalServiceError {
        ExternalServiceError {
            service: self.service.clone(),
            operation: operation.to_string(),
            message,
            retryable,
            status_hint,
        }
    }
}

#[async_trait]
impl IntegrationAdapter for HttpAdapter {
    fn service(&self) -> &str {
        &self.service
    }

    async fn call(
        &self,
        operation: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ExternalServiceError> {
        let credentials = self
            .secrets
            .resolve(&self.service)
            .await
            .map_err(|e| self.error(operation, e.to_string(), false, None))?;

        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), operation);
        let mut request = self.client.post(&url).json(&params.to_json());
        if let Some(token) = &credentials.token {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(self.error(operation, "cancelled".to_string(), false, None));
            }
            result = request.send() => result.map_err(|e| {
                self.error(operation, format!("request failed: {}", e), true, None)
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status.as_u16() == 429;
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(
                operation,
                format!("HTTP {}: {}", status.as_u16(), body),
                retryable,
                Some(status.as_u16()),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.error(operation, format!("invalid response body: {}", e), false, Some(status.as_u16())))?;
        Ok(Value::Json(body))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: String,
    pub params: Value,
}

struct FailurePlan {
    remaining: u32,
    retryable: bool,
}

/// In-process adapter with canned responses, call recording and failure
/// injection. Runs workflows offline for tests and the CLI.
pub struct SimulatedAdapter {
    service: String,
    responses: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, FailurePlan>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl SimulatedAdapter {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            responses: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fixed response for one operation; unset operations echo their call.
    pub fn respond_with(self, operation: impl Into<String>, response: Value) -> Self {
        self.responses
            .lock()
            .expect("responses lock poisoned")
            .insert(operation.into(), response);
        self
    }

    /// Fail the next `times` calls to `operation` before succeeding.
    pub fn fail_times(self, operation: impl Into<String>, times: u32, retryable: bool) -> Self {
        self.failures.lock().expect("failures lock poisoned").insert(
            operation.into(),
            FailurePlan {
                remaining: times,
                retryable,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }
}

#[async_trait]
impl IntegrationAdapter for SimulatedAdapter {
    fn service(&self) -> &str {
        &self.service
    }

    async fn call(
        &self,
        operation: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ExternalServiceError> {
        if cancel.is_cancelled() {
            return Err(ExternalServiceError {
                service: self.service.clone(),
                operation: operation.to_string(),
                message: "cancelled".to_string(),
                retryable: false,
                status_hint: None,
            });
        }
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(RecordedCall {
                operation: operation.to_string(),
                params: params.clone(),
            });
        {
            let mut failures = self.failures.lock().expect("failures lock poisoned");
            if let Some(plan) = failures.get_mut(operation) {
                if plan.remaining > 0 {
                    plan.remaining -= 1;
                    return Err(ExternalServiceError {
                        service: self.service.clone(),
                        operation: operation.to_string(),
                        message: "injected failure".to_string(),
                        retryable: plan.retryable,
                        status_hint: Some(503),
                    });
                }
            }
        }
        let canned = self
            .responses
            .lock()
            .expect("responses lock poisoned")
            .get(operation)
            .cloned();
        match canned {
            Some(response) => Ok(response),
            None => {
                let mut echo = HashMap::new();
                echo.insert("service".to_string(), Value::String(self.service.clone()));
                echo.insert("operation".to_string(), Value::String(operation.to_string()));
                echo.insert("params".to_string(), params);
                Ok(Value::Object(echo))
            }
        }
    }
}
