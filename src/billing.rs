//! Credit ledger client.
//!
//! A failed job returns the credit its owner was charged. The ledger itself
//! is an external service; this module only issues the refund request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BillingConfig;
use crate::constants::billing::{REFUND_CREDITS, REFUND_TIMEOUT_SECS};
use crate::types::{JobId, PipelineError, Result};

/// Body of a refund request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub job_id: JobId,
    pub owner: String,
    pub credits: u32,
}

impl RefundRequest {
    pub fn for_job(job_id: JobId, owner: impl Into<String>) -> Self {
        Self {
            job_id,
            owner: owner.into(),
            credits: REFUND_CREDITS,
        }
    }
}

/// External credit ledger
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn refund(&self, request: &RefundRequest) -> Result<()>;
}

pub type SharedLedger = Arc<dyn CreditLedger>;

/// Ledger used when billing is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCreditLedger;

#[async_trait]
impl CreditLedger for NoopCreditLedger {
    async fn refund(&self, request: &RefundRequest) -> Result<()> {
        debug!(job_id = %request.job_id, "Billing disabled, skipping refund");
        Ok(())
    }
}

/// Ledger reached over HTTP: `POST <refund_url>` with a JSON [`RefundRequest`]
pub struct HttpCreditLedger {
    refund_url: url::Url,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpCreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCreditLedger")
            .field("refund_url", &self.refund_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpCreditLedger {
    pub fn new(refund_url: &str, token: Option<String>) -> Result<Self> {
        Self::with_timeout(refund_url, token, Duration::from_secs(REFUND_TIMEOUT_SECS))
    }

    /// Ledger whose requests give up after `timeout`
    pub fn with_timeout(refund_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let refund_url = url::Url::parse(refund_url).map_err(|e| {
            PipelineError::Config(format!("Invalid refund URL '{}': {}", refund_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Refund(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            refund_url,
            token: token.map(SecretString::from),
            client,
        })
    }
}

#[async_trait]
impl CreditLedger for HttpCreditLedger {
    async fn refund(&self, request: &RefundRequest) -> Result<()> {
        let mut call = self.client.post(self.refund_url.clone()).json(request);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token.expose_secret());
        }

        let response = call
            .send()
            .await
            .map_err(|e| PipelineError::Refund(format!("Refund request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Refund(format!(
                "Ledger rejected refund ({}): {}",
                status, body
            )));
        }

        info!(job_id = %request.job_id, credits = request.credits, "Credit refunded");
        Ok(())
    }
}

/// Build the ledger selected by configuration
pub fn create_ledger(config: &BillingConfig) -> Result<SharedLedger> {
    if !config.enabled {
        return Ok(Arc::new(NoopCreditLedger));
    }

    let url = config.refund_url.as_deref().ok_or_else(|| {
        PipelineError::Config("billing.refund_url is required when billing is enabled".to_string())
    })?;

    let token = match &config.token_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            PipelineError::Config(format!("Environment variable {} is not set", var))
        })?),
        None => None,
    };

    Ok(Arc::new(HttpCreditLedger::new(url, token)?))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Ledger that records every refund and can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingLedger {
        pub(crate) requests: Mutex<Vec<RefundRequest>>,
        fail: bool,
    }

    impl RecordingLedger {
        pub(crate) fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub(crate) fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CreditLedger for RecordingLedger {
        async fn refund(&self, request: &RefundRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(PipelineError::Refund("ledger unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_request_serialization() {
        let id = JobId::new();
        let body = serde_json::to_value(RefundRequest::for_job(id, "alice")).unwrap();

        assert_eq!(body["job_id"], id.to_string());
        assert_eq!(body["owner"], "alice");
        assert_eq!(body["credits"], 1);
    }

    #[tokio::test]
    async fn test_noop_ledger_succeeds() {
        let request = RefundRequest::for_job(JobId::new(), "alice");
        assert!(NoopCreditLedger.refund(&request).await.is_ok());
    }

    #[test]
    fn test_disabled_billing_uses_noop() {
        assert!(create_ledger(&BillingConfig::default()).is_ok());
    }

    #[test]
    fn test_enabled_billing_requires_url() {
        let config = BillingConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(matches!(
            create_ledger(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_http_ledger_debug_redacts_token() {
        let ledger =
            HttpCreditLedger::new("https://ledger.example.com/refund", Some("tok-123".into()))
                .unwrap();
        let debug = format!("{:?}", ledger);
        assert!(!debug.contains("tok-123"));
        assert!(debug.contains("ledger.example.com"));
    }

    #[tokio::test]
    async fn test_silent_ledger_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let ledger = HttpCreditLedger::with_timeout(
            &format!("http://{}/refund", addr),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let request = RefundRequest::for_job(JobId::new(), "alice");

        let result = tokio::time::timeout(Duration::from_secs(5), ledger.refund(&request))
            .await
            .expect("refund did not time out");
        assert!(matches!(result, Err(PipelineError::Refund(_))));
        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_ledger_reports_refund_error() {
        let ledger = HttpCreditLedger::new("http://127.0.0.1:9/refund", None).unwrap();
        let request = RefundRequest::for_job(JobId::new(), "alice");
        assert!(matches!(
            ledger.refund(&request).await,
            Err(PipelineError::Refund(_))
        ));
    }
}
