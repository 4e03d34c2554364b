//! HTTP checks issued from the deploying machine.

use async_trait::async_trait;
use drover_types::{Host, HttpCheckSpec};
use tracing::trace;

use super::{HealthCheck, RetryPolicy};
use crate::error::{HealthError, HealthResult};

/// An endpoint that must answer with a 2xx status.
pub struct HttpCheck {
    name: String,
    spec: HttpCheckSpec,
    client: reqwest::Client,
}

impl HttpCheck {
    pub fn new(spec: HttpCheckSpec) -> HealthResult<Self> {
        let name = if spec.description.is_empty() {
            format!("http: {}", spec.url(spec.host.as_deref().unwrap_or("<target>")))
        } else {
            spec.description.clone()
        };

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(spec.insecure_ssl)
            .timeout(spec.timeout())
            .build()
            .map_err(|e| HealthError::Invalid {
                check: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { name, spec, client })
    }

    pub fn url(&self, host: &Host) -> String {
        self.spec.url(host.target())
    }
}

#[async_trait]
impl HealthCheck for HttpCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.spec.period(), self.spec.timeout())
    }

    async fn check(&self, host: &Host) -> HealthResult<bool> {
        let url = self.url(host);
        let mut request = self.client.get(&url);
        for (key, value) in &self.spec.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HealthError::attempt(&self.name, e))?;
        trace!(url = %url, status = %response.status(), "http check response");

        Ok(response.status().is_success())
    }
}
