//! Health check declarations
//!
//! These are the serialised descriptions attached to a host. The evaluators
//! that run them live in `drover-health`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A set of checks evaluated together, either before or after activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    /// Commands run on the target host
    #[serde(default)]
    pub cmd: Vec<CommandCheckSpec>,

    /// HTTP requests issued from the deploying machine
    #[serde(default)]
    pub http: Vec<HttpCheckSpec>,
}

impl HealthChecks {
    pub fn is_empty(&self) -> bool {
        self.cmd.is_empty() && self.http.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cmd.len() + self.http.len()
    }
}

/// A command that must exit 0 on the target host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandCheckSpec {
    #[serde(default)]
    pub description: String,

    /// argv, run through the remote execution channel
    pub cmd: Vec<String>,

    /// Seconds between attempts
    #[serde(default = "default_period")]
    pub period: u64,

    /// Seconds before the check is given up
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl CommandCheckSpec {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// An HTTP endpoint that must answer with a 2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCheckSpec {
    #[serde(default)]
    pub description: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Defaults to the host's target address
    #[serde(default)]
    pub host: Option<String>,

    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_period")]
    pub period: u64,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates
    #[serde(default, rename = "insecureSSL")]
    pub insecure_ssl: bool,
}

impl HttpCheckSpec {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Full URL for this check against `target`
    pub fn url(&self, target: &str) -> String {
        let host = self.host.as_deref().unwrap_or(target);
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", self.scheme, host, self.port, path)
    }
}

fn default_period() -> u64 {
    2
}

fn default_timeout() -> u64 {
    10
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_check_defaults() {
        let spec: HttpCheckSpec = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(spec.scheme, "http");
        assert_eq!(spec.path, "/");
        assert_eq!(spec.period(), Duration::from_secs(2));
        assert!(!spec.insecure_ssl);
    }

    #[test]
    fn test_http_check_url() {
        let spec: HttpCheckSpec =
            serde_json::from_str(r#"{"port": 443, "scheme": "https", "path": "health"}"#).unwrap();
        assert_eq!(spec.url("10.0.0.4"), "https://10.0.0.4:443/health");

        let pinned: HttpCheckSpec =
            serde_json::from_str(r#"{"port": 80, "host": "lb.internal"}"#).unwrap();
        assert_eq!(pinned.url("10.0.0.4"), "http://lb.internal:80/");
    }

    #[test]
    fn test_empty_checks() {
        let checks: HealthChecks = serde_json::from_str("{}").unwrap();
        assert!(checks.is_empty());
        assert_eq!(checks.len(), 0);
    }
}
