//! Translation defaults and Armada connection settings.
//!
//! Defaults fill in whatever a submission file leaves out. They can be
//! overridden with a YAML file:
//!
//! ```yaml
//! queue: research
//! priority: 2.0
//! timeout: 30m
//! cpu: "2"
//! memory: 4Gi
//! ```
//!
//! Keys absent from the file keep their built-in values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceOptions;
use crate::timeout::timeout_seconds;
use crate::{Error, Result};

/// Default values applied during translation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Queue used when neither the entry nor the document names one
    pub queue: String,
    /// Job priority when `armada_priority`/`priority` is absent
    pub priority: f64,
    /// Timeout when an entry has none (any accepted timeout form)
    pub timeout: String,
    /// CPU quantity for a resources mapping that omits `cpu`
    pub cpu: String,
    /// Memory quantity for a resources mapping that omits `memory`
    pub memory: String,
    /// Kubernetes namespace jobs run in
    pub namespace: String,
    /// Job set used when the document has no `job_set_id`
    pub job_set_id: String,
    /// Host suffix of the ingress controller; URLs are `<..>.<namespace>.<suffix>`
    pub ingress_domain: String,
    /// Whether notebook URLs are served over https
    pub ingress_tls: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            queue: "jupyter".to_string(),
            priority: 1.0,
            timeout: "1h".to_string(),
            cpu: "1".to_string(),
            memory: "1Gi".to_string(),
            namespace: "jupyter".to_string(),
            job_set_id: "armada-jupyter".to_string(),
            ingress_domain: "domain.com".to_string(),
            ingress_tls: false,
        }
    }
}

impl Defaults {
    /// Load defaults from a YAML file and validate them
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let defaults: Self = serde_yaml::from_str(&content)?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Check that the defaults themselves are usable
    pub fn validate(&self) -> Result<()> {
        if timeout_seconds(&self.timeout)? == 0 {
            return Err(Error::invalid_timeout(self.timeout.clone()));
        }
        if self.queue.is_empty() {
            return Err(Error::type_mismatch("defaults.queue", "a non-empty string"));
        }
        if !self.priority.is_finite() {
            return Err(Error::type_mismatch("defaults.priority", "a finite number"));
        }

        ResourceOptions::builder(self.cpu.clone(), self.memory.clone())
            .build()
            .map_err(|e| match e {
                Error::TypeMismatch { field, expected } => Error::TypeMismatch {
                    field: format!("defaults.{field}"),
                    expected,
                },
                other => other,
            })?;
        Ok(())
    }
}

/// Connection settings for the Armada REST gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Gateway host name
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Use plain http instead of https
    pub disable_ssl: bool,
}

impl ClientConfig {
    /// Base URL of the gateway, without a trailing slash
    pub fn base_url(&self) -> String {
        let scheme = if self.disable_ssl { "http" } else { "https" };
        format!("{}://{}:{}", scheme, self.host.trim_end_matches('/'), self.port)
    }
}
