//! Legacy (schema 1) documents: a full pod spec per job.
//!
//! ```yaml
//! queue: test
//! job_set_id: test
//! timeout: 10m
//! jobs:
//!   - priority: 0
//!     namespace: jupyter
//!     podspec:
//!       containers:
//!         - name: jupyterlab
//!           image: jupyter/minimal-notebook
//!           ports: [{containerPort: 8888}]
//!     ingress:
//!       - type: Ingress
//!         ports: [8888]
//!         tlsEnabled: false
//! ```

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::armada::{IngressConfig, JobSubmitRequestItem, ServiceConfig};
use crate::config::Defaults;
use crate::podspec::PodSpec;
use crate::timeout::{normalize_timeout, timeout_seconds};
use crate::yaml;
use crate::{Error, Result};

/// Ingress keys written in camelCase by users, and the field names
/// `IngressConfig` is constructed from.
const INGRESS_KEY_REMAP: &[(&str, &str)] = &[
    ("tlsEnabled", "tls_enabled"),
    ("UseClusterIP", "use_clusterIP"),
];

/// A job carrying a hand-written pod spec
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    podspec: PodSpec,
    priority: f64,
    namespace: String,
    ingress: Vec<IngressConfig>,
    services: Vec<ServiceConfig>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl Job {
    /// Assemble one `jobs[i]` entry
    pub fn from_entry(entry: &Mapping, context: &str, defaults: &Defaults) -> Result<Self> {
        let podspec_path = yaml::path(context, "podspec");
        let podspec_value =
            yaml::get(entry, "podspec").ok_or_else(|| Error::missing_key("podspec", context))?;
        yaml::as_mapping(podspec_value, &podspec_path)?;

        let podspec: PodSpec = serde_yaml::from_value(podspec_value.clone()).map_err(|e| {
            debug!(error = %e, field = %podspec_path, "podspec did not deserialize");
            Error::type_mismatch(podspec_path.clone(), "a Kubernetes pod spec")
        })?;
        if podspec.containers.is_empty() {
            return Err(Error::missing_key("containers", podspec_path));
        }

        let priority = yaml::optional_f64(entry, "priority", context)?.unwrap_or(defaults.priority);
        let namespace = yaml::optional_string(entry, "namespace", context)?
            .unwrap_or_else(|| defaults.namespace.clone());

        let ingress = ingress_configs(yaml::get(entry, "ingress"), &yaml::path(context, "ingress"))?;
        let services =
            service_configs(yaml::get(entry, "services"), &yaml::path(context, "services"))?;

        Ok(Self {
            podspec,
            priority,
            namespace,
            ingress,
            services,
            labels: yaml::optional_string_map(entry, "labels", context)?,
            annotations: yaml::optional_string_map(entry, "annotations", context)?,
        })
    }

    /// Pod spec as written
    pub fn podspec(&self) -> &PodSpec {
        &self.podspec
    }

    /// Armada priority
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Kubernetes namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Ingress configs
    pub fn ingress(&self) -> &[IngressConfig] {
        &self.ingress
    }

    /// Service configs
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    /// Labels
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Annotations
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Build the Armada request item for this job
    pub fn to_request_item(&self) -> JobSubmitRequestItem {
        JobSubmitRequestItem::new(self.namespace.clone(), self.priority, self.podspec.clone())
            .with_labels(self.labels.clone())
            .with_annotations(self.annotations.clone())
            .with_ingress(self.ingress.clone())
            .with_services(self.services.clone())
    }
}

/// A legacy document: one queue and job set for all jobs
#[derive(Clone, Debug, PartialEq)]
pub struct LegacySubmission {
    queue: String,
    job_set_id: String,
    timeout: String,
    timeout_seconds: u64,
    jobs: Vec<Job>,
}

impl LegacySubmission {
    /// Assemble from the top-level mapping. `queue`, `job_set_id` and
    /// `timeout` are all required.
    pub fn from_document(doc: &Mapping, entries: &[Value], defaults: &Defaults) -> Result<Self> {
        let queue = yaml::required_string(doc, "queue", "document")?;
        let job_set_id = yaml::required_string(doc, "job_set_id", "document")?;
        let raw_timeout = yaml::required_string(doc, "timeout", "document")?;
        let timeout = normalize_timeout(&raw_timeout)?;
        let timeout_seconds = timeout_seconds(&timeout)?;
        if timeout_seconds == 0 {
            return Err(Error::invalid_timeout(raw_timeout));
        }

        let jobs = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let context = format!("jobs[{i}]");
                Job::from_entry(yaml::as_mapping(entry, &context)?, &context, defaults)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            queue,
            job_set_id,
            timeout,
            timeout_seconds,
            jobs,
        })
    }

    /// Queue every job is submitted to
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Job set id
    pub fn job_set_id(&self) -> &str {
        &self.job_set_id
    }

    /// Normalized timeout, always `<n>s`
    pub fn timeout(&self) -> &str {
        &self.timeout
    }

    /// Timeout in seconds
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// Jobs in document order
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }
}

/// Rename user-facing camelCase ingress keys to the field names
/// `IngressConfig` is built from.
pub fn remap_ingress_keys(config: &mut Mapping) {
    for (from, to) in INGRESS_KEY_REMAP {
        if let Some(value) = config.remove(*from) {
            config.insert(Value::String((*to).to_string()), value);
        }
    }
}

fn ingress_configs(value: Option<&Value>, field: &str) -> Result<Vec<IngressConfig>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    yaml::as_sequence(value, field)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = format!("{field}[{i}]");
            let mut config = yaml::as_mapping(item, &item_path)?.clone();
            remap_ingress_keys(&mut config);

            serde_yaml::from_value(Value::Mapping(config)).map_err(|e| {
                debug!(error = %e, field = %item_path, "ingress config did not deserialize");
                Error::type_mismatch(
                    item_path,
                    "an ingress config (type, ports, annotations, tlsEnabled, cert_name, UseClusterIP)",
                )
            })
        })
        .collect()
}

fn service_configs(value: Option<&Value>, field: &str) -> Result<Vec<ServiceConfig>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    yaml::as_sequence(value, field)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = format!("{field}[{i}]");
            yaml::as_mapping(item, &item_path)?;
            serde_yaml::from_value(item.clone()).map_err(|e| {
                debug!(error = %e, field = %item_path, "service config did not deserialize");
                Error::type_mismatch(item_path, "a service config (type, ports)")
            })
        })
        .collect()
}
