//! Current (schema 2) submissions: one notebook per entry.
//!
//! ```yaml
//! job_set_id: research-notebooks   # optional
//! queue: research                  # optional, per-entry armada_queue wins
//! jobs:
//!   - name: nb
//!     image: jupyter/minimal-notebook:latest
//!     armada_queue: gpu
//!     armada_priority: 2
//!     timeout: 2h
//!     resources:
//!       limits: {cpu: 4, memory: 8Gi, nvidia_gpu: 1}
//!       requests: {cpu: 2, memory: 4Gi}
//! ```

use std::collections::BTreeMap;

use serde_yaml::Mapping;
use tracing::debug;

use crate::armada::{IngressConfig, JobSubmitRequestItem};
use crate::config::Defaults;
use crate::resources::ResourcePair;
use crate::timeout::{normalize_timeout, timeout_seconds};
use crate::yaml;
use crate::{Error, Result, JUPYTER_PORT};

const ENTRY_KEYS: &[&str] = &[
    "name",
    "image",
    "armada_queue",
    "armada_priority",
    "timeout",
    "resources",
];

/// A single notebook job
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    name: String,
    image: String,
    queue: String,
    priority: f64,
    timeout: String,
    timeout_seconds: u64,
    resources: Option<ResourcePair>,
}

impl Submission {
    /// Start building a submission
    pub fn builder(name: impl Into<String>, image: impl Into<String>) -> SubmissionBuilder {
        SubmissionBuilder {
            name: name.into(),
            image: image.into(),
            queue: None,
            priority: None,
            timeout: None,
            resources: None,
        }
    }

    /// Assemble one `jobs[i]` entry
    pub fn from_entry(
        entry: &Mapping,
        context: &str,
        document_queue: Option<&str>,
        defaults: &Defaults,
    ) -> Result<Self> {
        let name = yaml::required_string(entry, "name", context)?;
        let image = yaml::required_string(entry, "image", context)?;
        yaml::deny_unknown_keys(entry, ENTRY_KEYS, context, "a known submission key")?;

        let mut builder = Self::builder(name, image);

        let queue = yaml::optional_string(entry, "armada_queue", context)?
            .or_else(|| document_queue.map(str::to_string));
        if let Some(queue) = queue {
            builder = builder.with_queue(queue);
        }
        if let Some(priority) = yaml::optional_f64(entry, "armada_priority", context)? {
            builder = builder.with_priority(priority);
        }
        if let Some(timeout) = yaml::optional_string(entry, "timeout", context)? {
            builder = builder.with_timeout(timeout);
        }

        let resources_path = yaml::path(context, "resources");
        if let Some(pair) =
            ResourcePair::from_yaml(yaml::get(entry, "resources"), &resources_path, defaults)?
        {
            builder = builder.with_resources(pair);
        }

        builder.build(defaults)
    }

    /// Job name, also the container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container image
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Armada queue
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Armada priority
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Normalized timeout, always `<n>s`
    pub fn timeout(&self) -> &str {
        &self.timeout
    }

    /// Timeout in seconds
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// Container resources, if any were given
    pub fn resources(&self) -> Option<&ResourcePair> {
        self.resources.as_ref()
    }

    /// Build the Armada request item for this submission
    pub fn to_request_item(&self, defaults: &Defaults) -> JobSubmitRequestItem {
        let labels = BTreeMap::from([
            (
                "app.kubernetes.io/managed-by".to_string(),
                "armada-jupyter".to_string(),
            ),
            ("app.kubernetes.io/name".to_string(), self.name.clone()),
        ]);

        JobSubmitRequestItem::new(defaults.namespace.clone(), self.priority, self.to_podspec())
            .with_labels(labels)
            .with_ingress(vec![IngressConfig::exposing(vec![JUPYTER_PORT])])
    }
}

/// Builder for [`Submission`]
#[derive(Clone, Debug)]
pub struct SubmissionBuilder {
    name: String,
    image: String,
    queue: Option<String>,
    priority: Option<f64>,
    timeout: Option<String>,
    resources: Option<ResourcePair>,
}

impl SubmissionBuilder {
    /// Target queue
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Job priority
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Timeout in any accepted form ("90s", "10m", "2h")
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Container resources
    pub fn with_resources(mut self, resources: ResourcePair) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Apply defaults and normalize the timeout
    pub fn build(self, defaults: &Defaults) -> Result<Submission> {
        let raw_timeout = self.timeout.unwrap_or_else(|| defaults.timeout.clone());
        let timeout = normalize_timeout(&raw_timeout)?;
        let timeout_seconds = timeout_seconds(&timeout)?;
        if timeout_seconds == 0 {
            return Err(Error::invalid_timeout(raw_timeout));
        }

        let submission = Submission {
            name: self.name,
            image: self.image,
            queue: self.queue.unwrap_or_else(|| defaults.queue.clone()),
            priority: self.priority.unwrap_or(defaults.priority),
            timeout,
            timeout_seconds,
            resources: self.resources,
        };

        debug!(
            name = %submission.name,
            queue = %submission.queue,
            timeout = %submission.timeout,
            "assembled submission"
        );
        Ok(submission)
    }
}

/// All submissions of a current-schema document, in document order
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionSet {
    /// Job set the submissions are grouped under
    pub job_set_id: String,
    /// Submissions
    pub submissions: Vec<Submission>,
}
