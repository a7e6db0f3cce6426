//! Submission documents
//!
//! A submission file is one of two layouts, selected by `schema_version`:
//! - `1` (legacy): top-level queue/job_set_id/timeout, each job a full pod spec
//! - `2` (current): each entry names an image and optional resources
//!
//! Without `schema_version` the layout is inferred: any entry carrying a
//! `podspec` key makes the document legacy. The two layouts share no fields
//! beyond `jobs`, and neither is converted into the other.

mod current;
mod legacy;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::armada::JobSubmitRequest;
use crate::config::Defaults;
use crate::yaml;
use crate::{Error, Result};

pub use current::{Submission, SubmissionBuilder, SubmissionSet};
pub use legacy::{remap_ingress_keys, Job, LegacySubmission};

/// Document layout discriminator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Multi-job documents with hand-written pod specs
    Legacy,
    /// Image-based notebook submissions
    Current,
}

impl SchemaVersion {
    /// Numeric value written as `schema_version`
    pub fn as_u64(&self) -> u64 {
        match self {
            Self::Legacy => 1,
            Self::Current => 2,
        }
    }

    fn from_u64(version: u64) -> Result<Self> {
        match version {
            1 => Ok(Self::Legacy),
            2 => Ok(Self::Current),
            other => Err(Error::UnsupportedSchemaVersion(other)),
        }
    }
}

/// A fully translated submission file
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionDocument {
    /// Schema 2
    Current(SubmissionSet),
    /// Schema 1
    Legacy(LegacySubmission),
}

impl SubmissionDocument {
    /// Read and translate a submission file
    pub fn load(path: &Path, defaults: &Defaults) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content, defaults)
    }

    /// Translate YAML text
    pub fn from_yaml_str(content: &str, defaults: &Defaults) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(&value, defaults)
    }

    /// Translate an already parsed document
    pub fn from_value(value: &Value, defaults: &Defaults) -> Result<Self> {
        let doc = yaml::as_mapping(value, "document")?;
        let (entries_key, entries) = find_entries(doc)?;
        let version = schema_version(doc, entries)?;

        let document = match version {
            SchemaVersion::Legacy => {
                if entries_key != "jobs" {
                    return Err(Error::missing_key("jobs", "document"));
                }
                Self::Legacy(LegacySubmission::from_document(doc, entries, defaults)?)
            }
            SchemaVersion::Current => {
                Self::Current(current_set(doc, entries_key, entries, defaults)?)
            }
        };

        info!(
            schema_version = version.as_u64(),
            jobs = document.job_count(),
            "translated submission document"
        );
        Ok(document)
    }

    /// Layout this document was read as
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            Self::Current(_) => SchemaVersion::Current,
            Self::Legacy(_) => SchemaVersion::Legacy,
        }
    }

    /// Number of jobs the document submits
    pub fn job_count(&self) -> usize {
        match self {
            Self::Current(set) => set.submissions.len(),
            Self::Legacy(sub) => sub.jobs().len(),
        }
    }

    /// How long to wait for the submitted jobs to start: the longest job
    /// timeout for current documents, the document timeout for legacy ones.
    pub fn watch_timeout(&self) -> Duration {
        let seconds = match self {
            Self::Current(set) => set
                .submissions
                .iter()
                .map(Submission::timeout_seconds)
                .max()
                .unwrap_or_default(),
            Self::Legacy(sub) => sub.timeout_seconds(),
        };
        Duration::from_secs(seconds)
    }

    /// Armada requests, one per distinct queue in first-seen order
    pub fn to_requests(&self, defaults: &Defaults) -> Vec<JobSubmitRequest> {
        match self {
            Self::Legacy(sub) => vec![JobSubmitRequest {
                queue: sub.queue().to_string(),
                job_set_id: sub.job_set_id().to_string(),
                job_request_items: sub.jobs().iter().map(Job::to_request_item).collect(),
            }],
            Self::Current(set) => {
                let mut order: Vec<&str> = Vec::new();
                let mut by_queue: BTreeMap<&str, Vec<&Submission>> = BTreeMap::new();
                for submission in &set.submissions {
                    let queue = submission.queue();
                    if !by_queue.contains_key(queue) {
                        order.push(queue);
                    }
                    by_queue.entry(queue).or_default().push(submission);
                }

                order
                    .into_iter()
                    .map(|queue| JobSubmitRequest {
                        queue: queue.to_string(),
                        job_set_id: set.job_set_id.clone(),
                        job_request_items: by_queue
                            .remove(queue)
                            .unwrap_or_default()
                            .into_iter()
                            .map(|s| s.to_request_item(defaults))
                            .collect(),
                    })
                    .collect()
            }
        }
    }
}

/// Find the entry list: `submissions` wins over `jobs`
fn find_entries(doc: &Mapping) -> Result<(&'static str, &[Value])> {
    let (key, value) = ["submissions", "jobs"]
        .into_iter()
        .find_map(|key| yaml::get(doc, key).map(|v| (key, v)))
        .ok_or_else(|| Error::missing_key("jobs", "document"))?;

    let entries = yaml::as_sequence(value, key)?;
    if entries.is_empty() {
        return Err(Error::missing_key(key, "document"));
    }
    Ok((key, entries.as_slice()))
}

fn schema_version(doc: &Mapping, entries: &[Value]) -> Result<SchemaVersion> {
    match yaml::get(doc, "schema_version") {
        Some(Value::Number(n)) => {
            let version = n
                .as_u64()
                .ok_or_else(|| Error::type_mismatch("schema_version", "1 or 2"))?;
            SchemaVersion::from_u64(version)
        }
        Some(_) => Err(Error::type_mismatch("schema_version", "1 or 2")),
        None => {
            let legacy = entries
                .iter()
                .filter_map(Value::as_mapping)
                .any(|entry| entry.contains_key("podspec"));
            Ok(if legacy {
                SchemaVersion::Legacy
            } else {
                SchemaVersion::Current
            })
        }
    }
}

fn current_set(
    doc: &Mapping,
    entries_key: &str,
    entries: &[Value],
    defaults: &Defaults,
) -> Result<SubmissionSet> {
    let job_set_id = yaml::optional_string(doc, "job_set_id", "document")?
        .unwrap_or_else(|| defaults.job_set_id.clone());
    let document_queue = yaml::optional_string(doc, "queue", "document")?;

    let submissions = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let context = format!("{entries_key}[{i}]");
            Submission::from_entry(
                yaml::as_mapping(entry, &context)?,
                &context,
                document_queue.as_deref(),
                defaults,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SubmissionSet {
        job_set_id,
        submissions,
    })
}
