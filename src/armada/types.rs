//! Armada API serialization types
//!
//! Typed representation of the Armada submit and event APIs as exposed by the
//! REST gateway. Envelope fields use the protobuf field names; the embedded
//! pod spec keeps Kubernetes camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::podspec::PodSpec;

// =============================================================================
// Submit
// =============================================================================

/// Batch of jobs for one queue and job set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobSubmitRequest {
    /// Queue the jobs are charged to
    pub queue: String,
    /// Job set grouping the jobs for event watching
    pub job_set_id: String,
    /// Jobs to create
    pub job_request_items: Vec<JobSubmitRequestItem>,
}

/// One job within a submit request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobSubmitRequestItem {
    /// Scheduling priority; lower runs first
    pub priority: f64,
    /// Kubernetes namespace the pod is created in
    pub namespace: String,
    /// Idempotency key; Armada deduplicates resubmissions carrying the same id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Pod labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Pod to run
    pub pod_spec: PodSpec,
    /// Ingresses Armada creates for the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressConfig>,
    /// Services Armada creates for the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceConfig>,
}

impl JobSubmitRequestItem {
    /// Create an item with a fresh client id
    pub fn new(namespace: impl Into<String>, priority: f64, pod_spec: PodSpec) -> Self {
        Self {
            priority,
            namespace: namespace.into(),
            client_id: Some(uuid::Uuid::new_v4().to_string()),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            pod_spec,
            ingress: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Replace labels
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Replace annotations
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Replace ingress configs
    pub fn with_ingress(mut self, ingress: Vec<IngressConfig>) -> Self {
        self.ingress = ingress;
        self
    }

    /// Replace service configs
    pub fn with_services(mut self, services: Vec<ServiceConfig>) -> Self {
        self.services = services;
        self
    }
}

/// Ingress kind. Armada only knows plain Kubernetes ingress.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum IngressType {
    /// Kubernetes `Ingress` object
    #[default]
    Ingress,
}

/// Network exposure rule for a job's pod
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// Ingress kind
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<IngressType>,
    /// Container ports to expose
    #[serde(default)]
    pub ports: Vec<u32>,
    /// Annotations for the ingress object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Terminate TLS at the ingress
    #[serde(default)]
    pub tls_enabled: bool,
    /// Secret holding the TLS certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_name: Option<String>,
    /// Route to a ClusterIP service instead of the pod
    #[serde(rename = "use_clusterIP", default)]
    pub use_cluster_ip: bool,
}

impl IngressConfig {
    /// Plain http ingress for the given container ports
    pub fn exposing(ports: Vec<u32>) -> Self {
        Self {
            type_: Some(IngressType::Ingress),
            ports,
            ..Default::default()
        }
    }
}

/// Kubernetes service kind created alongside the pod
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceType {
    /// Service reachable on every node's port
    NodePort,
    /// Service without a cluster IP
    Headless,
}

/// Service exposure rule for a job's pod
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service kind
    #[serde(rename = "type")]
    pub type_: ServiceType,
    /// Container ports to expose
    #[serde(default)]
    pub ports: Vec<u32>,
}

/// Result of a submit call
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSubmitResponse {
    /// One entry per submitted job
    #[serde(default)]
    pub job_response_items: Vec<JobSubmitResponseItem>,
}

/// Per-job result of a submit call, in request order
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSubmitResponseItem {
    /// Id Armada assigned to the job
    #[serde(default)]
    pub job_id: String,
    /// Set when Armada rejected this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// =============================================================================
// Events
// =============================================================================

/// One message from a job set's event stream
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EventStreamMessage {
    /// Stream position; pass back as `from_message_id` to resume
    pub id: String,
    /// Event payload
    pub message: EventMessage,
}

/// Event payload. Exactly one field is set; kinds not listed are ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EventMessage {
    /// Accepted by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<JobEvent>,
    /// Waiting in its queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<JobEvent>,
    /// Assigned to an executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leased: Option<JobEvent>,
    /// Pod created, not yet running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<JobEvent>,
    /// Pod running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<JobEvent>,
    /// Pod exited successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<JobEvent>,
    /// Pod failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<JobEvent>,
    /// Cancelled by a user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<JobEvent>,
    /// Evicted for a higher priority job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preempted: Option<JobEvent>,
}

/// Common event body
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    /// Job the event is about
    pub job_id: String,
    /// Job set of the job
    #[serde(default)]
    pub job_set_id: String,
    /// Queue of the job
    #[serde(default)]
    pub queue: String,
    /// Failure reason; only set on `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Job state as reported by an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Accepted by the server
    Submitted,
    /// Waiting in its queue
    Queued,
    /// Assigned to an executor
    Leased,
    /// Pod created, not yet running
    Pending,
    /// Pod running
    Running,
    /// Exited successfully
    Succeeded,
    /// Failed
    Failed,
    /// Cancelled by a user
    Cancelled,
    /// Evicted for a higher priority job
    Preempted,
}

impl JobState {
    /// Returns true if the job will not run (again)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Preempted
        )
    }
}

impl EventMessage {
    /// The state this event moves its job to, with the event body
    pub fn state(&self) -> Option<(JobState, &JobEvent)> {
        [
            (JobState::Submitted, &self.submitted),
            (JobState::Queued, &self.queued),
            (JobState::Leased, &self.leased),
            (JobState::Pending, &self.pending),
            (JobState::Running, &self.running),
            (JobState::Succeeded, &self.succeeded),
            (JobState::Failed, &self.failed),
            (JobState::Cancelled, &self.cancelled),
            (JobState::Preempted, &self.preempted),
        ]
        .into_iter()
        .find_map(|(state, event)| event.as_ref().map(|e| (state, e)))
    }

    /// Build a message for `state`
    pub fn for_state(state: JobState, event: JobEvent) -> Self {
        let mut message = Self::default();
        let slot = match state {
            JobState::Submitted => &mut message.submitted,
            JobState::Queued => &mut message.queued,
            JobState::Leased => &mut message.leased,
            JobState::Pending => &mut message.pending,
            JobState::Running => &mut message.running,
            JobState::Succeeded => &mut message.succeeded,
            JobState::Failed => &mut message.failed,
            JobState::Cancelled => &mut message.cancelled,
            JobState::Preempted => &mut message.preempted,
        };
        *slot = Some(event);
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_wire_names() {
        let config = IngressConfig {
            tls_enabled: true,
            use_cluster_ip: true,
            ..IngressConfig::exposing(vec![8888])
        };
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["type"], "Ingress");
        assert_eq!(json["tls_enabled"], true);
        assert_eq!(json["use_clusterIP"], true);
        assert_eq!(json["ports"][0], 8888);
        assert!(json.get("cert_name").is_none());
    }

    #[test]
    fn request_item_envelope_uses_proto_names() {
        let item = JobSubmitRequestItem::new("jupyter", 1.0, PodSpec::default());
        let json = serde_json::to_value(&item).unwrap();

        assert!(json.get("pod_spec").is_some());
        assert!(json.get("client_id").is_some());
        assert!(json.get("ingress").is_none());
    }

    #[test]
    fn client_ids_are_unique() {
        let a = JobSubmitRequestItem::new("ns", 1.0, PodSpec::default());
        let b = JobSubmitRequestItem::new("ns", 1.0, PodSpec::default());
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn event_state_picks_set_field() {
        let json = r#"{"id": "1-0", "message": {"failed": {"job_id": "j1", "reason": "OOMKilled"}}}"#;
        let msg: EventStreamMessage = serde_json::from_str(json).unwrap();

        let (state, event) = msg.message.state().unwrap();
        assert_eq!(state, JobState::Failed);
        assert!(state.is_terminal());
        assert_eq!(event.job_id, "j1");
        assert_eq!(event.reason.as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn unlisted_event_kind_has_no_state() {
        let json = r#"{"id": "1-0", "message": {"utilisation": {"job_id": "j1"}}}"#;
        let msg: EventStreamMessage = serde_json::from_str(json).unwrap();
        assert!(msg.message.state().is_none());
    }

    #[test]
    fn for_state_roundtrips_through_state() {
        let event = JobEvent {
            job_id: "j".to_string(),
            ..Default::default()
        };
        let msg = EventMessage::for_state(JobState::Running, event);
        assert_eq!(msg.state().unwrap().0, JobState::Running);
    }
}
