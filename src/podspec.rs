//! Kubernetes pod spec types and the submission → pod spec mapping
//!
//! Only the fields this crate sets or inspects are typed. Anything else found
//! in a hand-written (legacy) podspec is carried through `extra` untouched so
//! it still reaches Armada.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::document::Submission;
use crate::resources::ResourceOptions;
use crate::{JUPYTER_PORT, NOTEBOOK_GROUP_ID, NOTEBOOK_USER_ID};

// =============================================================================
// Quantity
// =============================================================================

/// Serialized resource amount ("2", "500m", "4Gi")
///
/// YAML authors often write `cpu: 2`; numbers are accepted and kept in their
/// decimal string form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quantity(pub String);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(u64),
            Float(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
            Raw::Float(f) => Self(f.to_string()),
        })
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Pod and container
// =============================================================================

/// Pod spec as sent inside an Armada job request
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Containers
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Restart policy (Armada jobs run to completion: "Never")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    /// Seconds the pod may run before Kubernetes terminates it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
    /// Node selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PodSpec {
    /// The container that exposes `port`, falling back to the first container
    pub fn container_for_port(&self, port: u32) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| c.ports.iter().any(|p| p.container_port == port))
            .or_else(|| self.containers.first())
    }
}

/// Container spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    #[serde(default)]
    pub image: String,
    /// Command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Container port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port number
    pub container_port: u32,
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Protocol (TCP, UDP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Resource requirements
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,
    /// Limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

/// Resource quantity map
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceQuantity {
    /// CPU cores or millicores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    /// Memory with a binary or decimal suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
    /// NVIDIA device plugin GPU count
    #[serde(
        default,
        rename = "nvidia.com/gpu",
        skip_serializing_if = "Option::is_none"
    )]
    pub nvidia_gpu: Option<Quantity>,
    /// AMD device plugin GPU count
    #[serde(
        default,
        rename = "amd.com/gpu",
        skip_serializing_if = "Option::is_none"
    )]
    pub amd_gpu: Option<Quantity>,
    /// Other extended resources (ephemeral-storage, hugepages, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Quantity>,
}

impl From<&ResourceOptions> for ResourceQuantity {
    fn from(opts: &ResourceOptions) -> Self {
        let mut quantity = Self {
            cpu: Some(opts.cpu().into()),
            memory: Some(opts.memory().into()),
            ..Default::default()
        };

        match opts.accelerator() {
            Some(crate::resources::Accelerator::Nvidia(n)) => {
                quantity.nvidia_gpu = Some(Quantity(n.to_string()))
            }
            Some(crate::resources::Accelerator::Amd(n)) => {
                quantity.amd_gpu = Some(Quantity(n.to_string()))
            }
            None => {}
        }

        quantity
    }
}

/// Container security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// UID to run the container as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    /// GID to run the container as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    /// Require the container to run as a non-root user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// Allow privilege escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    /// Capabilities to add/drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Linux capabilities for containers
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    /// Capabilities to add
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<Vec<String>>,
    /// Capabilities to drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<Vec<String>>,
}

// =============================================================================
// Submission mapping
// =============================================================================

/// Security context every notebook container runs with: the docker-stacks
/// `jovyan` user, no escalation, no capabilities.
pub fn notebook_security_context() -> SecurityContext {
    SecurityContext {
        run_as_user: Some(NOTEBOOK_USER_ID),
        run_as_group: Some(NOTEBOOK_GROUP_ID),
        run_as_non_root: Some(true),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            add: None,
            drop: Some(vec!["ALL".to_string()]),
        }),
        extra: BTreeMap::new(),
    }
}

impl Submission {
    /// Build the pod spec Armada runs for this submission.
    pub fn to_podspec(&self) -> PodSpec {
        let resources = self.resources().map(|pair| ResourceRequirements {
            requests: Some(ResourceQuantity::from(&pair.requests)),
            limits: Some(ResourceQuantity::from(&pair.limits)),
        });

        let container = Container {
            name: self.name().to_string(),
            image: self.image().to_string(),
            ports: vec![ContainerPort {
                container_port: JUPYTER_PORT,
                name: Some("notebook".to_string()),
                protocol: Some("TCP".to_string()),
            }],
            resources,
            security_context: Some(notebook_security_context()),
            ..Default::default()
        };

        PodSpec {
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            active_deadline_seconds: Some(self.timeout_seconds()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ResourceOptions, ResourcePair};

    fn submission(resources: Option<ResourcePair>) -> Submission {
        let mut builder = Submission::builder("nb", "jupyter/minimal-notebook:latest")
            .with_timeout("10m");
        if let Some(pair) = resources {
            builder = builder.with_resources(pair);
        }
        builder.build(&crate::config::Defaults::default()).unwrap()
    }

    #[test]
    fn podspec_without_resources() {
        let spec = submission(None).to_podspec();

        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.active_deadline_seconds, Some(600));
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

        let container = &spec.containers[0];
        assert_eq!(container.name, "nb");
        assert_eq!(container.image, "jupyter/minimal-notebook:latest");
        assert!(container.resources.is_none());
        assert_eq!(container.ports[0].container_port, JUPYTER_PORT);

        let security = container.security_context.as_ref().unwrap();
        assert_eq!(security.run_as_user, Some(NOTEBOOK_USER_ID));
        assert_eq!(security.run_as_non_root, Some(true));
        assert_eq!(security.allow_privilege_escalation, Some(false));
    }

    #[test]
    fn accelerator_key_only_when_requested() {
        let requests = ResourceOptions::builder("2", "4Gi").build().unwrap();
        let limits = ResourceOptions::builder("4", "8Gi")
            .with_nvidia_gpu(1)
            .build()
            .unwrap();
        let spec = submission(Some(ResourcePair::new(requests, limits))).to_podspec();

        let json = serde_json::to_value(&spec).unwrap();
        let resources = &json["containers"][0]["resources"];
        assert_eq!(resources["limits"]["cpu"], "4");
        assert_eq!(resources["limits"]["memory"], "8Gi");
        assert_eq!(resources["limits"]["nvidia.com/gpu"], "1");
        assert!(resources["requests"].get("nvidia.com/gpu").is_none());
        assert!(resources["limits"].get("amd.com/gpu").is_none());
        assert_eq!(json["activeDeadlineSeconds"], 600);
    }

    #[test]
    fn quantity_accepts_numbers() {
        let q: ResourceQuantity =
            serde_yaml::from_str("cpu: 2\nmemory: 1Gi\nephemeral-storage: 10Gi").unwrap();
        assert_eq!(q.cpu, Some(Quantity::from("2")));
        assert_eq!(q.extra["ephemeral-storage"], Quantity::from("10Gi"));
    }

    #[test]
    fn unknown_fields_pass_through() {
        let yaml = r#"
containers:
  - name: jupyterlab
    image: jupyter/base-notebook
    env:
      - name: JUPYTER_TOKEN
        value: secret
    ports:
      - containerPort: 8888
tolerations:
  - key: gpu
    operator: Exists
"#;
        let spec: PodSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.extra.contains_key("tolerations"));
        assert!(spec.containers[0].extra.contains_key("env"));

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["tolerations"][0]["key"], "gpu");
        assert_eq!(json["containers"][0]["env"][0]["name"], "JUPYTER_TOKEN");
    }

    #[test]
    fn container_for_port_prefers_exposing_container() {
        let spec = PodSpec {
            containers: vec![
                Container {
                    name: "sidecar".to_string(),
                    ..Default::default()
                },
                Container {
                    name: "jupyterlab".to_string(),
                    ports: vec![ContainerPort {
                        container_port: 8888,
                        name: None,
                        protocol: None,
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        assert_eq!(spec.container_for_port(8888).unwrap().name, "jupyterlab");
        assert_eq!(spec.container_for_port(9999).unwrap().name, "sidecar");
    }
}
