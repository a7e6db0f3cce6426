//! Container resource requests and limits.
//!
//! `ResourceOptions` holds one side (cpu, memory, optional accelerator);
//! `ResourcePair` holds both and enforces that a `resources` block names
//! either both `limits` and `requests` or neither.

use serde_yaml::{Mapping, Value};

use crate::config::Defaults;
use crate::yaml;
use crate::{Error, Result};

const RESOURCE_KEYS: &[&str] = &["cpu", "memory", "nvidia_gpu", "amd_gpu"];
const SECTION_KEYS: &[&str] = &["limits", "requests"];

/// Memory quantity suffixes accepted by Kubernetes
const MEMORY_SUFFIXES: &[&str] = &[
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E",
];

/// A GPU request, bound to exactly one vendor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accelerator {
    /// `nvidia.com/gpu`
    Nvidia(u32),
    /// `amd.com/gpu`
    Amd(u32),
}

impl Accelerator {
    /// Extended resource name used by the vendor's device plugin
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::Nvidia(_) => "nvidia.com/gpu",
            Self::Amd(_) => "amd.com/gpu",
        }
    }

    /// Number of devices requested
    pub fn count(&self) -> u32 {
        match self {
            Self::Nvidia(n) | Self::Amd(n) => *n,
        }
    }
}

/// One side of a container's resources
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceOptions {
    cpu: String,
    memory: String,
    accelerator: Option<Accelerator>,
}

impl ResourceOptions {
    /// Start building options for the given cpu and memory quantities
    pub fn builder(cpu: impl Into<String>, memory: impl Into<String>) -> ResourceOptionsBuilder {
        ResourceOptionsBuilder {
            cpu: cpu.into(),
            memory: memory.into(),
            nvidia_gpu: None,
            amd_gpu: None,
        }
    }

    /// CPU quantity (e.g. "2", "500m")
    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    /// Memory quantity (e.g. "4Gi")
    pub fn memory(&self) -> &str {
        &self.memory
    }

    /// Accelerator, if one was requested
    pub fn accelerator(&self) -> Option<Accelerator> {
        self.accelerator
    }

    /// Build options from a `limits`/`requests` mapping, filling cpu and
    /// memory from `defaults` when absent.
    pub fn from_mapping(map: &Mapping, context: &str, defaults: &Defaults) -> Result<Self> {
        yaml::deny_unknown_keys(
            map,
            RESOURCE_KEYS,
            context,
            "one of cpu, memory, nvidia_gpu, amd_gpu",
        )?;

        let cpu = match yaml::get(map, "cpu") {
            None => defaults.cpu.clone(),
            Some(Value::Number(n)) if n.is_u64() => n.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => {
                return Err(Error::type_mismatch(
                    yaml::path(context, "cpu"),
                    "an integer or millicore quantity",
                ))
            }
        };

        let memory = match yaml::get(map, "memory") {
            None => defaults.memory.clone(),
            Some(Value::Number(n)) if n.is_u64() => n.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => {
                return Err(Error::type_mismatch(
                    yaml::path(context, "memory"),
                    "a memory quantity",
                ))
            }
        };

        let mut builder = Self::builder(cpu, memory);
        if let Some(n) = yaml::optional_u32(map, "nvidia_gpu", context)? {
            builder = builder.with_nvidia_gpu(n);
        }
        if let Some(n) = yaml::optional_u32(map, "amd_gpu", context)? {
            builder = builder.with_amd_gpu(n);
        }

        builder.build().map_err(|e| match e {
            Error::TypeMismatch { field, expected } => Error::TypeMismatch {
                field: yaml::path(context, &field),
                expected,
            },
            other => other,
        })
    }
}

/// Builder for [`ResourceOptions`]
#[derive(Clone, Debug)]
pub struct ResourceOptionsBuilder {
    cpu: String,
    memory: String,
    nvidia_gpu: Option<u32>,
    amd_gpu: Option<u32>,
}

impl ResourceOptionsBuilder {
    /// Request NVIDIA GPUs. A count of zero requests none.
    pub fn with_nvidia_gpu(mut self, count: u32) -> Self {
        self.nvidia_gpu = Some(count);
        self
    }

    /// Request AMD GPUs. A count of zero requests none.
    pub fn with_amd_gpu(mut self, count: u32) -> Self {
        self.amd_gpu = Some(count);
        self
    }

    /// Validate quantities and the accelerator choice
    pub fn build(self) -> Result<ResourceOptions> {
        if !is_cpu_quantity(&self.cpu) {
            return Err(Error::type_mismatch("cpu", "an integer or millicore quantity"));
        }
        if !is_memory_quantity(&self.memory) {
            return Err(Error::type_mismatch("memory", "a memory quantity"));
        }

        let nvidia = self.nvidia_gpu.filter(|n| *n > 0);
        let amd = self.amd_gpu.filter(|n| *n > 0);
        let accelerator = match (nvidia, amd) {
            (Some(_), Some(_)) => return Err(Error::ConflictingAccelerators),
            (Some(n), None) => Some(Accelerator::Nvidia(n)),
            (None, Some(n)) => Some(Accelerator::Amd(n)),
            (None, None) => None,
        };

        Ok(ResourceOptions {
            cpu: self.cpu,
            memory: self.memory,
            accelerator,
        })
    }
}

/// Requests and limits for a container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourcePair {
    /// Guaranteed resources
    pub requests: ResourceOptions,
    /// Upper bound
    pub limits: ResourceOptions,
}

impl ResourcePair {
    /// Combine both sides
    pub fn new(requests: ResourceOptions, limits: ResourceOptions) -> Self {
        Self { requests, limits }
    }

    /// Build from the optional `limits` and `requests` sections.
    ///
    /// Returns `Ok(None)` when neither is given.
    pub fn from_sections(
        limits: Option<&Value>,
        requests: Option<&Value>,
        context: &str,
        defaults: &Defaults,
    ) -> Result<Option<Self>> {
        let (limits, requests) = match (limits, requests) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(Error::MissingResourceSection { missing: "requests" }),
            (None, Some(_)) => return Err(Error::MissingResourceSection { missing: "limits" }),
            (Some(l), Some(r)) => (l, r),
        };

        let limits_path = yaml::path(context, "limits");
        let requests_path = yaml::path(context, "requests");
        let limits = ResourceOptions::from_mapping(
            yaml::as_mapping(limits, &limits_path)?,
            &limits_path,
            defaults,
        )?;
        let requests = ResourceOptions::from_mapping(
            yaml::as_mapping(requests, &requests_path)?,
            &requests_path,
            defaults,
        )?;

        Ok(Some(Self::new(requests, limits)))
    }

    /// Build from an entry's whole `resources` value
    pub fn from_yaml(
        resources: Option<&Value>,
        context: &str,
        defaults: &Defaults,
    ) -> Result<Option<Self>> {
        let Some(resources) = resources else {
            return Ok(None);
        };
        let map = yaml::as_mapping(resources, context)?;
        yaml::deny_unknown_keys(map, SECTION_KEYS, context, "limits or requests")?;

        Self::from_sections(
            yaml::get(map, "limits"),
            yaml::get(map, "requests"),
            context,
            defaults,
        )
    }
}

fn is_cpu_quantity(cpu: &str) -> bool {
    let digits = cpu.strip_suffix('m').unwrap_or(cpu);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_memory_quantity(memory: &str) -> bool {
    let number = MEMORY_SUFFIXES
        .iter()
        .find_map(|suffix| memory.strip_suffix(suffix))
        .unwrap_or(memory);
    !number.is_empty()
        && number.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && number.parse::<f64>().is_ok()
}
