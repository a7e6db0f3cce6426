//! Armada submit/event API: wire types and client

mod client;
mod types;

#[cfg(test)]
pub use client::MockArmadaClient;
pub use client::{ArmadaClient, RestArmadaClient};
pub use types::{
    EventMessage, EventStreamMessage, IngressConfig, IngressType, JobEvent, JobState,
    JobSubmitRequest, JobSubmitRequestItem, JobSubmitResponse, JobSubmitResponseItem,
    ServiceConfig, ServiceType,
};
