//! Swarm service wire types
//!
//! Only the fields the submission flow reads or writes are typed; everything
//! else in a spec is carried through untouched in the `extra` maps so that a
//! spec loaded from a file round-trips to the daemon unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;


/// User-modifiable configuration for a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSpec {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_template: TaskSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServiceMode>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Scheduling mode of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceMode {
    Replicated {
        #[serde(rename = "Replicas", default, skip_serializing_if = "Option::is_none")]
        replicas: Option<u64>,
    },
    Global {},
    ReplicatedJob {
        #[serde(
            rename = "MaxConcurrent",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        max_concurrent: Option<u64>,
        #[serde(
            rename = "TotalCompletions",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        total_completions: Option<u64>,
    },
    GlobalJob {},
}

/// Template for the tasks of a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_spec: Option<ContainerSpec>,

    /// Plugin tasks are opaque to the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_spec: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub runtime: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub image: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub command: Vec<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Constraints on which nodes may run a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub constraints: Vec<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub preferences: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u64>,

    /// Platforms the service can run on, in addition to any constraints
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub platforms: Vec<Platform>,
}

/// An architecture/OS pair a task may be scheduled on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(rename = "Architecture", default, deserialize_with = "null_as_default")]
    pub architecture: String,
    #[serde(rename = "OS", default, deserialize_with = "null_as_default")]
    pub os: String,
}

/// Client-side options for creating a service
#[derive(Debug, Clone, Default)]
pub struct ServiceCreateOptions {
    /// Base64url-encoded registry credentials, forwarded as X-Registry-Auth
    pub encoded_registry_auth: Option<String>,

    /// Resolve the image digest and platforms on the registry before submitting
    pub query_registry: bool,
}

/// Response from the daemon after creating a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceCreateResponse {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(
        rename = "Warnings",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub warnings: Vec<String>,
}

/// The daemon sends `null` for empty lists
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
