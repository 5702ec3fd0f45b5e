//! YAML format types for job manifest files.
//!
//! These types map directly to the on-disk manifest format and are
//! deserialized via `serde` + the `serde_yaml` crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level structure of a manifest file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Jobs to submit, in submission order.
    #[serde(default)]
    pub jobs: Vec<ManifestJob>,
}

/// A single entry in the manifest's `jobs` sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestJob {
    /// File-local label, referenced by other entries' `dependencies`.
    pub id: String,
    /// Task name resolved through the task registry.
    pub function: String,
    /// Positional task arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Named task arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Seconds relative to load time before the job may run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<f64>,
    /// Wall-clock budget in seconds; `-1` (the default) disables it.
    #[serde(default = "default_max_working_time")]
    pub max_working_time: f64,
    /// Total allowed attempts after an exception.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    /// Ids of entries that must complete before this one may step.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_max_working_time() -> f64 {
    -1.0
}

fn default_max_tries() -> u32 {
    1
}
