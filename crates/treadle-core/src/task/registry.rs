//! Task registry -- the process-level resolver from symbolic task names to
//! task builders.
//!
//! Manifests and state-file records refer to tasks by name only (a task
//! implementation cannot be serialized). The registry is populated at
//! process start with the set of implementations the deployment supports;
//! a name it does not know makes the referring record unusable.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{Map, Value};

use super::{
    CreateDirectory, CreateFile, DeleteDirectory, DeleteFile, FetchToTextFile, ReadFromFile, Task,
    WriteToFile,
};

/// Constructs a fresh task instance from a job's positional and named
/// arguments. Pure with respect to the registry; invoked once per attempt.
pub type TaskBuilder = fn(&[Value], &Map<String, Value>) -> Result<Box<dyn Task>>;

/// A collection of registered [`TaskBuilder`]s, keyed by symbolic name.
///
/// # Example
///
/// ```ignore
/// let mut registry = TaskRegistry::new();
/// registry.register("create_file", fs_ops::build_create_file);
/// let builder = registry.get("create_file").unwrap();
/// ```
#[derive(Default)]
pub struct TaskRegistry {
    builders: HashMap<String, TaskBuilder>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in task set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("create_directory", CreateDirectory::build);
        registry.register("delete_directory", DeleteDirectory::build);
        registry.register("create_file", CreateFile::build);
        registry.register("delete_file", DeleteFile::build);
        registry.register("write_to_file", WriteToFile::build);
        registry.register("read_from_file", ReadFromFile::build);
        registry.register("fetch_to_text_file", FetchToTextFile::build);
        registry
    }

    /// Register a builder under `name`.
    ///
    /// If a builder with the same name is already registered, it is
    /// replaced and the old one is returned.
    pub fn register(&mut self, name: &str, builder: TaskBuilder) -> Option<TaskBuilder> {
        self.builders.insert(name.to_string(), builder)
    }

    /// Look up a builder by name.
    pub fn get(&self, name: &str) -> Option<TaskBuilder> {
        self.builders.get(name).copied()
    }

    /// Return `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// List the names of all registered builders.
    ///
    /// The order is not guaranteed (HashMap iteration order).
    pub fn list(&self) -> Vec<&str> {
        self.builders.keys().map(|s| s.as_str()).collect()
    }

    /// Return the number of registered builders.
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Return `true` if no builders are registered.
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("builders", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}
