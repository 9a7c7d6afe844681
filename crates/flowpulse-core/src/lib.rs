pub mod palette;
pub mod rest;
pub mod sse;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodingError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unknown execution state: {0}")]
    UnknownState(String),
}

impl From<serde_json::Error> for DecodingError {
    fn from(err: serde_json::Error) -> Self {
        DecodingError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Running,
    UpForRetry,
    Successful,
    Skipped,
    Failed,
    NotStarted,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 6] = [
        ExecutionState::Running,
        ExecutionState::UpForRetry,
        ExecutionState::Successful,
        ExecutionState::Skipped,
        ExecutionState::Failed,
        ExecutionState::NotStarted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Running => "running",
            ExecutionState::UpForRetry => "upforretry",
            ExecutionState::Successful => "successful",
            ExecutionState::Skipped => "skipped",
            ExecutionState::Failed => "failed",
            ExecutionState::NotStarted => "notstarted",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = DecodingError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ExecutionState::ALL
            .into_iter()
            .find(|state| state.as_str() == input)
            .ok_or_else(|| DecodingError::UnknownState(input.to_string()))
    }
}

macro_rules! name_key {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_key!(JobId);
name_key!(TaskId);

/// Per-task states of one run, kept in the order the server emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    entries: Vec<(TaskId, ExecutionState)>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a task, keeping the position of its first insertion.
    pub fn insert(&mut self, task: TaskId, state: ExecutionState) {
        match self.entries.iter_mut().find(|(name, _)| *name == task) {
            Some(entry) => entry.1 = state,
            None => self.entries.push((task, state)),
        }
    }

    pub fn get(&self, task: &TaskId) -> Option<ExecutionState> {
        self.entries
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, state)| *state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, ExecutionState)> {
        self.entries.iter().map(|(name, state)| (name, *state))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(TaskId, ExecutionState)> for TaskState {
    fn from_iter<I: IntoIterator<Item = (TaskId, ExecutionState)>>(iter: I) -> Self {
        let mut state = TaskState::new();
        for (task, value) in iter {
            state.insert(task, value);
        }
        state
    }
}

impl Serialize for TaskState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (task, state) in &self.entries {
            map.serialize_entry(task, state)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = deserialize_ordered_map::<D, TaskId, ExecutionState>(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// Reads a JSON object as a list of entries in document order.
pub(crate) fn deserialize_ordered_map<'de, D, K, V>(
    deserializer: D,
) -> Result<Vec<(K, V)>, D::Error>
where
    D: Deserializer<'de>,
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    struct OrderedMapVisitor<K, V>(PhantomData<(K, V)>);

    impl<'de, K, V> Visitor<'de> for OrderedMapVisitor<K, V>
    where
        K: Deserialize<'de>,
        V: Deserialize<'de>,
    {
        type Value = Vec<(K, V)>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<K, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStates {
    #[serde(default)]
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub job: ExecutionState,
    #[serde(default)]
    pub tasks: TaskStates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    #[serde(default, rename = "id", alias = "name", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub submitted: String,
    pub state: RunState,
}

impl JobRun {
    pub fn job_state(&self) -> ExecutionState {
        self.state.job
    }

    pub fn tasks(&self) -> &TaskState {
        &self.state.tasks.state
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.submitted.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Full replacement of everything the server knows about one job's runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshotEvent {
    pub job_name: JobId,
    pub job_runs: Vec<JobRun>,
}

impl JobSnapshotEvent {
    pub fn latest_run(&self) -> Option<&JobRun> {
        latest_run(&self.job_runs)
    }
}

/// Runs are emitted oldest-first, so the most recent run is the last entry.
pub fn latest_run(runs: &[JobRun]) -> Option<&JobRun> {
    runs.last()
}

pub fn parse_snapshot(raw: impl AsRef<[u8]>) -> Result<JobSnapshotEvent, DecodingError> {
    Ok(serde_json::from_slice(raw.as_ref())?)
}
