//! Response bodies of the scheduler's JSON API.

use crate::{deserialize_ordered_map, DecodingError, JobId, TaskId};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveStatus {
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActiveStatusWire {
    Object { active: bool },
    Bare(bool),
}

impl<'de> Deserialize<'de> for ActiveStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let active = match ActiveStatusWire::deserialize(deserializer)? {
            ActiveStatusWire::Object { active } => active,
            ActiveStatusWire::Bare(active) => active,
        };
        Ok(ActiveStatus { active })
    }
}

pub fn parse_active_status(raw: impl AsRef<[u8]>) -> Result<ActiveStatus, DecodingError> {
    Ok(serde_json::from_slice(raw.as_ref())?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<JobId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(rename = "job")]
    pub name: JobId,
    #[serde(default)]
    pub tasks: Vec<TaskId>,
    #[serde(default)]
    pub schedule: String,
}

/// Task graph as an adjacency list, in the order the server listed the nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDag {
    edges: Vec<(TaskId, Vec<TaskId>)>,
}

impl JobDag {
    pub fn new(edges: Vec<(TaskId, Vec<TaskId>)>) -> Self {
        Self { edges }
    }

    pub fn downstream(&self, task: &TaskId) -> &[TaskId] {
        self.edges
            .iter()
            .find(|(node, _)| node == task)
            .map(|(_, next)| next.as_slice())
            .unwrap_or(&[])
    }

    /// Every node, listed keys first and then downstream-only nodes as first seen.
    pub fn nodes(&self) -> Vec<TaskId> {
        let mut nodes: Vec<TaskId> = self.edges.iter().map(|(node, _)| node.clone()).collect();
        for child in self.edges.iter().flat_map(|(_, next)| next) {
            if !nodes.contains(child) {
                nodes.push(child.clone());
            }
        }
        nodes
    }
}

impl<'de> Deserialize<'de> for JobDag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let edges = deserialize_ordered_map::<D, TaskId, Option<Vec<TaskId>>>(deserializer)?;
        Ok(JobDag::new(
            edges
                .into_iter()
                .map(|(node, next)| (node, next.unwrap_or_default()))
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub health: String,
}

impl Health {
    pub fn is_ok(&self) -> bool {
        self.health.eq_ignore_ascii_case("ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_status_accepts_object_and_bare_bool() {
        assert_eq!(
            parse_active_status(r#"{"active": true}"#),
            Ok(ActiveStatus { active: true })
        );
        assert_eq!(
            parse_active_status("false"),
            Ok(ActiveStatus { active: false })
        );
        assert!(parse_active_status(r#"{"enabled": true}"#).is_err());
        assert!(parse_active_status("\"Not found\"").is_err());
    }

    #[test]
    fn job_detail_keeps_task_order() {
        let detail: JobDetail = serde_json::from_str(
            r#"{"job":"ComplexAnalytics","tasks":["sleepOne","addOneOne","sleepTwo"],"schedule":"* * * * *"}"#,
        )
        .expect("parse detail");
        assert_eq!(detail.name, JobId::from("ComplexAnalytics"));
        let tasks: Vec<&str> = detail.tasks.iter().map(TaskId::as_str).collect();
        assert_eq!(tasks, vec!["sleepOne", "addOneOne", "sleepTwo"]);
    }

    #[test]
    fn dag_lists_nodes_and_edges_in_wire_order() {
        let dag: JobDag = serde_json::from_str(
            r#"{"sleepOne":["addOneOne"],"addOneOne":["sleepTwo","addThreeFour"],"sleepTwo":null}"#,
        )
        .expect("parse dag");
        let nodes: Vec<String> = dag.nodes().into_iter().map(|t| t.to_string()).collect();
        assert_eq!(
            nodes,
            vec!["sleepOne", "addOneOne", "sleepTwo", "addThreeFour"]
        );
        assert_eq!(dag.downstream(&TaskId::from("addOneOne")).len(), 2);
        assert!(dag.downstream(&TaskId::from("missing")).is_empty());
    }

    #[test]
    fn health_is_case_insensitive() {
        let health: Health = serde_json::from_str(r#"{"health":"OK"}"#).expect("parse");
        assert!(health.is_ok());
    }
}
