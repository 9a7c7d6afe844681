//! Mount registry for everything the board draws.
//!
//! Renderers never resolve surfaces by string; they receive a
//! [`SurfaceRegistry`] and ask it for a typed key. A surface that has not
//! been mounted yet resolves to `None`.

use flowpulse_core::{palette::DisplayColor, JobId, TaskId};
use std::fmt;
use thiserror::Error;

pub const JOB_TABLE_TAG: &str = "job-table/";
pub const TASK_TABLE_TAG: &str = "task-table/";
pub const GRAPH_NODE_TAG: &str = "node-";
pub const LAST_RUN_MOUNT: &str = "last-job-run-ts-wrapper";
pub const BADGE_TAG: &str = "schedule-badge-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridKey {
    Job(JobId),
    Task(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceKey {
    Grid(GridKey),
    GraphNode(TaskId),
    LastRun,
    Badge(JobId),
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKey::Grid(GridKey::Job(job)) => write!(f, "{JOB_TABLE_TAG}{job}"),
            SurfaceKey::Grid(GridKey::Task(task)) => write!(f, "{TASK_TABLE_TAG}{task}"),
            SurfaceKey::GraphNode(task) => write!(f, "{GRAPH_NODE_TAG}{task}"),
            SurfaceKey::LastRun => f.write_str(LAST_RUN_MOUNT),
            SurfaceKey::Badge(job) => write!(f, "{BADGE_TAG}{job}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface not mounted: {0}")]
    NotFound(SurfaceKey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusGrid {
    indicators: Vec<DisplayColor>,
}

impl StatusGrid {
    pub fn indicators(&self) -> &[DisplayColor] {
        &self.indicators
    }

    /// Swaps in a fully built indicator row.
    pub fn replace(&mut self, indicators: Vec<DisplayColor>) {
        self.indicators = indicators;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphNode {
    outline: Option<DisplayColor>,
    downstream: Vec<TaskId>,
}

impl GraphNode {
    pub fn outline(&self) -> Option<DisplayColor> {
        self.outline
    }

    pub fn set_outline(&mut self, color: DisplayColor) {
        self.outline = Some(color);
    }

    pub fn downstream(&self) -> &[TaskId] {
        &self.downstream
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampLabel {
    text: Option<String>,
}

impl TimestampLabel {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Inactive,
}

impl ActiveState {
    pub fn from_active(active: bool) -> Self {
        if active {
            ActiveState::Active
        } else {
            ActiveState::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == ActiveState::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Badge {
    state: Option<ActiveState>,
}

impl Badge {
    pub fn state(&self) -> Option<ActiveState> {
        self.state
    }

    pub fn set_state(&mut self, state: ActiveState) {
        self.state = Some(state);
    }

    pub fn class_name(&self) -> &'static str {
        match self.state {
            Some(ActiveState::Active) => "schedule-badge-active-true",
            Some(ActiveState::Inactive) => "schedule-badge-active-false",
            None => "schedule-badge",
        }
    }
}

pub trait SurfaceRegistry {
    fn grid_mut(&mut self, key: &GridKey) -> Option<&mut StatusGrid>;
    fn graph_node_mut(&mut self, task: &TaskId) -> Option<&mut GraphNode>;
    fn last_run_mut(&mut self) -> Option<&mut TimestampLabel>;
    fn badge_mut(&mut self, job: &JobId) -> Option<&mut Badge>;
}

/// In-memory surfaces, listed in mount order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceBoard {
    job_grids: Vec<(JobId, StatusGrid)>,
    task_grids: Vec<(TaskId, StatusGrid)>,
    graph_nodes: Vec<(TaskId, GraphNode)>,
    last_run: Option<TimestampLabel>,
    badges: Vec<(JobId, Badge)>,
}

fn find_mut<'a, K: PartialEq, V>(entries: &'a mut [(K, V)], key: &K) -> Option<&'a mut V> {
    entries
        .iter_mut()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value)
}

fn find<'a, K: PartialEq, V>(entries: &'a [(K, V)], key: &K) -> Option<&'a V> {
    entries
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value)
}

fn mount<K: PartialEq, V: Default>(entries: &mut Vec<(K, V)>, key: K) {
    if !entries.iter().any(|(candidate, _)| *candidate == key) {
        entries.push((key, V::default()));
    }
}

impl SurfaceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount_job_grid(&mut self, job: JobId) {
        mount(&mut self.job_grids, job);
    }

    pub fn mount_task_grid(&mut self, task: TaskId) {
        mount(&mut self.task_grids, task);
    }

    pub fn mount_graph_node(&mut self, task: TaskId, downstream: Vec<TaskId>) {
        match find_mut(&mut self.graph_nodes, &task) {
            Some(node) => node.downstream = downstream,
            None => self.graph_nodes.push((
                task,
                GraphNode {
                    outline: None,
                    downstream,
                },
            )),
        }
    }

    pub fn mount_last_run(&mut self) {
        if self.last_run.is_none() {
            self.last_run = Some(TimestampLabel::default());
        }
    }

    pub fn mount_badge(&mut self, job: JobId) {
        mount(&mut self.badges, job);
    }

    pub fn grid(&self, key: &GridKey) -> Option<&StatusGrid> {
        match key {
            GridKey::Job(job) => find(&self.job_grids, job),
            GridKey::Task(task) => find(&self.task_grids, task),
        }
    }

    pub fn job_grids(&self) -> impl Iterator<Item = (&JobId, &StatusGrid)> {
        self.job_grids.iter().map(|(job, grid)| (job, grid))
    }

    pub fn task_grids(&self) -> impl Iterator<Item = (&TaskId, &StatusGrid)> {
        self.task_grids.iter().map(|(task, grid)| (task, grid))
    }

    pub fn graph_node(&self, task: &TaskId) -> Option<&GraphNode> {
        find(&self.graph_nodes, task)
    }

    pub fn graph_nodes(&self) -> impl Iterator<Item = (&TaskId, &GraphNode)> {
        self.graph_nodes.iter().map(|(task, node)| (task, node))
    }

    pub fn last_run(&self) -> Option<&TimestampLabel> {
        self.last_run.as_ref()
    }

    pub fn badge(&self, job: &JobId) -> Option<&Badge> {
        find(&self.badges, job)
    }
}

impl SurfaceRegistry for SurfaceBoard {
    fn grid_mut(&mut self, key: &GridKey) -> Option<&mut StatusGrid> {
        match key {
            GridKey::Job(job) => find_mut(&mut self.job_grids, job),
            GridKey::Task(task) => find_mut(&mut self.task_grids, task),
        }
    }

    fn graph_node_mut(&mut self, task: &TaskId) -> Option<&mut GraphNode> {
        find_mut(&mut self.graph_nodes, task)
    }

    fn last_run_mut(&mut self) -> Option<&mut TimestampLabel> {
        self.last_run.as_mut()
    }

    fn badge_mut(&mut self, job: &JobId) -> Option<&mut Badge> {
        find_mut(&mut self.badges, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpulse_core::palette;

    #[test]
    fn mount_names_follow_the_page_layout() {
        assert_eq!(
            SurfaceKey::GraphNode(TaskId::from("sleepOne")).to_string(),
            "node-sleepOne"
        );
        assert_eq!(
            SurfaceKey::Badge(JobId::from("build-job")).to_string(),
            "schedule-badge-build-job"
        );
        assert_eq!(SurfaceKey::LastRun.to_string(), "last-job-run-ts-wrapper");
    }

    #[test]
    fn unmounted_surfaces_resolve_to_none() {
        let mut board = SurfaceBoard::new();
        assert!(board.grid_mut(&GridKey::Job(JobId::from("a"))).is_none());
        assert!(board.graph_node_mut(&TaskId::from("t")).is_none());
        assert!(board.last_run_mut().is_none());
        assert!(board.badge_mut(&JobId::from("a")).is_none());
    }

    #[test]
    fn mounting_is_idempotent_and_ordered() {
        let mut board = SurfaceBoard::new();
        board.mount_task_grid(TaskId::from("b"));
        board.mount_task_grid(TaskId::from("a"));
        board.mount_task_grid(TaskId::from("b"));
        let order: Vec<&str> = board.task_grids().map(|(task, _)| task.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn remounting_a_node_keeps_its_outline() {
        let mut board = SurfaceBoard::new();
        let task = TaskId::from("t");
        board.mount_graph_node(task.clone(), Vec::new());
        board
            .graph_node_mut(&task)
            .expect("mounted")
            .set_outline(palette::FAILED);
        board.mount_graph_node(task.clone(), vec![TaskId::from("u")]);
        let node = board.graph_node(&task).expect("mounted");
        assert_eq!(node.outline(), Some(palette::FAILED));
        assert_eq!(node.downstream().len(), 1);
    }

    #[test]
    fn badge_class_reflects_state() {
        let mut badge = Badge::default();
        assert_eq!(badge.class_name(), "schedule-badge");
        badge.set_state(ActiveState::Active);
        assert_eq!(badge.class_name(), "schedule-badge-active-true");
        badge.set_state(ActiveState::from_active(false));
        assert_eq!(badge.class_name(), "schedule-badge-active-false");
    }
}
