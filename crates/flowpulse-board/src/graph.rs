use crate::surface::SurfaceRegistry;
use flowpulse_core::{palette::color_for, JobRun, TaskId};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub recolored: Vec<TaskId>,
    pub missing: Vec<TaskId>,
}

/// Outlines each graph node with the colour of its task in `latest`.
///
/// Nodes may not be drawn yet (the graph loads after the first snapshot) or
/// may not exist for a task at all; both cases are skipped per task.
pub fn sync_graph<S>(surfaces: &mut S, latest: Option<&JobRun>) -> OverlayReport
where
    S: SurfaceRegistry + ?Sized,
{
    let mut report = OverlayReport::default();
    let Some(run) = latest else {
        return report;
    };

    for (task, state) in run.tasks().iter() {
        match surfaces.graph_node_mut(task) {
            Some(node) => {
                node.set_outline(color_for(state));
                report.recolored.push(task.clone());
            }
            None => {
                debug!(
                    event = "graph_node_missing",
                    task = %task,
                    "graph node not rendered yet"
                );
                report.missing.push(task.clone());
            }
        }
    }
    report
}
