use crate::surface::{GridKey, SurfaceError, SurfaceKey, SurfaceRegistry};
use flowpulse_core::{
    palette::{color_for, DisplayColor},
    JobRun, TaskId,
};
use tracing::debug;

/// Replaces the whole indicator grid mounted under `key`.
pub fn render_grid<S>(
    surfaces: &mut S,
    key: &GridKey,
    colors: Vec<DisplayColor>,
) -> Result<(), SurfaceError>
where
    S: SurfaceRegistry + ?Sized,
{
    match surfaces.grid_mut(key) {
        Some(grid) => {
            grid.replace(colors);
            Ok(())
        }
        None => Err(SurfaceError::NotFound(SurfaceKey::Grid(key.clone()))),
    }
}

/// One colour per run's job-level state, oldest first.
pub fn derive_job_grid(runs: &[JobRun]) -> Vec<DisplayColor> {
    runs.iter().map(|run| color_for(run.job_state())).collect()
}

/// Colour history of every task seen in any run, keyed by task and ordered
/// by first appearance. Runs that do not mention a task add nothing to it.
pub fn derive_task_grids(runs: &[JobRun]) -> Vec<(TaskId, Vec<DisplayColor>)> {
    let mut grids: Vec<(TaskId, Vec<DisplayColor>)> = Vec::new();
    for run in runs {
        for (task, state) in run.tasks().iter() {
            let color = color_for(state);
            match grids.iter_mut().find(|(name, _)| name == task) {
                Some((_, colors)) => colors.push(color),
                None => grids.push((task.clone(), vec![color])),
            }
        }
    }
    grids
}

/// Renders every derived task grid, skipping tasks without a mounted grid.
/// Returns how many grids were replaced.
pub fn render_task_grids<S>(surfaces: &mut S, runs: &[JobRun]) -> usize
where
    S: SurfaceRegistry + ?Sized,
{
    let mut rendered = 0;
    for (task, colors) in derive_task_grids(runs) {
        match render_grid(surfaces, &GridKey::Task(task), colors) {
            Ok(()) => rendered += 1,
            Err(err) => debug!(event = "grid_skipped", error = %err),
        }
    }
    rendered
}
