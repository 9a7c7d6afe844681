use crate::surface::{SurfaceError, SurfaceKey, SurfaceRegistry};
use flowpulse_core::{latest_run, JobRun};

pub const LAST_RUN_PREFIX: &str = "Last run: ";

/// Shows the submission time of the latest run. Returns `Ok(false)` when
/// there are no runs, leaving the previous text in place.
pub fn update_last_run<S>(surfaces: &mut S, runs: &[JobRun]) -> Result<bool, SurfaceError>
where
    S: SurfaceRegistry + ?Sized,
{
    let Some(run) = latest_run(runs) else {
        return Ok(false);
    };
    let label = surfaces
        .last_run_mut()
        .ok_or(SurfaceError::NotFound(SurfaceKey::LastRun))?;
    label.set_text(format!("{LAST_RUN_PREFIX}{}", run.submitted));
    Ok(true)
}
