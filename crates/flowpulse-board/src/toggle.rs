use crate::client::RequestError;
use crate::surface::{ActiveState, SurfaceRegistry};
use async_trait::async_trait;
use flowpulse_core::JobId;
use tracing::{debug, info, warn};

/// Request/response calls that manage a job's schedule flag.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn is_active(&self, job: &JobId) -> Result<bool, RequestError>;
    async fn toggle_active(&self, job: &JobId) -> Result<(), RequestError>;
    async fn submit(&self, job: &JobId) -> Result<(), RequestError>;
}

/// Keeps a job's badge in line with what the server reports. The badge is
/// never flipped ahead of a confirmed status read.
#[derive(Clone, Debug)]
pub struct ActiveToggleController<A> {
    api: A,
}

impl<A: JobApi> ActiveToggleController<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn fetch_status(&self, job: &JobId) -> Result<ActiveState, RequestError> {
        let active = self.api.is_active(job).await?;
        Ok(ActiveState::from_active(active))
    }

    /// Flips the flag, then reads back the state the server settled on.
    pub async fn toggle_confirmed(&self, job: &JobId) -> Result<ActiveState, RequestError> {
        self.api.toggle_active(job).await?;
        info!(event = "job_toggle_sent", job = %job);
        self.fetch_status(job).await
    }

    pub async fn query_status<S>(
        &self,
        surfaces: &mut S,
        job: &JobId,
    ) -> Result<ActiveState, RequestError>
    where
        S: SurfaceRegistry + Send + ?Sized,
    {
        let result = self.fetch_status(job).await;
        apply_status(surfaces, job, &result);
        result
    }

    pub async fn toggle<S>(&self, surfaces: &mut S, job: &JobId) -> Result<ActiveState, RequestError>
    where
        S: SurfaceRegistry + Send + ?Sized,
    {
        let result = self.toggle_confirmed(job).await;
        apply_status(surfaces, job, &result);
        result
    }

    /// Fire-and-forget run submission; failures only reach the log.
    pub async fn submit(&self, job: &JobId) -> Result<(), RequestError> {
        match self.api.submit(job).await {
            Ok(()) => {
                info!(event = "job_submitted", job = %job);
                Ok(())
            }
            Err(err) => {
                warn!(event = "job_submit_error", job = %job, error = %err);
                Err(err)
            }
        }
    }
}

/// Writes a status result onto the job's badge. Errors leave the badge on
/// its last known state. Returns whether the badge changed.
pub fn apply_status<S>(
    surfaces: &mut S,
    job: &JobId,
    result: &Result<ActiveState, RequestError>,
) -> bool
where
    S: SurfaceRegistry + ?Sized,
{
    match result {
        Ok(state) => match surfaces.badge_mut(job) {
            Some(badge) => {
                badge.set_state(*state);
                true
            }
            None => {
                debug!(event = "badge_missing", job = %job);
                false
            }
        },
        Err(err) => {
            warn!(event = "job_status_error", job = %job, error = %err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceBoard;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedApi {
        active: AtomicBool,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        toggles: AtomicUsize,
        submits: AtomicUsize,
    }

    fn unavailable(job: &JobId) -> RequestError {
        RequestError::Status {
            url: format!("http://scheduler.test/api/jobs/{job}"),
            status: 503,
        }
    }

    #[async_trait]
    impl JobApi for ScriptedApi {
        async fn is_active(&self, job: &JobId) -> Result<bool, RequestError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(unavailable(job));
            }
            Ok(self.active.load(Ordering::SeqCst))
        }

        async fn toggle_active(&self, job: &JobId) -> Result<(), RequestError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(unavailable(job));
            }
            self.toggles.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_xor(true, Ordering::SeqCst);
            Ok(())
        }

        async fn submit(&self, job: &JobId) -> Result<(), RequestError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(unavailable(job));
            }
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn board_for(job: &JobId) -> SurfaceBoard {
        let mut board = SurfaceBoard::new();
        board.mount_badge(job.clone());
        board
    }

    #[tokio::test]
    async fn toggle_shows_server_confirmed_state() {
        let job = JobId::from("build-job");
        let mut board = board_for(&job);
        let controller = ActiveToggleController::new(ScriptedApi::default());

        let state = controller.toggle(&mut board, &job).await.expect("toggle");
        assert_eq!(state, ActiveState::Active);
        assert_eq!(controller.api().toggles.load(Ordering::SeqCst), 1);
        assert_eq!(
            board.badge(&job).map(|b| b.class_name()),
            Some("schedule-badge-active-true")
        );

        controller.query_status(&mut board, &job).await.expect("query");
        assert_eq!(
            board.badge(&job).map(|b| b.class_name()),
            Some("schedule-badge-active-true")
        );
    }

    #[tokio::test]
    async fn failed_query_keeps_prior_badge() {
        let job = JobId::from("build-job");
        let mut board = board_for(&job);
        let controller = ActiveToggleController::new(ScriptedApi::default());

        controller.query_status(&mut board, &job).await.expect("query");
        assert_eq!(
            board.badge(&job).map(|b| b.class_name()),
            Some("schedule-badge-active-false")
        );

        controller.api().active.store(true, Ordering::SeqCst);
        controller.api().fail_reads.store(true, Ordering::SeqCst);
        let result = controller.query_status(&mut board, &job).await;
        assert!(matches!(result, Err(RequestError::Status { status: 503, .. })));
        assert_eq!(
            board.badge(&job).map(|b| b.class_name()),
            Some("schedule-badge-active-false")
        );
    }

    #[tokio::test]
    async fn failed_toggle_does_not_flip_optimistically() {
        let job = JobId::from("build-job");
        let mut board = board_for(&job);
        let controller = ActiveToggleController::new(ScriptedApi::default());
        controller.query_status(&mut board, &job).await.expect("query");

        controller.api().fail_writes.store(true, Ordering::SeqCst);
        assert!(controller.toggle(&mut board, &job).await.is_err());
        assert_eq!(
            board.badge(&job).and_then(|b| b.state()),
            Some(ActiveState::Inactive)
        );
    }

    #[tokio::test]
    async fn submit_reports_errors_without_touching_the_badge() {
        let job = JobId::from("build-job");
        let board = board_for(&job);
        let controller = ActiveToggleController::new(ScriptedApi::default());

        controller.submit(&job).await.expect("submit");
        assert_eq!(controller.api().submits.load(Ordering::SeqCst), 1);

        controller.api().fail_writes.store(true, Ordering::SeqCst);
        assert!(controller.submit(&job).await.is_err());
        assert_eq!(board.badge(&job).and_then(|b| b.state()), None);
    }

    #[test]
    fn status_for_unmounted_badge_is_ignored() {
        let mut board = SurfaceBoard::new();
        let job = JobId::from("elsewhere");
        assert!(!apply_status(&mut board, &job, &Ok(ActiveState::Active)));
    }
}
