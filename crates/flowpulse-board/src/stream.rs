use crate::client::HttpJobClient;
use crate::graph::{sync_graph, OverlayReport};
use crate::grid::{derive_job_grid, render_grid, render_task_grids};
use crate::surface::{GridKey, SurfaceRegistry};
use crate::timestamp::update_last_run;
use flowpulse_core::{
    parse_snapshot,
    sse::{SseFrameDecoder, DEFAULT_MAX_FRAME_BYTES},
    DecodingError, JobId, JobSnapshotEvent,
};
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Raw `data` payload of one stream message.
pub type StreamMessage = Arc<str>;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    pub max_backoff: Duration,
    pub max_frame_bytes: usize,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            max_backoff: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Sole owner of the `/stream` connection. Views attach through
/// [`EventSource::subscribe`] and never read the connection themselves.
pub struct EventSource {
    tx: broadcast::Sender<StreamMessage>,
}

impl EventSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self, filter: JobFilter) -> StreamSubscription {
        StreamSubscription {
            filter,
            rx: self.tx.subscribe(),
        }
    }

    /// Publishes one payload to every live subscription. Returns the number
    /// of subscriptions that received it.
    pub fn publish(&self, message: impl Into<StreamMessage>) -> usize {
        self.tx.send(message.into()).unwrap_or(0)
    }

    pub fn spawn(
        &self,
        client: HttpJobClient,
        config: EventSourceConfig,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            run_connection(client, tx, config, shutdown).await;
        })
    }
}

async fn run_connection(
    client: HttpJobClient,
    tx: broadcast::Sender<StreamMessage>,
    config: EventSourceConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut base_delay = INITIAL_BACKOFF;
    let mut backoff = base_delay;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let connect = tokio::select! {
            _ = shutdown.changed() => break,
            connect = client.open_stream() => connect,
        };
        let response = match connect {
            Ok(response) => response,
            Err(err) => {
                warn!(event = "stream_connect_error", error = %err);
                if sleep_or_shutdown(backoff, &mut shutdown).await {
                    break;
                }
                backoff = next_backoff(backoff, config.max_backoff);
                continue;
            }
        };
        backoff = base_delay;
        info!(event = "stream_connected", url = %client.endpoint(&["stream"]));

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseFrameDecoder::new(config.max_frame_bytes);
        let mut stopping = false;
        loop {
            let chunk = tokio::select! {
                _ = shutdown.changed() => {
                    stopping = true;
                    break;
                }
                chunk = body.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    warn!(event = "stream_read_error", error = %err);
                    break;
                }
                None => break,
            };
            let report = decoder.push_chunk(&bytes);
            for err in report.errors {
                warn!(event = "stream_frame_error", error = %err);
            }
            for frame in report.frames {
                if let Some(retry_ms) = frame.retry_ms {
                    base_delay = retry_delay(retry_ms, config.max_backoff);
                    backoff = base_delay;
                    debug!(
                        event = "stream_retry_hint",
                        retry_ms,
                        delay_ms = base_delay.as_millis() as u64
                    );
                }
                if !frame.is_message() || frame.data.is_empty() {
                    continue;
                }
                if tx.send(Arc::from(frame.data)).is_err() {
                    debug!(event = "stream_no_subscribers");
                }
            }
        }

        for err in decoder.finish().errors {
            warn!(event = "stream_frame_error", error = %err);
        }
        if stopping {
            break;
        }
        info!(event = "stream_disconnected", retry_in_ms = backoff.as_millis() as u64);
        if sleep_or_shutdown(backoff, &mut shutdown).await {
            break;
        }
        backoff = next_backoff(backoff, config.max_backoff);
    }
    info!(event = "stream_stopped");
}

pub(crate) async fn sleep_or_shutdown(
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Delay asked for by an SSE `retry:` field, held inside the backoff window.
pub fn retry_delay(retry_ms: u64, max: Duration) -> Duration {
    Duration::from_millis(retry_ms)
        .min(max)
        .max(INITIAL_BACKOFF)
}

/// Doubles the delay up to `max`; never drops below the initial backoff.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current
        .max(INITIAL_BACKOFF)
        .saturating_mul(2)
        .min(max.max(INITIAL_BACKOFF))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    /// Detail view of one job: every surface is reconciled.
    Job(JobId),
    /// Overview of all jobs: only job grids are reconciled.
    All,
}

impl JobFilter {
    pub fn matches(&self, job: &JobId) -> bool {
        match self {
            JobFilter::Job(wanted) => wanted == job,
            JobFilter::All => true,
        }
    }

    /// Reconciles the view's surfaces with one snapshot. Each surface is
    /// updated independently; a missing mount only skips that surface.
    pub fn reconcile<S>(&self, surfaces: &mut S, event: &JobSnapshotEvent) -> MessageOutcome
    where
        S: SurfaceRegistry + ?Sized,
    {
        if !self.matches(&event.job_name) {
            return MessageOutcome::Filtered;
        }
        let runs = &event.job_runs;
        let mut report = ApplyReport::default();

        if let JobFilter::Job(_) = self {
            report.task_grids = render_task_grids(surfaces, runs);
        }

        let job_key = GridKey::Job(event.job_name.clone());
        match render_grid(surfaces, &job_key, derive_job_grid(runs)) {
            Ok(()) => report.job_grid = true,
            Err(err) => debug!(event = "grid_skipped", error = %err),
        }

        if let JobFilter::Job(_) = self {
            report.graph = sync_graph(surfaces, event.latest_run());
            match update_last_run(surfaces, runs) {
                Ok(updated) => report.timestamp = updated,
                Err(err) => debug!(event = "timestamp_skipped", error = %err),
            }
        }

        MessageOutcome::Applied(report)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub task_grids: usize,
    pub job_grid: bool,
    pub graph: OverlayReport,
    pub timestamp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied(ApplyReport),
    Filtered,
    Discarded(DecodingError),
}

pub struct StreamSubscription {
    filter: JobFilter,
    rx: broadcast::Receiver<StreamMessage>,
}

impl StreamSubscription {
    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    /// Next payload in delivery order. `None` once the event source is gone.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = "stream_lagged", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn handle_message<S>(&self, surfaces: &mut S, raw: &str) -> MessageOutcome
    where
        S: SurfaceRegistry + ?Sized,
    {
        match parse_snapshot(raw) {
            Ok(event) => self.apply_event(surfaces, &event),
            Err(err) => {
                warn!(event = "stream_decode_error", error = %err);
                MessageOutcome::Discarded(err)
            }
        }
    }

    pub fn apply_event<S>(&self, surfaces: &mut S, event: &JobSnapshotEvent) -> MessageOutcome
    where
        S: SurfaceRegistry + ?Sized,
    {
        self.filter.reconcile(surfaces, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceBoard;
    use flowpulse_core::{palette, TaskId};

    const BUILD_JOB: &str = r#"{"jobName":"build-job","jobRuns":[
        {"submitted":"2026-10-19T08:00:00Z","state":{"job":"failed",
            "tasks":{"state":{"compile":"successful","test":"failed"}}}},
        {"submitted":"2026-10-19T09:00:00Z","state":{"job":"successful",
            "tasks":{"state":{"compile":"successful","test":"successful","package":"running"}}}}
    ]}"#;

    const OTHER_JOB: &str = r#"{"jobName":"nightly","jobRuns":[
        {"submitted":"2026-10-19T07:00:00Z","state":{"job":"running",
            "tasks":{"state":{"compile":"running"}}}}
    ]}"#;

    fn job_board() -> SurfaceBoard {
        let mut board = SurfaceBoard::new();
        board.mount_job_grid(JobId::from("build-job"));
        for task in ["compile", "test", "package"] {
            board.mount_task_grid(TaskId::from(task));
            board.mount_graph_node(TaskId::from(task), Vec::new());
        }
        board.mount_last_run();
        board
    }

    fn job_view(source: &EventSource) -> StreamSubscription {
        source.subscribe(JobFilter::Job(JobId::from("build-job")))
    }

    #[test]
    fn applies_every_surface_for_the_current_job() {
        let source = EventSource::new(8);
        let subscription = job_view(&source);
        let mut board = job_board();

        let MessageOutcome::Applied(report) = subscription.handle_message(&mut board, BUILD_JOB)
        else {
            panic!("expected applied outcome");
        };
        assert_eq!(report.task_grids, 3);
        assert!(report.job_grid);
        assert_eq!(report.graph.recolored.len(), 3);
        assert!(report.timestamp);

        let job_grid = board
            .grid(&GridKey::Job(JobId::from("build-job")))
            .expect("job grid");
        let tokens: Vec<&str> = job_grid.indicators().iter().map(|c| c.as_str()).collect();
        assert_eq!(tokens, vec!["#ff4020", "#39c84e"]);
        assert_eq!(
            board
                .grid(&GridKey::Task(TaskId::from("package")))
                .expect("task grid")
                .indicators(),
            &[palette::RUNNING]
        );
        assert_eq!(
            board
                .graph_node(&TaskId::from("test"))
                .and_then(|node| node.outline()),
            Some(palette::SUCCESSFUL)
        );
        assert_eq!(
            board.last_run().and_then(|label| label.text()),
            Some("Last run: 2026-10-19T09:00:00Z")
        );
    }

    #[test]
    fn other_jobs_leave_surfaces_untouched() {
        let source = EventSource::new(8);
        let subscription = job_view(&source);
        let mut board = job_board();
        subscription.handle_message(&mut board, BUILD_JOB);
        let before = board.clone();

        assert_eq!(
            subscription.handle_message(&mut board, OTHER_JOB),
            MessageOutcome::Filtered
        );
        assert_eq!(board, before);
    }

    #[test]
    fn malformed_messages_are_discarded() {
        let source = EventSource::new(8);
        let subscription = job_view(&source);
        let mut board = job_board();
        subscription.handle_message(&mut board, BUILD_JOB);
        let before = board.clone();

        for raw in ["{", r#"{"jobName":"build-job"}"#, r#"{"jobName":"build-job","jobRuns":[{"submitted":"t","state":{"job":"lost"}}]}"#] {
            assert!(matches!(
                subscription.handle_message(&mut board, raw),
                MessageOutcome::Discarded(_)
            ));
        }
        assert_eq!(board, before);
    }

    #[test]
    fn reapplying_a_snapshot_is_idempotent() {
        let source = EventSource::new(8);
        let subscription = job_view(&source);
        let mut board = job_board();

        subscription.handle_message(&mut board, BUILD_JOB);
        let once = board.clone();
        subscription.handle_message(&mut board, BUILD_JOB);
        assert_eq!(board, once);
    }

    #[test]
    fn missing_surfaces_do_not_block_the_others() {
        let source = EventSource::new(8);
        let subscription = job_view(&source);
        let mut board = SurfaceBoard::new();
        board.mount_last_run();

        let MessageOutcome::Applied(report) = subscription.handle_message(&mut board, BUILD_JOB)
        else {
            panic!("expected applied outcome");
        };
        assert_eq!(report.task_grids, 0);
        assert!(!report.job_grid);
        assert_eq!(report.graph.missing.len(), 3);
        assert!(report.timestamp);
    }

    #[test]
    fn overview_only_reconciles_job_grids() {
        let source = EventSource::new(8);
        let subscription = source.subscribe(JobFilter::All);
        let mut board = job_board();
        board.mount_job_grid(JobId::from("nightly"));

        subscription.handle_message(&mut board, BUILD_JOB);
        subscription.handle_message(&mut board, OTHER_JOB);

        assert_eq!(
            board
                .grid(&GridKey::Job(JobId::from("nightly")))
                .expect("grid")
                .indicators(),
            &[palette::RUNNING]
        );
        assert!(board
            .grid(&GridKey::Task(TaskId::from("compile")))
            .expect("grid")
            .indicators()
            .is_empty());
        assert_eq!(board.last_run().and_then(|label| label.text()), None);
    }

    #[tokio::test]
    async fn every_subscription_sees_each_message_in_order() {
        let source = EventSource::new(8);
        let mut detail = job_view(&source);
        let mut overview = source.subscribe(JobFilter::All);

        assert_eq!(source.publish(OTHER_JOB), 2);
        assert_eq!(source.publish(BUILD_JOB), 2);

        for subscription in [&mut detail, &mut overview] {
            assert_eq!(subscription.recv().await.as_deref(), Some(OTHER_JOB));
            assert_eq!(subscription.recv().await.as_deref(), Some(BUILD_JOB));
        }
    }

    #[tokio::test]
    async fn lagging_subscription_resumes_with_newest_messages() {
        let source = EventSource::new(2);
        let mut subscription = job_view(&source);
        for idx in 0..5 {
            source.publish(format!("message-{idx}"));
        }
        assert_eq!(subscription.recv().await.as_deref(), Some("message-3"));
        assert_eq!(subscription.recv().await.as_deref(), Some("message-4"));

        drop(source);
        assert!(subscription.recv().await.is_none());
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let max = Duration::from_secs(10);
        assert_eq!(next_backoff(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(8), max), max);
    }

    #[test]
    fn zero_delays_never_produce_a_hot_reconnect() {
        let max = Duration::from_secs(10);
        assert_eq!(retry_delay(0, max), INITIAL_BACKOFF);
        assert_eq!(next_backoff(Duration::ZERO, max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::ZERO, Duration::ZERO), INITIAL_BACKOFF);
    }

    #[test]
    fn retry_hint_is_capped_by_max_backoff() {
        let max = Duration::from_secs(10);
        assert_eq!(retry_delay(2_500, max), Duration::from_millis(2_500));
        assert_eq!(retry_delay(60_000, max), max);
    }
}
