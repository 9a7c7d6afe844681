use crate::client::{HttpJobClient, RequestError};
use crate::stream::{
    next_backoff, sleep_or_shutdown, JobFilter, MessageOutcome, StreamSubscription,
    INITIAL_BACKOFF,
};
use crate::surface::{ActiveState, SurfaceBoard};
use crate::toggle::{apply_status, ActiveToggleController, JobApi};
use chrono::{DateTime, Utc};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use flowpulse_core::{
    parse_snapshot,
    rest::{Health, JobDag, JobDetail},
    JobId, JobSnapshotEvent, TaskId,
};
use std::{io, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Layout data fetched from the REST api before surfaces can be mounted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bootstrap {
    pub jobs: Vec<JobId>,
    pub detail: Option<JobDetail>,
    pub dag: Option<JobDag>,
}

impl Bootstrap {
    /// A job view is only complete once its DAG arrived as well.
    pub fn is_complete(&self) -> bool {
        self.detail.is_none() || self.dag.is_some()
    }
}

pub async fn fetch_bootstrap(
    client: &HttpJobClient,
    filter: &JobFilter,
) -> Result<Bootstrap, RequestError> {
    match filter {
        JobFilter::All => {
            let list = client.job_list().await?;
            Ok(Bootstrap {
                jobs: list.jobs,
                detail: None,
                dag: None,
            })
        }
        JobFilter::Job(job) => {
            let detail = client.job_detail(job).await?;
            let dag = match client.job_dag(job).await {
                Ok(dag) => Some(dag),
                Err(err) => {
                    warn!(event = "dag_fetch_error", job = %job, error = %err);
                    None
                }
            };
            Ok(Bootstrap {
                jobs: vec![job.clone()],
                detail: Some(detail),
                dag,
            })
        }
    }
}

/// Fetches the layout until it is complete, backing off between attempts.
/// Every attempt is reported so partial layouts mount as soon as they exist.
pub async fn bootstrap_until_ready(
    client: HttpJobClient,
    filter: JobFilter,
    max_backoff: Duration,
    tx: mpsc::Sender<ActionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let result = fetch_bootstrap(&client, &filter).await;
        let complete = matches!(&result, Ok(bootstrap) if bootstrap.is_complete());
        if tx.send(ActionEvent::Bootstrapped(result)).await.is_err() || complete {
            return;
        }
        info!(event = "bootstrap_retry", retry_in_ms = backoff.as_millis() as u64);
        if sleep_or_shutdown(backoff, &mut shutdown).await {
            return;
        }
        backoff = next_backoff(backoff, max_backoff);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Toggle(JobId),
    Submit(JobId),
    RefreshStatus(JobId),
    Quit,
}

#[derive(Debug)]
pub enum ActionEvent {
    Bootstrapped(Result<Bootstrap, RequestError>),
    Health(Result<Health, RequestError>),
    Status {
        job: JobId,
        toggled: bool,
        result: Result<ActiveState, RequestError>,
    },
    Submitted {
        job: JobId,
        result: Result<(), RequestError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub applied: u64,
    pub filtered: u64,
    pub discarded: u64,
}

pub struct App {
    filter: JobFilter,
    pub source_label: String,
    pub surfaces: SurfaceBoard,
    pub jobs: Vec<JobId>,
    pub detail: Option<JobDetail>,
    pub selected: usize,
    pub server_healthy: Option<bool>,
    pub status_note: Option<String>,
    pub help_open: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub stats: StreamStats,
    snapshots: Vec<JobSnapshotEvent>,
    statuses_requested: bool,
    should_quit: bool,
}

impl App {
    pub fn new(filter: JobFilter, source_label: impl Into<String>) -> Self {
        let mut surfaces = SurfaceBoard::new();
        let mut jobs = Vec::new();
        if let JobFilter::Job(job) = &filter {
            surfaces.mount_job_grid(job.clone());
            surfaces.mount_badge(job.clone());
            surfaces.mount_last_run();
            jobs.push(job.clone());
        }
        Self {
            filter,
            source_label: source_label.into(),
            surfaces,
            jobs,
            detail: None,
            selected: 0,
            server_healthy: None,
            status_note: None,
            help_open: false,
            last_message_at: None,
            stats: StreamStats::default(),
            snapshots: Vec::new(),
            statuses_requested: false,
            should_quit: false,
        }
    }

    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// The job that keyboard actions apply to.
    pub fn selected_job(&self) -> Option<&JobId> {
        match &self.filter {
            JobFilter::Job(job) => Some(job),
            JobFilter::All => self.jobs.get(self.selected),
        }
    }

    pub fn apply_stream_message(
        &mut self,
        subscription: &StreamSubscription,
        raw: &str,
    ) -> MessageOutcome {
        let event = match parse_snapshot(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(event = "stream_decode_error", error = %err);
                self.stats.discarded += 1;
                return MessageOutcome::Discarded(err);
            }
        };
        let outcome = subscription.apply_event(&mut self.surfaces, &event);
        match &outcome {
            MessageOutcome::Applied(_) => {
                self.stats.applied += 1;
                self.last_message_at = Some(Utc::now());
                self.remember(event);
            }
            MessageOutcome::Filtered => self.stats.filtered += 1,
            MessageOutcome::Discarded(_) => self.stats.discarded += 1,
        }
        outcome
    }

    /// Keeps the newest snapshot per job so surfaces mounted later can catch up.
    fn remember(&mut self, event: JobSnapshotEvent) {
        match self
            .snapshots
            .iter_mut()
            .find(|known| known.job_name == event.job_name)
        {
            Some(known) => *known = event,
            None => self.snapshots.push(event),
        }
    }

    /// Submission time of the latest run shown in the job view.
    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        let job = self.selected_job()?;
        self.snapshots
            .iter()
            .find(|known| &known.job_name == job)
            .and_then(|known| known.latest_run())
            .and_then(|run| run.submitted_at())
    }

    /// Mounts the surfaces described by the bootstrap data. Task grids follow
    /// the job's declared task order; graph nodes exist only once a DAG is known.
    pub fn mount(&mut self, bootstrap: Bootstrap) {
        for job in &bootstrap.jobs {
            self.surfaces.mount_job_grid(job.clone());
            self.surfaces.mount_badge(job.clone());
            if !self.jobs.contains(job) {
                self.jobs.push(job.clone());
            }
        }
        if let Some(detail) = &bootstrap.detail {
            for task in &detail.tasks {
                self.surfaces.mount_task_grid(task.clone());
            }
            if let Some(dag) = &bootstrap.dag {
                let mut nodes: Vec<TaskId> = detail.tasks.clone();
                for node in dag.nodes() {
                    if !nodes.contains(&node) {
                        nodes.push(node);
                    }
                }
                for node in nodes {
                    let downstream = dag.downstream(&node).to_vec();
                    self.surfaces.mount_graph_node(node, downstream);
                }
            }
        }
        if bootstrap.detail.is_some() {
            self.detail = bootstrap.detail;
        }
        self.selected = self.selected.min(self.jobs.len().saturating_sub(1));

        for event in &self.snapshots {
            self.filter.reconcile(&mut self.surfaces, event);
        }
    }

    /// Applies a finished request. Returns jobs whose status should be queried next.
    pub fn apply_action(&mut self, event: ActionEvent) -> Vec<JobId> {
        match event {
            ActionEvent::Bootstrapped(Ok(bootstrap)) => {
                info!(
                    event = "board_bootstrapped",
                    jobs = bootstrap.jobs.len(),
                    complete = bootstrap.is_complete()
                );
                if !bootstrap.is_complete() {
                    self.status_note = Some("graph unavailable, retrying".to_string());
                }
                let jobs = bootstrap.jobs.clone();
                self.mount(bootstrap);
                if std::mem::replace(&mut self.statuses_requested, true) {
                    Vec::new()
                } else {
                    jobs
                }
            }
            ActionEvent::Bootstrapped(Err(err)) => {
                warn!(event = "bootstrap_error", error = %err);
                self.status_note = Some(format!("layout unavailable, retrying: {err}"));
                Vec::new()
            }
            ActionEvent::Health(result) => {
                self.server_healthy = Some(matches!(&result, Ok(health) if health.is_ok()));
                if let Err(err) = result {
                    warn!(event = "health_error", error = %err);
                }
                Vec::new()
            }
            ActionEvent::Status {
                job,
                toggled,
                result,
            } => {
                apply_status(&mut self.surfaces, &job, &result);
                self.status_note = Some(match (&result, toggled) {
                    (Ok(state), true) => format!(
                        "{job} is now {}",
                        if state.is_active() { "active" } else { "paused" }
                    ),
                    (Ok(_), false) => format!("{job} status refreshed"),
                    (Err(err), _) => format!("status check failed for {job}: {err}"),
                });
                Vec::new()
            }
            ActionEvent::Submitted { job, result } => {
                self.status_note = Some(match result {
                    Ok(()) => format!("submitted a run of {job}"),
                    Err(err) => format!("submit failed for {job}: {err}"),
                });
                Vec::new()
            }
        }
    }

    /// Handles one read from the terminal input stream. A closed or failing
    /// stream ends the board since no key can reach it anymore.
    pub fn handle_terminal_event(
        &mut self,
        event: Option<io::Result<Event>>,
    ) -> Option<UserAction> {
        match event {
            Some(Ok(event)) => self.handle_input(event),
            Some(Err(err)) => {
                warn!(event = "input_error", error = %err);
                self.should_quit = true;
                Some(UserAction::Quit)
            }
            None => {
                warn!(event = "input_closed");
                self.should_quit = true;
                Some(UserAction::Quit)
            }
        }
    }

    pub fn handle_input(&mut self, event: Event) -> Option<UserAction> {
        match event {
            Event::Key(key) if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) => {
                self.handle_key(key)
            }
            _ => None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<UserAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return Some(UserAction::Quit);
        }
        if self.help_open {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                self.help_open = false;
            }
            return None;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                Some(UserAction::Quit)
            }
            KeyCode::Char('?') => {
                self.help_open = true;
                None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected + 1 < self.jobs.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Char('t') => self.selected_job().cloned().map(UserAction::Toggle),
            KeyCode::Char('s') => self.selected_job().cloned().map(UserAction::Submit),
            KeyCode::Char('r') => self.selected_job().cloned().map(UserAction::RefreshStatus),
            _ => None,
        }
    }
}

/// Runs a user action off the render loop; the outcome comes back as an
/// [`ActionEvent`] so surfaces are only ever touched by the loop itself.
pub fn spawn_action<A>(
    controller: &ActiveToggleController<A>,
    action: UserAction,
    tx: &mpsc::Sender<ActionEvent>,
) where
    A: JobApi + Clone + 'static,
{
    let controller = controller.clone();
    let tx = tx.clone();
    match action {
        UserAction::Toggle(job) => {
            tokio::spawn(async move {
                let result = controller.toggle_confirmed(&job).await;
                let _ = tx
                    .send(ActionEvent::Status {
                        job,
                        toggled: true,
                        result,
                    })
                    .await;
            });
        }
        UserAction::RefreshStatus(job) => {
            tokio::spawn(async move {
                let result = controller.fetch_status(&job).await;
                let _ = tx
                    .send(ActionEvent::Status {
                        job,
                        toggled: false,
                        result,
                    })
                    .await;
            });
        }
        UserAction::Submit(job) => {
            tokio::spawn(async move {
                let result = controller.submit(&job).await;
                let _ = tx.send(ActionEvent::Submitted { job, result }).await;
            });
        }
        UserAction::Quit => {}
    }
}
