use crate::stream::{EventSourceConfig, JobFilter};
use clap::Parser;
use flowpulse_core::{sse::DEFAULT_MAX_FRAME_BYTES, JobId};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8100";

#[derive(Parser, Debug, Clone)]
#[command(name = "flowpulse-board", about = "Live status board for a job scheduler")]
pub struct Args {
    /// Scheduler base url (falls back to FLOWPULSE_URL).
    #[arg(long, default_value = "")]
    pub url: String,
    /// Job to follow; the overview of all jobs is shown when empty.
    #[arg(long, default_value = "")]
    pub job: String,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = 10)]
    pub max_backoff_secs: u64,
    #[arg(long, default_value_t = 64)]
    pub channel_capacity: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub job: Option<JobId>,
    pub debug: bool,
    pub log_dir: String,
    pub max_backoff: Duration,
    pub channel_capacity: usize,
}

impl Config {
    pub fn load() -> Self {
        Self::from_args(Args::parse(), |key| std::env::var(key).ok())
    }

    /// Resolves flags first, then the given environment lookup, then defaults.
    pub fn from_args(args: Args, env: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = non_empty(args.url)
            .or_else(|| env("FLOWPULSE_URL").and_then(non_empty))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let job = non_empty(args.job)
            .or_else(|| env("FLOWPULSE_JOB").and_then(non_empty))
            .map(JobId::new);
        let debug = args.debug
            || env("FLOWPULSE_DEBUG")
                .and_then(|value| parse_bool_flag(&value))
                .unwrap_or(false);
        let log_dir = non_empty(args.log_dir)
            .or_else(|| env("FLOWPULSE_LOG_DIR").and_then(non_empty))
            .unwrap_or_default();
        Config {
            base_url,
            job,
            debug,
            log_dir,
            max_backoff: Duration::from_secs(args.max_backoff_secs.max(1)),
            channel_capacity: args.channel_capacity.max(1),
        }
    }

    pub fn filter(&self) -> JobFilter {
        match &self.job {
            Some(job) => JobFilter::Job(job.clone()),
            None => JobFilter::All,
        }
    }

    pub fn source_config(&self) -> EventSourceConfig {
        EventSourceConfig {
            max_backoff: self.max_backoff,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
