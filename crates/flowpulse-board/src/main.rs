use crossterm::{
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use flowpulse_board::{
    app::{bootstrap_until_ready, spawn_action, ActionEvent, App, UserAction},
    client::HttpJobClient,
    config::Config,
    logging::init_logging,
    stream::EventSource,
    toggle::ActiveToggleController,
    ui,
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{error::Error, io, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

const ACTION_QUEUE_CAPACITY: usize = 64;
const HEALTH_INTERVAL_SECS: u64 = 30;
const REDRAW_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::load();
    let _log_guard = init_logging(&config);
    info!(
        event = "board_start",
        url = %config.base_url,
        job = ?config.job.as_ref().map(|job| job.as_str())
    );

    let client = HttpJobClient::new(&config.base_url)?;
    let filter = config.filter();
    let source = EventSource::new(config.channel_capacity);
    let mut subscription = source.subscribe(filter.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream_task = source.spawn(client.clone(), config.source_config(), shutdown_rx.clone());

    let controller = ActiveToggleController::new(client.clone());
    let (action_tx, mut action_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
    tokio::spawn(bootstrap_until_ready(
        client.clone(),
        filter.clone(),
        config.max_backoff,
        action_tx.clone(),
        shutdown_rx,
    ));

    let mut app = App::new(filter, config.base_url.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut health_ticker = tokio::time::interval(Duration::from_secs(HEALTH_INTERVAL_SECS));
    let mut redraw_ticker = tokio::time::interval(Duration::from_millis(REDRAW_INTERVAL_MS));

    let mut stream_open = true;
    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;
        tokio::select! {
            message = subscription.recv(), if stream_open => {
                match message {
                    Some(raw) => {
                        app.apply_stream_message(&subscription, &raw);
                    }
                    None => {
                        warn!(event = "stream_source_closed");
                        stream_open = false;
                        app.status_note = Some("live updates stopped".to_string());
                    }
                }
            }
            Some(event) = action_rx.recv() => {
                for job in app.apply_action(event) {
                    spawn_action(&controller, UserAction::RefreshStatus(job), &action_tx);
                }
            }
            _ = health_ticker.tick() => {
                let client = client.clone();
                let tx = action_tx.clone();
                tokio::spawn(async move {
                    let result = client.health().await;
                    let _ = tx.send(ActionEvent::Health(result)).await;
                });
            }
            _ = redraw_ticker.tick() => {}
            maybe_event = events.next() => {
                if let Some(action) = app.handle_terminal_event(maybe_event) {
                    spawn_action(&controller, action, &action_tx);
                }
                if app.should_quit() {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = stream_task.await {
        warn!(event = "stream_task_join_error", error = %err);
    }
    info!(event = "board_stop");
    Ok(())
}
