use axum::{
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use flowpulse_board::{
    client::HttpJobClient,
    stream::{EventSource, EventSourceConfig, JobFilter, StreamSubscription},
};
use futures_util::stream;
use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::{sync::watch, task::JoinHandle};

const SNAPSHOT: &str = r#"{"jobName":"build-job","jobRuns":[]}"#;

#[derive(Default)]
struct Connections {
    opened: Mutex<Vec<Instant>>,
}

impl Connections {
    fn count(&self) -> usize {
        self.opened.lock().expect("lock").len()
    }

    fn gaps(&self) -> Vec<Duration> {
        let opened = self.opened.lock().expect("lock");
        opened.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

/// Serves `/stream` as one message (optionally carrying a `retry:` hint)
/// followed by the end of the response.
async fn short_lived_stream(connections: Arc<Connections>, retry: Option<Duration>) -> HttpJobClient {
    let handler = move || {
        let connections = connections.clone();
        async move {
            connections.opened.lock().expect("lock").push(Instant::now());
            let mut event = Event::default();
            if let Some(retry) = retry {
                event = event.retry(retry);
            }
            let event = event.data(SNAPSHOT);
            Sse::new(stream::iter(vec![Ok::<_, Infallible>(event)]))
        }
    };
    let router = Router::new().route("/stream", get(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    HttpJobClient::new(&format!("http://{addr}")).expect("client")
}

fn start(
    client: HttpJobClient,
) -> (StreamSubscription, watch::Sender<bool>, JoinHandle<()>) {
    let source = EventSource::new(16);
    let subscription = source.subscribe(JobFilter::All);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = source.spawn(client, EventSourceConfig::default(), shutdown_rx);
    (subscription, shutdown_tx, handle)
}

async fn stop(shutdown_tx: watch::Sender<bool>, handle: JoinHandle<()>) {
    shutdown_tx.send(true).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("stream task stops")
        .expect("join");
}

#[tokio::test]
async fn reconnects_after_the_stream_ends_and_resets_backoff() {
    let connections = Arc::new(Connections::default());
    let client = short_lived_stream(connections.clone(), None).await;
    let (mut subscription, shutdown_tx, handle) = start(client);

    for _ in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("message from each connection")
            .expect("source open");
        assert_eq!(&*message, SNAPSHOT);
    }
    stop(shutdown_tx, handle).await;

    let gaps = connections.gaps();
    assert!(gaps.len() >= 2, "gaps: {gaps:?}");
    for gap in &gaps[..2] {
        assert!(*gap >= Duration::from_millis(900), "gaps: {gaps:?}");
        assert!(*gap < Duration::from_millis(1_800), "gaps: {gaps:?}");
    }
}

#[tokio::test]
async fn zero_retry_hint_keeps_the_backoff_floor() {
    let connections = Arc::new(Connections::default());
    let client = short_lived_stream(connections.clone(), Some(Duration::ZERO)).await;
    let (_subscription, shutdown_tx, handle) = start(client);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    stop(shutdown_tx, handle).await;

    let count = connections.count();
    assert!((2..=4).contains(&count), "connections: {count}");
    for gap in connections.gaps() {
        assert!(gap >= Duration::from_millis(900), "gap: {gap:?}");
    }
}

#[tokio::test]
async fn retry_hint_sets_the_reconnect_delay() {
    let connections = Arc::new(Connections::default());
    let client = short_lived_stream(connections.clone(), Some(Duration::from_millis(2_500))).await;
    let (_subscription, shutdown_tx, handle) = start(client);

    let deadline = Instant::now() + Duration::from_secs(6);
    while connections.count() < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    stop(shutdown_tx, handle).await;

    let gaps = connections.gaps();
    assert!(!gaps.is_empty(), "no reconnect within the deadline");
    assert!(gaps[0] >= Duration::from_millis(2_300), "gaps: {gaps:?}");
}
