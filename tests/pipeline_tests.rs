//! # Pipeline Tests
//!
//! Drive the stream listener against a throwaway HTTP server on localhost.
//!
//! The server speaks just enough HTTP/1.1: it reads the request head, then
//! answers with a status line and a close-delimited body made of the
//! scripted lines. Each accepted connection takes the next script; the last
//! one repeats.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ntfy_printer::ReceiptError;
use ntfy_printer::backpressure::PauseFlag;
use ntfy_printer::listener::{
    ListenerConfig, ListenerState, MessageSink, PrinterSink, StreamListener,
};
use ntfy_printer::printer::{PrintOptions, PrinterConnection};
use ntfy_printer::protocol::graphics::ImageEncoding;
use ntfy_printer::render::layout::{LayoutConfig, LayoutRenderer};
use ntfy_printer::transport::{DeviceOpener, PrinterDevice};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// TEST SERVER
// ============================================================================

#[derive(Clone)]
enum Script {
    /// 200 with these lines, then close the connection
    Close(Vec<&'static str>),
    /// 200 with these lines, then hold the connection open
    Hold(Vec<&'static str>),
    /// An error status with an empty body
    Status(u16),
}

struct Server {
    url: String,
    connections: Arc<AtomicUsize>,
}

async fn serve(scripts: Vec<Script>) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let script = scripts[n.min(scripts.len() - 1)].clone();

            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let (status, lines, hold) = match script {
                    Script::Close(lines) => (200, lines, false),
                    Script::Hold(lines) => (200, lines, true),
                    Script::Status(code) => (code, Vec::new(), false),
                };
                let mut response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
                    status
                );
                if status != 200 {
                    response = format!(
                        "HTTP/1.1 {} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status
                    );
                }
                for line in lines {
                    response.push_str(line);
                    response.push('\n');
                }
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                if hold {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });

    Server {
        url: format!("http://{}/kitchen/json", addr),
        connections,
    }
}

// ============================================================================
// SINKS AND DEVICES
// ============================================================================

struct Recorder(mpsc::UnboundedSender<String>);

#[async_trait]
impl MessageSink for Recorder {
    async fn deliver(&self, message: &str) {
        let _ = self.0.send(message.to_string());
    }
}

#[derive(Default)]
struct Printed {
    jobs: Mutex<Vec<Vec<u8>>>,
}

struct MemoryPrinter(Arc<Printed>);

impl PrinterDevice for MemoryPrinter {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), ReceiptError> {
        self.0.jobs.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn capabilities(&self) -> &[ImageEncoding] {
        &[ImageEncoding::BitImageRaster]
    }
}

struct MemoryOpener(Arc<Printed>);

impl DeviceOpener for MemoryOpener {
    fn open(&self) -> Result<Box<dyn PrinterDevice>, ReceiptError> {
        Ok(Box::new(MemoryPrinter(self.0.clone())))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn config(url: &str) -> ListenerConfig {
    ListenerConfig {
        reconnect_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(1),
        ..ListenerConfig::new(url)
    }
}

struct Running {
    messages: mpsc::UnboundedReceiver<String>,
    state: tokio::sync::watch::Receiver<ListenerState>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

fn start(config: ListenerConfig) -> Running {
    let (tx, messages) = mpsc::unbounded_channel();
    let listener = StreamListener::new(config, Arc::new(Recorder(tx))).unwrap();
    let state = listener.subscribe();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));
    Running {
        messages,
        state,
        cancel,
        task,
    }
}

impl Running {
    async fn next(&mut self) -> String {
        tokio::time::timeout(WAIT, self.messages.recv())
            .await
            .expect("no message within timeout")
            .expect("sink closed")
    }

    async fn quiet_for(&mut self, period: Duration) -> bool {
        tokio::time::timeout(period, self.messages.recv()).await.is_err()
    }

    async fn stop(self) -> ListenerState {
        self.cancel.cancel();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("listener did not stop")
            .unwrap();
        *self.state.borrow()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_message_is_delivered_exactly_once() {
    let server = serve(vec![Script::Hold(vec![
        r#"{"id":"1","event":"open","topic":"kitchen"}"#,
        r#"{"id":"2","event":"message","topic":"kitchen","message":"Lunch Time!"}"#,
        r#"{"id":"3","event":"keepalive","topic":"kitchen"}"#,
    ])])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "Lunch Time!");
    assert!(running.quiet_for(Duration::from_millis(200)).await);
    assert_eq!(*running.state.borrow(), ListenerState::Streaming);

    assert_eq!(running.stop().await, ListenerState::Stopped);
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_line_is_skipped_and_stream_stays_open() {
    let server = serve(vec![Script::Hold(vec![
        "not-json",
        r#"{"message":"after garbage"}"#,
    ])])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "after garbage");
    assert_eq!(*running.state.borrow(), ListenerState::Streaming);
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_empty_message_is_not_delivered() {
    let server = serve(vec![Script::Hold(vec![
        r#"{"event":"message","message":""}"#,
        r#"{"event":"message","message":"not empty"}"#,
    ])])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "not empty");
    assert!(running.quiet_for(Duration::from_millis(200)).await);

    running.stop().await;
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let server = serve(vec![Script::Hold(vec![
        r#"{"message":"one"}"#,
        r#"{"message":"two"}"#,
        r#"{"message":"three"}"#,
    ])])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "one");
    assert_eq!(running.next().await, "two");
    assert_eq!(running.next().await, "three");

    running.stop().await;
}

#[tokio::test]
async fn test_dropped_connection_backs_off_and_reconnects() {
    let server = serve(vec![
        Script::Close(vec![r#"{"message":"before drop"}"#]),
        Script::Hold(vec![r#"{"message":"after reconnect"}"#]),
    ])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "before drop");
    assert_eq!(running.next().await, "after reconnect");
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);

    running.stop().await;
}

#[tokio::test]
async fn test_backoff_state_is_observable() {
    let server = serve(vec![Script::Close(Vec::new())]).await;
    let mut running = start(ListenerConfig {
        reconnect_delay: Duration::from_millis(500),
        ..config(&server.url)
    });

    tokio::time::timeout(WAIT, running.state.wait_for(|s| *s == ListenerState::Backoff))
        .await
        .expect("never backed off")
        .unwrap();

    assert_eq!(running.stop().await, ListenerState::Stopped);
}

#[tokio::test]
async fn test_error_status_backs_off_then_recovers() {
    let server = serve(vec![
        Script::Status(503),
        Script::Hold(vec![r#"{"message":"recovered"}"#]),
    ])
    .await;
    let mut running = start(config(&server.url));

    assert_eq!(running.next().await, "recovered");
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);

    running.stop().await;
}

#[tokio::test]
async fn test_long_message_is_truncated_before_delivery() {
    let long = format!(r#"{{"message":"{}"}}"#, "z".repeat(500));
    let long: &'static str = Box::leak(long.into_boxed_str());
    let server = serve(vec![Script::Hold(vec![long])]).await;
    let mut running = start(config(&server.url));

    let message = running.next().await;
    assert_eq!(message.chars().count(), 300);
    assert!(message.ends_with("..."));

    running.stop().await;
}

#[tokio::test]
async fn test_cancel_while_backing_off_stops_promptly() {
    // Nothing listens here, so every connect fails.
    let running = start(ListenerConfig {
        reconnect_delay: Duration::from_secs(30),
        ..config("http://127.0.0.1:1/kitchen/json")
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(running.stop().await, ListenerState::Stopped);
}

#[tokio::test]
async fn test_stream_to_printer() {
    let server = serve(vec![Script::Hold(vec![
        r#"{"event":"message","message":"Lunch Time!"}"#,
    ])])
    .await;

    let printed = Arc::new(Printed::default());
    let connection = PrinterConnection::new(
        Box::new(MemoryOpener(printed.clone())),
        LayoutRenderer::builtin(LayoutConfig::default()),
        PrintOptions::default(),
        PauseFlag::new(),
    );
    let sink = PrinterSink::new(Arc::new(Mutex::new(connection)));
    let listener = StreamListener::new(config(&server.url), Arc::new(sink)).unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    let deadline = tokio::time::Instant::now() + WAIT;
    while printed.jobs.lock().unwrap().len() < 4 {
        assert!(tokio::time::Instant::now() < deadline, "receipt never printed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    let jobs = printed.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 4);
    assert_eq!(jobs[0], vec![0x1B, 0x40]);
    assert_eq!(&jobs[1][0..3], &[0x1D, 0x76, 0x30]);
    assert_eq!(jobs[3], vec![0x1D, 0x56, 0x00]);
}

#[tokio::test]
async fn test_stream_to_paused_printer_drops_message() {
    let server = serve(vec![Script::Hold(vec![
        r#"{"message":"first"}"#,
        r#"{"message":"second"}"#,
    ])])
    .await;

    let printed = Arc::new(Printed::default());
    let pause = PauseFlag::new();
    pause.set(true);
    let connection = PrinterConnection::new(
        Box::new(MemoryOpener(printed.clone())),
        LayoutRenderer::builtin(LayoutConfig::default()),
        PrintOptions::default(),
        pause,
    );
    let connection = Arc::new(Mutex::new(connection));

    // Forward to the printer and report each delivery.
    struct Tap(PrinterSink, mpsc::UnboundedSender<String>);

    #[async_trait]
    impl MessageSink for Tap {
        async fn deliver(&self, message: &str) {
            self.0.deliver(message).await;
            let _ = self.1.send(message.to_string());
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Tap(PrinterSink::new(connection.clone()), tx);
    let listener = StreamListener::new(config(&server.url), Arc::new(sink)).unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    for expected in ["first", "second"] {
        let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, expected);
    }

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(printed.jobs.lock().unwrap().is_empty());
}
