//! Inbound poll loop — the long-lived receive state machine.
//!
//! One task, spawned once at startup, polls the backend for envelopes and
//! dispatches each through filter → normalize → forward. The loop never
//! terminates on its own: timeouts and empty polls re-poll immediately,
//! transport failures sleep with capped exponential backoff, and forward
//! failures are absorbed by the forwarder.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::envelope::{Envelope, normalize};
use crate::error::TransportError;
use crate::filter::AllowSet;
use crate::forward::InboxForwarder;
use crate::transport::{Received, Transport};

/// Retry delay after a failed receive.
///
/// Resets to the floor on any well-formed backend response (batch, 204, or
/// long-poll timeout); doubles up to the ceiling on transport errors. Owned
/// exclusively by the poll loop task — one reader, one writer, no sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            current: floor,
            floor,
            ceiling,
        }
    }

    /// Delay to sleep before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    /// Double the delay, capped at the ceiling.
    pub fn advance(&mut self) {
        self.current = (self.current * 2).min(self.ceiling);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// The inbound poll loop and its collaborators.
pub struct Poller {
    transport: Arc<dyn Transport>,
    forwarder: InboxForwarder,
    allow: AllowSet,
    receive_timeout_secs: u64,
    forward_enabled: bool,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn Transport>,
        forwarder: InboxForwarder,
        allow: AllowSet,
        receive_timeout_secs: u64,
        forward_enabled: bool,
    ) -> Self {
        Self {
            transport,
            forwarder,
            allow,
            receive_timeout_secs,
            forward_enabled,
        }
    }

    /// Run the loop until the shutdown flag is set.
    ///
    /// Every failure path returns control to the loop; nothing here can
    /// terminate it early.
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        let mut backoff = Backoff::default();

        info!(
            timeout_secs = self.receive_timeout_secs,
            inbox = self.forwarder.inbox_url(),
            "Inbound poll loop started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            match self.transport.receive(self.receive_timeout_secs).await {
                Ok(Received::NoContent) => {
                    // The backend's long-poll already bounded the wait.
                    backoff.reset();
                }
                Ok(Received::Batch(envelopes)) => {
                    self.dispatch_batch(envelopes).await;
                    backoff.reset();
                }
                Err(TransportError::Timeout) => {
                    debug!("receive long-poll expired; re-polling");
                    backoff.reset();
                }
                Err(e) => {
                    warn!(
                        backoff_secs = backoff.current().as_secs(),
                        "receive error: {e}"
                    );
                    tokio::time::sleep(backoff.current()).await;
                    backoff.advance();
                }
            }
        }

        info!("Inbound poll loop shutting down");
    }

    /// Dispatch one batch: filter → normalize → forward per envelope.
    async fn dispatch_batch(&self, envelopes: Vec<Envelope>) {
        for envelope in envelopes {
            // Envelopes without a sender or text (receipts, typing
            // indicators, reactions) are dropped without comment.
            let sender = match envelope.source() {
                Some(s) => s.to_string(),
                None => continue,
            };
            if envelope.message_text().is_none() {
                continue;
            }

            if !self.allow.is_allowed(&sender) {
                warn!("Dropping message from non-allowed sender: {sender}");
                continue;
            }

            if self.forward_enabled {
                self.forwarder.forward(&normalize(envelope)).await;
            }
        }
    }
}

static POLLER_STARTED: AtomicBool = AtomicBool::new(false);

/// Spawn the poll loop task, at most once per process.
///
/// Returns the task handle and a shutdown flag, or `None` if the loop was
/// already started by an earlier call.
pub fn spawn_poller(poller: Poller) -> Option<(JoinHandle<()>, Arc<AtomicBool>)> {
    if POLLER_STARTED.swap(true, Ordering::SeqCst) {
        warn!("Poll loop already running; ignoring duplicate start");
        return None;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = tokio::spawn(async move { poller.run(flag).await });
    Some((handle, shutdown))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::transport::{SendOutcome, Transport};

    // ── Backoff ─────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = Backoff::default();
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(b.current().as_secs());
            b.advance();
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn backoff_resets_to_floor() {
        let mut b = Backoff::default();
        for _ in 0..5 {
            b.advance();
        }
        assert_eq!(b.current(), Duration::from_secs(30));
        b.reset();
        assert_eq!(b.current(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_custom_bounds() {
        let mut b = Backoff::new(Duration::from_millis(500), Duration::from_secs(4));
        b.advance();
        assert_eq!(b.current(), Duration::from_secs(1));
        for _ in 0..5 {
            b.advance();
        }
        assert_eq!(b.current(), Duration::from_secs(4));
    }

    // ── Loop behavior against a scripted transport ──────────────────

    /// Transport stub that replays a script, then reports NoContent.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Received, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Received, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn receive(&self, _timeout_secs: u64) -> Result<Received, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Received::NoContent))
        }

        async fn send(
            &self,
            _to: &str,
            _message: &str,
            _attachments: Option<&[String]>,
        ) -> Result<SendOutcome, TransportError> {
            unimplemented!("not used in poller tests")
        }
    }

    fn poller_with(transport: Arc<ScriptedTransport>) -> Poller {
        // Dead-port forwarder: forward failures are swallowed, which is
        // exactly the behavior under test here.
        Poller::new(
            transport,
            InboxForwarder::new("http://127.0.0.1:9/inbox", SecretString::from("tok")),
            AllowSet::default(),
            1,
            true,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_continues_after_batch_and_no_content() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(Received::Batch(vec![
            Envelope::new(json!({"source": "+1999", "dataMessage": {"message": "hi"}})),
        ]))]));

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(poller_with(Arc::clone(&transport)).run(Arc::clone(&shutdown)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();

        // Batch processed, then the loop kept polling through NoContent.
        assert!(transport.calls() >= 2, "calls: {}", transport.calls());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_re_polls_immediately() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]));

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(poller_with(Arc::clone(&transport)).run(Arc::clone(&shutdown)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();

        // No backoff sleep anywhere on this path.
        assert!(transport.calls() >= 3, "calls: {}", transport.calls());
    }

    #[tokio::test]
    async fn transport_error_sleeps_before_retry() {
        let script = (0..50)
            .map(|_| {
                Err(TransportError::Status {
                    status: 500,
                    body: String::new(),
                })
            })
            .collect();
        let transport = Arc::new(ScriptedTransport::new(script));

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(poller_with(Arc::clone(&transport)).run(Arc::clone(&shutdown)));

        // First attempt is immediate; the second waits a full 1s backoff,
        // so a hot loop would show dozens of calls here.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let calls = transport.calls();
        assert!((1..=2).contains(&calls), "calls: {calls}");

        shutdown.store(true, Ordering::Relaxed);
        handle.abort();
    }

    // ── Startup guard ───────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_poller_starts_exactly_once() {
        let first = spawn_poller(poller_with(Arc::new(ScriptedTransport::new(vec![]))));
        let second = spawn_poller(poller_with(Arc::new(ScriptedTransport::new(vec![]))));

        assert!(first.is_some());
        assert!(second.is_none());

        let (handle, shutdown) = first.unwrap();
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();
    }
}
