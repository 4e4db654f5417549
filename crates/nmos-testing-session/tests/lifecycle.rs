//! Lifecycle script tests for nmos-testing-session.
// crates/nmos-testing-session/tests/lifecycle.rs
// ============================================================================
// Module: Session Lifecycle Tests
// Description: Run the phased script against a scripted in-process IUT.
// Purpose: Cover every phase's failure message and cleanup on early exits.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use nmos_testing_core::BoundaryStrictness;
use nmos_testing_core::Clock;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::SessionEnvelope;
use nmos_testing_core::SessionEvent;
use nmos_testing_core::SessionKey;
use nmos_testing_core::SessionLink;
use nmos_testing_core::TaiTimestamp;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::TransportError;
use nmos_testing_core::Verdict;
use nmos_testing_session::NO_ENDPOINTS_MESSAGE;
use nmos_testing_session::SessionLifecycleVerifier;
use nmos_testing_session::SessionTimings;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Scripted IUT
// ============================================================================

/// Heartbeat interval used by every test.
const H: Duration = Duration::from_millis(100);

/// Lease the fake IUT grants after open or after each health command.
///
/// Sits midway between the boundary window end (`T + H` after start) and
/// the kept-alive deadline (`T + 2H`) once shifted by the command at `H`.
const LEASE: Duration = Duration::from_millis(290);

/// How the fake IUT answers a health command.
#[derive(Clone, Copy)]
enum Reply {
    /// One conforming reply.
    Valid,
    /// One reply created before the command.
    Stale,
    /// No reply.
    Silent,
    /// Two conforming replies.
    Twice,
    /// Two conforming replies, the second after [`LATE_REPLY_DELAY`].
    Late,
}

/// Gap between the two replies of [`Reply::Late`], well inside the `2H` window.
const LATE_REPLY_DELAY: Duration = Duration::from_millis(40);

/// Behaviour of every session the fake connector opens.
#[derive(Clone, Copy)]
struct Script {
    /// Refuse the handshake.
    refuse: bool,
    /// Never complete the handshake.
    hang: bool,
    /// Idle time before the IUT closes; `None` never closes.
    lease: Option<Duration>,
    /// Health reply mode.
    reply: Reply,
}

impl Script {
    const fn healthy() -> Self {
        Self {
            refuse: false,
            hang: false,
            lease: Some(LEASE),
            reply: Reply::Valid,
        }
    }
}

/// Signals sent from a link to its session thread.
enum Inbound {
    Text(String),
    Close,
}

/// Link half handed to the verifier.
struct FakeLink {
    inbox: Sender<Inbound>,
    closes: Arc<AtomicUsize>,
}

impl SessionLink for FakeLink {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.inbox
            .send(Inbound::Text(text.to_string()))
            .map_err(|_| TransportError::SessionClosed("fake session ended".to_string()))
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let _ = self.inbox.send(Inbound::Close);
    }
}

/// Connector that runs each session on its own thread.
struct FakeConnector {
    script: Script,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl SessionConnector for FakeConnector {
    fn connect(
        &self,
        _uri: &str,
        key: SessionKey,
        events: Sender<SessionEnvelope>,
    ) -> Box<dyn SessionLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (inbox, commands) = mpsc::channel();
        let script = self.script;
        thread::spawn(move || run_session(script, key, &events, &commands));
        Box::new(FakeLink {
            inbox,
            closes: Arc::clone(&self.closes),
        })
    }
}

fn run_session(
    script: Script,
    key: SessionKey,
    events: &Sender<SessionEnvelope>,
    commands: &mpsc::Receiver<Inbound>,
) {
    let emit = |event| {
        let _ = events.send(SessionEnvelope {
            session: key,
            event,
        });
    };
    if script.refuse {
        emit(SessionEvent::Errored("Connection refused".to_string()));
        return;
    }
    if script.hang {
        let _ = commands.recv();
        return;
    }
    emit(SessionEvent::Opened);
    let mut expires = script.lease.map(|lease| Instant::now() + lease);
    loop {
        let wait = expires.map_or(Duration::from_secs(5), |at| {
            at.saturating_duration_since(Instant::now())
        });
        match commands.recv_timeout(wait) {
            Ok(Inbound::Text(text)) => {
                for (index, reply) in replies(script.reply, &text).into_iter().enumerate() {
                    if index > 0 && matches!(script.reply, Reply::Late) {
                        thread::sleep(LATE_REPLY_DELAY);
                    }
                    emit(SessionEvent::Message(reply));
                }
                expires = script.lease.map(|lease| Instant::now() + lease);
            }
            Ok(Inbound::Close) | Err(RecvTimeoutError::Disconnected) => {
                emit(SessionEvent::Closed);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                if expires.is_some() {
                    emit(SessionEvent::Closed);
                    return;
                }
            }
        }
    }
}

fn replies(mode: Reply, command: &str) -> Vec<String> {
    let command: Value = serde_json::from_str(command).unwrap();
    let origin = command["timestamp"].as_str().unwrap().to_string();
    let sent: TaiTimestamp = origin.parse().unwrap();
    let creation = match mode {
        Reply::Stale => TaiTimestamp::new(sent.secs() - 1, 0).unwrap(),
        _ => TaiTimestamp::new(sent.secs() + 1, sent.nanos()).unwrap(),
    };
    let reply = json!({
        "message_type": "health",
        "timing": {
            "origin_timestamp": origin,
            "creation_timestamp": creation.to_string()
        }
    })
    .to_string();
    match mode {
        Reply::Silent => Vec::new(),
        Reply::Twice | Reply::Late => vec![reply.clone(), reply],
        Reply::Valid | Reply::Stale => vec![reply],
    }
}

/// Clock pinned to one instant.
struct FixedClock;

impl Clock for FixedClock {
    fn tai_now(&self) -> TaiTimestamp {
        TaiTimestamp::new(1_000, 250).unwrap()
    }
}

/// Records event labels.
#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl RunLog for Recorder {
    fn record(&self, event: &RunEvent) {
        self.0.lock().unwrap().push(event.event.to_string());
    }
}

fn timings(strictness: BoundaryStrictness) -> SessionTimings {
    SessionTimings {
        heartbeat_interval: H,
        heartbeat_timeout: Duration::from_millis(240),
        open_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        pre_timeout_margin: Duration::from_millis(50),
        boundary_strictness: strictness,
    }
}

fn verify(connector: &Arc<FakeConnector>, endpoints: &[&str]) -> TestOutcome {
    let endpoints: Vec<String> = endpoints.iter().map(ToString::to_string).collect();
    SessionLifecycleVerifier::new(connector.clone())
        .with_clock(Arc::new(FixedClock))
        .with_timings(timings(BoundaryStrictness::WindowEnd))
        .verify("websocket_lifecycle", &endpoints)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn conforming_iut_passes_and_logs_phases() {
    let connector = FakeConnector::new(Script::healthy());
    let recorder = Arc::new(Recorder::default());
    let endpoints: Vec<String> =
        ["ws://iut/a", "ws://iut/b", "ws://iut/a"].map(ToString::to_string).to_vec();
    let outcome = SessionLifecycleVerifier::new(connector.clone())
        .with_clock(Arc::new(FixedClock))
        .with_timings(timings(BoundaryStrictness::WindowEnd))
        .with_log(recorder.clone())
        .verify("websocket_lifecycle", &endpoints);

    assert_eq!(outcome.verdict, Verdict::Pass, "{}", outcome.message);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 4);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 4);
    let labels = recorder.0.lock().unwrap().clone();
    assert_eq!(labels.iter().filter(|label| *label == "session_phase").count(), 6);
    assert!(labels.iter().any(|label| label == "session_state"));
}

#[test]
fn every_poll_strictness_passes_conforming_iut() {
    let connector = FakeConnector::new(Script::healthy());
    let outcome = SessionLifecycleVerifier::new(connector)
        .with_clock(Arc::new(FixedClock))
        .with_timings(timings(BoundaryStrictness::EveryPoll))
        .verify("websocket_lifecycle", &["ws://iut/a".to_string()]);
    assert_eq!(outcome.verdict, Verdict::Pass, "{}", outcome.message);
}

#[test]
fn no_endpoints_is_unclear() {
    let connector = FakeConnector::new(Script::healthy());
    let outcome = verify(&connector, &[]);
    assert_eq!(outcome.verdict, Verdict::Unclear);
    assert_eq!(outcome.message, NO_ENDPOINTS_MESSAGE);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn refused_handshake_fails_and_closes_every_link() {
    let connector = FakeConnector::new(Script {
        refuse: true,
        ..Script::healthy()
    });
    let started = Instant::now();
    let outcome = verify(&connector, &["ws://iut/a"]);

    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(
        outcome.message,
        "Error opening WebSocket connection to ws://iut/a: Connection refused"
    );
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn hung_handshake_times_out() {
    let connector = FakeConnector::new(Script {
        hang: true,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(
        outcome.message,
        "Error opening WebSocket connection to ws://iut/a: Connection timeout"
    );
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
}

#[test]
fn early_close_fails_quiescent_phase() {
    let connector = FakeConnector::new(Script {
        lease: Some(Duration::from_millis(60)),
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.message, "WebSocket connection to ws://iut/a was closed too early");
}

#[test]
fn silent_iut_fails_heartbeat_phase() {
    let connector = FakeConnector::new(Script {
        reply: Reply::Silent,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert!(
        outcome.message.contains("did not respond with a health response"),
        "{}",
        outcome.message
    );
}

#[test]
fn duplicate_reply_fails_heartbeat_phase() {
    let connector = FakeConnector::new(Script {
        reply: Reply::Twice,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert!(outcome.message.contains("more than 1 message"), "{}", outcome.message);
}

#[test]
fn duplicate_reply_after_a_delay_fails_heartbeat_phase() {
    let connector = FakeConnector::new(Script {
        reply: Reply::Late,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(
        outcome.message,
        "WebSocket ws://iut/a responded with more than 1 message to the health command"
    );
}

#[test]
fn stale_creation_timestamp_fails() {
    let connector = FakeConnector::new(Script {
        reply: Reply::Stale,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(
        outcome.message,
        "WebSocket ws://iut/a health response creation_timestamp expected to be later than \
         origin, was 999:0"
    );
}

#[test]
fn session_that_never_times_out_fails_boundary_phase() {
    let connector = FakeConnector::new(Script {
        lease: None,
        ..Script::healthy()
    });
    let outcome = verify(&connector, &["ws://iut/a"]);
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(
        outcome.message,
        "WebSocket connection (no health cmd sent) to ws://iut/a was not closed after timeout"
    );
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
}
