// crates/nmos-testing-session/src/verifier.rs
// ============================================================================
// Module: Session Lifecycle Verifier
// Description: Phased heartbeat script over concurrent persistent sessions.
// Purpose: Produce one outcome for the timing contract of a set of endpoints.
// Dependencies: nmos-testing-core, serde_json
// ============================================================================

//! ## Overview
//! Every endpoint gets two sessions, one per [`Cohort`]. All deadlines are
//! offsets from the moment the sessions were started:
//!
//! | Phase | Ends at | Asserts |
//! |-------|---------|---------|
//! | open | `open_timeout` | every session is open |
//! | quiescent | `H` | every session stays open |
//! | heartbeat | `2H` | one valid health reply per kept-alive session |
//! | pre-timeout | `T - margin` | every session stays open |
//! | boundary | `T + H` | kept-alive open; not-kept-alive closed at the end |
//! | confirmation | `T + 2H` | kept-alive closed |
//!
//! Waits poll the shared event channel with a bounded timeout, so a silent
//! IUT still ends the script on time. Links are closed on every exit path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use nmos_testing_core::BoundaryStrictness;
use nmos_testing_core::Clock;
use nmos_testing_core::LogLevel;
use nmos_testing_core::NoopRunLog;
use nmos_testing_core::RunEvent;
use nmos_testing_core::RunLog;
use nmos_testing_core::SessionConnector;
use nmos_testing_core::SessionEnvelope;
use nmos_testing_core::SessionKey;
use nmos_testing_core::SystemClock;
use nmos_testing_core::TestOutcome;
use nmos_testing_core::TransportError;

use crate::health::HealthCommand;
use crate::health::check_health_reply;
use crate::session::Cohort;
use crate::session::ConnectionSession;
use crate::session::LifecycleState;
use crate::timings::SessionTimings;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message for a run with no endpoints to connect to.
pub const NO_ENDPOINTS_MESSAGE: &str = "Not tested. No resources found.";

/// Component label for run events.
const COMPONENT: &str = "session";

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Drives the lifecycle script against a set of endpoints.
pub struct SessionLifecycleVerifier {
    /// Opens sessions.
    connector: Arc<dyn SessionConnector>,
    /// Stamps health commands.
    clock: Arc<dyn Clock>,
    /// Phase durations.
    timings: SessionTimings,
    /// Run event sink.
    log: Arc<dyn RunLog>,
}

impl SessionLifecycleVerifier {
    /// Creates a verifier with protocol-default timings and the system clock.
    #[must_use]
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            clock: Arc::new(SystemClock),
            timings: SessionTimings::default(),
            log: Arc::new(NoopRunLog),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the phase durations.
    #[must_use]
    pub const fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Attaches a run log.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Returns the phase durations.
    #[must_use]
    pub const fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    /// Runs the script and grades it as one outcome named `name`.
    ///
    /// Duplicate endpoints are connected once.
    #[must_use]
    pub fn verify(&self, name: &str, endpoints: &[String]) -> TestOutcome {
        let mut unique: Vec<&str> = endpoints.iter().map(String::as_str).collect();
        unique.sort_unstable();
        unique.dedup();
        if unique.is_empty() {
            return TestOutcome::unclear(name, NO_ENDPOINTS_MESSAGE);
        }
        let mut run = SessionRun::start(self, &unique);
        let result = run.script();
        drop(run);
        match result {
            Ok(()) => TestOutcome::pass(name),
            Err(message) => {
                self.log.record(&RunEvent::new(
                    "session_failed",
                    LogLevel::Warn,
                    COMPONENT,
                    message.clone(),
                ));
                TestOutcome::fail(name, message)
            }
        }
    }
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// One execution of the script. Dropping it closes every link.
struct SessionRun<'a> {
    /// Owning verifier.
    verifier: &'a SessionLifecycleVerifier,
    /// Sessions indexed by [`SessionKey`].
    sessions: Vec<ConnectionSession>,
    /// Signals from every session.
    events: Receiver<SessionEnvelope>,
    /// Held so the channel never reports disconnection mid-script.
    _sender: Sender<SessionEnvelope>,
    /// Origin of every phase deadline.
    started: Instant,
}

impl<'a> SessionRun<'a> {
    /// Starts both cohorts against every endpoint.
    fn start(verifier: &'a SessionLifecycleVerifier, endpoints: &[&str]) -> Self {
        let (sender, events) = mpsc::channel();
        let mut sessions = Vec::with_capacity(endpoints.len() * 2);
        for cohort in [Cohort::NotKeptAlive, Cohort::KeptAlive] {
            for uri in endpoints {
                let key = SessionKey(sessions.len());
                let link = verifier.connector.connect(uri, key, sender.clone());
                sessions.push(ConnectionSession::new(*uri, cohort, link));
            }
        }
        Self {
            verifier,
            sessions,
            events,
            _sender: sender,
            started: Instant::now(),
        }
    }

    /// Runs every phase in order, stopping at the first violation.
    fn script(&mut self) -> Result<(), String> {
        let timings = self.verifier.timings;
        self.open_phase(timings.open_timeout)?;
        self.quiescent_phase(timings.quiescent_end())?;
        self.heartbeat_phase(timings.reply_deadline())?;
        self.pre_timeout_phase(timings.pre_timeout_end())?;
        self.boundary_phase(timings.boundary_end(), timings.boundary_strictness)?;
        self.confirmation_phase(timings.confirmation_end())
    }

    /// Waits for every session to open.
    fn open_phase(&mut self, until: Duration) -> Result<(), String> {
        self.enter("open", until);
        self.pump_until(until, |sessions| {
            if let Some(session) = sessions.iter().find(|session| session.state().is_terminal()) {
                return Err(open_failure(session));
            }
            Ok(sessions.iter().all(ConnectionSession::is_open))
        })?;
        match self.sessions.iter().find(|session| !session.is_open()) {
            Some(session) if session.state() == &LifecycleState::Connecting => Err(format!(
                "Error opening WebSocket connection to {}: {}",
                session.uri(),
                TransportError::Timeout
            )),
            Some(session) => Err(open_failure(session)),
            None => Ok(()),
        }
    }

    /// Requires every session to stay open until the first heartbeat is due.
    fn quiescent_phase(&mut self, until: Duration) -> Result<(), String> {
        self.enter("quiescent", until);
        self.pump_until(until, |sessions| match sessions.iter().find(|s| !s.is_open()) {
            Some(session) => {
                Err(format!("WebSocket connection to {} was closed too early", session.uri()))
            }
            None => Ok(false),
        })?;
        Ok(())
    }

    /// Sends one health command per kept-alive session and grades the replies.
    fn heartbeat_phase(&mut self, until: Duration) -> Result<(), String> {
        self.enter("heartbeat", until);
        self.drain();
        let sent = self.verifier.clock.tai_now();
        let command =
            serde_json::to_string(&HealthCommand::new(sent)).map_err(|err| err.to_string())?;
        for session in self.kept_alive_mut() {
            session.clear_messages();
            session.link().send_text(&command).map_err(|err| {
                format!("WebSocket {} health command could not be sent: {err}", session.uri())
            })?;
        }
        let replied = self.pump_until(until, |sessions| {
            Ok(sessions
                .iter()
                .filter(|session| session.cohort() == Cohort::KeptAlive)
                .all(|session| !session.messages().is_empty()))
        })?;
        // A reply window holds exactly one message, so keep listening to its end.
        if replied {
            self.pump_until(until, |sessions| {
                Ok(sessions
                    .iter()
                    .filter(|session| session.cohort() == Cohort::KeptAlive)
                    .any(|session| session.messages().len() > 1))
            })?;
        }
        for session in self.sessions.iter().filter(|s| s.cohort() == Cohort::KeptAlive) {
            let uri = session.uri();
            match session.messages() {
                [] => {
                    return Err(format!(
                        "WebSocket {uri} did not respond with a health response to the health \
                         command"
                    ));
                }
                [reply] => check_health_reply(reply, sent)
                    .map_err(|err| format!("WebSocket {uri} {err}"))?,
                _ => {
                    return Err(format!(
                        "WebSocket {uri} responded with more than 1 message to the health command"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Requires every session to stay open until shortly before the timeout.
    fn pre_timeout_phase(&mut self, until: Duration) -> Result<(), String> {
        self.enter("pre_timeout", until);
        self.pump_until(until, |sessions| match sessions.iter().find(|s| !s.is_open()) {
            Some(session) => Err(cohort_message(session, "was closed too early")),
            None => Ok(false),
        })?;
        Ok(())
    }

    /// Requires the kept-alive cohort to outlive the timeout and the other
    /// cohort to be gone once the window ends.
    fn boundary_phase(
        &mut self,
        until: Duration,
        strictness: BoundaryStrictness,
    ) -> Result<(), String> {
        self.enter("boundary", until);
        self.pump_until(until, |sessions| match strictness {
            BoundaryStrictness::EveryPoll => kept_alive_open(sessions).map(|()| false),
            BoundaryStrictness::WindowEnd => Ok(false),
        })?;
        kept_alive_open(&self.sessions)?;
        match self
            .sessions
            .iter()
            .find(|session| session.cohort() == Cohort::NotKeptAlive && session.is_open())
        {
            Some(session) => Err(cohort_message(session, "was not closed after timeout")),
            None => Ok(()),
        }
    }

    /// Waits for the kept-alive cohort to close once its lease runs out.
    fn confirmation_phase(&mut self, until: Duration) -> Result<(), String> {
        self.enter("confirmation", until);
        let closed = self.pump_until(until, |sessions| {
            Ok(sessions.iter().all(|session| !session.is_open()))
        })?;
        if closed {
            return Ok(());
        }
        match self.sessions.iter().find(|session| session.is_open()) {
            Some(session) => Err(cohort_message(session, "was not closed after timeout")),
            None => Ok(()),
        }
    }

    /// Applies signals until `check` reports done or the offset `until` passes.
    ///
    /// Returns `Ok(true)` when `check` finished early.
    fn pump_until<F>(&mut self, until: Duration, mut check: F) -> Result<bool, String>
    where
        F: FnMut(&[ConnectionSession]) -> Result<bool, String>,
    {
        let deadline = self.started + until;
        loop {
            self.drain();
            if check(&self.sessions)? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let wait = (deadline - now).min(self.verifier.timings.poll_interval);
            match self.events.recv_timeout(wait) {
                Ok(envelope) => self.apply(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(wait),
            }
        }
    }

    /// Applies every signal already queued.
    fn drain(&mut self) {
        while let Ok(envelope) = self.events.try_recv() {
            self.apply(envelope);
        }
    }

    /// Routes one signal to its session.
    fn apply(&mut self, envelope: SessionEnvelope) {
        let index = envelope.session.0;
        let Some(session) = self.sessions.get_mut(index) else {
            return;
        };
        if !session.apply(envelope.event) {
            return;
        }
        let message = match session.state() {
            LifecycleState::Errored(detail) => format!("{}: {detail}", session.state()),
            state => state.to_string(),
        };
        self.verifier.log.record(
            &RunEvent::new("session_state", LogLevel::Debug, COMPONENT, message)
                .with_url(session.uri())
                .with_session(index),
        );
    }

    /// Logs a phase boundary.
    fn enter(&self, phase: &str, until: Duration) {
        self.verifier.log.record(&RunEvent::new(
            "session_phase",
            LogLevel::Info,
            COMPONENT,
            format!("{phase} until +{}ms", until.as_millis()),
        ));
    }

    /// Returns the kept-alive sessions.
    fn kept_alive_mut(&mut self) -> impl Iterator<Item = &mut ConnectionSession> {
        self.sessions.iter_mut().filter(|session| session.cohort() == Cohort::KeptAlive)
    }
}

impl Drop for SessionRun<'_> {
    fn drop(&mut self) {
        for session in &self.sessions {
            session.link().close();
        }
    }
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Failure text for a session that ended before every session was open.
fn open_failure(session: &ConnectionSession) -> String {
    match session.state() {
        LifecycleState::Errored(detail) => {
            format!("Error opening WebSocket connection to {}: {detail}", session.uri())
        }
        LifecycleState::Closed => {
            format!("WebSocket connection to {} was closed too early", session.uri())
        }
        _ => format!("Error opening WebSocket connection to {}", session.uri()),
    }
}

/// Failure text naming the session's cohort.
fn cohort_message(session: &ConnectionSession, problem: &str) -> String {
    let cohort = match session.cohort() {
        Cohort::KeptAlive => "health cmd sent",
        Cohort::NotKeptAlive => "no health cmd sent",
    };
    format!("WebSocket connection ({cohort}) to {} {problem}", session.uri())
}

/// Fails when any kept-alive session is no longer open.
fn kept_alive_open(sessions: &[ConnectionSession]) -> Result<(), String> {
    match sessions
        .iter()
        .find(|session| session.cohort() == Cohort::KeptAlive && !session.is_open())
    {
        Some(session) => Err(cohort_message(session, "was closed too early")),
        None => Ok(()),
    }
}
