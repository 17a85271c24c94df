//! Step lifecycle between the host loop and the external driver.
//!
//! One lock guards everything the two threads share: lifecycle state, the
//! step barrier, the intel mask, the domain managers and the send half of the
//! connection. The loop thread holds it while it bundles, sends and arms a
//! step; the receive thread holds it while it decodes, dispatches and
//! releases. Host code that touches the domain between steps goes through
//! [`Bridge::with_domain`], which takes the same lock.

use std::fmt;
use std::net::SocketAddr;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bridge_runtime::{
    BridgeRequest, BridgeResponse, IntelEvent, IntelMask, Notification, NotificationKind,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::barrier::{BarrierWait, StepBarrier, WaitOutcome};
use crate::config::{BridgeConfig, ConfigError, DriverLaunch, EarlyReplyPolicy};
use crate::dispatch::dispatch;
use crate::domain::Domain;
use crate::error::{BridgeError, TransportError};
use crate::intel::bundle;
use crate::metrics::BridgeMetrics;
use crate::network::{spawn_driver, DriverListener, FrameWriter, Inbound};

const DRIVER_EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    AwaitingAck,
    Ended,
    Failed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::AwaitingAck => "awaiting_ack",
            SessionState::Ended => "ended",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What the host loop should do after an acknowledged notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The driver asked for a restart; call [`Bridge::restart`].
    RestartRequested,
}

struct Core {
    state: SessionState,
    barrier: StepBarrier,
    mask: IntelMask,
    domain: Domain,
    writer: Option<FrameWriter>,
    /// At most one reply held for the next step under [`EarlyReplyPolicy::Buffer`].
    early: Option<BridgeRequest>,
    policy: EarlyReplyPolicy,
    raw_reply_timeout: Duration,
    restart_requested: bool,
    failure: Option<String>,
    /// Failure raised on the receive thread, handed to the next lifecycle call.
    pending_error: Option<BridgeError>,
    metrics: BridgeMetrics,
}

impl Core {
    fn fail(&mut self, cause: String) {
        error!(target: "bridge::session", state = %self.state, %cause, "session.failed");
        self.state = SessionState::Failed;
        self.failure = Some(cause);
        self.barrier.disarm();
        self.early = None;
    }

    fn fail_with(&mut self, err: BridgeError) {
        self.fail(err.to_string());
        self.pending_error = Some(err);
    }

    fn take_failure(&mut self) -> BridgeError {
        self.pending_error.take().unwrap_or_else(|| {
            BridgeError::SessionFailed(
                self.failure
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            )
        })
    }

    fn ensure_live(&mut self, operation: &'static str) -> Result<(), BridgeError> {
        match self.state {
            SessionState::Failed => Err(self.take_failure()),
            SessionState::Closed => Err(BridgeError::InvalidLifecycle {
                operation,
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    fn send(&mut self, response: &BridgeResponse) -> Result<(), BridgeError> {
        let bytes = response.encode_to_vec()?;
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer.send(&bytes)?;
        Ok(())
    }

    fn on_request(&mut self, request: BridgeRequest) -> Result<(), BridgeError> {
        let Some(armed) = self.barrier.armed_generation() else {
            self.hold_early(request);
            return Ok(());
        };
        if let Some(ack_step) = request.ack_step {
            if ack_step != armed {
                self.metrics.replies_rejected += 1;
                warn!(
                    target: "bridge::session",
                    ack_step,
                    armed,
                    "reply.rejected=stale_step"
                );
                return Ok(());
            }
        }
        self.acknowledge(request, armed)
    }

    fn hold_early(&mut self, request: BridgeRequest) {
        let next = self.barrier.last_generation() + 1;
        if let Some(ack_step) = request.ack_step {
            if ack_step != next {
                self.metrics.replies_rejected += 1;
                warn!(
                    target: "bridge::session",
                    ack_step,
                    next,
                    "reply.rejected=stale_step"
                );
                return;
            }
        }
        match self.policy {
            EarlyReplyPolicy::Drop => {
                self.metrics.replies_rejected += 1;
                debug!(target: "bridge::session", next, "reply.rejected=early_reply");
            }
            EarlyReplyPolicy::Buffer if self.early.is_some() => {
                self.metrics.replies_rejected += 1;
                warn!(target: "bridge::session", next, "reply.rejected=already_buffered");
            }
            EarlyReplyPolicy::Buffer => {
                self.metrics.replies_buffered += 1;
                debug!(target: "bridge::session", next, "reply.buffered");
                self.early = Some(request);
            }
        }
    }

    /// Apply `request` as the answer to `step` and release the barrier.
    fn acknowledge(&mut self, request: BridgeRequest, step: u64) -> Result<(), BridgeError> {
        if let Some(mask) = request.intel {
            if mask != self.mask {
                debug!(target: "bridge::session", step, mask = ?mask, "mask.updated");
            }
            self.mask = mask;
        }
        if request.restart {
            self.restart_requested = true;
            info!(target: "bridge::session", step, "restart.requested");
        }

        let report = dispatch(&mut self.domain, &request, self.raw_reply_timeout);
        self.metrics.record_dispatch(&report);
        if let Some(payload) = report.raw_response {
            self.send(&BridgeResponse::raw(payload))?;
        }

        if let Err(refused) = self.barrier.release(step) {
            warn!(target: "bridge::session", step, ?refused, "barrier.release_refused");
        }
        debug!(
            target: "bridge::session",
            step,
            applied = report.applied,
            skipped = report.skipped,
            "step.acknowledged"
        );
        Ok(())
    }
}

/// Receive-thread entry point. Returns whether to keep reading.
fn handle_inbound(core: &Mutex<Core>, inbound: Inbound) -> bool {
    let mut guard = core.lock();
    let core = &mut *guard;
    if matches!(core.state, SessionState::Failed | SessionState::Closed) {
        if matches!(inbound, Inbound::Frame(_)) {
            debug!(target: "bridge::session", state = %core.state, "reply.ignored");
        }
        return false;
    }

    let result = match inbound {
        Inbound::Frame(bytes) => BridgeRequest::decode(&bytes)
            .map_err(BridgeError::from)
            .and_then(|request| core.on_request(request)),
        Inbound::Closed => Err(TransportError::Closed.into()),
        Inbound::Failed(err) => Err(err.into()),
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            core.fail_with(err);
            false
        }
    }
}

/// The bridge between a host control loop and one external driver process.
pub struct Bridge {
    core: Arc<Mutex<Core>>,
    config: BridgeConfig,
    reader: Option<JoinHandle<()>>,
    driver: Option<Child>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, domain: Domain) -> Result<Self, BridgeError> {
        let mask = config.initial_mask()?;
        let core = Core {
            state: SessionState::Uninitialized,
            barrier: StepBarrier::new(),
            mask,
            domain,
            writer: None,
            early: None,
            policy: config.early_reply_policy(),
            raw_reply_timeout: config.raw_reply_timeout(),
            restart_requested: false,
            failure: None,
            pending_error: None,
            metrics: BridgeMetrics::default(),
        };
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            config,
            reader: None,
            driver: None,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    pub fn mask(&self) -> IntelMask {
        self.core.lock().mask
    }

    pub fn metrics(&self) -> BridgeMetrics {
        self.core.lock().metrics
    }

    pub fn restart_requested(&self) -> bool {
        self.core.lock().restart_requested
    }

    /// Run `f` against the domain under the session lock.
    ///
    /// The receive thread applies driver commands under the same lock, so
    /// host-side reads and writes (including its own observation requests on
    /// the raw channel) never interleave with a dispatch.
    pub fn with_domain<R>(&self, f: impl FnOnce(&mut Domain) -> R) -> R {
        let mut core = self.core.lock();
        f(&mut core.domain)
    }

    /// Queue a domain event for the next bundle. Returns whether it was accepted.
    pub fn record_event(&self, event: IntelEvent) -> bool {
        self.core.lock().domain.events.record(event)
    }

    fn fail_now(&self, err: BridgeError) -> BridgeError {
        self.core.lock().fail(err.to_string());
        err
    }

    pub fn open_endpoint(&self) -> Result<DriverListener, BridgeError> {
        DriverListener::open(self.config.bind_host()).map_err(|err| self.fail_now(err.into()))
    }

    /// Wait for the driver on `listener` and start receiving from it.
    pub fn accept(&mut self, listener: DriverListener) -> Result<SocketAddr, BridgeError> {
        {
            let mut core = self.core.lock();
            core.ensure_live("accept")?;
            if core.state != SessionState::Uninitialized || core.writer.is_some() {
                return Err(BridgeError::InvalidLifecycle {
                    operation: "accept",
                    state: core.state,
                });
            }
        }

        let conn = listener
            .accept(self.config.accept_timeout())
            .map_err(|err| self.fail_now(err.into()))?;
        let peer = conn.peer_addr();
        let writer = conn.writer().map_err(|err| self.fail_now(err.into()))?;
        self.core.lock().writer = Some(writer);

        let core = Arc::clone(&self.core);
        let reader = conn
            .spawn_reader(move |inbound| handle_inbound(&core, inbound))
            .map_err(|err| self.fail_now(TransportError::Receive(err).into()))?;
        self.reader = Some(reader);
        Ok(peer)
    }

    /// Bind, start `launch` with the endpoint address, and wait for it to connect.
    pub fn launch(&mut self, launch: &DriverLaunch) -> Result<SocketAddr, BridgeError> {
        let listener = self.open_endpoint()?;
        let addr = listener.local_addr();
        let child = spawn_driver(launch, addr).map_err(|err| self.fail_now(err.into()))?;
        self.driver = Some(child);
        self.accept(listener)?;
        Ok(addr)
    }

    /// [`Bridge::launch`] with the driver named in the config.
    pub fn launch_configured(&mut self) -> Result<SocketAddr, BridgeError> {
        let launch = self
            .config
            .driver()
            .cloned()
            .ok_or(ConfigError::MissingDriver)?;
        self.launch(&launch)
    }

    pub fn initialize(&self) -> Result<(), BridgeError> {
        self.notify(
            NotificationKind::Initialize,
            &[SessionState::Uninitialized],
            SessionState::Initializing,
        )
        .map(|_| ())
    }

    pub fn game_start(&self) -> Result<StepOutcome, BridgeError> {
        self.notify(
            NotificationKind::GameStart,
            &[SessionState::Initializing],
            SessionState::Ready,
        )
    }

    pub fn step(&self) -> Result<StepOutcome, BridgeError> {
        self.notify(
            NotificationKind::GameStep,
            &[SessionState::Ready],
            SessionState::Ready,
        )
    }

    pub fn game_ended(&self) -> Result<StepOutcome, BridgeError> {
        self.notify(
            NotificationKind::GameEnded,
            &[SessionState::Ready],
            SessionState::Ended,
        )
    }

    /// Recycle the session to `Initializing` over the same driver connection.
    pub fn restart(&self) -> Result<(), BridgeError> {
        self.notify(
            NotificationKind::Restart,
            &[SessionState::Ready, SessionState::Ended],
            SessionState::Initializing,
        )
        .map(|_| ())
    }

    fn notify(
        &self,
        kind: NotificationKind,
        allowed: &[SessionState],
        next: SessionState,
    ) -> Result<StepOutcome, BridgeError> {
        let operation = kind.as_str();
        let wait = {
            let mut guard = self.core.lock();
            let core = &mut *guard;
            core.ensure_live(operation)?;
            if let Some(pending) = core.barrier.armed_generation() {
                let err = BridgeError::BarrierAlreadyArmed { pending };
                core.fail(err.to_string());
                return Err(err);
            }
            if !allowed.contains(&core.state) {
                return Err(BridgeError::InvalidLifecycle {
                    operation,
                    state: core.state,
                });
            }
            if core.writer.is_none() {
                return Err(TransportError::NotConnected.into());
            }

            match kind {
                NotificationKind::GameStart => core.domain.events.subscribe(),
                NotificationKind::Restart => {
                    core.domain.events.unsubscribe();
                    core.restart_requested = false;
                    core.early = None;
                }
                _ => {}
            }

            let wait = core
                .barrier
                .arm()
                .map_err(|pending| BridgeError::BarrierAlreadyArmed { pending })?;
            let step = wait.generation();

            let intel = kind.carries_intel().then(|| bundle(&mut core.domain, core.mask));
            if let Some(intel) = &intel {
                core.metrics.events_delivered += intel.events.len() as u64;
                debug!(
                    target: "bridge::session",
                    step,
                    kind = operation,
                    categories = ?intel.populated(),
                    digest = ?intel.digest().ok(),
                    "intel.bundled"
                );
            }

            let response = BridgeResponse::notify(Notification::new(kind, step), intel);
            if let Err(err) = core.send(&response) {
                core.fail(err.to_string());
                return Err(err);
            }
            core.state = SessionState::AwaitingAck;

            if let Some(request) = core.early.take() {
                if request.ack_step.is_some_and(|ack_step| ack_step != step) {
                    core.metrics.replies_rejected += 1;
                    warn!(
                        target: "bridge::session",
                        step,
                        ack_step = ?request.ack_step,
                        "reply.rejected=stale_step"
                    );
                } else {
                    debug!(target: "bridge::session", step, "reply.applied=buffered");
                    if let Err(err) = core.acknowledge(request, step) {
                        core.fail(err.to_string());
                        return Err(err);
                    }
                }
            }
            wait
        };

        self.await_ack(kind, wait, next)
    }

    fn await_ack(
        &self,
        kind: NotificationKind,
        wait: BarrierWait,
        next: SessionState,
    ) -> Result<StepOutcome, BridgeError> {
        let started = Instant::now();
        let outcome = wait.wait(self.config.step_timeout());

        let mut guard = self.core.lock();
        let core = &mut *guard;
        let released = match outcome {
            WaitOutcome::Released => true,
            // A release that landed between the timeout and taking the lock still counts.
            WaitOutcome::TimedOut => wait.try_released(),
            WaitOutcome::Abandoned => false,
        };

        if released {
            if core.state == SessionState::AwaitingAck {
                core.state = next;
            }
            if kind == NotificationKind::GameStep {
                core.metrics.steps_completed += 1;
            } else {
                info!(
                    target: "bridge::session",
                    notification = kind.as_str(),
                    state = %core.state,
                    "session.transition"
                );
            }
            return Ok(if core.restart_requested {
                StepOutcome::RestartRequested
            } else {
                StepOutcome::Continue
            });
        }

        if core.state == SessionState::Failed {
            return Err(core.take_failure());
        }
        if core.state == SessionState::Closed {
            return Err(BridgeError::InvalidLifecycle {
                operation: kind.as_str(),
                state: core.state,
            });
        }
        let err = BridgeError::BarrierTimeout {
            step: wait.generation(),
            waited: started.elapsed(),
        };
        core.fail(err.to_string());
        Err(err)
    }

    /// Close the connection, stop the receive thread and reap the driver process.
    pub fn shutdown(&mut self) -> Option<ExitStatus> {
        {
            let mut core = self.core.lock();
            if core.state != SessionState::Closed {
                info!(target: "bridge::session", state = %core.state, "session.closing");
            }
            core.barrier.disarm();
            core.early = None;
            if let Some(writer) = core.writer.take() {
                writer.close();
            }
            core.state = SessionState::Closed;
        }

        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!(target: "bridge::session", "receive.thread_panicked");
            }
        }
        self.driver.take().and_then(reap_driver)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reap_driver(mut child: Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + DRIVER_EXIT_GRACE;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(target: "bridge::transport", pid = child.id(), %status, "driver.exited");
                return Some(status);
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) => break,
            Err(err) => {
                warn!(target: "bridge::transport", error = %err, "driver.wait_failed");
                break;
            }
        }
    }

    warn!(target: "bridge::transport", pid = child.id(), "driver.killed");
    if let Err(err) = child.kill() {
        warn!(target: "bridge::transport", error = %err, "driver.kill_failed");
    }
    match child.wait() {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(target: "bridge::transport", error = %err, "driver.wait_failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DriverConnection;
    use crate::testing::{recording_domain, Journal};
    use bridge_runtime::{Actor, CombatCommand, Point2D, UnitTag};

    fn bridge(config: BridgeConfig) -> (Bridge, Journal) {
        let journal = Journal::default();
        let bridge = Bridge::new(config, recording_domain(&[1], &journal)).expect("bridge");
        (bridge, journal)
    }

    /// Connect a driver thread running `script` over each received notification.
    fn connect<F>(bridge: &mut Bridge, mut script: F) -> JoinHandle<()>
    where
        F: FnMut(&mut DriverConnection, BridgeResponse) -> bool + Send + 'static,
    {
        let listener = bridge.open_endpoint().expect("bind");
        let addr = listener.local_addr();
        let driver = thread::spawn(move || {
            let mut conn = DriverConnection::connect(addr).expect("connect");
            while let Ok(Some(frame)) = conn.recv() {
                let response = BridgeResponse::decode(&frame).expect("decode");
                if !script(&mut conn, response) {
                    break;
                }
            }
        });
        bridge.accept(listener).expect("accept");
        driver
    }

    fn ack(conn: &mut DriverConnection, response: &BridgeResponse) {
        if let Some(notification) = response.notification {
            let request = BridgeRequest::acknowledge(notification.step);
            conn.send(&request.encode_to_vec().unwrap()).unwrap();
        }
    }

    #[test]
    fn lifecycle_walks_through_each_state() {
        let (mut bridge, _) = bridge(BridgeConfig::default());
        let driver = connect(&mut bridge, |conn, response| {
            ack(conn, &response);
            true
        });

        assert_eq!(bridge.state(), SessionState::Uninitialized);
        bridge.initialize().expect("initialize");
        assert_eq!(bridge.state(), SessionState::Initializing);
        assert_eq!(bridge.game_start().expect("start"), StepOutcome::Continue);
        assert_eq!(bridge.state(), SessionState::Ready);
        bridge.step().expect("step");
        bridge.step().expect("step");
        bridge.game_ended().expect("end");
        assert_eq!(bridge.state(), SessionState::Ended);
        assert_eq!(bridge.metrics().steps_completed, 2);

        bridge.shutdown();
        assert_eq!(bridge.state(), SessionState::Closed);
        driver.join().unwrap();
    }

    #[test]
    fn out_of_order_call_is_rejected_without_failing() {
        let (mut bridge, _) = bridge(BridgeConfig::default());
        let driver = connect(&mut bridge, |conn, response| {
            ack(conn, &response);
            true
        });

        let err = bridge.step().expect_err("step before start");
        assert!(matches!(
            err,
            BridgeError::InvalidLifecycle {
                operation: "game_step",
                state: SessionState::Uninitialized
            }
        ));
        bridge.initialize().expect("still usable");

        bridge.shutdown();
        driver.join().unwrap();
    }

    #[test]
    fn commands_apply_before_step_returns() {
        let (mut bridge, journal) = bridge(BridgeConfig::default());
        let driver = connect(&mut bridge, |conn, response| {
            let Some(notification) = response.notification else {
                return true;
            };
            let mut request = BridgeRequest::acknowledge(notification.step);
            if notification.kind == NotificationKind::GameStep {
                request.combat.push(CombatCommand::Move {
                    actor: Actor::Unit(UnitTag(1)),
                    point: Point2D::new(8.0, 9.0),
                    queue: false,
                });
            }
            conn.send(&request.encode_to_vec().unwrap()).unwrap();
            true
        });

        bridge.initialize().unwrap();
        bridge.game_start().unwrap();
        bridge.step().unwrap();
        assert_eq!(journal.entries(), vec!["move 1 @8,9"]);
        assert_eq!(bridge.metrics().commands_applied, 1);

        bridge.shutdown();
        driver.join().unwrap();
    }

    #[test]
    fn silent_driver_times_out_the_step() {
        let config = BridgeConfig::default().with_step_timeout(Duration::from_millis(100));
        let (mut bridge, _) = bridge(config);
        let driver = connect(&mut bridge, |_, _| true);

        let err = bridge.initialize().expect_err("no ack");
        assert!(matches!(err, BridgeError::BarrierTimeout { step: 1, .. }));
        assert_eq!(bridge.state(), SessionState::Failed);
        assert!(matches!(
            bridge.game_start(),
            Err(BridgeError::SessionFailed(_))
        ));

        bridge.shutdown();
        driver.join().unwrap();
    }

    #[test]
    fn dropped_connection_fails_the_waiting_step() {
        let config = BridgeConfig::default().with_step_timeout(Duration::from_secs(5));
        let (mut bridge, _) = bridge(config);
        let driver = connect(&mut bridge, |_, _| false);

        let err = bridge.initialize().expect_err("driver hung up");
        assert!(matches!(
            err,
            BridgeError::Transport(TransportError::Closed)
        ));
        bridge.shutdown();
        driver.join().unwrap();
    }

    #[test]
    fn accept_times_out_without_driver() {
        let config = BridgeConfig::default().with_accept_timeout(Duration::from_millis(20));
        let (mut bridge, _) = bridge(config);
        let listener = bridge.open_endpoint().unwrap();
        let err = bridge.accept(listener).expect_err("nobody dials");
        assert!(matches!(
            err,
            BridgeError::Transport(TransportError::AcceptTimeout(_))
        ));
        assert_eq!(bridge.state(), SessionState::Failed);
    }

    #[test]
    fn record_event_respects_subscription() {
        let (bridge, _) = bridge(BridgeConfig::default());
        let event = IntelEvent::new(bridge_runtime::IntelEventKind::UnitAddedSelf, UnitTag(1));
        assert!(!bridge.record_event(event));
        bridge.with_domain(|domain| domain.events.subscribe());
        assert!(bridge.record_event(event));
    }

    #[test]
    fn initial_mask_comes_from_config() {
        let config = BridgeConfig::default().with_initial_intel(["units_self", "game_loop"]);
        let (bridge, _) = bridge(config);
        assert_eq!(bridge.mask(), IntelMask::UNITS_SELF | IntelMask::GAME_LOOP);
    }
}
