use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};

use castbridge_capture_surface::synthetic::SyntheticSample;
use castbridge_capture_surface::SampleHandler;
use castbridge_common::config::DisplayConfig;
use castbridge_common::error::CastError;
use castbridge_frame_transport::{FrameConsumer, FrameMessage, FrameServer, UnixConnector};
use castbridge_platform_core::{
    BroadcastHandler, DisplayListener, PrivilegeError, PrivilegeHost, PrivilegeKind, SessionId,
    TerminationSignal, TerminationSource,
};
use castbridge_session::{
    ConsentOutcome, ConsentState, LifecycleState, RetryPolicy, SessionCoordinator,
    SessionHandle, SessionListener, StopEvent, VirtualDisplayMonitor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCall {
    Acquire,
    Escalate,
    Release,
}

/// Scriptable privilege host. Escalation succeeds once consent has been
/// granted on the host side, unless a scripted result is queued.
#[derive(Default)]
struct FakeHost {
    acquire_error: Mutex<Option<PrivilegeError>>,
    escalations: Mutex<VecDeque<Result<(), PrivilegeError>>>,
    consent: AtomicBool,
    acquire_gate: Option<Semaphore>,
    escalate_gate: Option<Semaphore>,
    release_gate: Option<Semaphore>,
    escalate_calls: AtomicUsize,
    release_calls: AtomicUsize,
    calls: Mutex<Option<mpsc::UnboundedSender<HostCall>>>,
}

impl FakeHost {
    fn gated_acquire() -> Self {
        Self {
            acquire_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    fn gated_escalate() -> Self {
        Self {
            escalate_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    fn gated_release() -> Self {
        Self {
            release_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    fn watch_calls(&self) -> mpsc::UnboundedReceiver<HostCall> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.calls.lock().unwrap() = Some(tx);
        rx
    }

    fn record(&self, call: HostCall) {
        if let Some(tx) = self.calls.lock().unwrap().as_ref() {
            let _ = tx.send(call);
        }
    }

    fn grant(&self) {
        self.consent.store(true, Ordering::SeqCst);
    }

    fn revoke(&self) {
        self.consent.store(false, Ordering::SeqCst);
    }

    async fn pass(gate: &Option<Semaphore>) {
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn open(gate: &Option<Semaphore>) {
        if let Some(gate) = gate {
            gate.add_permits(16);
        }
    }
}

#[async_trait::async_trait]
impl PrivilegeHost for FakeHost {
    async fn acquire(
        &self,
        _session: SessionId,
        kind: PrivilegeKind,
        _token: Option<&str>,
    ) -> Result<(), PrivilegeError> {
        assert_eq!(kind, PrivilegeKind::Bridge);
        self.record(HostCall::Acquire);
        Self::pass(&self.acquire_gate).await;
        match self.acquire_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn escalate(&self, _session: SessionId, kind: PrivilegeKind) -> Result<(), PrivilegeError> {
        assert_eq!(kind, PrivilegeKind::Full);
        self.escalate_calls.fetch_add(1, Ordering::SeqCst);
        self.record(HostCall::Escalate);
        Self::pass(&self.escalate_gate).await;
        if let Some(scripted) = self.escalations.lock().unwrap().pop_front() {
            return scripted;
        }
        if self.consent.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PrivilegeError::Denied)
        }
    }

    async fn release(&self, _session: SessionId) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.record(HostCall::Release);
        Self::pass(&self.release_gate).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Active(PrivilegeKind),
    Stopped(TerminationSource),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn stops(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Stopped(_)))
            .count()
    }
}

impl SessionListener for Recorder {
    fn on_active(&self, _handle: &SessionHandle, kind: PrivilegeKind) {
        self.events.lock().unwrap().push(Event::Active(kind));
    }

    fn on_stopped(&self, event: &StopEvent) {
        self.events.lock().unwrap().push(Event::Stopped(event.source));
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        denied_delay: Duration::from_millis(2),
        error_delay: Duration::from_millis(10),
    }
}

fn setup(host: FakeHost) -> (SessionCoordinator, Arc<FakeHost>, Arc<Recorder>) {
    setup_with_policy(host, fast_policy())
}

fn setup_with_policy(
    host: FakeHost,
    policy: RetryPolicy,
) -> (SessionCoordinator, Arc<FakeHost>, Arc<Recorder>) {
    let host = Arc::new(host);
    let recorder = Arc::new(Recorder::default());
    let coordinator = SessionCoordinator::new(host.clone(), recorder.clone(), policy);
    (coordinator, host, recorder)
}

async fn reach(coordinator: &SessionCoordinator, state: LifecycleState) {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state:?}"))
        .unwrap();
}

async fn next_call(rx: &mut mpsc::UnboundedReceiver<HostCall>, want: HostCall) {
    loop {
        let call = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("host call")
            .expect("host alive");
        if call == want {
            return;
        }
    }
}

#[tokio::test]
async fn full_request_upgrades_after_consent() {
    let (coordinator, host, recorder) = setup(FakeHost::default());

    let handle = coordinator
        .start(PrivilegeKind::Full, Some("K7Q2".to_string()))
        .await
        .unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::UpgradePolling);
    assert_eq!(handle.status_line(), "Broadcasting \u{2022} Code: K7Q2");

    let snapshot = coordinator.session().unwrap();
    assert_eq!(snapshot.current_kind, Some(PrivilegeKind::Bridge));
    assert_eq!(snapshot.consent, ConsentState::Pending);

    host.grant();
    assert_eq!(coordinator.consent_result(true).await, ConsentOutcome::Upgraded);
    assert_eq!(coordinator.current_state(), LifecycleState::FullPrivilege);

    let snapshot = coordinator.session().unwrap();
    assert_eq!(snapshot.session_id, handle.session_id);
    assert_eq!(snapshot.current_kind, Some(PrivilegeKind::Full));
    assert_eq!(snapshot.consent, ConsentState::Granted);
    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Active(PrivilegeKind::Full)
        ]
    );

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert!(coordinator.session().is_none());
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bridge_request_never_escalates() {
    let (coordinator, host, recorder) = setup(FakeHost::default());

    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::BridgePrivilege);
    assert_eq!(
        coordinator.consent_result(true).await,
        ConsentOutcome::NotRequested
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(host.escalate_calls.load(Ordering::SeqCst), 0);

    coordinator.stop().await;
    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::UserStop)
        ]
    );
}

#[tokio::test]
async fn stop_when_idle_is_a_no_op() {
    let (coordinator, host, recorder) = setup(FakeHost::default());
    coordinator.stop().await;
    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 0);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn stop_while_requesting_discards_the_late_bridge() {
    let (coordinator, host, recorder) = setup(FakeHost::gated_acquire());
    let mut calls = host.watch_calls();

    let starter = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start(PrivilegeKind::Full, None).await })
    };
    next_call(&mut calls, HostCall::Acquire).await;
    assert_eq!(coordinator.current_state(), LifecycleState::Requesting);

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);

    FakeHost::open(&host.acquire_gate);
    let result = starter.await.unwrap();
    assert!(matches!(result, Err(CastError::SessionStopped)));
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 2);
    assert_eq!(host.escalate_calls.load(Ordering::SeqCst), 0);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn stop_while_polling_fires_once() {
    let (coordinator, host, recorder) = setup(FakeHost::default());
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(coordinator.current_state(), LifecycleState::UpgradePolling);
    assert!(host.escalate_calls.load(Ordering::SeqCst) >= 2);

    coordinator.stop().await;
    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert_eq!(recorder.stops(), 1);
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 1);

    let attempts = host.escalate_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(host.escalate_calls.load(Ordering::SeqCst), attempts);
}

#[tokio::test]
async fn concurrent_stops_wait_for_one_teardown() {
    let (coordinator, host, recorder) = setup(FakeHost::gated_release());
    let mut calls = host.watch_calls();
    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.stop().await })
    };
    next_call(&mut calls, HostCall::Release).await;
    assert_eq!(coordinator.current_state(), LifecycleState::Stopping);

    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!second.is_finished());

    // A new session cannot start until teardown completes.
    assert!(matches!(
        coordinator.start(PrivilegeKind::Bridge, None).await,
        Err(CastError::SessionAlreadyActive)
    ));

    FakeHost::open(&host.release_gate);
    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert_eq!(recorder.stops(), 1);
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn escalation_racing_stop_never_reaches_full() {
    let (coordinator, host, recorder) = setup(FakeHost::gated_escalate());
    let mut calls = host.watch_calls();
    host.grant();

    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    next_call(&mut calls, HostCall::Escalate).await;

    coordinator.stop().await;
    FakeHost::open(&host.escalate_gate);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert!(!recorder
        .events()
        .contains(&Event::Active(PrivilegeKind::Full)));
    assert_eq!(
        coordinator.consent_result(true).await,
        ConsentOutcome::NotRequested
    );
}

#[tokio::test]
async fn refused_bridge_is_denied_until_reset() {
    let host = FakeHost::default();
    *host.acquire_error.lock().unwrap() = Some(PrivilegeError::ConsentRefused);
    let (coordinator, host, recorder) = setup(host);

    let err = coordinator
        .start(PrivilegeKind::Full, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CastError::ConsentDenied));
    assert_eq!(coordinator.current_state(), LifecycleState::Denied);
    assert!(coordinator.session().is_none());

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert!(recorder.events().is_empty());

    *host.acquire_error.lock().unwrap() = None;
    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::BridgePrivilege);
}

#[tokio::test]
async fn consent_refused_during_polling_stops_once() {
    let (coordinator, host, recorder) = setup(FakeHost::default());
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();

    assert_eq!(
        coordinator.consent_result(false).await,
        ConsentOutcome::Abandoned
    );
    assert_eq!(coordinator.current_state(), LifecycleState::Denied);
    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);
    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::ConsentDenied)
        ]
    );
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn early_consent_does_not_carry_into_the_next_session() {
    let policy = RetryPolicy {
        denied_delay: Duration::from_secs(5),
        error_delay: Duration::from_secs(5),
    };
    let (coordinator, host, _recorder) = setup_with_policy(FakeHost::gated_escalate(), policy);
    let mut calls = host.watch_calls();
    host.grant();

    // Consent lands while the first escalation is still in flight, so the
    // wake-up is not consumed by this session's retry loop.
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    next_call(&mut calls, HostCall::Escalate).await;
    let consent = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.consent_result(true).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    FakeHost::open(&host.escalate_gate);
    assert_eq!(consent.await.unwrap(), ConsentOutcome::Upgraded);
    coordinator.stop().await;

    host.revoke();
    let before = host.escalate_calls.load(Ordering::SeqCst);
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(host.escalate_calls.load(Ordering::SeqCst) - before, 1);
    assert_eq!(coordinator.current_state(), LifecycleState::UpgradePolling);
    coordinator.stop().await;
}

#[tokio::test]
async fn stop_cancels_a_pending_upgrade_as_temporarily_unavailable() {
    let (coordinator, _host, _recorder) = setup(FakeHost::default());
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();

    let settled = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.settled_privilege().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!settled.is_finished());

    coordinator.stop().await;
    let err = settled.await.unwrap().unwrap_err();
    assert!(matches!(err, CastError::PrivilegeTemporarilyUnavailable));
    assert!(err.is_transient());
    assert!(matches!(
        coordinator.settled_privilege().await,
        Err(CastError::SessionStopped)
    ));
}

#[tokio::test]
async fn settled_privilege_reports_the_outcome() {
    let (coordinator, host, _recorder) = setup(FakeHost::default());

    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    assert_eq!(
        coordinator.settled_privilege().await.unwrap(),
        PrivilegeKind::Bridge
    );
    coordinator.stop().await;

    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    host.grant();
    assert_eq!(
        coordinator.settled_privilege().await.unwrap(),
        PrivilegeKind::Full
    );
    coordinator.stop().await;

    host.revoke();
    host.escalations
        .lock()
        .unwrap()
        .push_back(Err(PrivilegeError::ConsentRefused));
    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    assert!(matches!(
        coordinator.settled_privilege().await,
        Err(CastError::ConsentDenied)
    ));
}

#[tokio::test]
async fn host_refusal_during_polling_is_denied() {
    let host = FakeHost::default();
    host.escalations.lock().unwrap().extend([
        Err(PrivilegeError::Denied),
        Err(PrivilegeError::failed("transient")),
        Err(PrivilegeError::ConsentRefused),
    ]);
    let (coordinator, host, recorder) = setup(host);

    coordinator.start(PrivilegeKind::Full, None).await.unwrap();
    reach(&coordinator, LifecycleState::Denied).await;

    assert_eq!(host.escalate_calls.load(Ordering::SeqCst), 3);
    assert_eq!(recorder.stops(), 1);
    assert_eq!(
        recorder.events().last(),
        Some(&Event::Stopped(TerminationSource::ConsentDenied))
    );

    // Denied is reset by the next start.
    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::BridgePrivilege);
}

#[tokio::test]
async fn back_to_back_start_is_rejected() {
    let (coordinator, host, _recorder) = setup(FakeHost::gated_acquire());
    let mut calls = host.watch_calls();

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start(PrivilegeKind::Full, None).await })
    };
    next_call(&mut calls, HostCall::Acquire).await;

    let second = coordinator.start(PrivilegeKind::Full, None).await;
    assert!(matches!(second, Err(CastError::SessionAlreadyActive)));
    assert_eq!(coordinator.current_state(), LifecycleState::Requesting);

    FakeHost::open(&host.acquire_gate);
    let handle = first.await.unwrap().unwrap();
    assert_eq!(coordinator.current_state(), LifecycleState::UpgradePolling);
    assert_eq!(
        coordinator.session().map(|s| s.session_id),
        Some(handle.session_id)
    );

    let third = coordinator.start(PrivilegeKind::Bridge, None).await;
    assert!(matches!(third, Err(CastError::SessionAlreadyActive)));
    coordinator.stop().await;
}

#[tokio::test]
async fn signal_pump_applies_the_first_signal_only() {
    let (coordinator, host, recorder) = setup(FakeHost::default());
    let pump = coordinator.spawn_signal_pump().unwrap();
    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();

    let monitor =
        VirtualDisplayMonitor::new(&DisplayConfig::default(), coordinator.termination_sender());
    let signals = coordinator.termination_sender();
    monitor.on_display_removed(42);
    signals
        .send(TerminationSignal::now(TerminationSource::OsVirtualDisplayStateOff))
        .unwrap();
    signals
        .send(TerminationSignal::now(TerminationSource::ChannelClosed))
        .unwrap();

    reach(&coordinator, LifecycleState::Idle).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    coordinator.stop().await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::OsVirtualDisplayRemoved)
        ]
    );
    assert_eq!(host.release_calls.load(Ordering::SeqCst), 1);
    pump.abort();
}

struct Collect(mpsc::UnboundedSender<FrameMessage>);

impl FrameConsumer for Collect {
    fn on_frame(&mut self, frame: FrameMessage) {
        let _ = self.0.send(frame);
    }
}

fn socket_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cbc-{name}-{}.sock", std::process::id()))
}

#[tokio::test]
async fn frames_flow_while_consent_never_resolves() {
    let (coordinator, host, recorder) = setup(FakeHost::default());
    let pump = coordinator.spawn_signal_pump().unwrap();

    let path = socket_path("pending");
    let server = FrameServer::bind(&path, 1 << 20).unwrap();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = {
        let signals = coordinator.termination_sender();
        tokio::spawn(async move {
            let mut consumer = Collect(frame_tx);
            server.run(&mut consumer, signals, shutdown_rx).await
        })
    };

    coordinator.start(PrivilegeKind::Full, None).await.unwrap();

    let connector = UnixConnector::new(&path, Duration::from_millis(200));
    let mut handler = SampleHandler::new(connector);
    handler.broadcast_started();
    let handler = tokio::task::spawn_blocking(move || {
        for seq in 0..8 {
            handler.process_sample(&SyntheticSample::gradient(8, 4, seq));
            std::thread::sleep(Duration::from_millis(3));
        }
        handler
    })
    .await
    .unwrap();

    for _ in 0..8 {
        let frame = frame_rx.recv().await.unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
    }
    assert_eq!(handler.stats().frames_sent, 8);
    assert_eq!(coordinator.current_state(), LifecycleState::UpgradePolling);
    assert!(host.escalate_calls.load(Ordering::SeqCst) > 1);

    coordinator.stop().await;
    assert_eq!(coordinator.current_state(), LifecycleState::Idle);

    // The producer closing afterwards is a late duplicate.
    let mut handler = handler;
    handler.broadcast_finished();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(recorder.stops(), 1);
    assert_eq!(
        recorder.events().last(),
        Some(&Event::Stopped(TerminationSource::UserStop))
    );

    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
    pump.abort();
}

#[tokio::test]
async fn late_channel_close_does_not_stop_the_next_session() {
    let (coordinator, _host, recorder) = setup(FakeHost::default());
    let pump = coordinator.spawn_signal_pump().unwrap();

    let path = socket_path("late-close");
    let server = FrameServer::bind(&path, 1 << 20)
        .unwrap()
        .with_session_feed(coordinator.session_feed());
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = {
        let signals = coordinator.termination_sender();
        tokio::spawn(async move {
            let mut consumer = Collect(frame_tx);
            server.run(&mut consumer, signals, shutdown_rx).await
        })
    };

    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    let connector = UnixConnector::new(&path, Duration::from_millis(200));
    let mut handler = SampleHandler::new(connector);
    handler.broadcast_started();
    let mut handler = tokio::task::spawn_blocking(move || {
        handler.process_sample(&SyntheticSample::gradient(8, 4, 0));
        handler
    })
    .await
    .unwrap();
    frame_rx.recv().await.unwrap();

    coordinator.stop().await;
    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();

    // The first session's producer hangs up only now.
    handler.broadcast_finished();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(coordinator.current_state(), LifecycleState::BridgePrivilege);
    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::UserStop),
            Event::Active(PrivilegeKind::Bridge)
        ]
    );

    coordinator.stop().await;
    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
    pump.abort();
}

#[tokio::test]
async fn late_display_removal_does_not_stop_the_next_session() {
    let (coordinator, _host, recorder) = setup(FakeHost::default());
    let pump = coordinator.spawn_signal_pump().unwrap();
    let monitor =
        VirtualDisplayMonitor::new(&DisplayConfig::default(), coordinator.termination_sender())
            .with_session_feed(coordinator.session_feed());

    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    monitor.on_display_added(11);
    coordinator.stop().await;

    coordinator.start(PrivilegeKind::Bridge, None).await.unwrap();
    monitor.on_display_removed(11);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(coordinator.current_state(), LifecycleState::BridgePrivilege);

    // A display that appears during the new session still ends it.
    monitor.on_display_added(12);
    monitor.on_display_removed(12);
    reach(&coordinator, LifecycleState::Idle).await;
    assert_eq!(
        recorder.events(),
        vec![
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::UserStop),
            Event::Active(PrivilegeKind::Bridge),
            Event::Stopped(TerminationSource::OsVirtualDisplayRemoved)
        ]
    );
    pump.abort();
}
