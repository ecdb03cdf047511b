//! Session privilege coordinator.
//!
//! A session is stood up at bridge privilege as soon as the user asks to
//! share, then upgraded to full privilege in the background once consent
//! lands. Every path that ends a session goes through the termination
//! aggregator, so teardown and the stop callback happen exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use castbridge_common::error::{CastError, CastResult};
use castbridge_platform_core::{
    PrivilegeError, PrivilegeHost, PrivilegeKind, SessionId, TerminationSignal, TerminationSource,
};

use crate::aggregator::{StopEvent, TerminationAggregator};
use crate::retry::RetryPolicy;
use crate::state::{CaptureSession, ConsentState, LifecycleState, SessionHandle, SessionSnapshot};

/// Application-side observer of session lifecycle.
///
/// Callbacks are invoked with the coordinator's state locked, which keeps
/// them ordered. They must not call back into the coordinator.
pub trait SessionListener: Send + Sync {
    /// The session now runs at `kind`. Fired once for bridge privilege and
    /// once more if the upgrade to full privilege succeeds.
    fn on_active(&self, _handle: &SessionHandle, _kind: PrivilegeKind) {}

    /// The session ended. Fired at most once per session, and only for
    /// sessions that were reported active.
    fn on_stopped(&self, event: &StopEvent);
}

/// Answer to [`SessionCoordinator::consent_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// The session holds full privilege.
    Upgraded,
    /// The session ended before it could be upgraded.
    Abandoned,
    /// No session was waiting for consent.
    NotRequested,
}

/// Internal lifecycle. The retry task and its consent wake-up belong to
/// the polling phase, so leaving that phase is the only way to drop them.
#[derive(Debug)]
enum Phase {
    Idle,
    Requesting,
    BridgePrivilege,
    UpgradePolling {
        retry: JoinHandle<()>,
        consent: Arc<Notify>,
    },
    FullPrivilege,
    Stopping,
    Denied,
}

impl Phase {
    fn lifecycle(&self) -> LifecycleState {
        match self {
            Phase::Idle => LifecycleState::Idle,
            Phase::Requesting => LifecycleState::Requesting,
            Phase::BridgePrivilege => LifecycleState::BridgePrivilege,
            Phase::UpgradePolling { .. } => LifecycleState::UpgradePolling,
            Phase::FullPrivilege => LifecycleState::FullPrivilege,
            Phase::Stopping => LifecycleState::Stopping,
            Phase::Denied => LifecycleState::Denied,
        }
    }
}

struct Inner {
    phase: Phase,
    session: Option<CaptureSession>,
}

impl Inner {
    fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.session_id)
    }

    fn is_polling(&self, session_id: SessionId) -> bool {
        matches!(self.phase, Phase::UpgradePolling { .. }) && self.session_id() == Some(session_id)
    }
}

struct Shared {
    host: Arc<dyn PrivilegeHost>,
    listener: Arc<dyn SessionListener>,
    policy: RetryPolicy,
    aggregator: TerminationAggregator,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<LifecycleState>,
    session_tx: watch::Sender<Option<SessionId>>,
    signal_tx: mpsc::UnboundedSender<TerminationSignal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminationSignal>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `phase`, returning the phase left behind. The session's held
    /// privilege kind always follows the phase.
    fn set_phase(&self, inner: &mut Inner, phase: Phase) -> Phase {
        let lifecycle = phase.lifecycle();
        let previous = std::mem::replace(&mut inner.phase, phase);
        if let Some(session) = inner.session.as_mut() {
            session.current_kind = lifecycle.privilege_kind();
        }
        tracing::debug!(from = ?previous.lifecycle(), to = ?lifecycle, "Session state changed");
        self.state_tx.send_replace(lifecycle);
        let session_id = inner.session_id();
        self.session_tx.send_if_modified(|current| {
            let changed = *current != session_id;
            *current = session_id;
            changed
        });
        previous
    }

    /// Feed a signal to the aggregator; the first one for the current
    /// session tears it down.
    async fn terminate(&self, signal: TerminationSignal) -> Option<StopEvent> {
        let event = self.aggregator.observe(&signal)?;
        self.teardown(&event).await;
        Some(event)
    }

    async fn teardown(&self, event: &StopEvent) {
        let (session, was_live) = {
            let mut inner = self.lock();
            if inner.session_id() != Some(event.session_id) {
                tracing::debug!(session = %event.session_id, "Stop event for a session already gone");
                return;
            }
            let was_live = inner.phase.lifecycle().is_live();
            // Stopping is recorded before the retry task is cancelled so a
            // result it is about to apply gets discarded.
            if let Phase::UpgradePolling { retry, .. } = self.set_phase(&mut inner, Phase::Stopping)
            {
                retry.abort();
            }
            match inner.session.take() {
                Some(session) => (session, was_live),
                None => return,
            }
        };

        tracing::info!(
            session = %session.session_id,
            source = ?event.source,
            elapsed_secs = session.clock.elapsed_secs(),
            "Releasing capture session"
        );
        self.host.release(session.session_id).await;

        let mut inner = self.lock();
        let next = if event.source == TerminationSource::ConsentDenied {
            Phase::Denied
        } else {
            Phase::Idle
        };
        self.set_phase(&mut inner, next);
        if was_live {
            self.listener.on_stopped(event);
        }
    }
}

/// Drives one capture session at a time through the privilege lifecycle.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    shared: Arc<Shared>,
}

impl SessionCoordinator {
    pub fn new(
        host: Arc<dyn PrivilegeHost>,
        listener: Arc<dyn SessionListener>,
        policy: RetryPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        let (session_tx, _) = watch::channel(None);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                host,
                listener,
                policy,
                aggregator: TerminationAggregator::new(),
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    session: None,
                }),
                state_tx,
                session_tx,
                signal_tx,
                signal_rx: Mutex::new(Some(signal_rx)),
            }),
        }
    }

    /// Start a capture session.
    ///
    /// Returns once bridge privilege is held. When `requested_kind` is
    /// [`PrivilegeKind::Full`] the upgrade continues in the background until
    /// consent resolves or the session stops.
    pub async fn start(
        &self,
        requested_kind: PrivilegeKind,
        correlation_token: Option<String>,
    ) -> CastResult<SessionHandle> {
        let shared = &self.shared;
        let handle = {
            let mut inner = shared.lock();
            match inner.phase.lifecycle() {
                LifecycleState::Idle | LifecycleState::Denied => {}
                state => {
                    tracing::warn!(?state, "Start requested while a session is active");
                    return Err(CastError::SessionAlreadyActive);
                }
            }
            let session = CaptureSession::new(requested_kind, correlation_token);
            let handle = session.handle();
            shared.aggregator.arm(session.session_id);
            inner.session = Some(session);
            shared.set_phase(&mut inner, Phase::Requesting);
            handle
        };
        let session_id = handle.session_id;

        tracing::info!(session = %session_id, kind = %requested_kind, "Requesting bridge privilege");
        let result = shared
            .host
            .acquire(
                session_id,
                PrivilegeKind::Bridge,
                handle.correlation_token.as_deref(),
            )
            .await;

        let acquired = result.is_ok();
        let settled = {
            let mut inner = shared.lock();
            self.settle_request(&mut inner, &handle, result)
        };
        if matches!(settled, Err(CastError::SessionStopped)) {
            tracing::info!(session = %session_id, "Session stopped while bridge privilege was pending");
            if acquired {
                shared.host.release(session_id).await;
            }
        }
        settled.map(|()| handle)
    }

    /// Apply the bridge request result, unless the session was stopped
    /// while it was in flight.
    fn settle_request(
        &self,
        inner: &mut Inner,
        handle: &SessionHandle,
        result: Result<(), PrivilegeError>,
    ) -> CastResult<()> {
        let shared = &self.shared;
        let session_id = handle.session_id;
        if !matches!(inner.phase, Phase::Requesting) || inner.session_id() != Some(session_id) {
            return Err(CastError::SessionStopped);
        }

        match result {
            Ok(()) => {}
            Err(PrivilegeError::ConsentRefused) => {
                tracing::warn!(session = %session_id, "Capture consent refused");
                inner.session = None;
                shared.set_phase(inner, Phase::Denied);
                shared.aggregator.disarm();
                return Err(CastError::ConsentDenied);
            }
            Err(err) => {
                tracing::error!(session = %session_id, error = %err, "Bridge privilege unavailable");
                inner.session = None;
                shared.set_phase(inner, Phase::Idle);
                shared.aggregator.disarm();
                return Err(CastError::bridge_unavailable(err.to_string()));
            }
        }

        shared.set_phase(inner, Phase::BridgePrivilege);
        shared.listener.on_active(handle, PrivilegeKind::Bridge);

        if handle.requested_kind == PrivilegeKind::Full {
            if let Some(session) = inner.session.as_mut() {
                session.consent = ConsentState::Pending;
            }
            let consent = Arc::new(Notify::new());
            let retry = tokio::spawn(upgrade_loop(
                Arc::downgrade(shared),
                session_id,
                Arc::clone(&consent),
            ));
            shared.set_phase(inner, Phase::UpgradePolling { retry, consent });
            tracing::info!(session = %session_id, "Waiting for consent to upgrade");
        }
        Ok(())
    }

    /// Stop the current session, if any. Safe to call in every state and
    /// any number of times; returns once the coordinator has settled.
    pub async fn stop(&self) {
        {
            let mut inner = self.shared.lock();
            if matches!(inner.phase, Phase::Denied) {
                self.shared.set_phase(&mut inner, Phase::Idle);
                return;
            }
        }

        let signal = TerminationSignal::now(TerminationSource::UserStop);
        if self.shared.terminate(signal).await.is_some() {
            return;
        }

        // Another signal won the latch; wait until its teardown has taken
        // the session away.
        let aggregator = &self.shared.aggregator;
        let Some(latched) = aggregator.armed_session().filter(|_| aggregator.is_latched()) else {
            return;
        };
        let mut feed = self.shared.session_tx.subscribe();
        let _ = feed.wait_for(|current| *current != Some(latched)).await;
    }

    /// Report the user's answer to the consent prompt.
    ///
    /// On a grant the upgrade is retried immediately, and the returned
    /// future resolves once the session either holds full privilege or has
    /// ended. The app shell awaits it before resuming its own permission
    /// callback.
    pub async fn consent_result(&self, granted: bool) -> ConsentOutcome {
        let (session_id, wake) = {
            let mut inner = self.shared.lock();
            let wake = match &inner.phase {
                Phase::FullPrivilege => return ConsentOutcome::Upgraded,
                Phase::UpgradePolling { consent, .. } => Arc::clone(consent),
                _ => return ConsentOutcome::NotRequested,
            };
            let Some(session) = inner.session.as_mut() else {
                return ConsentOutcome::NotRequested;
            };
            session.consent = if granted {
                ConsentState::Granted
            } else {
                ConsentState::Denied
            };
            (session.session_id, wake)
        };

        if !granted {
            tracing::info!(session = %session_id, "Consent refused while upgrading");
            let signal =
                TerminationSignal::for_session(TerminationSource::ConsentDenied, session_id);
            self.shared.terminate(signal).await;
            return ConsentOutcome::Abandoned;
        }

        tracing::info!(session = %session_id, "Consent granted; upgrading now");
        wake.notify_one();
        match self.settled_privilege().await {
            Ok(PrivilegeKind::Full) => ConsentOutcome::Upgraded,
            Ok(PrivilegeKind::Bridge) => ConsentOutcome::Abandoned,
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!(session = %session_id, "Upgrade cancelled by stop");
                }
                ConsentOutcome::Abandoned
            }
        }
    }

    /// Wait until the current session's privilege stops changing.
    ///
    /// Resolves at once for a bridge-only or already upgraded session.
    /// While the upgrade is pending it waits for the outcome: a stop that
    /// cancels the retries yields `PrivilegeTemporarilyUnavailable`, a
    /// refusal yields `ConsentDenied`.
    pub async fn settled_privilege(&self) -> CastResult<PrivilegeKind> {
        let (session_id, mut state) = {
            let inner = self.shared.lock();
            let Some(session_id) = inner.session_id() else {
                return Err(CastError::SessionStopped);
            };
            match inner.phase {
                Phase::UpgradePolling { .. } => {}
                Phase::FullPrivilege => return Ok(PrivilegeKind::Full),
                Phase::BridgePrivilege => return Ok(PrivilegeKind::Bridge),
                _ => return Err(CastError::SessionStopped),
            }
            (session_id, self.shared.state_tx.subscribe())
        };

        let settled = state
            .wait_for(|state| {
                !matches!(
                    state,
                    LifecycleState::UpgradePolling | LifecycleState::Stopping
                )
            })
            .await
            .map(|state| *state);

        let same_session = self.shared.lock().session_id() == Some(session_id);
        match settled {
            Ok(LifecycleState::FullPrivilege) if same_session => Ok(PrivilegeKind::Full),
            Ok(LifecycleState::Denied) => Err(CastError::ConsentDenied),
            _ => Err(CastError::PrivilegeTemporarilyUnavailable),
        }
    }

    pub fn current_state(&self) -> LifecycleState {
        self.shared.lock().phase.lifecycle()
    }

    /// Lifecycle updates for the UI.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state_tx.subscribe()
    }

    /// The id of the session the coordinator currently holds, if any.
    ///
    /// Observers that report terminations later (the frame server, the
    /// display monitor) use it to address their signals to the session
    /// they belong to.
    pub fn session_feed(&self) -> watch::Receiver<Option<SessionId>> {
        self.shared.session_tx.subscribe()
    }

    pub fn session(&self) -> Option<SessionSnapshot> {
        let inner = self.shared.lock();
        let lifecycle = inner.phase.lifecycle();
        inner.session.as_ref().map(|s| s.snapshot(lifecycle))
    }

    /// Sender for termination signals observed outside the coordinator,
    /// such as display notifications or channel closure.
    pub fn termination_sender(&self) -> mpsc::UnboundedSender<TerminationSignal> {
        self.shared.signal_tx.clone()
    }

    /// Spawn the task that applies signals from [`Self::termination_sender`].
    /// Only one pump may run per coordinator.
    pub fn spawn_signal_pump(&self) -> CastResult<JoinHandle<()>> {
        let mut rx = self
            .shared
            .signal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| anyhow::anyhow!("termination signal pump already running"))?;

        let shared = Arc::downgrade(&self.shared);
        Ok(tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if let Some(event) = shared.terminate(signal).await {
                    tracing::debug!(source = ?event.source, "Termination signal applied");
                }
            }
            tracing::debug!("Termination signal pump finished");
        }))
    }
}

/// Escalate to full privilege until it sticks, consent is refused, or the
/// session leaves the polling phase.
async fn upgrade_loop(shared: Weak<Shared>, session_id: SessionId, consent: Arc<Notify>) {
    let mut attempts: u32 = 0;
    loop {
        let Some(strong) = shared.upgrade() else {
            return;
        };
        attempts += 1;
        let result = strong.host.escalate(session_id, PrivilegeKind::Full).await;

        let delay = {
            let mut inner = strong.lock();
            if !inner.is_polling(session_id) {
                tracing::debug!(session = %session_id, "Escalation result discarded");
                return;
            }
            match result {
                Ok(()) => {
                    // Replacing the phase drops this task's own handle,
                    // which detaches rather than cancels it.
                    strong.set_phase(&mut inner, Phase::FullPrivilege);
                    if let Some(session) = inner.session.as_mut() {
                        session.consent = ConsentState::Granted;
                        let handle = session.handle();
                        strong.listener.on_active(&handle, PrivilegeKind::Full);
                    }
                    tracing::info!(session = %session_id, attempts, "Upgraded to full privilege");
                    return;
                }
                Err(err) => match strong.policy.delay_after(&err) {
                    Some(delay) => {
                        tracing::trace!(session = %session_id, error = %err, ?delay, "Escalation refused");
                        delay
                    }
                    None => {
                        drop(inner);
                        tracing::warn!(session = %session_id, "Consent refused during upgrade");
                        // Teardown cancels this task, so it runs elsewhere.
                        let signal = TerminationSignal::for_session(
                            TerminationSource::ConsentDenied,
                            session_id,
                        );
                        tokio::spawn(async move {
                            strong.terminate(signal).await;
                        });
                        return;
                    }
                },
            }
        };

        drop(strong);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = consent.notified() => {
                tracing::debug!(session = %session_id, "Woken by consent");
            }
        }
    }
}
