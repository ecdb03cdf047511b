//! Run one capture session end to end inside this process.
//!
//! A simulated privilege host hands out bridge privilege right away and full
//! privilege only after the simulated user has answered the consent prompt.
//! The capture surface runs on a blocking thread and feeds synthetic frames
//! through the real rendezvous socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use castbridge_capture_surface::synthetic::SyntheticSample;
use castbridge_capture_surface::SampleHandler;
use castbridge_common::config::BridgeConfig;
use castbridge_frame_transport::{FrameConsumer, FrameMessage, FrameServer, UnixConnector};
use castbridge_platform_core::{
    BroadcastHandler, PrivilegeError, PrivilegeHost, PrivilegeKind, SessionId,
};
use castbridge_session::{
    ConsentOutcome, RetryPolicy, SessionCoordinator, SessionHandle, SessionListener, StopEvent,
};

pub struct Options {
    pub consent_after_ms: u64,
    pub deny: bool,
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    pub code: Option<String>,
}

#[derive(Default)]
struct SimulatedHost {
    granted: AtomicBool,
    escalations: AtomicU64,
}

#[async_trait::async_trait]
impl PrivilegeHost for SimulatedHost {
    async fn acquire(
        &self,
        session: SessionId,
        kind: PrivilegeKind,
        correlation_token: Option<&str>,
    ) -> Result<(), PrivilegeError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracing::debug!(%session, %kind, ?correlation_token, "Host granted session");
        Ok(())
    }

    async fn escalate(&self, session: SessionId, kind: PrivilegeKind) -> Result<(), PrivilegeError> {
        self.escalations.fetch_add(1, Ordering::Relaxed);
        if self.granted.load(Ordering::SeqCst) {
            tracing::debug!(%session, %kind, "Host escalated session");
            Ok(())
        } else {
            Err(PrivilegeError::Denied)
        }
    }

    async fn release(&self, session: SessionId) {
        tracing::debug!(%session, "Host released session");
    }
}

struct ConsoleListener;

impl SessionListener for ConsoleListener {
    fn on_active(&self, handle: &SessionHandle, kind: PrivilegeKind) {
        println!("  [{kind}] {}", handle.status_line());
    }

    fn on_stopped(&self, event: &StopEvent) {
        println!(
            "  Session {} stopped by {:?} at {}",
            event.session_id,
            event.source,
            event.timestamp.to_rfc3339()
        );
    }
}

struct FrameCounter(Arc<AtomicU64>);

impl FrameConsumer for FrameCounter {
    fn on_frame(&mut self, _frame: FrameMessage) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

pub async fn run(config: &BridgeConfig, opts: Options) -> anyhow::Result<()> {
    println!("Simulating capture session");
    println!(
        "  Consent: {} after {}ms",
        if opts.deny { "refused" } else { "granted" },
        opts.consent_after_ms
    );
    println!("  Frames: {} at {}x{}", opts.frames, opts.width, opts.height);
    println!();

    let host = Arc::new(SimulatedHost::default());
    let coordinator = SessionCoordinator::new(
        host.clone(),
        Arc::new(ConsoleListener),
        RetryPolicy::from_config(&config.retry),
    );
    let pump = coordinator.spawn_signal_pump()?;

    let path = config.rendezvous.socket_path();
    let server = FrameServer::bind(&path, config.transport.max_frame_bytes)?
        .with_session_feed(coordinator.session_feed());
    let received = Arc::new(AtomicU64::new(0));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = {
        let signals = coordinator.termination_sender();
        let mut consumer = FrameCounter(received.clone());
        tokio::spawn(async move { server.run(&mut consumer, signals, shutdown_rx).await })
    };

    coordinator.start(PrivilegeKind::Full, opts.code).await?;

    let consent_task = {
        let coordinator = coordinator.clone();
        let host = host.clone();
        let delay = Duration::from_millis(opts.consent_after_ms);
        let deny = opts.deny;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !deny {
                host.granted.store(true, Ordering::SeqCst);
            }
            coordinator.consent_result(!deny).await
        })
    };

    let connector = UnixConnector::new(&path, config.transport.write_timeout());
    let (frames, width, height) = (opts.frames, opts.width, opts.height);
    let surface = tokio::task::spawn_blocking(move || {
        let mut handler = SampleHandler::new(connector);
        handler.broadcast_started();
        for seq in 0..frames {
            handler.process_sample(&SyntheticSample::gradient(width, height, seq));
            std::thread::sleep(Duration::from_millis(16));
        }
        handler.broadcast_finished();
        handler.stats().clone()
    });

    let outcome = consent_task.await?;
    let stats = surface.await?;
    coordinator.stop().await;
    let _ = shutdown_tx.send(true);
    let server_stats = server_task.await??;
    pump.abort();

    println!();
    match outcome {
        ConsentOutcome::Upgraded => println!("[OK] Upgraded to full privilege"),
        ConsentOutcome::Abandoned => println!("[WARN] Session ended before the upgrade"),
        ConsentOutcome::NotRequested => println!("[WARN] No session was waiting for consent"),
    }
    println!("Final state: {:?}", coordinator.current_state());
    println!(
        "Escalation attempts: {}",
        host.escalations.load(Ordering::Relaxed)
    );
    println!(
        "Surface: {} sent, {} dropped ({:.1}%), {} bytes, {} reconnects",
        stats.frames_sent,
        stats.frames_dropped,
        stats.drop_rate(),
        stats.bytes_sent,
        stats.disconnects
    );
    println!(
        "Consumer: {} frames over {} connection(s)",
        received.load(Ordering::Relaxed),
        server_stats.connections
    );
    Ok(())
}
