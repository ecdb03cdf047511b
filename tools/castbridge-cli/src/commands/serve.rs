//! Run the consumer end of the frame channel.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use castbridge_common::config::BridgeConfig;
use castbridge_frame_transport::{FrameConsumer, FrameMessage, FrameServer};

/// Logs frame throughput once per second.
struct RateLogger {
    window_start: Instant,
    frames: u64,
    bytes: u64,
    last_size: (u32, u32),
}

impl RateLogger {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            bytes: 0,
            last_size: (0, 0),
        }
    }

    fn reset(&mut self) {
        self.window_start = Instant::now();
        self.frames = 0;
        self.bytes = 0;
    }
}

impl FrameConsumer for RateLogger {
    fn on_frame(&mut self, frame: FrameMessage) {
        self.frames += 1;
        self.bytes += frame.payload.len() as u64;
        self.last_size = (frame.width, frame.height);

        let window = self.window_start.elapsed();
        if window >= Duration::from_secs(1) {
            let secs = window.as_secs_f64();
            tracing::info!(
                fps = self.frames as f64 / secs,
                kib_per_sec = self.bytes / 1024 / window.as_secs().max(1),
                width = self.last_size.0,
                height = self.last_size.1,
                orientation = frame.orientation,
                "Frame rate"
            );
            self.reset();
        }
    }

    fn on_producer_connected(&mut self) {
        self.reset();
    }
}

pub async fn run(config: &BridgeConfig, socket: Option<PathBuf>) -> anyhow::Result<()> {
    let path = socket.unwrap_or_else(|| config.rendezvous.socket_path());
    let server = FrameServer::bind(&path, config.transport.max_frame_bytes)?;

    println!("Listening on {}", path.display());
    println!("Press Ctrl+C to stop...");
    println!();

    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move {
        let mut consumer = RateLogger::new();
        server.run(&mut consumer, signal_tx, shutdown_rx).await
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = signal_rx.recv() => match signal {
                Some(signal) => println!("Session ended by producer ({:?})", signal.source),
                None => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    let stats = server_task.await??;

    println!();
    println!("Connections: {}", stats.connections);
    println!("Frames: {} ({} bytes)", stats.frames, stats.bytes);
    println!("Protocol violations: {}", stats.protocol_violations);
    println!("Channel closures: {}", stats.channel_closures);
    Ok(())
}
