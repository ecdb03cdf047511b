//! CastBridge Capture Surface
//!
//! Runs inside the capture extension process. The host calls the
//! [`BroadcastHandler`](castbridge_platform_core::BroadcastHandler)
//! methods from its own real-time thread as soon as any privilege kind is
//! active; the handler turns each video sample into one frame on the
//! transport channel.
//!
//! ```text
//!  host ──process_sample──▶ SampleHandler ──FrameWriter──▶ rendezvous socket
//!                             │
//!                             └─ audio, paused, unconnected: dropped
//! ```
//!
//! Frames are never queued. If the channel cannot take a frame right now
//! the frame is dropped, because a late frame is worse than a missing one
//! for live mirroring.

pub mod handler;
pub mod stats;
pub mod synthetic;

pub use handler::*;
pub use stats::SurfaceStats;
