//! CastBridge Session Coordination
//!
//! Runs in the main application process. Stands up a capture session at
//! bridge privilege before the user has answered the consent prompt, then
//! keeps trying to upgrade it to full privilege until consent lands or the
//! session is stopped. Every way a session can end funnels through one
//! aggregator so the application hears about it exactly once.
//!
//! # Architecture
//!
//! ```text
//!  app shell ──start/stop/consent──▶ SessionCoordinator ──acquire/escalate/release──▶ PrivilegeHost
//!                                       │        ▲
//!                      on_active/on_stopped      │ TerminationSignal (mpsc)
//!                                       ▼        │
//!                                 SessionListener   ├── VirtualDisplayMonitor (display off / removed)
//!                                                   └── FrameServer (channel closed)
//! ```

pub mod aggregator;
pub mod coordinator;
pub mod display;
pub mod retry;
pub mod state;

pub use aggregator::{StopEvent, TerminationAggregator};
pub use coordinator::{ConsentOutcome, SessionCoordinator, SessionListener};
pub use display::VirtualDisplayMonitor;
pub use retry::RetryPolicy;
pub use state::*;
