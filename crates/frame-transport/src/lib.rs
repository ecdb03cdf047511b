//! CastBridge Frame Transport
//!
//! Moves raw video frames from the capture process to the main process
//! over a local byte-stream socket. Both ends agree on one rendezvous path
//! and on a fixed framing:
//!
//! ```text
//! offset  field         size
//! 0       total_length  4     u32 BE, includes the header
//! 4       width         4     u32 BE
//! 8       height        4     u32 BE
//! 12      orientation   4     u32 BE
//! 16      payload       total_length - 16
//! ```
//!
//! The producer side ([`client`], [`writer`]) is blocking and runs inside
//! the capture callback. The consumer side ([`reader`], [`server`]) runs on
//! tokio in the main process.

pub mod client;
pub mod frame;
pub mod reader;
pub mod server;
pub mod writer;

pub use client::{Connector, FrameStream, UnixConnector};
pub use frame::{FrameHeader, FrameMessage, HEADER_LEN};
pub use reader::FrameReader;
pub use server::{FrameConsumer, FrameServer};
pub use writer::{write_fully, FrameWriter, PartialWrite, SendError};
