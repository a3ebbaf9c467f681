//! Simulated multi-queue packet fast path.
//!
//! A testpmd-style forwarding pipeline without hardware: an ingress
//! generator stands in for the NIC and feeds per-queue lock-free rings, one
//! worker thread per queue drains and transforms packets, and one egress
//! thread per queue simulates transmit completion while folding hardware-
//! and software-observed latency into per-queue counters.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────── queue q (×N) ────────────────┐
//! ┌─────────┐  │ ┌─────────┐   ┌────────┐   ┌─────────┐       │
//! │ Ingress │  │ │ RX ring │   │ Worker │   │ TX ring │       │
//! │Generator├──┼─► (SPSC)  ├───►  [q]   ├───► (SPSC)  ├──┐    │
//! └─────────┘  │ └─────────┘   └────────┘   └─────────┘  │    │
//!   hw_rx_ts   │                sw_rx_ts                 │    │
//!              │               ┌────────┐   ┌─────────┐  │    │
//!              │               │ Stats  ◄───┤ Egress  ◄──┘    │
//!              │               │  [q]   │   │  [q]    │       │
//!              │               └────────┘   └─────────┘       │
//!              │                              hw_tx_ts        │
//!              └──────────────────────────────────────────────┘
//! ```
//!
//! One OS thread per stage instance (1 generator + N workers + N egress
//! drains) plus the reporting thread. Queues are fully independent: FIFO
//! order holds within a queue, never across queues. Overload sheds the
//! newest packet at the full ring and counts the drop; nothing in the hot
//! path blocks or allocates.

#![warn(missing_docs)]

pub mod core;
pub mod packet;
pub mod pipeline;
pub mod ring;
pub mod stats;

pub use crate::core::{Engine, EngineConfig, EngineError, ShutdownHandle};
pub use crate::packet::{now_ns, Packet, PKT_PAYLOAD};
pub use crate::pipeline::{DiscardSink, PacketSink, PacketSource, SyntheticSource};
pub use crate::ring::{spsc, Consumer, Producer};
pub use crate::stats::{PipelineStats, QueueSnapshot, QueueStats};

/// Default number of queue pipelines.
pub const DEFAULT_NUM_QUEUES: usize = 8;

/// Default per-direction ring capacity.
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Default worker drain batch size.
pub const BATCH_SIZE: usize = 32;
