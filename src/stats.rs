//! Per-queue pipeline statistics.
//!
//! Counters are plain atomics with relaxed increments. Each counter has
//! exactly one writing stage — the generator owns `rx_pkts`, the worker owns
//! `proc_pkts`, the egress drain owns `tx_pkts` and the latency sums, and
//! drops are charged by whichever stage failed the push. The reporter only
//! loads, so a snapshot may be stale but each field is self-consistent.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one queue (cache-line aligned).
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Packets accepted into the RX ring.
    pub rx_pkts: AtomicU64,
    /// Packets drained and transformed by the worker.
    pub proc_pkts: AtomicU64,
    /// Packets through simulated transmit completion.
    pub tx_pkts: AtomicU64,
    /// Packets shed on a full ring, RX and TX combined.
    pub dropped: AtomicU64,
    /// Cumulative hardware-path latency (hw_tx - hw_rx), ns.
    pub hw_latency_sum_ns: AtomicU64,
    /// Cumulative software-path latency (hw_tx - sw_rx), ns.
    pub sw_latency_sum_ns: AtomicU64,
}

impl QueueStats {
    #[inline(always)]
    pub fn record_rx(&self) {
        self.rx_pkts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_proc(&self) {
        self.proc_pkts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transmit completion and fold in its latency samples.
    #[inline(always)]
    pub fn record_tx(&self, hw_latency_ns: u64, sw_latency_ns: u64) {
        self.tx_pkts.fetch_add(1, Ordering::Relaxed);
        self.hw_latency_sum_ns.fetch_add(hw_latency_ns, Ordering::Relaxed);
        self.sw_latency_sum_ns.fetch_add(sw_latency_ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            rx_pkts: self.rx_pkts.load(Ordering::Relaxed),
            proc_pkts: self.proc_pkts.load(Ordering::Relaxed),
            tx_pkts: self.tx_pkts.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            hw_latency_sum_ns: self.hw_latency_sum_ns.load(Ordering::Relaxed),
            sw_latency_sum_ns: self.sw_latency_sum_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one queue's counters (non-atomic).
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub rx_pkts: u64,
    pub proc_pkts: u64,
    pub tx_pkts: u64,
    pub dropped: u64,
    pub hw_latency_sum_ns: u64,
    pub sw_latency_sum_ns: u64,
}

impl QueueSnapshot {
    /// Mean hardware-path latency; zero when nothing was transmitted.
    pub fn hw_latency_avg_ns(&self) -> u64 {
        if self.tx_pkts == 0 {
            return 0;
        }
        self.hw_latency_sum_ns / self.tx_pkts
    }

    /// Mean software-path latency; zero when nothing was transmitted.
    pub fn sw_latency_avg_ns(&self) -> u64 {
        if self.tx_pkts == 0 {
            return 0;
        }
        self.sw_latency_sum_ns / self.tx_pkts
    }
}

/// Counters for every queue in the pipeline.
#[derive(Debug)]
pub struct PipelineStats {
    queues: Vec<QueueStats>,
}

impl PipelineStats {
    pub fn new(num_queues: usize) -> Self {
        let mut queues = Vec::with_capacity(num_queues);
        for _ in 0..num_queues {
            queues.push(QueueStats::default());
        }
        Self { queues }
    }

    pub fn queue(&self, idx: usize) -> &QueueStats {
        &self.queues[idx]
    }

    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Roll-up across all queues.
    pub fn total(&self) -> QueueSnapshot {
        let mut total = QueueSnapshot::default();
        for q in &self.queues {
            let s = q.snapshot();
            total.rx_pkts += s.rx_pkts;
            total.proc_pkts += s.proc_pkts;
            total.tx_pkts += s.tx_pkts;
            total.dropped += s.dropped;
            total.hw_latency_sum_ns += s.hw_latency_sum_ns;
            total.sw_latency_sum_ns += s.sw_latency_sum_ns;
        }
        total
    }
}
