//! Pipeline stage bodies: ingress generator, per-queue worker, per-queue
//! egress drain.
//!
//! Every loop checks the shutdown flag at its iteration boundary and exits
//! promptly; an empty ring is a yield point, never a blocking wait, and a
//! full ring sheds the newest packet instead of applying back-pressure.

use crate::core::ShutdownHandle;
use crate::packet::{now_ns, Packet, OFFLOAD_CSUM, OFFLOAD_TS, OFFLOAD_VLAN, PKT_PAYLOAD};
use crate::ring::{Consumer, Producer};
use crate::stats::{PipelineStats, QueueStats};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Two six-byte address fields; shorter packets skip the swap.
const MIN_SWAP_LEN: u16 = 12;

/// Mask on the running production count; the generator pauses whenever the
/// masked count hits zero (about every 16 K packets).
const GEN_PAUSE_MASK: u64 = 0x3FFF;

/// Where ingress packets come from.
///
/// The generator thread calls this once per queue per round-robin sweep. A
/// real driver layer would poll hardware here; the pipeline is agnostic to
/// how bursts are obtained.
pub trait PacketSource: Send {
    /// Append newly received packets for `queue_id` to `burst`.
    fn produce_burst(&mut self, queue_id: usize, burst: &mut Vec<Packet>);
}

/// Default source: synthesizes patterned packets with every offload bit set,
/// the way a NIC exerciser would.
pub struct SyntheticSource {
    burst_size: usize,
    pkt_idx: u64,
}

impl SyntheticSource {
    pub fn new(burst_size: usize) -> Self {
        Self { burst_size, pkt_idx: 0 }
    }
}

impl PacketSource for SyntheticSource {
    fn produce_burst(&mut self, _queue_id: usize, burst: &mut Vec<Packet>) {
        for _ in 0..self.burst_size {
            let mut payload = [0u8; PKT_PAYLOAD];
            for (i, b) in payload.iter_mut().enumerate() {
                *b = (self.pkt_idx as usize).wrapping_add(i) as u8;
            }
            burst.push(Packet {
                payload,
                len: PKT_PAYLOAD as u16,
                offloads: OFFLOAD_CSUM | OFFLOAD_TS | OFFLOAD_VLAN,
                ..Packet::default()
            });
            self.pkt_idx += 1;
        }
    }
}

/// Where packets go after simulated transmit completion.
pub trait PacketSink: Send {
    /// Take ownership of a transmitted packet.
    fn consume(&mut self, queue_id: usize, pkt: Packet);
}

/// Default sink: discards the packet, standing in for the wire.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl PacketSink for DiscardSink {
    #[inline]
    fn consume(&mut self, _queue_id: usize, _pkt: Packet) {}
}

/// Push one burst into a queue's RX ring, stamping hardware ingress
/// timestamps. A full ring sheds the incoming packet — no retry — and each
/// failed push is charged as exactly one drop. Returns the burst length.
pub(crate) fn feed_queue(
    producer: &mut Producer<Packet>,
    stats: &QueueStats,
    burst: &mut Vec<Packet>,
) -> usize {
    let n = burst.len();
    for mut pkt in burst.drain(..) {
        pkt.hw_rx_ts_ns = now_ns();
        match producer.push(pkt) {
            Ok(()) => stats.record_rx(),
            Err(_) => stats.record_drop(),
        }
    }
    n
}

/// Ingress generator body: round-robin bursts into every queue's RX ring
/// until shutdown is requested.
pub(crate) fn run_generator(
    mut source: Box<dyn PacketSource>,
    mut producers: Vec<Producer<Packet>>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownHandle,
    pause: Duration,
) {
    tracing::debug!("generator starting");

    let mut burst: Vec<Packet> = Vec::new();
    let mut produced: u64 = 0;

    while !shutdown.is_requested() {
        for (q, producer) in producers.iter_mut().enumerate() {
            if shutdown.is_requested() {
                break;
            }
            source.produce_burst(q, &mut burst);
            produced += feed_queue(producer, stats.queue(q), &mut burst) as u64;

            // Come up for air periodically; the rate is otherwise unbounded.
            if produced & GEN_PAUSE_MASK == 0 {
                thread::sleep(pause);
            }
        }
    }

    tracing::debug!(produced, "generator stopped");
}

/// In-place address-field swap: the first six payload bytes trade places
/// with the next six, as a forwarder swapping source and destination MACs.
/// Checksum work is already covered by hardware for packets carrying the
/// checksum-offload bit, which the synthetic source always sets.
#[inline]
pub fn transform(pkt: &mut Packet) {
    if pkt.len >= MIN_SWAP_LEN {
        for k in 0..6 {
            pkt.payload.swap(k, 6 + k);
        }
    }
}

/// Worker body: batch-drain the RX ring, stamp and transform, forward to the
/// TX ring. One clock sample covers the whole batch so arrival order within
/// a batch does not perturb relative latency.
pub(crate) fn run_worker(
    queue_id: usize,
    mut rx: Consumer<Packet>,
    mut tx: Producer<Packet>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownHandle,
    batch_size: usize,
) {
    tracing::debug!(queue_id, "worker starting");

    let qstats = stats.queue(queue_id);
    let mut batch: Vec<Packet> = Vec::with_capacity(batch_size);

    while !shutdown.is_requested() {
        while batch.len() < batch_size {
            match rx.pop() {
                Some(pkt) => batch.push(pkt),
                None => break,
            }
        }
        if batch.is_empty() {
            thread::yield_now();
            continue;
        }

        let sw_ts = now_ns();
        for mut pkt in batch.drain(..) {
            pkt.sw_rx_ts_ns = sw_ts;
            transform(&mut pkt);
            qstats.record_proc();
            if tx.push(pkt).is_err() {
                qstats.record_drop();
            }
        }
    }

    tracing::debug!(queue_id, "worker stopped");
}

/// Hardware-path and software-path latency samples for a transmitted packet,
/// clamped to zero when a clock artifact would make one negative.
#[inline]
pub(crate) fn latency_samples(pkt: &Packet) -> (u64, u64) {
    (
        pkt.hw_tx_ts_ns.saturating_sub(pkt.hw_rx_ts_ns),
        pkt.hw_tx_ts_ns.saturating_sub(pkt.sw_rx_ts_ns),
    )
}

/// Bounded busy-wait standing in for transmit-completion jitter. nanosleep
/// granularity is far coarser than the couple hundred nanoseconds simulated
/// here, hence the spin.
#[inline]
fn spin_for(ns: u64) {
    let start = now_ns();
    while now_ns().wrapping_sub(start) < ns {
        std::hint::spin_loop();
    }
}

/// Egress body: drain the TX ring one packet at a time, simulate completion
/// latency, stamp the hardware egress timestamp, fold latencies into stats,
/// and hand the packet to the sink.
pub(crate) fn run_egress(
    queue_id: usize,
    mut tx: Consumer<Packet>,
    mut sink: Box<dyn PacketSink>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownHandle,
    completion_ns: u64,
) {
    tracing::debug!(queue_id, "egress starting");

    let qstats = stats.queue(queue_id);

    while !shutdown.is_requested() {
        let Some(mut pkt) = tx.pop() else {
            thread::yield_now();
            continue;
        };

        spin_for(completion_ns);
        pkt.hw_tx_ts_ns = now_ns();

        let (hw_lat, sw_lat) = latency_samples(&pkt);
        qstats.record_tx(hw_lat, sw_lat);
        sink.consume(queue_id, pkt);
    }

    tracing::debug!(queue_id, "egress stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::spsc;
    use std::sync::mpsc;

    #[test]
    fn test_synthetic_source_burst() {
        let mut src = SyntheticSource::new(4);
        let mut burst = Vec::new();
        src.produce_burst(0, &mut burst);

        assert_eq!(burst.len(), 4);
        for pkt in &burst {
            assert_eq!(pkt.len as usize, PKT_PAYLOAD);
            assert_eq!(pkt.offloads, OFFLOAD_CSUM | OFFLOAD_TS | OFFLOAD_VLAN);
            assert_eq!(pkt.hw_rx_ts_ns, 0);
        }
        // Rolling pattern advances with the packet index.
        assert_eq!(burst[0].payload[0], 0);
        assert_eq!(burst[1].payload[0], 1);
        assert_eq!(burst[1].payload[3], 4);
    }

    #[test]
    fn test_transform_swaps_address_fields() {
        let mut pkt = Packet {
            len: 64,
            ..Packet::default()
        };
        for (i, b) in pkt.payload.iter_mut().enumerate() {
            *b = i as u8;
        }

        transform(&mut pkt);

        assert_eq!(&pkt.payload[0..6], &[6, 7, 8, 9, 10, 11]);
        assert_eq!(&pkt.payload[6..12], &[0, 1, 2, 3, 4, 5]);
        // Bytes past the address fields are untouched.
        assert_eq!(pkt.payload[12], 12);
    }

    #[test]
    fn test_transform_skips_short_packets() {
        let mut pkt = Packet {
            len: 11,
            ..Packet::default()
        };
        pkt.payload[0] = 0xAA;
        pkt.payload[6] = 0xBB;

        transform(&mut pkt);

        assert_eq!(pkt.payload[0], 0xAA);
        assert_eq!(pkt.payload[6], 0xBB);
    }

    #[test]
    fn test_feed_queue_sheds_overflow() {
        // Capacity 8 holds 7: ten packets means exactly three drops.
        let (mut producer, _consumer) = spsc::<Packet>(8).unwrap();
        let stats = QueueStats::default();

        let mut src = SyntheticSource::new(10);
        let mut burst = Vec::new();
        src.produce_burst(0, &mut burst);
        feed_queue(&mut producer, &stats, &mut burst);

        let s = stats.snapshot();
        assert_eq!(s.rx_pkts, 7);
        assert_eq!(s.dropped, 3);
    }

    #[test]
    fn test_feed_queue_stamps_ingress_time() {
        let (mut producer, mut consumer) = spsc::<Packet>(8).unwrap();
        let stats = QueueStats::default();

        let before = now_ns();
        let mut burst = vec![Packet::default()];
        feed_queue(&mut producer, &stats, &mut burst);
        let after = now_ns();

        let pkt = consumer.pop().unwrap();
        assert!(pkt.hw_rx_ts_ns >= before);
        assert!(pkt.hw_rx_ts_ns <= after);
        assert_eq!(pkt.sw_rx_ts_ns, 0);
    }

    #[test]
    fn test_latency_samples_scenario() {
        let pkt = Packet {
            hw_rx_ts_ns: 1000,
            sw_rx_ts_ns: 1500,
            hw_tx_ts_ns: 1800,
            ..Packet::default()
        };
        assert_eq!(latency_samples(&pkt), (800, 300));
    }

    #[test]
    fn test_latency_samples_clamp_to_zero() {
        let pkt = Packet {
            hw_rx_ts_ns: 2000,
            sw_rx_ts_ns: 2500,
            hw_tx_ts_ns: 1800,
            ..Packet::default()
        };
        assert_eq!(latency_samples(&pkt), (0, 0));
    }

    #[test]
    fn test_worker_forwards_transformed_batch() {
        let (mut rx_prod, rx_cons) = spsc::<Packet>(64).unwrap();
        let (tx_prod, mut tx_cons) = spsc::<Packet>(64).unwrap();
        let stats = Arc::new(PipelineStats::new(1));
        let shutdown = ShutdownHandle::new();

        let t0 = now_ns();
        let mut pkt = Packet {
            len: 64,
            ..Packet::default()
        };
        for (i, b) in pkt.payload.iter_mut().enumerate() {
            *b = i as u8;
        }
        rx_prod.push(pkt).unwrap();

        let worker = {
            let stats = Arc::clone(&stats);
            let shutdown = shutdown.clone();
            std::thread::spawn(move || run_worker(0, rx_cons, tx_prod, stats, shutdown, 32))
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut out = None;
        while std::time::Instant::now() < deadline {
            if let Some(p) = tx_cons.pop() {
                out = Some(p);
                break;
            }
            std::thread::yield_now();
        }
        shutdown.request();
        worker.join().unwrap();

        let out = out.expect("worker never forwarded the packet");
        assert!(out.sw_rx_ts_ns >= t0);
        assert_eq!(out.payload[0], 6);
        assert_eq!(stats.queue(0).snapshot().proc_pkts, 1);
    }

    struct ChannelSink(mpsc::Sender<(usize, Packet)>);

    impl PacketSink for ChannelSink {
        fn consume(&mut self, queue_id: usize, pkt: Packet) {
            let _ = self.0.send((queue_id, pkt));
        }
    }

    #[test]
    fn test_egress_stamps_and_accounts() {
        let (mut tx_prod, tx_cons) = spsc::<Packet>(8).unwrap();
        let stats = Arc::new(PipelineStats::new(1));
        let shutdown = ShutdownHandle::new();
        let (send, recv) = mpsc::channel();

        let mut pkt = Packet::default();
        pkt.hw_rx_ts_ns = now_ns();
        pkt.sw_rx_ts_ns = now_ns();
        tx_prod.push(pkt).unwrap();

        let egress = {
            let stats = Arc::clone(&stats);
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                run_egress(0, tx_cons, Box::new(ChannelSink(send)), stats, shutdown, 200)
            })
        };

        let (queue_id, out) = recv
            .recv_timeout(Duration::from_secs(5))
            .expect("egress never consumed the packet");
        shutdown.request();
        egress.join().unwrap();

        assert_eq!(queue_id, 0);
        assert!(out.hw_tx_ts_ns >= out.hw_rx_ts_ns);
        assert!(out.hw_tx_ts_ns >= out.sw_rx_ts_ns);

        let s = stats.queue(0).snapshot();
        assert_eq!(s.tx_pkts, 1);
        assert_eq!(s.hw_latency_sum_ns, out.hw_tx_ts_ns - out.hw_rx_ts_ns);
    }
}
