//! Packet record and offload flags.
//!
//! Packets are fixed-size `Copy` values: they transit the rings by copy, so
//! no ownership is shared between stage threads. Each of the three
//! timestamps is written exactly once along the pipeline — `hw_rx_ts_ns` by
//! the generator, `sw_rx_ts_ns` by the worker, `hw_tx_ts_ns` by the egress
//! drain.

use std::sync::OnceLock;
use std::time::Instant;

/// Payload bytes carried by every simulated packet.
pub const PKT_PAYLOAD: usize = 64;

/// Hardware timestamping handled by the simulated NIC.
pub const OFFLOAD_TS: u32 = 1 << 0;

/// Checksum computation handled by the simulated NIC; the worker does no
/// software checksum work when this bit is set.
pub const OFFLOAD_CSUM: u32 = 1 << 1;

/// VLAN tag insertion/stripping handled by the simulated NIC.
pub const OFFLOAD_VLAN: u32 = 1 << 2;

/// Simulated packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Packet data.
    pub payload: [u8; PKT_PAYLOAD],
    /// Valid bytes in `payload`.
    pub len: u16,
    /// Offload bits advertised by the ingress side.
    pub offloads: u32,
    /// Hardware ingress timestamp (ns), set by the generator.
    pub hw_rx_ts_ns: u64,
    /// Software dequeue timestamp (ns), set by the worker.
    pub sw_rx_ts_ns: u64,
    /// Hardware egress timestamp (ns), set by the egress drain.
    pub hw_tx_ts_ns: u64,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            payload: [0; PKT_PAYLOAD],
            len: 0,
            offloads: 0,
            hw_rx_ts_ns: 0,
            sw_rx_ts_ns: 0,
            hw_tx_ts_ns: 0,
        }
    }
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds on a process-local monotonic clock.
///
/// All three packet timestamps come from this clock.
#[inline]
pub fn now_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ns_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_default_packet_is_zeroed() {
        let p = Packet::default();
        assert_eq!(p.len, 0);
        assert_eq!(p.offloads, 0);
        assert_eq!(p.hw_rx_ts_ns, 0);
        assert!(p.payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_offload_bits_distinct() {
        assert_eq!(OFFLOAD_TS & OFFLOAD_CSUM, 0);
        assert_eq!(OFFLOAD_CSUM & OFFLOAD_VLAN, 0);
        assert_eq!(OFFLOAD_TS & OFFLOAD_VLAN, 0);
    }
}
