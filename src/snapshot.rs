//! Portable TCP_INFO snapshot
//!
//! [`TcpInfo`] is the value every successful query returns. It is a plain
//! `Copy` record: once handed to the caller it never changes and holds no
//! reference to the socket it was read from.
//!
//! # Educational Notes
//!
//! ## Raw Units
//!
//! The kernel reports fields in mixed units and we keep them exactly as
//! reported:
//! - `rto`, `ato`, `rtt`, `rttvar`, `rcv_rtt`: microseconds
//! - `last_data_sent`, `last_ack_sent`, `last_data_recv`, `last_ack_recv`: milliseconds
//! - `snd_cwnd`, `snd_ssthresh`, `unacked`, ...: segments
//! - `pmtu`, `snd_mss`, `rcv_mss`, `advmss`, `rcv_space`: bytes
//!
//! Helpers such as [`TcpInfo::rtt_ms`] derive display values without
//! touching the stored fields.
//!
//! ## Typed Views Over Raw Bytes
//!
//! `state` and `ca_state` stay `u8` so that a value from a newer kernel the
//! crate doesn't know about still round-trips. [`TcpState`] and [`CaState`]
//! are optional decodes on top.

use serde::{Deserialize, Serialize};

use crate::{
    TCP_CA_CWR, TCP_CA_DISORDER, TCP_CA_LOSS, TCP_CA_OPEN, TCP_CA_RECOVERY, TCP_CLOSE,
    TCP_CLOSE_WAIT, TCP_CLOSING, TCP_ESTABLISHED, TCP_FIN_WAIT1, TCP_FIN_WAIT2, TCP_LAST_ACK,
    TCP_LISTEN, TCP_SYN_RECV, TCP_SYN_SENT, TCP_TIME_WAIT,
};

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One point-in-time read of kernel TCP connection state
///
/// Field names follow the kernel's `struct tcp_info` without the `tcpi_`
/// prefix. Every field except `snd_buf_size` comes from the same
/// `TCP_INFO` read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpInfo {
    // === Connection state ===
    pub state: u8,    // Logical TCP state (1=ESTABLISHED, ...)
    pub ca_state: u8, // Congestion-avoidance state (0=Open, ... 4=Loss)

    // === Reliability counters ===
    pub retransmits: u8, // Consecutive RTO expirations for the head segment
    pub probes: u8,      // Unanswered zero-window / keepalive probes
    pub backoff: u8,     // RTO backoff exponent
    pub options: u8,     // TCPI_OPT_* bitmask, see [`TcpOption`]

    // === Timeouts (microseconds) ===
    pub rto: u32,
    pub ato: u32,

    // === MSS (bytes) ===
    pub snd_mss: u32,
    pub rcv_mss: u32,

    // === Segment counts ===
    pub unacked: u32,
    pub sacked: u32,
    pub lost: u32,
    pub retrans: u32,
    pub fackets: u32,

    // === Time since last activity (milliseconds) ===
    pub last_data_sent: u32,
    pub last_ack_sent: u32,
    pub last_data_recv: u32,
    pub last_ack_recv: u32,

    // === Flow / window ===
    pub pmtu: u32,
    pub rcv_ssthresh: u32,
    pub rtt: u32,    // Smoothed RTT (microseconds)
    pub rttvar: u32, // RTT variance (microseconds)
    pub snd_ssthresh: u32,
    pub snd_cwnd: u32,
    pub advmss: u32,
    pub reordering: u32,
    pub rcv_rtt: u32, // Receiver-side RTT estimate (microseconds)
    pub rcv_space: u32,

    pub total_retrans: u32, // Lifetime retransmitted segments

    /// Configured `SO_SNDBUF` in bytes.
    ///
    /// Read with a separate `getsockopt` call. When that call fails the
    /// query still succeeds and this field is `0`; the `TCP_INFO` payload is
    /// what matters, the buffer size is supplementary.
    pub snd_buf_size: i32,
}

impl TcpInfo {
    /// Typed view of `state`, `None` for values this crate doesn't know.
    #[must_use]
    pub fn tcp_state(&self) -> Option<TcpState> {
        TcpState::try_from(self.state).ok()
    }

    /// Typed view of `ca_state`.
    #[must_use]
    pub fn ca_state(&self) -> Option<CaState> {
        CaState::try_from(self.ca_state).ok()
    }

    #[must_use]
    pub fn is_established(&self) -> bool {
        self.state == TCP_ESTABLISHED
    }

    /// Smoothed RTT in milliseconds (kernel reports microseconds)
    #[must_use]
    pub fn rtt_ms(&self) -> f64 {
        f64::from(self.rtt) / 1000.0
    }

    /// RTT variance in milliseconds
    #[must_use]
    pub fn rtt_var_ms(&self) -> f64 {
        f64::from(self.rttvar) / 1000.0
    }

    /// Whether the kernel negotiated `option` on this connection
    #[must_use]
    pub fn has_option(&self, option: TcpOption) -> bool {
        self.options & option.bit() != 0
    }
}

// ============================================================================
// TCP STATE
// ============================================================================

/// Logical TCP state, as numbered by the Linux kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TcpState {
    Established = TCP_ESTABLISHED,
    SynSent = TCP_SYN_SENT,
    SynRecv = TCP_SYN_RECV,
    FinWait1 = TCP_FIN_WAIT1,
    FinWait2 = TCP_FIN_WAIT2,
    TimeWait = TCP_TIME_WAIT,
    Close = TCP_CLOSE,
    CloseWait = TCP_CLOSE_WAIT,
    LastAck = TCP_LAST_ACK,
    Listen = TCP_LISTEN,
    Closing = TCP_CLOSING,
}

impl TryFrom<u8> for TcpState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            TCP_ESTABLISHED => Ok(TcpState::Established),
            TCP_SYN_SENT => Ok(TcpState::SynSent),
            TCP_SYN_RECV => Ok(TcpState::SynRecv),
            TCP_FIN_WAIT1 => Ok(TcpState::FinWait1),
            TCP_FIN_WAIT2 => Ok(TcpState::FinWait2),
            TCP_TIME_WAIT => Ok(TcpState::TimeWait),
            TCP_CLOSE => Ok(TcpState::Close),
            TCP_CLOSE_WAIT => Ok(TcpState::CloseWait),
            TCP_LAST_ACK => Ok(TcpState::LastAck),
            TCP_LISTEN => Ok(TcpState::Listen),
            TCP_CLOSING => Ok(TcpState::Closing),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(crate::get_tcp_state_name(*self as u8))
    }
}

// ============================================================================
// CONGESTION-AVOIDANCE STATE
// ============================================================================

/// Congestion-avoidance state machine position (`enum tcp_ca_state`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CaState {
    Open = TCP_CA_OPEN,
    Disorder = TCP_CA_DISORDER,
    Cwr = TCP_CA_CWR,
    Recovery = TCP_CA_RECOVERY,
    Loss = TCP_CA_LOSS,
}

impl TryFrom<u8> for CaState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            TCP_CA_OPEN => Ok(CaState::Open),
            TCP_CA_DISORDER => Ok(CaState::Disorder),
            TCP_CA_CWR => Ok(CaState::Cwr),
            TCP_CA_RECOVERY => Ok(CaState::Recovery),
            TCP_CA_LOSS => Ok(CaState::Loss),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for CaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(crate::get_ca_state_name(*self as u8))
    }
}

// ============================================================================
// TCP OPTIONS
// ============================================================================

/// Bits of `tcpi_options` (`TCPI_OPT_*` in `linux/tcp.h`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpOption {
    Timestamps,
    Sack,
    WindowScale,
    Ecn,
    EcnSeen,
    SynData,
}

impl TcpOption {
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            TcpOption::Timestamps => 0x01,
            TcpOption::Sack => 0x02,
            TcpOption::WindowScale => 0x04,
            TcpOption::Ecn => 0x08,
            TcpOption::EcnSeen => 0x10,
            TcpOption::SynData => 0x20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_state_decode() {
        let info = TcpInfo {
            state: TCP_ESTABLISHED,
            ..TcpInfo::default()
        };
        assert_eq!(info.tcp_state(), Some(TcpState::Established));
        assert!(info.is_established());

        let info = TcpInfo {
            state: 0xEE,
            ..TcpInfo::default()
        };
        assert_eq!(info.tcp_state(), None);
        assert!(!info.is_established());
    }

    #[test]
    fn test_tcp_state_round_trips_through_u8() {
        for raw in 1..=11u8 {
            let state = TcpState::try_from(raw).expect("kernel states 1..=11 are known");
            assert_eq!(state as u8, raw);
        }
        assert_eq!(TcpState::try_from(0), Err(0));
        assert_eq!(TcpState::try_from(12), Err(12));
    }

    #[test]
    fn test_ca_state_decode() {
        let info = TcpInfo {
            ca_state: TCP_CA_RECOVERY,
            ..TcpInfo::default()
        };
        assert_eq!(info.ca_state(), Some(CaState::Recovery));
        assert_eq!(CaState::try_from(5), Err(5));
        assert_eq!(CaState::Loss.to_string(), "LOSS");
    }

    #[test]
    fn test_rtt_helpers_do_not_touch_raw_fields() {
        let info = TcpInfo {
            rtt: 45_000,
            rttvar: 2_500,
            ..TcpInfo::default()
        };
        assert_eq!(info.rtt_ms(), 45.0);
        assert_eq!(info.rtt_var_ms(), 2.5);
        assert_eq!(info.rtt, 45_000);
    }

    #[test]
    fn test_has_option() {
        let info = TcpInfo {
            options: TcpOption::Timestamps.bit() | TcpOption::Sack.bit(),
            ..TcpInfo::default()
        };
        assert!(info.has_option(TcpOption::Timestamps));
        assert!(info.has_option(TcpOption::Sack));
        assert!(!info.has_option(TcpOption::WindowScale));
        assert!(!info.has_option(TcpOption::Ecn));
    }

    #[test]
    fn test_snapshot_serializes_raw_units() {
        let info = TcpInfo {
            state: TCP_ESTABLISHED,
            rtt: 1234,
            last_data_recv: 50,
            snd_buf_size: 16384,
            ..TcpInfo::default()
        };
        let json = serde_json::to_value(info).expect("serialize");
        assert_eq!(json["state"], 1);
        assert_eq!(json["rtt"], 1234);
        assert_eq!(json["last_data_recv"], 50);
        assert_eq!(json["snd_buf_size"], 16384);
    }
}
