//! `getsockopt`-based TCP_INFO backend (Linux, Android)
//!
//! # Educational Notes
//!
//! ## The Two Reads
//!
//! While the connection lends us its socket we issue two independent calls:
//!
//! 1. `getsockopt(SOL_SOCKET, SO_SNDBUF)` (socket layer) -> send buffer size
//! 2. `getsockopt(IPPROTO_TCP, TCP_INFO)` (TCP layer) -> `struct tcp_info`
//!
//! They live in unrelated kernel subsystems and fail independently. The
//! first one is best-effort (a failure leaves `snd_buf_size` at 0); the
//! second is the payload, and its failure fails the whole query.
//!
//! ## Kernel Structure Prefix
//!
//! `struct tcp_info` keeps growing (pacing rate, byte counters, delivery
//! rate, ...), but new fields are only ever appended. We pass a buffer sized
//! for the prefix ending at `tcpi_total_retrans`, which every kernel since
//! 3.x fills completely; the kernel copies `min(our size, its size)` bytes
//! and reports how many it wrote.

use std::io;
use std::mem;
use std::os::fd::RawFd;

use super::TcpInfoBackend;
use crate::connection::TcpConnection;
use crate::error::TcpInfoError;
use crate::snapshot::TcpInfo;

// ============================================================================
// KERNEL LAYOUT
// ============================================================================

/// `struct tcp_info` from `linux/tcp.h`, up to and including `tcpi_total_retrans`
///
/// Size: 8 + 24 * 4 = 104 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RawTcpInfo {
    // === State and options (8 bytes) ===
    pub tcpi_state: u8,
    pub tcpi_ca_state: u8,
    pub tcpi_retransmits: u8,
    pub tcpi_probes: u8,
    pub tcpi_backoff: u8,
    pub tcpi_options: u8,
    pub tcpi_snd_rcv_wscale: u8, // snd_wscale:4, rcv_wscale:4 bitfield
    pub tcpi_delivery_rate_app_limited: u8, // app_limited:1, fastopen_client_fail:2 bitfield

    // === Timeouts (microseconds) ===
    pub tcpi_rto: u32,
    pub tcpi_ato: u32,

    // === MSS ===
    pub tcpi_snd_mss: u32,
    pub tcpi_rcv_mss: u32,

    // === Segment counts ===
    pub tcpi_unacked: u32,
    pub tcpi_sacked: u32,
    pub tcpi_lost: u32,
    pub tcpi_retrans: u32,
    pub tcpi_fackets: u32,

    // === Times (milliseconds) ===
    pub tcpi_last_data_sent: u32,
    pub tcpi_last_ack_sent: u32,
    pub tcpi_last_data_recv: u32,
    pub tcpi_last_ack_recv: u32,

    // === Metrics ===
    pub tcpi_pmtu: u32,
    pub tcpi_rcv_ssthresh: u32,
    pub tcpi_rtt: u32,
    pub tcpi_rttvar: u32,
    pub tcpi_snd_ssthresh: u32,
    pub tcpi_snd_cwnd: u32,
    pub tcpi_advmss: u32,
    pub tcpi_reordering: u32,

    pub tcpi_rcv_rtt: u32,
    pub tcpi_rcv_space: u32,

    pub tcpi_total_retrans: u32,
}

const RAW_TCP_INFO_LEN: usize = mem::size_of::<RawTcpInfo>();

// Layout drift here would silently shift every field after it.
const _: () = assert!(RAW_TCP_INFO_LEN == 104);

impl RawTcpInfo {
    /// Field-by-field copy into the portable snapshot.
    ///
    /// Both sides are spelled out without `..`, so adding a field to either
    /// struct fails to compile until it is mapped here. Units are kept as
    /// the kernel reported them.
    pub(crate) fn into_snapshot(self, snd_buf_size: i32) -> TcpInfo {
        let RawTcpInfo {
            tcpi_state,
            tcpi_ca_state,
            tcpi_retransmits,
            tcpi_probes,
            tcpi_backoff,
            tcpi_options,
            tcpi_snd_rcv_wscale: _,
            tcpi_delivery_rate_app_limited: _,
            tcpi_rto,
            tcpi_ato,
            tcpi_snd_mss,
            tcpi_rcv_mss,
            tcpi_unacked,
            tcpi_sacked,
            tcpi_lost,
            tcpi_retrans,
            tcpi_fackets,
            tcpi_last_data_sent,
            tcpi_last_ack_sent,
            tcpi_last_data_recv,
            tcpi_last_ack_recv,
            tcpi_pmtu,
            tcpi_rcv_ssthresh,
            tcpi_rtt,
            tcpi_rttvar,
            tcpi_snd_ssthresh,
            tcpi_snd_cwnd,
            tcpi_advmss,
            tcpi_reordering,
            tcpi_rcv_rtt,
            tcpi_rcv_space,
            tcpi_total_retrans,
        } = self;

        TcpInfo {
            state: tcpi_state,
            ca_state: tcpi_ca_state,
            retransmits: tcpi_retransmits,
            probes: tcpi_probes,
            backoff: tcpi_backoff,
            options: tcpi_options,
            rto: tcpi_rto,
            ato: tcpi_ato,
            snd_mss: tcpi_snd_mss,
            rcv_mss: tcpi_rcv_mss,
            unacked: tcpi_unacked,
            sacked: tcpi_sacked,
            lost: tcpi_lost,
            retrans: tcpi_retrans,
            fackets: tcpi_fackets,
            last_data_sent: tcpi_last_data_sent,
            last_ack_sent: tcpi_last_ack_sent,
            last_data_recv: tcpi_last_data_recv,
            last_ack_recv: tcpi_last_ack_recv,
            pmtu: tcpi_pmtu,
            rcv_ssthresh: tcpi_rcv_ssthresh,
            rtt: tcpi_rtt,
            rttvar: tcpi_rttvar,
            snd_ssthresh: tcpi_snd_ssthresh,
            snd_cwnd: tcpi_snd_cwnd,
            advmss: tcpi_advmss,
            reordering: tcpi_reordering,
            rcv_rtt: tcpi_rcv_rtt,
            rcv_space: tcpi_rcv_space,
            total_retrans: tcpi_total_retrans,
            snd_buf_size,
        }
    }
}

// ============================================================================
// BACKEND
// ============================================================================

pub(crate) struct LinuxBackend;

impl TcpInfoBackend for LinuxBackend {
    const SUPPORTED: bool = true;

    fn query<C: TcpConnection + ?Sized>(conn: &C) -> Result<TcpInfo, TcpInfoError> {
        conn.with_socket(|socket| {
            let fd = socket.as_raw_fd();
            let send_buffer = read_send_buffer_size(fd);
            let raw = read_tcp_info(fd);
            assemble(send_buffer, raw)
        })?
    }
}

/// Combine the two reads: the `TCP_INFO` result decides success, the
/// send-buffer result only fills in `snd_buf_size`.
pub(crate) fn assemble(
    send_buffer: io::Result<i32>,
    raw: io::Result<RawTcpInfo>,
) -> Result<TcpInfo, TcpInfoError> {
    let raw = raw.map_err(TcpInfoError::QueryFailed)?;
    Ok(raw.into_snapshot(send_buffer.unwrap_or(0)))
}

// ============================================================================
// SYSCALLS
// ============================================================================

/// `SO_SNDBUF` as the kernel reports it (already doubled for bookkeeping)
fn read_send_buffer_size(fd: RawFd) -> io::Result<i32> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `fd` is borrowed for the duration of the call, and `value`/`len`
    // point to live stack storage of the size we report.
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            (&raw mut value).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if ret == 0 {
        Ok(value)
    } else {
        Err(io::Error::last_os_error())
    }
}

fn read_tcp_info(fd: RawFd) -> io::Result<RawTcpInfo> {
    let mut info = RawTcpInfo::default();
    let mut len = RAW_TCP_INFO_LEN as libc::socklen_t;

    // SAFETY: RawTcpInfo is repr(C) plain integers, so any bytes the kernel
    // writes are a valid value; it writes at most `len` bytes.
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            (&raw mut info).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    check_len(len as usize)?;
    Ok(info)
}

/// Reject a short write instead of returning zero-filled trailing fields.
fn check_len(written: usize) -> io::Result<()> {
    if written < RAW_TCP_INFO_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("tcp_info truncated: kernel wrote {written} bytes, need {RAW_TCP_INFO_LEN}"),
        ));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
