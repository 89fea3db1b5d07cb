//! Platform backends for the TCP_INFO query
//!
//! # Architecture
//!
//! Exactly one backend is compiled in, chosen by `#[cfg]`:
//! - `linux`: real `getsockopt(TCP_INFO)` + `getsockopt(SO_SNDBUF)` (Linux, Android)
//! - `unsupported`: always returns [`TcpInfoError::Unsupported`]
//!
//! Both implement [`TcpInfoBackend`], and [`PlatformBackend`] aliases the one
//! that was selected. The façade in `lib.rs` only ever talks to
//! `PlatformBackend`, so call sites never branch on the platform.
//!
//! ## Conditional Compilation
//!
//! Unlike a runtime `if cfg!(...)`, `#[cfg]` removes the other backend from
//! the build entirely: on macOS the Linux syscall code isn't even type-checked,
//! and the stub's query compiles down to returning a constant error.

use crate::connection::TcpConnection;
use crate::error::TcpInfoError;
use crate::snapshot::TcpInfo;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) mod linux; // getsockopt-based backend (Linux only)

// Also built for tests so the stub contract is checked on Linux CI.
#[cfg(any(test, not(any(target_os = "linux", target_os = "android"))))]
pub(crate) mod unsupported; // Stub for every other platform

/// One way of turning a borrowed connection into a [`TcpInfo`]
pub(crate) trait TcpInfoBackend {
    /// Whether this backend can ever succeed
    const SUPPORTED: bool;

    fn query<C: TcpConnection + ?Sized>(conn: &C) -> Result<TcpInfo, TcpInfoError>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) type PlatformBackend = linux::LinuxBackend;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) type PlatformBackend = unsupported::UnsupportedBackend;
