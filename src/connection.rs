//! Scoped access to a connection's raw socket
//!
//! The query needs the OS descriptor behind a connection object, but must
//! never own it, close it or let it leak out of the query.
//!
//! # Educational Notes
//!
//! ## Guarded Acquisition
//!
//! Instead of a `fn raw_fd(&self) -> RawFd` getter (which would let callers
//! keep a number that may later refer to a different socket), the
//! [`TcpConnection`] trait lends the socket to a closure:
//!
//! ```text
//! acquire ──► f(SocketHandle<'_>) ──► release
//! ```
//!
//! `SocketHandle<'a>` borrows from the connection for `'a`, and the closure
//! must work for *any* such lifetime, so the handle cannot be returned or
//! stored. The descriptor number itself is `pub(crate)`.
//!
//! ## Connections That Can Be Closed Elsewhere
//!
//! A plain `&TcpStream` can't be closed while borrowed, so acquiring its
//! socket always succeeds. [`SharedTcpStream`] models a connection shared
//! between threads where one of them may close it: the query holds a read
//! lock for the whole callback, so `close()` waits until the read is done.

use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TcpInfoError;

#[cfg(unix)]
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsSocket, BorrowedSocket};

// ============================================================================
// SOCKET HANDLE
// ============================================================================

/// Non-owning, lifetime-bound view of a connection's OS socket
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(unix), allow(dead_code))]
pub struct SocketHandle<'a> {
    #[cfg(unix)]
    fd: BorrowedFd<'a>,
    #[cfg(windows)]
    socket: BorrowedSocket<'a>,
    #[cfg(not(any(unix, windows)))]
    _marker: std::marker::PhantomData<&'a ()>,
}

#[cfg(unix)]
impl<'a> SocketHandle<'a> {
    /// Wrap a borrowed descriptor. The borrow keeps the socket open.
    #[must_use]
    pub fn new(fd: BorrowedFd<'a>) -> Self {
        Self { fd }
    }

    #[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
    pub(crate) fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(windows)]
impl<'a> SocketHandle<'a> {
    #[must_use]
    pub fn new(socket: BorrowedSocket<'a>) -> Self {
        Self { socket }
    }
}

// ============================================================================
// CONNECTION TRAIT
// ============================================================================

/// A TCP connection that can lend its raw socket for one guarded operation
///
/// Implementations must keep the descriptor valid and stable until `f`
/// returns, and must not transfer ownership of it.
pub trait TcpConnection {
    /// Run `f` with the connection's socket.
    ///
    /// Fails with [`TcpInfoError::HandleUnavailable`] if the connection can
    /// no longer provide a descriptor.
    fn with_socket<R, F>(&self, f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R;
}

impl TcpConnection for TcpStream {
    #[cfg(unix)]
    fn with_socket<R, F>(&self, f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R,
    {
        Ok(f(SocketHandle::new(self.as_fd())))
    }

    #[cfg(windows)]
    fn with_socket<R, F>(&self, f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R,
    {
        Ok(f(SocketHandle::new(self.as_socket())))
    }

    #[cfg(not(any(unix, windows)))]
    fn with_socket<R, F>(&self, _f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R,
    {
        Err(TcpInfoError::HandleUnavailable(
            "no raw socket access on this platform".to_string(),
        ))
    }
}

impl<T: TcpConnection + ?Sized> TcpConnection for Arc<T> {
    fn with_socket<R, F>(&self, f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R,
    {
        (**self).with_socket(f)
    }
}

// ============================================================================
// SHARED, CLOSABLE CONNECTION
// ============================================================================

/// A `TcpStream` shared between threads, closable by any holder
///
/// Cloning is cheap (`Arc`). After [`close`](Self::close) every clone sees a
/// closed connection, and queries through it fail with
/// [`TcpInfoError::HandleUnavailable`].
///
/// # Example
///
/// ```no_run
/// use std::net::TcpStream;
/// use tcp_vitals::{SharedTcpStream, TcpInfoError, query_tcp_health};
///
/// let conn = SharedTcpStream::new(TcpStream::connect("127.0.0.1:8080")?);
/// let watcher = conn.clone();
///
/// conn.close();
/// assert!(matches!(
///     query_tcp_health(&watcher),
///     Err(TcpInfoError::HandleUnavailable(_))
/// ));
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SharedTcpStream {
    inner: Arc<RwLock<Option<TcpStream>>>,
}

impl SharedTcpStream {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(stream))),
        }
    }

    /// Shut down and drop the stream.
    ///
    /// Blocks until in-flight queries release their read lock. Returns
    /// `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let mut guard = self.inner.write();
        match guard.take() {
            Some(stream) => {
                // Peer may already be gone; the drop below closes the fd regardless.
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    /// Borrow the stream for I/O, `None` once closed.
    pub fn with_stream<R>(&self, f: impl FnOnce(&TcpStream) -> R) -> Option<R> {
        self.inner.read().as_ref().map(f)
    }
}

impl From<TcpStream> for SharedTcpStream {
    fn from(stream: TcpStream) -> Self {
        Self::new(stream)
    }
}

impl TcpConnection for SharedTcpStream {
    fn with_socket<R, F>(&self, f: F) -> Result<R, TcpInfoError>
    where
        F: FnOnce(SocketHandle<'_>) -> R,
    {
        // Held until the callback returns: close() cannot run mid-read.
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(stream) => stream.with_socket(f),
            None => Err(TcpInfoError::HandleUnavailable(
                "connection closed".to_string(),
            )),
        }
    }
}
