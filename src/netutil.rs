//! Local network helpers
//!
//! Interface address enumeration, private-address classification, TCP port
//! availability probing and symbolic host variables (`$inner_ip`,
//! `$iface<name>`). None of this is used by the TCP_INFO query; the probe
//! binary uses [`eval_ip_var`] to resolve its targets.
//!
//! # Platform Support
//!
//! Enumeration walks `getifaddrs(3)` and is available on Unix. Elsewhere the
//! enumeration functions return [`NetUtilError::Unsupported`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, TcpListener};

use crate::error::NetUtilError;

/// Host variable that expands to the first local private IPv4 address
pub const INNER_IP_VAR: &str = "$inner_ip";

/// Prefix of a host variable naming an interface, e.g. `$ifaceeth0`
pub const IFACE_VAR_PREFIX: &str = "$iface";

/// One address assigned to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub addr: IpAddr,
    pub scope_id: u32, // IPv6 scope (link-local needs it to bind); 0 for IPv4
    pub is_up: bool,
    pub is_loopback: bool,
}

// ============================================================================
// ENUMERATION
// ============================================================================

/// Owned `getifaddrs(3)` list, freed on drop
#[cfg(unix)]
struct IfAddrs {
    head: *mut libc::ifaddrs,
}

#[cfg(unix)]
impl IfAddrs {
    fn new() -> Result<Self, NetUtilError> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();

        // SAFETY: getifaddrs allocates the list and stores its head in `head`.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(NetUtilError::Interface(std::io::Error::last_os_error()));
        }
        Ok(Self { head })
    }

    /// Entries that carry an address, borrowed until the list is dropped
    fn iter(&self) -> impl Iterator<Item = &libc::ifaddrs> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            // SAFETY: non-null nodes of the list stay valid until freeifaddrs in Drop.
            let entry = unsafe { current.as_ref() }?;
            current = entry.ifa_next;
            Some(entry)
        })
        .filter(|entry| !entry.ifa_addr.is_null())
    }
}

#[cfg(unix)]
impl Drop for IfAddrs {
    fn drop(&mut self) {
        if !self.head.is_null() {
            // SAFETY: `head` came from a successful getifaddrs and is freed once.
            unsafe { libc::freeifaddrs(self.head) };
        }
    }
}

#[cfg(unix)]
fn sa_family(entry: &libc::ifaddrs) -> i32 {
    // SAFETY: IfAddrs::iter only yields entries with a non-null ifa_addr.
    i32::from(unsafe { (*entry.ifa_addr).sa_family })
}

/// Every IPv4/IPv6 address on every local interface
#[cfg(unix)]
pub fn list_interface_addrs() -> Result<Vec<InterfaceAddr>, NetUtilError> {
    let ifaddrs = IfAddrs::new()?;
    Ok(ifaddrs.iter().filter_map(interface_addr).collect())
}

#[cfg(not(unix))]
pub fn list_interface_addrs() -> Result<Vec<InterfaceAddr>, NetUtilError> {
    Err(NetUtilError::Unsupported)
}

#[cfg(unix)]
fn interface_addr(entry: &libc::ifaddrs) -> Option<InterfaceAddr> {
    use std::ffi::CStr;

    let (addr, scope_id) = match sa_family(entry) {
        libc::AF_INET => {
            let sa_in = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
            // s_addr is network order, so memory order is already a.b.c.d
            let ip = Ipv4Addr::from(sa_in.sin_addr.s_addr.to_ne_bytes());
            (IpAddr::V4(ip), 0)
        }
        libc::AF_INET6 => {
            let sa_in6 = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sa_in6.sin6_addr.s6_addr);
            (IpAddr::V6(ip), sa_in6.sin6_scope_id)
        }
        _ => return None,
    };

    let name = unsafe { CStr::from_ptr(entry.ifa_name) }
        .to_string_lossy()
        .into_owned();
    let flags = entry.ifa_flags as u32;

    Some(InterfaceAddr {
        name,
        addr,
        scope_id,
        is_up: flags & libc::IFF_UP as u32 != 0,
        is_loopback: flags & libc::IFF_LOOPBACK as u32 != 0,
    })
}

/// Hardware addresses of all interfaces that have a non-zero one
///
/// Formatted as lowercase `aa:bb:cc:dd:ee:ff`. Loopback (all zeros) is
/// skipped.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn mac_addresses() -> Result<Vec<String>, NetUtilError> {
    let ifaddrs = IfAddrs::new()?;
    Ok(ifaddrs
        .iter()
        .filter(|entry| sa_family(entry) == libc::AF_PACKET)
        .filter_map(|entry| {
            let sll = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_ll) };
            let len = usize::from(sll.sll_halen).min(sll.sll_addr.len());
            format_mac(&sll.sll_addr[..len])
        })
        .collect())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn mac_addresses() -> Result<Vec<String>, NetUtilError> {
    Err(NetUtilError::Unsupported)
}

/// `None` for empty or all-zero addresses
#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn format_mac(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|&b| b == 0) {
        return None;
    }
    let parts: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Some(parts.join(":"))
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// RFC 1918 private IPv4 (10/8, 172.16/12, 192.168/16). IPv6 is never private here.
#[inline]
#[must_use]
pub fn is_private_ipv4(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168)
        }
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| is_private_ipv4(IpAddr::V4(v4))),
    }
}

/// Private IPv4 addresses of non-loopback interfaces, in enumeration order
pub fn local_ips_without_loopback() -> Result<Vec<IpAddr>, NetUtilError> {
    Ok(list_interface_addrs()?
        .into_iter()
        .filter(|a| !a.is_loopback && !a.addr.is_loopback() && is_private_ipv4(a.addr))
        .map(|a| a.addr)
        .collect())
}

/// First IPv4 address of interface `name`
pub fn ipv4_by_interface(name: &str) -> Result<Ipv4Addr, NetUtilError> {
    list_interface_addrs()?
        .into_iter()
        .filter(|a| a.name == name)
        .find_map(|a| match a.addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| NetUtilError::InterfaceNotFound(name.to_string()))
}

/// Expand a host variable
///
/// - `$inner_ip` -> first of [`local_ips_without_loopback`]
/// - `$iface<name>` -> [`ipv4_by_interface`]`(name)`
/// - anything else is returned unchanged
pub fn eval_ip_var(var: &str) -> Result<String, NetUtilError> {
    if var == INNER_IP_VAR {
        return local_ips_without_loopback()?
            .first()
            .map(ToString::to_string)
            .ok_or(NetUtilError::NoInnerIp);
    }

    if let Some(iface) = var.strip_prefix(IFACE_VAR_PREFIX) {
        return ipv4_by_interface(iface).map(|ip| ip.to_string());
    }

    Ok(var.to_string())
}

// ============================================================================
// PORT PROBING
// ============================================================================

/// Whether a TCP listener could bind `port` on every local address
///
/// Binds (and immediately drops) a listener on each interface address and
/// then on the IPv4 and IPv6 wildcard addresses. `AddrInUse` anywhere means unavailable;
/// `AddrNotAvailable` (e.g. a tentative IPv6 address) skips that address.
/// Any other bind error is returned.
pub fn is_port_available(port: u16) -> Result<bool, NetUtilError> {
    let addrs = match list_interface_addrs() {
        Ok(addrs) => addrs,
        Err(NetUtilError::Unsupported) => Vec::new(),
        Err(e) => return Err(e),
    };

    for addr in bind_candidates(&addrs, port) {
        if !try_bind(addr)? {
            log::debug!("port {port} in use on {addr}");
            return Ok(false);
        }
    }

    Ok(true)
}

fn bind_candidates(addrs: &[InterfaceAddr], port: u16) -> Vec<SocketAddr> {
    addrs
        .iter()
        .map(|a| bind_addr(a, port))
        .chain([
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
        ])
        .collect()
}

fn bind_addr(iface: &InterfaceAddr, port: u16) -> SocketAddr {
    match iface.addr {
        IpAddr::V4(v4) => SocketAddr::from((v4, port)),
        IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, port, 0, iface.scope_id)),
    }
}

/// `Ok(true)` bound, `Ok(false)` in use, `Err` for anything unexpected
fn try_bind(addr: SocketAddr) -> Result<bool, NetUtilError> {
    match TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::AddrNotAvailable || is_family_unsupported(&e) => {
            log::debug!("skipping {addr}: {e}");
            Ok(true)
        }
        Err(source) => Err(NetUtilError::Listen { addr, source }),
    }
}

// IPv6 disabled on the host
#[cfg(unix)]
fn is_family_unsupported(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EAFNOSUPPORT)
}

#[cfg(not(unix))]
fn is_family_unsupported(_e: &std::io::Error) -> bool {
    false
}

// ============================================================================
// TESTS
// ============================================================================
