//! Tunnel-interface capability
//!
//! The handshake engine and the sweeper only need a narrow set of operations
//! on tunnel interfaces: create and destroy, remote endpoint and key, MTU,
//! point-to-point addresses, and packet counters. [`Ifconfig`] captures that
//! surface; [`SystemIfconfig`] talks to the fastd kernel driver through
//! interface ioctls on FreeBSD and reports `Unsupported` elsewhere, so the
//! engine stays testable with a mock implementation.

pub(crate) mod ioctl;

#[cfg(target_os = "freebsd")]
mod sys_freebsd;
#[cfg(target_os = "freebsd")]
use sys_freebsd as sys;

#[cfg(not(target_os = "freebsd"))]
mod sys_stub;
#[cfg(not(target_os = "freebsd"))]
use sys_stub as sys;

use crate::codec::Sockaddr;
use crate::crypto::KEY_SIZE;
use std::io;
use std::net::IpAddr;

/// Name prefix of the tunnel interfaces managed by this server
pub const IFACE_PREFIX: &str = "fastd";

/// Interface packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct IfaceStats {
    pub ipackets: u64,
    pub opackets: u64,
}

/// Operations the core consumes from the OS interface plumbing
pub trait Ifconfig: Send + Sync {
    /// Creates a tunnel interface bound to `remote`/`pubkey`, using `hint` as
    /// the name template. Returns the chosen interface name.
    fn create(&self, hint: &str, remote: &Sockaddr, pubkey: &[u8; KEY_SIZE])
    -> io::Result<String>;

    fn destroy(&self, ifname: &str) -> io::Result<()>;

    fn set_remote(
        &self,
        ifname: &str,
        remote: &Sockaddr,
        pubkey: &[u8; KEY_SIZE],
    ) -> io::Result<()>;

    fn get_remote(&self, ifname: &str) -> io::Result<(Sockaddr, [u8; KEY_SIZE])>;

    /// Sets the local and destination address of the point-to-point
    /// interface.
    fn set_addr_ptp(&self, ifname: &str, addr: IpAddr, dstaddr: IpAddr) -> io::Result<()>;

    fn set_mtu(&self, ifname: &str, mtu: u16) -> io::Result<()>;

    fn stats(&self, ifname: &str) -> io::Result<IfaceStats>;
}

/// The real OS implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIfconfig;

impl Ifconfig for SystemIfconfig {
    fn create(
        &self,
        hint: &str,
        remote: &Sockaddr,
        pubkey: &[u8; KEY_SIZE],
    ) -> io::Result<String> {
        sys::create(hint, remote, pubkey)
    }

    fn destroy(&self, ifname: &str) -> io::Result<()> {
        sys::destroy(ifname)
    }

    fn set_remote(
        &self,
        ifname: &str,
        remote: &Sockaddr,
        pubkey: &[u8; KEY_SIZE],
    ) -> io::Result<()> {
        sys::set_remote(ifname, remote, pubkey)
    }

    fn get_remote(&self, ifname: &str) -> io::Result<(Sockaddr, [u8; KEY_SIZE])> {
        sys::get_remote(ifname)
    }

    fn set_addr_ptp(&self, ifname: &str, addr: IpAddr, dstaddr: IpAddr) -> io::Result<()> {
        sys::set_addr_ptp(ifname, addr, dstaddr)
    }

    fn set_mtu(&self, ifname: &str, mtu: u16) -> io::Result<()> {
        sys::set_mtu(ifname, mtu)
    }

    fn stats(&self, ifname: &str) -> io::Result<IfaceStats> {
        sys::stats(ifname)
    }
}

/// Lists the names of all network interfaces.
pub fn interface_names() -> io::Result<Vec<String>> {
    let head = unsafe { libc::if_nameindex() };
    if head.is_null() {
        return Err(io::Error::last_os_error());
    }

    let mut names = Vec::new();
    let mut cur = head;
    unsafe {
        while !(*cur).if_name.is_null() && (*cur).if_index != 0 {
            let name = std::ffi::CStr::from_ptr((*cur).if_name);
            names.push(name.to_string_lossy().into_owned());
            cur = cur.add(1);
        }
        libc::if_freenameindex(head);
    }
    Ok(names)
}
