// Only the FreeBSD fastd driver implements these operations.

use crate::codec::Sockaddr;
use crate::crypto::KEY_SIZE;
use crate::iface::IfaceStats;
use std::io;
use std::net::IpAddr;

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "not implemented on this platform")
}

pub(crate) fn create(
    _hint: &str,
    _remote: &Sockaddr,
    _pubkey: &[u8; KEY_SIZE],
) -> io::Result<String> {
    Err(unsupported())
}

pub(crate) fn destroy(_ifname: &str) -> io::Result<()> {
    Err(unsupported())
}

pub(crate) fn set_remote(
    _ifname: &str,
    _remote: &Sockaddr,
    _pubkey: &[u8; KEY_SIZE],
) -> io::Result<()> {
    Err(unsupported())
}

pub(crate) fn get_remote(_ifname: &str) -> io::Result<(Sockaddr, [u8; KEY_SIZE])> {
    Err(unsupported())
}

pub(crate) fn set_addr_ptp(_ifname: &str, _addr: IpAddr, _dstaddr: IpAddr) -> io::Result<()> {
    Err(unsupported())
}

pub(crate) fn set_mtu(_ifname: &str, _mtu: u16) -> io::Result<()> {
    Err(unsupported())
}

pub(crate) fn stats(_ifname: &str) -> io::Result<IfaceStats> {
    Err(unsupported())
}
