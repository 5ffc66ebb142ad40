//! FreeBSD interface plumbing for the fastd driver
//!
//! Interface create/destroy go through the generic cloning ioctls; remote
//! endpoint, key and counters go through the driver-spec ioctls the fastd
//! kernel module exposes.

use crate::codec::Sockaddr;
use crate::codec::sockaddr::SOCKADDR_SIZE;
use crate::crypto::KEY_SIZE;
use crate::iface::IfaceStats;
use crate::iface::ioctl::{ioctl, iow, iowr};
use std::io;
use std::mem;
use std::net::IpAddr;
use std::os::fd::AsRawFd;

const IFNAMSIZ: usize = 16;

// Driver-spec commands of the fastd module
const PARAM_GET_REMOTE: libc::c_ulong = 0;
const PARAM_SET_REMOTE: libc::c_ulong = 1;
const PARAM_GET_STATS: libc::c_ulong = 2;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; IFNAMSIZ],
    ifr_ifru: IfrIfru,
}

#[repr(C)]
union IfrIfru {
    data: *mut libc::c_void,
    mtu: libc::c_int,
    pad: [u8; 16],
}

#[repr(C)]
struct IfDrv {
    ifd_name: [libc::c_char; IFNAMSIZ],
    ifd_cmd: libc::c_ulong,
    ifd_len: libc::size_t,
    ifd_data: *mut libc::c_void,
}

/// Parameter block of the get/set remote driver-spec calls
#[repr(C)]
struct IfconfigParam {
    pubkey: [u8; KEY_SIZE],
    remote: [u8; SOCKADDR_SIZE],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrIn {
    sin_len: u8,
    sin_family: u8,
    sin_port: u16,
    sin_addr: [u8; 4],
    sin_zero: [u8; 8],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrIn6 {
    sin6_len: u8,
    sin6_family: u8,
    sin6_port: u16,
    sin6_flowinfo: u32,
    sin6_addr: [u8; 16],
    sin6_scope_id: u32,
}

#[repr(C)]
struct InAliasReq {
    ifra_name: [libc::c_char; IFNAMSIZ],
    ifra_addr: SockaddrIn,
    ifra_dstaddr: SockaddrIn,
    ifra_mask: SockaddrIn,
}

#[repr(C)]
struct In6AddrLifetime {
    ia6t_expire: libc::time_t,
    ia6t_preferred: libc::time_t,
    ia6t_vltime: u32,
    ia6t_pltime: u32,
}

#[repr(C)]
struct In6AliasReq {
    ifra_name: [libc::c_char; IFNAMSIZ],
    ifra_addr: SockaddrIn6,
    ifra_dstaddr: SockaddrIn6,
    ifra_prefixmask: SockaddrIn6,
    ifra_flags: libc::c_int,
    ifra_lifetime: In6AddrLifetime,
}

const SIOCSIFMTU: u64 = iow(b'i', 52, mem::size_of::<IfReq>());
const SIOCIFDESTROY: u64 = iow(b'i', 121, mem::size_of::<IfReq>());
const SIOCSDRVSPEC: u64 = iow(b'i', 122, mem::size_of::<IfDrv>());
const SIOCGDRVSPEC: u64 = iowr(b'i', 123, mem::size_of::<IfDrv>());
const SIOCIFCREATE2: u64 = iowr(b'i', 124, mem::size_of::<IfReq>());
const SIOCAIFADDR: u64 = iow(b'i', 26, mem::size_of::<InAliasReq>());
const SIOCAIFADDR_IN6: u64 = iow(b'i', 27, mem::size_of::<In6AliasReq>());

fn write_name(out: &mut [libc::c_char; IFNAMSIZ], name: &str) -> io::Result<()> {
    if name.len() >= IFNAMSIZ {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "ifname too long"));
    }
    out.fill(0);
    for (dst, src) in out.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    Ok(())
}

fn read_name(name: &[libc::c_char; IFNAMSIZ]) -> String {
    name.iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8 as char)
        .collect()
}

/// Runs `f` with a datagram control socket for interface ioctls.
fn with_control_fd<R>(f: impl FnOnce(std::os::fd::RawFd) -> io::Result<R>) -> io::Result<R> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    f(socket.as_raw_fd())
}

fn remote_param(remote: &Sockaddr, pubkey: &[u8; KEY_SIZE]) -> IfconfigParam {
    IfconfigParam {
        pubkey: *pubkey,
        remote: remote.raw(),
    }
}

fn drvspec(
    ifname: &str,
    request: u64,
    cmd: libc::c_ulong,
    data: *mut libc::c_void,
    len: usize,
) -> io::Result<()> {
    let mut ifd = IfDrv {
        ifd_name: [0; IFNAMSIZ],
        ifd_cmd: cmd,
        ifd_len: len,
        ifd_data: data,
    };
    write_name(&mut ifd.ifd_name, ifname)?;
    with_control_fd(|fd| ioctl(fd, request, &mut ifd as *mut IfDrv as *mut libc::c_void))
}

pub(crate) fn create(
    hint: &str,
    remote: &Sockaddr,
    pubkey: &[u8; KEY_SIZE],
) -> io::Result<String> {
    let mut param = remote_param(remote, pubkey);
    let mut ifr = IfReq {
        ifr_name: [0; IFNAMSIZ],
        ifr_ifru: IfrIfru {
            data: &mut param as *mut IfconfigParam as *mut libc::c_void,
        },
    };
    write_name(&mut ifr.ifr_name, hint)?;
    with_control_fd(|fd| ioctl(fd, SIOCIFCREATE2, &mut ifr as *mut IfReq as *mut libc::c_void))?;
    Ok(read_name(&ifr.ifr_name))
}

pub(crate) fn destroy(ifname: &str) -> io::Result<()> {
    let mut ifr = IfReq {
        ifr_name: [0; IFNAMSIZ],
        ifr_ifru: IfrIfru { pad: [0; 16] },
    };
    write_name(&mut ifr.ifr_name, ifname)?;
    with_control_fd(|fd| ioctl(fd, SIOCIFDESTROY, &mut ifr as *mut IfReq as *mut libc::c_void))
}

pub(crate) fn set_remote(
    ifname: &str,
    remote: &Sockaddr,
    pubkey: &[u8; KEY_SIZE],
) -> io::Result<()> {
    let mut param = remote_param(remote, pubkey);
    drvspec(
        ifname,
        SIOCSDRVSPEC,
        PARAM_SET_REMOTE,
        &mut param as *mut IfconfigParam as *mut libc::c_void,
        mem::size_of::<IfconfigParam>(),
    )
}

pub(crate) fn get_remote(ifname: &str) -> io::Result<(Sockaddr, [u8; KEY_SIZE])> {
    let mut param = IfconfigParam {
        pubkey: [0; KEY_SIZE],
        remote: [0; SOCKADDR_SIZE],
    };
    drvspec(
        ifname,
        SIOCGDRVSPEC,
        PARAM_GET_REMOTE,
        &mut param as *mut IfconfigParam as *mut libc::c_void,
        mem::size_of::<IfconfigParam>(),
    )?;
    let remote = Sockaddr::parse(&param.remote)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad remote sockaddr"))?;
    Ok((remote, param.pubkey))
}

pub(crate) fn set_addr_ptp(ifname: &str, addr: IpAddr, dstaddr: IpAddr) -> io::Result<()> {
    match (addr, dstaddr) {
        (IpAddr::V4(local), IpAddr::V4(dest)) => {
            let sin = |a: std::net::Ipv4Addr| SockaddrIn {
                sin_len: mem::size_of::<SockaddrIn>() as u8,
                sin_family: libc::AF_INET as u8,
                sin_port: 0,
                sin_addr: a.octets(),
                sin_zero: [0; 8],
            };
            let mut req = InAliasReq {
                ifra_name: [0; IFNAMSIZ],
                ifra_addr: sin(local),
                ifra_dstaddr: sin(dest),
                ifra_mask: sin(std::net::Ipv4Addr::BROADCAST),
            };
            write_name(&mut req.ifra_name, ifname)?;
            with_control_fd(|fd| {
                ioctl(fd, SIOCAIFADDR, &mut req as *mut InAliasReq as *mut libc::c_void)
            })
        }
        (IpAddr::V6(local), IpAddr::V6(dest)) => {
            let sin6 = |a: std::net::Ipv6Addr| SockaddrIn6 {
                sin6_len: mem::size_of::<SockaddrIn6>() as u8,
                sin6_family: libc::AF_INET6 as u8,
                sin6_port: 0,
                sin6_flowinfo: 0,
                sin6_addr: a.octets(),
                sin6_scope_id: 0,
            };
            let mut req = In6AliasReq {
                ifra_name: [0; IFNAMSIZ],
                ifra_addr: sin6(local),
                ifra_dstaddr: sin6(dest),
                ifra_prefixmask: sin6(std::net::Ipv6Addr::from([0xffu8; 16])),
                ifra_flags: 0,
                ifra_lifetime: In6AddrLifetime {
                    ia6t_expire: 0,
                    ia6t_preferred: 0,
                    ia6t_vltime: u32::MAX,
                    ia6t_pltime: u32::MAX,
                },
            };
            write_name(&mut req.ifra_name, ifname)?;
            with_control_fd(|fd| {
                ioctl(
                    fd,
                    SIOCAIFADDR_IN6,
                    &mut req as *mut In6AliasReq as *mut libc::c_void,
                )
            })
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "address family mismatch",
        )),
    }
}

pub(crate) fn set_mtu(ifname: &str, mtu: u16) -> io::Result<()> {
    let mut ifr = IfReq {
        ifr_name: [0; IFNAMSIZ],
        ifr_ifru: IfrIfru {
            mtu: mtu as libc::c_int,
        },
    };
    write_name(&mut ifr.ifr_name, ifname)?;
    with_control_fd(|fd| ioctl(fd, SIOCSIFMTU, &mut ifr as *mut IfReq as *mut libc::c_void))
}

pub(crate) fn stats(ifname: &str) -> io::Result<IfaceStats> {
    let mut stats = IfaceStats::default();
    drvspec(
        ifname,
        SIOCGDRVSPEC,
        PARAM_GET_STATS,
        &mut stats as *mut IfaceStats as *mut libc::c_void,
        mem::size_of::<IfaceStats>(),
    )?;
    Ok(stats)
}
