#![allow(dead_code)]

use rustd::codec::Sockaddr;
use rustd::crypto::KEY_SIZE;
use rustd::iface::{IfaceStats, Ifconfig};
use std::io;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Test keys from captured sessions
pub const SERVER_SECRET: &str = "800e8ff23adcc5df5f6b911581667821ebecf1ecd95b10b6b5f92f4ebef7704c";
pub const SERVER_PUBLIC: &str = "346a11a8bd8fcedfcde2e19c996b6e4497d0dafc3f5af7096c915bd0f9fe4fe9";
pub const CLIENT_SECRET: &str = "d82638e3bf436fe92c54649c33aca36064534d4171d7746b7ee36c822b8da149";
pub const CLIENT_EPHEMERAL: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e5f";

/// Records every capability call so tests can assert on interface handling
#[derive(Default)]
pub struct MockIfconfig {
    pub created: AtomicUsize,
    pub destroyed: Mutex<Vec<String>>,
    pub mtus: Mutex<Vec<(String, u16)>>,
    pub addrs: Mutex<Vec<(String, IpAddr, IpAddr)>>,
    pub ipackets: AtomicU64,
}

impl Ifconfig for MockIfconfig {
    fn create(
        &self,
        hint: &str,
        _remote: &Sockaddr,
        _pubkey: &[u8; KEY_SIZE],
    ) -> io::Result<String> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}{}", hint, n))
    }

    fn destroy(&self, ifname: &str) -> io::Result<()> {
        self.destroyed.lock().unwrap().push(ifname.to_string());
        Ok(())
    }

    fn set_remote(
        &self,
        _ifname: &str,
        _remote: &Sockaddr,
        _pubkey: &[u8; KEY_SIZE],
    ) -> io::Result<()> {
        Ok(())
    }

    fn get_remote(&self, _ifname: &str) -> io::Result<(Sockaddr, [u8; KEY_SIZE])> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn set_addr_ptp(&self, ifname: &str, addr: IpAddr, dstaddr: IpAddr) -> io::Result<()> {
        self.addrs
            .lock()
            .unwrap()
            .push((ifname.to_string(), addr, dstaddr));
        Ok(())
    }

    fn set_mtu(&self, ifname: &str, mtu: u16) -> io::Result<()> {
        self.mtus.lock().unwrap().push((ifname.to_string(), mtu));
        Ok(())
    }

    fn stats(&self, _ifname: &str) -> io::Result<IfaceStats> {
        Ok(IfaceStats {
            ipackets: self.ipackets.load(Ordering::SeqCst),
            opackets: 0,
        })
    }
}
