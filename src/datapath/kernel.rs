//! Kernel character-device transport
//!
//! The fastd kernel module exposes a character device that delivers one
//! handshake frame per read, prefixed with the source and destination
//! sockaddrs. Binding and unbinding listen addresses are device ioctls with
//! an 18-byte sockaddr payload. Data frames never reach userspace; the
//! module forwards them in-kernel through the per-peer tunnel interfaces.

use crate::codec::sockaddr::SOCKADDR_SIZE;
use crate::codec::{Message, Sockaddr};
use crate::datapath::InitialPeer;
use crate::iface::ioctl::{ioctl, iow};
use crate::iface::{IFACE_PREFIX, Ifconfig, interface_names};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Path of the fastd control device
pub const DEVICE_PATH: &str = "/dev/fastd";

const IOCTL_BIND: u64 = iow(b'F', 2, SOCKADDR_SIZE);
const IOCTL_CLOSE: u64 = iow(b'F', 3, SOCKADDR_SIZE);

const BUFFER_SIZE: usize = 1500;
const POLL_TIMEOUT_MS: libc::c_int = 60 * 1000;

pub struct KernelDatapath {
    dev: Arc<File>,
    stop: OwnedFd,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl KernelDatapath {
    pub(crate) fn open(
        binds: &[Sockaddr],
        inbound: mpsc::Sender<Message>,
    ) -> crate::Result<KernelDatapath> {
        let dev = Arc::new(
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(DEVICE_PATH)?,
        );

        for bind in binds {
            let mut raw = bind.raw();
            // a stale binding from a previous run may or may not exist
            let _ = ioctl(dev.as_raw_fd(), IOCTL_CLOSE, raw.as_mut_ptr() as *mut _);

            ioctl(dev.as_raw_fd(), IOCTL_BIND, raw.as_mut_ptr() as *mut _)
                .map_err(|e| format!("binding to {} failed: {}", bind, e))?;
            tracing::info!("kernel server bound to {}", bind);
        }

        let (stop_rx, stop_tx) = pipe()?;
        let reader_dev = dev.clone();
        let reader = std::thread::spawn(move || read_loop(reader_dev, stop_rx, inbound));

        Ok(KernelDatapath {
            dev,
            stop: stop_tx,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Submits the full frame, sockaddrs included, to the device.
    pub(crate) fn send(&self, msg: &Message) -> crate::Result<()> {
        (&*self.dev).write_all(&msg.marshal(true))?;
        Ok(())
    }

    pub(crate) fn close(&self) {
        // wake the reader out of its poll
        let res = unsafe { libc::write(self.stop.as_raw_fd(), [0u8].as_ptr() as *const _, 1) };
        if res < 0 {
            tracing::error!("stop signal failed: {}", std::io::Error::last_os_error());
        }
        if let Some(reader) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = reader.join();
        }
    }

    /// Recovers sessions from existing fastd interfaces. Interfaces that
    /// never finished a handshake (zero port) are destroyed instead.
    pub(crate) fn peers(&self, ifconfig: &dyn Ifconfig) -> Vec<InitialPeer> {
        let names = match interface_names() {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("failed to load interfaces: {}", e);
                return Vec::new();
            }
        };

        let mut peers = Vec::new();
        for ifname in names {
            if !ifname.starts_with(IFACE_PREFIX) {
                continue;
            }
            let (remote, public_key) = match ifconfig.get_remote(&ifname) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("failed to load session from {}: {}", ifname, e);
                    continue;
                }
            };
            if remote.port() == 0 {
                tracing::info!("destroying unestablished interface {}", ifname);
                if let Err(e) = ifconfig.destroy(&ifname) {
                    tracing::error!("failed to destroy {}: {}", ifname, e);
                }
                continue;
            }
            tracing::info!(
                "loaded existing session on {} for {} ({})",
                ifname,
                remote,
                hex::encode(public_key)
            );
            peers.push(InitialPeer {
                ifname,
                remote,
                public_key,
            });
        }
        peers
    }
}

fn pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Reads frames until the device goes away or a stop is signalled.
///
/// The device returns end-of-file when no frame is queued; the loop then
/// parks in poll(2) until the device becomes readable again. POLLHUP means
/// the device is gone and ends the loop.
fn read_loop(dev: Arc<File>, stop: OwnedFd, inbound: mpsc::Sender<Message>) {
    let fd = dev.as_raw_fd();
    let mut buf = [0u8; BUFFER_SIZE];

    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };

        if n > 0 {
            match Message::parse(&buf[..n as usize], true) {
                Ok(msg) => {
                    if inbound.blocking_send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("unmarshal failed: {}", e),
            }
        } else if n == 0 {
            let mut fds = [
                libc::pollfd {
                    fd,
                    events: libc::POLLIN | libc::POLLERR | libc::POLLHUP,
                    revents: 0,
                },
                libc::pollfd {
                    fd: stop.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            let num = unsafe { libc::poll(fds.as_mut_ptr(), 2, POLL_TIMEOUT_MS) };
            if num < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                tracing::error!("poll failed: {}", err);
                break;
            }
            if fds[1].revents != 0 {
                break;
            }
            if fds[0].revents & libc::POLLHUP != 0 {
                tracing::error!("device closed");
                break;
            }
            // num == 0 is a poll timeout and simply retries
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            tracing::error!("error reading from {}: {}", DEVICE_PATH, err);
            break;
        }
    }
}
