//! ioctl request codes and a thin syscall wrapper
//!
//! Request codes are assembled the way the C _IOW/_IOWR macros do; the
//! direction bits differ between Linux and the BSDs.

use std::io;
use std::os::fd::RawFd;

#[cfg(target_os = "linux")]
const IOC_IN: u64 = 1 << 30;
#[cfg(target_os = "linux")]
const IOC_OUT: u64 = 2 << 30;

#[cfg(not(target_os = "linux"))]
const IOC_IN: u64 = 0x8000_0000;
#[cfg(not(target_os = "linux"))]
const IOC_OUT: u64 = 0x4000_0000;

/// Request code for an ioctl that copies `len` bytes into the kernel.
pub(crate) const fn iow(group: u8, num: u8, len: usize) -> u64 {
    IOC_IN | ((len as u64) << 16) | ((group as u64) << 8) | num as u64
}

/// Request code for an ioctl that copies `len` bytes in and back out.
pub(crate) const fn iowr(group: u8, num: u8, len: usize) -> u64 {
    IOC_IN | IOC_OUT | ((len as u64) << 16) | ((group as u64) << 8) | num as u64
}

/// Executes an ioctl syscall.
pub(crate) fn ioctl(fd: RawFd, request: u64, arg: *mut libc::c_void) -> io::Result<()> {
    let res = unsafe { libc::ioctl(fd, request as _, arg) };
    if res < 0 {
        let err = io::Error::last_os_error();
        tracing::debug!("ioctl {:#010x} failed: {}", request, err);
        Err(err)
    } else {
        Ok(())
    }
}
