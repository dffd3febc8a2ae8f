//! Implements `Syscall` for real Linux systems.

use std::any::Any;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::{mount as nix_mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{self, Gid, Uid};

use super::Syscall;

/// Empty structure to implement `Syscall` for.
#[derive(Clone)]
pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Disassociate parts of execution context.
    /// See https://man7.org/linux/man-pages/man2/unshare.2.html
    fn unshare(&self, flags: CloneFlags) -> Result<(), Errno> {
        unshare(flags)
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), Errno> {
        nix_mount(source, target, fstype, flags, data)
    }

    fn chroot(&self, path: &Path) -> Result<(), Errno> {
        unistd::chroot(path)
    }

    fn chdir(&self, path: &Path) -> Result<(), Errno> {
        unistd::chdir(path)
    }

    /// First step of privilege drop (§3/§5e): real+effective gid.
    fn setregid(&self, rgid: Gid, egid: Gid) -> Result<(), Errno> {
        unistd::setregid(rgid, egid)
    }

    fn setgroups(&self, groups: &[Gid]) -> Result<(), Errno> {
        unistd::setgroups(groups)
    }

    /// Last step of privilege drop: real+effective uid.
    fn setreuid(&self, ruid: Uid, euid: Uid) -> Result<(), Errno> {
        unistd::setreuid(ruid, euid)
    }

    fn write_proc_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        let mut f = OpenOptions::new().write(true).open(path)?;
        f.write_all(contents.as_bytes())
    }

    fn bring_up_loopback(&self) -> Result<(), Errno> {
        let socket = nix::sys::socket::socket(
            nix::sys::socket::AddressFamily::Inet,
            nix::sys::socket::SockType::Datagram,
            nix::sys::socket::SockFlag::empty(),
            None,
        )?;

        let mut ifreq = libc::ifreq {
            ifr_name: ['l' as libc::c_char, 'o' as libc::c_char, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            ifr_ifru: libc::__c_anonymous_ifr_ifru { ifru_flags: 0 },
        };

        let rc = unsafe { libc::ioctl(socket, libc::SIOCGIFFLAGS as _, &mut ifreq) };
        Errno::result(rc)?;

        unsafe {
            ifreq.ifr_ifru.ifru_flags |= libc::IFF_UP as libc::c_short;
        }

        let rc = unsafe { libc::ioctl(socket, libc::SIOCSIFFLAGS as _, &ifreq) };
        Errno::result(rc)?;

        unistd::close(socket)
    }
}
