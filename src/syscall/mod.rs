//! An interface trait so the rest of the crate can call the handful of
//! privileged syscalls it needs without hard-wiring `nix`/`libc` calls
//! everywhere, and so tests can assert call order without root or real
//! namespaces.

pub mod linux;
pub mod test;

use std::any::Any;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

pub trait Syscall {
    fn as_any(&self) -> &dyn Any;

    fn unshare(&self, flags: CloneFlags) -> Result<(), Errno>;

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), Errno>;

    fn chroot(&self, path: &Path) -> Result<(), Errno>;

    fn chdir(&self, path: &Path) -> Result<(), Errno>;

    /// `setregid(rgid, egid)` — first step of privilege drop (§3/§5e).
    fn setregid(&self, rgid: Gid, egid: Gid) -> Result<(), Errno>;

    /// `setgroups(list)` — second step of privilege drop.
    fn setgroups(&self, groups: &[Gid]) -> Result<(), Errno>;

    /// `setreuid(ruid, euid)` — final step of privilege drop.
    fn setreuid(&self, ruid: Uid, euid: Uid) -> Result<(), Errno>;

    /// Write one of the three user-namespace setup files
    /// (`/proc/self/setgroups`, `/proc/self/gid_map`, `/proc/self/uid_map`).
    fn write_proc_file(&self, path: &Path, contents: &str) -> std::io::Result<()>;

    /// Bring the `lo` interface up via `SIOCGIFFLAGS`/`SIOCSIFFLAGS` on an
    /// `AF_INET` socket (§4.5 step 4c).
    fn bring_up_loopback(&self) -> Result<(), Errno>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    if cfg!(test) {
        Box::new(test::TestHelperSyscall::default())
    } else {
        Box::new(linux::LinuxSyscall)
    }
}
