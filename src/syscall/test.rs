//! In-memory `Syscall` mock. Records every call (and, for the proc-file
//! writes, in what order) so tests can assert invariants like "setgroups
//! deny is written before gid_map" (§5e/§8 invariant 4) without root.

use std::any::Any;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use super::Syscall;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountArgs {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Default)]
pub struct TestHelperSyscall {
    unshare_args: RefCell<Vec<CloneFlags>>,
    mount_args: RefCell<Vec<MountArgs>>,
    chroot_args: RefCell<Vec<PathBuf>>,
    chdir_args: RefCell<Vec<PathBuf>>,
    setregid_args: RefCell<Vec<(Gid, Gid)>>,
    setgroups_args: RefCell<Vec<Vec<Gid>>>,
    setreuid_args: RefCell<Vec<(Uid, Uid)>>,
    proc_file_writes: RefCell<Vec<(PathBuf, String)>>,
    loopback_calls: RefCell<u32>,
}

impl Syscall for TestHelperSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn unshare(&self, flags: CloneFlags) -> Result<(), Errno> {
        self.unshare_args.borrow_mut().push(flags);
        Ok(())
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), Errno> {
        self.mount_args.borrow_mut().push(MountArgs {
            source: source.map(|p| p.to_owned()),
            target: target.to_owned(),
            fstype: fstype.map(|s| s.to_owned()),
            flags,
            data: data.map(|s| s.to_owned()),
        });
        Ok(())
    }

    fn chroot(&self, path: &Path) -> Result<(), Errno> {
        self.chroot_args.borrow_mut().push(path.to_owned());
        Ok(())
    }

    fn chdir(&self, path: &Path) -> Result<(), Errno> {
        self.chdir_args.borrow_mut().push(path.to_owned());
        Ok(())
    }

    fn setregid(&self, rgid: Gid, egid: Gid) -> Result<(), Errno> {
        self.setregid_args.borrow_mut().push((rgid, egid));
        Ok(())
    }

    fn setgroups(&self, groups: &[Gid]) -> Result<(), Errno> {
        self.setgroups_args.borrow_mut().push(groups.to_vec());
        Ok(())
    }

    fn setreuid(&self, ruid: Uid, euid: Uid) -> Result<(), Errno> {
        self.setreuid_args.borrow_mut().push((ruid, euid));
        Ok(())
    }

    fn write_proc_file(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        self.proc_file_writes
            .borrow_mut()
            .push((path.to_owned(), contents.to_owned()));
        Ok(())
    }

    fn bring_up_loopback(&self) -> Result<(), Errno> {
        *self.loopback_calls.borrow_mut() += 1;
        Ok(())
    }
}

impl TestHelperSyscall {
    pub fn get_unshare_args(&self) -> Vec<CloneFlags> {
        self.unshare_args.borrow().clone()
    }

    pub fn get_mount_args(&self) -> Vec<MountArgs> {
        self.mount_args.borrow().clone()
    }

    pub fn get_chroot_args(&self) -> Vec<PathBuf> {
        self.chroot_args.borrow().clone()
    }

    pub fn get_chdir_args(&self) -> Vec<PathBuf> {
        self.chdir_args.borrow().clone()
    }

    pub fn get_setregid_args(&self) -> Vec<(Gid, Gid)> {
        self.setregid_args.borrow().clone()
    }

    pub fn get_setgroups_args(&self) -> Vec<Vec<Gid>> {
        self.setgroups_args.borrow().clone()
    }

    pub fn get_setreuid_args(&self) -> Vec<(Uid, Uid)> {
        self.setreuid_args.borrow().clone()
    }

    /// Ordered log of `(path, contents)` written via `write_proc_file`.
    pub fn get_proc_file_writes(&self) -> Vec<(PathBuf, String)> {
        self.proc_file_writes.borrow().clone()
    }

    pub fn get_loopback_calls(&self) -> u32 {
        *self.loopback_calls.borrow()
    }
}
