//! Mount planner (§4.4): executes one parsed directive — bind, move,
//! ordinary mount, union, or overlay — including loop-device setup and
//! the remount-for-flags dance bind mounts need on Linux.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;

use crate::config::{Directive, MountOptions};
use crate::syscall::Syscall;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mount {source_path:?} -> {target:?} failed: {source}")]
    Failed {
        source_path: Option<PathBuf>,
        target: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("remount {target:?} failed: {source}")]
    Remount {
        target: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("loop device setup for {path:?} failed: {source}")]
    LoopSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `-c`: print the planned operation instead of performing it.
pub enum PlanMode<'a> {
    Execute(&'a dyn Syscall),
    CheckOnly,
}

/// Run every directive in order. Directory creation for `from!`/`to!`/
/// `work!` already happened during parsing; this only issues mounts.
pub fn plan_and_execute(directives: &[Directive], mode: &PlanMode) -> Result<(), MountError> {
    for directive in directives {
        execute_one(directive, mode)?;
    }
    Ok(())
}

fn execute_one(directive: &Directive, mode: &PlanMode) -> Result<(), MountError> {
    match directive {
        Directive::Bind { from, to, opts } => {
            describe_or_mount(mode, Some(from), to, None, MsFlags::MS_BIND, opts, "")
        }
        Directive::Move { from, to, opts } => {
            describe_or_mount(mode, Some(from), to, None, MsFlags::MS_MOVE, opts, "")
        }
        Directive::Mount { to, from, fstype, argstring, opts } => {
            describe_or_mount(mode, from.as_deref(), to, Some(fstype), MsFlags::empty(), opts, argstring)
        }
        Directive::Union { to, data, .. } => {
            describe_or_mount_data(mode, to, "overlay", data)
        }
        Directive::Overlay { to, data, .. } => {
            describe_or_mount_data(mode, to, "overlay", data)
        }
        Directive::Chroot { path } => {
            if matches!(mode, PlanMode::CheckOnly) {
                println!("chroot {}", path.display());
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn describe_or_mount(
    mode: &PlanMode,
    source: Option<&Path>,
    target: &Path,
    fstype: Option<&str>,
    base_flags: MsFlags,
    opts: &MountOptions,
    argstring: &str,
) -> Result<(), MountError> {
    match mode {
        PlanMode::CheckOnly => {
            println!(
                "mount({:?}, {:?}, {:?}, {:?}, {:?})",
                source.map(|p| p.display().to_string()).unwrap_or_else(|| "none".into()),
                target,
                fstype.unwrap_or("none"),
                base_flags | opts.flags.0,
                argstring
            );
            Ok(())
        }
        PlanMode::Execute(syscall) => {
            run_mount(*syscall, source, target, fstype, base_flags, opts, argstring)
        }
    }
}

fn describe_or_mount_data(mode: &PlanMode, target: &Path, fstype: &str, data: &str) -> Result<(), MountError> {
    match mode {
        PlanMode::CheckOnly => {
            println!("mount(\"overlay\", {target:?}, {fstype:?}, 0, {data:?})");
            Ok(())
        }
        PlanMode::Execute(syscall) => syscall
            .mount(None, target, Some(fstype), MsFlags::empty(), Some(data))
            .map_err(|e| MountError::Failed {
                source_path: None,
                target: target.to_owned(),
                source: e,
            }),
    }
}

/// §4.4 steps 2-5: optional loop setup, the primary mount, then a
/// remount if any of `ro`/`noexec`/`nosuid`/`nodev` were requested.
fn run_mount(
    syscall: &dyn Syscall,
    source: Option<&Path>,
    target: &Path,
    fstype: Option<&str>,
    base_flags: MsFlags,
    opts: &MountOptions,
    argstring: &str,
) -> Result<(), MountError> {
    let mut loop_guard = None;
    let mount_source = if opts.wants_loop() {
        let src = source.ok_or_else(|| MountError::LoopSetup {
            path: target.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "loop requires a FROM source"),
        })?;
        let guard = LoopDevice::attach(src).map_err(|e| MountError::LoopSetup {
            path: src.to_owned(),
            source: e,
        })?;
        let path = guard.path.clone();
        loop_guard = Some(guard);
        path
    } else {
        source.map(|p| p.to_owned()).unwrap_or_else(|| PathBuf::from("none"))
    };

    let rec_only_flags = base_flags | (opts.flags.0 & MsFlags::MS_REC);
    let mount_result = syscall.mount(
        Some(mount_source.as_path()),
        target,
        fstype,
        rec_only_flags,
        Some(argstring),
    );

    if let Err(e) = mount_result {
        drop(loop_guard);
        return Err(MountError::Failed {
            source_path: Some(mount_source),
            target: target.to_owned(),
            source: e,
        });
    }

    if opts.needs_remount() {
        let remount_flags = MsFlags::MS_REMOUNT | base_flags | opts.flags.0;
        if let Err(e) = syscall.mount(Some(mount_source.as_path()), target, fstype, remount_flags, Some(argstring)) {
            drop(loop_guard);
            return Err(MountError::Remount { target: target.to_owned(), source: e });
        }
    }

    // Successful mount keeps the loop device attached for the lifetime
    // of the mount; only release it on error paths above.
    std::mem::forget(loop_guard);
    Ok(())
}

const LOOP_SET_FD: u64 = 0x4C00;
const LOOP_CLR_FD: u64 = 0x4C01;
const LOOP_CTL_GET_FREE: u64 = 0x4C82;

/// RAII guard for an attached loop device: detaches via `LOOP_CLR_FD`
/// when dropped on an error path, or is forgotten on success.
struct LoopDevice {
    path: PathBuf,
    loop_fd: std::fs::File,
}

impl LoopDevice {
    fn attach(backing_file: &Path) -> std::io::Result<Self> {
        let control = OpenOptions::new().read(true).write(true).open("/dev/loop-control")?;
        let free_index = unsafe { ioctl_no_arg(control.as_raw_fd(), LOOP_CTL_GET_FREE)? };

        let loop_path = PathBuf::from(format!("/dev/loop{free_index}"));
        let loop_fd = OpenOptions::new().read(true).write(true).open(&loop_path)?;
        let backing = OpenOptions::new().read(true).write(true).open(backing_file)?;

        unsafe { ioctl_with_fd(loop_fd.as_raw_fd(), LOOP_SET_FD, backing.as_raw_fd())? };

        Ok(LoopDevice { path: loop_path, loop_fd })
    }
}

impl Drop for LoopDevice {
    fn drop(&mut self) {
        let _ = unsafe { ioctl_no_arg(self.loop_fd.as_raw_fd(), LOOP_CLR_FD) };
    }
}

unsafe fn ioctl_no_arg(fd: RawFd, request: u64) -> std::io::Result<i32> {
    let rc = libc::ioctl(fd, request as _, 0);
    if rc < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

unsafe fn ioctl_with_fd(fd: RawFd, request: u64, arg: RawFd) -> std::io::Result<()> {
    let rc = libc::ioctl(fd, request as _, arg as libc::c_long);
    if rc < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}
