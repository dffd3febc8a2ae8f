//! Namespace orchestrator (§4.5): drives `unshare` and the post-unshare
//! steps — id-map writes, the mount-propagation guard, loopback bring-up,
//! the mount planner, chroot/cwd handling, and the PID-namespace fork.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use crate::config::Directive;
use crate::error::ChildStatus;
use crate::mount::{self, MountError, PlanMode};
use crate::privilege::{self, Privilege, PrivilegeError};
use crate::process::spawner::{self, ForkOutcome};
use crate::syscall::Syscall;

#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("unshare failed: {0}")]
    Unshare(#[source] Errno),

    #[error("failed to write {path:?}: {source}")]
    IdMapWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mount-propagation guard failed: {0}")]
    Propagation(#[source] Errno),

    #[error("loopback bring-up failed: {0}")]
    Loopback(#[source] Errno),

    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    #[error("wait failed: {0}")]
    Wait(#[source] Errno),

    #[error("/proc mount failed: {0}")]
    ProcMount(#[from] MountError),

    #[error("chroot {path:?} failed: {source}")]
    Chroot {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
}

/// Which optional namespaces were requested on the command line, before
/// the unprivileged-forces-userns rule (§4.5 step 2) is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceRequest {
    pub user: bool,
    pub network: bool,
    /// 0 = no PID namespace, 1 = unshare only, 2 = unshare + mount fresh /proc.
    pub pid: u8,
    pub lock_fs: bool,
}

impl NamespaceRequest {
    fn clone_flags(&self, userns_forced: bool) -> CloneFlags {
        let mut flags = CloneFlags::CLONE_NEWNS;
        if self.user || userns_forced {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        flags
    }
}

/// Everything the orchestrator needs after unsharing to finish setup and
/// hand off to `exec`.
pub struct SetupPlan<'a> {
    pub privilege: &'a Privilege,
    pub request: NamespaceRequest,
    pub directives: Vec<Directive>,
    pub chroot: Option<PathBuf>,
    pub chdir: Option<PathBuf>,
    pub startup_cwd: PathBuf,
    pub check_only: bool,
    pub syscall: &'a dyn Syscall,
}

/// Drive the full sequence in §4.5. Returns the directory to chdir into
/// (already resolved to the startup cwd fallback for a chrooted launch
/// with no explicit `-d`/`-w`) once the caller is ready to `apply()` and
/// `exec`. For a `-PP` launch, the parent side returns after waiting on
/// the child and never reaches `exec`; see `run`.
pub fn run(plan: SetupPlan) -> Result<RunOutcome, NamespaceError> {
    let userns_forced = !nix::unistd::geteuid().is_root();
    let effective_request = NamespaceRequest { user: plan.request.user || userns_forced, ..plan.request };

    if plan.check_only {
        privilege::apply(plan.syscall, plan.privilege)?;
        mount::plan_and_execute(&plan.directives, &PlanMode::CheckOnly)
            .map_err(NamespaceError::ProcMount)?;
        if let Some(path) = &plan.chroot {
            println!("chroot {}", path.display());
        }
        return Ok(RunOutcome::CheckOnlyDone);
    }

    let flags = effective_request.clone_flags(userns_forced);
    plan.syscall.unshare(flags).map_err(NamespaceError::Unshare)?;

    if flags.contains(CloneFlags::CLONE_NEWUSER) {
        write_id_maps(plan.syscall, plan.privilege.uid, plan.privilege.gid)?;
    }

    let propagation = if effective_request.lock_fs { MsFlags::MS_PRIVATE } else { MsFlags::MS_SLAVE };
    plan.syscall
        .mount(Some(Path::new("none")), Path::new("/"), None, MsFlags::MS_REC | propagation, None)
        .map_err(NamespaceError::Propagation)?;

    if flags.contains(CloneFlags::CLONE_NEWNET) {
        plan.syscall.bring_up_loopback().map_err(NamespaceError::Loopback)?;
    }

    mount::plan_and_execute(&plan.directives, &PlanMode::Execute(plan.syscall))
        .map_err(NamespaceError::ProcMount)?;

    if let Some(path) = &plan.chroot {
        plan.syscall
            .chroot(path)
            .map_err(|source| NamespaceError::Chroot { path: path.clone(), source })?;
    }

    let chdir_target = resolve_chdir(&plan);

    if effective_request.pid > 0 {
        plan.syscall.unshare(CloneFlags::CLONE_NEWPID).map_err(NamespaceError::Unshare)?;
        match spawner::fork_once().map_err(NamespaceError::Fork)? {
            ForkOutcome::Parent(child) => {
                let status = spawner::wait_and_translate(child).map_err(NamespaceError::Wait)?;
                return Ok(RunOutcome::ParentDone(status));
            }
            ForkOutcome::Child => {
                if effective_request.pid > 1 {
                    mount_fresh_proc(plan.syscall)?;
                }
            }
        }
    }

    Ok(RunOutcome::ReadyToExec { chdir: chdir_target })
}

pub enum RunOutcome {
    CheckOnlyDone,
    ParentDone(ChildStatus),
    ReadyToExec { chdir: Option<PathBuf> },
}

fn resolve_chdir(plan: &SetupPlan) -> Option<PathBuf> {
    if plan.chdir.is_some() {
        return plan.chdir.clone();
    }
    if plan.chroot.is_some() {
        return Some(plan.startup_cwd.clone());
    }
    None
}

fn mount_fresh_proc(syscall: &dyn Syscall) -> Result<(), NamespaceError> {
    syscall
        .mount(
            Some(Path::new("proc")),
            Path::new("/proc"),
            Some("proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            None,
        )
        .map_err(|e| NamespaceError::ProcMount(MountError::Failed {
            source_path: Some(PathBuf::from("proc")),
            target: PathBuf::from("/proc"),
            source: e,
        }))
}

/// §5d: `setgroups=deny` strictly before `gid_map`, then `uid_map`.
fn write_id_maps(syscall: &dyn Syscall, uid: Uid, gid: Gid) -> Result<(), NamespaceError> {
    write_proc(syscall, Path::new("/proc/self/setgroups"), "deny")?;
    write_proc(syscall, Path::new("/proc/self/gid_map"), &format!("{} {} 1", gid, gid))?;
    write_proc(syscall, Path::new("/proc/self/uid_map"), &format!("{} {} 1", uid, uid))?;
    Ok(())
}

fn write_proc(syscall: &dyn Syscall, path: &Path, contents: &str) -> Result<(), NamespaceError> {
    syscall
        .write_proc_file(path, contents)
        .map_err(|source| NamespaceError::IdMapWrite { path: path.to_owned(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;
    use std::path::PathBuf;

    fn test_privilege() -> Privilege {
        privilege::capture().unwrap_or_else(|_| unreachable!())
    }

    /// Invariant 4 (§8): setgroups=deny strictly precedes gid_map.
    #[test]
    fn id_maps_are_written_in_order() {
        let syscall = TestHelperSyscall::default();
        write_id_maps(&syscall, Uid::from_raw(1000), Gid::from_raw(1000)).unwrap();

        let writes = syscall.get_proc_file_writes();
        assert_eq!(writes[0].0, PathBuf::from("/proc/self/setgroups"));
        assert_eq!(writes[0].1, "deny");
        assert_eq!(writes[1].0, PathBuf::from("/proc/self/gid_map"));
        assert_eq!(writes[2].0, PathBuf::from("/proc/self/uid_map"));
    }

    #[test]
    fn chdir_falls_back_to_startup_cwd_when_chrooted() {
        let syscall = TestHelperSyscall::default();
        let privilege = test_privilege();
        let plan = SetupPlan {
            privilege: &privilege,
            request: NamespaceRequest::default(),
            directives: vec![],
            chroot: Some(PathBuf::from("/new-root")),
            chdir: None,
            startup_cwd: PathBuf::from("/original/cwd"),
            check_only: false,
            syscall: &syscall,
        };
        assert_eq!(resolve_chdir(&plan), Some(PathBuf::from("/original/cwd")));
    }

    #[test]
    fn explicit_chdir_wins_over_chroot_fallback() {
        let syscall = TestHelperSyscall::default();
        let privilege = test_privilege();
        let plan = SetupPlan {
            privilege: &privilege,
            request: NamespaceRequest::default(),
            directives: vec![],
            chroot: Some(PathBuf::from("/new-root")),
            chdir: Some(PathBuf::from("/explicit")),
            startup_cwd: PathBuf::from("/original/cwd"),
            check_only: false,
            syscall: &syscall,
        };
        assert_eq!(resolve_chdir(&plan), Some(PathBuf::from("/explicit")));
    }
}
