//! Privilege vault (§3, §4.1).
//!
//! Captures the caller's real identity once, as an explicit, read-only
//! value threaded through the call graph (no module-scope singleton,
//! per the REDESIGN FLAGS note: the original C statics are rearchitected
//! into a plain `Privilege` struct here). `apply` performs the credential
//! transitions in the exact order the invariants in §5 require.

use std::ffi::CString;
use std::path::PathBuf;

use nix::unistd::{Gid, Uid};

use crate::syscall::Syscall;

#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("SUDO_USER={user:?}: {reason}")]
    UserLookup { user: String, reason: String },

    #[error("failed to change credentials: {0}")]
    CredentialChange(#[from] nix::errno::Errno),
}

/// Immutable snapshot of the identity to drop privileges to, captured
/// before any setuid/setgid work is done. `uid`/`gid` are the single
/// target values `apply` restores real *and* effective ids to (mirroring
/// the original `setregid(gid, gid)` / `setreuid(uid, uid)` calls).
#[derive(Debug, Clone)]
pub struct Privilege {
    pub uid: Uid,
    pub gid: Gid,
    has_gid: bool,
    pub groups: Option<Vec<Gid>>,
    pub target_user: Option<TargetUser>,
}

#[derive(Debug, Clone)]
pub struct TargetUser {
    pub name: String,
    pub home: PathBuf,
}

impl Privilege {
    /// Always true: both construction paths record a uid to drop to.
    pub fn has_uid(&self) -> bool {
        true
    }

    pub fn has_gid(&self) -> bool {
        self.has_gid
    }

    pub fn has_user(&self) -> bool {
        self.target_user.is_some()
    }
}

/// Capture the real identity of the calling process. If invoked with
/// real uid == effective uid (i.e. not through the SUID bit) and
/// `SUDO_USER` names a resolvable account, the record is populated from
/// that account instead of the raw (root) uid the shell handed us.
pub fn capture() -> Result<Privilege, PrivilegeError> {
    let real_uid = nix::unistd::getuid();
    let effective_uid = nix::unistd::geteuid();

    if real_uid == effective_uid {
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            return capture_sudo_user(&sudo_user);
        }
    }

    Ok(Privilege {
        uid: real_uid,
        gid: nix::unistd::getgid(),
        has_gid: false,
        groups: None,
        target_user: None,
    })
}

fn capture_sudo_user(sudo_user: &str) -> Result<Privilege, PrivilegeError> {
    let user = nix::unistd::User::from_name(sudo_user)
        .map_err(|e| PrivilegeError::UserLookup {
            user: sudo_user.to_owned(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| PrivilegeError::UserLookup {
            user: sudo_user.to_owned(),
            reason: "user not found".to_owned(),
        })?;

    let groups = grouplist(sudo_user, user.gid);

    Ok(Privilege {
        uid: user.uid,
        gid: user.gid,
        has_gid: true,
        groups,
        target_user: Some(TargetUser {
            name: sudo_user.to_owned(),
            home: user.dir,
        }),
    })
}

/// `getgrouplist(3)`: grow the buffer until it fits, mirroring the retry
/// loop in the original C source (`collect_sudo_privileges`).
fn grouplist(user: &str, base_gid: Gid) -> Option<Vec<Gid>> {
    let c_user = CString::new(user).ok()?;
    let mut ngroups: libc::c_int = 16;
    loop {
        let mut groups: Vec<libc::gid_t> = vec![0; ngroups as usize];
        let mut out_ngroups = ngroups;
        let rc = unsafe {
            libc::getgrouplist(
                c_user.as_ptr(),
                base_gid.as_raw(),
                groups.as_mut_ptr(),
                &mut out_ngroups,
            )
        };
        if rc >= 0 {
            groups.truncate(out_ngroups as usize);
            return Some(groups.into_iter().map(Gid::from_raw).collect());
        }
        if out_ngroups <= ngroups {
            return None;
        }
        ngroups = out_ngroups;
    }
}

/// Apply the captured privilege, in the exact order invariants in §3/§5
/// demand: `setregid` → `setgroups` → `setreuid` → environment.
///
/// Each step is conditional on the relevant `has_*` flag, so a plain
/// uid-only record (no `SUDO_USER`) only restores the real uid.
pub fn apply(syscall: &dyn Syscall, priv_: &Privilege) -> Result<(), PrivilegeError> {
    if priv_.has_gid() {
        syscall.setregid(priv_.gid, priv_.gid)?;
    }

    if let Some(groups) = &priv_.groups {
        syscall.setgroups(groups)?;
    }

    if priv_.has_uid() {
        syscall.setreuid(priv_.uid, priv_.uid)?;
    }

    if let Some(target) = &priv_.target_user {
        std::env::set_var("USER", &target.name);
        std::env::set_var("USERNAME", &target.name);
        std::env::set_var("LOGNAME", &target.name);
        std::env::set_var("HOME", &target.home);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    fn uid_only_record() -> Privilege {
        Privilege {
            uid: Uid::from_raw(1000),
            gid: Gid::from_raw(1000),
            has_gid: false,
            groups: None,
            target_user: None,
        }
    }

    fn sudo_record() -> Privilege {
        Privilege {
            uid: Uid::from_raw(1001),
            gid: Gid::from_raw(1001),
            has_gid: true,
            groups: Some(vec![Gid::from_raw(100), Gid::from_raw(27)]),
            target_user: Some(TargetUser {
                name: "alice".to_owned(),
                home: PathBuf::from("/home/alice"),
            }),
        }
    }

    #[test]
    fn uid_only_skips_gid_and_groups() {
        let syscall = TestHelperSyscall::default();
        let rec = uid_only_record();
        apply(&syscall, &rec).unwrap();

        assert!(syscall.get_setregid_args().is_empty());
        assert!(syscall.get_setgroups_args().is_empty());
        assert_eq!(
            syscall.get_setreuid_args(),
            vec![(Uid::from_raw(1000), Uid::from_raw(1000))]
        );
    }

    #[test]
    fn sudo_record_applies_all_steps_in_order() {
        let syscall = TestHelperSyscall::default();
        let rec = sudo_record();
        apply(&syscall, &rec).unwrap();

        assert_eq!(
            syscall.get_setregid_args(),
            vec![(Gid::from_raw(1001), Gid::from_raw(1001))]
        );
        assert_eq!(
            syscall.get_setgroups_args(),
            vec![vec![Gid::from_raw(100), Gid::from_raw(27)]]
        );
        assert_eq!(
            syscall.get_setreuid_args(),
            vec![(Uid::from_raw(1001), Uid::from_raw(1001))]
        );
        assert_eq!(std::env::var("HOME").unwrap(), "/home/alice");
    }
}
