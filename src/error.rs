//! Typed error taxonomy for the launchers, and its mapping onto process exit
//! codes (see invocation §6/§7 of the design: 0 success, 1 usage, 2 setup
//! failure, 3 chdir/config, 127 unknown wait status, 128+signo on signal).

use std::path::PathBuf;

use nix::errno::Errno;

/// Any failure that can abort a launcher before it execs the child.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Privilege(#[from] crate::privilege::PrivilegeError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Mount(#[from] crate::mount::MountError),

    #[error(transparent)]
    Namespace(#[from] crate::namespace::NamespaceError),

    #[error(transparent)]
    Net(#[from] crate::net::veth::VethError),

    #[error(transparent)]
    Dhcp(#[from] crate::net::dhcp::DhcpError),

    #[error("chroot {path:?} failed: {source}")]
    Chroot { path: PathBuf, source: Errno },

    #[error("chdir {path:?} failed: {source}")]
    Chdir { path: PathBuf, source: Errno },

    #[error("exec {program:?} failed: {source}")]
    Exec { program: String, source: Errno },
}

impl LauncherError {
    /// The exit status this error should translate to if it escapes `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            LauncherError::Usage(_) => 1,
            LauncherError::Privilege(_) => 2,
            LauncherError::Config(e) => e.exit_code(),
            LauncherError::Mount(_) => 2,
            LauncherError::Namespace(_) => 2,
            LauncherError::Net(_) => 2,
            LauncherError::Dhcp(_) => 2,
            LauncherError::Chroot { .. } => 2,
            LauncherError::Chdir { .. } => 3,
            LauncherError::Exec { .. } => 2,
        }
    }
}

/// How the child process terminated, for exit-status propagation (§4.7/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(i32),
    Signaled(i32),
    Unknown,
}

impl ChildStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            ChildStatus::Exited(code) => code,
            ChildStatus::Signaled(signo) => 128 + signo,
            ChildStatus::Unknown => 127,
        }
    }
}
