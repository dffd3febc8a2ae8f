//! The one fork a PID-namespace request mandates (§4.7): the unsharing
//! process itself never enters the new namespace, only its first child
//! does, so `unshare(CLONE_NEWPID)` must be followed by exactly one
//! `fork`.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::error::ChildStatus;

pub enum ForkOutcome {
    Parent(Pid),
    Child,
}

/// Fork once. Safety: the caller is single-threaded at this point (no
/// namespace work spawns threads), which is the precondition `fork(2)`
/// imposes for safe use after `unshare`.
pub fn fork_once() -> Result<ForkOutcome, Errno> {
    match unsafe { fork()? } {
        ForkResult::Parent { child } => Ok(ForkOutcome::Parent(child)),
        ForkResult::Child => Ok(ForkOutcome::Child),
    }
}

/// Block until `child` exits, translating its wait status per §4.7/§7:
/// normal exit keeps the child's code, a signal maps to `128 + signo`,
/// anything else (stopped, continued, ptrace event) is `Unknown` (127).
pub fn wait_and_translate(child: Pid) -> Result<ChildStatus, Errno> {
    match waitpid(child, None)? {
        WaitStatus::Exited(_, code) => Ok(ChildStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Ok(ChildStatus::Signaled(signal as i32)),
        _ => Ok(ChildStatus::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_and_wait_round_trips_exit_code() {
        match fork_once().unwrap() {
            ForkOutcome::Parent(child) => {
                let status = wait_and_translate(child).unwrap();
                assert_eq!(status, ChildStatus::Exited(7));
            }
            ForkOutcome::Child => {
                std::process::exit(7);
            }
        }
    }

    #[test]
    fn fork_and_wait_maps_signal_to_128_plus_signo() {
        match fork_once().unwrap() {
            ForkOutcome::Parent(child) => {
                let status = wait_and_translate(child).unwrap();
                assert_eq!(status, ChildStatus::Signaled(nix::sys::signal::Signal::SIGTERM as i32));
                assert_eq!(status.exit_code(), 128 + nix::sys::signal::Signal::SIGTERM as i32);
            }
            ForkOutcome::Child => {
                nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();
                std::process::exit(1);
            }
        }
    }
}
