//! Veth/bridge provisioner (§4.6): the pre-fork rendezvous that hands
//! one end of a veth pair into the about-to-be-created network
//! namespace. Grounded directly on the original `isonet.c`'s
//! `setup_outside_netdev`/`setup_netdev`.

use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::sys::socket::{self, AddressFamily, SockFlag, SockType};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};

use crate::error::ChildStatus;

const NETDEV_MAX: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum VethError {
    #[error("no free isnN device name in 0..{NETDEV_MAX}")]
    NoFreeName,

    #[error("`ip {}` failed", self.args.join(" "))]
    Command { args: Vec<String> },

    #[error("socketpair failed: {0}")]
    Socketpair(#[source] nix::errno::Errno),

    #[error("fork failed: {0}")]
    Fork(#[source] nix::errno::Errno),

    #[error("failed to signal helper: {0}")]
    Signal(#[source] nix::errno::Errno),

    #[error("waiting for helper failed: {0}")]
    Wait(#[source] nix::errno::Errno),

    #[error("helper `ip link set netns` exited with {0:?}")]
    HelperFailed(ChildStatus),
}

/// The outside end of a provisioned veth pair, parked waiting for the
/// caller to unshare the network namespace and release the helper.
pub struct OutsideVeth {
    outer_name: String,
    peer_name: String,
    helper_pid: Pid,
    ready_fd: RawFd,
}

/// Steps 1-4a of §4.6: allocate a name, attach it to `bridge`, bring it
/// up, and fork the helper that will wait for the namespace to exist.
pub fn provision(bridge: &str) -> Result<OutsideVeth, VethError> {
    let (outer_name, peer_name) = allocate_name()?;

    if let Err(e) = run_ip(&["link", "set", "dev", &outer_name, "master", bridge]) {
        cleanup(&outer_name);
        return Err(e);
    }
    if let Err(e) = run_ip(&["link", "set", "dev", &outer_name, "up"]) {
        cleanup(&outer_name);
        return Err(e);
    }

    let (fd_a, fd_b) = socket::socketpair(
        AddressFamily::Unix,
        SockType::Datagram,
        None,
        SockFlag::SOCK_CLOEXEC,
    )
    .map_err(VethError::Socketpair)?;

    let parent_pid = unistd::getpid();
    match unsafe { unistd::fork() }.map_err(VethError::Fork)? {
        ForkResult::Child => {
            let _ = unistd::close(fd_a);
            let mut buf = [0u8; 1];
            if socket::recv(fd_b, &mut buf, socket::MsgFlags::empty()).is_err() {
                std::process::exit(1);
            }
            let err = Command::new("ip")
                .args(["link", "set", "dev", &peer_name, "netns", &parent_pid.to_string()])
                .exec();
            eprintln!("exec(ip): {err}");
            std::process::exit(1);
        }
        ForkResult::Parent { child } => {
            let _ = unistd::close(fd_b);
            Ok(OutsideVeth { outer_name, peer_name, helper_pid: child, ready_fd: fd_a })
        }
    }
}

/// Steps 5-6: release the helper now that the namespace exists, wait
/// for it, then rename and bring up the inner device.
pub fn complete(veth: OutsideVeth, inner_netdev: &str) -> Result<(), VethError> {
    socket::send(veth.ready_fd, &[1u8], socket::MsgFlags::empty()).map_err(VethError::Signal)?;
    let _ = unistd::close(veth.ready_fd);

    let status = translate_wait(veth.helper_pid)?;
    if status != ChildStatus::Exited(0) {
        return Err(VethError::HelperFailed(status));
    }

    run_ip(&["link", "set", "dev", &veth.peer_name, "name", inner_netdev])?;
    run_ip(&["link", "set", "dev", inner_netdev, "up"])?;
    Ok(())
}

fn translate_wait(pid: Pid) -> Result<ChildStatus, VethError> {
    use nix::sys::wait::WaitStatus;
    match waitpid(pid, None).map_err(VethError::Wait)? {
        WaitStatus::Exited(_, code) => Ok(ChildStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Ok(ChildStatus::Signaled(signal as i32)),
        _ => Ok(ChildStatus::Unknown),
    }
}

fn allocate_name() -> Result<(String, String), VethError> {
    for i in 0..NETDEV_MAX {
        let outer = format!("isn{i}");
        let peer = format!("isn{i}p");
        if run_ip(&["link", "add", &outer, "type", "veth", "peer", &peer]).is_ok() {
            return Ok((outer, peer));
        }
    }
    Err(VethError::NoFreeName)
}

fn cleanup(outer_name: &str) {
    let _ = run_ip(&["link", "del", "dev", outer_name]);
}

fn run_ip(args: &[&str]) -> Result<(), VethError> {
    let status = Command::new("ip").args(args).status();
    match status {
        Ok(s) if s.success() => Ok(()),
        _ => Err(VethError::Command { args: args.iter().map(|s| s.to_string()).collect() }),
    }
}
