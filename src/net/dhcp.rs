//! DHCP hook (§4.6 step 7): writes the fixed `udhcpc` event script to a
//! `mkstemp`'d path, runs the client, then unlinks the script.
//!
//! The script body is reproduced verbatim from the original source; its
//! authorship is not re-derived (§1 Non-goals).

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;

use nix::unistd;

const DHCP_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
bound|renew)
    rc=$(mktemp -t resolv.XXXXXXX.conf) || exit 1
    ip link set dev "$interface" ${mtu:+mtu $mtu}
    ip -4 address add dev "$interface" "$ip/$mask" ${broadcast:+broadcast $broadcast}
    ip -4 route flush exact 0.0.0.0/0 dev "$interface"
    [ ".$subnet" = .255.255.255.255 ] && onlink=onlink || onlink=
    ip -4 route add default via "$router" dev "$interface" $onlink
    > "$rc"
    [ -n "$domain" ] && echo "domain $domain" >> "$rc"
    for i in $dns; do
	echo "nameserver $i" >> "$rc"
    done
    umount /etc/resolv.conf 2>/dev/null
    chmod 0644 "$rc"
    mount --bind "$rc" /etc/resolv.conf
    rm -f "$rc"
    echo >&2 "$interface: ipv4: $ip/mask dns: $dns"
    ;;
deconfig)
    umount /etc/resolv.conf
    ;;
leasefail|nak)
    echo >&2 "$0: $1: $message"
    ;;
*)
    echo >&2 "$0: unknown command $1"
esac
"#;

#[derive(Debug, thiserror::Error)]
pub enum DhcpError {
    #[error("failed to create dhcp script: {0}")]
    ScriptCreate(#[source] std::io::Error),

    #[error("failed to write dhcp script: {0}")]
    ScriptWrite(#[source] std::io::Error),

    #[error("udhcpc failed to start: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Run `udhcpc -f -i <netdev> -s <script> -q`, cleaning up the script
/// file on every exit path (success, spawn failure, or early return).
pub fn run_dhcp(netdev: &str) -> Result<(), DhcpError> {
    let path = write_script()?;
    let result = Command::new("udhcpc")
        .args(["-f", "-i", netdev, "-s"])
        .arg(&path)
        .arg("-q")
        .status();
    let _ = unistd::unlink(&path);

    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => Ok(()), // udhcpc's own exit code isn't fatal to the launcher
        Err(e) => Err(DhcpError::Spawn(e)),
    }
}

fn write_script() -> Result<PathBuf, DhcpError> {
    let mut template = std::env::temp_dir();
    template.push("dhcpXXXXXX");

    let (fd, path) = unistd::mkstemp(&template).map_err(|e| {
        DhcpError::ScriptCreate(std::io::Error::from_raw_os_error(e as i32))
    })?;

    let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
    file.write_all(DHCP_SCRIPT.as_bytes()).map_err(DhcpError::ScriptWrite)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
        .map_err(DhcpError::ScriptWrite)?;
    drop(file);

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_mentions_required_dhcp_events() {
        assert!(DHCP_SCRIPT.contains("bound|renew"));
        assert!(DHCP_SCRIPT.contains("deconfig"));
        assert!(DHCP_SCRIPT.contains("leasefail|nak"));
        assert!(DHCP_SCRIPT.contains("mount --bind"));
    }

    #[test]
    fn write_script_produces_executable_file() {
        let path = write_script().unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o755);
        std::fs::remove_file(&path).unwrap();
    }
}
