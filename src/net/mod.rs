//! `net-container`-specific plumbing: the veth/bridge provisioner and
//! the DHCP hook it optionally runs inside the new network namespace.

pub mod dhcp;
pub mod veth;
