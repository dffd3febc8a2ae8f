//! Kernel-release gate (§3): derives the overlay `data` prefix default
//! from `uname(2)`, matching the original's `index=off[,xino=off]`
//! version cutoff at 4.16.

use nix::sys::utsname::uname;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRelease {
    pub sysname: String,
    pub major: u32,
    pub minor: u32,
}

impl KernelRelease {
    pub fn current() -> Self {
        let info = uname();
        let sysname = info.sysname().to_string_lossy().into_owned();
        let (major, minor) = parse_release(&info.release().to_string_lossy());
        KernelRelease { sysname, major, minor }
    }

    /// Default `data=` prefix for a `union` (single lower stack) overlay mount.
    pub fn union_option_prefix(&self) -> &'static str {
        if self.sysname != "Linux" {
            ""
        } else if self.at_least(4, 16) {
            "index=off,xino=off,"
        } else {
            "index=off,"
        }
    }

    /// Default `data=` prefix for a full upper/lower/work overlay mount.
    pub fn overlay_option_prefix(&self) -> &'static str {
        if self.sysname != "Linux" {
            ""
        } else if self.at_least(4, 16) {
            "xino=off,"
        } else {
            ""
        }
    }

    fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// Parse the leading `MAJOR.MINOR` of a release string like
/// `5.15.0-91-generic`, tolerating anything non-numeric after.
fn parse_release(release: &str) -> (u32, u32) {
    let mut parts = release.split(|c: char| c == '.' || c == '-');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_release_string() {
        assert_eq!(parse_release("5.15.0-91-generic"), (5, 15));
    }

    #[test]
    fn parses_bare_major_minor() {
        assert_eq!(parse_release("4.15"), (4, 15));
    }

    #[test]
    fn old_kernel_omits_xino() {
        let k = KernelRelease { sysname: "Linux".into(), major: 4, minor: 15 };
        assert_eq!(k.union_option_prefix(), "index=off,");
        assert_eq!(k.overlay_option_prefix(), "");
    }

    #[test]
    fn new_kernel_includes_xino() {
        let k = KernelRelease { sysname: "Linux".into(), major: 5, minor: 4 };
        assert_eq!(k.union_option_prefix(), "index=off,xino=off,");
        assert_eq!(k.overlay_option_prefix(), "xino=off,");
    }

    #[test]
    fn non_linux_sysname_yields_empty_prefixes() {
        let k = KernelRelease { sysname: "Darwin".into(), major: 20, minor: 0 };
        assert_eq!(k.union_option_prefix(), "");
        assert_eq!(k.overlay_option_prefix(), "");
    }
}
