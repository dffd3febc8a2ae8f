//! Mount-option dictionary and splitter (§3, §4.3): partitions free-form
//! option words into a recognized kernel-flag set and an unrecognized
//! set that becomes filesystem-specific `data`.

use nix::mount::MsFlags;

/// Extra (non-`MsFlags`) bits the dictionary can contribute. Currently
/// just the loop-device request.
pub const LOOP: u32 = 1;

/// Recognized words and the bits they contribute. `rw` is listed for
/// completeness; it contributes no flag (absence of `MS_RDONLY` already
/// means read-write) but must still be recognized so it lands in the
/// known partition rather than leaking into `data`.
fn lookup(word: &str) -> Option<(MsFlags, u32)> {
    match word {
        "rec" => Some((MsFlags::MS_REC, 0)),
        "noexec" => Some((MsFlags::MS_NOEXEC, 0)),
        "nosuid" => Some((MsFlags::MS_NOSUID, 0)),
        "nodev" => Some((MsFlags::MS_NODEV, 0)),
        "ro" => Some((MsFlags::MS_RDONLY, 0)),
        "rw" => Some((MsFlags::empty(), 0)),
        "loop" => Some((MsFlags::empty(), LOOP)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub flags: MsFlagsWrapper,
    pub extra: u32,
    /// Unrecognized words, order preserved, comma-joined on demand.
    pub unknown: Vec<String>,
}

/// `MsFlags` doesn't implement `Default`/`Eq`; this newtype does so the
/// struct above can derive them for tests.
#[derive(Debug, Clone, Copy)]
pub struct MsFlagsWrapper(pub MsFlags);

impl Default for MsFlagsWrapper {
    fn default() -> Self {
        MsFlagsWrapper(MsFlags::empty())
    }
}

impl PartialEq for MsFlagsWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for MsFlagsWrapper {}

impl MountOptions {
    /// True when any option beyond `MS_REC` was requested (§4.4 step 4:
    /// these require an explicit remount to take effect on a bind mount).
    pub fn needs_remount(&self) -> bool {
        let without_rec = self.flags.0 & !MsFlags::MS_REC;
        !without_rec.is_empty()
    }

    pub fn wants_loop(&self) -> bool {
        self.extra & LOOP != 0
    }

    /// The `data=` string for overlay-family mounts: unknown words
    /// comma-joined, in their relative order.
    pub fn data_string(&self) -> String {
        self.unknown.join(",")
    }
}

/// Split a comma-separated option word list into known/unknown
/// partitions, each preserving its relative in-partition order. Two
/// allocating passes, per the REDESIGN FLAGS note (no in-place reversal
/// trick is needed).
pub fn split_options(opts: &str) -> MountOptions {
    let mut flags = MsFlags::empty();
    let mut extra = 0u32;
    let mut unknown = Vec::new();

    for word in opts.split(',').map(str::trim).filter(|w| !w.is_empty()) {
        match lookup(word) {
            Some((bits, extra_bits)) => {
                flags |= bits;
                extra |= extra_bits;
            }
            None => unknown.push(word.to_owned()),
        }
    }

    MountOptions {
        flags: MsFlagsWrapper(flags),
        extra,
        unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_words_set_flags_in_order() {
        let opts = split_options("rec,ro");
        assert!(opts.flags.0.contains(MsFlags::MS_REC));
        assert!(opts.flags.0.contains(MsFlags::MS_RDONLY));
        assert!(opts.unknown.is_empty());
    }

    #[test]
    fn unknown_words_preserve_relative_order() {
        let opts = split_options("index=off,ro,xino=off");
        assert_eq!(opts.unknown, vec!["index=off".to_string(), "xino=off".to_string()]);
        assert!(opts.flags.0.contains(MsFlags::MS_RDONLY));
    }

    #[test]
    fn loop_sets_extra_bit_not_a_flag() {
        let opts = split_options("loop");
        assert!(opts.wants_loop());
        assert!(opts.flags.0.is_empty());
    }

    /// Invariant 3 (§8): rec-only or no options never need a remount.
    #[test]
    fn rec_only_does_not_need_remount() {
        assert!(!split_options("rec").needs_remount());
        assert!(!split_options("").needs_remount());
    }

    #[test]
    fn ro_noexec_nosuid_nodev_need_remount() {
        for word in ["ro", "noexec", "nosuid", "nodev"] {
            assert!(split_options(word).needs_remount(), "{word} should need remount");
        }
    }

    #[test]
    fn data_string_joins_unknown_with_commas() {
        let opts = split_options("index=off,xino=off");
        assert_eq!(opts.data_string(), "index=off,xino=off");
    }
}
