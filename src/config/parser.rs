//! Line-oriented config grammar (§4.3, §6).

use std::io::BufRead;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use super::options::{split_options, MountOptions};
use super::token::{OperandStack, PathToken};
use super::ConfigError;
use crate::kernel::KernelRelease;
use crate::paths;

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Bind {
        from: PathBuf,
        to: PathBuf,
        opts: MountOptions,
    },
    Move {
        from: PathBuf,
        to: PathBuf,
        opts: MountOptions,
    },
    Mount {
        to: PathBuf,
        from: Option<PathBuf>,
        fstype: String,
        argstring: String,
        opts: MountOptions,
    },
    Union {
        to: PathBuf,
        froms: Vec<PathBuf>,
        data: String,
    },
    Overlay {
        to: PathBuf,
        upper: PathBuf,
        lower: PathBuf,
        work: PathBuf,
        data: String,
    },
    Chroot {
        path: PathBuf,
    },
}

/// Parse a whole config stream into the ordered directive list the
/// planner executes. `config_dir`/`home` feed `paths::resolve`;
/// `kernel` supplies the default overlay option prefix.
pub fn parse(
    input: impl BufRead,
    config_dir: &Path,
    home: Option<&Path>,
    kernel: &KernelRelease,
) -> Result<Vec<Directive>, ConfigError> {
    let mut stack = OperandStack::new();
    let mut directives = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| ConfigError::Syntax {
            line: line_no,
            message: e.to_string(),
        })?;
        let line = line.trim_start_matches([' ', '\t', '\r']);
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (keyword, rest) = split_first_word(line);
        let keyword = keyword.to_ascii_lowercase();
        let rest = rest.trim();

        match keyword.as_str() {
            "from" | "from!" | "to" | "to!" | "work" | "work!" => {
                let path = require_operand(rest, line_no, "a path")?;
                let resolved = paths::resolve(config_dir, home, path);
                if keyword.ends_with('!') {
                    mkdir_p(&resolved, line_no)?;
                }
                let token = match keyword.trim_end_matches('!') {
                    "from" => PathToken::From(resolved.to_string_lossy().into_owned()),
                    "to" => PathToken::To(resolved.to_string_lossy().into_owned()),
                    "work" => PathToken::Work(resolved.to_string_lossy().into_owned()),
                    _ => unreachable!(),
                };
                stack.push(token);
            }

            "mount" => {
                let to = pop_tag(&mut stack, line_no, "TO", PathToken::is_to)?;
                let from = pop_tag_optional(&mut stack, PathToken::is_from);
                let (fstype, argstring) = split_first_word(rest);
                let opts = split_options(argstring.trim());
                directives.push(Directive::Mount {
                    to: PathBuf::from(to.as_str()),
                    from: from.map(|t| PathBuf::from(t.as_str())),
                    fstype: fstype.to_owned(),
                    argstring: argstring.trim().to_owned(),
                    opts,
                });
            }

            "bind" | "move" => {
                let (from, to) = pop_from_to(&mut stack, line_no)?;
                let opts = split_options(rest);
                let from = PathBuf::from(from.as_str());
                let to = PathBuf::from(to.as_str());
                directives.push(if keyword == "bind" {
                    Directive::Bind { from, to, opts }
                } else {
                    Directive::Move { from, to, opts }
                });
            }

            "union" => {
                let drained = stack.drain_all();
                let (to, froms) = classify_union(&drained, line_no)?;
                let opts = split_options(rest);
                let data = overlay_data(&opts, kernel.union_option_prefix(), |_| {
                    format!(
                        "lowerdir={}",
                        froms
                            .iter()
                            .map(|p| p.to_string_lossy())
                            .collect::<Vec<_>>()
                            .join(":")
                    )
                });
                directives.push(Directive::Union { to, froms, data });
            }

            "overlay" => {
                let drained = stack.drain_all();
                let (to, upper, lower, work) = classify_overlay(&drained, line_no)?;
                let opts = split_options(rest);
                let data = overlay_data(&opts, kernel.overlay_option_prefix(), |_| {
                    format!(
                        "upperdir={},lowerdir={},workdir={}",
                        upper.display(),
                        lower.display(),
                        work.display()
                    )
                });
                directives.push(Directive::Overlay { to, upper, lower, work, data });
            }

            "chroot" => {
                let path = require_operand(rest, line_no, "a path")?;
                let resolved = paths::resolve(config_dir, home, path);
                directives.push(Directive::Chroot { path: resolved });
            }

            other => {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    message: format!("unrecognized keyword {other:?}"),
                });
            }
        }
    }

    Ok(directives)
}

fn overlay_data(
    opts: &MountOptions,
    default_prefix: &str,
    layers: impl FnOnce(&MountOptions) -> String,
) -> String {
    let prefix = if opts.unknown.is_empty() {
        default_prefix.to_owned()
    } else {
        format!("{},", opts.data_string())
    };
    format!("{}{}", prefix, layers(opts))
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

fn require_operand<'a>(rest: &'a str, line: usize, what: &'static str) -> Result<&'a str, ConfigError> {
    if rest.is_empty() {
        Err(ConfigError::Syntax {
            line,
            message: format!("expected {what}"),
        })
    } else {
        Ok(rest)
    }
}

fn mkdir_p(path: &Path, _line: usize) -> Result<(), ConfigError> {
    match std::fs::DirBuilder::new().recursive(true).mode(0o755).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(ConfigError::Mkdir {
            path: path.to_string_lossy().into_owned(),
            source: e,
        }),
    }
}

fn pop_tag(
    stack: &mut OperandStack,
    line: usize,
    expected: &'static str,
    predicate: fn(&PathToken) -> bool,
) -> Result<PathToken, ConfigError> {
    match stack.pop() {
        Some(t) if predicate(&t) => Ok(t),
        Some(t) => Err(ConfigError::Arity {
            line,
            expected,
            found: format!("{t:?}"),
        }),
        None => Err(ConfigError::Arity {
            line,
            expected,
            found: "empty stack".to_owned(),
        }),
    }
}

fn pop_tag_optional(stack: &mut OperandStack, predicate: fn(&PathToken) -> bool) -> Option<PathToken> {
    if stack.peek().is_some_and(predicate) {
        stack.pop()
    } else {
        None
    }
}

/// `bind`/`move` pop two entries and accept either push order, per the
/// tie-break rule in §4.3: if the deeper entry isn't FROM, swap.
fn pop_from_to(stack: &mut OperandStack, line: usize) -> Result<(PathToken, PathToken), ConfigError> {
    let top = stack.pop().ok_or_else(|| ConfigError::Arity {
        line,
        expected: "FROM and TO",
        found: "empty stack".to_owned(),
    })?;
    let deeper = stack.pop().ok_or_else(|| ConfigError::Arity {
        line,
        expected: "FROM and TO",
        found: "only one entry".to_owned(),
    })?;

    let (from, to) = if deeper.is_from() {
        (deeper, top)
    } else if top.is_from() {
        (top, deeper)
    } else {
        return Err(ConfigError::Arity {
            line,
            expected: "one FROM and one TO",
            found: format!("{deeper:?}, {top:?}"),
        });
    };

    if !to.is_to() {
        return Err(ConfigError::Arity {
            line,
            expected: "one FROM and one TO",
            found: format!("{from:?}, {to:?}"),
        });
    }

    Ok((from, to))
}

fn classify_union(tokens: &[PathToken], line: usize) -> Result<(PathBuf, Vec<PathBuf>), ConfigError> {
    let mut to = None;
    let mut froms = Vec::new();
    for t in tokens {
        match t {
            PathToken::To(s) if to.is_none() => to = Some(PathBuf::from(s)),
            PathToken::From(s) => froms.push(PathBuf::from(s)),
            other => {
                return Err(ConfigError::Arity {
                    line,
                    expected: "exactly one TO and at least one FROM",
                    found: format!("{other:?}"),
                })
            }
        }
    }
    let to = to.ok_or_else(|| ConfigError::Arity {
        line,
        expected: "exactly one TO",
        found: "none".to_owned(),
    })?;
    if froms.is_empty() {
        return Err(ConfigError::Arity {
            line,
            expected: "at least one FROM",
            found: "none".to_owned(),
        });
    }
    Ok((to, froms))
}

/// `overlay` expects exactly one WORK, exactly two FROM, exactly one TO.
/// The two FROMs are upper/lower in push order: the later push is upper.
fn classify_overlay(
    tokens: &[PathToken],
    line: usize,
) -> Result<(PathBuf, PathBuf, PathBuf, PathBuf), ConfigError> {
    let mut to = None;
    let mut work = None;
    let mut froms = Vec::new();
    for t in tokens {
        match t {
            PathToken::To(s) if to.is_none() => to = Some(PathBuf::from(s)),
            PathToken::Work(s) if work.is_none() => work = Some(PathBuf::from(s)),
            PathToken::From(s) => froms.push(PathBuf::from(s)),
            other => {
                return Err(ConfigError::Arity {
                    line,
                    expected: "one TO, one WORK, two FROM",
                    found: format!("{other:?}"),
                })
            }
        }
    }
    let to = to.ok_or_else(|| ConfigError::Arity {
        line,
        expected: "exactly one TO",
        found: "none".to_owned(),
    })?;
    let work = work.ok_or_else(|| ConfigError::Arity {
        line,
        expected: "exactly one WORK",
        found: "none".to_owned(),
    })?;
    if froms.len() != 2 {
        return Err(ConfigError::Arity {
            line,
            expected: "exactly two FROM",
            found: format!("{} FROM", froms.len()),
        });
    }
    let lower = froms.remove(0);
    let upper = froms.remove(0);
    Ok((to, upper, lower, work))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn kernel_new() -> KernelRelease {
        KernelRelease { sysname: "Linux".into(), major: 5, minor: 10 }
    }

    fn run(src: &str) -> Result<Vec<Directive>, ConfigError> {
        parse(Cursor::new(src), Path::new("/cfg"), None, &kernel_new())
    }

    /// S1 in §8.
    #[test]
    fn bind_directive_swaps_tie_break_order() {
        let directives = run("to /dst\nfrom /src\nbind rec,ro\n").unwrap();
        assert_eq!(directives.len(), 1);
        match &directives[0] {
            Directive::Bind { from, to, opts } => {
                assert_eq!(from, &PathBuf::from("/src"));
                assert_eq!(to, &PathBuf::from("/dst"));
                assert!(opts.needs_remount());
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }

    /// S3 in §8: lowerdir preserves original push order, not stack order.
    #[test]
    fn union_preserves_push_order_in_lowerdir() {
        let directives = run("from /a\nfrom /b\nfrom /c\nto /m\nunion\n").unwrap();
        match &directives[0] {
            Directive::Union { data, .. } => {
                assert!(data.ends_with("lowerdir=/a:/b:/c"));
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }

    /// S2 in §8.
    #[test]
    fn overlay_distinguishes_upper_by_push_recency() {
        let directives = run("work /w\nfrom /lower\nfrom /upper\nto /merged\noverlay\n").unwrap();
        match &directives[0] {
            Directive::Overlay { data, upper, lower, work, .. } => {
                assert_eq!(upper, &PathBuf::from("/upper"));
                assert_eq!(lower, &PathBuf::from("/lower"));
                assert_eq!(work, &PathBuf::from("/w"));
                assert_eq!(data, "index=off,xino=off,upperdir=/upper,lowerdir=/lower,workdir=/w");
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let directives = run("# a comment\n\n   \nchroot /new\n").unwrap();
        assert_eq!(directives, vec![Directive::Chroot { path: PathBuf::from("/new") }]);
    }

    #[test]
    fn union_with_no_from_is_arity_error() {
        let err = run("to /m\nunion\n").unwrap_err();
        assert!(matches!(err, ConfigError::Arity { .. }));
    }
}
