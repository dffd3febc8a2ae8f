//! Path resolver (§4.2): tilde-expansion and absolute/relative join
//! relative to a config directory, plus the `$BUILD_CONTAINER_PATH`
//! config-file search.

use std::path::{Path, PathBuf};

const DEFAULT_CONTAINER_PATH: &str = "~/.config/build-container:/etc/build-container";

/// Resolve `raw` to an absolute path:
/// - absolute paths are returned unchanged;
/// - `~` / `~/...` are expanded against `home`;
/// - everything else is joined onto `config_dir`.
pub fn resolve(config_dir: &Path, home: Option<&Path>, raw: &str) -> PathBuf {
    if raw.starts_with('/') {
        return PathBuf::from(raw);
    }

    if let Some(rest) = strip_tilde(raw) {
        let home = home.unwrap_or_else(|| Path::new("/"));
        return join_one_slash(home, rest);
    }

    join_one_slash(config_dir, raw)
}

/// Returns `Some(rest)` when `raw` is `~` or starts with `~/`; `rest` is
/// the remainder after the leading `~` (so `~/a/b` -> `a/b`, `~` -> "").
fn strip_tilde(raw: &str) -> Option<&str> {
    if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
    }
}

fn join_one_slash(base: &Path, rest: &str) -> PathBuf {
    if rest.is_empty() {
        return base.to_path_buf();
    }
    let base = base.to_string_lossy();
    let base = base.trim_end_matches('/');
    PathBuf::from(format!("{}/{}", base, rest))
}

/// A located, already-open handle to a named config: either a readable
/// file found by searching `$BUILD_CONTAINER_PATH`, or standard input
/// when `name == "-"`.
pub enum ConfigSource {
    File { path: PathBuf, dir: PathBuf },
    Stdin { cwd: PathBuf },
}

/// Resolve the `-n NAME` argument to a `ConfigSource`.
///
/// `NAME == "-"` reads from standard input with `config_dir` set to the
/// current working directory at startup. Otherwise `NAME` is either an
/// absolute path used directly, or searched for in the colon-separated
/// directory list from `$BUILD_CONTAINER_PATH` (or the built-in default),
/// expanding a leading `~` in each search entry against `$HOME`.
pub fn locate_config(name: &str, home: Option<&Path>, cwd: &Path) -> Option<ConfigSource> {
    if name == "-" {
        return Some(ConfigSource::Stdin { cwd: cwd.to_path_buf() });
    }

    if name.starts_with('/') {
        let path = PathBuf::from(name);
        let dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
        return if path.is_file() {
            Some(ConfigSource::File { path, dir })
        } else {
            None
        };
    }

    let search_path =
        std::env::var("BUILD_CONTAINER_PATH").unwrap_or_else(|_| DEFAULT_CONTAINER_PATH.to_owned());

    for entry in search_path.split(':') {
        let dir = if entry.is_empty() {
            PathBuf::from(".")
        } else if let Some(rest) = strip_tilde(entry) {
            let home = home.unwrap_or_else(|| Path::new("/"));
            join_one_slash(home, rest)
        } else {
            PathBuf::from(entry)
        };

        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(ConfigSource::File { path: candidate, dir });
        }
    }

    None
}
