//! Option-parsing helpers shared by both binaries (§4.10, §6): `-E`
//! environment assignments, `-d`/`-w` chdir aliasing, and the login-shell
//! argv prefix. Each binary still owns its own `clap`-derive `Opts`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvAction {
    Set(String, String),
    Unset(String),
}

/// Parse one `-E NAME[=VALUE]` argument.
pub fn parse_env_arg(arg: &str) -> EnvAction {
    match arg.split_once('=') {
        Some((name, value)) => EnvAction::Set(name.to_owned(), value.to_owned()),
        None => EnvAction::Unset(arg.to_owned()),
    }
}

pub fn apply_env_actions(actions: &[EnvAction]) {
    for action in actions {
        match action {
            EnvAction::Set(name, value) => std::env::set_var(name, value),
            EnvAction::Unset(name) => std::env::remove_var(name),
        }
    }
}

/// `-d DIR` and `-w DIR` are the same flag under two names; the later
/// one on the command line wins, matching `getopt`'s left-to-right scan.
pub fn resolve_chdir_flag(d: Option<String>, w: Option<String>) -> Option<String> {
    w.or(d)
}

/// `-l`: prepend a login-shell marker to the child's argv, as the
/// original does by overwriting `argv[optind - 1]`.
pub fn prepend_login_flag(mut child_args: Vec<String>, login: bool) -> Vec<String> {
    if login {
        child_args.insert(0, "-l".to_owned());
    }
    child_args
}

/// Child program resolution: explicit `-e`, else `$SHELL`, else `/bin/sh`.
pub fn resolve_child_program(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("SHELL").ok())
        .unwrap_or_else(|| "/bin/sh".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_equals_value() {
        assert_eq!(
            parse_env_arg("FOO=bar"),
            EnvAction::Set("FOO".to_owned(), "bar".to_owned())
        );
    }

    #[test]
    fn bare_name_means_unset() {
        assert_eq!(parse_env_arg("FOO"), EnvAction::Unset("FOO".to_owned()));
    }

    #[test]
    fn value_containing_equals_is_kept_whole() {
        assert_eq!(
            parse_env_arg("FOO=a=b"),
            EnvAction::Set("FOO".to_owned(), "a=b".to_owned())
        );
    }

    #[test]
    fn w_overrides_d_when_both_given() {
        assert_eq!(
            resolve_chdir_flag(Some("/d".to_owned()), Some("/w".to_owned())),
            Some("/w".to_owned())
        );
    }

    #[test]
    fn d_used_when_w_absent() {
        assert_eq!(resolve_chdir_flag(Some("/d".to_owned()), None), Some("/d".to_owned()));
    }

    #[test]
    fn login_flag_prepends_dash_l() {
        assert_eq!(
            prepend_login_flag(vec!["arg1".to_owned()], true),
            vec!["-l".to_owned(), "arg1".to_owned()]
        );
        assert_eq!(prepend_login_flag(vec!["arg1".to_owned()], false), vec!["arg1".to_owned()]);
    }
}
