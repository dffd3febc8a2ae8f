//! `mount-container`: SUID- or sudo-invoked launcher that builds a
//! declaratively configured mount namespace (and optionally user,
//! network, PID namespaces) around a child program.

use std::io::BufRead;
use std::path::PathBuf;

use clap::Clap;
use nix::unistd::execvp;

use nscontain::cli;
use nscontain::config::{self, Directive};
use nscontain::error::LauncherError;
use nscontain::kernel::KernelRelease;
use nscontain::logger;
use nscontain::namespace::{self, NamespaceRequest, RunOutcome, SetupPlan};
use nscontain::paths::{self, ConfigSource};
use nscontain::privilege;
use nscontain::syscall::{self, Syscall};

#[derive(Clap, Debug)]
#[clap(name = "mount-container")]
struct Opts {
    #[clap(short = 'q')]
    quiet: bool,
    #[clap(short = 'v', parse(from_occurrences))]
    verbose: i32,
    #[clap(short = 'e')]
    program: Option<String>,
    #[clap(short = 'l')]
    login: bool,
    #[clap(short = 'd')]
    chdir_d: Option<String>,
    #[clap(short = 'w')]
    chdir_w: Option<String>,
    #[clap(short = 'n')]
    config_name: Option<String>,
    #[clap(short = 'c')]
    check: bool,
    #[clap(short = 'L')]
    lock_fs: bool,
    #[clap(short = 'P', parse(from_occurrences))]
    pid_ns: u8,
    #[clap(short = 'N')]
    network_ns: bool,
    #[clap(short = 'U')]
    user_ns: bool,
    #[clap(short = 'E')]
    env: Vec<String>,
    #[clap(last = true)]
    child_args: Vec<String>,
}

fn main() {
    let opts = Opts::parse();

    let verbose = if opts.quiet { 0 } else { 1 + opts.verbose };
    logger::init(logger::level_filter_for(verbose));

    match run(opts) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("mount-container: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(opts: Opts) -> Result<i32, LauncherError> {
    let privilege = privilege::capture()?;
    let startup_cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let home = privilege.target_user.as_ref().map(|u| u.home.as_path());

    let kernel = KernelRelease::current();
    let mut directives: Vec<Directive> = Vec::new();
    let mut chroot = None;

    if let Some(name) = &opts.config_name {
        let source = paths::locate_config(name, home, &startup_cwd).ok_or_else(|| {
            config::ConfigError::Open {
                path: name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config not found on search path"),
            }
        })?;

        let (reader, config_dir): (Box<dyn BufRead>, PathBuf) = match source {
            ConfigSource::File { path, dir } => {
                let f = std::fs::File::open(&path).map_err(|e| {
                    config::ConfigError::Open { path: path.to_string_lossy().into_owned(), source: e }
                })?;
                (Box::new(std::io::BufReader::new(f)), dir)
            }
            ConfigSource::Stdin { cwd } => (Box::new(std::io::BufReader::new(std::io::stdin())), cwd),
        };

        let parsed = config::parse(reader, &config_dir, home, &kernel)?;
        for directive in parsed {
            if let Directive::Chroot { path } = &directive {
                chroot = Some(path.clone());
            } else {
                directives.push(directive);
            }
        }
    }

    let chdir = cli::resolve_chdir_flag(opts.chdir_d, opts.chdir_w).map(PathBuf::from);

    let request = NamespaceRequest {
        user: opts.user_ns,
        network: opts.network_ns,
        pid: opts.pid_ns,
        lock_fs: opts.lock_fs,
    };

    let syscall: Box<dyn Syscall> = syscall::create_syscall();
    let plan = SetupPlan {
        privilege: &privilege,
        request,
        directives,
        chroot,
        chdir,
        startup_cwd,
        check_only: opts.check,
        syscall: syscall.as_ref(),
    };

    match namespace::run(plan)? {
        RunOutcome::CheckOnlyDone => Ok(0),
        RunOutcome::ParentDone(status) => Ok(status.exit_code()),
        RunOutcome::ReadyToExec { chdir } => {
            cli::apply_env_actions(&opts.env.iter().map(|e| cli::parse_env_arg(e)).collect::<Vec<_>>());

            privilege::apply(syscall.as_ref(), &privilege)?;

            if let Some(dir) = chdir {
                syscall
                    .chdir(&dir)
                    .map_err(|source| LauncherError::Chdir { path: dir.clone(), source })?;
            }

            let program = cli::resolve_child_program(opts.program);
            let args = cli::prepend_login_flag(opts.child_args, opts.login);
            exec_child(&program, &args)
        }
    }
}

fn exec_child(program: &str, args: &[String]) -> Result<i32, LauncherError> {
    use std::ffi::CString;

    let c_program = CString::new(program).expect("program name must not contain NUL");
    let mut c_args = vec![c_program.clone()];
    c_args.extend(args.iter().map(|a| CString::new(a.as_str()).expect("arg must not contain NUL")));

    let err = execvp(&c_program, &c_args).unwrap_err();
    Err(LauncherError::Exec { program: program.to_owned(), source: err })
}
