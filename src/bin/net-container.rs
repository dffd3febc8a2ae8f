//! `net-container`: SUID-root launcher that creates a veth pair, attaches
//! one end to a bridge, hands the peer into a fresh network namespace,
//! and execs a child program inside it.

use std::path::PathBuf;

use clap::Clap;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::execvp;

use nscontain::cli;
use nscontain::error::LauncherError;
use nscontain::logger;
use nscontain::net::{dhcp, veth};
use nscontain::privilege;
use nscontain::syscall::{self, Syscall};

#[derive(Clap, Debug)]
#[clap(name = "net-container")]
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
    #[clap(short = 'b')]
    bridge: Option<String>,
    #[clap(short = 'D')]
    dhcp: bool,
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
            log::error!("net-container: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(opts: Opts) -> Result<i32, LauncherError> {
    let privilege = privilege::capture()?;

    if !nix::unistd::geteuid().is_root() {
        return Err(LauncherError::Usage("unprivileged execution".to_owned()));
    }

    let bridge = opts
        .bridge
        .or_else(|| std::env::var("ISONET_BRIDGE").ok())
        .unwrap_or_else(|| "isonet0".to_owned());
    let inner_netdev = std::env::var("ISONET_NETDEV").unwrap_or_else(|_| "eth0".to_owned());

    let syscall: Box<dyn Syscall> = syscall::create_syscall();

    let outside = veth::provision(&bridge)?;

    syscall
        .unshare(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWNET)
        .map_err(|source| LauncherError::Namespace(nscontain::namespace::NamespaceError::Unshare(source)))?;

    syscall
        .mount(Some(std::path::Path::new("none")), std::path::Path::new("/"), None, MsFlags::MS_REC | MsFlags::MS_SLAVE, None)
        .map_err(|source| LauncherError::Namespace(nscontain::namespace::NamespaceError::Propagation(source)))?;

    syscall
        .bring_up_loopback()
        .map_err(|source| LauncherError::Namespace(nscontain::namespace::NamespaceError::Loopback(source)))?;

    veth::complete(outside, &inner_netdev)?;

    if opts.dhcp {
        dhcp::run_dhcp(&inner_netdev)?;
    }

    cli::apply_env_actions(&opts.env.iter().map(|e| cli::parse_env_arg(e)).collect::<Vec<_>>());
    privilege::apply(syscall.as_ref(), &privilege)?;

    if let Some(dir) = cli::resolve_chdir_flag(opts.chdir_d, opts.chdir_w) {
        let dir = PathBuf::from(dir);
        syscall
            .chdir(&dir)
            .map_err(|source| LauncherError::Chdir { path: dir, source })?;
    }

    let program = cli::resolve_child_program(opts.program);
    let args = cli::prepend_login_flag(opts.child_args, opts.login);
    exec_child(&program, &args)
}

fn exec_child(program: &str, args: &[String]) -> Result<i32, LauncherError> {
    use std::ffi::CString;

    let c_program = CString::new(program).expect("program name must not contain NUL");
    let mut c_args = vec![c_program.clone()];
    c_args.extend(args.iter().map(|a| CString::new(a.as_str()).expect("arg must not contain NUL")));

    let err = execvp(&c_program, &c_args).unwrap_err();
    Err(LauncherError::Exec { program: program.to_owned(), source: err })
}
