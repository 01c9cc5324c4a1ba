//! `clipctl`: finds the running capture daemon and asks it to enable,
//! disable, or toggle capture, or just reports its current state.

use std::thread::sleep;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use clipmenu_buildcfg::DAEMON_NAME;
use clipmenu_config::Config;

const MAX_STATE_RETRIES: u32 = 20;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Scan `/proc` for a process named exactly [`DAEMON_NAME`].
///
/// Errors if none is running, or if more than one is: a single unambiguous
/// daemon is the only case we know how to signal.
fn find_daemon_pid() -> Result<Pid> {
    let mut found = None;

    for entry in std::fs::read_dir("/proc").context("failed to read /proc")? {
        let entry = entry?;
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
            continue;
        };
        let comm = match std::fs::read_to_string(entry.path().join("comm")) {
            Ok(comm) => comm,
            Err(_) => continue,
        };
        if comm.trim_end() == DAEMON_NAME {
            if found.is_some() {
                bail!("multiple instances of {DAEMON_NAME} are running");
            }
            found = Some(Pid::from_raw(pid));
        }
    }

    found.context(format!("{DAEMON_NAME} is not running"))
}

fn should_enable(mode: &str, currently_enabled: bool) -> Result<bool> {
    match mode {
        "enable" => Ok(true),
        "disable" => Ok(false),
        "toggle" => Ok(!currently_enabled),
        other => bail!("unknown command: {other}"),
    }
}

fn main() -> Result<()> {
    clipmenu_config::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 1 {
        bail!("usage: clipctl <enable|disable|toggle|status>");
    }
    let mode = &args[0];

    let config = Config::load().context("failed to load configuration")?;
    let store_root = config.store_root().context("failed to resolve store root")?;
    let pid = find_daemon_pid()?;

    if mode == "status" {
        let enabled = clipmenu_capture::read_status(&store_root)?;
        println!("{}", if enabled { "enabled" } else { "disabled" });
        return Ok(());
    }

    let currently_enabled = clipmenu_capture::read_status(&store_root)?;
    let want_enable = should_enable(mode, currently_enabled)?;

    let signal = if want_enable {
        Signal::SIGUSR2
    } else {
        Signal::SIGUSR1
    };
    kill(pid, signal).context("failed to signal clipmenud")?;
    log::debug!("sent {signal:?} to pid {pid}");

    for _ in 0..MAX_STATE_RETRIES {
        if clipmenu_capture::read_status(&store_root)? == want_enable {
            return Ok(());
        }
        sleep(RETRY_DELAY);
    }

    bail!(
        "failed to {} {DAEMON_NAME} after {MAX_STATE_RETRIES} retries",
        if want_enable { "enable" } else { "disable" }
    )
}
