//! `clipmenud`: watches the configured X11 selections and stores salient
//! clips as they appear, until told to stop by a signal or the process
//! being killed.

mod daemon;

use anyhow::{bail, Context, Result};

use clipmenu_buildcfg::{DAEMON_NAME, INDEX_FILE_NAME};
use clipmenu_config::Config;
use clipmenu_store::ClipStore;

fn main() -> Result<()> {
    if std::env::args().count() != 1 {
        bail!("{DAEMON_NAME} doesn't accept any arguments");
    }

    let level = if clipmenu_config::debug_mode_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(err) = syslog::init(syslog::Facility::LOG_DAEMON, level, Some(DAEMON_NAME)) {
        eprintln!("unable to initialize syslog, falling back to stderr: {err}");
        env_logger::Builder::new().filter_level(level).init();
    }

    let config = Config::load().context("failed to load configuration")?;
    let store_root = config.store_root().context("failed to resolve store root")?;
    let store = ClipStore::open(&store_root.join(INDEX_FILE_NAME), &store_root)
        .context("failed to open clip store")?;

    let mut daemon = daemon::Daemon::new(config.clone(), store, store_root)
        .context("failed to set up X11 connection")?;
    daemon.setup_watches().context("failed to set up selection watches")?;

    if !config.oneshot {
        daemon.run().context("daemon event loop failed")?;
    }

    Ok(())
}
