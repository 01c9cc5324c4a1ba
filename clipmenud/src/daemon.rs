//! The X11 event loop: watch the configured selections via XFixes, convert
//! them to UTF8_STRING when they change owner, and hand the converted text
//! to [`clipmenu_capture`] when it's ready.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::process::Command;

use anyhow::{Context, Result};
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use x11rb::connection::Connection;
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    ConnectionExt as _, CreateWindowAux, EventMask, PropertyNotifyEvent, SelectionNotifyEvent,
    WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

use clipmenu_capture::Capture;
use clipmenu_config::Config;
use clipmenu_store::ClipStore;
use clipmenu_x11::{Atoms, Selection};

/// Outcome of pumping X11 events once.
enum Step {
    /// Nothing conclusive happened yet; keep waiting.
    Pending,
    /// A selection was confirmed to currently have no owner (only
    /// meaningful during the initial per-selection convert pass).
    NoOwner,
    /// A clip was stored (or discarded as non-salient).
    Captured,
}

pub struct Daemon {
    conn: RustConnection,
    atoms: Atoms,
    win: u32,
    store: ClipStore,
    store_root: std::path::PathBuf,
    config: Config,
    capture: Capture,
    enabled: bool,
    sig_fd: SignalFd,
}

impl Daemon {
    pub fn new(config: Config, store: ClipStore, store_root: std::path::PathBuf) -> Result<Self> {
        let (conn, screen_num, atoms) =
            clipmenu_x11::connect().context("failed to connect to the X server")?;
        let screen = conn.setup().roots[screen_num].clone();

        let win = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            win,
            screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::COPY_FROM_PARENT,
            COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        conn.flush()?;

        let xfixes_version = xfixes::query_version(&conn, 5, 0)
            .context("failed to query XFixes extension")?
            .reply()
            .context("XFixes extension is not available")?;
        log::debug!(
            "using XFixes {}.{}",
            xfixes_version.major_version,
            xfixes_version.minor_version
        );

        let mut daemon = Daemon {
            conn,
            atoms,
            win,
            store,
            store_root,
            config,
            capture: Capture::new(),
            enabled: true,
            sig_fd: setup_signalfd()?,
        };
        daemon.write_status()?;
        Ok(daemon)
    }

    fn selection_storage_map(&self) -> HashMap<u32, Selection> {
        Selection::ALL
            .into_iter()
            .map(|s| (s.storage_atom(&self.atoms), s))
            .collect()
    }

    /// Select XFixes selection-owner-change notifications for every
    /// configured selection, and perform the initial convert pass so
    /// the store reflects whatever is already on the clipboard at
    /// startup.
    pub fn setup_watches(&mut self) -> Result<()> {
        for selection in configured_selections(&self.config) {
            let sel_atom = selection.selection_atom(&self.atoms);
            self.conn.xfixes_select_selection_input(
                self.win,
                sel_atom,
                xfixes::SelectionEventMask::SET_SELECTION_OWNER,
            )?;
            log::debug!("getting initial value for selection {selection:?}");
            self.convert_selection(selection)?;
            self.pump_until_conclusive()?;
        }
        Ok(())
    }

    fn convert_selection(&self, selection: Selection) -> Result<()> {
        self.conn.convert_selection(
            self.win,
            selection.selection_atom(&self.atoms),
            self.atoms.UTF8_STRING,
            selection.storage_atom(&self.atoms),
            x11rb::CURRENT_TIME,
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Run forever, handling one clip (or disable/enable signal) per
    /// iteration.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.pump_until_conclusive()?;
        }
    }

    fn pump_until_conclusive(&mut self) -> Result<()> {
        loop {
            match self.step_once()? {
                Step::Pending => continue,
                Step::NoOwner | Step::Captured => return Ok(()),
            }
        }
    }

    fn step_once(&mut self) -> Result<Step> {
        if let Some(event) = self.conn.poll_for_event()? {
            return self.handle_event(event);
        }

        let x_fd = self.conn.stream().as_raw_fd();
        let mut fds = [
            PollFd::new(x_fd, PollFlags::POLLIN),
            PollFd::new(self.sig_fd.as_raw_fd(), PollFlags::POLLIN),
        ];
        poll(&mut fds, -1)?;

        if fds[1].revents().unwrap_or_else(PollFlags::empty).contains(PollFlags::POLLIN) {
            self.handle_signal()?;
        }

        if fds[0].revents().unwrap_or_else(PollFlags::empty).contains(PollFlags::POLLIN) {
            if let Some(event) = self.conn.poll_for_event()? {
                return self.handle_event(event);
            }
        }

        Ok(Step::Pending)
    }

    fn handle_event(&mut self, event: Event) -> Result<Step> {
        match event {
            Event::XfixesSelectionNotify(event) => {
                self.handle_xfixes_selection_notify(event)?;
                Ok(Step::Pending)
            }
            Event::PropertyNotify(event) => self.handle_property_notify(event),
            Event::SelectionNotify(event) => Ok(self.handle_selection_notify(event)),
            Event::Error(error) => {
                if !clipmenu_x11::is_expected_error(&error) {
                    log::warn!("X11 protocol error: {error:?}");
                }
                Ok(Step::Pending)
            }
            _ => Ok(Step::Pending),
        }
    }

    fn handle_xfixes_selection_notify(
        &self,
        event: xfixes::SelectionNotifyEvent,
    ) -> Result<()> {
        if !self.enabled {
            log::debug!("got selection change, but collection is disabled");
            return Ok(());
        }

        let title = clipmenu_x11::window_title(&self.conn, &self.atoms, event.owner);
        if clipmenu_capture::is_clipserve_window(title.as_deref())
            || clipmenu_capture::is_ignored_window(&self.config, title.as_deref())
        {
            log::debug!("ignoring clip from window titled {title:?}");
            return Ok(());
        }

        let Some(selection) = Selection::from_selection_atom(event.selection, &self.atoms) else {
            return Ok(());
        };
        log::debug!("notified about selection update: {selection:?}, owner {:?}", title);
        self.convert_selection(selection)
    }

    fn handle_property_notify(&mut self, event: PropertyNotifyEvent) -> Result<Step> {
        let storage_atoms = self.selection_storage_map();
        let Some(&selection) = storage_atoms.get(&event.atom) else {
            return Ok(Step::Pending);
        };
        if event.state != x11rb::protocol::xproto::Property::NEW_VALUE {
            return Ok(Step::Pending);
        }
        if !self.enabled {
            return Ok(Step::Pending);
        }

        log::debug!("received notification that selection conversion is ready");
        let reply = self
            .conn
            .get_property(false, self.win, event.atom, x11rb::protocol::xproto::AtomEnum::ANY, 0, u32::MAX)?
            .reply()?;
        let text = String::from_utf8_lossy(&reply.value).into_owned();

        if clipmenu_capture::is_salient(&text) {
            let hash = self
                .capture
                .store_clip(&self.store, &text)
                .context("failed to store clip")?;
            self.capture.maybe_trim(&self.store, &self.config)?;

            if selection_in_set(selection, &self.config.owned_selections) && self.config.own_clipboard {
                spawn_clipserve(hash);
            }
        } else {
            log::debug!("clipboard text is whitespace only, ignoring");
        }

        Ok(Step::Captured)
    }

    fn handle_selection_notify(&self, event: SelectionNotifyEvent) -> Step {
        if event.property == x11rb::NONE {
            if let Some(selection) = Selection::from_selection_atom(event.selection, &self.atoms) {
                log::debug!("X reports that {selection:?} has no current owner");
            }
            return Step::NoOwner;
        }
        Step::Pending
    }

    fn handle_signal(&mut self) -> Result<()> {
        let Some(siginfo) = self.sig_fd.read_signal()? else {
            return Ok(());
        };
        let signo = siginfo.ssi_signo as i32;
        if signo == Signal::SIGUSR1 as i32 {
            self.enabled = false;
            log::debug!("clipboard collection disabled by signal");
        } else if signo == Signal::SIGUSR2 as i32 {
            self.enabled = true;
            log::debug!("clipboard collection enabled by signal");
        }
        self.write_status()
    }

    fn write_status(&self) -> Result<()> {
        clipmenu_capture::write_status(&self.store_root, self.enabled)
    }
}

fn selection_in_set(selection: Selection, set: &clipmenu_config::SelectionSet) -> bool {
    match selection {
        Selection::Clipboard => set.clipboard,
        Selection::Primary => set.primary,
        Selection::Secondary => set.secondary,
    }
}

fn configured_selections(config: &Config) -> Vec<Selection> {
    let mut selections = Vec::new();
    if config.selections.clipboard {
        selections.push(Selection::Clipboard);
    }
    if config.selections.primary {
        selections.push(Selection::Primary);
    }
    if config.selections.secondary {
        selections.push(Selection::Secondary);
    }
    selections
}

fn setup_signalfd() -> Result<SignalFd> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGUSR1);
    mask.add(Signal::SIGUSR2);
    nix::sys::signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), None)?;

    // SIGCHLD is reaped automatically; clipserve children are never waited
    // on explicitly.
    unsafe {
        nix::sys::signal::signal(Signal::SIGCHLD, nix::sys::signal::SigHandler::SigIgn)?;
    }

    Ok(SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC)?)
}

fn spawn_clipserve(hash: u64) {
    match Command::new("clipserve").arg(hash.to_string()).spawn() {
        Ok(_) => {}
        Err(err) => log::error!("failed to spawn clipserve for clip {hash}: {err}"),
    }
}
