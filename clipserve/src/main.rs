//! `clipserve`: claims ownership of PRIMARY and CLIPBOARD, answers
//! `SelectionRequest`s for a single stored clip, and exits once every
//! selection it claimed has been taken over by something else.

use anyhow::{bail, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt, CreateWindowAux, EventMask, PropMode, SelectionNotifyEvent,
    WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::protocol::Event;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, CURRENT_TIME, NONE};

use clipmenu_buildcfg::{CLIPSERVE_WINDOW_TITLE, INDEX_FILE_NAME};
use clipmenu_config::Config;
use clipmenu_store::ClipStore;

fn serve(hash: u64, content: &[u8]) -> Result<()> {
    let (conn, screen_num, atoms) = clipmenu_x11::connect()?;
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
        &CreateWindowAux::new(),
    )?;
    conn.change_property8(
        PropMode::REPLACE,
        win,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        CLIPSERVE_WINDOW_TITLE.as_bytes(),
    )?;

    let selections = [AtomEnum::PRIMARY.into(), atoms.CLIPBOARD];
    for selection in selections {
        conn.set_selection_owner(win, selection, CURRENT_TIME)?;
        conn.flush()?;
        let owner = conn.get_selection_owner(selection)?.reply()?.owner;
        if owner != win {
            bail!("failed to take ownership of selection {selection}");
        }
    }
    let mut remaining = selections.len();

    loop {
        let event = conn.wait_for_event()?;
        match event {
            Event::SelectionRequest(request) => {
                let title = clipmenu_x11::window_title(&conn, &atoms, request.requestor);
                log::debug!(
                    "servicing request from window {:?} (0x{:x}) for clip {hash}",
                    title,
                    request.requestor
                );

                let mut property = request.property;
                if request.target == atoms.TARGETS {
                    let available = [atoms.UTF8_STRING, AtomEnum::STRING.into()];
                    conn.change_property32(
                        PropMode::REPLACE,
                        request.requestor,
                        request.property,
                        AtomEnum::ATOM,
                        &available,
                    )?;
                } else if request.target == atoms.UTF8_STRING
                    || request.target == AtomEnum::STRING.into()
                {
                    conn.change_property8(
                        PropMode::REPLACE,
                        request.requestor,
                        request.property,
                        request.target,
                        content,
                    )?;
                } else {
                    property = NONE;
                }

                conn.send_event(
                    false,
                    request.requestor,
                    EventMask::NO_EVENT,
                    SelectionNotifyEvent {
                        response_type: x11rb::protocol::xproto::SELECTION_NOTIFY_EVENT,
                        sequence: request.sequence,
                        time: request.time,
                        requestor: request.requestor,
                        selection: request.selection,
                        target: request.target,
                        property,
                    },
                )?;
                conn.flush()?;
            }
            Event::SelectionClear(_) => {
                remaining -= 1;
                if remaining == 0 {
                    log::debug!("finished serving clip {hash}");
                    return Ok(());
                }
                log::debug!("{remaining} selections remaining to serve for clip {hash}");
            }
            Event::Error(error) => {
                if !clipmenu_x11::is_expected_error(&error) {
                    log::warn!("X11 protocol error while serving clip {hash}: {error:?}");
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    clipmenu_config::init_logging();

    let hash: u64 = std::env::args()
        .nth(1)
        .context("usage: clipserve <hash>")?
        .parse()
        .context("hash must be a u64")?;

    let config = Config::load().context("failed to load configuration")?;
    let store_root = config.store_root().context("failed to resolve store root")?;
    let store = ClipStore::open(&store_root.join(INDEX_FILE_NAME), &store_root)
        .context("failed to open clip store")?;

    let content = store
        .content_get(hash)
        .with_context(|| format!("hash {hash} is inaccessible"))?;

    serve(hash, &content)
}
