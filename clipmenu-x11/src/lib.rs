//! Shared X11 plumbing: atom interning, the three watched selections,
//! window-title lookup, and an error classifier for the handful of
//! protocol errors that are expected to happen in normal operation.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt};
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::X11Error;

x11rb::atom_manager! {
    pub Atoms: AtomCookies {
        CLIPBOARD,
        PRIMARY,
        SECONDARY,
        TARGETS,
        UTF8_STRING,
        STRING,
        CLIPMENUD_CUR_CLIPBOARD,
        CLIPMENUD_CUR_PRIMARY,
        CLIPMENUD_CUR_SECONDARY,
        _NET_WM_NAME,
        WM_NAME,
    }
}

/// Which of the three selections an event pertains to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Selection {
    Clipboard,
    Primary,
    Secondary,
}

impl Selection {
    pub const ALL: [Selection; 3] = [Selection::Clipboard, Selection::Primary, Selection::Secondary];

    /// The selection atom this variant corresponds to (`CLIPBOARD`,
    /// `PRIMARY`, or `SECONDARY`).
    pub fn selection_atom(self, atoms: &Atoms) -> u32 {
        match self {
            Selection::Clipboard => atoms.CLIPBOARD,
            Selection::Primary => AtomEnum::PRIMARY.into(),
            Selection::Secondary => AtomEnum::SECONDARY.into(),
        }
    }

    /// The property on our window that holds the converted value for
    /// this selection.
    pub fn storage_atom(self, atoms: &Atoms) -> u32 {
        match self {
            Selection::Clipboard => atoms.CLIPMENUD_CUR_CLIPBOARD,
            Selection::Primary => atoms.CLIPMENUD_CUR_PRIMARY,
            Selection::Secondary => atoms.CLIPMENUD_CUR_SECONDARY,
        }
    }

    pub fn from_selection_atom(atom: u32, atoms: &Atoms) -> Option<Selection> {
        Selection::ALL
            .into_iter()
            .find(|s| s.selection_atom(atoms) == atom)
    }

    pub fn from_storage_atom(atom: u32, atoms: &Atoms) -> Option<Selection> {
        Selection::ALL
            .into_iter()
            .find(|s| s.storage_atom(atoms) == atom)
    }
}

/// Connect to the X server named by `$DISPLAY` and intern the atoms this
/// workspace cares about.
pub fn connect() -> Result<(RustConnection, usize, Atoms)> {
    let (conn, screen_num) =
        RustConnection::connect(None).context("failed to connect to the X server")?;
    let atoms = Atoms::new(&conn)
        .context("failed to intern atoms")?
        .reply()
        .context("failed to intern atoms")?;
    Ok((conn, screen_num, atoms))
}

/// Fetch a window's title, preferring `_NET_WM_NAME` (UTF-8) and falling
/// back to the legacy `WM_NAME` property.
pub fn window_title(conn: &impl Connection, atoms: &Atoms, window: u32) -> Option<String> {
    if let Some(title) = get_text_property(conn, window, atoms._NET_WM_NAME, atoms.UTF8_STRING) {
        return Some(title);
    }
    get_text_property(conn, window, atoms.WM_NAME, AtomEnum::ANY.into())
}

fn get_text_property(
    conn: &impl Connection,
    window: u32,
    property: u32,
    expected_type: u32,
) -> Option<String> {
    let reply = conn
        .get_property(false, window, property, expected_type, 0, u32::MAX)
        .ok()?
        .reply()
        .ok()?;
    if reply.value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&reply.value).into_owned())
}

/// Certain X11 operations fail in expected ways (most often: the other
/// side's window disappeared mid-request, or a selection owner raced
/// us). Errors of this shape are logged and otherwise ignored rather
/// than treated as fatal.
///
/// Xlib's `xerror_handler` whitelists specific `(error_code,
/// request_code)` pairs; x11rb instead hands back a typed `Error` enum
/// per failed request, so the equivalent whitelist is expressed as a
/// match over error variants instead.
pub fn is_expected_error(error: &X11Error) -> bool {
    matches!(
        error.error_kind,
        ErrorKind::Window | ErrorKind::Match | ErrorKind::Drawable | ErrorKind::Access
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A synthetic `Atoms` with distinct, made-up values, standing in
    /// for the ones a live connection would intern.
    fn fake_atoms() -> Atoms {
        Atoms {
            CLIPBOARD: 100,
            PRIMARY: 101,
            SECONDARY: 102,
            TARGETS: 103,
            UTF8_STRING: 104,
            STRING: 105,
            CLIPMENUD_CUR_CLIPBOARD: 106,
            CLIPMENUD_CUR_PRIMARY: 107,
            CLIPMENUD_CUR_SECONDARY: 108,
            _NET_WM_NAME: 109,
            WM_NAME: 110,
        }
    }

    #[test]
    fn selection_atoms_round_trip() {
        let atoms = fake_atoms();
        for selection in Selection::ALL {
            let atom = selection.selection_atom(&atoms);
            assert_eq!(Selection::from_selection_atom(atom, &atoms), Some(selection));
        }
    }

    #[test]
    fn storage_atoms_round_trip() {
        let atoms = fake_atoms();
        for selection in Selection::ALL {
            let atom = selection.storage_atom(&atoms);
            assert_eq!(Selection::from_storage_atom(atom, &atoms), Some(selection));
        }
    }

    #[test]
    fn unrelated_atom_is_not_a_selection() {
        let atoms = fake_atoms();
        assert_eq!(Selection::from_selection_atom(atoms.TARGETS, &atoms), None);
        assert_eq!(Selection::from_storage_atom(atoms.UTF8_STRING, &atoms), None);
    }
}
