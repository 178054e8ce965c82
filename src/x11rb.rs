//! `x11rb`-based transport to the Hildon IM process.
//!
//! The IM publishes its communication window in the `_HILDON_IM_WINDOW`
//! property on the root window; every message is a 20-byte
//! ClientMessage sent to that window. The IM can be restarted at any
//! time, so a send that fails with `BadWindow` re-reads the property
//! and retries once.

use log::warn;
use x11rb::{
    connection::Connection,
    protocol::{
        xproto::{
            Atom, AtomEnum, ClientMessageData, ClientMessageEvent, ConnectionExt, EventMask,
            Screen, CLIENT_MESSAGE_EVENT, KEY_PRESS_EVENT, KEY_RELEASE_EVENT,
        },
        xtest::ConnectionExt as XTestConnectionExt,
        ErrorKind,
    },
    errors::ReplyError,
    CURRENT_TIME, NONE,
};

use crate::parser::{AtomKind, Message, ReadError};
use crate::{AHashMap, Transport};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connect error: {0}")]
    ConnectError(#[from] x11rb::errors::ConnectError),
    #[error("Reply error: {0}")]
    ReplyError(#[from] x11rb::errors::ReplyError),
    #[error("Connection error: {0}")]
    ConnectionError(#[from] x11rb::errors::ConnectionError),
    #[error("Invalid reply from server")]
    InvalidReply,
    #[error("No input-method window on the root window")]
    NoImWindow,
    #[error("Keysym {0:#x} has no keycode in the current layout")]
    NoKeycode(u32),
}

/// Interned `_HILDON_IM_*` atoms, indexed by [`AtomKind`].
pub struct Atoms {
    atoms: [Atom; AtomKind::ALL.len()],
}

impl Atoms {
    pub fn new<E, F>(mut intern: F) -> Result<Self, E>
    where
        F: FnMut(&'static str) -> Result<Atom, E>,
    {
        let mut atoms = [NONE; AtomKind::ALL.len()];
        for kind in AtomKind::ALL {
            atoms[*kind as usize] = intern(kind.name())?;
        }
        Ok(Atoms { atoms })
    }

    pub fn get(&self, kind: AtomKind) -> Atom {
        self.atoms[kind as usize]
    }

    pub fn kind_of(&self, atom: Atom) -> Option<AtomKind> {
        AtomKind::ALL
            .iter()
            .find(|kind| self.atoms[**kind as usize] == atom)
            .copied()
    }
}

/// One connection to the IM server window.
pub struct Client<'x, C: Connection + ConnectionExt> {
    conn: &'x C,
    root: u32,
    atoms: Atoms,
    im_window: u32,
    keycodes: AHashMap<u32, u8>,
}

impl<'x, C: Connection + ConnectionExt> Client<'x, C> {
    pub fn init(conn: &'x C, screen: &'x Screen) -> Result<Self, ClientError> {
        let atoms = Atoms::new::<ClientError, _>(|name| {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        })?;

        let im_window = find_im_window(conn, screen.root, atoms.get(AtomKind::Window))?;
        let keycodes = keycode_map(conn)?;

        Ok(Self {
            conn,
            root: screen.root,
            atoms,
            im_window,
            keycodes,
        })
    }

    pub fn im_window(&self) -> u32 {
        self.im_window
    }

    /// Send one message, re-resolving the IM window and retrying once
    /// if it went away.
    pub fn send_message(&mut self, msg: &Message) -> Result<(), ClientError> {
        match self.send_once(msg) {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(ref e)) if e.error_kind == ErrorKind::Window => {
                self.im_window =
                    find_im_window(self.conn, self.root, self.atoms.get(AtomKind::Window))?;
                self.send_once(msg)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn send_once(&self, msg: &Message) -> Result<(), ReplyError> {
        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: msg.format(),
            sequence: 0,
            window: self.im_window,
            type_: self.atoms.get(msg.atom()),
            data: ClientMessageData::from(msg.write()),
        };

        self.conn
            .send_event(false, self.im_window, EventMask::NO_EVENT, event)?
            .check()?;

        Ok(())
    }

    /// Synthesize a hardware key event through XTest.
    pub fn fake_key_event(&self, keysym: u32, press: bool) -> Result<(), ClientError> {
        let keycode = *self
            .keycodes
            .get(&keysym)
            .ok_or(ClientError::NoKeycode(keysym))?;

        let ty = if press {
            KEY_PRESS_EVENT
        } else {
            KEY_RELEASE_EVENT
        };
        self.conn
            .xtest_fake_input(ty, keycode, CURRENT_TIME, NONE, 0, 0, 0)?;
        self.conn.flush()?;

        Ok(())
    }

    /// Decode an incoming ClientMessage, `None` when its type is not
    /// one of ours.
    pub fn decode(&self, event: &ClientMessageEvent) -> Option<Result<Message, ReadError>> {
        let kind = self.atoms.kind_of(event.type_)?;
        Some(Message::read(kind, &event.data.as_data8()))
    }
}

impl<C: Connection + ConnectionExt> Transport for Client<'_, C> {
    fn send(&mut self, msg: &Message) {
        if let Err(err) = self.send_message(msg) {
            warn!("dropping {:?} message: {}", msg.atom(), err);
        }
    }

    fn fake_key(&mut self, keysym: u32, press: bool) {
        if let Err(err) = self.fake_key_event(keysym, press) {
            warn!("could not synthesize key {:#x}: {}", keysym, err);
        }
    }
}

fn find_im_window<C: Connection + ConnectionExt>(
    conn: &C,
    root: u32,
    window_atom: Atom,
) -> Result<u32, ClientError> {
    let reply = conn
        .get_property(false, root, window_atom, AtomEnum::WINDOW, 0, 1)?
        .reply()?;

    if reply.type_ != Atom::from(AtomEnum::WINDOW) || reply.format != 32 {
        return Err(ClientError::InvalidReply);
    }

    reply
        .value32()
        .and_then(|mut windows| windows.next())
        .filter(|w| *w != NONE)
        .ok_or(ClientError::NoImWindow)
}

/// First keycode producing each keysym, from the server's keyboard
/// mapping.
fn keycode_map<C: Connection + ConnectionExt>(
    conn: &C,
) -> Result<AHashMap<u32, u8>, ClientError> {
    let setup = conn.setup();
    let min = setup.min_keycode;
    let max = setup.max_keycode;

    let mapping = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
    let per_keycode = usize::from(mapping.keysyms_per_keycode);

    let mut map = AHashMap::default();
    if per_keycode == 0 {
        return Ok(map);
    }

    for (i, syms) in mapping.keysyms.chunks(per_keycode).enumerate() {
        for &sym in syms {
            if sym != 0 {
                map.entry(sym).or_insert(min + i as u8);
            }
        }
    }

    Ok(map)
}
