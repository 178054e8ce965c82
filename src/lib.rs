//! Client-side input-method support for the Hildon IM process.
//!
//! The out-of-process IM and the application exchange 20-byte X11
//! ClientMessages (the wire types live in the `hildon-im-parser`
//! crate). This crate holds everything above the wire: the per-widget
//! [`ImContext`] state machine with its sticky/lock modifier handling,
//! dead-key composition and preedit bookkeeping, and an optional
//! `x11rb`-based transport behind the `x11rb-transport` feature.
//!
//! The context reaches its host through four traits: [`TextSink`] for
//! the client widget, [`Transport`] for the wire, [`Scheduler`] for
//! timers and [`Keymap`] for layout lookups. A toolkit binding
//! implements those once and drives [`ImContext::filter_keypress`] and
//! [`ImContext::handle_message`].

#![forbid(unsafe_code)]

pub use hildon_im_parser as parser;

mod common;
mod context;
mod dead_keys;
mod keyboard;
pub mod keysyms;

#[cfg(feature = "x11rb-transport")]
pub mod x11rb;

pub use crate::common::{
    autocorrection_check_character, changes_case, check_auto_cap, should_be_appended_after_letter,
};
pub use crate::context::{
    ClipboardOp, ImContext, ImEnvironment, Scheduler, TaskKind, TextSink, Transport,
    DEFAULT_LONG_PRESS_TIMEOUT_MS, DEFAULT_SHOW_DELAY_MS,
};
pub use crate::dead_keys::{combining_char_for_keyval, compose, spacing_char_for_combining};
pub use crate::keyboard::{
    KeyEvent, KeyState, Keymap, ModifierMask, BASE_LEVEL, COMPOSE_KEY, LEVEL_KEY, LOCKABLE_LEVEL,
    NUMERIC_LEVEL,
};

pub(crate) type AHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
