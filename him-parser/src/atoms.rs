use crate::message::AtomKind;

macro_rules! define_atoms {
    ($(($variant:ident, $name:expr, $format:expr),)+) => {
        impl AtomKind {
            pub const ALL: &'static [AtomKind] = &[$(AtomKind::$variant,)+];

            /// The X atom name this message kind is delivered under.
            pub const fn name(self) -> &'static str {
                match self {
                    $(AtomKind::$variant => $name,)+
                }
            }

            /// ClientMessage `format` field (8 or 32 bit units).
            pub const fn format(self) -> u8 {
                match self {
                    $(AtomKind::$variant => $format,)+
                }
            }

            pub fn from_name(name: &str) -> Option<AtomKind> {
                match name {
                    $($name => Some(AtomKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

define_atoms! {
    (Window, "_HILDON_IM_WINDOW", 32),
    (Activate, "_HILDON_IM_ACTIVATE", 8),
    (InputMode, "_HILDON_IM_INPUT_MODE", 8),
    (InsertUtf8, "_HILDON_IM_INSERT_UTF8", 8),
    (Surrounding, "_HILDON_IM_SURROUNDING", 8),
    (SurroundingContent, "_HILDON_IM_SURROUNDING_CONTENT", 8),
    (KeyEvent, "_HILDON_IM_KEY_EVENT", 8),
    (Com, "_HILDON_IM_COM", 8),
    (ClipboardCopied, "_HILDON_IM_CLIPBOARD_COPIED", 32),
    (ClipboardSelectionQuery, "_HILDON_IM_CLIPBOARD_SELECTION_QUERY", 32),
    (ClipboardSelectionReply, "_HILDON_IM_CLIPBOARD_SELECTION_REPLY", 32),
    (PreeditCommitted, "_HILDON_IM_PREEDIT_COMMITTED", 8),
    (PreeditCommittedContent, "_HILDON_IM_PREEDIT_COMMITTED_CONTENT", 8),
    (LongPressSettings, "_HILDON_IM_LONG_PRESS_SETTINGS", 8),
}
