use std::convert::TryInto;

/// An X ClientMessage carries at most 20 bytes of payload.
pub const CLIENT_MESSAGE_SIZE: usize = 20;

/// Text-bearing messages spend 4 bytes on the fragment flag, leaving 16
/// bytes for NUL-terminated UTF-8.
pub const TEXT_BUFFER_SIZE: usize = CLIENT_MESSAGE_SIZE - 4;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("End of Stream")]
    EndOfStream,
    #[error("Invalid Data {0}: {1}")]
    InvalidData(&'static str, String),
}

pub(crate) struct Reader<'b> {
    bytes: &'b [u8],
}

impl<'b> Reader<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Self { bytes }
    }

    fn consume(&mut self, len: usize) -> Result<&'b [u8], ReadError> {
        if self.bytes.len() >= len {
            let (out, rest) = self.bytes.split_at(len);
            self.bytes = rest;
            Ok(out)
        } else {
            Err(ReadError::EndOfStream)
        }
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_ne_bytes(self.consume(4)?.try_into().unwrap()))
    }

    pub fn i32(&mut self) -> Result<i32, ReadError> {
        Ok(i32::from_ne_bytes(self.consume(4)?.try_into().unwrap()))
    }

    /// Remaining bytes up to the first NUL.
    pub fn c_text(&mut self) -> Vec<u8> {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        self.bytes[..end].to_vec()
    }
}

pub(crate) struct Writer {
    out: [u8; CLIENT_MESSAGE_SIZE],
    at: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            out: [0; CLIENT_MESSAGE_SIZE],
            at: 0,
        }
    }

    pub fn u32(&mut self, v: u32) {
        self.bytes(&v.to_ne_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.bytes(&v.to_ne_bytes());
    }

    pub fn bytes(&mut self, b: &[u8]) {
        debug_assert!(self.at + b.len() <= CLIENT_MESSAGE_SIZE);
        self.out[self.at..self.at + b.len()].copy_from_slice(b);
        self.at += b.len();
    }

    pub fn finish(self) -> [u8; CLIENT_MESSAGE_SIZE] {
        self.out
    }
}

/// One `_HILDON_IM_*` atom per message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomKind {
    /// Root-window property holding the IM server window id, not a
    /// ClientMessage kind.
    Window,
    Activate,
    InputMode,
    InsertUtf8,
    Surrounding,
    SurroundingContent,
    KeyEvent,
    Com,
    ClipboardCopied,
    ClipboardSelectionQuery,
    ClipboardSelectionReply,
    PreeditCommitted,
    PreeditCommittedContent,
    LongPressSettings,
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(i32)]
        pub enum $name {
            $($variant = $value,)+
        }

        impl $name {
            fn from_wire(repr: i32) -> Result<Self, ReadError> {
                match repr {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(ReadError::InvalidData(stringify!($name), repr.to_string())),
                }
            }
        }
    };
}

wire_enum! {
    /// Commands and notifications sent from the context to the IM process.
    Command {
        Mode = 0,
        Show = 1,
        Hide = 2,
        Up = 3,
        Low = 4,
        Destroy = 5,
        Clear = 6,
        SetClient = 7,
        SetAndShow = 8,
        SelectAll = 9,
        ShiftLocked = 10,
        ShiftUnlocked = 11,
        ModLocked = 12,
        ModUnlocked = 13,
        ShiftSticky = 14,
        ShiftUnsticky = 15,
        ModSticky = 16,
        ModUnsticky = 17,
    }
}

wire_enum! {
    /// Communications sent from the IM process to the context.
    Communication {
        HandleEnter = 0,
        HandleTab = 1,
        HandleBackspace = 2,
        HandleSpace = 3,
        ConfirmSentenceStart = 4,
        FlushPreedit = 5,
        CancelPreedit = 6,
        BufferedMode = 7,
        DirectMode = 8,
        RedirectMode = 9,
        SurroundingMode = 10,
        PreeditMode = 11,
        ClipboardCopy = 12,
        ClipboardCut = 13,
        ClipboardPaste = 14,
        ClipboardSelectionQuery = 15,
        RequestSurrounding = 16,
        RequestSurroundingFull = 17,
        WidgetChanged = 18,
        OptionChanged = 19,
        ClearSticky = 20,
        EnterOnFocus = 21,
        SpaceAfterCommit = 22,
        NoSpaceAfterCommit = 23,
        ShiftLocked = 24,
        ShiftUnlocked = 25,
        ShiftUnsticky = 26,
        LevelLocked = 27,
        LevelUnlocked = 28,
        LevelUnsticky = 29,
    }
}

wire_enum! {
    /// How committed text is inserted into the client widget.
    CommitMode {
        Direct = 0,
        Redirect = 1,
        Surrounding = 2,
        Buffered = 3,
        Preedit = 4,
    }
}

wire_enum! {
    /// What caused the IM plugin to activate.
    Trigger {
        None = -1,
        Stylus = 0,
        Finger = 1,
        Keyboard = 2,
        Unknown = 3,
    }
}

wire_enum! {
    /// Position of a fragment in a message spanning several ClientMessages.
    MsgFlag {
        Start = 0,
        Continue = 1,
        End = 2,
    }
}

wire_enum! {
    /// Key event type, carried with the toolkit's event-type codes.
    EventType {
        Press = 8,
        Release = 9,
    }
}

bitflags::bitflags! {
    /// Per-context behavioral options pushed by the IM process.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct OptionMask: u32 {
        const AUTOCASE          = 1 << 0;
        const AUTOCORRECT       = 1 << 1;
        const AUTOLEVEL_NUMERIC = 1 << 2;
        const LOCK_LEVEL        = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Input-mode hints of the client text field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct InputMode: u32 {
        const ALPHA      = 1 << 0;
        const NUMERIC    = 1 << 1;
        const SPECIAL    = 1 << 2;
        const HEXA       = 1 << 3;
        const TELE       = 1 << 4;
        const FULL       = Self::ALPHA.bits()
                         | Self::NUMERIC.bits()
                         | Self::SPECIAL.bits()
                         | Self::HEXA.bits()
                         | Self::TELE.bits();
        const MULTILINE  = 1 << 28;
        const INVISIBLE  = 1 << 29;
        const AUTOCAP    = 1 << 30;
        const DICTIONARY = 1 << 31;
    }
}

/// One IM↔context wire message.
///
/// Fragment text is kept as raw bytes: the chunker splits on byte length
/// without respecting UTF-8 boundaries, so an individual fragment is not
/// guaranteed to be valid UTF-8 on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Activate {
        input_window: u32,
        app_window: u32,
        command: Command,
        trigger: Trigger,
    },
    InputMode {
        input_mode: InputMode,
        default_input_mode: InputMode,
    },
    InsertUtf8 {
        flag: MsgFlag,
        text: Vec<u8>,
    },
    Surrounding {
        commit_mode: CommitMode,
        offset_is_relative: bool,
        cursor_offset: i32,
    },
    SurroundingContent {
        flag: MsgFlag,
        text: Vec<u8>,
    },
    KeyEvent {
        input_window: u32,
        ty: EventType,
        state: u32,
        keyval: u32,
        hardware_keycode: u16,
    },
    Com {
        input_window: u32,
        communication: Communication,
        options: OptionMask,
    },
    ClipboardCopied,
    ClipboardSelectionQuery,
    ClipboardSelectionReply {
        has_selection: bool,
    },
    PreeditCommitted {
        flag: MsgFlag,
        commit_mode: CommitMode,
    },
    PreeditCommittedContent {
        flag: MsgFlag,
        text: Vec<u8>,
    },
    LongPressSettings {
        enable: bool,
        timeout_ms: i32,
    },
}

impl Message {
    pub fn atom(&self) -> AtomKind {
        match self {
            Message::Activate { .. } => AtomKind::Activate,
            Message::InputMode { .. } => AtomKind::InputMode,
            Message::InsertUtf8 { .. } => AtomKind::InsertUtf8,
            Message::Surrounding { .. } => AtomKind::Surrounding,
            Message::SurroundingContent { .. } => AtomKind::SurroundingContent,
            Message::KeyEvent { .. } => AtomKind::KeyEvent,
            Message::Com { .. } => AtomKind::Com,
            Message::ClipboardCopied => AtomKind::ClipboardCopied,
            Message::ClipboardSelectionQuery => AtomKind::ClipboardSelectionQuery,
            Message::ClipboardSelectionReply { .. } => AtomKind::ClipboardSelectionReply,
            Message::PreeditCommitted { .. } => AtomKind::PreeditCommitted,
            Message::PreeditCommittedContent { .. } => AtomKind::PreeditCommittedContent,
            Message::LongPressSettings { .. } => AtomKind::LongPressSettings,
        }
    }

    pub fn format(&self) -> u8 {
        self.atom().format()
    }

    /// Serialize into a 20-byte ClientMessage payload; unused trailing
    /// bytes are zero, which also NUL-terminates any text field.
    pub fn write(&self) -> [u8; CLIENT_MESSAGE_SIZE] {
        let mut w = Writer::new();
        match self {
            Message::Activate {
                input_window,
                app_window,
                command,
                trigger,
            } => {
                w.u32(*input_window);
                w.u32(*app_window);
                w.i32(*command as i32);
                w.i32(*trigger as i32);
            }
            Message::InputMode {
                input_mode,
                default_input_mode,
            } => {
                w.u32(input_mode.bits());
                w.u32(default_input_mode.bits());
            }
            Message::InsertUtf8 { flag, text }
            | Message::SurroundingContent { flag, text }
            | Message::PreeditCommittedContent { flag, text } => {
                // A foreign peer may fill all 16 text bytes with no
                // terminator; clamp so the NUL always fits on re-encode
                let text = &text[..text.len().min(TEXT_BUFFER_SIZE - 1)];
                w.i32(*flag as i32);
                w.bytes(text);
            }
            Message::Surrounding {
                commit_mode,
                offset_is_relative,
                cursor_offset,
            } => {
                w.i32(*commit_mode as i32);
                w.i32(*offset_is_relative as i32);
                w.i32(*cursor_offset);
            }
            Message::KeyEvent {
                input_window,
                ty,
                state,
                keyval,
                hardware_keycode,
            } => {
                w.u32(*input_window);
                w.i32(*ty as i32);
                w.u32(*state);
                w.u32(*keyval);
                w.u32(u32::from(*hardware_keycode));
            }
            Message::Com {
                input_window,
                communication,
                options,
            } => {
                w.u32(*input_window);
                w.i32(*communication as i32);
                w.u32(options.bits());
            }
            Message::ClipboardCopied | Message::ClipboardSelectionQuery => {}
            Message::ClipboardSelectionReply { has_selection } => {
                w.i32(*has_selection as i32);
            }
            Message::PreeditCommitted { flag, commit_mode } => {
                w.i32(*flag as i32);
                w.i32(*commit_mode as i32);
            }
            Message::LongPressSettings { enable, timeout_ms } => {
                w.i32(*enable as i32);
                w.i32(*timeout_ms);
            }
        }
        w.finish()
    }

    /// Decode a ClientMessage payload delivered under the given atom.
    pub fn read(kind: AtomKind, payload: &[u8; CLIENT_MESSAGE_SIZE]) -> Result<Self, ReadError> {
        let mut r = Reader::new(payload);
        match kind {
            AtomKind::Window => Err(ReadError::InvalidData(
                "AtomKind",
                "Window is a property, not a message".into(),
            )),
            AtomKind::Activate => Ok(Message::Activate {
                input_window: r.u32()?,
                app_window: r.u32()?,
                command: Command::from_wire(r.i32()?)?,
                trigger: Trigger::from_wire(r.i32()?)?,
            }),
            AtomKind::InputMode => Ok(Message::InputMode {
                input_mode: InputMode::from_bits_truncate(r.u32()?),
                default_input_mode: InputMode::from_bits_truncate(r.u32()?),
            }),
            AtomKind::InsertUtf8 => Ok(Message::InsertUtf8 {
                flag: MsgFlag::from_wire(r.i32()?)?,
                text: r.c_text(),
            }),
            AtomKind::Surrounding => Ok(Message::Surrounding {
                commit_mode: CommitMode::from_wire(r.i32()?)?,
                offset_is_relative: r.i32()? != 0,
                cursor_offset: r.i32()?,
            }),
            AtomKind::SurroundingContent => Ok(Message::SurroundingContent {
                flag: MsgFlag::from_wire(r.i32()?)?,
                text: r.c_text(),
            }),
            AtomKind::KeyEvent => Ok(Message::KeyEvent {
                input_window: r.u32()?,
                ty: EventType::from_wire(r.i32()?)?,
                state: r.u32()?,
                keyval: r.u32()?,
                hardware_keycode: r.u32()? as u16,
            }),
            AtomKind::Com => Ok(Message::Com {
                input_window: r.u32()?,
                communication: Communication::from_wire(r.i32()?)?,
                options: OptionMask::from_bits_truncate(r.u32()?),
            }),
            AtomKind::ClipboardCopied => Ok(Message::ClipboardCopied),
            AtomKind::ClipboardSelectionQuery => Ok(Message::ClipboardSelectionQuery),
            AtomKind::ClipboardSelectionReply => Ok(Message::ClipboardSelectionReply {
                has_selection: r.i32()? != 0,
            }),
            AtomKind::PreeditCommitted => Ok(Message::PreeditCommitted {
                flag: MsgFlag::from_wire(r.i32()?)?,
                commit_mode: CommitMode::from_wire(r.i32()?)?,
            }),
            AtomKind::PreeditCommittedContent => Ok(Message::PreeditCommittedContent {
                flag: MsgFlag::from_wire(r.i32()?)?,
                text: r.c_text(),
            }),
            AtomKind::LongPressSettings => Ok(Message::LongPressSettings {
                enable: r.i32()? != 0,
                timeout_ms: r.i32()?,
            }),
        }
    }
}
