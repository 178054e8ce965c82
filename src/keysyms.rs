//! X keysym constants used by the modifier state machine, plus the
//! keysym/Unicode conversions the keyboard layer needs.

pub const SPACE: u32 = 0x0020;

pub const BACKSPACE: u32 = 0xff08;
pub const TAB: u32 = 0xff09;
pub const RETURN: u32 = 0xff0d;
pub const MULTI_KEY: u32 = 0xff20;
pub const LEFT: u32 = 0xff51;
pub const RIGHT: u32 = 0xff53;
pub const KP_ENTER: u32 = 0xff8d;
pub const SHIFT_L: u32 = 0xffe1;
pub const SHIFT_R: u32 = 0xffe2;
pub const DELETE: u32 = 0xffff;

pub const ISO_LEVEL3_SHIFT: u32 = 0xfe03;

pub const DEAD_GRAVE: u32 = 0xfe50;
pub const DEAD_ACUTE: u32 = 0xfe51;
pub const DEAD_CIRCUMFLEX: u32 = 0xfe52;
pub const DEAD_TILDE: u32 = 0xfe53;
pub const DEAD_MACRON: u32 = 0xfe54;
pub const DEAD_BREVE: u32 = 0xfe55;
pub const DEAD_ABOVEDOT: u32 = 0xfe56;
pub const DEAD_DIAERESIS: u32 = 0xfe57;
pub const DEAD_ABOVERING: u32 = 0xfe58;
pub const DEAD_DOUBLEACUTE: u32 = 0xfe59;
pub const DEAD_CARON: u32 = 0xfe5a;
pub const DEAD_CEDILLA: u32 = 0xfe5b;
pub const DEAD_OGONEK: u32 = 0xfe5c;
pub const DEAD_IOTA: u32 = 0xfe5d;
pub const DEAD_VOICED_SOUND: u32 = 0xfe5e;
pub const DEAD_SEMIVOICED_SOUND: u32 = 0xfe5f;
pub const DEAD_BELOWDOT: u32 = 0xfe60;
pub const DEAD_HOOK: u32 = 0xfe61;
pub const DEAD_HORN: u32 = 0xfe62;

/// Keysyms above this carry a Unicode codepoint in the low 24 bits.
const UNICODE_OFFSET: u32 = 0x0100_0000;

/// Unicode codepoint for a keysym, if it has a printable one.
///
/// Latin-1 keysyms are their own codepoints; keysyms in the directly
/// encoded Unicode range carry the codepoint in the low bits. Function
/// and modifier keysyms have no character.
pub fn keyval_to_unicode(keyval: u32) -> Option<char> {
    match keyval {
        0x20..=0x7e | 0xa0..=0xff => char::from_u32(keyval),
        UNICODE_OFFSET..=0x0110_ffff => char::from_u32(keyval - UNICODE_OFFSET),
        _ => None,
    }
}

/// Keysym for a Unicode character, inverse of [`keyval_to_unicode`].
pub fn unicode_to_keyval(c: char) -> u32 {
    let cp = c as u32;
    if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
        cp
    } else {
        cp + UNICODE_OFFSET
    }
}

fn map_case(keyval: u32, f: impl Fn(char) -> char) -> u32 {
    match keyval_to_unicode(keyval) {
        Some(c) => {
            let mapped = f(c);
            if mapped == c {
                keyval
            } else {
                unicode_to_keyval(mapped)
            }
        }
        None => keyval,
    }
}

pub fn keyval_to_lower(keyval: u32) -> u32 {
    map_case(keyval, |c| c.to_lowercase().next().unwrap_or(c))
}

pub fn keyval_to_upper(keyval: u32) -> u32 {
    map_case(keyval, |c| c.to_uppercase().next().unwrap_or(c))
}

pub fn keyval_is_upper(keyval: u32) -> bool {
    keyval_to_unicode(keyval).map_or(false, |c| c.is_uppercase())
}

/// Whether a keysym has distinct upper and lower case forms.
pub fn keyval_has_case(keyval: u32) -> bool {
    keyval_to_lower(keyval) != keyval_to_upper(keyval)
}
