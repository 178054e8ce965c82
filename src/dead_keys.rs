//! Dead-key tables and accent composition.
//!
//! A dead key commits nothing by itself; it records a combining mark
//! that is merged with the next printable character. Pressing the same
//! dead key twice, or a dead key followed by space, produces the mark's
//! spacing representation instead.

use unicode_normalization::UnicodeNormalization;

use crate::keysyms;

/// Combining mark for a dead-key keysym, or 0 when the key cannot
/// combine (iota, voiced/semivoiced sound, unknown keysyms).
pub fn combining_char_for_keyval(keyval: u32) -> u32 {
    match keyval {
        keysyms::DEAD_GRAVE => 0x0300,
        keysyms::DEAD_ACUTE => 0x0301,
        keysyms::DEAD_CIRCUMFLEX => 0x0302,
        keysyms::DEAD_TILDE => 0x0303,
        keysyms::DEAD_MACRON => 0x0304,
        keysyms::DEAD_BREVE => 0x032e,
        keysyms::DEAD_ABOVEDOT => 0x0307,
        keysyms::DEAD_DIAERESIS => 0x0308,
        keysyms::DEAD_ABOVERING => 0x030a,
        keysyms::DEAD_DOUBLEACUTE => 0x030b,
        keysyms::DEAD_CARON => 0x030c,
        keysyms::DEAD_CEDILLA => 0x0327,
        keysyms::DEAD_OGONEK => 0x0328,
        keysyms::DEAD_BELOWDOT => 0x0323,
        keysyms::DEAD_HOOK => 0x0309,
        keysyms::DEAD_HORN => 0x031b,
        _ => 0,
    }
}

/// Spacing (standalone) character shown for a pending combining mark.
pub fn spacing_char_for_combining(combining: u32) -> u32 {
    match combining {
        0x0300 => 0x0060,
        0x0301 => 0x00b4,
        0x0302 => 0x005e,
        0x0303 => 0x007e,
        0x0304 => 0x00af,
        0x0307 => 0x02d9,
        0x0308 => 0x00a8,
        0x0309 => 0x0294,
        0x030a => 0x00b0,
        0x030b => 0x0022,
        0x030c => 0x02c7,
        0x031b => 0x031b,
        0x0323 => 0x02d4,
        0x0327 => 0x00b8,
        0x0328 => 0x02db,
        0x032e => 0x032e,
        _ => 0,
    }
}

/// Canonically compose `base` with a pending combining mark.
///
/// Falls back to the bare base character when composition yields
/// nothing new or the client font cannot render the result.
pub fn compose(base: char, combining: u32, font_has_char: impl Fn(char) -> bool) -> char {
    let mark = match char::from_u32(combining) {
        Some(mark) => mark,
        None => return base,
    };

    let composed = [base, mark].iter().copied().nfc().next().unwrap_or(base);

    if font_has_char(composed) {
        composed
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dead_key_tables_agree() {
        assert_eq!(combining_char_for_keyval(keysyms::DEAD_ACUTE), 0x0301);
        assert_eq!(spacing_char_for_combining(0x0301), 0x00b4);
        assert_eq!(spacing_char_for_combining(0x0300), 0x0060);
    }

    #[test]
    fn non_combining_dead_keys_map_to_zero() {
        assert_eq!(combining_char_for_keyval(keysyms::DEAD_IOTA), 0);
        assert_eq!(combining_char_for_keyval(keysyms::DEAD_VOICED_SOUND), 0);
        assert_eq!(combining_char_for_keyval(0x61), 0);
    }

    #[test]
    fn composes_acute_e() {
        assert_eq!(compose('e', 0x0301, |_| true), 'é');
        assert_eq!(compose('a', 0x0300, |_| true), 'à');
    }

    #[test]
    fn unrenderable_composition_falls_back_to_base() {
        assert_eq!(compose('e', 0x0301, |_| false), 'e');
    }

    #[test]
    fn uncomposable_pair_stays_base() {
        // q takes no acute in NFC, the base survives untouched
        assert_eq!(compose('q', 0x0301, |_| true), 'q');
    }
}
