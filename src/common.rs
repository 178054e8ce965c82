//! Shared text predicates: sentence-start detection and the
//! autocorrect/punctuation rules.

/// Whether `c` ends a sentence, so following input should be
/// capitalized.
pub fn changes_case(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{a1}' | '\u{bf}')
}

/// Number of leading bytes of `text` that form a punctuation character
/// eligible for the autocorrect space swap, 0 when the text does not
/// start with one.
pub fn autocorrection_check_character(text: &str) -> usize {
    match text.chars().next() {
        Some(c @ ('.' | ',' | '?' | '!')) => c.len_utf8(),
        Some(c @ ('\u{a1}' | '\u{bf}')) => c.len_utf8(),
        _ => 0,
    }
}

/// Whether `c` attaches directly after a word, i.e. should not have a
/// space inserted before it.
pub fn should_be_appended_after_letter(text: &str) -> bool {
    matches!(
        text.chars().next(),
        Some('.' | ',' | '!' | '?' | ':' | ';')
    )
}

/// Unicode punctuation, covering the `P*` general categories for the
/// scripts the device ships: ASCII and Latin-1 punctuation, the general
/// punctuation block, CJK brackets and the fullwidth forms.
pub fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '\u{a1}' | '\u{a7}' | '\u{ab}' | '\u{b6}' | '\u{b7}' | '\u{bb}' | '\u{bf}'
        )
        || ('\u{2010}'..='\u{2027}').contains(&c)
        || ('\u{2030}'..='\u{205e}').contains(&c)
        || ('\u{3001}'..='\u{3003}').contains(&c)
        || ('\u{3008}'..='\u{3011}').contains(&c)
        || ('\u{3014}'..='\u{301f}').contains(&c)
        || ('\u{ff01}'..='\u{ff0f}').contains(&c)
        || ('\u{ff1a}'..='\u{ff1f}').contains(&c)
        || ('\u{ff3b}'..='\u{ff3f}').contains(&c)
        || ('\u{ff5b}'..='\u{ff65}').contains(&c)
}

/// Sentence-start check at a cursor position.
///
/// Scans backward from `offset` (a character offset into `content`):
/// capitalization applies at the very start of the text, or after a run
/// of whitespace preceded by sentence-ending punctuation.
pub fn check_auto_cap(content: &str, offset: usize) -> bool {
    let before: Vec<char> = content.chars().take(offset).collect();
    let mut i = before.len();

    if i == 0 {
        return true;
    }

    let mut seen_space = false;
    while i > 0 && before[i - 1].is_whitespace() {
        seen_space = true;
        i -= 1;
    }

    if i == 0 {
        return true;
    }

    seen_space && changes_case(before[i - 1])
}
