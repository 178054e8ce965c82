//! Sticky/lock modifier bookkeeping and keyval translation.
//!
//! The hardware keyboard has two virtual modifiers on top of the real
//! X state: Shift and the level key (Fn). Either can be tapped once to
//! apply to the next character (sticky), tapped twice to lock, and
//! tapped a third time to clear. The transition runs on key release.

use hildon_im_parser::{Command, EventType};

use crate::keysyms;

pub const LEVEL_KEY: u32 = keysyms::ISO_LEVEL3_SHIFT;
pub const COMPOSE_KEY: u32 = keysyms::MULTI_KEY;

pub const BASE_LEVEL: u8 = 0;
pub const NUMERIC_LEVEL: u8 = 2;
pub const LOCKABLE_LEVEL: u8 = 4;

bitflags::bitflags! {
    /// Sticky, lock and composition state of one context.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ModifierMask: u32 {
        const SHIFT_STICKY = 1 << 0;
        const SHIFT_LOCK   = 1 << 1;
        const LEVEL_STICKY = 1 << 2;
        const LEVEL_LOCK   = 1 << 3;
        const COMPOSE      = 1 << 4;
        const DEAD_KEY     = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Real modifier state carried on a hardware key event.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct KeyState: u32 {
        const SHIFT   = 1 << 0;
        const CONTROL = 1 << 2;
        /// The physical level modifier (Mod5).
        const LEVEL   = 1 << 7;
    }
}

/// One hardware key event as delivered by the toolkit.
///
/// The state machine works on a mutable copy: `keyval` and `state` may
/// be rewritten before the event is forwarded, the original is never
/// touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub ty: EventType,
    pub keyval: u32,
    pub state: KeyState,
    pub hardware_keycode: u16,
    pub group: u8,
    pub is_modifier: bool,
    pub time: u32,
}

impl KeyEvent {
    pub fn press(keyval: u32, state: KeyState, hardware_keycode: u16, time: u32) -> Self {
        KeyEvent {
            ty: EventType::Press,
            keyval,
            state,
            hardware_keycode,
            group: 0,
            is_modifier: false,
            time,
        }
    }

    pub fn release(keyval: u32, state: KeyState, hardware_keycode: u16, time: u32) -> Self {
        KeyEvent {
            ty: EventType::Release,
            ..Self::press(keyval, state, hardware_keycode, time)
        }
    }
}

/// Keyboard-layout lookups, the seam to the toolkit keymap.
pub trait Keymap {
    /// Keyval produced by `hardware_keycode` at an explicit shift
    /// level, `None` when the keycode has no entry at that level in
    /// the given group.
    fn keyval_for_level(&self, hardware_keycode: u16, group: u8, level: u8) -> Option<u32>;

    /// Keyval produced by `hardware_keycode` with the given modifier
    /// state applied.
    fn translate(&self, hardware_keycode: u16, state: KeyState, group: u8) -> Option<u32>;
}

/// Sticky/lock cycle, run on release of a Shift or level key.
///
/// `sticky_only_cycle` is set for numeric and telephone input modes,
/// where locking is disabled: a locked key degrades back to sticky and
/// no notifications are sent.
pub fn set_mask_state(
    mask: &mut ModifierMask,
    lock_mask: ModifierMask,
    sticky_mask: ModifierMask,
    was_press_and_release: bool,
    sticky_only_cycle: bool,
    notices: &mut Vec<Command>,
) {
    if sticky_only_cycle {
        if mask.contains(lock_mask) {
            mask.remove(lock_mask | sticky_mask);
            mask.insert(sticky_mask);
        } else if mask.contains(sticky_mask) {
            // already sticky, nothing to do
        } else if was_press_and_release {
            mask.insert(sticky_mask);
        }
        return;
    }

    if mask.contains(lock_mask) {
        // Pressing the key while already locked clears the state
        if lock_mask.contains(ModifierMask::SHIFT_LOCK) {
            notices.push(Command::ShiftUnlocked);
        } else if lock_mask.contains(ModifierMask::LEVEL_LOCK) {
            notices.push(Command::ModUnlocked);
        }

        mask.remove(lock_mask | sticky_mask);
    } else if mask.contains(sticky_mask) {
        // A second press while sticky locks the key
        mask.insert(lock_mask);

        if lock_mask.contains(ModifierMask::SHIFT_LOCK) {
            notices.push(Command::ShiftLocked);
        } else if lock_mask.contains(ModifierMask::LEVEL_LOCK) {
            notices.push(Command::ModLocked);
        }
    } else if was_press_and_release {
        // First tap stickies the key for one character, but only if no
        // characters were entered while holding it down
        mask.insert(sticky_mask);

        if sticky_mask.contains(ModifierMask::SHIFT_STICKY) {
            notices.push(Command::ShiftSticky);
        } else if sticky_mask.contains(ModifierMask::LEVEL_STICKY) {
            notices.push(Command::ModSticky);
        }
    }
}

/// Re-resolve the event's keyval as if the given modifiers were held.
pub fn perform_level_translation(event: &mut KeyEvent, state: KeyState, keymap: &impl Keymap) {
    if let Some(keyval) = keymap.translate(event.hardware_keycode, state, event.group) {
        event.keyval = keyval;
    }
}

/// Keyval at an explicit level, falling back to the event's own keyval
/// when the keycode has no entry there.
pub fn keyval_for_level(event: &KeyEvent, level: u8, keymap: &impl Keymap) -> u32 {
    keymap
        .keyval_for_level(event.hardware_keycode, event.group, level)
        .unwrap_or(event.keyval)
}

pub fn invert_case(event: &mut KeyEvent) {
    if keysyms::keyval_is_upper(event.keyval) {
        event.keyval = keysyms::keyval_to_lower(event.keyval);
    } else {
        event.keyval = keysyms::keyval_to_upper(event.keyval);
    }
}

/// Sticky-shift resolution. Keys without case variants are re-resolved
/// as if Shift were held; cased keys get their case inverted, which
/// also undoes autocapitalization.
pub fn perform_shift_translation(event: &mut KeyEvent, state: KeyState, keymap: &impl Keymap) {
    if !keysyms::keyval_has_case(event.keyval) {
        if let Some(keyval) = keymap.translate(event.hardware_keycode, state, event.group) {
            event.keyval = keyval;
        }
    } else {
        invert_case(event);
    }
}
