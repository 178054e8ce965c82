//! The input-method context: one instance per focused client widget.
//!
//! The context sits between the toolkit (key events, text widget,
//! timers) and the out-of-process IM server (wire messages). All
//! toolkit facilities are reached through the [`TextSink`],
//! [`Transport`], [`Scheduler`] and [`Keymap`] traits so the state
//! machine itself stays host-agnostic and every piece of mutable state
//! lives in the [`ImContext`] instance.

use hildon_im_parser::{
    Command, CommitMode, Communication, EventType, FragmentBuffer, InputMode, Message, MsgFlag,
    OptionMask, TextChunks, Trigger,
};
use log::warn;

use crate::common;
use crate::dead_keys;
use crate::keyboard::{
    self, KeyEvent, KeyState, Keymap, ModifierMask, BASE_LEVEL, COMPOSE_KEY, LEVEL_KEY,
    LOCKABLE_LEVEL,
};
use crate::keysyms;
use crate::AHashMap;

/// Delay before asking the IM server to show its window.
pub const DEFAULT_SHOW_DELAY_MS: u32 = 70;
/// Hold time after which a key press samples the alternate level.
pub const DEFAULT_LONG_PRESS_TIMEOUT_MS: u32 = 600;

/// Finger travel beyond which a press/release pair is a drag, not a tap.
const SHOW_CONTEXT_MAX_DISTANCE: f64 = 25.0;

/// Deferred work kinds. The scheduler keeps at most one outstanding
/// timer per kind; scheduling again supersedes the pending one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    ShowDelay,
    LongPress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipboardOp {
    Copy,
    Cut,
    Paste,
}

/// The client text widget, as far as the context needs it.
pub trait TextSink {
    /// Text around the cursor and the cursor's character offset in it.
    fn surrounding(&self) -> Option<(String, usize)>;
    /// Delete `before` characters left of the cursor and `after` to its
    /// right. Returns whether anything was deleted.
    fn delete_surrounding(&mut self, before: usize, after: usize) -> bool;
    /// Insert text at `char_offset` characters from the cursor without
    /// moving through the commit path. Returns whether the sink could.
    fn insert_text_at_cursor(&mut self, text: &str, char_offset: i32) -> bool;
    /// Move the cursor. A relative move of 0 collapses any selection.
    fn set_cursor_position(&mut self, offset: i32, relative: bool);
    fn selection_bounds(&self) -> Option<(usize, usize)>;
    fn font_has_char(&self, c: char) -> bool;
    fn preedit_changed(&mut self, preedit: &str);
    fn commit(&mut self, text: &str);
    fn clipboard(&mut self, op: ClipboardOp);
    /// Whether the sink edits its own buffer. Sinks without native
    /// editing (embedded browsers etc.) get synthesized key events
    /// instead of direct buffer operations.
    fn supports_native_editing(&self) -> bool;
}

/// Fire-and-forget message channel to the IM server window.
///
/// Implementations own the IM window id and the recovery policy: on a
/// `BadWindow` send error they re-resolve the id from the root window
/// property and retry exactly once, then log and drop.
pub trait Transport {
    fn send(&mut self, msg: &Message);
    /// Synthesize a hardware key press or release at the X level.
    fn fake_key(&mut self, keysym: u32, press: bool);
}

/// Single-slot timers on the host event loop.
pub trait Scheduler {
    /// Schedule `task` after `delay_ms`, superseding a pending timer of
    /// the same kind. The host calls back into
    /// [`ImContext::on_show_delay_timeout`] or
    /// [`ImContext::on_long_press_timeout`] when it fires.
    fn schedule(&mut self, task: TaskKind, delay_ms: u32);
    fn cancel(&mut self, task: TaskKind);
}

/// Everything the context needs from its host, in one bound.
pub trait ImEnvironment: TextSink + Transport + Scheduler + Keymap {}

impl<T: TextSink + Transport + Scheduler + Keymap + ?Sized> ImEnvironment for T {}

/// Per-context state. Created on client-window attach, reset on client
/// change, dropped on teardown.
pub struct ImContext {
    mask: ModifierMask,
    options: OptionMask,
    input_mode: InputMode,
    default_input_mode: InputMode,
    commit_mode: CommitMode,
    previous_commit_mode: CommitMode,
    trigger: Trigger,

    /// Pending dead-key combining mark, 0 when none.
    combining_char: u32,

    preedit: String,
    show_preedit: bool,
    /// Fragments of an InsertUtf8 stream received in preedit mode.
    incoming_preedit: Vec<u8>,
    /// Fragments of a SurroundingContent stream.
    surrounding_acc: FragmentBuffer,

    auto_upper_enabled: bool,
    auto_upper: bool,

    last_key_event: Option<(EventType, u32, u32)>,
    last_was_shift_backspace: bool,
    committed_preedit: bool,
    space_after_commit: bool,
    enter_on_focus_pending: bool,
    has_focus: bool,
    last_internal_change: bool,
    prev_cursor: (i32, i32),
    button_press_at: Option<(f64, f64)>,

    enable_long_press: bool,
    long_press_timeout_ms: u32,
    long_press_key_event: Option<KeyEvent>,
    show_delay_ms: u32,

    input_window: u32,
    app_window: u32,
    /// Per-toplevel override of the window the IM sets itself transient
    /// to, registered by embedded (plugged) clients.
    transient_overrides: AHashMap<u32, u32>,
}

impl ImContext {
    pub fn new(input_window: u32, app_window: u32) -> Self {
        ImContext {
            mask: ModifierMask::empty(),
            options: OptionMask::empty(),
            input_mode: InputMode::empty(),
            default_input_mode: InputMode::empty(),
            commit_mode: CommitMode::Redirect,
            previous_commit_mode: CommitMode::Redirect,
            trigger: Trigger::Unknown,
            combining_char: 0,
            preedit: String::new(),
            show_preedit: false,
            incoming_preedit: Vec::new(),
            surrounding_acc: FragmentBuffer::new(),
            auto_upper_enabled: false,
            auto_upper: false,
            last_key_event: None,
            last_was_shift_backspace: false,
            committed_preedit: false,
            space_after_commit: false,
            enter_on_focus_pending: false,
            has_focus: false,
            last_internal_change: false,
            prev_cursor: (-1, -1),
            button_press_at: None,
            enable_long_press: true,
            long_press_timeout_ms: DEFAULT_LONG_PRESS_TIMEOUT_MS,
            long_press_key_event: None,
            show_delay_ms: DEFAULT_SHOW_DELAY_MS,
            input_window,
            app_window,
            transient_overrides: AHashMap::default(),
        }
    }

    pub fn mask(&self) -> ModifierMask {
        self.mask
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    pub fn pending_combining_char(&self) -> u32 {
        self.combining_char
    }

    pub fn options(&self) -> OptionMask {
        self.options
    }

    /// Register an app-window override for an embedded toplevel.
    pub fn set_transient_override(&mut self, toplevel: u32, xid: u32) {
        self.transient_overrides.insert(toplevel, xid);
    }

    /// Attach to a new client window, or detach with `None`. Resets all
    /// per-widget state unconditionally, including mid-composition.
    pub fn set_client_window<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        window: Option<(u32, u32)>,
    ) {
        if self.input_window != 0 && window.is_none() {
            self.send_command(env, Command::Hide);
        }

        self.committed_preedit = false;
        self.last_key_event = None;
        self.mask = ModifierMask::empty();
        self.combining_char = 0;
        self.preedit.clear();
        self.show_preedit = false;
        self.commit_mode = CommitMode::Redirect;
        self.previous_commit_mode = CommitMode::Redirect;

        let (input_window, app_window) = window.unwrap_or((0, 0));
        self.input_window = input_window;
        self.app_window = app_window;
    }

    /// Update the client field's input-mode hints.
    pub fn set_input_mode<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        input_mode: InputMode,
        default_input_mode: InputMode,
    ) {
        self.input_mode = input_mode;
        self.default_input_mode = default_input_mode;
        self.auto_upper_enabled = self.options.contains(OptionMask::AUTOCASE)
            && input_mode.contains(InputMode::AUTOCAP);

        if self.has_focus {
            self.send_input_mode(env);
        }
    }

    pub fn focus_in<E: ImEnvironment>(&mut self, env: &mut E) {
        self.has_focus = true;

        self.send_command(env, Command::SetClient);
        self.send_command(env, Command::ShiftUnsticky);
        self.send_command(env, Command::ModUnsticky);

        if self.enter_on_focus_pending {
            env.fake_key(keysyms::KP_ENTER, true);
            env.fake_key(keysyms::KP_ENTER, false);
            self.enter_on_focus_pending = false;
        }
    }

    pub fn focus_out<E: ImEnvironment>(&mut self, env: &mut E) {
        self.has_focus = false;

        self.set_preedit_buffer(env, None);
        self.abort_long_press(env);
        self.long_press_key_event = None;
    }

    /// Ask the IM to show its window after the configured delay.
    pub fn show<E: ImEnvironment>(&mut self, env: &mut E) {
        self.trigger = Trigger::Unknown;
        env.schedule(TaskKind::ShowDelay, self.show_delay_ms);
    }

    pub fn hide<E: ImEnvironment>(&mut self, env: &mut E) {
        self.send_command(env, Command::Hide);
    }

    /// Ask the IM to reset its UI state. The preedit is left for the
    /// plugin to clear.
    pub fn reset<E: ImEnvironment>(&mut self, env: &mut E) {
        self.show_preedit = false;
        self.send_command(env, Command::Clear);
    }

    pub fn button_press<E: ImEnvironment>(&mut self, env: &mut E, x: f64, y: f64) {
        self.committed_preedit = false;
        self.button_press_at = Some((x, y));
        self.trigger = Trigger::Finger;

        // A finger press cancels a pending launch and later ones skip
        // the delay entirely
        env.cancel(TaskKind::ShowDelay);
        self.show_delay_ms = 0;
    }

    pub fn button_release<E: ImEnvironment>(&mut self, env: &mut E, x: f64, y: f64) {
        self.trigger = Trigger::Finger;

        let should_show = match self.button_press_at.take() {
            None => true,
            Some((px, py)) => {
                env.selection_bounds().is_none()
                    && (x - px).abs() < SHOW_CONTEXT_MAX_DISTANCE
                    && (y - py).abs() < SHOW_CONTEXT_MAX_DISTANCE
            }
        };

        if should_show && self.has_focus {
            env.schedule(TaskKind::ShowDelay, self.show_delay_ms);
        }
    }

    pub fn on_show_delay_timeout<E: ImEnvironment>(&mut self, env: &mut E) {
        // No autocap on an inactive window
        if self.has_focus {
            self.check_sentence_start(env);
        }
        self.send_command(env, Command::SetAndShow);
    }

    /// The toolkit reported a cursor move. Internal changes only
    /// re-check autocap; an external move also resets the IM state.
    pub fn cursor_location_changed<E: ImEnvironment>(&mut self, env: &mut E, x: i32, y: i32) {
        if !self.has_focus {
            return;
        }

        if self.last_internal_change {
            self.check_sentence_start(env);
            self.last_internal_change = false;
        } else if (x, y) != self.prev_cursor {
            self.check_sentence_start(env);
            self.reset(env);
            self.set_preedit_buffer(env, None);
        }

        self.prev_cursor = (x, y);
    }

    /// Toolkit key-event entry point. Returns whether the event was
    /// consumed.
    pub fn filter_keypress<E: ImEnvironment>(&mut self, env: &mut E, event: &KeyEvent) -> bool {
        if !self.has_focus {
            return false;
        }

        // The toolkit can deliver one event through both child and
        // parent handlers; type, timestamp and keyval all matching
        // means it was already filtered.
        let mut last_keyval = 0;
        if let Some((ty, time, keyval)) = self.last_key_event {
            if event.ty == ty && event.time == time && event.keyval == keyval {
                return false;
            }
            last_keyval = keyval;
        }
        self.last_key_event = Some((event.ty, event.time, event.keyval));

        let result = match event.ty {
            EventType::Press => self.key_pressed(env, *event),
            EventType::Release => self.key_released(env, *event, last_keyval),
        };

        if keysyms::keyval_to_unicode(event.keyval).map_or(false, char::is_whitespace) {
            self.check_sentence_start(env);
        }

        result
    }

    fn key_pressed<E: ImEnvironment>(&mut self, env: &mut E, mut event: KeyEvent) -> bool {
        // Shift held upper-cases the raw keyval; lower it so the shift
        // states below see a consistent base
        event.keyval = keysyms::keyval_to_lower(event.keyval);

        let shift_key_is_down = event.state.contains(KeyState::SHIFT);
        let shift_key_is_locked = self.mask.contains(ModifierMask::SHIFT_LOCK);
        let shift_key_is_sticky = self.mask.contains(ModifierMask::SHIFT_STICKY);

        let level_key_is_sticky = self.mask.contains(ModifierMask::LEVEL_STICKY);
        let level_key_is_locked = self.mask.contains(ModifierMask::LEVEL_LOCK);
        let level_key_is_down = event.state.contains(KeyState::LEVEL);

        // Key repeat while a long press is in course
        if self.enable_long_press {
            if let Some(cached) = self.long_press_key_event {
                if event.hardware_keycode != cached.hardware_keycode {
                    self.abort_long_press(env);
                } else {
                    return true;
                }
            }
        }

        if event.keyval == keysyms::DELETE && self.do_del(env) {
            return true;
        }

        let is_suggesting = !self.preedit.is_empty();

        if event.keyval == COMPOSE_KEY {
            self.mask.insert(ModifierMask::COMPOSE);
        } else if self.mask.contains(ModifierMask::COMPOSE) {
            // While the compose key is held the IM process interprets
            // the raw events itself
            self.send_key_event(env, event.ty, event.state, event.keyval, event.hardware_keycode);
            return false;
        }

        if event.state.contains(KeyState::CONTROL) {
            self.send_key_event(env, event.ty, event.state, event.keyval, event.hardware_keycode);
            return false;
        }

        // Word-completion suggestion navigation
        if is_suggesting {
            if event.keyval == keysyms::RIGHT {
                self.commit_preedit_data(env);
                return true;
            }
            self.set_preedit_buffer(env, None);
            self.committed_preedit = false;

            if event.keyval == keysyms::BACKSPACE || event.keyval == keysyms::LEFT {
                return true;
            }
        }

        // In numeric-style fields the level key works inverted: the
        // numeric level is implicit and holding the key goes back to
        // the base level
        let mut invert_level_behavior = self.default_input_mode == InputMode::NUMERIC
            || (!self.input_mode.contains(InputMode::ALPHA)
                && !self.input_mode.contains(InputMode::HEXA)
                && (self.input_mode.contains(InputMode::TELE)
                    || self.input_mode.contains(InputMode::SPECIAL)));
        if self.options.contains(OptionMask::AUTOLEVEL_NUMERIC)
            && self.input_mode & InputMode::FULL == InputMode::NUMERIC
        {
            invert_level_behavior = true;
        }

        if self.options.contains(OptionMask::LOCK_LEVEL) {
            event.keyval = keyboard::keyval_for_level(&event, LOCKABLE_LEVEL, env);
        }

        let mut translation_state = KeyState::empty();
        if shift_key_is_sticky || shift_key_is_locked || shift_key_is_down {
            translation_state |= KeyState::SHIFT;
        }

        if level_key_is_sticky || level_key_is_locked || level_key_is_down {
            translation_state |= KeyState::LEVEL;

            if !invert_level_behavior {
                keyboard::perform_level_translation(&mut event, translation_state, env);
            } else if level_key_is_down {
                // X already applied the level; translate back to the
                // level the inverted behavior wants
                let level = if self.options.contains(OptionMask::LOCK_LEVEL) {
                    LOCKABLE_LEVEL
                } else {
                    BASE_LEVEL
                };
                event.keyval = keyboard::keyval_for_level(&event, level, env);
            }

            if event.keyval == COMPOSE_KEY {
                self.mask.insert(ModifierMask::COMPOSE);
            }

            invert_level_behavior = false;
        }

        if invert_level_behavior {
            keyboard::perform_level_translation(
                &mut event,
                translation_state | KeyState::LEVEL,
                env,
            );
        }

        // Hardware keyboard autocapitalization
        if self.auto_upper {
            event.keyval = keysyms::keyval_to_upper(event.keyval);
            if event.keyval != keysyms::SHIFT_L && event.keyval != keysyms::SHIFT_R {
                self.auto_upper = false;
            }
        }

        // Shift lock or a held shift forces uppercase, ignoring autocap
        if shift_key_is_locked {
            event.keyval = keysyms::keyval_to_upper(event.keyval);
        }

        if shift_key_is_sticky && !shift_key_is_locked {
            keyboard::perform_shift_translation(&mut event, translation_state, env);
        } else if shift_key_is_down {
            keyboard::invert_case(&mut event);
        }

        // A dead key is not committed immediately but combined with the
        // next key
        if dead_keys::combining_char_for_keyval(event.keyval) != 0 {
            self.mask.insert(ModifierMask::DEAD_KEY);

            if self.combining_char == 0 {
                self.combining_char = dead_keys::combining_char_for_keyval(event.keyval);
                return true;
            }
        } else {
            self.mask.remove(ModifierMask::DEAD_KEY);
        }

        // A dead key pressed twice, or followed by space, inputs the
        // dead key's spacing representation
        let c = if (self.mask.contains(ModifierMask::DEAD_KEY) || event.keyval == keysyms::SPACE)
            && self.combining_char != 0
        {
            let repr = representation_for_dead_character(&event, self.combining_char);
            self.combining_char = 0;
            repr
        } else {
            keysyms::keyval_to_unicode(event.keyval)
        };

        if let Some(mut c) = c {
            self.reset_shift_and_level_keys_if_needed(env, &event);

            // Entering a new character cleans the preedit buffer
            self.set_preedit_buffer(env, None);

            if self.combining_char != 0 {
                c = dead_keys::compose(c, self.combining_char, |ch| env.font_has_char(ch));
                self.combining_char = 0;
            }

            self.send_key_event(
                env,
                event.ty,
                event.state,
                keysyms::unicode_to_keyval(c),
                event.hardware_keycode,
            );
            self.last_internal_change = true;

            let text = c.to_string();
            let mut inserted = false;
            if self.committed_preedit && common::should_be_appended_after_letter(&text) {
                inserted = env.insert_text_at_cursor(&text, -1);
            }
            if !inserted {
                env.commit(&text);
            }
            self.committed_preedit = false;

            if self.enable_long_press {
                env.schedule(TaskKind::LongPress, self.long_press_timeout_ms);
                self.long_press_key_event = Some(event);
            }

            true
        } else {
            if level_key_is_sticky || level_key_is_locked {
                event.state |= KeyState::LEVEL;
            }

            self.send_key_event(env, event.ty, event.state, event.keyval, event.hardware_keycode);

            // Non-printable keys invalidate any previous dead key
            if event.keyval != keysyms::SHIFT_L
                && event.keyval != keysyms::SHIFT_R
                && event.keyval != LEVEL_KEY
            {
                self.combining_char = 0;
                self.committed_preedit = false;
            }

            if event.keyval == keysyms::BACKSPACE {
                self.last_internal_change = true;
            }

            false
        }
    }

    fn key_released<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        mut event: KeyEvent,
        last_keyval: u32,
    ) -> bool {
        let level_key_is_sticky = self.mask.contains(ModifierMask::LEVEL_STICKY);
        let level_key_is_locked = self.mask.contains(ModifierMask::LEVEL_LOCK);
        let level_key_is_down = event.state.contains(KeyState::LEVEL);

        if let Some(cached) = self.long_press_key_event {
            if event.hardware_keycode == cached.hardware_keycode {
                self.abort_long_press(env);
                self.long_press_key_event = None;
            }
        }

        if event.keyval == COMPOSE_KEY {
            self.mask.remove(ModifierMask::COMPOSE);
        }

        if event.keyval == keysyms::SHIFT_L || event.keyval == keysyms::SHIFT_R {
            if !self.last_was_shift_backspace {
                self.cycle_mask(
                    env,
                    ModifierMask::SHIFT_LOCK,
                    ModifierMask::SHIFT_STICKY,
                    last_keyval == keysyms::SHIFT_L || last_keyval == keysyms::SHIFT_R,
                );
            } else {
                self.last_was_shift_backspace = false;
            }
        } else if event.keyval == LEVEL_KEY {
            self.cycle_mask(
                env,
                ModifierMask::LEVEL_LOCK,
                ModifierMask::LEVEL_STICKY,
                last_keyval == LEVEL_KEY,
            );
        }

        if level_key_is_sticky || level_key_is_locked || level_key_is_down {
            let mut state = KeyState::LEVEL;
            if self.mask.contains(ModifierMask::SHIFT_LOCK)
                || self.mask.contains(ModifierMask::SHIFT_STICKY)
            {
                state |= KeyState::SHIFT;
            }

            keyboard::perform_level_translation(&mut event, state, env);

            if event.keyval == COMPOSE_KEY {
                self.mask.remove(ModifierMask::COMPOSE);
            }
        }

        self.check_sentence_start(env);

        self.send_key_event(env, event.ty, event.state, event.keyval, event.hardware_keycode);

        self.reset_shift_and_level_keys_if_needed(env, &event);

        false
    }

    /// Sticky/lock transition on modifier release, forwarding the
    /// resulting notifications to the IM.
    fn cycle_mask<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        lock_mask: ModifierMask,
        sticky_mask: ModifierMask,
        was_press_and_release: bool,
    ) {
        // Locking is disabled in TELE and NUMERIC
        let sticky_only = !self.input_mode.contains(InputMode::ALPHA)
            && !self.input_mode.contains(InputMode::HEXA)
            && (self.input_mode.contains(InputMode::TELE)
                || self.input_mode.contains(InputMode::NUMERIC));

        let mut notices = Vec::new();
        keyboard::set_mask_state(
            &mut self.mask,
            lock_mask,
            sticky_mask,
            was_press_and_release,
            sticky_only,
            &mut notices,
        );
        for cmd in notices {
            self.send_command(env, cmd);
        }
    }

    fn reset_shift_and_level_keys_if_needed<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        event: &KeyEvent,
    ) {
        if event.is_modifier {
            return;
        }

        // If not locked, any character resets the sticky states
        if event.keyval != keysyms::SHIFT_L
            && event.keyval != keysyms::SHIFT_R
            && !self.mask.contains(ModifierMask::SHIFT_LOCK)
        {
            self.mask.remove(ModifierMask::SHIFT_STICKY);
            self.send_command(env, Command::ShiftUnsticky);
        }
        if event.keyval != LEVEL_KEY && !self.mask.contains(ModifierMask::LEVEL_LOCK) {
            self.mask.remove(ModifierMask::LEVEL_STICKY);
            self.send_command(env, Command::ModUnsticky);
        }
    }

    /// Shift+Backspace forward-delete for sinks without native editing.
    fn do_del<E: ImEnvironment>(&mut self, env: &mut E) -> bool {
        self.last_was_shift_backspace = true;

        if env.supports_native_editing() {
            // the toolkit handles 'del' itself
            return false;
        }

        if let Some((text, cpos)) = env.surrounding() {
            if text.chars().count() > cpos {
                env.fake_key(keysyms::SHIFT_L, false);
                env.fake_key(keysyms::RIGHT, true);
                env.fake_key(keysyms::RIGHT, false);
                env.fake_key(keysyms::BACKSPACE, true);
                env.fake_key(keysyms::SHIFT_L, true);
            }
        }

        true
    }

    fn do_backspace<E: ImEnvironment>(&mut self, env: &mut E) {
        if self.commit_mode == CommitMode::Redirect && env.supports_native_editing() {
            env.delete_surrounding(1, 0);
        } else {
            env.fake_key(keysyms::BACKSPACE, true);
            env.fake_key(keysyms::BACKSPACE, false);
        }
    }

    /// Update the IM with the autocap state at the cursor.
    pub fn check_sentence_start<E: ImEnvironment>(&mut self, env: &mut E) {
        self.auto_upper_enabled = self.options.contains(OptionMask::AUTOCASE)
            && self.input_mode.contains(InputMode::AUTOCAP);

        if !self.auto_upper_enabled {
            self.auto_upper = false;
            return;
        }

        let old_auto_upper = self.auto_upper;

        if self.mask.contains(ModifierMask::SHIFT_LOCK) {
            self.auto_upper = false;
        } else {
            let (text, cpos) = env.surrounding().unwrap_or_default();
            // With a selection, check at its start instead of the cursor
            let cpos = env
                .selection_bounds()
                .map(|(start, _)| start.min(cpos))
                .unwrap_or(cpos);
            self.auto_upper = common::check_auto_cap(&text, cpos);
        }

        if !old_auto_upper && self.auto_upper {
            self.send_command(env, Command::ShiftSticky);
        } else if old_auto_upper && !self.auto_upper {
            self.send_command(env, Command::ShiftUnsticky);
        }
    }

    /// Dispatch one decoded wire message. Returns whether it was one the
    /// context handles.
    pub fn handle_message<E: ImEnvironment>(&mut self, env: &mut E, msg: &Message) -> bool {
        match msg {
            Message::InsertUtf8 { flag, text } => {
                self.insert_utf8(env, *flag, text);
                true
            }
            Message::Com {
                communication,
                options,
                ..
            } => {
                self.handle_communication(env, *communication, *options);
                true
            }
            Message::SurroundingContent { flag, text } => {
                if *flag == MsgFlag::End {
                    self.commit_surrounding(env);
                } else {
                    self.surrounding_acc.push(*flag, text);
                }
                true
            }
            Message::Surrounding {
                offset_is_relative,
                cursor_offset,
                ..
            } => {
                env.set_cursor_position(*cursor_offset, *offset_is_relative);
                true
            }
            Message::LongPressSettings { enable, timeout_ms } => {
                self.enable_long_press = *enable;
                self.long_press_timeout_ms = if *timeout_ms > 0 {
                    *timeout_ms as u32
                } else {
                    DEFAULT_LONG_PRESS_TIMEOUT_MS
                };
                true
            }
            Message::ClipboardSelectionQuery => {
                self.send_clipboard_selection_reply(env);
                true
            }
            other => {
                warn!("unexpected message for the context: {:?}", other);
                false
            }
        }
    }

    fn handle_communication<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        communication: Communication,
        options: OptionMask,
    ) {
        // If autocap was revoked, clean up shift stickiness
        if !options.contains(OptionMask::AUTOCASE) && self.options.contains(OptionMask::AUTOCASE) {
            self.mask.remove(ModifierMask::SHIFT_STICKY);
            self.send_command(env, Command::ShiftUnsticky);
        }

        self.options = options;

        match communication {
            Communication::WidgetChanged => {
                self.mask = ModifierMask::empty();
                self.combining_char = 0;
            }
            Communication::EnterOnFocus => {
                self.enter_on_focus_pending = true;
            }
            Communication::ConfirmSentenceStart => {
                self.check_sentence_start(env);
            }
            Communication::HandleEnter => {
                env.fake_key(keysyms::RETURN, true);
                env.fake_key(keysyms::RETURN, false);
            }
            Communication::HandleTab => {
                env.fake_key(keysyms::TAB, true);
                env.fake_key(keysyms::TAB, false);
            }
            Communication::HandleBackspace => {
                self.do_backspace(env);
            }
            Communication::HandleSpace => {
                self.insert_utf8(env, MsgFlag::Continue, b" ");
            }
            Communication::BufferedMode => {
                self.set_preedit_buffer(env, None);
                self.commit_mode = CommitMode::Buffered;
            }
            Communication::DirectMode => {
                self.set_preedit_buffer(env, None);
                self.commit_mode = CommitMode::Direct;
            }
            Communication::RedirectMode => {
                self.set_preedit_buffer(env, None);
                self.commit_mode = CommitMode::Redirect;
                // collapse any selection
                env.set_cursor_position(0, true);
            }
            Communication::SurroundingMode => {
                self.set_preedit_buffer(env, None);
                self.commit_mode = CommitMode::Surrounding;
            }
            Communication::PreeditMode => {
                self.set_preedit_buffer(env, None);
                // Preedit is temporary, reset after the next text
                self.previous_commit_mode = self.commit_mode;
                self.commit_mode = CommitMode::Preedit;
            }
            Communication::RequestSurrounding => {
                self.send_surrounding(env, false);
            }
            Communication::RequestSurroundingFull => {
                self.send_surrounding(env, true);
            }
            Communication::FlushPreedit => {
                self.commit_preedit_data(env);
            }
            Communication::CancelPreedit => {
                self.set_preedit_buffer(env, None);
            }
            Communication::ClipboardCopy => {
                self.clipboard_copy_or_cut(env, ClipboardOp::Copy);
            }
            Communication::ClipboardCut => {
                self.clipboard_copy_or_cut(env, ClipboardOp::Cut);
            }
            Communication::ClipboardPaste => {
                env.clipboard(ClipboardOp::Paste);
            }
            Communication::ClipboardSelectionQuery => {
                self.send_clipboard_selection_reply(env);
            }
            Communication::OptionChanged => {}
            Communication::SpaceAfterCommit => {
                self.space_after_commit = true;
            }
            Communication::NoSpaceAfterCommit => {
                self.space_after_commit = false;
            }
            Communication::ShiftLocked => {
                self.mask.insert(ModifierMask::SHIFT_LOCK);
            }
            Communication::ShiftUnlocked => {
                self.mask
                    .remove(ModifierMask::SHIFT_LOCK | ModifierMask::SHIFT_STICKY);
            }
            Communication::ShiftUnsticky => {
                self.mask.remove(ModifierMask::SHIFT_STICKY);
            }
            Communication::LevelLocked => {
                self.mask.insert(ModifierMask::LEVEL_LOCK);
            }
            Communication::LevelUnlocked => {
                self.mask
                    .remove(ModifierMask::LEVEL_LOCK | ModifierMask::LEVEL_STICKY);
            }
            Communication::LevelUnsticky => {
                self.mask.remove(ModifierMask::LEVEL_STICKY);
            }
            Communication::ClearSticky => {
                self.mask
                    .remove(ModifierMask::SHIFT_STICKY | ModifierMask::LEVEL_STICKY);
            }
        }
    }

    fn clipboard_copy_or_cut<E: ImEnvironment>(&mut self, env: &mut E, op: ClipboardOp) {
        if env.selection_bounds().is_some() {
            env.clipboard(op);
            env.send(&Message::ClipboardCopied);
        }
    }

    fn send_clipboard_selection_reply<E: ImEnvironment>(&mut self, env: &mut E) {
        env.send(&Message::ClipboardSelectionReply {
            has_selection: env.selection_bounds().is_some(),
        });
    }

    /// Text pushed by the IM. In preedit mode fragments accumulate as
    /// the predicted suffix; otherwise each message commits directly,
    /// with the autocorrect punctuation swap applied when enabled.
    fn insert_utf8<E: ImEnvironment>(&mut self, env: &mut E, flag: MsgFlag, text: &[u8]) {
        if self.commit_mode == CommitMode::Preedit {
            match flag {
                MsgFlag::Start => {
                    self.incoming_preedit.clear();
                    self.incoming_preedit.extend_from_slice(text);
                }
                MsgFlag::Continue => {
                    self.incoming_preedit.extend_from_slice(text);
                }
                MsgFlag::End => {
                    self.incoming_preedit.extend_from_slice(text);
                    let suffix =
                        String::from_utf8_lossy(&std::mem::take(&mut self.incoming_preedit))
                            .into_owned();
                    self.set_preedit_buffer(env, Some(&suffix));
                    self.commit_mode = self.previous_commit_mode;
                    self.last_internal_change = true;
                }
            }
            return;
        }

        self.set_preedit_buffer(env, None);

        let mut text = String::from_utf8_lossy(text).into_owned();

        if self.options.contains(OptionMask::AUTOCORRECT) {
            if let Some((surrounding, cpos)) = env.surrounding() {
                let chars: Vec<char> = surrounding.chars().collect();
                let cursor_at_end = cpos == chars.len();
                let after_space = cpos > 0 && chars.get(cpos - 1) == Some(&' ');

                if cursor_at_end && after_space {
                    let to_copy = common::autocorrection_check_character(&text);
                    if to_copy > 0 {
                        // Swap "word .": punctuation attaches to the
                        // word, the space follows it
                        let tail = text.split_off(to_copy);
                        text.push(' ');
                        text.push_str(&tail);
                        env.delete_surrounding(1, 0);
                    }
                }
            }
        }

        self.last_internal_change = true;
        env.commit(&text);
    }

    fn set_preedit_buffer<E: ImEnvironment>(&mut self, env: &mut E, text: Option<&str>) {
        match text {
            Some(text) => {
                if !self.input_mode.contains(InputMode::DICTIONARY)
                    || self.input_mode.contains(InputMode::INVISIBLE)
                {
                    return;
                }

                if self.mask.contains(ModifierMask::SHIFT_LOCK) {
                    self.preedit.push_str(&text.to_uppercase());
                } else {
                    self.preedit.push_str(text);
                }

                self.show_preedit = true;
                let preedit = self.preedit.clone();
                env.preedit_changed(&preedit);
            }
            None => {
                self.show_preedit = false;
                if !self.preedit.is_empty() {
                    self.preedit.clear();
                    env.preedit_changed("");
                }
            }
        }
    }

    /// Commit the suggested preedit into the widget and report the
    /// commit to the IM.
    fn commit_preedit_data<E: ImEnvironment>(&mut self, env: &mut E) {
        if self.preedit.is_empty() {
            return;
        }

        let prefix = self.preedit.clone();

        if self.space_after_commit {
            let next_char = env.surrounding().and_then(|(t, c)| t.chars().nth(c));
            let append = next_char
                .map_or(true, |ch| !(ch.is_whitespace() || common::is_punctuation(ch)));
            if append {
                self.preedit.push(' ');
                self.committed_preedit = true;
            }
        }

        env.commit(&self.preedit);
        self.send_committed_preedit(env, &prefix);

        self.set_preedit_buffer(env, None);
    }

    /// Replace the text around the cursor with the reassembled
    /// surrounding content.
    fn commit_surrounding<E: ImEnvironment>(&mut self, env: &mut E) {
        let content = self.surrounding_acc.take();

        if let Some((text, cpos)) = env.surrounding() {
            let total = text.chars().count();
            if total > 0 {
                env.delete_surrounding(cpos, total - cpos);
            }
        }

        env.commit(&content);
    }

    /// Extract the two words before and the word after the cursor.
    fn short_surrounding<E: ImEnvironment>(&self, env: &E) -> Option<(String, usize)> {
        let (text, offset) = env.surrounding()?;
        let chars: Vec<char> = text.chars().collect();
        let offset = offset.min(chars.len());

        let mut start = offset;
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && chars[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }

        let mut end = offset;
        while end < chars.len() && !chars[end].is_whitespace() {
            end += 1;
        }

        Some((chars[start..end].iter().collect(), offset - start))
    }

    /// Send the text around the cursor to the IM: content fragments
    /// first, then the header carrying the cursor offset.
    pub fn send_surrounding<E: ImEnvironment>(&mut self, env: &mut E, full_line: bool) {
        let surrounding = if full_line {
            env.surrounding()
        } else {
            self.short_surrounding(env)
        };

        let (text, offset) = match surrounding {
            Some(pair) => pair,
            None => {
                self.send_surrounding_header(env, 0);
                return;
            }
        };

        for (flag, chunk) in TextChunks::new(text.as_bytes()) {
            env.send(&Message::SurroundingContent {
                flag,
                text: chunk.to_vec(),
            });
        }

        self.send_surrounding_header(env, offset as i32);
    }

    fn send_surrounding_header<E: ImEnvironment>(&mut self, env: &mut E, offset: i32) {
        env.send(&Message::Surrounding {
            commit_mode: self.commit_mode,
            offset_is_relative: false,
            cursor_offset: offset,
        });
    }

    fn send_committed_preedit<E: ImEnvironment>(&mut self, env: &mut E, text: &str) {
        for (flag, chunk) in TextChunks::new(text.as_bytes()) {
            env.send(&Message::PreeditCommittedContent {
                flag,
                text: chunk.to_vec(),
            });
        }

        env.send(&Message::PreeditCommitted {
            flag: MsgFlag::Start,
            commit_mode: self.commit_mode,
        });
    }

    fn send_key_event<E: ImEnvironment>(
        &mut self,
        env: &mut E,
        ty: EventType,
        state: KeyState,
        keyval: u32,
        hardware_keycode: u16,
    ) {
        env.send(&Message::KeyEvent {
            input_window: self.input_window,
            ty,
            state: state.bits(),
            keyval,
            hardware_keycode,
        });
    }

    pub fn send_command<E: ImEnvironment>(&mut self, env: &mut E, command: Command) {
        if command == Command::SetClient || command == Command::SetAndShow {
            self.send_input_mode(env);
        }

        let (input_window, app_window) = if command == Command::Hide {
            (0, 0)
        } else {
            let app = self
                .transient_overrides
                .get(&self.app_window)
                .copied()
                .unwrap_or(self.app_window);
            (self.input_window, app)
        };

        env.send(&Message::Activate {
            input_window,
            app_window,
            command,
            trigger: self.trigger,
        });
    }

    fn send_input_mode<E: ImEnvironment>(&mut self, env: &mut E) {
        env.send(&Message::InputMode {
            input_mode: self.input_mode,
            default_input_mode: self.default_input_mode,
        });
    }

    /// Long-press fired while a character key is held: sample the
    /// alternate level and replace the originally committed character.
    pub fn on_long_press_timeout<E: ImEnvironment>(&mut self, env: &mut E) {
        let mut event = match self.long_press_key_event {
            Some(event) => event,
            None => return,
        };

        let mask_backup = self.mask;

        if self.mask.contains(ModifierMask::LEVEL_LOCK) {
            self.mask
                .remove(ModifierMask::LEVEL_LOCK | ModifierMask::LEVEL_STICKY);
            keyboard::perform_level_translation(&mut event, KeyState::SHIFT, env);
        } else {
            self.mask.insert(ModifierMask::LEVEL_STICKY);
        }

        let cursor_before = env.surrounding().map_or(0, |(_, c)| c);

        self.enable_long_press = false;
        self.key_pressed(env, event);
        self.enable_long_press = true;

        let cursor_after = env.surrounding().map_or(0, |(_, c)| c);

        if cursor_after > cursor_before || !env.supports_native_editing() {
            self.delete_penultimate_char(env);
        }

        self.mask = mask_backup;
    }

    fn delete_penultimate_char<E: ImEnvironment>(&mut self, env: &mut E) {
        if env.supports_native_editing() {
            env.set_cursor_position(-1, true);
            env.delete_surrounding(1, 0);
            env.set_cursor_position(1, true);
        } else {
            env.fake_key(keysyms::LEFT, true);
            env.fake_key(keysyms::LEFT, false);
            env.fake_key(keysyms::BACKSPACE, true);
            env.fake_key(keysyms::BACKSPACE, false);
            env.fake_key(keysyms::RIGHT, true);
            env.fake_key(keysyms::RIGHT, false);
        }
    }

    fn abort_long_press<E: ImEnvironment>(&mut self, env: &mut E) {
        env.cancel(TaskKind::LongPress);
    }
}

/// Representation committed when a dead key is repeated or followed by
/// space: the mark's spacing form, or the plain character otherwise.
fn representation_for_dead_character(event: &KeyEvent, dead_character: u32) -> Option<char> {
    let last = dead_keys::combining_char_for_keyval(event.keyval);

    let c = if last == dead_character || event.keyval == keysyms::SPACE {
        dead_keys::spacing_char_for_combining(dead_character)
    } else {
        return keysyms::keyval_to_unicode(event.keyval);
    };

    char::from_u32(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY_A: u16 = 10;
    const KEY_E: u16 = 11;
    const KEY_SHIFT: u16 = 50;
    const KEY_ACUTE: u16 = 40;
    const KEY_GRAVE: u16 = 41;
    const KEY_SPACE: u16 = 60;

    #[derive(Default)]
    struct FakeEnv {
        sent: Vec<Message>,
        committed: Vec<String>,
        preedits: Vec<String>,
        fake_keys: Vec<(u32, bool)>,
        scheduled: Vec<(TaskKind, u32)>,
        cancelled: Vec<TaskKind>,
        deletes: Vec<(usize, usize)>,
        inserted: Vec<(String, i32)>,
        cursor_moves: Vec<(i32, bool)>,
        clipboard_ops: Vec<ClipboardOp>,
        surrounding: Option<(String, usize)>,
        selection: Option<(usize, usize)>,
        font_missing_chars: bool,
        no_native_editing: bool,
    }

    impl TextSink for FakeEnv {
        fn surrounding(&self) -> Option<(String, usize)> {
            self.surrounding.clone()
        }

        fn delete_surrounding(&mut self, before: usize, after: usize) -> bool {
            self.deletes.push((before, after));
            true
        }

        fn insert_text_at_cursor(&mut self, text: &str, char_offset: i32) -> bool {
            self.inserted.push((text.to_owned(), char_offset));
            true
        }

        fn set_cursor_position(&mut self, offset: i32, relative: bool) {
            self.cursor_moves.push((offset, relative));
        }

        fn selection_bounds(&self) -> Option<(usize, usize)> {
            self.selection
        }

        fn font_has_char(&self, _c: char) -> bool {
            !self.font_missing_chars
        }

        fn preedit_changed(&mut self, preedit: &str) {
            self.preedits.push(preedit.to_owned());
        }

        fn commit(&mut self, text: &str) {
            self.committed.push(text.to_owned());
        }

        fn clipboard(&mut self, op: ClipboardOp) {
            self.clipboard_ops.push(op);
        }

        fn supports_native_editing(&self) -> bool {
            !self.no_native_editing
        }
    }

    impl Transport for FakeEnv {
        fn send(&mut self, msg: &Message) {
            self.sent.push(msg.clone());
        }

        fn fake_key(&mut self, keysym: u32, press: bool) {
            self.fake_keys.push((keysym, press));
        }
    }

    impl Scheduler for FakeEnv {
        fn schedule(&mut self, task: TaskKind, delay_ms: u32) {
            self.scheduled.push((task, delay_ms));
        }

        fn cancel(&mut self, task: TaskKind) {
            self.cancelled.push(task);
        }
    }

    // A two-key layout: 'a' with '1' on the level and '@' on the
    // lockable level, and a plain 'e'.
    impl Keymap for FakeEnv {
        fn keyval_for_level(&self, hardware_keycode: u16, _group: u8, level: u8) -> Option<u32> {
            match (hardware_keycode, level) {
                (KEY_A, BASE_LEVEL) => Some(u32::from(b'a')),
                (KEY_A, 2) => Some(u32::from(b'1')),
                (KEY_A, LOCKABLE_LEVEL) => Some(u32::from(b'@')),
                (KEY_E, BASE_LEVEL) => Some(u32::from(b'e')),
                _ => None,
            }
        }

        fn translate(&self, hardware_keycode: u16, state: KeyState, _group: u8) -> Option<u32> {
            match hardware_keycode {
                KEY_A if state.contains(KeyState::LEVEL) => Some(u32::from(b'1')),
                KEY_A if state.contains(KeyState::SHIFT) => Some(u32::from(b'A')),
                KEY_A => Some(u32::from(b'a')),
                KEY_E if state.contains(KeyState::SHIFT) => Some(u32::from(b'E')),
                KEY_E => Some(u32::from(b'e')),
                _ => None,
            }
        }
    }

    fn focused() -> (ImContext, FakeEnv) {
        let mut env = FakeEnv::default();
        let mut ctx = ImContext::new(0x1000, 0x2000);
        ctx.focus_in(&mut env);
        env.sent.clear();
        (ctx, env)
    }

    fn commands_sent(env: &FakeEnv) -> Vec<Command> {
        env.sent
            .iter()
            .filter_map(|msg| match msg {
                Message::Activate { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    fn shift_tap(ctx: &mut ImContext, env: &mut FakeEnv, time: u32) {
        let mut press = KeyEvent::press(keysyms::SHIFT_L, KeyState::empty(), KEY_SHIFT, time);
        press.is_modifier = true;
        ctx.filter_keypress(env, &press);
        let mut release =
            KeyEvent::release(keysyms::SHIFT_L, KeyState::SHIFT, KEY_SHIFT, time + 1);
        release.is_modifier = true;
        ctx.filter_keypress(env, &release);
    }

    #[test]
    fn shift_taps_cycle_sticky_lock_clear() {
        let (mut ctx, mut env) = focused();

        shift_tap(&mut ctx, &mut env, 10);
        assert_eq!(ctx.mask(), ModifierMask::SHIFT_STICKY);
        assert!(commands_sent(&env).contains(&Command::ShiftSticky));

        env.sent.clear();
        shift_tap(&mut ctx, &mut env, 20);
        assert!(ctx.mask().contains(ModifierMask::SHIFT_LOCK));
        assert!(commands_sent(&env).contains(&Command::ShiftLocked));

        env.sent.clear();
        shift_tap(&mut ctx, &mut env, 30);
        assert_eq!(ctx.mask(), ModifierMask::empty());
        assert!(commands_sent(&env).contains(&Command::ShiftUnlocked));
    }

    #[test]
    fn sticky_shift_applies_to_one_character() {
        let (mut ctx, mut env) = focused();

        shift_tap(&mut ctx, &mut env, 10);

        let press = KeyEvent::press(u32::from(b'a'), KeyState::empty(), KEY_A, 20);
        assert!(ctx.filter_keypress(&mut env, &press));

        assert_eq!(env.committed, vec!["A"]);
        assert!(!ctx.mask().contains(ModifierMask::SHIFT_STICKY));
    }

    #[test]
    fn held_shift_inverts_case_without_sticking() {
        let (mut ctx, mut env) = focused();

        let press = KeyEvent::press(u32::from(b'A'), KeyState::SHIFT, KEY_A, 10);
        assert!(ctx.filter_keypress(&mut env, &press));

        assert_eq!(env.committed, vec!["A"]);
        assert_eq!(ctx.mask(), ModifierMask::empty());
    }

    #[test]
    fn dead_key_twice_commits_spacing_form() {
        let (mut ctx, mut env) = focused();

        let first = KeyEvent::press(keysyms::DEAD_ACUTE, KeyState::empty(), KEY_ACUTE, 10);
        assert!(ctx.filter_keypress(&mut env, &first));
        assert_eq!(env.committed, Vec::<String>::new());
        assert_eq!(ctx.pending_combining_char(), 0x0301);

        let second = KeyEvent::press(keysyms::DEAD_ACUTE, KeyState::empty(), KEY_ACUTE, 20);
        assert!(ctx.filter_keypress(&mut env, &second));
        assert_eq!(env.committed, vec!["\u{b4}"]);
        assert_eq!(ctx.pending_combining_char(), 0);
    }

    #[test]
    fn dead_key_then_space_commits_spacing_form() {
        let (mut ctx, mut env) = focused();

        let grave = KeyEvent::press(keysyms::DEAD_GRAVE, KeyState::empty(), KEY_GRAVE, 10);
        ctx.filter_keypress(&mut env, &grave);

        let space = KeyEvent::press(keysyms::SPACE, KeyState::empty(), KEY_SPACE, 20);
        assert!(ctx.filter_keypress(&mut env, &space));

        assert_eq!(env.committed, vec!["`"]);
    }

    #[test]
    fn dead_key_composes_with_next_character() {
        let (mut ctx, mut env) = focused();

        let acute = KeyEvent::press(keysyms::DEAD_ACUTE, KeyState::empty(), KEY_ACUTE, 10);
        ctx.filter_keypress(&mut env, &acute);

        let e = KeyEvent::press(u32::from(b'e'), KeyState::empty(), KEY_E, 20);
        assert!(ctx.filter_keypress(&mut env, &e));

        assert_eq!(env.committed, vec!["\u{e9}"]);
    }

    #[test]
    fn unrenderable_composition_falls_back_to_base() {
        let (mut ctx, mut env) = focused();
        env.font_missing_chars = true;

        let acute = KeyEvent::press(keysyms::DEAD_ACUTE, KeyState::empty(), KEY_ACUTE, 10);
        ctx.filter_keypress(&mut env, &acute);

        let e = KeyEvent::press(u32::from(b'e'), KeyState::empty(), KEY_E, 20);
        ctx.filter_keypress(&mut env, &e);

        assert_eq!(env.committed, vec!["e"]);
    }

    #[test]
    fn duplicate_event_is_filtered_once() {
        let (mut ctx, mut env) = focused();

        let press = KeyEvent::press(u32::from(b'a'), KeyState::empty(), KEY_A, 7);
        assert!(ctx.filter_keypress(&mut env, &press));
        assert!(!ctx.filter_keypress(&mut env, &press));

        assert_eq!(env.committed, vec!["a"]);
    }

    #[test]
    fn autolevel_numeric_field_translates_to_level() {
        let (mut ctx, mut env) = focused();
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::OptionChanged,
                options: OptionMask::AUTOLEVEL_NUMERIC,
            },
        );
        ctx.set_input_mode(&mut env, InputMode::NUMERIC, InputMode::empty());

        let press = KeyEvent::press(u32::from(b'a'), KeyState::empty(), KEY_A, 10);
        assert!(ctx.filter_keypress(&mut env, &press));

        assert_eq!(env.committed, vec!["1"]);
    }

    #[test]
    fn widget_changed_clears_modifiers_and_pending_dead_key() {
        let (mut ctx, mut env) = focused();

        shift_tap(&mut ctx, &mut env, 10);
        let acute = KeyEvent::press(keysyms::DEAD_ACUTE, KeyState::empty(), KEY_ACUTE, 20);
        ctx.filter_keypress(&mut env, &acute);
        assert_ne!(ctx.mask(), ModifierMask::empty());
        assert_ne!(ctx.pending_combining_char(), 0);

        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::WidgetChanged,
                options: OptionMask::empty(),
            },
        );

        assert_eq!(ctx.mask(), ModifierMask::empty());
        assert_eq!(ctx.pending_combining_char(), 0);
    }

    #[test]
    fn autocorrect_swaps_punctuation_with_preceding_space() {
        let (mut ctx, mut env) = focused();
        env.surrounding = Some(("word ".to_owned(), 5));
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::OptionChanged,
                options: OptionMask::AUTOCORRECT,
            },
        );

        ctx.handle_message(
            &mut env,
            &Message::InsertUtf8 {
                flag: MsgFlag::Start,
                text: b".".to_vec(),
            },
        );

        assert_eq!(env.deletes, vec![(1, 0)]);
        assert_eq!(env.committed, vec![". "]);
    }

    #[test]
    fn preedit_fragments_accumulate_and_restore_commit_mode() {
        let (mut ctx, mut env) = focused();
        ctx.set_input_mode(&mut env, InputMode::DICTIONARY, InputMode::empty());
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::PreeditMode,
                options: OptionMask::empty(),
            },
        );
        assert_eq!(ctx.commit_mode(), CommitMode::Preedit);

        for (flag, text) in [
            (MsgFlag::Start, &b"hel"[..]),
            (MsgFlag::Continue, b"lo"),
            (MsgFlag::End, b"!"),
        ] {
            ctx.handle_message(
                &mut env,
                &Message::InsertUtf8 {
                    flag,
                    text: text.to_vec(),
                },
            );
        }

        assert_eq!(env.preedits.last().map(String::as_str), Some("hello!"));
        assert_eq!(ctx.commit_mode(), CommitMode::Redirect);
        assert_eq!(env.committed, Vec::<String>::new());
    }

    #[test]
    fn surrounding_is_sent_in_bounded_fragments() {
        let (mut ctx, mut env) = focused();
        let text = "the quick brown fox jumps over the lazy dog";
        env.surrounding = Some((text.to_owned(), 5));

        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::RequestSurroundingFull,
                options: OptionMask::empty(),
            },
        );

        let mut reassembled = Vec::new();
        let mut flags = Vec::new();
        let mut header = None;
        for msg in &env.sent {
            match msg {
                Message::SurroundingContent { flag, text } => {
                    assert!(text.len() < 16);
                    flags.push(*flag);
                    reassembled.extend_from_slice(text);
                }
                Message::Surrounding { cursor_offset, .. } => header = Some(*cursor_offset),
                _ => {}
            }
        }

        assert_eq!(reassembled, text.as_bytes());
        assert_eq!(flags[0], MsgFlag::Start);
        assert!(flags[1..].iter().all(|f| *f == MsgFlag::Continue));
        assert_eq!(header, Some(5));
    }

    #[test]
    fn surrounding_content_replaces_text_and_drops_end_payload() {
        let (mut ctx, mut env) = focused();
        env.surrounding = Some(("oldline".to_owned(), 3));

        for (flag, text) in [
            (MsgFlag::Start, &b"foo"[..]),
            (MsgFlag::Continue, b"bar"),
            (MsgFlag::End, b"XXX"),
        ] {
            ctx.handle_message(
                &mut env,
                &Message::SurroundingContent {
                    flag,
                    text: text.to_vec(),
                },
            );
        }

        assert_eq!(env.deletes, vec![(3, 4)]);
        assert_eq!(env.committed, vec!["foobar"]);
    }

    #[test]
    fn long_press_substitutes_level_character() {
        let (mut ctx, mut env) = focused();
        env.no_native_editing = true;

        let press = KeyEvent::press(u32::from(b'a'), KeyState::empty(), KEY_A, 10);
        ctx.filter_keypress(&mut env, &press);
        assert_eq!(env.committed, vec!["a"]);
        assert!(env
            .scheduled
            .contains(&(TaskKind::LongPress, DEFAULT_LONG_PRESS_TIMEOUT_MS)));

        ctx.on_long_press_timeout(&mut env);

        assert_eq!(env.committed, vec!["a", "1"]);
        assert!(env.fake_keys.contains(&(keysyms::BACKSPACE, true)));
        assert_eq!(ctx.mask(), ModifierMask::empty());
    }

    #[test]
    fn key_release_aborts_pending_long_press() {
        let (mut ctx, mut env) = focused();

        let press = KeyEvent::press(u32::from(b'a'), KeyState::empty(), KEY_A, 10);
        ctx.filter_keypress(&mut env, &press);

        let release = KeyEvent::release(u32::from(b'a'), KeyState::empty(), KEY_A, 20);
        ctx.filter_keypress(&mut env, &release);

        assert!(env.cancelled.contains(&TaskKind::LongPress));

        // once aborted the timeout does nothing
        let committed = env.committed.len();
        ctx.on_long_press_timeout(&mut env);
        assert_eq!(env.committed.len(), committed);
    }

    #[test]
    fn handle_space_commits_a_space() {
        let (mut ctx, mut env) = focused();

        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::HandleSpace,
                options: OptionMask::empty(),
            },
        );

        assert_eq!(env.committed, vec![" "]);
    }

    #[test]
    fn clipboard_selection_query_reports_selection() {
        let (mut ctx, mut env) = focused();
        env.selection = Some((1, 3));

        ctx.handle_message(&mut env, &Message::ClipboardSelectionQuery);

        assert!(env
            .sent
            .contains(&Message::ClipboardSelectionReply { has_selection: true }));
    }

    #[test]
    fn clipboard_copy_requires_a_selection() {
        let (mut ctx, mut env) = focused();

        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::ClipboardCopy,
                options: OptionMask::empty(),
            },
        );
        assert_eq!(env.clipboard_ops, Vec::<ClipboardOp>::new());

        env.selection = Some((0, 2));
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::ClipboardCopy,
                options: OptionMask::empty(),
            },
        );
        assert_eq!(env.clipboard_ops, vec![ClipboardOp::Copy]);
        assert!(env.sent.contains(&Message::ClipboardCopied));
    }

    #[test]
    fn autocase_revocation_releases_sticky_shift() {
        let (mut ctx, mut env) = focused();
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::OptionChanged,
                options: OptionMask::AUTOCASE,
            },
        );
        shift_tap(&mut ctx, &mut env, 10);
        assert!(ctx.mask().contains(ModifierMask::SHIFT_STICKY));

        env.sent.clear();
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::OptionChanged,
                options: OptionMask::empty(),
            },
        );

        assert!(!ctx.mask().contains(ModifierMask::SHIFT_STICKY));
        assert!(commands_sent(&env).contains(&Command::ShiftUnsticky));
    }

    #[test]
    fn focus_out_clears_preedit_and_long_press() {
        let (mut ctx, mut env) = focused();
        ctx.set_input_mode(&mut env, InputMode::DICTIONARY, InputMode::empty());
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::PreeditMode,
                options: OptionMask::empty(),
            },
        );
        for (flag, text) in [(MsgFlag::Start, &b"sug"[..]), (MsgFlag::End, b"gest")] {
            ctx.handle_message(
                &mut env,
                &Message::InsertUtf8 {
                    flag,
                    text: text.to_vec(),
                },
            );
        }

        ctx.focus_out(&mut env);

        assert_eq!(env.preedits.last().map(String::as_str), Some(""));
        assert!(env.cancelled.contains(&TaskKind::LongPress));
    }

    #[test]
    fn flush_preedit_commits_and_reports() {
        let (mut ctx, mut env) = focused();
        ctx.set_input_mode(&mut env, InputMode::DICTIONARY, InputMode::empty());
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::SpaceAfterCommit,
                options: OptionMask::empty(),
            },
        );
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::PreeditMode,
                options: OptionMask::empty(),
            },
        );
        for (flag, text) in [(MsgFlag::Start, &b"wor"[..]), (MsgFlag::End, b"d")] {
            ctx.handle_message(
                &mut env,
                &Message::InsertUtf8 {
                    flag,
                    text: text.to_vec(),
                },
            );
        }

        env.sent.clear();
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::FlushPreedit,
                options: OptionMask::empty(),
            },
        );

        // no text after the cursor, so the commit gains a space while
        // the report carries the bare word
        assert_eq!(env.committed, vec!["word "]);
        assert!(env.sent.iter().any(|msg| matches!(
            msg,
            Message::PreeditCommittedContent { text, .. } if text == b"word"
        )));
        assert!(env
            .sent
            .iter()
            .any(|msg| matches!(msg, Message::PreeditCommitted { .. })));
    }

    #[test]
    fn flush_preedit_adds_no_space_before_wide_punctuation() {
        let (mut ctx, mut env) = focused();
        ctx.set_input_mode(&mut env, InputMode::DICTIONARY, InputMode::empty());
        env.surrounding = Some(("»".to_owned(), 0));
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::SpaceAfterCommit,
                options: OptionMask::empty(),
            },
        );
        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::PreeditMode,
                options: OptionMask::empty(),
            },
        );
        for (flag, text) in [(MsgFlag::Start, &b"wor"[..]), (MsgFlag::End, b"d")] {
            ctx.handle_message(
                &mut env,
                &Message::InsertUtf8 {
                    flag,
                    text: text.to_vec(),
                },
            );
        }

        ctx.handle_message(
            &mut env,
            &Message::Com {
                input_window: 0,
                communication: Communication::FlushPreedit,
                options: OptionMask::empty(),
            },
        );

        assert_eq!(env.committed, vec!["word"]);
    }

    #[test]
    fn focus_in_announces_client_and_input_mode() {
        let mut env = FakeEnv::default();
        let mut ctx = ImContext::new(0x1000, 0x2000);

        ctx.focus_in(&mut env);

        assert!(env
            .sent
            .iter()
            .any(|msg| matches!(msg, Message::InputMode { .. })));
        let commands = commands_sent(&env);
        assert_eq!(
            commands,
            vec![Command::SetClient, Command::ShiftUnsticky, Command::ModUnsticky]
        );
    }

    #[test]
    fn hide_zeroes_window_fields() {
        let (mut ctx, mut env) = focused();

        ctx.hide(&mut env);

        assert!(env.sent.iter().any(|msg| matches!(
            msg,
            Message::Activate {
                input_window: 0,
                app_window: 0,
                command: Command::Hide,
                ..
            }
        )));
    }
}
