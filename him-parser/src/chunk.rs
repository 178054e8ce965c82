use crate::message::{MsgFlag, TEXT_BUFFER_SIZE};

/// Length of the next packet to cut from `s`, at most `max - 1` bytes so
/// the NUL terminator always fits inside the wire buffer.
///
/// The split is on raw byte length; a multi-byte UTF-8 character may
/// straddle two packets. The peer reassembles by concatenation, which
/// restores the original byte sequence as long as fragments arrive in
/// order.
pub fn next_packet_start(s: &[u8], max: usize) -> usize {
    let mut good = 0;
    let mut candidate = 0;

    while candidate < s.len() {
        candidate += 1;
        if candidate >= max {
            return good;
        }
        good = candidate;
    }

    // The whole string is small enough
    candidate
}

/// Splits text into wire-sized fragments, flagged `Start` then
/// `Continue`. Empty input still yields a single empty `Start` fragment.
///
/// No `End` fragment is produced here: for surrounding content the
/// sender follows up with a separate header/end message, while insert
/// and committed-preedit streams end implicitly at the NUL terminator.
pub struct TextChunks<'a> {
    rest: &'a [u8],
    flag: MsgFlag,
    done: bool,
}

impl<'a> TextChunks<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        Self {
            rest: text,
            flag: MsgFlag::Start,
            done: false,
        }
    }
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = (MsgFlag, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = next_packet_start(self.rest, TEXT_BUFFER_SIZE);
        let (chunk, rest) = self.rest.split_at(len);
        self.rest = rest;
        if rest.is_empty() {
            self.done = true;
        }

        let flag = self.flag;
        self.flag = MsgFlag::Continue;
        Some((flag, chunk))
    }
}

/// Accumulates fragments of one logical text message.
///
/// `Start` resets the buffer, `Continue` appends; delivery order is
/// trusted (X11 ClientMessages are FIFO per window). The buffer holds raw
/// bytes until the stream is complete so that characters split across
/// fragments survive reassembly.
#[derive(Default)]
pub struct FragmentBuffer {
    buf: Vec<u8>,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flag: MsgFlag, text: &[u8]) {
        if flag == MsgFlag::Start {
            self.buf.clear();
        }
        self.buf.extend_from_slice(text);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish the stream and decode it. Invalid UTF-8 (a peer truncating
    /// mid-character) is replaced rather than dropped.
    pub fn take(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}
