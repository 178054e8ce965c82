//! A codec for the Hildon input-method ClientMessage wire protocol.
//!
//! This is the pure encode/decode layer: every IM↔context message fits a
//! single 20-byte X11 ClientMessage payload, and longer text is carried
//! as an ordered sequence of flagged fragments. See the [`hildon-im`]
//! crate for the stateful context built on top.
//!
//! [`hildon-im`]: https://crates.io/crates/hildon-im

#![forbid(unsafe_code, future_incompatible)]

mod atoms;
mod chunk;
mod message;

pub use chunk::{next_packet_start, FragmentBuffer, TextChunks};
pub use message::*;
