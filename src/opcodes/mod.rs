//! Opcode payload decoders and the dispatcher that selects among them by
//! `(layer, sub)` (§4.5).

pub mod ktb;
pub mod layer10;
pub mod layer11;
pub mod layer19;
pub mod layer24;
pub mod layer26;
pub mod layer5;

mod dispatcher;

pub use dispatcher::{Decoded, OpDispatcher};
