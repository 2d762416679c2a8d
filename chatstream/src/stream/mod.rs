// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response pipeline
//
// transport bytes -> LineFramer -> classify -> decode -> ContentAccumulator
// -> MessageStore. TerminationPolicy decides when the logical message is
// finished; StreamProcessor owns the read loop and stops consuming input
// as soon as the message is finalized.

mod accumulator;
mod classifier;
mod framer;
mod payload;
mod processor;
mod termination;
mod types;

pub use accumulator::ContentAccumulator;
pub use classifier::classify;
pub use framer::LineFramer;
pub use payload::{decode, decode_knowledge, Decoded};
pub use processor::{StreamOutcome, StreamProcessor};
pub use termination::{Buffers, Decision, Signal, TerminationPolicy};
pub use types::{
    FinishReason, Frame, Payload, Step, DATA_PREFIX, DONE_SENTINEL, EVENT_PREFIX,
    MESSAGE_COMPLETED_EVENT,
};
