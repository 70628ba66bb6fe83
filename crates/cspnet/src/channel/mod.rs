// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Networked channels.
//!
//! A channel input is addressed by a [`ChannelLocation`](crate::ChannelLocation);
//! any number of outputs, on any node, may write to it. Synchronous writes
//! complete only when the reader has taken the value:
//!
//! ```text
//! output                         input
//!   |-- SEND(input, output, data) -->|
//!   |<------------- ACK(output) -----|   read() / end_read()
//! ```
//!
//! Poison travels the same path as data and disables every endpoint whose
//! immunity it exceeds.

mod input;
mod output;
mod shared;

pub use input::NetChannelInput;
pub use output::NetChannelOutput;
pub use shared::{ExtendedRead, SharedChannelInput, SharedChannelOutput};
