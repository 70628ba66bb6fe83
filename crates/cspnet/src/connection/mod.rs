// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply connections.
//!
//! A connection server accepts one client session at a time. Message flow
//! for a session:
//!
//! ```text
//!  client                               server
//!    | -- OPEN (request) ----------------> |   ServerClosed -> ServerReceived
//!    | <------------------- REQUEST_ACK -- |
//!    | <------------------------ REPLY --- |   ServerReceived -> ServerOpen
//!    | -- REPLY_ACK ---------------------> |
//!    | -- REQUEST -----------------------> |   ServerOpen -> ServerReceived
//!    | <------------------- REQUEST_ACK -- |
//!    | <-------------- REPLY_AND_CLOSE --- |   ServerReceived -> ServerClosed
//!    | -- REPLY_ACK ---------------------> |
//! ```
//!
//! Other clients' OPEN requests queue until the current session closes.

mod client;
mod server;

pub use client::NetConnectionClient;
pub use server::NetConnectionServer;
