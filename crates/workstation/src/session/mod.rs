// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry & lifecycle, and the session-actor variants. Each
//! session is a single-consumer mailbox ("session actor"); external code
//! (the dispatcher) interacts with it only by sending commands and
//! observing the shared snapshot it publishes after every mutation — no
//! locks on PTY state or agent history.

pub mod agent;
pub mod registry;
pub mod supervisor;
pub mod terminal;

pub use registry::{SessionHandle, SessionKind, SessionRegistry};
