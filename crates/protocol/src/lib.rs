// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire schema shared by `tiflis-workstation` and `tiflis-tunnel`: the
//! envelope, error vocabulary, session/content-block data model, message
//! payload catalog, sync snapshot, and magic-link encoding. This crate is
//! data-only — no transport, no I/O, no behavior beyond (de)serialization
//! and the small pure helpers attached to each type.

pub mod content_block;
pub mod device;
pub mod envelope;
pub mod error;
pub mod magic_link;
pub mod messages;
pub mod session;
pub mod sync;

pub use content_block::{ActionButton, ContentBlock, ContentBlockKind, ToolStatus};
pub use device::{Device, TunnelIdentity, Workstation};
pub use envelope::{epoch_ms, is_compatible_protocol_version, Envelope, COMPATIBLE_PROTOCOL_VERSIONS, PROTOCOL_VERSION};
pub use error::{ErrorBody, ErrorCode};
pub use magic_link::{MagicLinkError, MagicLinkPayload};
pub use session::{Session, SessionStatus, SessionType};
pub use sync::SyncState;
