//! Bus frames and inbound command decode.
//!
//! The transport (mailbox matching, DLC handling, arbitration) lives
//! outside this crate.  Here a frame is just an identifier plus up to
//! eight payload bytes, and the only inbound decoding is the command
//! byte shared by the command and keep-alive messages:
//!
//! ```text
//!   byte 0:  bit 7  connect (1) / disconnect (0)
//!            bit 6  reset (1) / none (0)
//!   byte 1:  diagnostic item request (command message only, optional)
//! ```

pub mod msgs;

use crate::events::Notification;

/// Largest classic-CAN payload.
pub const MAX_DLC: usize = 8;

// ───────────────────────────────────────────────────────────────
// Frame
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub data: heapless::Vec<u8, MAX_DLC>,
}

impl CanFrame {
    /// Build a frame; payload bytes past [`MAX_DLC`] are dropped.
    pub fn new(id: u32, payload: &[u8]) -> Self {
        Self {
            id,
            data: payload.iter().copied().take(MAX_DLC).collect(),
        }
    }

    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

// ───────────────────────────────────────────────────────────────
// Mailboxes
// ───────────────────────────────────────────────────────────────

/// Inbound mailboxes the controller listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mailbox {
    Command = 0,
    KeepAlive = 1,
    Poll = 2,
}

impl Mailbox {
    pub const COUNT: usize = 3;

    /// Bit the mailbox delivery posts when a frame lands here.
    pub const fn notification(self) -> Notification {
        match self {
            Self::Command => Notification::CommandMsg,
            Self::KeepAlive => Notification::KeepAliveMsg,
            Self::Poll => Notification::PollMsg,
        }
    }

    /// Match an inbound identifier against the configured ids.
    pub fn for_id(id: u32, ids: &crate::config::CanIds) -> Option<Self> {
        if id == ids.command_in {
            Some(Self::Command)
        } else if id == ids.keepalive_in {
            Some(Self::KeepAlive)
        } else if id == ids.poll_in {
            Some(Self::Poll)
        } else {
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Command byte
// ───────────────────────────────────────────────────────────────

/// Connect request bit in command byte 0.
pub const CMD_CONNECT_BIT: u8 = 1 << 7;
/// Reset request bit in command byte 0.
pub const CMD_RESET_BIT: u8 = 1 << 6;

/// Decoded command / keep-alive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    /// Byte 0 as received (echoed in the status response).
    pub raw: u8,
    pub connect: bool,
    pub reset: bool,
    /// Byte 1, when present.
    pub diag_item: Option<u8>,
}

impl CommandRequest {
    /// Decode a payload.  `None` for an empty payload: the sender gets a
    /// status reply but the request flags stay as they were.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let raw = *data.first()?;
        Some(Self {
            raw,
            connect: raw & CMD_CONNECT_BIT != 0,
            reset: raw & CMD_RESET_BIT != 0,
            diag_item: data.get(1).copied(),
        })
    }
}
