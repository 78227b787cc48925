//! Process-wide lifecycle state of a client.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a client. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientState {
    /// Accepting messages.
    Running = 0,
    /// `shutdown` is draining; new messages are rejected.
    ShuttingDown = 1,
    /// Terminal.
    Shutdown = 2,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Shutdown,
        }
    }
}

/// Atomic holder for [`ClientState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ClientState::Running as u8))
    }

    pub(crate) fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.get() == ClientState::Running
    }

    /// `Running -> ShuttingDown`. Returns `false` if another caller won or the
    /// client already left `Running`.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.0
            .compare_exchange(
                ClientState::Running as u8,
                ClientState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `ShuttingDown -> Shutdown`.
    pub(crate) fn finish_shutdown(&self) {
        let _ = self.0.compare_exchange(
            ClientState::ShuttingDown as u8,
            ClientState::Shutdown as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
