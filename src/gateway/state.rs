//! Gateway lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    NotStarted = 0,
    Running = 1,
    Closed = 2,
}

impl From<u8> for GatewayState {
    fn from(val: u8) -> Self {
        match val {
            0 => GatewayState::NotStarted,
            1 => GatewayState::Running,
            _ => GatewayState::Closed,
        }
    }
}

/// Atomic cell holding a [`GatewayState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(GatewayState::NotStarted as u8))
    }

    pub fn get(&self) -> GatewayState {
        GatewayState::from(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: GatewayState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
