//! One-shot rendezvous between a handler and the waiting user request.
//!
//! # Design Decisions
//! - Backed by a tokio oneshot: one writer, one reader, no hand-rolled condvar
//! - `Callback` clones share the single sender; only the first send wins
//! - `ResponseWaiter::wait` consumes the waiter, so it can only wait once
//! - Dropping the waiter (caller gone) frees the channel; late sends just fail

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

use crate::api::ErrorCode;

/// Result delivered by a handler: encoded response plus outcome classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCallbackPayload {
    pub raw_response: Vec<u8>,
    pub error_code: ErrorCode,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("response already sent")]
    AlreadySent,

    #[error("caller is no longer waiting")]
    WaiterGone,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("callback dropped without a response")]
    Dropped,
}

/// Producer half, handed to the handler.
#[derive(Debug, Clone)]
pub struct Callback {
    tx: Arc<Mutex<Option<oneshot::Sender<UserCallbackPayload>>>>,
}

/// Consumer half, kept by the gateway.
#[derive(Debug)]
pub struct ResponseWaiter {
    rx: oneshot::Receiver<UserCallbackPayload>,
}

/// Create a fresh callback for one request.
pub fn new_callback() -> (Callback, ResponseWaiter) {
    let (tx, rx) = oneshot::channel();
    (
        Callback {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        ResponseWaiter { rx },
    )
}

impl Callback {
    /// Deliver the single result. Fails on any later call.
    pub fn send_response(&self, payload: UserCallbackPayload) -> Result<(), CallbackError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CallbackError::AlreadySent)?;
        tx.send(payload).map_err(|_| CallbackError::WaiterGone)
    }
}

impl ResponseWaiter {
    /// Wait for the result until `deadline`.
    pub async fn wait(self, deadline: Instant) -> Result<UserCallbackPayload, CallbackError> {
        match timeout_at(deadline, self.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(CallbackError::Dropped),
            Err(_) => Err(CallbackError::DeadlineExceeded),
        }
    }
}
