//! Oneshot request-reply plumbing for actor messages.
//!
//! Messages must be `Clone`, so the sender half travels behind an
//! `Arc<Mutex<Option<_>>>` and is taken exactly once.

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Type alias for response channels (cloneable for actor message requirements).
pub type ResponseChannel<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

/// Create a request-reply pair.
#[must_use]
pub fn create_request_reply<T>() -> (ResponseChannel<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

/// Send a response through a response channel.
///
/// # Errors
///
/// Returns the value if the receiver was dropped or a response was already sent.
pub async fn send_response<T>(response_tx: ResponseChannel<T>, value: T) -> Result<(), T> {
    let tx = response_tx.lock().await.take();
    if let Some(tx) = tx {
        tx.send(value)
    } else {
        Err(value)
    }
}

/// Send a response if a response channel is provided.
pub async fn send_optional_response<T>(response_tx: Option<ResponseChannel<T>>, value: T) {
    if let Some(tx) = response_tx {
        let _ = send_response(tx, value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn response_is_delivered_once() {
        let (tx, rx) = create_request_reply::<u32>();
        assert!(send_response(tx.clone(), 7).await.is_ok());
        assert_eq!(rx.await.unwrap(), 7);
        assert_eq!(send_response(tx, 8).await, Err(8));
    }

    #[tokio::test]
    async fn dropped_receiver_returns_value() {
        let (tx, rx) = create_request_reply::<&str>();
        drop(rx);
        assert_eq!(send_response(tx, "late").await, Err("late"));
    }
}
