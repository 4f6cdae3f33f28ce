//! One-slot rendezvous: at most one waiting consumer, at most one delivery per wait.
//!
//! Used for push-to-talk audio (capture -> turn engine) and for playback
//! acknowledgements (client -> speaker). This is not a queue: a
//! second waiter is rejected while the first one is still alive, and a value
//! delivered with nobody waiting is handed back to the caller.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::error::TutorError;

pub struct Rendezvous<T> {
  slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Rendezvous<T> {
  fn clone(&self) -> Self {
    Self { slot: self.slot.clone() }
  }
}

impl<T> Default for Rendezvous<T> {
  fn default() -> Self {
    Self { slot: Arc::new(Mutex::new(None)) }
  }
}

impl<T> Rendezvous<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register as the single consumer. A waiter whose receiver was dropped
  /// (e.g. it timed out) no longer counts as outstanding.
  pub fn wait(&self) -> Result<oneshot::Receiver<T>, TutorError> {
    let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
    if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
      return Err(TutorError::CaptureBusy);
    }
    let (tx, rx) = oneshot::channel();
    *slot = Some(tx);
    Ok(rx)
  }

  /// Hand `value` to the waiting consumer, or give it back if there is none.
  pub fn deliver(&self, value: T) -> Result<(), T> {
    let tx = self.slot.lock().unwrap_or_else(|p| p.into_inner()).take();
    match tx {
      Some(tx) => tx.send(value),
      None => Err(value),
    }
  }

  pub fn is_waiting(&self) -> bool {
    self
      .slot
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .as_ref()
      .is_some_and(|tx| !tx.is_closed())
  }

  /// Drop the current waiter, if any. Its receiver resolves with `RecvError`.
  pub fn cancel(&self) {
    self.slot.lock().unwrap_or_else(|p| p.into_inner()).take();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn delivers_to_the_single_waiter() {
    let r = Rendezvous::new();
    let rx = r.wait().expect("first waiter");
    assert!(r.is_waiting());
    assert!(r.deliver(7u32).is_ok());
    assert_eq!(rx.await.expect("value"), 7);
    assert!(!r.is_waiting());
  }

  #[test]
  fn second_live_waiter_is_rejected() {
    let r: Rendezvous<u8> = Rendezvous::new();
    let _rx = r.wait().expect("first waiter");
    assert_eq!(r.wait().unwrap_err(), TutorError::CaptureBusy);
  }

  #[test]
  fn dropped_waiter_frees_the_slot() {
    let r: Rendezvous<u8> = Rendezvous::new();
    drop(r.wait().expect("first waiter"));
    assert!(!r.is_waiting());
    assert!(r.wait().is_ok());
  }

  #[test]
  fn delivery_without_waiter_returns_value() {
    let r = Rendezvous::new();
    assert_eq!(r.deliver("late"), Err("late"));
  }

  #[tokio::test]
  async fn cancel_wakes_waiter_with_error() {
    let r: Rendezvous<u8> = Rendezvous::new();
    let rx = r.wait().expect("waiter");
    r.cancel();
    assert!(rx.await.is_err());
  }
}
