//! In-flight call table
//!
//! Every outgoing request parks a oneshot sender here under its id. The read
//! loop completes entries as replies arrive; timeouts and disconnections
//! remove or fail them. An entry leaves the table exactly once, so a late
//! reply after a timeout finds nothing and is dropped.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

type ReplySender = oneshot::Sender<ClientResult<Value>>;

#[derive(Default)]
pub(crate) struct PendingCalls {
    inner: Mutex<HashMap<u64, ReplySender>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a new entry and hands back the receiving half.
    pub fn insert(&self, id: u64) -> oneshot::Receiver<ClientResult<Value>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        rx
    }

    /// Takes an entry out of the table without completing it.
    pub fn remove(&self, id: u64) -> Option<ReplySender> {
        self.inner.lock().remove(&id)
    }

    /// Completes the entry for `id`, if it is still in the table.
    /// Returns false when the caller already gave up on the reply.
    pub fn complete(&self, id: u64, outcome: ClientResult<Value>) -> bool {
        match self.remove(id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Fails every in-flight call, draining the table.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) {
        let drained: Vec<ReplySender> = {
            let mut table = self.inner.lock();
            table.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(error()));
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
