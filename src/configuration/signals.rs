/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Typed notification channels
//!
//! Every subscriber gets its own receiver. Emitting sends a clone of the
//! value to each live subscriber and forgets receivers that were dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Handle returned by [`Signal::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A broadcast channel for one notification kind
#[derive(Debug)]
pub struct Signal<T: Clone + Send> {
    subscribers: Mutex<Vec<(SubscriptionId, Sender<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> Signal<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a new receiver
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<T>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push((id, tx));
        }
        (id, rx)
    }

    /// Remove a receiver; returns false when the id is unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.subscribers.lock() {
            Ok(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|(sid, _)| *sid != id);
                subscribers.len() != before
            }
            Err(_) => false,
        }
    }

    /// Deliver `value` to every subscriber
    pub fn emit(&self, value: T) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
