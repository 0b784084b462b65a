//! Pending-token ledger and operation counters.
//!
//! The ledger hands tokens back in enqueue order, independently of the order
//! packets are released by the dequeue policy.

use std::collections::VecDeque;

use serde::Serialize;

use crate::packet::Token;

/// Operation counters exposed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Packets admitted since the last reset.
    pub enqueued: u64,
    /// Packets released by a dequeue attempt.
    pub dequeued: u64,
    /// Tokens taken from the ledger.
    pub read: u64,
}

#[derive(Debug, Default)]
pub struct TokenLedger {
    pending: VecDeque<Token>,
    read: u64,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, token: Token) {
        self.pending.push_back(token);
    }

    /// Oldest recorded token not yet taken.
    pub fn take_oldest(&mut self) -> Option<Token> {
        let token = self.pending.pop_front()?;
        self.read += 1;
        Some(token)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn read(&self) -> u64 {
        self.read
    }
}
