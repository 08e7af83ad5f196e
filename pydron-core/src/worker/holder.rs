//! The value holder state machine (spec §4.7): every value a worker tracks
//! sits in one of `transferring_no_waiters`, `transferring_with_waiters`,
//! `transferring_with_waiters_and_free_pending`, `stored`, or `freed`.
//!
//! `stored`/`freed` are plain data; the `transferring_*` states exist only
//! while `fetch_from` has a transfer in flight and other callers are
//! simultaneously asking for the same value or trying to free it before it
//! lands.

use tokio::sync::oneshot;

use crate::value::ValueContainer;

/// What `get` returns: the value immediately if already stored, or a
/// receiver that completes once a concurrent transfer lands.
pub enum GetOutcome {
    Ready(ValueContainer),
    Pending(oneshot::Receiver<ValueContainer>),
}

/// What `free` returns: done immediately, or a receiver that completes
/// once the in-flight transfer this free raced against finishes tearing
/// down.
pub enum FreeOutcome {
    Done,
    Pending(oneshot::Receiver<()>),
}

enum State {
    TransferringNoWaiters { canceller: oneshot::Sender<()> },
    TransferringWithWaiters { canceller: oneshot::Sender<()>, waiters: Vec<oneshot::Sender<ValueContainer>> },
    TransferringWithWaitersAndFreePending {
        canceller: oneshot::Sender<()>,
        waiters: Vec<oneshot::Sender<ValueContainer>>,
        free_completions: Vec<oneshot::Sender<()>>,
    },
    Stored(ValueContainer),
    Freed,
}

pub struct ValueHolder {
    state: State,
}

impl ValueHolder {
    /// Starts a fresh transfer. Returns the holder plus the receiver half
    /// of the canceller channel — the transfer task awaits it alongside
    /// the real transfer future so a `free` racing the transfer can cut it
    /// short (spec §4.7 `transferring_no_waiters + free -> freed`).
    pub fn transferring() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { state: State::TransferringNoWaiters { canceller: tx } }, rx)
    }

    pub fn stored(container: ValueContainer) -> Self {
        Self { state: State::Stored(container) }
    }

    pub fn peek_stored(&self) -> Option<&ValueContainer> {
        match &self.state {
            State::Stored(c) => Some(c),
            _ => None,
        }
    }

    /// `get`: complete immediately if `stored`, otherwise register a
    /// waiter to be completed by the eventual `set`.
    pub fn get(&mut self) -> GetOutcome {
        match &mut self.state {
            State::Stored(c) => GetOutcome::Ready(c.clone()),
            State::TransferringNoWaiters { .. } => {
                let (tx, rx) = oneshot::channel();
                let old = std::mem::replace(&mut self.state, State::Freed);
                let canceller = match old {
                    State::TransferringNoWaiters { canceller } => canceller,
                    _ => unreachable!(),
                };
                self.state = State::TransferringWithWaiters { canceller, waiters: vec![tx] };
                GetOutcome::Pending(rx)
            }
            State::TransferringWithWaiters { waiters, .. } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                GetOutcome::Pending(rx)
            }
            State::TransferringWithWaitersAndFreePending { waiters, .. } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                GetOutcome::Pending(rx)
            }
            State::Freed => GetOutcome::Pending(oneshot::channel().1), // immediately dropped: error surfaces as RecvError
        }
    }

    /// `set`: the transfer (or evaluation) landed. Completes every
    /// registered waiter and any pending frees, then settles into `stored`
    /// or `freed` depending on whether a free was already requested.
    pub fn set(&mut self, container: ValueContainer) {
        let old = std::mem::replace(&mut self.state, State::Freed);
        match old {
            State::TransferringNoWaiters { .. } => {
                self.state = State::Stored(container);
            }
            State::TransferringWithWaiters { waiters, .. } => {
                for waiter in waiters {
                    let _ = waiter.send(container.clone());
                }
                self.state = State::Stored(container);
            }
            State::TransferringWithWaitersAndFreePending { waiters, free_completions, .. } => {
                for waiter in waiters {
                    let _ = waiter.send(container.clone());
                }
                for fc in free_completions {
                    let _ = fc.send(());
                }
                self.state = State::Freed;
            }
            State::Stored(_) | State::Freed => {
                self.state = State::Stored(container);
            }
        }
    }

    /// `free`: release storage (or, if a transfer is in flight, mark the
    /// free pending and cancel once the last waiter drops).
    pub fn free(&mut self) -> FreeOutcome {
        let old = std::mem::replace(&mut self.state, State::Freed);
        match old {
            State::Stored(_) => FreeOutcome::Done,
            State::TransferringNoWaiters { canceller } => {
                let _ = canceller.send(());
                FreeOutcome::Done
            }
            State::TransferringWithWaiters { canceller, waiters } => {
                let (tx, rx) = oneshot::channel();
                self.state =
                    State::TransferringWithWaitersAndFreePending { canceller, waiters, free_completions: vec![tx] };
                FreeOutcome::Pending(rx)
            }
            State::TransferringWithWaitersAndFreePending { canceller, waiters, mut free_completions } => {
                let (tx, rx) = oneshot::channel();
                free_completions.push(tx);
                self.state = State::TransferringWithWaitersAndFreePending { canceller, waiters, free_completions };
                FreeOutcome::Pending(rx)
            }
            State::Freed => FreeOutcome::Done,
        }
    }

    /// Cancels the holder outright — used by `fetch_from` when the
    /// transfer itself failed or was cut short, regardless of how many
    /// waiters or pending frees were registered.
    pub fn cancel(&mut self) {
        let old = std::mem::replace(&mut self.state, State::Freed);
        if let State::TransferringNoWaiters { canceller }
        | State::TransferringWithWaiters { canceller, .. }
        | State::TransferringWithWaitersAndFreePending { canceller, .. } = old
        {
            let _ = canceller.send(());
        }
    }
}
