//! Bounded multi-producer, multi-consumer channels with rendezvous hand-off.
//!
//! A channel is the single point of synchronization between producing and
//! consuming tasks. It is created with a fixed capacity; capacity `0` makes a
//! *rendezvous* channel, where every send pairs off directly with a receive
//! and nothing is ever stored.
//!
//! Four kinds of operation are provided on each half:
//!
//! - **blocking**: [`Sender::send`] and [`Receiver::recv`] suspend the calling
//!   task until the operation completes (backpressure on the send side,
//!   availability on the receive side);
//! - **non-blocking**: [`Sender::try_send`] and [`Receiver::try_recv`] either
//!   complete immediately or report why they would have suspended;
//! - **probes**: [`Sender::writable`] and [`Receiver::readable`] wait for the
//!   corresponding operation to *plausibly* succeed without performing it.
//!   This is what [`select`](crate::select) races on, so that losing a race
//!   never consumes a value;
//! - **select arms**: [`Receiver::select_recv`](crate::select) and
//!   [`Sender::select_send`](crate::select) package a probe and its matching
//!   non-blocking attempt for use in a [`Select`](crate::select::Select).
//!
//! # Ordering
//!
//! Sequential awaited sends from one task are observed by receivers in issue
//! order. Sends racing from different tasks may be delivered in any order.
//! Blocked callers are serviced strictly first-come, first-served: the oldest
//! parked receiver gets the next value, and the oldest parked sender fills
//! the next free buffer slot.
//!
//! # Closing
//!
//! [`Sender::close`] (or dropping the last handle of either half) closes the
//! channel. Parked and future sends fail with [`SendError`], which hands the
//! undelivered value back. Receivers drain whatever the buffer still holds,
//! then observe `None`. Closing is idempotent.
//!
//! # Examples
//!
//! ```
//! # use tokio::task;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn test() {
//! use chansel::channel;
//!
//! let (tx, rx) = channel(2);
//!
//! let producer = task::spawn(async move {
//!     for i in 0..10 {
//!         tx.send(i).await.expect("receiver alive");
//!     }
//!     // dropping the last sender closes the channel
//! });
//!
//! let mut total = 0;
//! while let Some(i) = rx.recv().await {
//!     total += i;
//! }
//! assert_eq!(total, 45);
//! producer.await.unwrap();
//! # }
//! # test();
//! ```

use crate::wait_list::{wake_all, Token, WaitList};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

#[cfg(test)]
mod tests;

/// Creates a channel with the given capacity.
///
/// Capacity `0` creates a rendezvous channel: sends and receives pair off
/// directly, and a send does not complete until a receiver takes its value.
///
/// Both halves may be cloned; the channel closes when either side's last
/// handle is dropped, or when [`Sender::close`] is called.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(Chan {
        core: Mutex::new(Core {
            capacity,
            buffer: VecDeque::new(),
            closed: false,
            senders: WaitList::new(),
            receivers: WaitList::new(),
            send_probes: WaitList::new(),
            recv_probes: WaitList::new(),
            sender_handles: 1,
            receiver_handles: 1,
        }),
    });
    (
        Sender { chan: chan.clone() },
        Receiver {
            chan,
            stream_token: None,
        },
    )
}

/// The sending half of a [`channel`].
pub struct Sender<T> {
    chan: Arc<Chan<T>>,
}

/// The receiving half of a [`channel`].
///
/// A `Receiver` is also a [`Stream`](futures::Stream), yielding each received
/// value and terminating once the channel is closed and drained.
pub struct Receiver<T> {
    chan: Arc<Chan<T>>,
    /// Parked entry used by `poll_recv` / the `Stream` impl.
    stream_token: Option<Token>,
}

struct Chan<T> {
    core: Mutex<Core<T>>,
}

/// Channel state. Every transition happens with the lock held; wakers are
/// collected under the lock and invoked after it is released.
struct Core<T> {
    capacity: usize,
    buffer: VecDeque<T>,
    closed: bool,
    /// Parked `send` calls, oldest first, each still owning its value.
    senders: WaitList<SendEntry<T>>,
    /// Parked `recv` calls, oldest first.
    receivers: WaitList<RecvEntry<T>>,
    /// Parked `writable` probes.
    send_probes: WaitList<Waker>,
    /// Parked `readable` probes.
    recv_probes: WaitList<Waker>,
    sender_handles: usize,
    receiver_handles: usize,
}

struct SendEntry<T> {
    value: T,
    state: SendState,
}

enum SendState {
    /// Parked; the channel has not yet accepted the value.
    Pending(Waker),
    /// The channel closed while this sender was parked. The entry stays
    /// queued until its future observes the rejection and recovers the value.
    Rejected,
}

enum RecvEntry<T> {
    /// Parked, waiting for a deposit.
    Waiting(Waker),
    /// A value (or the closed notice) was deposited for this receiver.
    Ready(Option<T>),
}

enum StartSend<T> {
    Done,
    Closed(T),
    Parked(Token),
}

enum StartRecv<T> {
    Ready(Option<T>),
    Parked(Token),
}

// === impl Core ===

impl<T> Core<T> {
    /// A probe-visible value is available: something is buffered, or the
    /// channel is closed. Values still owned by parked senders are *not*
    /// visible to probes; they surface only through an actual receive.
    fn is_readable(&self) -> bool {
        !self.buffer.is_empty() || self.closed
    }

    /// A probe-visible slot is available: the buffer has room, or the channel
    /// is closed (a closed channel is "writable" so that probes wake and the
    /// subsequent attempt can surface the error).
    fn is_writable(&self) -> bool {
        self.buffer.len() < self.capacity || self.closed
    }

    /// Wake every probe whose condition currently holds. Probes re-check on
    /// poll, so spurious wakes are harmless; missed wakes are not.
    fn notify_probes(&mut self, wakers: &mut Vec<Waker>) {
        if self.is_readable() {
            wakers.extend(self.recv_probes.drain());
        }
        if self.is_writable() {
            wakers.extend(self.send_probes.drain());
        }
    }

    /// Dequeue the oldest parked sender along with its value.
    ///
    /// Never yields after close: rejected entries must stay queued until
    /// their futures observe them.
    fn pop_pending_sender(&mut self) -> Option<(T, Waker)> {
        if self.closed {
            return None;
        }
        let (_token, entry) = self.senders.pop()?;
        let SendEntry { value, state } = entry;
        match state {
            SendState::Pending(waker) => Some((value, waker)),
            // Entries are only rejected by `close`, which also sets `closed`.
            SendState::Rejected => unreachable!("sender rejected while channel open"),
        }
    }

    /// Move parked senders into free buffer slots, oldest first, completing
    /// their sends.
    fn admit_senders(&mut self, wakers: &mut Vec<Waker>) {
        while self.buffer.len() < self.capacity {
            let Some((value, waker)) = self.pop_pending_sender() else {
                break;
            };
            self.buffer.push_back(value);
            wakers.push(waker);
        }
    }

    /// Deposit a value into the oldest still-waiting parked receiver.
    ///
    /// Returns the value back if no receiver is waiting.
    fn deposit(&mut self, value: T, wakers: &mut Vec<Waker>) -> Result<(), T> {
        let Some(slot) = self
            .receivers
            .entries_mut()
            .find(|entry| matches!(entry, RecvEntry::Waiting(_)))
        else {
            return Err(value);
        };
        if let RecvEntry::Waiting(waker) = std::mem::replace(slot, RecvEntry::Ready(Some(value))) {
            wakers.push(waker);
        }
        Ok(())
    }

    /// Put back a value that was deposited into a receiver which was then
    /// cancelled before observing it. The value goes to the next waiting
    /// receiver, or else ahead of anything buffered; a rendezvous channel may
    /// briefly hold one buffered value this way.
    fn requeue(&mut self, value: T, wakers: &mut Vec<Waker>) {
        if let Err(value) = self.deposit(value, wakers) {
            self.buffer.push_front(value);
        }
    }

    fn try_send(&mut self, value: T, wakers: &mut Vec<Waker>) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(value));
        }
        // A parked receiver takes the value directly, skipping the buffer.
        match self.deposit(value, wakers) {
            Ok(()) => Ok(()),
            Err(value) => {
                if self.buffer.len() < self.capacity {
                    self.buffer.push_back(value);
                    self.notify_probes(wakers);
                    Ok(())
                } else {
                    Err(TrySendError::Full(value))
                }
            }
        }
    }

    fn try_recv(&mut self, wakers: &mut Vec<Waker>) -> Result<T, TryRecvError> {
        // Free slots admit the oldest parked senders *before* the buffer is
        // inspected, so buffered channels keep send order under backpressure.
        self.admit_senders(wakers);
        if let Some(value) = self.buffer.pop_front() {
            self.admit_senders(wakers);
            self.notify_probes(wakers);
            return Ok(value);
        }
        if let Some((value, waker)) = self.pop_pending_sender() {
            // Rendezvous: take the value straight from the head sender.
            wakers.push(waker);
            self.notify_probes(wakers);
            return Ok(value);
        }
        if self.closed {
            return Err(TryRecvError::Closed);
        }
        Err(TryRecvError::Empty)
    }

    fn start_send(
        &mut self,
        value: T,
        cx: &mut Context<'_>,
        wakers: &mut Vec<Waker>,
    ) -> StartSend<T> {
        if self.closed {
            return StartSend::Closed(value);
        }
        match self.deposit(value, wakers) {
            Ok(()) => StartSend::Done,
            Err(value) => {
                if self.buffer.len() < self.capacity {
                    self.buffer.push_back(value);
                    self.notify_probes(wakers);
                    StartSend::Done
                } else {
                    trace!(target: "chansel::channel", "send: parked");
                    let token = self.senders.push(SendEntry {
                        value,
                        state: SendState::Pending(cx.waker().clone()),
                    });
                    StartSend::Parked(token)
                }
            }
        }
    }

    fn poll_parked_send(
        &mut self,
        token: Token,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), SendError<T>>> {
        let Some(entry) = self.senders.get_mut(token) else {
            // Entry gone: the value was admitted or handed off.
            return Poll::Ready(Ok(()));
        };
        if let SendState::Pending(waker) = &mut entry.state {
            waker.clone_from(cx.waker());
            return Poll::Pending;
        }
        // Rejected: recover the value for the error.
        match self.senders.remove(token) {
            Some(entry) => Poll::Ready(Err(SendError(entry.value))),
            None => Poll::Ready(Ok(())),
        }
    }

    fn start_recv(&mut self, cx: &mut Context<'_>, wakers: &mut Vec<Waker>) -> StartRecv<T> {
        self.admit_senders(wakers);
        if let Some(value) = self.buffer.pop_front() {
            self.admit_senders(wakers);
            self.notify_probes(wakers);
            return StartRecv::Ready(Some(value));
        }
        if let Some((value, waker)) = self.pop_pending_sender() {
            wakers.push(waker);
            self.notify_probes(wakers);
            return StartRecv::Ready(Some(value));
        }
        if self.closed {
            return StartRecv::Ready(None);
        }
        trace!(target: "chansel::channel", "recv: parked");
        let token = self
            .receivers
            .push(RecvEntry::Waiting(cx.waker().clone()));
        StartRecv::Parked(token)
    }

    fn poll_parked_recv(&mut self, token: Token, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let ready = match self.receivers.get_mut(token) {
            None => return Poll::Ready(None),
            Some(RecvEntry::Waiting(waker)) => {
                waker.clone_from(cx.waker());
                false
            }
            Some(RecvEntry::Ready(_)) => true,
        };
        if !ready {
            return Poll::Pending;
        }
        match self.receivers.remove(token) {
            Some(RecvEntry::Ready(item)) => Poll::Ready(item),
            _ => Poll::Ready(None),
        }
    }

    /// Cancel a parked receiver. A deposit it never observed is passed on.
    fn cancel_recv(&mut self, token: Token, wakers: &mut Vec<Waker>) {
        if let Some(RecvEntry::Ready(Some(value))) = self.receivers.remove(token) {
            self.requeue(value, wakers);
            self.notify_probes(wakers);
        }
    }

    fn close(&mut self, wakers: &mut Vec<Waker>) {
        if test_dbg!(self.closed) {
            return;
        }
        self.closed = true;
        trace!(target: "chansel::channel", "channel closed");

        // Every parked sender fails; its future recovers the value on its
        // next poll.
        for entry in self.senders.entries_mut() {
            if let SendState::Pending(waker) =
                std::mem::replace(&mut entry.state, SendState::Rejected)
            {
                wakers.push(waker);
            }
        }

        // Hand whatever the buffer still holds to parked receivers in
        // arrival order.
        loop {
            let Some(value) = self.buffer.pop_front() else {
                break;
            };
            if let Err(value) = self.deposit(value, wakers) {
                self.buffer.push_front(value);
                break;
            }
        }

        // Every remaining parked receiver gets the closed notice.
        for entry in self.receivers.entries_mut() {
            if let RecvEntry::Waiting(_) = entry {
                if let RecvEntry::Waiting(waker) = std::mem::replace(entry, RecvEntry::Ready(None))
                {
                    wakers.push(waker);
                }
            }
        }

        // A closed channel reads as ready to every probe.
        wakers.extend(self.recv_probes.drain());
        wakers.extend(self.send_probes.drain());
    }
}

// === impl Sender ===

impl<T> Sender<T> {
    /// Sends a value, waiting until the channel can accept it.
    ///
    /// The value is delivered to the oldest waiting receiver if there is one,
    /// buffered if there is room, and otherwise the send parks until a slot
    /// frees up (or, on a rendezvous channel, until a receiver arrives).
    ///
    /// # Returns
    ///
    /// - [`Ok`]`(())` once the value has been accepted.
    /// - [`Err`]`(`[`SendError`]`)` if the channel is closed now or closes
    ///   while the send is parked. The error returns the value.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future before it completes withdraws the value:
    /// either the send never happened, or the value had already been accepted
    /// and stays delivered. A parked send that is dropped gives up its place
    /// in line.
    pub fn send(&self, value: T) -> Send<'_, T> {
        Send {
            sender: self,
            value: Some(value),
            token: None,
        }
    }

    /// Attempts to send a value without waiting.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut wakers = Vec::new();
        let mut core = self.chan.core.lock().unwrap();
        let result = core.try_send(value, &mut wakers);
        drop(core);
        wake_all(wakers);
        result
    }

    /// Waits until a send would plausibly succeed, without sending anything.
    ///
    /// Resolves when the buffer has room or the channel is closed. This is a
    /// pure observation: by the time the caller acts on it, another sender
    /// may already have taken the slot, so a subsequent [`try_send`] may
    /// still fail.
    ///
    /// [`try_send`]: Self::try_send
    pub fn writable(&self) -> Writable<'_, T> {
        Writable {
            sender: self,
            token: None,
        }
    }

    /// The number of tasks currently parked in [`writable`](Self::writable).
    #[must_use]
    pub fn writable_waiters(&self) -> usize {
        self.chan.core.lock().unwrap().send_probes.len()
    }

    /// Closes the channel.
    ///
    /// Parked sends fail with [`SendError`]; parked receives drain the
    /// remaining buffer in order and then observe `None`; every probe wakes.
    /// Calling `close` more than once has no further effect.
    pub fn close(&self) {
        let mut wakers = Vec::new();
        let mut core = self.chan.core.lock().unwrap();
        core.close(&mut wakers);
        drop(core);
        wake_all(wakers);
    }

    /// Returns `true` if the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.chan.core.lock().unwrap().closed
    }

    /// The channel's capacity. `0` means rendezvous.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chan.core.lock().unwrap().capacity
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.chan.core.lock().unwrap().sender_handles += 1;
        Sender {
            chan: self.chan.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut wakers = Vec::new();
        let mut core = self.chan.core.lock().unwrap();
        core.sender_handles -= 1;
        if core.sender_handles == 0 {
            core.close(&mut wakers);
        }
        drop(core);
        wake_all(wakers);
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.chan.core.lock().unwrap();
        f.debug_struct("Sender")
            .field("capacity", &core.capacity)
            .field("buffered", &core.buffer.len())
            .field("closed", &core.closed)
            .finish()
    }
}

// === impl Receiver ===

impl<T> Receiver<T> {
    /// Receives the next value, waiting until one is available.
    ///
    /// # Returns
    ///
    /// - [`Some`]`(value)`: the oldest available value. Under backpressure
    ///   the oldest parked sender is admitted into the buffer *before* the
    ///   buffer is read, so buffered channels preserve send order.
    /// - [`None`]: the channel is closed and everything sent before the close
    ///   has been received.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future gives up this receiver's place in line.
    /// A value that was already assigned to it is passed to the next waiting
    /// receiver, or returned to the front of the buffer; it is never lost.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv {
            receiver: self,
            token: None,
        }
    }

    /// Attempts to receive a value without waiting.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut wakers = Vec::new();
        let mut core = self.chan.core.lock().unwrap();
        let result = core.try_recv(&mut wakers);
        drop(core);
        wake_all(wakers);
        result
    }

    /// Waits until a receive would plausibly succeed, without consuming
    /// anything.
    ///
    /// Resolves when a value is buffered or the channel is closed. This is a
    /// pure observation and does not reserve the value: another receiver may
    /// take it first, so a subsequent [`try_recv`] may still come up empty.
    /// Several probes may all wake on a single value arriving.
    ///
    /// [`try_recv`]: Self::try_recv
    pub fn readable(&self) -> Readable<'_, T> {
        Readable {
            receiver: self,
            token: None,
        }
    }

    /// The number of tasks currently parked in [`readable`](Self::readable).
    #[must_use]
    pub fn readable_waiters(&self) -> usize {
        self.chan.core.lock().unwrap().recv_probes.len()
    }

    /// Polls for the next value. This is what the [`Stream`](futures::Stream)
    /// impl calls; it uses this `Receiver`'s own parking slot, independent of
    /// any [`recv`](Self::recv) futures.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        poll_recv_shared(&self.chan, &mut self.stream_token, cx)
    }

    /// Returns `true` if the channel is closed.
    ///
    /// Buffered values may still be receivable after this returns `true`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.chan.core.lock().unwrap().closed
    }

    /// The channel's capacity. `0` means rendezvous.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chan.core.lock().unwrap().capacity
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.chan.core.lock().unwrap().receiver_handles += 1;
        Receiver {
            chan: self.chan.clone(),
            stream_token: None,
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut wakers = Vec::new();
        let mut core = self.chan.core.lock().unwrap();
        if let Some(token) = self.stream_token.take() {
            core.cancel_recv(token, &mut wakers);
        }
        core.receiver_handles -= 1;
        if core.receiver_handles == 0 {
            core.close(&mut wakers);
            // Nothing can observe the buffer any more.
            core.buffer.clear();
        }
        drop(core);
        wake_all(wakers);
    }
}

impl<T> futures::Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.chan.core.lock().unwrap();
        f.debug_struct("Receiver")
            .field("capacity", &core.capacity)
            .field("buffered", &core.buffer.len())
            .field("closed", &core.closed)
            .finish()
    }
}

// === futures ===

fn poll_recv_shared<T>(
    chan: &Chan<T>,
    slot: &mut Option<Token>,
    cx: &mut Context<'_>,
) -> Poll<Option<T>> {
    let mut wakers = Vec::new();
    let mut core = chan.core.lock().unwrap();
    let poll = match *slot {
        Some(token) => core.poll_parked_recv(token, cx),
        None => match core.start_recv(cx, &mut wakers) {
            StartRecv::Ready(item) => Poll::Ready(item),
            StartRecv::Parked(token) => {
                *slot = Some(token);
                Poll::Pending
            }
        },
    };
    if poll.is_ready() {
        *slot = None;
    }
    drop(core);
    wake_all(wakers);
    poll
}

/// Future returned by [`Sender::send`].
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Send<'a, T> {
    sender: &'a Sender<T>,
    value: Option<T>,
    token: Option<Token>,
}

impl<T> Future for Send<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Send has no structurally-pinned fields, so it is safe to project
        // to a plain `&mut Self` regardless of whether `T: Unpin`.
        let this = unsafe { self.get_unchecked_mut() };
        let mut wakers = Vec::new();
        let mut core = this.sender.chan.core.lock().unwrap();
        let poll = match this.token {
            Some(token) => {
                let poll = core.poll_parked_send(token, cx);
                if poll.is_ready() {
                    this.token = None;
                }
                poll
            }
            None => match this.value.take() {
                // Completed (or never started); this future is fused.
                None => Poll::Ready(Ok(())),
                Some(value) => match core.start_send(value, cx, &mut wakers) {
                    StartSend::Done => Poll::Ready(Ok(())),
                    StartSend::Closed(value) => Poll::Ready(Err(SendError(value))),
                    StartSend::Parked(token) => {
                        this.token = Some(token);
                        Poll::Pending
                    }
                },
            },
        };
        drop(core);
        wake_all(wakers);
        poll
    }
}

impl<T> Drop for Send<'_, T> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        // Withdraw the parked value; the send never happened.
        self.sender.chan.core.lock().unwrap().senders.remove(token);
    }
}

/// Future returned by [`Receiver::recv`].
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Recv<'a, T> {
    receiver: &'a Receiver<T>,
    token: Option<Token>,
}

impl<T> Future for Recv<'_, T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        poll_recv_shared(&this.receiver.chan, &mut this.token, cx)
    }
}

impl<T> Drop for Recv<'_, T> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let mut wakers = Vec::new();
        let mut core = self.receiver.chan.core.lock().unwrap();
        core.cancel_recv(token, &mut wakers);
        drop(core);
        wake_all(wakers);
    }
}

/// Future returned by [`Receiver::readable`].
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Readable<'a, T> {
    receiver: &'a Receiver<T>,
    token: Option<Token>,
}

impl<T> Future for Readable<'_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let mut core = this.receiver.chan.core.lock().unwrap();
        if core.is_readable() {
            if let Some(token) = this.token.take() {
                core.recv_probes.remove(token);
            }
            return Poll::Ready(());
        }
        match this.token.and_then(|token| core.recv_probes.get_mut(token)) {
            Some(waker) => waker.clone_from(cx.waker()),
            None => this.token = Some(core.recv_probes.push(cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl<T> Drop for Readable<'_, T> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.receiver
                .chan
                .core
                .lock()
                .unwrap()
                .recv_probes
                .remove(token);
        }
    }
}

/// Future returned by [`Sender::writable`].
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Writable<'a, T> {
    sender: &'a Sender<T>,
    token: Option<Token>,
}

impl<T> Future for Writable<'_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let mut core = this.sender.chan.core.lock().unwrap();
        if core.is_writable() {
            if let Some(token) = this.token.take() {
                core.send_probes.remove(token);
            }
            return Poll::Ready(());
        }
        match this.token.and_then(|token| core.send_probes.get_mut(token)) {
            Some(waker) => waker.clone_from(cx.waker()),
            None => this.token = Some(core.send_probes.push(cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl<T> Drop for Writable<'_, T> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.sender
                .chan
                .core
                .lock()
                .unwrap()
                .send_probes
                .remove(token);
        }
    }
}

// === errors ===

/// Error returned by [`Sender::send`] when the channel is closed.
///
/// The undelivered value is handed back.
pub struct SendError<T>(
    /// The value that could not be sent.
    pub T,
);

impl<T> SendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("sending into a closed channel")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`Sender::try_send`].
pub enum TrySendError<T> {
    /// The channel could not accept the value without waiting.
    Full(T),
    /// The channel is closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }

    /// Returns `true` for [`TrySendError::Full`].
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns `true` for [`TrySendError::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.pad("Full(..)"),
            Self::Closed(_) => f.pad("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.pad("channel is full"),
            Self::Closed(_) => f.pad("sending into a closed channel"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Error returned by [`Receiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value is available right now; the channel is still open.
    Empty,
    /// The channel is closed and fully drained.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.pad("channel is empty"),
            Self::Closed => f.pad("channel is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}
