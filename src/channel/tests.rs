use super::*;
use crate::util::test::trace_init;
use futures::StreamExt;
use tokio_test::{assert_pending, assert_ready, assert_ready_err, assert_ready_ok, task};

#[test]
fn buffered_roundtrip() {
    let _trace = trace_init();
    let (tx, rx) = channel(1);

    assert_ready_ok!(task::spawn(tx.send(7)).poll());
    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(7));
}

#[test]
fn rendezvous_handoff() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut recv = task::spawn(rx.recv());
    assert_pending!(recv.poll());

    // The send pairs off with the parked receive and completes immediately.
    let mut send = task::spawn(tx.send(7));
    assert_ready_ok!(send.poll());

    assert!(recv.is_woken());
    assert_eq!(assert_ready!(recv.poll()), Some(7));
}

#[test]
fn rendezvous_send_parks_without_receiver() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut send = task::spawn(tx.send(7));
    assert_pending!(send.poll());

    let mut recv = task::spawn(rx.recv());
    assert_eq!(assert_ready!(recv.poll()), Some(7));

    assert!(send.is_woken());
    assert_ready_ok!(send.poll());
}

#[test]
fn backpressure_admits_oldest_sender_first() {
    let _trace = trace_init();
    let (tx, rx) = channel(1);

    tx.try_send(1).unwrap();
    let mut send2 = task::spawn(tx.send(2));
    let mut send3 = task::spawn(tx.send(3));
    assert_pending!(send2.poll());
    assert_pending!(send3.poll());

    // Each receive admits exactly one parked sender into the freed slot.
    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(1));
    assert!(send2.is_woken());
    assert_ready_ok!(send2.poll());
    assert_pending!(send3.poll());

    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(2));
    assert_ready_ok!(send3.poll());
    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(3));
}

#[test]
fn sequential_sends_arrive_in_order() {
    let _trace = trace_init();
    let (tx, rx) = channel(4);

    for i in 0..4 {
        assert_ready_ok!(task::spawn(tx.send(i)).poll());
    }
    for i in 0..4 {
        assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(i));
    }
}

#[test]
fn parked_receivers_are_served_fifo() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut first = task::spawn(rx.recv());
    let mut second = task::spawn(rx.recv());
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    assert_ready_ok!(task::spawn(tx.send("a")).poll());
    assert!(first.is_woken());
    assert!(!second.is_woken());

    assert_ready_ok!(task::spawn(tx.send("b")).poll());
    assert!(second.is_woken());

    assert_eq!(assert_ready!(first.poll()), Some("a"));
    assert_eq!(assert_ready!(second.poll()), Some("b"));
}

#[test]
fn try_send_reports_full_and_closed() {
    let (tx, rx) = channel(1);

    tx.try_send(1).unwrap();
    let err = tx.try_send(2).unwrap_err();
    assert!(err.is_full());
    assert_eq!(err.into_inner(), 2);

    tx.close();
    let err = tx.try_send(3).unwrap_err();
    assert!(err.is_closed());
    drop(rx);
}

#[test]
fn try_recv_reports_empty_and_closed() {
    let (tx, rx) = channel::<u32>(1);

    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    tx.try_send(1).unwrap();
    assert_eq!(rx.try_recv(), Ok(1));

    tx.close();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn try_recv_takes_from_parked_sender() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut send = task::spawn(tx.send(9));
    assert_pending!(send.poll());

    // A non-blocking receive performs the rendezvous directly.
    assert_eq!(rx.try_recv(), Ok(9));
    assert!(send.is_woken());
    assert_ready_ok!(send.poll());
}

#[test]
fn close_rejects_parked_senders_with_their_values() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut send = task::spawn(tx.send(5));
    assert_pending!(send.poll());

    tx.close();
    assert!(send.is_woken());
    let err = assert_ready_err!(send.poll());
    assert_eq!(err.into_inner(), 5);

    // Sends started after the close fail without parking.
    let err = assert_ready_err!(task::spawn(tx.send(6)).poll());
    assert_eq!(err.into_inner(), 6);
    drop(rx);
}

#[test]
fn close_drains_buffer_before_reporting_closed() {
    let (tx, rx) = channel(2);

    tx.try_send(1).unwrap();
    tx.try_send(2).unwrap();
    tx.close();

    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(1));
    assert_eq!(rx.try_recv(), Ok(2));
    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), None);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn close_resolves_parked_receivers() {
    let _trace = trace_init();
    let (tx, rx) = channel::<u32>(0);

    let mut recv = task::spawn(rx.recv());
    assert_pending!(recv.poll());

    tx.close();
    assert!(recv.is_woken());
    assert_eq!(assert_ready!(recv.poll()), None);
}

#[test]
fn close_is_idempotent() {
    let (tx, rx) = channel(2);
    tx.try_send(1).unwrap();

    tx.close();
    tx.close();
    tx.close();

    assert!(tx.is_closed());
    assert_eq!(rx.try_recv(), Ok(1));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn dropping_last_sender_closes() {
    let (tx, rx) = channel::<u32>(1);
    let tx2 = tx.clone();
    tx.try_send(1).unwrap();

    let mut recv = task::spawn(rx.recv());
    assert_eq!(assert_ready!(recv.poll()), Some(1));

    let mut recv = task::spawn(rx.recv());
    assert_pending!(recv.poll());

    drop(tx);
    assert_pending!(recv.poll(), "one sender handle is still alive");
    drop(tx2);

    assert!(recv.is_woken());
    assert_eq!(assert_ready!(recv.poll()), None);
}

#[test]
fn dropping_last_receiver_fails_senders() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut send = task::spawn(tx.send(1));
    assert_pending!(send.poll());

    drop(rx);
    assert!(send.is_woken());
    assert_ready_err!(send.poll());
    assert!(tx.try_send(2).unwrap_err().is_closed());
}

#[test]
fn cancelled_recv_passes_its_deposit_on() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut recv = task::spawn(rx.recv());
    assert_pending!(recv.poll());

    // The send deposits straight into the parked receive, which is then
    // dropped without ever being polled again.
    assert_ready_ok!(task::spawn(tx.send(1)).poll());
    drop(recv);

    // The value is not lost: the next receive observes it.
    assert_eq!(assert_ready!(task::spawn(rx.recv()).poll()), Some(1));
}

#[test]
fn cancelled_send_withdraws_its_value() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut send = task::spawn(tx.send(1));
    assert_pending!(send.poll());
    drop(send);

    // The cancelled send never happened; a later send is what arrives.
    let mut recv = task::spawn(rx.recv());
    assert_pending!(recv.poll());
    assert_ready_ok!(task::spawn(tx.send(2)).poll());
    assert_eq!(assert_ready!(recv.poll()), Some(2));
}

#[test]
fn readable_fires_when_a_value_is_buffered() {
    let _trace = trace_init();
    let (tx, rx) = channel(1);

    let mut readable = task::spawn(rx.readable());
    assert_pending!(readable.poll());
    assert_eq!(rx.readable_waiters(), 1);

    tx.try_send(1).unwrap();
    assert!(readable.is_woken());
    assert_ready!(readable.poll());
    assert_eq!(rx.readable_waiters(), 0);

    // The probe consumed nothing.
    assert_eq!(rx.try_recv(), Ok(1));
}

#[test]
fn writable_fires_when_a_slot_frees_up() {
    let _trace = trace_init();
    let (tx, rx) = channel(1);
    tx.try_send(1).unwrap();

    let mut writable = task::spawn(tx.writable());
    assert_pending!(writable.poll());
    assert_eq!(tx.writable_waiters(), 1);

    assert_eq!(rx.try_recv(), Ok(1));
    assert!(writable.is_woken());
    assert_ready!(writable.poll());
    assert_eq!(tx.writable_waiters(), 0);
}

#[test]
fn probes_fire_on_close() {
    let _trace = trace_init();
    // A rendezvous channel is never probe-ready while open and idle.
    let (tx, rx) = channel::<u32>(0);

    let mut readable = task::spawn(rx.readable());
    let mut writable = task::spawn(tx.writable());
    assert_pending!(readable.poll());
    assert_pending!(writable.poll());

    tx.close();
    assert!(readable.is_woken());
    assert!(writable.is_woken());
    assert_ready!(readable.poll());
    assert_ready!(writable.poll());
}

#[test]
fn probes_ignore_parked_senders() {
    let _trace = trace_init();
    let (tx, rx) = channel(0);

    let mut readable = task::spawn(rx.readable());
    assert_pending!(readable.poll());

    // A parked send is not a buffered value; the probe stays quiet even
    // though `try_recv` could rendezvous with it.
    let mut send = task::spawn(tx.send(1));
    assert_pending!(send.poll());
    assert!(!readable.is_woken());
    assert_pending!(readable.poll());
}

#[test]
fn cancelled_probe_restores_the_gauge() {
    let (tx, rx) = channel::<u32>(0);

    assert_eq!(rx.readable_waiters(), 0);
    let mut readable = task::spawn(rx.readable());
    assert_pending!(readable.poll());
    assert_eq!(rx.readable_waiters(), 1);

    drop(readable);
    assert_eq!(rx.readable_waiters(), 0);

    let mut writable = task::spawn(tx.writable());
    assert_pending!(writable.poll());
    assert_eq!(tx.writable_waiters(), 1);
    drop(writable);
    assert_eq!(tx.writable_waiters(), 0);
}

#[test]
fn multiple_probes_wake_on_one_transition() {
    let _trace = trace_init();
    let (tx, rx) = channel(1);

    let mut first = task::spawn(rx.readable());
    let mut second = task::spawn(rx.readable());
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    tx.try_send(1).unwrap();
    assert!(first.is_woken());
    assert!(second.is_woken());
    assert_ready!(first.poll());
    assert_ready!(second.poll());
}

#[test]
fn stream_terminates_after_close_and_drain() {
    let (tx, mut rx) = channel(4);
    tx.try_send(1).unwrap();
    tx.try_send(2).unwrap();
    tx.close();

    tokio_test::block_on(async {
        assert_eq!(rx.next().await, Some(1));
        assert_eq!(rx.next().await, Some(2));
        assert_eq!(rx.next().await, None);
    });
}

#[test]
fn stream_waits_for_values() {
    let _trace = trace_init();
    let (tx, mut rx) = channel(1);

    let mut next = task::spawn(rx.next());
    assert_pending!(next.poll());

    tx.try_send(1).unwrap();
    assert!(next.is_woken());
    assert_eq!(assert_ready!(next.poll()), Some(1));
}

#[test]
fn capacity_and_closed_are_observable_from_both_halves() {
    let (tx, rx) = channel::<u32>(3);
    assert_eq!(tx.capacity(), 3);
    assert_eq!(rx.capacity(), 3);
    assert!(!rx.is_closed());

    tx.close();
    assert!(tx.is_closed());
    assert!(rx.is_closed());
}
