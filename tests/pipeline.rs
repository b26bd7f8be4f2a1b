//! End-to-end exercises of channels and `select` on a real executor.

use chansel::{abort_pair, channel, Abortable, Select};
use futures::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn bounded_pipeline_delivers_in_order() {
    let (tx, rx) = channel(4);

    let producer = async {
        for i in 0..100u32 {
            tx.send(i).await.expect("receiver alive");
        }
        tx.close();
    };

    let consumer = async {
        let mut received = Vec::new();
        while let Some(value) = rx.recv().await {
            received.push(value);
        }
        received
    };

    let ((), received) = tokio::join!(producer, consumer);
    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn rendezvous_round_trip() {
    let (ping_tx, ping_rx) = channel::<u32>(0);
    let (pong_tx, pong_rx) = channel::<u32>(0);

    let echo = async {
        while let Some(value) = ping_rx.recv().await {
            pong_tx.send(value + 1).await.expect("driver alive");
        }
    };

    let driver = async {
        let mut answers = Vec::new();
        for i in 0..10 {
            ping_tx.send(i).await.unwrap();
            answers.push(pong_rx.recv().await.unwrap());
        }
        ping_tx.close();
        answers
    };

    let ((), answers) = tokio::join!(echo, driver);
    assert_eq!(answers, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn cloned_senders_feed_one_receiver() {
    let (tx, rx) = channel(8);
    let tx2 = tx.clone();

    let a = async move {
        for i in 0..50u32 {
            tx.send(i).await.unwrap();
        }
    };
    let b = async move {
        for i in 50..100u32 {
            tx2.send(i).await.unwrap();
        }
    };
    // Both sender handles drop when the producers finish, closing the
    // channel and terminating the stream.
    let collect = rx.collect::<Vec<_>>();

    let ((), (), mut received) = tokio::join!(a, b, collect);
    received.sort_unstable();
    assert_eq!(received, (0..100).collect::<Vec<_>>());
}

enum Step {
    Job(Option<u32>),
    Stop,
}

#[tokio::test]
async fn select_worker_drains_jobs_then_sees_the_close() {
    let (job_tx, job_rx) = channel(2);
    let (_stop_tx, stop_rx) = channel::<()>(1);

    let producer = async {
        for i in 0..5u32 {
            job_tx.send(i).await.unwrap();
        }
        job_tx.close();
    };

    let worker = async {
        let mut done = Vec::new();
        loop {
            let (_, step) = Select::new()
                .recv("job", &job_rx, Step::Job)
                .recv("stop", &stop_rx, |_| Step::Stop)
                .await
                .unwrap();
            match step {
                Step::Job(Some(value)) => done.push(value),
                Step::Job(None) | Step::Stop => break,
            }
        }
        done
    };

    let ((), done) = tokio::join!(producer, worker);
    assert_eq!(done, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn stop_message_interrupts_the_worker() {
    let (job_tx, job_rx) = channel::<u32>(2);
    let (stop_tx, stop_rx) = channel::<()>(1);

    stop_tx.try_send(()).unwrap();

    let (name, step) = Select::new()
        .recv("job", &job_rx, Step::Job)
        .recv("stop", &stop_rx, |_| Step::Stop)
        .await
        .unwrap();

    assert_eq!(name, "stop");
    assert!(matches!(step, Step::Stop));
    drop(job_tx);
}

#[tokio::test(start_paused = true)]
async fn aborted_timer_does_not_fire() {
    let (handle, signal) = abort_pair();
    let sleep = Abortable::new(tokio::time::sleep(Duration::from_secs(3600)), &signal);

    handle.abort();
    // The wrapped timer is dropped without ever completing.
    assert!(sleep.await.is_err());
}
