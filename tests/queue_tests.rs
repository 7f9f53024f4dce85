mod common;

use common::chunk;
use vox_stream::AudioFrameQueue;

#[test]
fn pop_batch_is_fifo_and_bounded() {
    let queue = AudioFrameQueue::new(512);
    for seq in 0..10 {
        queue.push(chunk(seq, 100));
    }

    let first = queue.pop_batch(4);
    assert_eq!(
        first.iter().map(|c| c.sequence).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    let second = queue.pop_batch(4);
    assert_eq!(
        second.iter().map(|c| c.sequence).collect::<Vec<_>>(),
        vec![4, 5, 6, 7]
    );

    // Asking for more than is buffered returns what is there.
    let rest = queue.pop_batch(100);
    assert_eq!(rest.len(), 2);
    assert!(queue.is_empty());
    assert!(queue.pop_batch(4).is_empty());
}

#[test]
fn drain_all_empties_the_queue() {
    let queue = AudioFrameQueue::new(512);
    for seq in 0..5 {
        queue.push(chunk(seq, 10));
    }

    let drained = queue.drain_all();
    assert_eq!(drained.len(), 5);
    assert_eq!(
        drained.iter().map(|c| c.sequence).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert!(queue.is_empty());
}

#[test]
fn requeue_front_preserves_order_ahead_of_new_pushes() {
    let queue = AudioFrameQueue::new(512);
    for seq in 0..6 {
        queue.push(chunk(seq, 10));
    }

    // Pump popped a batch, sent nothing, and a new chunk arrived meanwhile.
    let batch = queue.pop_batch(4);
    queue.push(chunk(6, 10));
    queue.requeue_front(batch);

    let order: Vec<u64> = queue.drain_all().iter().map(|c| c.sequence).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6]);
}

#[test]
fn push_never_fails_past_high_water() {
    // Growth is unbounded; the high-water mark only warns.
    let queue = AudioFrameQueue::new(2);
    for seq in 0..50 {
        queue.push(chunk(seq, 10));
    }
    assert_eq!(queue.len(), 50);
}
