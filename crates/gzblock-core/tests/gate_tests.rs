use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gzblock_core::{GzblockError, OrderedWriteGate};

#[test]
fn writes_land_in_sequence_order() {
    let gate = OrderedWriteGate::new(Vec::new());
    thread::scope(|scope| {
        for sequence in (0..16u64).rev() {
            let gate = &gate;
            scope.spawn(move || {
                thread::sleep(Duration::from_millis((sequence * 7) % 5));
                let chunk = [sequence as u8; 3];
                assert!(gate.write(sequence, &chunk[..2], false).unwrap());
                assert!(gate.write(sequence, &chunk[2..], true).unwrap());
            });
        }
    });

    let (output, summary) = gate.into_inner();
    let expected: Vec<u8> = (0..16u8).flat_map(|sequence| [sequence; 3]).collect();
    assert_eq!(output, expected);
    assert_eq!(summary.committed, 16);
    assert_eq!(summary.bytes_written, 48);
    assert!(!summary.failed);
}

#[test]
fn turn_allows_several_sub_writes() {
    let gate = OrderedWriteGate::new(Vec::new());
    {
        let mut turn = gate.acquire_turn(0).unwrap().expect("gate open");
        assert_eq!(turn.sequence(), 0);
        turn.write_chunk(b"ab").unwrap();
        turn.write_chunk(b"cd").unwrap();
        turn.commit();
    }
    assert_eq!(gate.next_sequence(), 1);

    // An uncommitted turn keeps the sequence open.
    {
        let mut turn = gate.acquire_turn(1).unwrap().expect("gate open");
        turn.write_chunk(b"e").unwrap();
    }
    assert!(gate.write(1, b"f", true).unwrap());
    assert_eq!(gate.into_inner().0, b"abcdef");
}

#[test]
fn duplicate_sequence_is_rejected() {
    let gate = OrderedWriteGate::new(Vec::new());
    assert!(gate.write(0, b"x", true).unwrap());
    assert!(matches!(
        gate.write(0, b"y", true),
        Err(GzblockError::InvalidBlockId { expected: 1, actual: 0 })
    ));
}

#[test]
fn failure_releases_waiters_without_writing() {
    let gate = OrderedWriteGate::new(Vec::new());
    thread::scope(|scope| {
        let waiters: Vec<_> = (1..5u64)
            .map(|sequence| {
                let gate = &gate;
                scope.spawn(move || gate.write(sequence, b"late", true))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        gate.fail();
        for waiter in waiters {
            assert!(!waiter.join().unwrap().unwrap());
        }
    });

    assert!(gate.is_failed());
    assert!(!gate.write(0, b"never", true).unwrap());
    let (output, summary) = gate.into_inner();
    assert!(output.is_empty());
    assert!(summary.failed);
}

#[test]
fn progress_ticks_follow_commits() {
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ticks);
    let gate = OrderedWriteGate::with_progress(
        Vec::new(),
        Arc::new(move |completed: u64, total: Option<u64>| {
            sink.lock().unwrap().push((completed, total));
        }),
    );

    assert!(gate.write(0, b"a", true).unwrap());
    gate.set_total(2);
    assert!(gate.write(1, b"b", false).unwrap());
    assert!(gate.write(1, b"c", true).unwrap());

    assert_eq!(*ticks.lock().unwrap(), vec![(1, None), (2, Some(2))]);
}
