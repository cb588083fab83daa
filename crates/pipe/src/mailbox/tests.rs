use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::error::TaskError;
use crate::item::PostThunk;

fn task(f: impl FnOnce() + Send + 'static) -> Item {
	Item::task(PostThunk::new(
		(),
		move |_: &mut ()| {
			f();
			Ok(())
		},
		None::<fn(())>,
		None,
	))
}

fn failing(message: &'static str) -> Item {
	Item::task(PostThunk::new((), move |_: &mut ()| Err(TaskError::new(message)), None::<fn(())>, None))
}

/// Posted task whose work and cleanup each bump their own counter.
fn tracked(ran: &Arc<AtomicUsize>, cleaned: &Arc<AtomicUsize>) -> Item {
	let (ran, cleaned) = (Arc::clone(ran), Arc::clone(cleaned));
	Item::task(PostThunk::new(
		(),
		move |_: &mut ()| {
			ran.fetch_add(1, Ordering::SeqCst);
			Ok(())
		},
		Some(move |()| {
			cleaned.fetch_add(1, Ordering::SeqCst);
		}),
		None,
	))
}

fn recorder() -> Arc<Mutex<Vec<u32>>> {
	Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> Item {
	let log = Arc::clone(log);
	task(move || log.lock().push(value))
}

// ── Ordering ──

proptest! {
	#[test]
	fn single_producer_order_is_preserved(values in proptest::collection::vec(any::<u32>(), 0..64)) {
		let mailbox = Mailbox::new();
		let log = recorder();
		for &value in &values {
			mailbox.enqueue(record(&log, value)).unwrap();
		}
		let outcome = mailbox.dequeue(Wait::Never).unwrap();
		prop_assert_eq!(outcome, PumpOutcome::Processed(values.len()));
		prop_assert_eq!(&*log.lock(), &values);
	}
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
	const PRODUCERS: u32 = 6;
	const PER_PRODUCER: u32 = 300;

	let mailbox = Mailbox::new();
	let log = recorder();
	let barrier = Arc::new(Barrier::new(PRODUCERS as usize));

	let handles: Vec<_> = (0..PRODUCERS)
		.map(|producer| {
			let mailbox = mailbox.clone();
			let log = Arc::clone(&log);
			let barrier = Arc::clone(&barrier);
			std::thread::spawn(move || {
				barrier.wait();
				for seq in 0..PER_PRODUCER {
					mailbox.enqueue(record(&log, producer * PER_PRODUCER + seq)).unwrap();
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed((PRODUCERS * PER_PRODUCER) as usize));
	let seen = log.lock().clone();
	for producer in 0..PRODUCERS {
		let mine: Vec<u32> = seen.iter().copied().filter(|v| v / PER_PRODUCER == producer).collect();
		let expected: Vec<u32> = (0..PER_PRODUCER).map(|seq| producer * PER_PRODUCER + seq).collect();
		assert_eq!(mine, expected, "producer {producer} reordered");
	}
}

// ── Waiting ──

#[test]
fn non_blocking_pump_on_empty_mailbox_processes_nothing() {
	let mailbox = Mailbox::new();
	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed(0));
}

#[test]
fn timed_pump_on_empty_mailbox_times_out() {
	let mailbox = Mailbox::new();
	let outcome = mailbox.dequeue(Wait::For(Duration::from_millis(20))).unwrap();
	assert_eq!(outcome, PumpOutcome::TimedOut);
}

#[test]
fn blocking_pump_wakes_on_enqueue_from_other_thread() {
	let mailbox = Mailbox::new();
	let log = recorder();
	let producer = {
		let mailbox = mailbox.clone();
		let log = Arc::clone(&log);
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(10));
			mailbox.enqueue(record(&log, 9)).unwrap();
		})
	};
	let outcome = mailbox.dequeue(Wait::Forever).unwrap();
	producer.join().unwrap();
	assert_eq!(outcome, PumpOutcome::Processed(1));
	assert_eq!(*log.lock(), [9]);
}

#[test]
fn pump_runs_only_the_batch_present_at_wake() {
	let mailbox = Mailbox::new();
	let log = recorder();
	let inner = {
		let mailbox = mailbox.clone();
		let log = Arc::clone(&log);
		task(move || {
			log.lock().push(1);
			mailbox.enqueue(record(&log, 2)).unwrap();
		})
	};
	mailbox.enqueue(inner).unwrap();

	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed(1));
	assert_eq!(mailbox.len(), 1);
	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed(1));
	assert_eq!(*log.lock(), [1, 2]);
}

// ── Failures ──

#[test]
fn failing_task_stops_pump_and_keeps_remaining_items() {
	let mailbox = Mailbox::new();
	let log = recorder();
	mailbox.enqueue(record(&log, 1)).unwrap();
	mailbox.enqueue(failing("bad frame")).unwrap();
	mailbox.enqueue(record(&log, 3)).unwrap();

	let err = mailbox.dequeue(Wait::Never).unwrap_err();
	assert_eq!(err, PipeError::Task(TaskError::new("bad frame")));
	assert_eq!(*log.lock(), [1]);
	assert_eq!(mailbox.len(), 1);

	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed(1));
	assert_eq!(*log.lock(), [1, 3]);
}

#[test]
fn stale_reply_is_discarded_by_plain_pump() {
	let mailbox = Mailbox::new();
	mailbox.enqueue(Item::Reply(CallToken::next())).unwrap();
	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Processed(0));
	assert!(mailbox.is_empty());
}

// ── Shutdown ──

#[test]
fn shutdown_runs_work_ahead_and_discards_work_behind() {
	let mailbox = Mailbox::new();
	let ran = Arc::new(AtomicUsize::new(0));
	let cleaned = Arc::new(AtomicUsize::new(0));
	mailbox.enqueue(tracked(&ran, &cleaned)).unwrap();
	mailbox.close().unwrap();
	mailbox.enqueue(tracked(&ran, &cleaned)).unwrap();
	assert!(mailbox.is_closing());
	assert!(!mailbox.is_closed());

	assert_eq!(mailbox.dequeue(Wait::Forever).unwrap(), PumpOutcome::Shutdown { processed: 1 });
	assert!(mailbox.is_closed());
	assert_eq!(ran.load(Ordering::SeqCst), 1);
	assert_eq!(cleaned.load(Ordering::SeqCst), 2);
	assert!(mailbox.is_empty());
}

#[test]
fn repeated_close_keeps_one_sentinel() {
	let mailbox = Mailbox::new();
	let log = recorder();
	mailbox.close().unwrap();
	mailbox.close().unwrap();
	assert_eq!(mailbox.len(), 1);

	mailbox.enqueue(record(&log, 1)).unwrap();
	mailbox.close().unwrap();
	assert_eq!(mailbox.len(), 2);
	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Shutdown { processed: 0 });
	assert!(log.lock().is_empty());
}

#[test]
fn closed_mailbox_rejects_work_and_runs_its_cleanup() {
	let mailbox = Mailbox::new();
	mailbox.close().unwrap();
	assert!(mailbox.dequeue(Wait::Never).unwrap().is_shutdown());

	let ran = Arc::new(AtomicUsize::new(0));
	let cleaned = Arc::new(AtomicUsize::new(0));
	assert_eq!(mailbox.enqueue(tracked(&ran, &cleaned)), Err(PipeError::Closed));
	assert_eq!(ran.load(Ordering::SeqCst), 0);
	assert_eq!(cleaned.load(Ordering::SeqCst), 1);

	assert_eq!(mailbox.close(), Err(PipeError::Closed));
	assert_eq!(mailbox.dequeue(Wait::Forever).unwrap(), PumpOutcome::Shutdown { processed: 0 });
}

#[test]
fn blocked_pump_observes_close_from_other_thread() {
	let mailbox = Mailbox::new();
	let closer = {
		let mailbox = mailbox.clone();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(10));
			mailbox.close().unwrap();
		})
	};
	assert_eq!(mailbox.dequeue(Wait::Forever).unwrap(), PumpOutcome::Shutdown { processed: 0 });
	closer.join().unwrap();
}

#[test]
fn abort_discards_everything_and_wakes_waiters() {
	let mailbox = Mailbox::new();
	let ran = Arc::new(AtomicUsize::new(0));
	let cleaned = Arc::new(AtomicUsize::new(0));
	for _ in 0..3 {
		mailbox.enqueue(tracked(&ran, &cleaned)).unwrap();
	}
	assert_eq!(mailbox.abort(), 3);
	assert_eq!(ran.load(Ordering::SeqCst), 0);
	assert_eq!(cleaned.load(Ordering::SeqCst), 3);
	assert!(mailbox.is_closed());
	assert_eq!(mailbox.dequeue(Wait::Forever).unwrap(), PumpOutcome::Shutdown { processed: 0 });
}

#[test]
fn dropping_last_handle_releases_queued_work() {
	let ran = Arc::new(AtomicUsize::new(0));
	let cleaned = Arc::new(AtomicUsize::new(0));
	let mailbox = Mailbox::new();
	mailbox.enqueue(tracked(&ran, &cleaned)).unwrap();
	drop(mailbox);
	assert_eq!(ran.load(Ordering::SeqCst), 0);
	assert_eq!(cleaned.load(Ordering::SeqCst), 1);
}

// ── Drain ──

#[test]
fn drain_stops_at_sentinel_and_leaves_it_queued() {
	let mailbox = Mailbox::new();
	let log = recorder();
	mailbox.enqueue(record(&log, 1)).unwrap();
	mailbox.enqueue(record(&log, 2)).unwrap();
	mailbox.close().unwrap();
	mailbox.enqueue(record(&log, 3)).unwrap();

	let report = mailbox.drain(DrainBudget::UNLIMITED).unwrap();
	assert_eq!(
		report,
		DrainReport {
			processed: 2,
			pending: 2,
			shutdown: true,
			budget_exhausted: false,
		}
	);
	assert!(!mailbox.is_closed());

	assert_eq!(mailbox.dequeue(Wait::Never).unwrap(), PumpOutcome::Shutdown { processed: 0 });
	assert_eq!(*log.lock(), [1, 2]);
}

#[test]
fn drain_respects_item_budget() {
	let mailbox = Mailbox::new();
	let log = recorder();
	for value in 0..5 {
		mailbox.enqueue(record(&log, value)).unwrap();
	}
	let budget = DrainBudget {
		max_items: 2,
		duration: Duration::from_secs(5),
	};
	let report = mailbox.drain(budget).unwrap();
	assert_eq!(report.processed, 2);
	assert_eq!(report.pending, 3);
	assert!(report.budget_exhausted);
	assert!(!report.shutdown);
}

#[test]
fn drain_keeps_going_past_the_initial_batch() {
	let mailbox = Mailbox::new();
	let log = recorder();
	let chained = {
		let mailbox = mailbox.clone();
		let log = Arc::clone(&log);
		task(move || {
			log.lock().push(1);
			mailbox.enqueue(record(&log, 2)).unwrap();
		})
	};
	mailbox.enqueue(chained).unwrap();

	let report = mailbox.drain(DrainBudget::UNLIMITED).unwrap();
	assert_eq!(report.processed, 2);
	assert_eq!(report.pending, 0);
	assert_eq!(*log.lock(), [1, 2]);
}

#[test]
fn drain_on_closed_mailbox_reports_shutdown() {
	let mailbox = Mailbox::new();
	mailbox.abort();
	let report = mailbox.drain(DrainBudget::default()).unwrap();
	assert!(report.shutdown);
	assert_eq!(report.processed, 0);
}
