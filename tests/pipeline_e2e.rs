//! End-to-end runs of the producer/consumer pipeline.
//!
//! Each scenario runs on a helper thread and is bounded by a deadline, so a
//! shutdown deadlock fails the test instead of hanging the suite.

use parking_lot::Mutex;
use sempipe::buffer::BoundedBuffer;
use sempipe::config::{Pacing, PipelineConfig, PipelineProfile};
use sempipe::pipeline::{Pipeline, PipelineReport, RandomWorkload, Workload};
use sempipe::sync::SemaphoreFlavor;
use sempipe::test_utils::init_test_logging;
use sempipe::{assert_with_log, test_complete, test_phase};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const FLAVORS: [SemaphoreFlavor; 2] = [SemaphoreFlavor::Blocking, SemaphoreFlavor::LockFree];
const DEADLINE: Duration = Duration::from_secs(30);

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Produced(usize),
    Consumed(usize),
}

/// Tags every item with its write order and records reads.
#[derive(Debug, Default)]
struct Recorder {
    next: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

impl Workload for Recorder {
    type Item = usize;

    fn produce(&self, _producer: usize, _slot: usize) -> usize {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.events.lock().push(Event::Produced(id));
        id
    }

    fn consume(&self, _consumer: usize, _slot: usize, item: usize) {
        self.events.lock().push(Event::Consumed(item));
    }
}

impl Recorder {
    fn consumed(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Consumed(id) => Some(*id),
                Event::Produced(_) => None,
            })
            .collect()
    }
}

fn testing(flavor: SemaphoreFlavor) -> PipelineConfig {
    PipelineConfig::from_profile(PipelineProfile::Testing).flavor(flavor)
}

/// Runs a pipeline on a helper thread and fails if it outlives `DEADLINE`.
fn run_bounded(config: PipelineConfig) -> (PipelineReport, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let (tx, rx) = mpsc::channel();
    let worker_recorder = Arc::clone(&recorder);
    let label = format!("{config:?}");
    thread::spawn(move || {
        let report = Pipeline::new(config, &*worker_recorder)
            .expect("valid config")
            .run()
            .expect("run");
        let _ = tx.send(report);
    });
    let report = rx
        .recv_timeout(DEADLINE)
        .unwrap_or_else(|_| panic!("pipeline did not shut down within {DEADLINE:?}: {label}"));
    (report, recorder)
}

#[test]
fn every_item_consumed_once_in_write_order() {
    init_test("every_item_consumed_once_in_write_order");
    for flavor in FLAVORS {
        for (capacity, producers, consumers) in [(1, 1, 1), (4, 2, 4), (16, 2, 4), (3, 5, 2)] {
            let config = testing(flavor)
                .capacity(capacity)
                .target(200)
                .workers(producers, consumers);
            let (report, recorder) = run_bounded(config);
            let consumed = recorder.consumed();
            let expected: Vec<usize> = (0..200).collect();
            assert_with_log!(
                consumed == expected,
                "consumed ids",
                (flavor, capacity, producers, consumers),
                &consumed[..consumed.len().min(16)]
            );
            assert_with_log!(report.consumed == 200, "consumed count", 200, report.consumed);
            assert_with_log!(
                report.in_flight() <= capacity,
                "left in buffer",
                capacity,
                report.in_flight()
            );
        }
    }
    test_complete!("every_item_consumed_once_in_write_order");
}

#[test]
fn capacity_one_alternates_strictly() {
    init_test("capacity_one_alternates_strictly");
    for flavor in FLAVORS {
        let config = testing(flavor).capacity(1).target(50).workers(1, 1);
        let (report, recorder) = run_bounded(config);
        let events = recorder.events.lock().clone();

        for pair in events.windows(2) {
            let alternates = !matches!(
                pair,
                [Event::Produced(_), Event::Produced(_)] | [Event::Consumed(_), Event::Consumed(_)]
            );
            assert_with_log!(alternates, "strict alternation", "P,C,P,C", pair);
        }
        assert_eq!(events.first(), Some(&Event::Produced(0)));
        assert_with_log!(report.consumed == 50, "consumed", 50, report.consumed);
    }
    test_complete!("capacity_one_alternates_strictly");
}

#[test]
fn producer_cannot_run_more_than_capacity_ahead() {
    init_test("producer_cannot_run_more_than_capacity_ahead");
    for flavor in FLAVORS {
        let buf = Arc::new(BoundedBuffer::new(4, flavor));
        let written = Arc::new(AtomicUsize::new(0));

        let producer = {
            let buf = Arc::clone(&buf);
            let written = Arc::clone(&written);
            thread::spawn(move || {
                for value in [10, 20, 30, 40, 50] {
                    buf.push(value).expect("open");
                    written.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        while written.load(Ordering::SeqCst) < 4 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(30));
        let ahead = written.load(Ordering::SeqCst);
        assert_with_log!(ahead == 4, "fifth push blocked", 4, (flavor, ahead));

        let mut read = vec![buf.pop().expect("open")];
        producer.join().expect("producer panicked");
        read.extend((0..4).filter_map(|_| buf.pop()));
        assert_with_log!(read == [10, 20, 30, 40, 50], "read order", [10, 20, 30, 40, 50], read);
    }
    test_complete!("producer_cannot_run_more_than_capacity_ahead");
}

#[test]
fn every_worker_announces_exit() {
    init_test("every_worker_announces_exit");
    for flavor in FLAVORS {
        let config = testing(flavor).capacity(8).target(40).workers(3, 4);
        let (report, _) = run_bounded(config);
        // Seven exits, one claimed by the coordinator.
        assert_with_log!(
            report.stale_quit_permits == 6,
            "unclaimed quit permits",
            6,
            report.stale_quit_permits
        );
    }
    test_complete!("every_worker_announces_exit");
}

#[test]
fn shuts_down_when_target_is_unreachable_quickly() {
    init_test("shuts_down_when_target_is_unreachable_quickly");
    // Consumers heavily outnumber producers; most of them sit in `full.wait`
    // when the target is hit and must be flooded out.
    for flavor in FLAVORS {
        let config = testing(flavor).capacity(2).target(10).workers(1, 12);
        let (report, recorder) = run_bounded(config);
        assert_eq!(report.consumed, 10);
        assert_eq!(recorder.consumed(), (0..10).collect::<Vec<_>>());
    }
    test_complete!("shuts_down_when_target_is_unreachable_quickly");
}

#[test]
fn paced_demo_layout_completes() {
    init_test("paced_demo_layout_completes");
    let pacing = Pacing {
        producer: Duration::from_millis(1),
        consumer_min: Duration::from_millis(1),
        consumer_max: Duration::from_millis(3),
    };
    let config = PipelineConfig::from_profile(PipelineProfile::Demo)
        .pacing(pacing)
        .seed(42);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let report = Pipeline::new(config, RandomWorkload::new(42))
            .expect("valid")
            .run()
            .expect("run");
        let _ = tx.send(report);
    });
    let report = rx.recv_timeout(DEADLINE).expect("demo layout shut down");
    assert_with_log!(report.consumed == 32, "consumed", 32, report.consumed);
    assert_with_log!(report.in_flight() <= 16, "left in buffer", 16, report.in_flight());
    test_complete!("paced_demo_layout_completes");
}

/// Set in the child process that runs the panicking pipeline.
const PANIC_CHILD_ENV: &str = "SEMPIPE_TEST_PANIC_CHILD";

/// Panics on the third item, inside the producer critical section.
#[derive(Debug, Default)]
struct PanicsOnThird {
    next: AtomicUsize,
}

impl Workload for PanicsOnThird {
    type Item = usize;

    fn produce(&self, _producer: usize, _slot: usize) -> usize {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(id < 2, "payload source failed");
        id
    }

    fn consume(&self, _consumer: usize, _slot: usize, _item: usize) {}
}

#[test]
fn worker_panic_aborts_the_process() {
    if std::env::var_os(PANIC_CHILD_ENV).is_some() {
        let config = testing(SemaphoreFlavor::Blocking).target(10).workers(1, 1);
        let outcome = Pipeline::new(config, PanicsOnThird::default())
            .expect("valid config")
            .run();
        // Reaching this line means the panic was swallowed; exit cleanly so
        // the parent sees a success status and fails.
        println!("run returned: {outcome:?}");
        return;
    }

    init_test("worker_panic_aborts_the_process");
    let exe = std::env::current_exe().expect("test binary path");
    let status = Command::new(exe)
        .args(["worker_panic_aborts_the_process", "--exact", "--test-threads=1"])
        .env(PANIC_CHILD_ENV, "1")
        .status()
        .expect("spawn child test process");
    assert_with_log!(!status.success(), "child aborted", "abort", status);

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        const SIGABRT: i32 = 6;
        assert_with_log!(
            status.signal() == Some(SIGABRT),
            "terminated by SIGABRT",
            Some(SIGABRT),
            status.signal()
        );
    }
    test_complete!("worker_panic_aborts_the_process");
}
