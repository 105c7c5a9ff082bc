//! Measures work that completes on another thread, using a deferred test body.
//!
//! The test body hands its `Deferred` handle to a worker thread, which resolves it once the
//! work is done. The benchmark measures the time from dispatch until that signal.
//!
//! Run with: `cargo run --example ops_bench_deferred`.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ops_bench::{Benchmark, Deferred, EventKind, Options};

fn main() {
    let (jobs, queue) = mpsc::channel::<Deferred>();

    // A long-lived worker, so that thread creation is not part of the measurement.
    let worker = thread::spawn(move || {
        for deferred in queue {
            let checksum: u64 = (0..50_000_u64).map(std::hint::black_box).sum();
            std::hint::black_box(checksum);
            deferred.resolve();
        }
    });

    let mut benchmark = Benchmark::builder()
        .options(
            Options::default()
                .with_name("worker round trip")
                .with_max_time(Duration::from_secs(1)),
        )
        .deferred_test(move |deferred| {
            // A send only fails once the worker is gone, which abandons the cycle.
            drop(jobs.send(deferred));
        })
        .build()
        .expect("valid benchmark");

    benchmark.on(EventKind::Cycle, |_, benchmark| {
        println!(
            "cycle {}: {} iterations in {:.3} ms",
            benchmark.cycles(),
            benchmark.count(),
            benchmark.times().cycle() * 1000.0
        );
        true
    });

    benchmark.run();

    println!();
    println!("{benchmark}");

    // Dropping the benchmark drops the test body and with it the job sender.
    drop(benchmark);
    worker.join().expect("worker thread panicked");
}
