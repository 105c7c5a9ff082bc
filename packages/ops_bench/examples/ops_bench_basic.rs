//! Compares a few ways of building a string with a suite of benchmarks.
//!
//! This example shows how the main `ops_bench` types work together:
//! - `Benchmark`: measures the throughput of one test body
//! - `Suite`: runs benchmarks one after another and re-emits their events
//! - `Filter`: picks out the fastest benchmarks, ties included
//!
//! Run with: `cargo run --example ops_bench_basic`.

use std::fmt::Write;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use ops_bench::{Benchmark, Calibration, EventKind, Filter, Options, Suite};

const WORDS: [&str; 8] = [
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
];

fn main() {
    // One calibration for all benchmarks, so they all measure with the same timer.
    let calibration = Arc::new(Calibration::measure().expect("no usable timer on this platform"));
    println!(
        "Timer: {:?}, resolution {:?}, minimum cycle time {:?}",
        calibration.unit(),
        calibration.resolution(),
        calibration.default_min_time()
    );
    println!();

    let options = Options::default().with_max_time(Duration::from_millis(500));

    let mut suite = Suite::new("string building");
    suite
        .add(
            Benchmark::builder()
                .options(options.clone().with_name("concat"))
                .test(|| {
                    black_box(black_box(WORDS).concat());
                })
                .calibration(Arc::clone(&calibration))
                .build()
                .expect("valid benchmark"),
        )
        .add(
            Benchmark::builder()
                .options(options.clone().with_name("push_str"))
                .test(|| {
                    let mut text = String::new();
                    for word in black_box(WORDS) {
                        text.push_str(word);
                    }
                    black_box(text);
                })
                .calibration(Arc::clone(&calibration))
                .build()
                .expect("valid benchmark"),
        )
        .add(
            Benchmark::builder()
                .options(options.with_name("write!"))
                .test(|| {
                    let mut text = String::new();
                    for word in black_box(WORDS) {
                        write!(text, "{word}").expect("writing to a String cannot fail");
                    }
                    black_box(text);
                })
                .calibration(Arc::clone(&calibration))
                .build()
                .expect("valid benchmark"),
        );

    suite.on(EventKind::Complete, |_, benchmark| {
        println!("{benchmark}");
        true
    });

    suite.run();

    println!();
    let fastest: Vec<String> = suite
        .filter(Filter::Fastest)
        .iter()
        .map(|benchmark| benchmark.display_name())
        .collect();
    println!("Fastest: {}", ops_bench::join(fastest, ", "));
}
