//! wrapbench Example Suite
//!
//! Compares sorting strategies over several input sizes and shapes.
//!
//! Run with:
//!   cargo run --release --example sorting                 # all jobs
//!   cargo run --release --example sorting -- unstable     # jobs matching a regex
//!   WRAPBENCH_LOG=wrapbench=debug cargo run --example sorting
//!
//! A `wrapbench.toml` in the working directory (or a parent) is picked up
//! automatically. With `isolation = "process"` every job runs in a worker
//! re-executed from this binary.
//!
//! The summary is written to `target/wrapbench/sorting.json`; on the next run
//! it becomes the baseline the new results are compared against.

use std::hint::black_box;
use std::path::Path;
use wrapbench::prelude::*;
use wrapbench::{BenchmarkStatus, ChangeVerdict};

#[global_allocator]
static ALLOC: wrapbench::TrackingAllocator = wrapbench::TrackingAllocator;

struct Sorting {
    input: Vec<u64>,
}

#[wrapbench::suite(params(n = [1_000, 100_000], shape = ["random", "sorted", "reversed"]))]
impl Sorting {
    #[setup]
    fn generate(params: &ParamSet) -> Self {
        let n = params.int("n").unwrap_or(1_000) as u64;
        let input = match params.str("shape").unwrap_or("random") {
            "sorted" => (0..n).collect(),
            "reversed" => (0..n).rev().collect(),
            // xorshift, deterministic across runs
            _ => {
                let mut x = 0x9e3779b97f4a7c15u64;
                (0..n)
                    .map(|_| {
                        x ^= x << 13;
                        x ^= x >> 7;
                        x ^= x << 17;
                        x
                    })
                    .collect()
            }
        };
        Sorting { input }
    }

    /// `slice::sort`, the reference for the group
    #[bench(baseline, group = "sort")]
    fn stable(&mut self, b: &mut Bencher) {
        b.iter_with_setup(
            || self.input.clone(),
            |mut v| {
                v.sort();
                v
            },
        );
    }

    #[bench(group = "sort", tags = ["unstable"])]
    fn unstable(&mut self, b: &mut Bencher) {
        b.iter_with_setup(
            || self.input.clone(),
            |mut v| {
                v.sort_unstable();
                v
            },
        );
    }

    #[bench(group = "sort", tags = ["unstable", "key"])]
    fn unstable_by_key(&mut self, b: &mut Bencher) {
        b.iter_with_setup(
            || self.input.clone(),
            |mut v| {
                v.sort_unstable_by_key(|x| std::cmp::Reverse(*x));
                v
            },
        );
    }

    #[bench(group = "search", samples = 200, description = "binary search after sorting once")]
    fn search(&mut self, b: &mut Bencher) {
        let mut sorted = self.input.clone();
        sorted.sort_unstable();
        let needle = sorted[sorted.len() / 3];
        b.iter(|| black_box(&sorted).binary_search(&black_box(needle)));
    }

    #[bench(group = "collect", warmup = "200ms", measurement = "1s")]
    fn into_heap(&mut self, b: &mut Bencher) {
        b.iter(|| {
            let heap: std::collections::BinaryHeap<u64> = self.input.iter().copied().collect();
            heap.into_sorted_vec()
        });
    }
}

fn main() -> Result<(), RunError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = (!args.is_empty()).then_some(args);

    let result = BenchmarkRunner::run::<Sorting>(None, args)?;
    let summary = result.summary();

    println!("{} ({} jobs)", summary.title, summary.totals.total);
    for report in &summary.reports {
        match (&report.metrics, report.status) {
            (Some(m), _) => println!(
                "  {:<40} {:>12.1} ns ± {:>8.1}  ratio {}",
                report.job.id,
                m.mean_ns,
                m.error_ns,
                report
                    .ratio
                    .map(|r| format!("{r:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            (None, BenchmarkStatus::Skipped) => {}
            (None, status) => println!("  {:<40} {:?}", report.job.id, status),
        }
    }

    let path = Path::new("target/wrapbench/sorting.json");
    if path.exists() {
        let baseline = Summary::load_json(path)?;
        for change in summary.baseline_comparison(&baseline, 5.0) {
            if change.verdict != ChangeVerdict::Unchanged {
                println!(
                    "  {:?}: {} ({:+.1}%)",
                    change.verdict, change.full_id, change.change_pct
                );
            }
        }
    }
    summary.save_json(path)?;

    if summary.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
