//! Table output shared by `stream` and `fetch`.

use shardstream_core::StreamReport;

pub fn print_report(report: &StreamReport) {
    println!("{:<6} {:<8} {:<10} {}", "SHARD", "BATCHES", "SAMPLES", "URI");
    for s in &report.delivered {
        println!("{:<6} {:<8} {:<10} {}", s.index, s.batches, s.samples, s.uri);
    }
    for f in &report.failed {
        println!("{:<6} {:<8} {:<10} {}  ({})", f.index, "-", "-", f.uri, f.error);
    }
    println!(
        "{} of {} shard(s) delivered, {} failed, {} skipped; {} batch(es), {} sample(s)",
        report.delivered.len(),
        report.shards_total,
        report.failed.len(),
        report.skipped(),
        report.batches(),
        report.samples()
    );
}
