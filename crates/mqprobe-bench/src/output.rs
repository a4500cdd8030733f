//! Result rendering and persistence: the live console table, the final
//! result block, and the CSV/JSON files other tooling consumes.
//!
//! Column layouts of the CSV files match the historical output
//! (`timestamp,sent,rate` and `timestamp,received,rate,avg_latency`).

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use mqprobe_core::stats::LiveView;
use mqprobe_core::{MqProbeError, Result};

use crate::config::{BenchConfig, Mode};
use crate::runner::RunReport;

pub fn print_table_header(mode: Mode) {
    println!();
    match mode {
        Mode::Both => {
            println!("+--------+-------------+---------------+--------+-------------+---------------+-------------+");
            println!("|            SENDER                    |                        RECEIVER                    |");
            println!("+--------+-------------+---------------+--------+-------------+---------------+-------------+");
            println!("| Time[s]| Message Cnt | Rate (m/s)    | Time(s)| Message Cnt | Rate (m/s)    |  Latency(ms)|");
            println!("+--------+-------------+---------------+--------+-------------+---------------+-------------+");
        }
        Mode::Sender => {
            println!("+--------+-------------+---------------+");
            println!("|            SENDER                    |");
            println!("+--------+-------------+---------------+");
            println!("| Time[s]| Message Cnt | Rate (m/s)    |");
            println!("+--------+-------------+---------------+");
        }
        Mode::Receiver => {
            println!("+--------+-------------+---------------+-------------+");
            println!("|                        RECEIVER                    |");
            println!("+--------+-------------+---------------+-------------+");
            println!("| Time(s)| Message Cnt | Rate (m/s)    |  Latency(ms)|");
            println!("+--------+-------------+---------------+-------------+");
        }
    }
}

pub fn print_table_footer(mode: Mode) {
    match mode {
        Mode::Both => println!("+--------+-------------+---------------+--------+-------------+---------------+-------------+"),
        Mode::Sender => println!("+--------+-------------+---------------+"),
        Mode::Receiver => println!("+--------+-------------+---------------+-------------+"),
    }
}

/// One table row per snapshot tick.
pub fn print_live_row(mode: Mode, view: &LiveView) {
    let s_time = format!("{:>6.1}", view.sender_time);
    let s_count = format!("{:>11}", view.sender_count);
    let s_rate = format!("{:>13.0}", view.sender_rate);
    let r_time = format!("{:>6.1}", view.receiver_time);
    let r_count = format!("{:>11}", view.receiver_count);
    let r_rate = format!("{:>13.0}", view.receiver_rate);
    let latency = format!("{:>11.2}", view.avg_latency);

    match mode {
        Mode::Both => println!(
            "| {s_time} | {s_count} | {s_rate} | {r_time} | {r_count} | {r_rate} | {latency} | "
        ),
        Mode::Sender => println!("| {s_time} | {s_count} | {s_rate} | "),
        Mode::Receiver => println!("| {r_time} | {r_count} | {r_rate} | {latency} | "),
    }
}

fn pad(label: &str) -> String {
    format!("{label:.<50}")
}

/// Final result block: configuration echo, per-side metrics, and the
/// latency/signature/decryption statistics.
pub fn print_report(cfg: &BenchConfig, report: &RunReport) {
    println!("\n--- Results ---");

    println!("\nConfiguration:");
    println!("{} {}", pad("Host:"), cfg.host);
    println!("{} {}", pad("Port:"), cfg.port());
    println!(
        "{} {}",
        pad("TLS:"),
        if cfg.transport.tls { "enabled" } else { "disabled" }
    );
    println!("{} {}", pad("Mode:"), cfg.mode.as_str());
    println!("{} {}", pad("Queue:"), cfg.address);
    println!(
        "{} {}",
        pad("Message Signing:"),
        if cfg.signing.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "{} {}",
        pad("Message Encryption:"),
        if cfg.encryption.enabled { "enabled" } else { "disabled" }
    );
    println!("{} {} bytes", pad("Body Payload Size:"), report.summary.payload_size);
    println!("{} {} ms", pad("Connection opened:"), report.connection_ready_ms);

    if let Some(producer) = &report.producer {
        println!("\nSender:");
        println!("{} {} ms", pad("Sender ready:"), producer.sender_ready_ms);
        println!("{} {}", pad("Sent:"), producer.sent_count);
        println!("{} {:.0} msg / sec", pad("Rate:"), producer.sent_rate);
        println!("{} {} bytes", pad("Per Message Size:"), producer.per_message_size);
        if producer.rejected > 0 || producer.released > 0 {
            println!("{} {}", pad("Rejected:"), producer.rejected);
            println!("{} {}", pad("Released:"), producer.released);
        }
    }

    if let Some(consumer) = &report.consumer {
        println!("\nReceiver:");
        println!("{} {} ms", pad("Receiver ready:"), consumer.receiver_ready_ms);
        println!("{} {}", pad("Received:"), consumer.received_count);
        println!("{} {:.2} seconds", pad("Duration:"), consumer.duration_secs);
        println!("{} {} bytes", pad("Per Message Size:"), consumer.per_message_size);
        if let Some(throughput) = report.throughput {
            println!("{} {throughput:.2} msg / sec", pad("Throughput:"));
        }

        println!("\nLatency Statistics:");
        println!("{} {:.2} ms", pad("Average:"), report.summary.latency.avg);
        println!("{} {:.2} ms", pad("Min:"), report.summary.latency.min);
        println!("{} {:.2} ms", pad("Max:"), report.summary.latency.max);
        println!("{} {:.2} ms", pad("95th percentile:"), report.summary.latency.p95);

        if cfg.signing.enabled {
            println!("\nSignature Verification:");
            println!("{} {:.3} ms", pad("Average:"), report.summary.signature.avg);
            println!("{} {:.3} ms", pad("Min:"), report.summary.signature.min);
            println!("{} {:.3} ms", pad("Max:"), report.summary.signature.max);
            println!("{} {}", pad("Invalid signatures:"), consumer.invalid_signatures);
        }
        if cfg.encryption.enabled {
            println!("\nDecryption:");
            println!("{} {:.3} ms", pad("Average:"), report.summary.decryption.avg);
            println!("{} {:.3} ms", pad("Min:"), report.summary.decryption.min);
            println!("{} {:.3} ms", pad("Max:"), report.summary.decryption.max);
        }
    }

    if report.protocol_warnings > 0 {
        println!(
            "\nWARNING: {} message(s) were missing expected metadata; results may be \
             skewed. Ensure the queue is empty before running the test.",
            report.protocol_warnings
        );
    }
}

/// Write the snapshot CSVs and the JSON summaries into `dir`.
pub fn persist(report: &RunReport, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| MqProbeError::Internal(format!("create {}: {e}", dir.display())))?;

    let mut sender_csv = String::from("timestamp,sent,rate\n");
    for snapshot in &report.producer_snapshots {
        let _ = writeln!(
            sender_csv,
            "{},{},{}",
            snapshot.timestamp, snapshot.sent, snapshot.rate
        );
    }
    write_file(dir, "sender_snapshots.csv", &sender_csv)?;

    let mut receiver_csv = String::from("timestamp,received,rate,avg_latency\n");
    for snapshot in &report.consumer_snapshots {
        let _ = writeln!(
            receiver_csv,
            "{},{},{},{}",
            snapshot.timestamp, snapshot.received, snapshot.rate, snapshot.avg_latency
        );
    }
    write_file(dir, "receiver_snapshots.csv", &receiver_csv)?;

    let summary = serde_json::to_string_pretty(&report.summary)
        .map_err(|e| MqProbeError::Internal(format!("serialize summary: {e}")))?;
    write_file(dir, "summary_metrics.json", &summary)?;

    let full = serde_json::to_string_pretty(report)
        .map_err(|e| MqProbeError::Internal(format!("serialize report: {e}")))?;
    write_file(dir, "full_metrics.json", &full)?;

    info!(path = %dir.display(), "results saved");
    Ok(())
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents)
        .map_err(|e| MqProbeError::Internal(format!("write {}: {e}", path.display())))
}
