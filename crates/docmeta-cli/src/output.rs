use std::io::Write;
use std::path::Path;
use std::time::Duration;

use docmeta_core::{ConfigBag, OutputRecord, StageConfig, StageReport};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", sep)?;
    }
    Ok(())
}

/// Print the merged run report.
pub fn print_summary(
    w: &mut dyn Write,
    report: &StageReport,
    output_dir: &Path,
    elapsed: Duration,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    heading(w, "SUMMARY", color)?;

    writeln!(w, "  Records processed: {}", report.processed)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Extracted:".green(), report.extracted)?;
    } else {
        writeln!(w, "  Extracted: {}", report.extracted)?;
    }
    if report.demoted > 0 {
        let line = format!("Demoted to faults: {}", report.demoted);
        if color.enabled() {
            writeln!(w, "  {}", line.red())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
    }
    if report.slow > 0 {
        let line = format!("Over processing-time threshold: {}", report.slow);
        if color.enabled() {
            writeln!(w, "  {}", line.yellow())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
    }
    if report.skipped + report.oversized > 0 {
        let line = format!(
            "Skipped: {} (excluded: {}, oversized: {})",
            report.skipped + report.oversized,
            report.skipped,
            report.oversized
        );
        if color.enabled() {
            writeln!(w, "  {}", line.dimmed())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
    }
    writeln!(
        w,
        "  Written: {} metadata, {} fault records",
        report.meta_records(),
        report.fault_records()
    )?;
    if report.cancelled {
        let line = "Run was cancelled before all records were processed";
        if color.enabled() {
            writeln!(w, "  {}", line.yellow().bold())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
    }
    writeln!(w, "  Output: {}", output_dir.display())?;
    writeln!(w, "  Elapsed: {:.1}s", elapsed.as_secs_f64())?;
    Ok(())
}

/// Print the raw bag and the stage configuration it resolves to.
pub fn print_config(
    w: &mut dyn Write,
    bag: &ConfigBag,
    config: &StageConfig,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "CONFIG", color)?;
    for (key, value) in bag.iter() {
        if color.enabled() {
            writeln!(w, "  {} = {:?}", key.cyan(), value)?;
        } else {
            writeln!(w, "  {} = {:?}", key, value)?;
        }
    }

    writeln!(w)?;
    heading(w, "STAGE", color)?;
    writeln!(w, "  Metadata output: {}", config.named_output_meta())?;
    writeln!(w, "  Fault output: {}", config.named_output_fault())?;

    let mut excluded: Vec<&str> = config.excluded_ids().iter().map(String::as_str).collect();
    excluded.sort_unstable();
    writeln!(
        w,
        "  Excluded ids: {}",
        if excluded.is_empty() {
            "(none)".to_string()
        } else {
            excluded.join(", ")
        }
    )?;
    writeln!(
        w,
        "  Max file size: {}",
        config
            .max_file_size_kb()
            .map_or("unbounded".to_string(), |kb| format!("{kb} KB"))
    )?;
    writeln!(
        w,
        "  Processing-time threshold: {}",
        config
            .processing_time_threshold_ms()
            .map_or("unbounded".to_string(), |ms| format!("{ms} ms"))
    )?;
    writeln!(
        w,
        "  Analysis errors critical: {}",
        config.analysis_exception_critical()
    )?;
    writeln!(w, "  Other errors critical: {}", config.other_exception_critical())?;
    writeln!(w, "  Progress log interval: {}", config.progress_log_interval())?;
    Ok(())
}

/// Print captured sink records as pretty JSON, grouped by sink name.
pub fn print_records(
    w: &mut dyn Write,
    records: &[(String, OutputRecord)],
    color: ColorMode,
) -> anyhow::Result<()> {
    for (name, record) in records {
        let label = format!("[{name}]");
        if color.enabled() {
            match record {
                OutputRecord::Meta(_) => writeln!(w, "{}", label.bold().green())?,
                OutputRecord::Fault(_) => writeln!(w, "{}", label.bold().red())?,
            }
        } else {
            writeln!(w, "{}", label)?;
        }
        writeln!(w, "{}", serde_json::to_string_pretty(record)?)?;
    }
    Ok(())
}
