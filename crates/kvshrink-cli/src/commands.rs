use std::fs;

use anyhow::Context;
use colored::Colorize;
use kvshrink_core::{
    CompactConfig, CompactReport, DangerZone, SurveyReport, VerifyReport, WalkStats,
};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Compact(args) => cmd_compact(args, cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
        Command::Stats(args) => cmd_stats(args, cli.format),
    }
}

/// Build the configuration from an optional TOML file plus flag overrides.
fn load_config(args: &ConfigArgs) -> anyhow::Result<CompactConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            CompactConfig::from_toml_str(&text)?
        }
        None => CompactConfig::default(),
    };
    if let Some(ms) = args.timeout_ms {
        config.open_timeout_ms = ms;
    }
    Ok(config)
}

fn cmd_compact(args: CompactArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    if args.yes_i_understand {
        config.danger_zone = DangerZone::Enabled;
    }

    let report = kvshrink_core::compact(&args.old, &args.new, &config)?;
    let check = if args.verify {
        Some(kvshrink_core::verify(&args.old, &args.new, &config)?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "compact": report,
                "verify": check,
            }))?);
        }
        OutputFormat::Text => {
            println!(
                "{} Compacted {} → {}",
                "✓".green().bold(),
                args.old.display().to_string().bold(),
                args.new.display().to_string().bold()
            );
            print_compact(&report);
            if let Some(check) = &check {
                print_verify(check);
            }
        }
    }

    if let Some(check) = check {
        if !check.is_clean() {
            anyhow::bail!("verification of {} failed", args.new.display());
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let report = kvshrink_core::verify(&args.old, &args.new, &config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_verify(&report),
    }
    if !report.is_clean() {
        anyhow::bail!("{} does not match {}", args.new.display(), args.old.display());
    }
    Ok(())
}

fn cmd_stats(args: StatsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let report = kvshrink_core::survey(&args.path, &config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_survey(&args.path.display().to_string(), &report),
    }
    Ok(())
}

fn print_compact(report: &CompactReport) {
    println!(
        "  Entries: {} copied, {} empty skipped",
        report.stats.entries.to_string().bold(),
        report.stats.skipped_empty
    );
    println!("  Containers: {}", report.stats.containers);
    println!(
        "  Size: {} → {} ({} reclaimed, {:.1}%)",
        human_bytes(report.source_bytes),
        human_bytes(report.destination_bytes).green(),
        human_bytes(report.reclaimed_bytes()),
        report.ratio() * 100.0
    );
}

fn print_verify(report: &VerifyReport) {
    if report.is_clean() {
        println!(
            "{} {} entries verified",
            "✓".green().bold(),
            report.checked.to_string().bold()
        );
        return;
    }
    println!(
        "{} {} entries checked: {} missing, {} mismatched, {} unexpected",
        "✗".red().bold(),
        report.checked,
        report.missing.to_string().red(),
        report.mismatched.to_string().red(),
        report.unexpected.to_string().yellow()
    );
    for path in &report.missing_paths {
        println!("  {} {}", "missing:".red(), path);
    }
    for path in &report.mismatched_paths {
        println!("  {} {}", "differs:".yellow(), path);
    }
}

fn describe_stats(stats: &WalkStats) -> String {
    format!(
        "{} containers, {} entries ({}), {} empty, depth {}",
        stats.containers,
        stats.entries,
        human_bytes(stats.bytes),
        stats.skipped_empty,
        stats.max_depth
    )
}

fn print_survey(path: &str, report: &SurveyReport) {
    println!("Store {}", path.bold());
    println!("  Total: {}", describe_stats(&report.stats));
    for root in &report.roots {
        println!("  {} {}", root.name.cyan(), describe_stats(&root.stats));
    }
    if let Some(largest) = &report.largest_entry {
        println!("  Largest entry: {} ({})", largest.path.yellow(), human_bytes(largest.bytes));
    }
}

/// Format a byte count with a binary unit.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvshrink_store::{Container, OpenOptions, RedbStore, Store, StoreError, Transaction};
    use std::path::Path;

    fn create_store(path: &Path) {
        let store = RedbStore::open(path, &OpenOptions::new().create(true)).unwrap();
        store
            .update(|tx| {
                let american = tx
                    .create_root_if_missing(b"names")?
                    .create_child_if_missing(b"american")?;
                american.put(b"joe", b"1")?;
                american.put(b"bob", b"2")?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn load_config_defaults_without_file() {
        let config = load_config(&ConfigArgs::default()).unwrap();
        assert_eq!(config, CompactConfig::default());
    }

    #[test]
    fn load_config_reads_file_and_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvshrink.toml");
        fs::write(&path, "open_timeout_ms = 300\ndanger_zone = \"enabled\"\n").unwrap();

        let config = load_config(&ConfigArgs {
            config: Some(path.clone()),
            timeout_ms: None,
        })
        .unwrap();
        assert_eq!(config.open_timeout_ms, 300);
        assert_eq!(config.danger_zone, DangerZone::Enabled);

        let config = load_config(&ConfigArgs {
            config: Some(path),
            timeout_ms: Some(20),
        })
        .unwrap();
        assert_eq!(config.open_timeout_ms, 20);
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(&ConfigArgs {
            config: Some("/definitely/not/here.toml".into()),
            timeout_ms: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }

    #[test]
    fn compact_requires_acknowledgement() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.redb");
        let new = dir.path().join("new.redb");
        create_store(&old);

        let args = CompactArgs {
            old: old.clone(),
            new: new.clone(),
            yes_i_understand: false,
            verify: false,
            config: ConfigArgs::default(),
        };
        assert!(cmd_compact(args, OutputFormat::Text).is_err());
        assert!(!new.exists());
    }

    #[test]
    fn compact_verify_and_stats_commands() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.redb");
        let new = dir.path().join("new.redb");
        create_store(&old);

        cmd_compact(
            CompactArgs {
                old: old.clone(),
                new: new.clone(),
                yes_i_understand: true,
                verify: true,
                config: ConfigArgs::default(),
            },
            OutputFormat::Json,
        )
        .unwrap();

        cmd_verify(
            VerifyArgs {
                old,
                new: new.clone(),
                config: ConfigArgs::default(),
            },
            OutputFormat::Text,
        )
        .unwrap();

        cmd_stats(
            StatsArgs {
                path: new,
                config: ConfigArgs::default(),
            },
            OutputFormat::Text,
        )
        .unwrap();
    }
}
