use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use tracing::warn;

use plstat_diff::{diff_records, export_csv, CompareConfig, Diff, DiffOptions};
use plstat_ingest::{assemble, discover_uids, RunSources};
use plstat_model::Record;
use plstat_query::Collection;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Assemble(args) => cmd_assemble(args),
        Command::Compare(args) => cmd_compare(args),
        Command::Batch(args) => cmd_batch(args),
        Command::Select(args) => cmd_select(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn cmd_assemble(args: AssembleArgs) -> anyhow::Result<()> {
    let sources = RunSources::locate(&args.rundir)
        .with_context(|| format!("locating run inputs in {}", args.rundir.display()))?;
    let record = assemble(&sources)?;
    let uid = record.uid().to_string();
    write_json(&record, args.out.as_deref())?;
    if args.out.is_some() {
        println!("{} Assembled {}", "✓".green().bold(), uid.yellow());
    }
    Ok(())
}

fn cmd_compare(args: CompareArgs) -> anyhow::Result<()> {
    let options = load_options(args.config.as_deref(), args.diff_only)?;
    let pl1 = load_side(&args.pl1)?;
    let pl2 = load_side(&args.pl2)?;
    let diff = diff_records(&pl1, &pl2, &options);

    if let Some(csv) = &args.csv {
        let mut writer = BufWriter::new(
            File::create(csv).with_context(|| format!("creating {}", csv.display()))?,
        );
        export_csv(&diff, &default_groups(), None, &mut writer)?;
    }
    write_json(&diff, args.out.as_deref())?;
    if args.out.is_some() || args.csv.is_some() {
        print_summary(pl1.uid(), &diff);
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let options = load_options(args.config.as_deref(), args.diff_only)?;
    let dir2 = args.dir2.as_deref().unwrap_or(&args.dir);
    let uids = discover_uids(&args.dir)?;

    let mut written = 0usize;
    for uid in &uids {
        match batch_one(&args.dir, dir2, uid, &args, &options) {
            Ok(diff) => {
                let out = args.out_dir.join(format!("diff_{uid}.json"));
                write_json(&diff, Some(&out))?;
                print_summary(uid, &diff);
                written += 1;
            }
            Err(error) => warn!(uid = %uid, error = %error, "skipping MOUS"),
        }
    }
    println!(
        "{} {} of {} MOUS compared",
        "✓".green().bold(),
        written.to_string().bold(),
        uids.len()
    );
    Ok(())
}

fn batch_one(
    dir1: &Path,
    dir2: &Path,
    uid: &str,
    args: &BatchArgs,
    options: &DiffOptions,
) -> anyhow::Result<Diff> {
    let pl1 = assemble(&RunSources::for_uid(dir1, uid, args.index1)?)?;
    let pl2 = assemble(&RunSources::for_uid(dir2, uid, args.index2)?)?;
    Ok(diff_records(&pl1, &pl2, options))
}

fn cmd_select(args: SelectArgs) -> anyhow::Result<()> {
    let mut collection = if args.source.is_dir() {
        Collection::from_directory(&args.source, args.index)?
    } else {
        let dir = match (&args.dir, args.source.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) => parent.to_path_buf(),
            (None, None) => PathBuf::from("."),
        };
        Collection::from_uid_list(&args.source, &dir, args.index)?
    };
    let before = collection.len();
    let after = collection.select(&args.field, &args.op, &args.value, args.level)?;

    match &args.out {
        Some(out) => {
            let mut writer = BufWriter::new(
                File::create(out).with_context(|| format!("creating {}", out.display()))?,
            );
            collection.to_uid_list(&mut writer)?;
        }
        None => {
            let stdout = std::io::stdout();
            collection.to_uid_list(&mut stdout.lock())?;
        }
    }
    println!(
        "{} {} of {} records match {} {} {}",
        "✓".green().bold(),
        after.to_string().bold(),
        before,
        args.field.yellow(),
        args.op,
        args.value
    );
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.diff)
        .with_context(|| format!("reading {}", args.diff.display()))?;
    let diff: Diff = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.diff.display()))?;

    match &args.csv {
        Some(csv) => {
            let mut writer = BufWriter::new(
                File::create(csv).with_context(|| format!("creating {}", csv.display()))?,
            );
            export_csv(&diff, &args.groups, args.sub.as_deref(), &mut writer)?;
            println!("{} Wrote {}", "✓".green().bold(), csv.display());
        }
        None => {
            let stdout = std::io::stdout();
            export_csv(&diff, &args.groups, args.sub.as_deref(), &mut stdout.lock())?;
        }
    }
    Ok(())
}

/// A run side for compare: an assembled-record JSON file, or a run
/// directory to assemble on the fly.
fn load_side(path: &Path) -> anyhow::Result<Record> {
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    } else {
        let sources = RunSources::locate(path)
            .with_context(|| format!("locating run inputs in {}", path.display()))?;
        Ok(assemble(&sources)?)
    }
}

fn load_options(config: Option<&Path>, diff_only: bool) -> anyhow::Result<DiffOptions> {
    let mut options = match config {
        Some(path) => CompareConfig::load(path)?,
        None => DiffOptions::default(),
    };
    options.diff_only |= diff_only;
    Ok(options)
}

fn write_json<T: serde::Serialize>(value: &T, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            let mut writer = BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            );
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

fn print_summary(uid: &str, diff: &Diff) {
    println!(
        "{}: {} of {} compared leaves changed",
        uid.yellow(),
        diff.changed_leaves().to_string().bold(),
        diff.compared_leaves()
    );
}

fn default_groups() -> Vec<String> {
    ["MOUS", "STAGE", "TARGET", "FLUX"]
        .into_iter()
        .map(String::from)
        .collect()
}
