use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use plstat_model::Level;

#[derive(Parser)]
#[command(
    name = "plstat",
    about = "Assemble, compare and filter per-MOUS pipeline statistics",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Assemble one record from a pipeline run directory
    Assemble(AssembleArgs),
    /// Compare two runs (run directories or assembled-record JSON files)
    Compare(CompareArgs),
    /// Compare every MOUS found in one or two directories
    Batch(BatchArgs),
    /// Filter a collection and write the surviving uid list
    Select(SelectArgs),
    /// Export sections of a stored diff as CSV
    Export(ExportArgs),
}

#[derive(Args)]
pub struct AssembleArgs {
    pub rundir: PathBuf,
    /// Write the record here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompareArgs {
    /// Reference run: a run directory or an assembled-record JSON file
    pub pl1: PathBuf,
    /// New run, same forms as the reference
    pub pl2: PathBuf,
    /// TOML file with thresholds and per-metric rules
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Keep only the changed leaves (plus the proposal code)
    #[arg(long)]
    pub diff_only: bool,
    /// Also write a CSV rendering of the diff
    #[arg(long)]
    pub csv: Option<PathBuf>,
    /// Write the diff JSON here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct BatchArgs {
    pub dir: PathBuf,
    /// Second directory; when absent, runs of each MOUS within `dir` are
    /// compared against each other
    pub dir2: Option<PathBuf>,
    /// Which run of each MOUS to take from the first directory
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub index1: i64,
    /// Which run of each MOUS to take from the second directory
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub index2: i64,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub diff_only: bool,
    /// Directory receiving one diff JSON per MOUS
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Args)]
pub struct SelectArgs {
    /// A run directory, or a uid list file combined with --dir
    pub source: PathBuf,
    #[arg(long)]
    pub field: String,
    /// One of ==, !=, >=, <=, contains
    #[arg(long)]
    pub op: String,
    #[arg(long)]
    pub value: String,
    /// Level to resolve the field at (probed when absent)
    #[arg(long)]
    pub level: Option<Level>,
    /// Run directory for a uid list source (defaults to the list's parent)
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Which run of each MOUS to assemble
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub index: i64,
    /// Write the surviving uid list here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// A diff JSON file written by compare or batch
    pub diff: PathBuf,
    /// Top-level diff groups to export
    #[arg(long, value_delimiter = ',', default_value = "MOUS,STAGE,TARGET,FLUX")]
    pub groups: Vec<String>,
    /// Substring filter on field names
    #[arg(long)]
    pub sub: Option<String>,
    /// Write the CSV here instead of stdout
    #[arg(long)]
    pub csv: Option<PathBuf>,
}
