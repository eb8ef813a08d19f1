//! Locating run inputs on disk.
//!
//! A pipeline run directory holds one or more stats files
//! (`pipeline_stats_<uid>[.<timestamp>].json`) plus companion files: the
//! aggregate report, timetracker timings, supplemental stats, and
//! calibration-table summaries. Filenames embed the sanitized MOUS uid
//! (`uid://A001/X1/X2` becomes `uid___A001_X1_X2`), which is how batch mode
//! groups files by MOUS without opening them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};

/// The located input files of one pipeline run.
///
/// Only the stats file is mandatory; every other member is best-effort and
/// the assembler skips absent ones.
#[derive(Clone, Debug)]
pub struct RunSources {
    pub stats: PathBuf,
    pub report: Option<PathBuf>,
    pub timing: Option<PathBuf>,
    pub suppl: Option<PathBuf>,
    pub tables: Vec<PathBuf>,
}

impl RunSources {
    /// Locate the inputs of a single-run directory.
    ///
    /// Picks the first stats file in sorted order; directories holding runs
    /// for several MOUSes should go through [`discover_uids`] and
    /// [`RunSources::for_uid`] instead.
    pub fn locate(dir: &Path) -> IngestResult<Self> {
        let files = scan(dir);
        let stats: Vec<&PathBuf> = files.iter().filter(|p| is_stats(p)).collect();
        let stats = stats
            .first()
            .ok_or_else(|| IngestError::EmptyDirectory(dir.to_path_buf()))?;
        Ok(Self::around(stats.as_path(), &files, None))
    }

    /// Locate the inputs of the `index`-th run of one MOUS.
    ///
    /// Stats files sort by name, so embedded timestamps put runs in
    /// chronological order; a negative `index` counts from the end
    /// (`-1` is the latest run).
    pub fn for_uid(dir: &Path, uid: &str, index: i64) -> IngestResult<Self> {
        let sanitized = sanitize_uid(uid);
        let files = scan(dir);
        let stats: Vec<&PathBuf> = files
            .iter()
            .filter(|p| is_stats(p) && uid_of(p).is_some_and(|u| u == sanitized))
            .collect();
        if stats.is_empty() {
            return Err(IngestError::EmptyDirectory(dir.to_path_buf()));
        }
        let stats = pick(&stats, index).ok_or_else(|| {
            IngestError::MissingSourceFile(dir.join(format!("pipeline_stats_{sanitized}[{index}]")))
        })?;
        Ok(Self::around(stats, &files, Some(&sanitized)))
    }

    /// Build the source set around a chosen stats file.
    ///
    /// Companion files carrying the sanitized uid in their name are
    /// preferred; when none do (single-run directories often drop the uid),
    /// any match of the pattern is accepted. The newest timetracker file
    /// wins; every table summary is kept.
    fn around(stats: &Path, files: &[PathBuf], uid: Option<&str>) -> Self {
        let report = companion(files, uid, is_report).first().cloned();
        let timing = companion(files, uid, is_timing).last().cloned();
        let suppl = companion(files, uid, is_suppl).first().cloned();
        let tables = companion(files, uid, is_table);
        debug!(
            stats = %stats.display(),
            report = report.is_some(),
            timing = timing.is_some(),
            suppl = suppl.is_some(),
            tables = tables.len(),
            "located run sources"
        );
        Self {
            stats: stats.to_path_buf(),
            report,
            timing,
            suppl,
            tables,
        }
    }
}

/// Unique sanitized MOUS uids present in a directory, from stats filenames.
pub fn discover_uids(dir: &Path) -> IngestResult<Vec<String>> {
    let files = scan(dir);
    let uids: BTreeSet<String> = files
        .iter()
        .filter(|p| is_stats(p))
        .filter_map(|p| uid_of(p))
        .collect();
    if uids.is_empty() {
        return Err(IngestError::EmptyDirectory(dir.to_path_buf()));
    }
    Ok(uids.into_iter().collect())
}

/// Filename form of a MOUS uid.
pub fn sanitize_uid(uid: &str) -> String {
    uid.replace([':', '/'], "_")
}

fn scan(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn is_stats(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with("pipeline_stats_") && name.ends_with(".json")
}

fn is_report(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with("pipeline_aquareport") && name.ends_with(".json")
}

fn is_timing(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with("pipeline-") && name.ends_with(".timetracker.json")
}

fn is_suppl(path: &Path) -> bool {
    let name = file_name(path);
    name.starts_with("pipeline-suppl_stats_") && name.ends_with(".json")
}

fn is_table(path: &Path) -> bool {
    file_name(path).ends_with(".tbl.json")
}

fn companion(files: &[PathBuf], uid: Option<&str>, matches: fn(&Path) -> bool) -> Vec<PathBuf> {
    let all: Vec<PathBuf> = files.iter().filter(|p| matches(p)).cloned().collect();
    let Some(uid) = uid else { return all };
    let tagged: Vec<PathBuf> = all
        .iter()
        .filter(|p| file_name(p).contains(uid))
        .cloned()
        .collect();
    if tagged.is_empty() {
        all
    } else {
        tagged
    }
}

/// The uid segment of a stats filename: everything between the
/// `pipeline_stats_` prefix and the first dot.
fn uid_of(path: &Path) -> Option<String> {
    let name = file_name(path).strip_prefix("pipeline_stats_")?;
    let uid = name.split('.').next()?;
    if uid.is_empty() {
        None
    } else {
        Some(uid.to_string())
    }
}

fn pick<'a>(paths: &'a [&'a PathBuf], index: i64) -> Option<&'a PathBuf> {
    let i = if index < 0 {
        paths.len().checked_sub(index.unsigned_abs() as usize)?
    } else {
        index as usize
    };
    paths.get(i).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn locate_finds_all_source_kinds() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.json");
        touch(dir.path(), "pipeline_aquareport.json");
        touch(dir.path(), "pipeline-20230101T0000.timetracker.json");
        touch(dir.path(), "pipeline-suppl_stats_uid___A001_X1_X2.json");
        touch(dir.path(), "uid___A002_X1.ms.bandpass.tbl.json");
        touch(dir.path(), "unrelated.txt");

        let sources = RunSources::locate(dir.path()).unwrap();
        assert!(is_stats(&sources.stats));
        assert!(sources.report.is_some());
        assert!(sources.timing.is_some());
        assert!(sources.suppl.is_some());
        assert_eq!(sources.tables.len(), 1);
    }

    #[test]
    fn locate_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "unrelated.json");
        let err = RunSources::locate(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyDirectory(_)));
    }

    #[test]
    fn latest_timetracker_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.json");
        touch(dir.path(), "pipeline-20230101T0000.timetracker.json");
        touch(dir.path(), "pipeline-20230301T0000.timetracker.json");
        let sources = RunSources::locate(dir.path()).unwrap();
        let timing = sources.timing.unwrap();
        assert!(timing.to_str().unwrap().contains("20230301"));
    }

    #[test]
    fn discover_uids_deduplicates_runs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.20230101.json");
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.20230301.json");
        touch(dir.path(), "pipeline_stats_uid___A001_X9_X9.json");

        let uids = discover_uids(dir.path()).unwrap();
        assert_eq!(uids, vec!["uid___A001_X1_X2", "uid___A001_X9_X9"]);
    }

    #[test]
    fn for_uid_picks_first_and_last_run() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.20230101.json");
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.20230301.json");

        let first = RunSources::for_uid(dir.path(), "uid://A001/X1/X2", 0).unwrap();
        assert!(first.stats.to_str().unwrap().contains("20230101"));
        let last = RunSources::for_uid(dir.path(), "uid://A001/X1/X2", -1).unwrap();
        assert!(last.stats.to_str().unwrap().contains("20230301"));
    }

    #[test]
    fn for_uid_out_of_range_is_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.json");
        let err = RunSources::for_uid(dir.path(), "uid://A001/X1/X2", 3).unwrap_err();
        assert!(matches!(err, IngestError::MissingSourceFile(_)));
    }

    #[test]
    fn for_uid_unknown_uid_is_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pipeline_stats_uid___A001_X1_X2.json");
        let err = RunSources::for_uid(dir.path(), "uid://A009/X9/X9", 0).unwrap_err();
        assert!(matches!(err, IngestError::EmptyDirectory(_)));
    }

    #[test]
    fn uid_segment_stops_at_first_dot() {
        assert_eq!(
            uid_of(Path::new("pipeline_stats_uid___A001_X1_X2.20230101.json")),
            Some("uid___A001_X1_X2".to_string())
        );
        assert_eq!(uid_of(Path::new("other.json")), None);
    }
}
