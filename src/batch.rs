//! Parallel batch comparison across version-namespaced directory trees.
//!
//! Each (version, filename) comparison is an independent, CPU-bound unit
//! of work owning its buffers, so a batch fans out across a rayon worker
//! pool. A fatal format or relocation error aborts only its own task;
//! the batch records the failure and continues. Results come back in
//! input order regardless of completion order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::diff::{blank_out_differences, ComparisonResult, IgnoreClasses};
use crate::error::{CompareError, Result};
use crate::normalize::{AddressErasure, NormalizePasses};
use crate::overlay::{FileKind, RomFile};

/// One comparison unit: the same file under two build versions.
#[derive(Debug, Clone)]
pub struct CompareTask {
    /// File name, used as the aggregation key and in diagnostics.
    pub name: String,
    /// How the blob is interpreted.
    pub kind: FileKind,
    /// First build version.
    pub version_one: String,
    /// Path of the file in the first version tree.
    pub path_one: PathBuf,
    /// Second build version.
    pub version_two: String,
    /// Path of the file in the second version tree.
    pub path_two: PathBuf,
}

/// What happened to one task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    /// Both inputs loaded and compared.
    Compared {
        /// The comparison result.
        result: ComparisonResult,
    },
    /// One input was absent; rendered as a placeholder, not a failure.
    Missing {
        /// The version the file was missing from.
        version: String,
    },
    /// The task aborted on a fatal format or relocation error.
    Failed {
        /// Rendered error message.
        message: String,
    },
}

/// Outcome of one task, keyed by its file name.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// The task's file name.
    pub name: String,
    /// What happened.
    pub outcome: TaskOutcome,
}

/// Batch configuration.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool size; `None` uses the global pool (one worker per
    /// core).
    pub workers: Option<usize>,
    /// Address erasure applied to each side before comparison.
    pub erasure: AddressErasure,
    /// Ignorable top bytes for symmetric blanking of plain file pairs.
    pub ignore: IgnoreClasses,
    /// Per-version wrapper call targets for the heuristic normalizer.
    pub wrapper_targets: HashMap<String, u32>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: None,
            erasure: AddressErasure::None,
            ignore: IgnoreClasses::new(),
            wrapper_targets: HashMap::new(),
        }
    }
}

impl BatchOptions {
    /// Explicitly size the pool to the available CPU cores.
    pub fn sized_to_cpus(mut self) -> Self {
        self.workers = Some(num_cpus::get());
        self
    }
}

/// Read one input blob.
///
/// An absent file maps to [`CompareError::MissingInput`], which batch
/// drivers render as a placeholder rather than a failure.
pub fn read_blob(path: &Path, version: &str, name: &str) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(CompareError::MissingInput {
                version: version.to_string(),
                name: name.to_string(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Build the task for one file across two version trees laid out as
/// `root/baserom_<version>/<name>`.
pub fn cross_version_task(
    root: &Path,
    name: &str,
    kind: FileKind,
    version_one: &str,
    version_two: &str,
) -> CompareTask {
    let path_for = |version: &str| root.join(format!("baserom_{version}")).join(name);
    CompareTask {
        name: name.to_string(),
        kind,
        version_one: version_one.to_string(),
        path_one: path_for(version_one),
        version_two: version_two.to_string(),
        path_two: path_for(version_two),
    }
}

/// List the files under one version tree, relative to it, in name order.
pub fn list_version_files(root: &Path, version: &str) -> Result<Vec<String>> {
    let dir = root.join(format!("baserom_{version}"));
    let mut names = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(&dir) {
            names.push(relative.to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Run every task on the worker pool, returning one report per task in
/// input order (aggregation is by key, never by completion order).
pub fn compare_tasks(tasks: &[CompareTask], options: &BatchOptions) -> Result<Vec<TaskReport>> {
    let run = || -> Vec<TaskReport> {
        tasks
            .par_iter()
            .map(|task| TaskReport {
                name: task.name.clone(),
                outcome: run_task(task, options),
            })
            .collect()
    };
    match options.workers {
        None => Ok(run()),
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|err| CompareError::Config {
                    message: err.to_string(),
                })?;
            Ok(pool.install(run))
        }
    }
}

fn run_task(task: &CompareTask, options: &BatchOptions) -> TaskOutcome {
    match try_compare(task, options) {
        Ok(result) => TaskOutcome::Compared { result },
        Err(CompareError::MissingInput { version, name }) => {
            warn!(name = %name, version = %version, "input missing, recording placeholder");
            TaskOutcome::Missing { version }
        }
        Err(err) => {
            warn!(name = %task.name, error = %err, "task failed, continuing batch");
            TaskOutcome::Failed {
                message: err.to_string(),
            }
        }
    }
}

fn try_compare(task: &CompareTask, options: &BatchOptions) -> Result<ComparisonResult> {
    let bytes_one = read_blob(&task.path_one, &task.version_one, &task.name)?;
    let bytes_two = read_blob(&task.path_two, &task.version_two, &task.name)?;

    let mut one = RomFile::parse(bytes_one, task.kind, task.name.clone())?;
    let mut two = RomFile::parse(bytes_two, task.kind, task.name.clone())?;

    one.normalize(&erasure_for(options, &task.version_one), &task.version_one)?;
    two.normalize(&erasure_for(options, &task.version_two), &task.version_two)?;

    if let (RomFile::Plain(a), RomFile::Plain(b)) = (&mut one, &mut two) {
        blank_out_differences(a, b, &options.ignore);
    }

    Ok(one.compare_to(&two))
}

/// Specialize the configured erasure for one version: a heuristic
/// erasure picks up that version's wrapper call target, if any.
fn erasure_for(options: &BatchOptions, version: &str) -> AddressErasure {
    match &options.erasure {
        AddressErasure::Heuristic(config) => {
            let mut config = config.clone();
            if let Some(&target) = options.wrapper_targets.get(version) {
                config.wrapper_call_target = Some(target);
                config.passes |= NormalizePasses::STRIP_WRAPPERS;
            }
            AddressErasure::Heuristic(config)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_version_file(root: &Path, version: &str, name: &str, bytes: &[u8]) {
        let dir = root.join(format!("baserom_{version}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn test_missing_input_maps_to_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        write_version_file(tmp.path(), "ntsc_1.0", "object", &[0, 0, 0, 1]);

        let task = cross_version_task(tmp.path(), "object", FileKind::Plain, "ntsc_1.0", "pal_1.0");
        let reports = compare_tasks(std::slice::from_ref(&task), &BatchOptions::default()).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0].outcome,
            TaskOutcome::Missing { version } if version == "pal_1.0"
        ));
    }

    #[test]
    fn test_reports_preserve_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            write_version_file(tmp.path(), "v1", name, &[1, 2, 3, 4]);
            write_version_file(tmp.path(), "v2", name, &[1, 2, 3, 4]);
        }
        let tasks: Vec<CompareTask> = ["d", "a", "c", "b"]
            .iter()
            .map(|name| cross_version_task(tmp.path(), name, FileKind::Plain, "v1", "v2"))
            .collect();
        let reports = compare_tasks(&tasks, &BatchOptions::default()).unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["d", "a", "c", "b"]);
        for report in &reports {
            assert!(matches!(
                &report.outcome,
                TaskOutcome::Compared { result } if result.equal
            ));
        }
    }

    #[test]
    fn test_bad_overlay_fails_without_aborting_batch() {
        let tmp = tempfile::tempdir().unwrap();
        // Too short to hold a trailer and header.
        write_version_file(tmp.path(), "v1", "ovl_bad", &[0u8; 8]);
        write_version_file(tmp.path(), "v2", "ovl_bad", &[0u8; 8]);
        write_version_file(tmp.path(), "v1", "object", &[9, 9, 9, 9]);
        write_version_file(tmp.path(), "v2", "object", &[9, 9, 9, 9]);

        let tasks = vec![
            cross_version_task(tmp.path(), "ovl_bad", FileKind::Overlay, "v1", "v2"),
            cross_version_task(tmp.path(), "object", FileKind::Plain, "v1", "v2"),
        ];
        let reports = compare_tasks(&tasks, &BatchOptions::default()).unwrap();
        assert!(matches!(reports[0].outcome, TaskOutcome::Failed { .. }));
        assert!(matches!(reports[1].outcome, TaskOutcome::Compared { .. }));
    }

    #[test]
    fn test_explicit_worker_count() {
        let tmp = tempfile::tempdir().unwrap();
        write_version_file(tmp.path(), "v1", "object", &[0, 0, 0, 2]);
        write_version_file(tmp.path(), "v2", "object", &[0, 0, 0, 3]);
        let task = cross_version_task(tmp.path(), "object", FileKind::Plain, "v1", "v2");

        let options = BatchOptions {
            workers: Some(2),
            ..BatchOptions::default()
        };
        let reports = compare_tasks(std::slice::from_ref(&task), &options).unwrap();
        assert!(matches!(
            &reports[0].outcome,
            TaskOutcome::Compared { result } if !result.equal && result.diff_words == 1
        ));
    }

    #[test]
    fn test_plain_pair_ignore_classes() {
        let tmp = tempfile::tempdir().unwrap();
        write_version_file(tmp.path(), "v1", "object", &0x8012_3456u32.to_be_bytes());
        write_version_file(tmp.path(), "v2", "object", &0x80AB_CDEFu32.to_be_bytes());
        let task = cross_version_task(tmp.path(), "object", FileKind::Plain, "v1", "v2");

        let options = BatchOptions {
            ignore: IgnoreClasses::new().with(0x80),
            ..BatchOptions::default()
        };
        let reports = compare_tasks(std::slice::from_ref(&task), &options).unwrap();
        assert!(matches!(
            &reports[0].outcome,
            TaskOutcome::Compared { result } if result.equal
        ));
    }

    #[test]
    fn test_list_version_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zz", "aa", "mm"] {
            write_version_file(tmp.path(), "v1", name, &[0]);
        }
        let names = list_version_files(tmp.path(), "v1").unwrap();
        assert_eq!(names, vec!["aa", "mm", "zz"]);
    }
}
