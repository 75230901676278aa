// The daemon's persistent store: a directory with store.json metadata,
// one RunRecord JSON file per run under runs/, and a jobs/ area reserved
// for the daemon. Maintenance operations access it directly; running them
// concurrently with daemon writes against the same path is the caller's
// responsibility to avoid.
use crate::error::StoreError;
use crate::types::RunRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current on-disk layout version
pub const STORE_VERSION: u32 = 2;

const META_FILE: &str = "store.json";
const RUNS_DIR: &str = "runs";
const JOBS_DIR: &str = "jobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    version: u32,
    created_at: DateTime<Utc>,
}

/// Handle to an opened store directory
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    meta: StoreMeta,
}

/// What a migration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Run files relocated into runs/
    pub moved_runs: usize,
}

impl MigrateReport {
    /// True when the store was already at the current version
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }
}

/// One structural problem found by a consistency scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckProblem {
    UnexpectedVersion { found: u32 },
    MissingRunsDir,
    UnreadableRun { file: String, reason: String },
    IdMismatch { file: String, run_id: String },
    MissingCompletionTime { run_id: String },
}

impl fmt::Display for CheckProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckProblem::UnexpectedVersion { found } => {
                write!(f, "store version is {} but {} is current", found, STORE_VERSION)
            }
            CheckProblem::MissingRunsDir => write!(f, "runs directory is missing"),
            CheckProblem::UnreadableRun { file, reason } => {
                write!(f, "{}: unreadable run record: {}", file, reason)
            }
            CheckProblem::IdMismatch { file, run_id } => {
                write!(f, "{}: contains run id {:?}", file, run_id)
            }
            CheckProblem::MissingCompletionTime { run_id } => {
                write!(f, "run {} is in a terminal state but has no completion time", run_id)
            }
        }
    }
}

/// Counters reported by `archive_runs`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Runs copied into the archive by this call
    pub archived: usize,
    /// Qualifying runs already present in the archive
    pub skipped: usize,
    /// Runs removed from the source store
    pub deleted: usize,
}

impl Store {
    /// Initialize a new, empty store at `path`.
    ///
    /// Fails if a store already exists there, or if the path is an occupied
    /// directory of any kind; silent reuse is unsupported.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if path.join(META_FILE).exists() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        // A non-empty directory counts as occupied even without metadata;
        // its contents are never touched.
        if path.is_dir() && fs::read_dir(path)?.next().is_some() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }

        fs::create_dir_all(path.join(RUNS_DIR))?;
        fs::create_dir_all(path.join(JOBS_DIR))?;

        let meta = StoreMeta {
            version: STORE_VERSION,
            created_at: Utc::now(),
        };
        write_meta(path, &meta)?;

        Ok(Self {
            root: path.to_path_buf(),
            meta,
        })
    }

    /// Open an existing store at the current layout version
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let meta = read_meta(path)?;
        if meta.version > STORE_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: meta.version,
                supported: STORE_VERSION,
            });
        }
        if meta.version < STORE_VERSION {
            return Err(StoreError::NeedsMigration {
                found: meta.version,
                current: STORE_VERSION,
            });
        }
        Ok(Self {
            root: path.to_path_buf(),
            meta,
        })
    }

    /// Open a store at any supported layout version.
    ///
    /// Only for read-only scans: `check` reports an outdated version as a
    /// problem instead of refusing to look at the store.
    pub fn open_for_check(path: &Path) -> Result<Self, StoreError> {
        let meta = read_meta(path)?;
        if meta.version > STORE_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: meta.version,
                supported: STORE_VERSION,
            });
        }
        Ok(Self {
            root: path.to_path_buf(),
            meta,
        })
    }

    /// Upgrade a store's on-disk layout to the current version in place.
    ///
    /// Version 1 stores kept run files directly in the store root; they are
    /// relocated under runs/. A store already at the current version is a
    /// successful no-op. Structural checks run before anything is touched.
    pub fn migrate(path: &Path) -> Result<MigrateReport, StoreError> {
        let meta = read_meta(path)?;

        if meta.version > STORE_VERSION {
            return Err(StoreError::IncompatibleVersion {
                found: meta.version,
                supported: STORE_VERSION,
            });
        }
        if meta.version == STORE_VERSION {
            return Ok(MigrateReport {
                from_version: meta.version,
                to_version: STORE_VERSION,
                moved_runs: 0,
            });
        }
        if meta.version != 1 {
            return Err(StoreError::Corrupt(format!(
                "unknown store version {}",
                meta.version
            )));
        }

        // Pre-scan: every candidate run file must parse before we move any.
        let candidates = loose_run_files(path)?;
        for file in &candidates {
            let contents = fs::read_to_string(file)?;
            serde_json::from_str::<RunRecord>(&contents).map_err(|e| {
                StoreError::Corrupt(format!("{}: {}", file.display(), e))
            })?;
        }

        let runs_dir = path.join(RUNS_DIR);
        fs::create_dir_all(&runs_dir)?;
        fs::create_dir_all(path.join(JOBS_DIR))?;

        let mut moved = 0;
        for file in &candidates {
            let Some(name) = file.file_name() else {
                continue;
            };
            fs::rename(file, runs_dir.join(name))?;
            moved += 1;
        }

        let new_meta = StoreMeta {
            version: STORE_VERSION,
            created_at: meta.created_at,
        };
        write_meta(path, &new_meta)?;

        Ok(MigrateReport {
            from_version: meta.version,
            to_version: STORE_VERSION,
            moved_runs: moved,
        })
    }

    /// Read-only consistency scan.
    ///
    /// Collects every structural problem rather than aborting at the first,
    /// so a single run surfaces the full defect list. Never mutates.
    pub fn check(&self) -> Result<Vec<CheckProblem>, StoreError> {
        let mut problems = Vec::new();

        if self.meta.version != STORE_VERSION {
            problems.push(CheckProblem::UnexpectedVersion {
                found: self.meta.version,
            });
        }

        let runs_dir = self.root.join(RUNS_DIR);
        if !runs_dir.is_dir() {
            problems.push(CheckProblem::MissingRunsDir);
            return Ok(problems);
        }

        for entry in fs::read_dir(&runs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let contents = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    problems.push(CheckProblem::UnreadableRun {
                        file,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let run: RunRecord = match serde_json::from_str(&contents) {
                Ok(r) => r,
                Err(e) => {
                    problems.push(CheckProblem::UnreadableRun {
                        file,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if run.run_id != stem {
                problems.push(CheckProblem::IdMismatch {
                    file,
                    run_id: run.run_id.clone(),
                });
            }
            if run.state.is_terminal() && run.completion_time.is_none() {
                problems.push(CheckProblem::MissingCompletionTime {
                    run_id: run.run_id,
                });
            }
        }

        Ok(problems)
    }

    /// Store layout version
    pub fn version(&self) -> u32 {
        self.meta.version
    }

    /// Store root directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// All run ids in the store, sorted
    pub fn run_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join(RUNS_DIR))? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                ids.push(stem.to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_path(run_id).is_file()
    }

    pub fn load_run(&self, run_id: &str) -> Result<RunRecord, StoreError> {
        let path = self.run_path(run_id);
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    /// Write a run record durably: temp file, sync, rename
    pub fn put_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let final_path = self.run_path(&run.run_id);
        let tmp_path = self
            .root
            .join(RUNS_DIR)
            .join(format!(".{}.json.tmp", run.run_id));

        let json = serde_json::to_vec_pretty(run)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn remove_run(&self, run_id: &str) -> Result<(), StoreError> {
        fs::remove_file(self.run_path(run_id))?;
        Ok(())
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join(RUNS_DIR).join(format!("{}.json", run_id))
    }
}

/// Copy runs completed strictly before `cutoff` from `db` into `archive`.
///
/// Idempotent by run identity: runs already present in the archive are
/// skipped, so an interrupted call can be re-run safely. Each record copy
/// is atomic (temp file + rename); with `delete`, a qualifying run is
/// removed from the source only once the archive holds it.
pub fn archive_runs(
    db: &Store,
    archive: &Store,
    cutoff: DateTime<Utc>,
    delete: bool,
) -> Result<ArchiveStats, StoreError> {
    let mut stats = ArchiveStats::default();

    for run_id in db.run_ids()? {
        let run = db.load_run(&run_id)?;
        if !run.completed_before(cutoff) {
            continue;
        }

        if archive.has_run(&run_id) {
            stats.skipped += 1;
        } else {
            archive.put_run(&run)?;
            stats.archived += 1;
        }

        if delete {
            db.remove_run(&run_id)?;
            stats.deleted += 1;
        }
    }

    Ok(stats)
}

fn read_meta(path: &Path) -> Result<StoreMeta, StoreError> {
    let meta_path = path.join(META_FILE);
    if !meta_path.is_file() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(&meta_path)?;
    serde_json::from_str(&contents)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", meta_path.display(), e)))
}

fn write_meta(path: &Path, meta: &StoreMeta) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(meta)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    fs::write(path.join(META_FILE), json)?;
    Ok(())
}

/// Run files a version-1 store kept in its root
fn loose_run_files(path: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let p = entry?.path();
        if !p.is_file() || p.extension().map_or(true, |e| e != "json") {
            continue;
        }
        if p.file_name().map_or(false, |n| n == META_FILE) {
            continue;
        }
        files.push(p);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunRecord, RunState};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn finished_run(job_id: &str, completed: DateTime<Utc>) -> RunRecord {
        let mut run = RunRecord::new(job_id, completed);
        run.state = RunState::Success;
        run.start_time = Some(completed);
        run.completion_time = Some(completed);
        run
    }

    #[test]
    fn test_create_then_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let store = Store::create(&path).unwrap();
        assert_eq!(store.version(), STORE_VERSION);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.version(), STORE_VERSION);
        assert!(reopened.run_ids().unwrap().is_empty());
    }

    #[test]
    fn test_create_twice_fails_and_preserves_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let store = Store::create(&path).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let run = finished_run("etl", t);
        store.put_run(&run).unwrap();

        match Store::create(&path) {
            Err(StoreError::AlreadyExists(p)) => assert_eq!(p, path),
            other => panic!("Expected AlreadyExists, got {:?}", other),
        }

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.has_run(&run.run_id));
    }

    #[test]
    fn test_create_refuses_nonempty_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("notes.txt"), "unrelated contents").unwrap();

        match Store::create(&path) {
            Err(StoreError::AlreadyExists(p)) => assert_eq!(p, path),
            other => panic!("Expected AlreadyExists, got {:?}", other),
        }

        // Nothing was planted or disturbed.
        let contents = fs::read_to_string(path.join("notes.txt")).unwrap();
        assert_eq!(contents, "unrelated contents");
        assert!(!path.join(META_FILE).exists());
        assert!(!path.join(RUNS_DIR).exists());
    }

    #[test]
    fn test_create_in_empty_existing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        fs::create_dir_all(&path).unwrap();
        let store = Store::create(&path).unwrap();
        assert_eq!(store.version(), STORE_VERSION);
    }

    #[test]
    fn test_open_missing_store() {
        let dir = TempDir::new().unwrap();
        match Store::open(&dir.path().join("absent")) {
            Err(StoreError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_open_newer_version_is_incompatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(META_FILE),
            format!(
                r#"{{"version": {}, "created_at": "2024-01-01T00:00:00Z"}}"#,
                STORE_VERSION + 1
            ),
        )
        .unwrap();

        match Store::open(&path) {
            Err(StoreError::IncompatibleVersion { found, supported }) => {
                assert_eq!(found, STORE_VERSION + 1);
                assert_eq!(supported, STORE_VERSION);
            }
            other => panic!("Expected IncompatibleVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_open_corrupt_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(META_FILE), "{garbage").unwrap();

        match Store::open(&path) {
            Err(StoreError::Corrupt(_)) => {}
            other => panic!("Expected Corrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_put_and_load_run() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(&dir.path().join("store")).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let run = finished_run("nightly-report", t);

        store.put_run(&run).unwrap();
        let loaded = store.load_run(&run.run_id).unwrap();
        assert_eq!(loaded, run);
        assert_eq!(store.run_ids().unwrap(), vec![run.run_id.clone()]);
    }

    #[test]
    fn test_migrate_noop_at_current_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        Store::create(&path).unwrap();

        let report = Store::migrate(&path).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.moved_runs, 0);
    }

    fn make_v1_store(path: &Path, runs: &[RunRecord]) {
        fs::create_dir_all(path).unwrap();
        fs::write(
            path.join(META_FILE),
            r#"{"version": 1, "created_at": "2023-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        for run in runs {
            let file = path.join(format!("{}.json", run.run_id));
            fs::write(file, serde_json::to_vec(run).unwrap()).unwrap();
        }
    }

    #[test]
    fn test_migrate_v1_relocates_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let t = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let runs = vec![finished_run("a", t), finished_run("b", t)];
        make_v1_store(&path, &runs);

        let report = Store::migrate(&path).unwrap();
        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, STORE_VERSION);
        assert_eq!(report.moved_runs, 2);

        let store = Store::open(&path).unwrap();
        for run in &runs {
            assert_eq!(store.load_run(&run.run_id).unwrap(), *run);
        }
    }

    #[test]
    fn test_migrate_corrupt_v1_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let t = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        make_v1_store(&path, &[finished_run("a", t)]);
        fs::write(path.join("bogus.json"), "{not a run").unwrap();

        match Store::migrate(&path) {
            Err(StoreError::Corrupt(_)) => {}
            other => panic!("Expected Corrupt, got {:?}", other),
        }
        // Nothing was moved.
        assert!(!path.join(RUNS_DIR).exists());
    }

    #[test]
    fn test_open_v1_requires_migration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        make_v1_store(&path, &[]);

        match Store::open(&path) {
            Err(StoreError::NeedsMigration { found, current }) => {
                assert_eq!(found, 1);
                assert_eq!(current, STORE_VERSION);
            }
            other => panic!("Expected NeedsMigration, got {:?}", other),
        }
    }

    #[test]
    fn test_check_reports_all_problems_in_one_pass() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(&dir.path().join("store")).unwrap();

        // A run whose file name disagrees with its id.
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let run = finished_run("etl", t);
        let json = serde_json::to_vec(&run).unwrap();
        fs::write(store.path().join(RUNS_DIR).join("wrong-name.json"), json).unwrap();

        // A terminal run without a completion time.
        let mut incomplete = RunRecord::new("etl", t);
        incomplete.state = RunState::Failure;
        store.put_run(&incomplete).unwrap();

        // An unparseable record.
        fs::write(store.path().join(RUNS_DIR).join("junk.json"), "nope").unwrap();

        let problems = store.check().unwrap();
        assert_eq!(problems.len(), 3, "all problems surfaced in one scan");
        assert!(problems
            .iter()
            .any(|p| matches!(p, CheckProblem::IdMismatch { .. })));
        assert!(problems
            .iter()
            .any(|p| matches!(p, CheckProblem::MissingCompletionTime { .. })));
        assert!(problems
            .iter()
            .any(|p| matches!(p, CheckProblem::UnreadableRun { .. })));
    }

    #[test]
    fn test_check_reports_outdated_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        make_v1_store(&path, &[]);

        let store = Store::open_for_check(&path).unwrap();
        let problems = store.check().unwrap();
        assert!(problems
            .iter()
            .any(|p| matches!(p, CheckProblem::UnexpectedVersion { found: 1 })));
        assert!(problems
            .iter()
            .any(|p| matches!(p, CheckProblem::MissingRunsDir)));
    }

    #[test]
    fn test_check_clean_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::create(&dir.path().join("store")).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        store.put_run(&finished_run("etl", t)).unwrap();

        assert!(store.check().unwrap().is_empty());
    }
}
