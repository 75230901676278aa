// Job definition files: one {job_id}.json per job in the job source
// directory. Validation collects every problem instead of stopping at the
// first, so one pass surfaces the full defect list.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A job definition as written by the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Schedule expression, interpreted by the scheduler
    pub schedule: String,
    /// Program argv to execute
    pub program: Vec<String>,
    /// Disabled jobs stay loaded but are never scheduled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One problem found while loading a job source directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    /// File name the problem was found in
    pub file: String,
    pub message: String,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.message)
    }
}

/// Load every job definition in `dir`.
///
/// Returns the map of valid jobs keyed by job id (the file stem) together
/// with the list of validation errors. A directory with problems still
/// yields its valid jobs.
pub fn load_jobs(dir: &Path) -> std::io::Result<(BTreeMap<String, JobSpec>, Vec<JobError>)> {
    let mut jobs = BTreeMap::new();
    let mut errors = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map_or(true, |e| e != "json") {
            continue;
        }
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(job_id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                errors.push(JobError {
                    file,
                    message: format!("unreadable: {}", e),
                });
                continue;
            }
        };

        let spec: JobSpec = match serde_json::from_str(&contents) {
            Ok(s) => s,
            Err(e) => {
                errors.push(JobError {
                    file,
                    message: format!("invalid job definition: {}", e),
                });
                continue;
            }
        };

        if let Err(message) = validate(&spec) {
            errors.push(JobError { file, message });
            continue;
        }

        jobs.insert(job_id, spec);
    }

    Ok((jobs, errors))
}

fn validate(spec: &JobSpec) -> Result<(), String> {
    if spec.schedule.trim().is_empty() {
        return Err("schedule must not be empty".to_string());
    }
    if spec.program.is_empty() {
        return Err("program must not be empty".to_string());
    }
    Ok(())
}
