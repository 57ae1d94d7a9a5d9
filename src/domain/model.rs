use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::error::DownloadItemError;

/// A catalog user as returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub display_name: String,
    pub profile_url: String,
    pub avatar_url: Option<String>,
}

/// Catalog key of a cloudcast, e.g. `/monstercat/call-of-the-wild-500/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloudcastKey(String);

impl CloudcastKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_slug(owner: &str, slug: &str) -> Self {
        Self(format!("/{owner}/{slug}/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CloudcastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudcastRecord {
    pub key: CloudcastKey,
    pub owner: String,
    pub slug: String,
    pub title: String,
    pub duration: Option<Duration>,
    pub source_url: String,
    pub thumbnail_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl CloudcastRecord {
    /// File name (without extension) the download is stored under: `{owner} - {title}`.
    pub fn file_stem(&self) -> String {
        let clean = |raw: &str| {
            crate::utils::sanitize_filename(raw)
                .trim_matches(|c| c == '.' || c == ' ')
                .to_string()
        };

        let title = match clean(&self.title) {
            title if title.is_empty() => clean(&self.slug),
            title => title,
        };
        match clean(&self.owner) {
            owner if owner.is_empty() => title,
            owner => format!("{owner} - {title}"),
        }
    }
}

/// Ordered set of cloudcast keys picked in the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    keys: Vec<CloudcastKey>,
}

impl Selection {
    pub fn contains(&self, key: &CloudcastKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` when the key was already selected.
    pub fn insert(&mut self, key: CloudcastKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    pub fn remove(&mut self, key: &CloudcastKey) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k != key);
        self.keys.len() != before
    }

    pub fn toggle(&mut self, key: CloudcastKey) {
        if !self.remove(&key) {
            self.keys.push(key);
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Records for the selected keys, in selection order.
    pub fn resolve(&self, records: &[CloudcastRecord]) -> Vec<CloudcastRecord> {
        self.keys
            .iter()
            .filter_map(|key| records.iter().find(|record| &record.key == key))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded(PathBuf),
    Failed(DownloadItemError),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub record: CloudcastRecord,
    pub destination: PathBuf,
    status: JobStatus,
}

impl DownloadJob {
    pub fn new(record: CloudcastRecord, destination: impl Into<PathBuf>) -> Self {
        Self {
            record,
            destination: destination.into(),
            status: JobStatus::Pending,
        }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// `pending -> in-progress`. Any other starting state is rejected.
    pub fn start(&mut self) -> bool {
        self.advance(JobStatus::InProgress)
    }

    pub fn succeed(&mut self, path: PathBuf) -> bool {
        self.advance(JobStatus::Succeeded(path))
    }

    pub fn fail(&mut self, error: DownloadItemError) -> bool {
        self.advance(JobStatus::Failed(error))
    }

    fn advance(&mut self, next: JobStatus) -> bool {
        let allowed = matches!(
            (&self.status, &next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Succeeded(_))
                | (JobStatus::InProgress, JobStatus::Failed(_))
        );

        if allowed {
            self.status = next;
        } else {
            tracing::warn!(
                key = %self.record.key,
                from = ?self.status,
                to = ?next,
                "rejected download job transition"
            );
        }
        allowed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// All jobs of one download run, in selection order.
#[derive(Debug, Clone)]
pub struct DownloadRun {
    destination: PathBuf,
    jobs: Vec<DownloadJob>,
    state: RunState,
}

impl DownloadRun {
    /// Builds one pending job per distinct record; repeated keys are skipped.
    pub fn new(records: Vec<CloudcastRecord>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let mut jobs: Vec<DownloadJob> = Vec::with_capacity(records.len());

        for record in records {
            if jobs.iter().any(|job| job.record.key == record.key) {
                continue;
            }
            jobs.push(DownloadJob::new(record, destination.clone()));
        }

        Self {
            destination,
            jobs,
            state: RunState::Idle,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut [DownloadJob] {
        &mut self.jobs
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub fn report(&self) -> DownloadRunReport {
        DownloadRunReport::from_jobs(&self.jobs, self.state == RunState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub key: CloudcastKey,
    pub title: String,
    pub outcome: Result<PathBuf, DownloadItemError>,
}

/// Summary of one run. Only jobs that reached a terminal state are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRunReport {
    pub entries: Vec<ReportEntry>,
    pub not_started: usize,
    pub cancelled: bool,
}

impl DownloadRunReport {
    pub fn from_jobs(jobs: &[DownloadJob], cancelled: bool) -> Self {
        let entries: Vec<ReportEntry> = jobs
            .iter()
            .filter_map(|job| {
                let outcome = match job.status() {
                    JobStatus::Succeeded(path) => Ok(path.clone()),
                    JobStatus::Failed(error) => Err(error.clone()),
                    JobStatus::Pending | JobStatus::InProgress => return None,
                };
                Some(ReportEntry {
                    key: job.record.key.clone(),
                    title: job.record.title.clone(),
                    outcome,
                })
            })
            .collect();

        Self {
            not_started: jobs.len() - entries.len(),
            entries,
            cancelled,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ReportEntry, &DownloadItemError)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().err().map(|error| (entry, error)))
    }
}

#[cfg(test)]
pub(crate) fn sample_record(owner: &str, slug: &str) -> CloudcastRecord {
    CloudcastRecord {
        key: CloudcastKey::for_slug(owner, slug),
        owner: owner.to_string(),
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        duration: Some(Duration::from_secs(3600)),
        source_url: format!("https://www.mixcloud.com/{owner}/{slug}/"),
        thumbnail_url: None,
        published: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_only_moves_forward() {
        let mut job = DownloadJob::new(sample_record("dj", "mix-1"), "/tmp");

        assert!(!job.succeed(PathBuf::from("/tmp/a.mp3")));
        assert!(job.start());
        assert!(!job.start());
        assert!(job.fail(DownloadItemError::Io("disk full".into())));
        assert!(!job.succeed(PathBuf::from("/tmp/a.mp3")));
        assert!(matches!(job.status(), JobStatus::Failed(_)));
    }

    #[test]
    fn test_run_skips_duplicate_records() {
        let records = vec![
            sample_record("dj", "mix-1"),
            sample_record("dj", "mix-2"),
            sample_record("dj", "mix-1"),
        ];
        let run = DownloadRun::new(records, "/tmp");

        let slugs: Vec<_> = run.jobs().iter().map(|j| j.record.slug.as_str()).collect();
        assert_eq!(slugs, ["mix-1", "mix-2"]);
        assert_eq!(run.state(), RunState::Idle);
    }

    #[test]
    fn test_selection_keeps_order_and_rejects_duplicates() {
        let mut selection = Selection::default();
        let a = CloudcastKey::for_slug("dj", "a");
        let b = CloudcastKey::for_slug("dj", "b");

        assert!(selection.insert(b.clone()));
        assert!(selection.insert(a.clone()));
        assert!(!selection.insert(b.clone()));
        assert_eq!(selection.keys, [b.clone(), a.clone()]);

        selection.toggle(b.clone());
        assert!(!selection.contains(&b));
        selection.toggle(b.clone());
        assert_eq!(selection.keys, [a, b]);
    }

    #[test]
    fn test_selection_resolves_in_selection_order() {
        let records = vec![sample_record("dj", "a"), sample_record("dj", "b")];
        let mut selection = Selection::default();
        selection.insert(records[1].key.clone());
        selection.insert(records[0].key.clone());
        selection.insert(CloudcastKey::new("/gone/"));

        let resolved = selection.resolve(&records);
        assert_eq!(resolved, vec![records[1].clone(), records[0].clone()]);
    }

    #[test]
    fn test_report_only_counts_terminal_jobs() {
        let mut run = DownloadRun::new(
            vec![
                sample_record("dj", "a"),
                sample_record("dj", "b"),
                sample_record("dj", "c"),
            ],
            "/tmp",
        );
        let jobs = run.jobs_mut();
        jobs[0].start();
        jobs[0].succeed(PathBuf::from("/tmp/a.mp3"));
        jobs[1].start();
        jobs[1].fail(DownloadItemError::Io("denied".into()));
        run.set_state(RunState::Cancelled);

        let report = run.report();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.not_started, 1);
        assert!(report.cancelled);
        let failures: Vec<_> = report.failures().map(|(e, _)| e.key.clone()).collect();
        assert_eq!(failures, vec![CloudcastKey::for_slug("dj", "b")]);
    }

    #[test]
    fn test_file_stem_falls_back_to_slug() {
        let mut record = sample_record("dj", "mix-1");
        record.owner = "..".to_string();
        record.title = "  ..  ".to_string();
        assert_eq!(record.file_stem(), "mix-1");

        let record = sample_record("dj", "late-night");
        assert_eq!(record.file_stem(), "dj - late night");
    }

    #[test]
    fn test_file_stem_folds_accents() {
        let mut record = sample_record("dj", "mix-1");
        record.owner = "Café Olé".to_string();
        record.title = "Été Ｓｅｓｓｉｏｎ".to_string();
        assert_eq!(record.file_stem(), "Cafe Ole - Ete Session");
    }
}
