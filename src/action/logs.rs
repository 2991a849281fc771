//! Fetch logs: package a log directory and deliver it to the blobstore.
//!
//! Pipeline, strictly in order: validate the log type, pick filters,
//! resolve the directory, compress, upload. The tarball is removed once
//! the upload attempt finishes, whatever its outcome.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde_json::{Value, json};

use super::{Action, ActionError};
use crate::{blobstore::Blobstore, compressor::Compressor};

/// Name the dispatcher registers this action under.
pub const FETCH_LOGS: &str = "fetch_logs";

/// Which family of logs to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    /// Logs written by deployed jobs.
    Job,

    /// The agent's own logs.
    Agent,
}

impl LogType {
    /// Filters used when the caller supplies none.
    pub fn default_filters(self) -> &'static [&'static str] {
        match self {
            Self::Job => &["**/*.log"],
            Self::Agent => &["**/*"],
        }
    }

    /// Where this family's logs live under the agent base directory.
    pub fn logs_dir(self, base_dir: &Path) -> PathBuf {
        match self {
            Self::Job => base_dir.join("sys").join("log"),
            Self::Agent => base_dir.join("bosh").join("log"),
        }
    }
}

impl FromStr for LogType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(Self::Job),
            "agent" => Ok(Self::Agent),
            _ => Err(ActionError::InvalidInput("Invalid log type".into())),
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedLogs {
    pub blobstore_id: String,
}

pub struct LogsAction<C, B> {
    compressor: C,
    blobstore: B,
    base_dir: PathBuf,
}

impl<C: Compressor, B: Blobstore> LogsAction<C, B> {
    pub fn new(compressor: C, blobstore: B, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            compressor,
            blobstore,
            base_dir: base_dir.into(),
        }
    }

    /// Collect logs of `log_type` matching `filters` and upload them.
    ///
    /// An empty `filters` means the log type's defaults. Any caller-supplied
    /// filter, even one, replaces the defaults entirely.
    pub fn fetch(&self, log_type: &str, filters: Vec<String>) -> Result<FetchedLogs, ActionError> {
        let log_type: LogType = log_type.parse()?;

        let filters = if filters.is_empty() {
            log_type
                .default_filters()
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            filters
        };

        let dir = log_type.logs_dir(&self.base_dir);
        tracing::info!(?log_type, dir = %dir.display(), ?filters, "fetching logs");

        let tarball = self
            .compressor
            .compress_files_in_dir(&dir, &filters)
            .map_err(|e| {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to compress logs");
                ActionError::CompressionFailed(e)
            })?;

        let uploaded = self.blobstore.create(tarball.path());
        drop(tarball);

        let blob = uploaded.map_err(|e| {
            tracing::warn!(error = %e, transient = e.is_transient(), "failed to upload logs");
            ActionError::UploadFailed(e)
        })?;

        tracing::info!(blobstore_id = %blob.id, fingerprint = ?blob.fingerprint, "uploaded logs");
        Ok(FetchedLogs {
            blobstore_id: blob.id,
        })
    }
}

impl<C: Compressor, B: Blobstore> Action for LogsAction<C, B> {
    fn is_asynchronous(&self) -> bool {
        true
    }

    /// Arguments: `[log_type, filters]`, where `filters` may be omitted or `null`.
    fn run(&self, args: &[Value]) -> Result<Value, ActionError> {
        let (log_type, filters) = parse_args(args)?;
        let fetched = self.fetch(log_type, filters)?;
        Ok(json!({ "blobstore_id": fetched.blobstore_id }))
    }
}

fn parse_args(args: &[Value]) -> Result<(&str, Vec<String>), ActionError> {
    let log_type = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidInput("Invalid log type".into()))?;

    let invalid_filters = || ActionError::InvalidInput("Invalid filters".into());
    let filters = match args.get(1) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(invalid_filters))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid_filters()),
    };

    Ok((log_type, filters))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        error::Error,
        fs,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use tempfile::TempDir;

    use crate::{
        blobstore::{self, BlobstoreError, CreatedBlob, LocalBlobstore},
        compressor::{self, CompressError, Tarball, TarballCompressor},
    };

    /// Records each call and writes a real file so cleanup is observable.
    struct RecordingCompressor {
        scratch: TempDir,
        fail: bool,
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
        produced: Mutex<Vec<PathBuf>>,
        counter: AtomicUsize,
    }

    impl RecordingCompressor {
        fn new() -> Self {
            Self {
                scratch: TempDir::new().unwrap(),
                fail: false,
                calls: Mutex::default(),
                produced: Mutex::default(),
                counter: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Compressor for RecordingCompressor {
        fn compress_files_in_dir(&self, dir: &Path, filters: &[String]) -> compressor::Result<Tarball> {
            self.calls
                .lock()
                .unwrap()
                .push((dir.to_path_buf(), filters.to_vec()));
            if self.fail {
                return Err(CompressError::SourceNotFound(dir.to_path_buf()));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let path = self.scratch.path().join(format!("{n}.tar.zst"));
            fs::write(&path, "tarball").unwrap();
            self.produced.lock().unwrap().push(path.clone());
            Ok(Tarball::new(path))
        }
    }

    /// Records uploads, and whether the artifact was on disk at upload time.
    #[derive(Default)]
    struct RecordingBlobstore {
        fail: bool,
        uploads: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl RecordingBlobstore {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn uploads(&self) -> Vec<(PathBuf, bool)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    impl Blobstore for RecordingBlobstore {
        fn create(&self, path: &Path) -> blobstore::Result<CreatedBlob> {
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            if self.fail {
                return Err(BlobstoreError::Transient {
                    message: "connection refused".into(),
                    source: None,
                });
            }
            Ok(CreatedBlob {
                id: "fake-blob-id".into(),
                fingerprint: None,
            })
        }

        fn get(&self, _id: &str, _destination: &Path) -> blobstore::Result<()> {
            unreachable!("fetch never downloads")
        }
    }

    fn action(
        compressor: RecordingCompressor,
        blobstore: RecordingBlobstore,
    ) -> LogsAction<RecordingCompressor, RecordingBlobstore> {
        LogsAction::new(compressor, blobstore, "/var/vcap")
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    // ── Validation ──

    #[test]
    fn invalid_log_type_touches_nothing() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        for log_type in ["", "JOB", "system", "jobs"] {
            let err = action.fetch(log_type, Vec::new()).unwrap_err();
            assert!(matches!(&err, ActionError::InvalidInput(m) if m == "Invalid log type"));
        }

        assert!(action.compressor.calls().is_empty());
        assert!(action.blobstore.uploads().is_empty());
    }

    // ── Filters and directories ──

    #[test]
    fn job_defaults_to_log_files() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        action.fetch("job", Vec::new()).unwrap();

        let calls = action.compressor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PathBuf::from("/var/vcap/sys/log"));
        assert_eq!(calls[0].1, ["**/*.log"]);
    }

    #[test]
    fn agent_defaults_to_everything() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        action.fetch("agent", Vec::new()).unwrap();

        let calls = action.compressor.calls();
        assert_eq!(calls[0].0, PathBuf::from("/var/vcap/bosh/log"));
        assert_eq!(calls[0].1, ["**/*"]);
    }

    #[test]
    fn caller_filters_replace_defaults() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        action.fetch("job", strings(&["foo/*.txt"])).unwrap();

        assert_eq!(action.compressor.calls()[0].1, ["foo/*.txt"]);
    }

    #[test]
    fn directories_follow_base_dir() {
        for base in ["/var/vcap", "/tmp/agent-base", "relative/base"] {
            let base = Path::new(base);
            assert_eq!(LogType::Job.logs_dir(base), base.join("sys/log"));
            assert_eq!(LogType::Agent.logs_dir(base), base.join("bosh/log"));
        }
    }

    // ── Failures ──

    #[test]
    fn compression_failure_skips_upload() {
        let action = action(RecordingCompressor::failing(), RecordingBlobstore::default());

        let err = action.fetch("job", Vec::new()).unwrap_err();

        assert!(matches!(
            &err,
            ActionError::CompressionFailed(CompressError::SourceNotFound(_))
        ));
        assert!(err.source().is_some());
        assert!(action.blobstore.uploads().is_empty());
    }

    #[test]
    fn upload_failure_wraps_cause_and_removes_tarball() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::failing());

        let err = action.fetch("agent", Vec::new()).unwrap_err();

        let ActionError::UploadFailed(cause) = &err else {
            panic!("expected UploadFailed, got {err:?}");
        };
        assert!(cause.is_transient());
        assert!(err.is_retryable());

        let produced = action.compressor.produced.lock().unwrap().clone();
        assert_eq!(produced.len(), 1);
        assert!(!produced[0].exists());
    }

    // ── Success ──

    #[test]
    fn success_returns_blob_id_and_removes_tarball() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        let result = action.run(&[json!("job")]).unwrap();

        assert_eq!(result, json!({ "blobstore_id": "fake-blob-id" }));

        let uploads = action.blobstore.uploads();
        assert_eq!(uploads.len(), 1);
        let (uploaded, existed_at_upload) = &uploads[0];
        assert!(*existed_at_upload);
        assert!(!uploaded.exists());
    }

    #[test]
    fn declares_itself_asynchronous() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());
        assert!(action.is_asynchronous());
    }

    // ── Argument decoding ──

    #[test]
    fn run_accepts_null_or_missing_filters() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        action.run(&[json!("job"), Value::Null]).unwrap();
        action.run(&[json!("job")]).unwrap();
        action.run(&[json!("job"), json!(["**/*.err"])]).unwrap();

        let filters: Vec<Vec<String>> = action.compressor.calls().into_iter().map(|c| c.1).collect();
        assert_eq!(
            filters,
            [strings(&["**/*.log"]), strings(&["**/*.log"]), strings(&["**/*.err"])]
        );
    }

    #[test]
    fn run_rejects_malformed_arguments() {
        let action = action(RecordingCompressor::new(), RecordingBlobstore::default());

        for args in [
            vec![],
            vec![json!(7)],
            vec![json!("job"), json!("**/*.log")],
            vec![json!("job"), json!([1, 2])],
        ] {
            let err = action.run(&args).unwrap_err();
            assert!(matches!(err, ActionError::InvalidInput(_)), "{args:?}");
        }

        assert!(action.compressor.calls().is_empty());
    }

    // ── End to end ──

    #[test]
    fn concurrent_fetches_use_separate_artifacts() {
        let base = TempDir::new().unwrap();
        fs::create_dir_all(base.path().join("sys/log/nats")).unwrap();
        fs::write(base.path().join("sys/log/nats/nats.log"), "job log").unwrap();
        fs::create_dir_all(base.path().join("bosh/log")).unwrap();
        fs::write(base.path().join("bosh/log/current"), "agent log").unwrap();

        let scratch = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        let action = LogsAction::new(
            TarballCompressor::new(scratch.path()),
            LocalBlobstore::new(blobs.path()),
            base.path(),
        );

        let (job, agent) = thread::scope(|s| {
            let job = s.spawn(|| action.fetch("job", Vec::new()));
            let agent = s.spawn(|| action.fetch("agent", Vec::new()));
            (job.join().unwrap(), agent.join().unwrap())
        });
        let job = job.unwrap();
        let agent = agent.unwrap();

        assert_ne!(job.blobstore_id, agent.blobstore_id);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);

        let fetched = scratch.path().join("job.tar.zst");
        action.blobstore.get(&job.blobstore_id, &fetched).unwrap();
        let decoder = zstd::Decoder::new(fs::File::open(&fetched).unwrap()).unwrap();
        let names: Vec<String> = tar::Archive::new(decoder)
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["nats/nats.log"]);
    }

    #[test]
    fn missing_log_directory_is_reported() {
        let base = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let blobs = TempDir::new().unwrap();
        let action = LogsAction::new(
            TarballCompressor::new(scratch.path()),
            LocalBlobstore::new(blobs.path()),
            base.path(),
        );

        let err = action.fetch("job", Vec::new()).unwrap_err();

        assert!(matches!(
            err,
            ActionError::CompressionFailed(CompressError::SourceNotFound(_))
        ));
        assert_eq!(fs::read_dir(blobs.path()).unwrap().count(), 0);
    }
}
