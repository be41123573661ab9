//! Ingestion pipeline orchestration.
//!
//! Coordinates the full ingest flow: discover → load → chunk → embed →
//! upsert. Files are processed one at a time in sorted order. A file that
//! cannot be loaded (or has no text) is logged and counted, then handled by
//! the `on_error` policy. Embedding and vector store failures end the run.
//!
//! There is no rollback: chunks already upserted for a file stay in the
//! index if a later batch for the same file fails.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::chunk::CharSplitter;
use crate::config::{Config, OnError};
use crate::discover::discover_files;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::loader::{self, LoadError};
use crate::models::{Chunk, Document, VectorRecord};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::vector_store::{open_index, VectorStore};

/// Command-line options for `docqa ingest`.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Overrides `ingest.root`.
    pub root: Option<PathBuf>,
    pub dry_run: bool,
    pub limit: Option<usize>,
    /// Forces `on_error = abort`.
    pub fail_fast: bool,
    pub progress: ProgressMode,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            root: None,
            dry_run: false,
            limit: None,
            fail_fast: false,
            progress: ProgressMode::Off,
        }
    }
}

/// A file that failed to load.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_found: usize,
    pub files_ingested: usize,
    pub failures: Vec<FileFailure>,
    pub documents: usize,
    pub chunks: usize,
    pub upserted: usize,
    /// Set when `on_error = abort` stopped the run early.
    pub aborted: bool,
}

impl IngestReport {
    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Entry point for `docqa ingest`.
pub async fn run_ingest(config: &Config, opts: &IngestOptions) -> Result<IngestReport> {
    let root = opts
        .root
        .clone()
        .unwrap_or_else(|| config.ingest.root.clone());
    let on_error = if opts.fail_fast {
        OnError::Abort
    } else {
        config.ingest.on_error
    };
    let reporter = opts.progress.reporter();

    reporter.report(IngestProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let mut files = discover_files(&root, &config.ingest)?;
    if let Some(limit) = opts.limit {
        files.truncate(limit);
    }

    if files.is_empty() {
        println!("No files found in {}.", root.display());
        return Ok(IngestReport::default());
    }

    let splitter = CharSplitter::new(config.chunking.max_chars, config.chunking.overlap_chars)?;

    if opts.dry_run {
        let report = dry_run(&files, &splitter);
        println!("ingest {} (dry-run)", root.display());
        println!("  files found: {}", report.files_found);
        println!("  files loadable: {}", report.files_ingested);
        println!("  files failed: {}", report.files_failed());
        println!("  documents: {}", report.documents);
        println!(
            "  chunking: {} chars, {} overlap",
            splitter.max_chars(),
            splitter.overlap()
        );
        println!("  estimated chunks: {}", report.chunks);
        return Ok(report);
    }

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::from_config(config)?);
    let ensured = open_index(config, embedder.dims()).await?;

    let pipeline = Pipeline {
        splitter,
        embedder: embedder.as_ref(),
        store: &ensured.index,
        batch_size: config.embedding.batch_size,
        on_error,
        reporter: reporter.as_ref(),
    };
    let report = pipeline.run(&files).await?;

    println!("ingest {}", root.display());
    println!("  index: {}", ensured.description.name);
    println!("  embedding model: {}", embedder.model_name());
    println!("  files found: {}", report.files_found);
    println!("  files ingested: {}", report.files_ingested);
    println!("  files failed: {}", report.files_failed());
    println!("  documents: {}", report.documents);
    println!("  chunks upserted: {}", report.upserted);

    if report.aborted {
        if let Some(failure) = report.failures.last() {
            bail!(
                "Ingestion aborted at {}: {}",
                failure.path.display(),
                failure.error
            );
        }
    }
    println!("ok");
    Ok(report)
}

/// The per-file loop, independent of where vectors come from and go to.
pub struct Pipeline<'a> {
    pub splitter: CharSplitter,
    pub embedder: &'a dyn Embedder,
    pub store: &'a dyn VectorStore,
    pub batch_size: usize,
    pub on_error: OnError,
    pub reporter: &'a dyn IngestProgressReporter,
}

impl Pipeline<'_> {
    pub async fn run(&self, files: &[PathBuf]) -> Result<IngestReport> {
        let mut report = IngestReport {
            files_found: files.len(),
            ..Default::default()
        };
        let total = files.len() as u64;

        for (i, path) in files.iter().enumerate() {
            match load_file(path) {
                Ok(docs) => {
                    let (chunks, upserted) = self.ingest_documents(&docs).await?;
                    tracing::info!(
                        path = %path.display(),
                        documents = docs.len(),
                        chunks,
                        "ingested file"
                    );
                    report.files_ingested += 1;
                    report.documents += docs.len();
                    report.chunks += chunks;
                    report.upserted += upserted;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "{}",
                        self.on_error.action()
                    );
                    report.failures.push(FileFailure {
                        path: path.clone(),
                        error: err.to_string(),
                    });
                    if self.on_error == OnError::Abort {
                        report.aborted = true;
                        break;
                    }
                }
            }

            self.reporter.report(IngestProgressEvent::Ingesting {
                n: (i + 1) as u64,
                total,
                path: path.display().to_string(),
            });
        }

        Ok(report)
    }

    /// Chunk, embed and upsert. Returns `(chunks, upserted)`.
    async fn ingest_documents(&self, docs: &[Document]) -> Result<(usize, usize)> {
        let chunks: Vec<Chunk> = docs
            .iter()
            .flat_map(|doc| self.splitter.split_document(doc))
            .collect();

        let ingested_at = Utc::now().to_rfc3339();
        let mut upserted = 0;

        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .context("Embedding request failed")?;

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| to_record(chunk, values, &ingested_at))
                .collect();

            upserted += self
                .store
                .upsert(&records)
                .await
                .context("Vector upsert failed")?;
        }

        Ok((chunks.len(), upserted))
    }
}

/// Load a file into non-empty documents.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoadError> {
    let docs = loader::load(path)?.into_documents(path)?;
    if docs.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(docs)
}

fn to_record(chunk: &Chunk, values: Vec<f32>, ingested_at: &str) -> VectorRecord {
    let mut metadata = chunk.metadata.clone();
    metadata.insert("text".to_string(), Value::String(chunk.text.clone()));
    metadata.insert("chunk_index".to_string(), Value::from(chunk.index as u64));
    metadata.insert("content_hash".to_string(), Value::String(chunk.hash.clone()));
    metadata.insert(
        "ingested_at".to_string(),
        Value::String(ingested_at.to_string()),
    );
    VectorRecord {
        id: Uuid::new_v4().to_string(),
        values,
        metadata,
    }
}

fn dry_run(files: &[PathBuf], splitter: &CharSplitter) -> IngestReport {
    let mut report = IngestReport {
        files_found: files.len(),
        ..Default::default()
    };
    for path in files {
        match load_file(path) {
            Ok(docs) => {
                report.files_ingested += 1;
                report.documents += docs.len();
                report.chunks += docs
                    .iter()
                    .map(|d| splitter.split(&d.text).count())
                    .sum::<usize>();
            }
            Err(err) => report.failures.push(FileFailure {
                path: path.clone(),
                error: err.to_string(),
            }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedChunk;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.chars().count() as f32]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<Vec<VectorRecord>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
            *self.calls.lock().unwrap() += 1;
            self.records.lock().unwrap().extend_from_slice(records);
            Ok(records.len())
        }
        async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "fail"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("401 Unauthorized")
        }
    }

    fn pipeline<'a>(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        on_error: OnError,
    ) -> Pipeline<'a> {
        Pipeline {
            splitter: CharSplitter::new(500, 50).unwrap(),
            embedder,
            store,
            batch_size: 2,
            on_error,
            reporter: &NoProgress,
        }
    }

    #[tokio::test]
    async fn long_file_becomes_three_chunks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("long.txt");
        std::fs::write(&path, "x".repeat(1200)).unwrap();

        let store = RecordingStore::default();
        let report = pipeline(&LenEmbedder, &store, OnError::Skip)
            .run(&[path.clone()])
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.upserted, 3);
        // batch_size 2 → two upserts
        assert_eq!(*store.calls.lock().unwrap(), 2);

        let records = store.records.lock().unwrap();
        let lengths: Vec<f32> = records.iter().map(|r| r.values[0]).collect();
        assert_eq!(lengths, vec![500.0, 500.0, 300.0]);
        let indexes: Vec<u64> = records
            .iter()
            .map(|r| r.metadata["chunk_index"].as_u64().unwrap())
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        for r in records.iter() {
            assert_eq!(r.metadata["source"], path.display().to_string());
            assert_eq!(r.metadata["file_type"], "txt");
            assert_eq!(r.metadata["content_hash"].as_str().unwrap().len(), 64);
            assert!(r.metadata["ingested_at"].is_string());
            assert!(Uuid::parse_str(&r.id).is_ok());
        }
    }

    #[tokio::test]
    async fn empty_file_is_skipped_and_next_file_ingested() {
        let tmp = tempfile::TempDir::new().unwrap();
        let empty = tmp.path().join("a_empty.txt");
        let good = tmp.path().join("b_good.txt");
        std::fs::write(&empty, "").unwrap();
        std::fs::write(&good, "hello world").unwrap();

        let store = RecordingStore::default();
        let report = pipeline(&LenEmbedder, &store, OnError::Skip)
            .run(&[empty.clone(), good])
            .await
            .unwrap();

        assert_eq!(report.files_ingested, 1);
        assert_eq!(report.files_failed(), 1);
        assert_eq!(report.failures[0].path, empty);
        assert!(!report.aborted);
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bad = tmp.path().join("a.pdf");
        let good = tmp.path().join("b.txt");
        std::fs::write(&bad, b"not a pdf").unwrap();
        std::fs::write(&good, "hello").unwrap();

        let store = RecordingStore::default();
        let report = pipeline(&LenEmbedder, &store, OnError::Abort)
            .run(&[bad, good])
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.files_ingested, 0);
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let store = RecordingStore::default();
        let err = pipeline(&FailingEmbedder, &store, OnError::Skip)
            .run(&[path])
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("401"));
    }

    #[test]
    fn whitespace_only_file_has_no_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("blank.md");
        std::fs::write(&path, "  \n\n ").unwrap();
        assert!(matches!(load_file(&path), Err(LoadError::Empty)));
    }

    #[test]
    fn dry_run_counts_without_network() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, "y".repeat(1200)).unwrap();
        std::fs::write(&b, "").unwrap();
        let report = dry_run(&[a, b], &CharSplitter::new(500, 50).unwrap());
        assert_eq!(report.files_ingested, 1);
        assert_eq!(report.files_failed(), 1);
        assert_eq!(report.chunks, 3);
    }
}
