//! File-based document sinks for the CLI.
//!
//! Both sinks stream: each document is serialized and written as it
//! arrives, so exports never hold a table in memory. Both honor the
//! commit/abort contract by deleting partially written files on abort.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use docport_core::error::ExportError;
use docport_core::models::Document;
use docport_core::sink::DocumentSink;
use docport_core::Result;

/// One open per-collection output file.
struct CollectionFile {
    path: PathBuf,
    file: File,
    documents: u64,
}

/// Writes each collection as `<directory>/<collection>.json`, a JSON
/// array with one element per document.
pub struct JsonArrayFileSink {
    directory: PathBuf,
    files: BTreeMap<String, CollectionFile>,
}

impl JsonArrayFileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            files: BTreeMap::new(),
        }
    }

    async fn open_collection(&mut self, collection: &str) -> Result<&mut CollectionFile> {
        match self.files.entry(collection.to_string()) {
            std::collections::btree_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::btree_map::Entry::Vacant(entry) => {
                tokio::fs::create_dir_all(&self.directory)
                    .await
                    .map_err(|e| {
                        ExportError::io(
                            format!("failed to create {}", self.directory.display()),
                            e,
                        )
                    })?;

                let path = self
                    .directory
                    .join(format!("{}.json", sanitize_file_name(collection)));
                let mut file = File::create(&path).await.map_err(|e| {
                    ExportError::io(format!("failed to create {}", path.display()), e)
                })?;
                file.write_all(b"[").await.map_err(|e| {
                    ExportError::io(format!("failed to write {}", path.display()), e)
                })?;

                Ok(entry.insert(CollectionFile {
                    path,
                    file,
                    documents: 0,
                }))
            }
        }
    }
}

#[async_trait]
impl DocumentSink for JsonArrayFileSink {
    async fn insert_document(&mut self, collection: &str, document: &Document) -> Result<()> {
        let line = serde_json::to_string(&document.to_json()).map_err(|e| ExportError::Json {
            context: format!("failed to serialize document for '{collection}'"),
            source: e,
        })?;

        let entry = self.open_collection(collection).await?;
        let prefix = if entry.documents == 0 { "\n  " } else { ",\n  " };

        entry
            .file
            .write_all(prefix.as_bytes())
            .await
            .map_err(|e| ExportError::io(format!("failed to write {}", entry.path.display()), e))?;
        entry
            .file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ExportError::io(format!("failed to write {}", entry.path.display()), e))?;
        entry.documents += 1;

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        for entry in self.files.values_mut() {
            entry
                .file
                .write_all(b"\n]\n")
                .await
                .map_err(|e| {
                    ExportError::io(format!("failed to finalize {}", entry.path.display()), e)
                })?;
            entry.file.flush().await.map_err(|e| {
                ExportError::io(format!("failed to flush {}", entry.path.display()), e)
            })?;
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        for (_, entry) in std::mem::take(&mut self.files) {
            tracing::warn!("removing partial output file {}", entry.path.display());
            drop(entry.file);
            tokio::fs::remove_file(&entry.path).await.map_err(|e| {
                ExportError::io(format!("failed to remove {}", entry.path.display()), e)
            })?;
        }
        Ok(())
    }
}

enum LineTarget {
    Stdout(tokio::io::Stdout),
    File { path: PathBuf, file: File },
}

/// Writes one JSON document per line, to a file or to standard output.
/// Used for single-table dumps.
pub struct JsonLinesSink {
    target: LineTarget,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self {
            target: LineTarget::Stdout(tokio::io::stdout()),
        }
    }

    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .await
            .map_err(|e| ExportError::io(format!("failed to create {}", path.display()), e))?;
        Ok(Self {
            target: LineTarget::File {
                path: path.to_path_buf(),
                file,
            },
        })
    }
}

#[async_trait]
impl DocumentSink for JsonLinesSink {
    async fn insert_document(&mut self, collection: &str, document: &Document) -> Result<()> {
        let mut line =
            serde_json::to_string(&document.to_json()).map_err(|e| ExportError::Json {
                context: format!("failed to serialize document for '{collection}'"),
                source: e,
            })?;
        line.push('\n');

        match &mut self.target {
            LineTarget::Stdout(stdout) => stdout
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ExportError::io("failed to write to stdout", e)),
            LineTarget::File { path, file } => file
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ExportError::io(format!("failed to write {}", path.display()), e)),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match &mut self.target {
            LineTarget::Stdout(stdout) => stdout
                .flush()
                .await
                .map_err(|e| ExportError::io("failed to flush stdout", e)),
            LineTarget::File { path, file } => file
                .flush()
                .await
                .map_err(|e| ExportError::io(format!("failed to flush {}", path.display()), e)),
        }
    }

    async fn abort(&mut self) -> Result<()> {
        if let LineTarget::File { path, .. } = &self.target {
            tracing::warn!("removing partial output file {}", path.display());
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| ExportError::io(format!("failed to remove {}", path.display()), e))?;
        }
        Ok(())
    }
}

/// Keeps collection-derived file names inside the output directory.
fn sanitize_file_name(collection: &str) -> String {
    collection
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}
