use crate::export;
use crate::loader::{self, LoadReport, Record, RecordAudit};
use crate::schema::NodeKind;
use crate::store::KnowledgeStore;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A directory holding one `<collection>.yaml` file per node kind.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: NodeKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    /// Reads the raw records of one kind. A missing file is an empty collection.
    pub fn read_collection(&self, kind: NodeKind) -> Result<Vec<Record>> {
        let path = self.path_for(kind);
        if !path.exists() {
            debug!(path = %path.display(), "collection file missing, treating as empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read collection file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: Record = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse collection file: {}", path.display()))?;
        match parsed {
            Record::Null => Ok(Vec::new()),
            Record::Array(records) => Ok(records),
            other => bail!(
                "Collection file {} must hold a list of records, found {}",
                path.display(),
                describe(&other)
            ),
        }
    }

    /// Builds a fresh store from every collection file.
    pub fn load(&self) -> Result<(KnowledgeStore, LoadReport)> {
        let mut store = KnowledgeStore::new();
        let mut report = LoadReport::default();
        for kind in NodeKind::ALL {
            let records = self.read_collection(kind)?;
            loader::load_into(&mut store, kind, &records, &mut report)?;
        }
        info!(root = %self.root.display(), "{}", report.summary());
        Ok((store, report))
    }

    /// Writes the store back out, one file per kind. Files of empty kinds are removed.
    pub fn save(&self, store: &KnowledgeStore) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data directory: {}", self.root.display()))?;

        for kind in NodeKind::ALL {
            let path = self.path_for(kind);
            let records = export::collection(store, kind)?;
            if records.is_empty() {
                if path.exists() {
                    fs::remove_file(&path)
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                }
                continue;
            }

            let yaml = serde_yaml::to_string(&records)?;
            fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
            debug!(path = %path.display(), count = records.len(), "saved collection");
        }
        info!(root = %self.root.display(), nodes = store.len(), "store saved");
        Ok(())
    }

    /// Schema audit over the raw files, without building a store.
    pub fn audit(&self) -> Result<Vec<RecordAudit>> {
        let mut audits = Vec::new();
        for kind in NodeKind::ALL {
            let records = self.read_collection(kind)?;
            audits.extend(loader::audit_records(kind, &records));
        }
        Ok(audits)
    }
}

fn describe(value: &Record) -> &'static str {
    match value {
        Record::Null => "null",
        Record::Bool(_) => "a boolean",
        Record::Number(_) => "a number",
        Record::String(_) => "a string",
        Record::Array(_) => "a list",
        Record::Object(_) => "a mapping",
    }
}
