use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::{error, info};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::date_range::FORM_DATE_FORMAT;

/// Where an uploaded document ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// What the uploader knows about the document it is placing.
#[derive(Debug, Clone)]
pub struct UploadHints {
    pub judgment_id: String,
    /// `dd-mm-yyyy`, when known.
    pub judgment_date: Option<String>,
    pub file_name: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `None` when the upload did not happen.
    async fn upload(&self, local_path: &Path, hints: &UploadHints) -> Option<ObjectDescriptor>;
}

/// Keeps file names to a safe character set. Runs of replaced characters
/// become one `_`, and none is left in front of a `.`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '.' && cleaned.ends_with('_') {
            cleaned.pop();
        }
        if c == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(c);
    }
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<prefix><yyyy>/<mm>/<file>`, or `<prefix>unknown_date/<file>`.
pub fn object_key(prefix: &str, hints: &UploadHints) -> String {
    let folder = hints
        .judgment_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), FORM_DATE_FORMAT).ok())
        .map(|d| format!("{:04}/{:02}", d.year(), d.month()))
        .unwrap_or_else(|| "unknown_date".to_string());
    format!("{prefix}{folder}/{}", sanitize_file_name(&hints.file_name))
}

/// Object storage on the local filesystem: `root` plays the bucket.
pub struct LocalObjectStore {
    root: PathBuf,
    prefix: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    async fn copy_into_place(&self, local_path: &Path, key: &str) -> anyhow::Result<ObjectDescriptor> {
        let destination = self.root.join(key);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let size = tokio::fs::copy(local_path, &destination)
            .await
            .with_context(|| format!("copying {} to {}", local_path.display(), destination.display()))?;
        let absolute = tokio::fs::canonicalize(&destination).await?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| anyhow::anyhow!("no file URL for {}", absolute.display()))?;
        Ok(ObjectDescriptor {
            bucket: self.root.display().to_string(),
            key: key.to_string(),
            url: url.to_string(),
            size,
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, local_path: &Path, hints: &UploadHints) -> Option<ObjectDescriptor> {
        let key = object_key(&self.prefix, hints);
        match self.copy_into_place(local_path, &key).await {
            Ok(descriptor) => {
                info!("Stored {} as {}", local_path.display(), descriptor.key);
                Some(descriptor)
            }
            Err(e) => {
                error!("Upload of {} for {} failed: {:#}", local_path.display(), hints.judgment_id, e);
                None
            }
        }
    }
}
