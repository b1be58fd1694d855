use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{error, info, warn};
use url::Url;

use crate::object_store::{ObjectStore, UploadHints, sanitize_file_name};
use crate::record::{CanonicalJudgmentRecord, StatusUpdate};
use crate::requests::RequestClient;
use crate::store::JudgmentStore;

/// Source of document bytes.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// `Ok(None)` when there is no document at `url`.
    async fn fetch(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

#[async_trait]
impl DocumentFetcher for RequestClient {
    async fn fetch(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.fetch_bytes(url).await
    }
}

/// Downloads each stored judgment's documents and hands them to object
/// storage, moving the judgment through its processing states.
pub struct Archiver {
    fetcher: Box<dyn DocumentFetcher>,
    objects: Box<dyn ObjectStore>,
    base_url: Url,
    workdir: PathBuf,
}

/// Name for the `index`-th document of a judgment: the URL's last path
/// segment when it has one.
pub fn document_file_name(url: &Url, judgment_id: &str, index: usize) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(sanitize_file_name)
        .unwrap_or_else(|| format!("{}_{}.pdf", sanitize_file_name(judgment_id), index + 1))
}

impl Archiver {
    pub fn new(
        fetcher: Box<dyn DocumentFetcher>,
        objects: Box<dyn ObjectStore>,
        base_url: Url,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            objects,
            base_url,
            workdir: workdir.into(),
        }
    }

    /// Archives every document of `record`. Returns whether the judgment
    /// reached the completed state.
    pub async fn archive(&self, store: &dyn JudgmentStore, record: &CanonicalJudgmentRecord) -> bool {
        let id = record.judgment_id.as_str();
        if record.document_links.is_empty() {
            set_status(store, id, StatusUpdate::Failed { error: "no document links".to_string() }).await;
            return false;
        }
        for (index, link) in record.document_links.iter().enumerate() {
            if let Err(reason) = self.archive_document(store, record, link, index).await {
                warn!("Archiving {} for {} failed: {}", link, id, reason);
                set_status(store, id, StatusUpdate::Failed { error: reason }).await;
                return false;
            }
        }
        set_status(store, id, StatusUpdate::Completed).await;
        info!("Archived {} documents for {}", record.document_links.len(), id);
        true
    }

    async fn archive_document(
        &self,
        store: &dyn JudgmentStore,
        record: &CanonicalJudgmentRecord,
        link: &str,
        index: usize,
    ) -> Result<(), String> {
        let url = self
            .base_url
            .join(link)
            .map_err(|e| format!("bad document link {link:?}: {e}"))?;
        let bytes = match self.fetcher.fetch(url.as_str()).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(format!("no document at {url}")),
            Err(e) => return Err(format!("download failed: {e}")),
        };

        let file_name = document_file_name(&url, &record.judgment_id, index);
        let local_path = self.workdir.join(&file_name);
        write_file(&local_path, &bytes)
            .await
            .map_err(|e| format!("could not write {}: {e}", local_path.display()))?;
        set_status(
            store,
            &record.judgment_id,
            StatusUpdate::Downloaded {
                file_name: file_name.clone(),
                file_size: bytes.len() as u64,
            },
        )
        .await;

        let hints = UploadHints {
            judgment_id: record.judgment_id.clone(),
            judgment_date: record.judgment_date.clone(),
            file_name,
        };
        let uploaded = self.objects.upload(&local_path, &hints).await;
        if let Err(e) = tokio::fs::remove_file(&local_path).await {
            warn!("Could not remove {}: {}", local_path.display(), e);
        }
        let location = uploaded.ok_or_else(|| "upload failed".to_string())?;
        set_status(store, &record.judgment_id, StatusUpdate::Uploaded { location }).await;
        Ok(())
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

async fn set_status(store: &dyn JudgmentStore, judgment_id: &str, update: StatusUpdate) {
    match store.update_status(judgment_id, &update).await {
        Ok(true) => {}
        Ok(false) => warn!("No stored judgment {} to mark {}", judgment_id, update.status()),
        Err(e) => error!("Could not mark {} {}: {}", judgment_id, update.status(), e),
    }
}
