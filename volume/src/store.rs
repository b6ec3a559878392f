//! Reference implementation of the storage node contract on a local
//! filesystem: one blob per file under `data/`, a JSON sidecar per blob under
//! `metadata/`, and an in-memory id index rebuilt from the sidecars at startup.

use async_trait::async_trait;
use bytes::Bytes;
use nix::sys::statvfs::statvfs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use common::checksum::file_sha256;
use common::constants::{
    DATA_DIR_NAME, MAX_FILE_NAME_LEN, METADATA_DIR_NAME, METADATA_EXT, TMP_DIR_NAME,
};
use common::file_utils::{
    blob_name, data_path, file_exists, file_id_from_blob_name, fsync_dir, init_dirs,
    metadata_path, remove_if_exists, tmp_path, validate_local_ref,
};
use common::node_api::{FileId, NodeError, NodeInfo, StorageNode};
use common::time_utils::utc_now_ms;

/// Sidecar record persisted next to every blob.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlobMeta {
    pub file_id: FileId,
    pub file_name: String,
    pub size: u64,
    pub checksum: String,
    pub stored_at_ms: i64,
    pub blob: String,
}

pub struct LocalStore {
    node_id: String,
    root: PathBuf,
    index: RwLock<HashMap<FileId, BlobMeta>>,
    started: Instant,
}

/// Capacity of the filesystem holding `root`, as `(total, used, available)` bytes.
pub fn disk_usage(root: &Path) -> anyhow::Result<(u64, u64, u64)> {
    let v = statvfs(root)?;
    let total = v.blocks() as u64 * v.fragment_size() as u64;
    let available = v.blocks_available() as u64 * v.fragment_size() as u64;
    let used = total.saturating_sub(v.blocks_free() as u64 * v.fragment_size() as u64);
    Ok((total, used, available))
}

impl LocalStore {
    /// Creates the directory layout, sweeps staging leftovers and rebuilds
    /// the id index from the sidecars on disk.
    pub async fn open(root: impl Into<PathBuf>, node_id: impl Into<String>) -> anyhow::Result<Self> {
        let root = root.into();
        let node_id = node_id.into();
        init_dirs(&root).await?;

        let swept = sweep_tmp(&root).await?;
        if swept > 0 {
            info!(node_id = %node_id, swept, "removed stale staging files");
        }

        let index = load_index(&root).await?;
        info!(node_id = %node_id, files = index.len(), root = %root.display(), "local store opened");

        Ok(Self {
            node_id,
            root,
            index: RwLock::new(index),
            started: Instant::now(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self, file_id: FileId) -> Option<BlobMeta> {
        self.read_index().ok()?.get(&file_id).cloned()
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, HashMap<FileId, BlobMeta>>, NodeError> {
        self.index
            .read()
            .map_err(|e| NodeError::Storage(format!("index lock poisoned: {e}")))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, HashMap<FileId, BlobMeta>>, NodeError> {
        self.index
            .write()
            .map_err(|e| NodeError::Storage(format!("index lock poisoned: {e}")))
    }

    /// Blob name for `file_id`, taken from `local_ref` when given, else from the index.
    fn resolve_blob(&self, file_id: FileId, local_ref: Option<&str>) -> Result<String, NodeError> {
        match local_ref {
            Some(r) => {
                validate_local_ref(r)?;
                if file_id_from_blob_name(r) != Some(file_id) {
                    return Err(NodeError::Invalid(format!(
                        "local reference {r} does not belong to file {file_id}"
                    )));
                }
                Ok(r.to_string())
            }
            None => self
                .read_index()?
                .get(&file_id)
                .map(|m| m.blob.clone())
                .ok_or(NodeError::NotFound(file_id)),
        }
    }

    /// Writes `bytes` to a staging file and renames it over `dest`.
    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<(), NodeError> {
        let staging = tmp_path(&self.root, &Uuid::new_v4().to_string());
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&staging)
            .await?;
        f.write_all(bytes).await?;
        f.sync_all().await?;
        drop(f);

        if let Err(e) = fs::rename(&staging, dest).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        if let Some(parent) = dest.parent() {
            fsync_dir(parent).await?;
        }
        Ok(())
    }

    async fn remove_blob(&self, blob: &str) -> Result<bool, NodeError> {
        let data_removed = remove_if_exists(&data_path(&self.root, blob)).await?;
        let meta_removed = remove_if_exists(&metadata_path(&self.root, blob)).await?;
        Ok(data_removed || meta_removed)
    }
}

fn validate_store(
    file_id: FileId,
    file_name: &str,
    data: &[u8],
    checksum: &str,
) -> Result<(), NodeError> {
    if file_id <= 0 {
        return Err(NodeError::Invalid(format!("file id must be positive, got {file_id}")));
    }
    if file_name.trim().is_empty() {
        return Err(NodeError::Invalid("file name is blank".into()));
    }
    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(NodeError::Invalid("file name too long".into()));
    }
    if data.is_empty() {
        return Err(NodeError::Invalid("empty payload".into()));
    }
    if checksum.trim().is_empty() {
        return Err(NodeError::Invalid("missing checksum".into()));
    }
    Ok(())
}

async fn sweep_tmp(root: &Path) -> anyhow::Result<usize> {
    let mut swept = 0;
    let mut entries = fs::read_dir(root.join(TMP_DIR_NAME)).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
            swept += 1;
        }
    }
    Ok(swept)
}

async fn load_index(root: &Path) -> anyhow::Result<HashMap<FileId, BlobMeta>> {
    let mut index = HashMap::new();

    for entry in WalkDir::new(root.join(METADATA_DIR_NAME))
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT)
        {
            continue;
        }

        let meta: BlobMeta = match fs::read(path).await.map(|b| serde_json::from_slice(&b)) {
            Ok(Ok(meta)) => meta,
            Ok(Err(e)) => {
                warn!(path = %path.display(), "skipping unreadable sidecar: {e}");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), "skipping sidecar: {e}");
                continue;
            }
        };

        if !file_exists(&root.join(DATA_DIR_NAME).join(&meta.blob)).await {
            warn!(file_id = meta.file_id, blob = %meta.blob, "sidecar without blob, ignoring");
            continue;
        }
        index.insert(meta.file_id, meta);
    }

    Ok(index)
}

#[async_trait]
impl StorageNode for LocalStore {
    async fn store(
        &self,
        file_id: FileId,
        file_name: &str,
        data: Bytes,
        checksum: &str,
    ) -> Result<String, NodeError> {
        validate_store(file_id, file_name, &data, checksum)?;

        let blob = blob_name(file_id, file_name);
        let meta = BlobMeta {
            file_id,
            file_name: file_name.to_string(),
            size: data.len() as u64,
            checksum: checksum.to_string(),
            stored_at_ms: utc_now_ms(),
            blob: blob.clone(),
        };
        let sidecar = serde_json::to_vec(&meta)
            .map_err(|e| NodeError::Storage(format!("encode sidecar: {e}")))?;

        self.write_atomic(&data_path(&self.root, &blob), &data).await?;
        self.write_atomic(&metadata_path(&self.root, &blob), &sidecar)
            .await?;

        let previous = self.write_index()?.insert(file_id, meta);
        if let Some(prev) = previous
            && prev.blob != blob
        {
            self.remove_blob(&prev.blob).await?;
        }

        debug!(node_id = %self.node_id, file_id, size = data.len(), "stored");
        Ok(blob)
    }

    async fn retrieve(&self, file_id: FileId, local_ref: Option<&str>) -> Result<Bytes, NodeError> {
        let blob = self.resolve_blob(file_id, local_ref)?;
        match fs::read(data_path(&self.root, &blob)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(NodeError::NotFound(file_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, file_id: FileId, local_ref: Option<&str>) -> Result<bool, NodeError> {
        let blob = match self.resolve_blob(file_id, local_ref) {
            Ok(blob) => blob,
            Err(NodeError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let removed = self.remove_blob(&blob).await?;
        {
            let mut index = self.write_index()?;
            if index.get(&file_id).is_some_and(|m| m.blob == blob) {
                index.remove(&file_id);
            }
        }

        debug!(node_id = %self.node_id, file_id, removed, "deleted");
        Ok(removed)
    }

    async fn verify(
        &self,
        file_id: FileId,
        local_ref: Option<&str>,
        expected_checksum: &str,
    ) -> Result<bool, NodeError> {
        let blob = self.resolve_blob(file_id, local_ref)?;
        let path = data_path(&self.root, &blob);
        if !file_exists(&path).await {
            return Err(NodeError::NotFound(file_id));
        }

        let actual = file_sha256(&path).await?;
        Ok(actual.eq_ignore_ascii_case(expected_checksum))
    }

    async fn describe(&self) -> Result<NodeInfo, NodeError> {
        let (total, used, available) =
            disk_usage(&self.root).map_err(|e| NodeError::Storage(format!("statvfs: {e}")))?;
        let stored_files = self.read_index()?.len() as u64;

        Ok(NodeInfo {
            node_id: self.node_id.clone(),
            total_capacity: total,
            used_capacity: used,
            available_capacity: available,
            stored_files,
            uptime_secs: self.started.elapsed().as_secs(),
        })
    }

    async fn heartbeat(&self) -> Result<bool, NodeError> {
        Ok(true)
    }

    async fn list_stored_ids(&self) -> Result<Vec<FileId>, NodeError> {
        let mut ids: Vec<FileId> = self.read_index()?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
