use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

use crate::checksum::sha256_hex;
use crate::constants::{
    BLOB_NAME_DIGEST_LEN, DATA_DIR_NAME, METADATA_DIR_NAME, METADATA_EXT, TMP_DIR_NAME,
};
use crate::node_api::{FileId, NodeError};

/// `{file_id}_{digest of file_name}`. Doubles as the node's local reference.
///
/// The length is fixed regardless of the user's name, so any accepted name
/// fits within the filesystem's component limit. The sidecar keeps the real name.
pub fn blob_name(file_id: FileId, file_name: &str) -> String {
    let digest = sha256_hex(file_name.as_bytes());
    format!("{}_{}", file_id, &digest[..BLOB_NAME_DIGEST_LEN])
}

pub fn file_id_from_blob_name(blob: &str) -> Option<FileId> {
    let (id, _) = blob.split_once('_')?;
    id.parse().ok()
}

/// Local references are bare blob names; anything that could walk out of
/// the data directory is refused.
pub fn validate_local_ref(local_ref: &str) -> Result<(), NodeError> {
    if local_ref.is_empty()
        || local_ref.contains('/')
        || local_ref.contains('\\')
        || local_ref.contains("..")
    {
        return Err(NodeError::Invalid(format!("bad local reference: {local_ref}")));
    }
    Ok(())
}

pub fn data_path(root: &Path, blob: &str) -> PathBuf {
    root.join(DATA_DIR_NAME).join(blob)
}

pub fn metadata_path(root: &Path, blob: &str) -> PathBuf {
    root.join(METADATA_DIR_NAME)
        .join(format!("{blob}.{METADATA_EXT}"))
}

pub fn tmp_path(root: &Path, staging_id: &str) -> PathBuf {
    root.join(TMP_DIR_NAME).join(staging_id)
}

pub async fn init_dirs(root: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(root.join(DATA_DIR_NAME)).await?;
    fs::create_dir_all(root.join(METADATA_DIR_NAME)).await?;
    fs::create_dir_all(root.join(TMP_DIR_NAME)).await?;

    Ok(())
}

pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::File::open(&dir)?.sync_all())
        .await
        .map_err(io::Error::other)?
}

/// Removes a file, treating "already gone" as `Ok(false)`.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
