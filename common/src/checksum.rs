//! SHA-256 helpers shared by the coordinator and the nodes. Both sides must
//! produce the same lower-case hex string for the same bytes.

use sha2::{Digest, Sha256};
use std::{io, path::Path};
use tokio::{fs::File, io::AsyncReadExt};

const READ_BUF_SIZE: usize = 1024 * 1024;

pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

pub async fn file_sha256(path: &Path) -> io::Result<String> {
    let mut f = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = f.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
