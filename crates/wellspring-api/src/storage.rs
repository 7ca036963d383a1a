use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest accepted proof upload.
pub const MAX_PROOF_SIZE: usize = 20 * 1024 * 1024;

/// Content types accepted as proof, with the extension they are stored under.
const PROOF_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    // Ignore parameters such as "; charset=..."
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    PROOF_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    PROOF_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

pub struct StoredProof {
    pub file_name: String,
    pub sha256: String,
}

/// Proof-of-completion files on disk, flat under one directory and named
/// `{uuid}.{ext}`.
pub struct ProofStorage {
    dir: PathBuf,
}

impl ProofStorage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Proof storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        // Only names this store generated are valid
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name.starts_with('.')
            || file_name.contains("..")
        {
            bail!("invalid proof file name '{}'", file_name);
        }
        Ok(self.dir.join(file_name))
    }

    pub async fn save(&self, data: &[u8], extension: &str) -> Result<StoredProof> {
        let sha256 = hex::encode(Sha256::digest(data));
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.path_for(&file_name)?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(StoredProof { file_name, sha256 })
    }

    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(file_name)?;
        Ok(fs::read(&path).await?)
    }

    pub async fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.path_for(file_name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted proof {}", file_name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Proof {} already gone", file_name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
