//! Image acquisition helper shared by local provider drivers (§4.4.3):
//! `DownloadUnpack` fetches a `.tar.xz` archive, verifies its checksum,
//! and unpacks it to `outDir/<name>-<version>/`. Single-flight per
//! `(name, version)` is enforced with an on-disk file lock so two drivers
//! (or two applications racing for the same image) never unpack twice.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use fd_lock::RwLock as FileLock;
use tracing::{debug, info, warn};

use crate::error::{FishError, FishResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgo {
    /// Parses a declared sum of the form `algo:hex`, e.g. `sha256:deadbeef`.
    /// Returns `None` if the format or algorithm is unrecognized — callers
    /// treat that as a validation failure, not a download-time error.
    pub fn parse(declared: &str) -> Option<(Self, &str)> {
        let (algo, hex) = declared.split_once(':')?;
        let algo = match algo.to_ascii_lowercase().as_str() {
            "md5" => ChecksumAlgo::Md5,
            "sha1" => ChecksumAlgo::Sha1,
            "sha256" => ChecksumAlgo::Sha256,
            "sha512" => ChecksumAlgo::Sha512,
            _ => return None,
        };
        Some((algo, hex))
    }

    pub fn header_name(self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "X-Checksum-Md5",
            ChecksumAlgo::Sha1 => "X-Checksum-Sha1",
            ChecksumAlgo::Sha256 => "X-Checksum-Sha256",
            ChecksumAlgo::Sha512 => "X-Checksum-Sha512",
        }
    }

    fn digest_hex(self, bytes: &[u8]) -> String {
        match self {
            ChecksumAlgo::Md5 => format!("{:x}", md5::compute(bytes)),
            ChecksumAlgo::Sha1 => {
                use sha1::{Digest, Sha1};
                hex(&Sha1::digest(bytes))
            }
            ChecksumAlgo::Sha256 => {
                use sha2::{Digest, Sha256};
                hex(&Sha256::digest(bytes))
            }
            ChecksumAlgo::Sha512 => {
                use sha2::{Digest, Sha512};
                hex(&Sha512::digest(bytes))
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl std::fmt::Display for ChecksumAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha1 => "sha1",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha512 => "sha512",
        };
        write!(f, "{name}")
    }
}

pub struct Image {
    pub name: String,
    pub version: String,
    pub url: String,
    pub checksum: Option<String>,
}

impl Image {
    /// Downloads and unpacks the image into `out_dir/<name>-<version>/`.
    /// A pre-existing, fully unpacked directory is treated as already
    /// done (idempotent). Any failure leaves no partial directory behind.
    pub async fn download_unpack(
        &self,
        out_dir: &Path,
        user: Option<&str>,
        password: Option<&str>,
    ) -> FishResult<PathBuf> {
        let dest = out_dir.join(format!("{}-{}", self.name, self.version));
        if dest.is_dir() {
            debug!(path = %dest.display(), "image already unpacked");
            return Ok(dest);
        }

        fs::create_dir_all(out_dir)?;
        let lock_path = out_dir.join(format!(".{}-{}.lock", self.name, self.version));
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        let mut lock = FileLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| FishError::driver(format!("failed to lock image download: {e}"), true))?;

        // Re-check after acquiring the lock: another process may have
        // finished the unpack while we waited.
        if dest.is_dir() {
            return Ok(dest);
        }

        let declared = match self.checksum.as_deref() {
            Some(sum) => Some(ChecksumAlgo::parse(sum).ok_or_else(|| {
                FishError::Validation(format!("unrecognized checksum format: {sum}"))
            })?),
            None => None,
        };

        let bytes = self.fetch(user, password).await?;

        if let Some((algo, declared_hex)) = declared {
            let actual = algo.digest_hex(&bytes);
            if actual != declared_hex {
                return Err(FishError::Validation(format!(
                    "{algo} checksum mismatch: expected {declared_hex}, got {actual}"
                )));
            }
        }

        match self.unpack(&bytes, &dest) {
            Ok(()) => Ok(dest),
            Err(e) => {
                let _ = fs::remove_dir_all(&dest);
                Err(e)
            }
        }
    }

    async fn fetch(&self, user: Option<&str>, password: Option<&str>) -> FishResult<Vec<u8>> {
        let client = reqwest::Client::new();
        let mut req = client.get(&self.url);
        if let Some(user) = user {
            req = req.basic_auth(user, password);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FishError::driver(format!("image download failed: {e}"), true))?;

        if let Some((algo, declared_hex)) = self.checksum.as_deref().and_then(ChecksumAlgo::parse) {
            if let Some(header) = resp.headers().get(algo.header_name()) {
                if let Ok(advertised) = header.to_str() {
                    if advertised != declared_hex {
                        return Err(FishError::Validation(format!(
                            "server-advertised {algo} checksum {advertised} disagrees with declared {declared_hex}"
                        )));
                    }
                }
            }
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FishError::driver(format!("image download failed: {e}"), true))
    }

    fn unpack(&self, xz_bytes: &[u8], dest: &Path) -> FishResult<()> {
        let mut decompressed = Vec::new();
        xz2::read::XzDecoder::new(xz_bytes).read_to_end(&mut decompressed)?;

        let mut archive = tar::Archive::new(decompressed.as_slice());
        fs::create_dir_all(dest)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            if path.components().any(|c| c == std::path::Component::ParentDir) {
                warn!(path = %path.display(), "refusing tar entry with parent-directory component");
                return Err(FishError::Validation(format!(
                    "archive entry escapes output directory: {}",
                    path.display()
                )));
            }
            entry.unpack_in(dest)?;
        }
        info!(path = %dest.display(), "image unpacked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_algorithms() {
        assert_eq!(
            ChecksumAlgo::parse("sha256:abc"),
            Some((ChecksumAlgo::Sha256, "abc"))
        );
        assert_eq!(ChecksumAlgo::parse("md5:abc"), Some((ChecksumAlgo::Md5, "abc")));
        assert_eq!(ChecksumAlgo::parse("crc32:abc"), None);
        assert_eq!(ChecksumAlgo::parse("no-colon"), None);
    }

    #[test]
    fn digest_matches_known_vector() {
        let digest = ChecksumAlgo::Sha256.digest_hex(b"");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn md5_digest_matches_known_vector() {
        let digest = ChecksumAlgo::Md5.digest_hex(b"abc");
        assert_eq!(digest, "900150983cd24fb0d6963f7d28e17f72");
    }
}
