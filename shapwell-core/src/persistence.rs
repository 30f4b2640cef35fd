//! Shared persistence utilities: atomic file writes, JSON load/save and
//! the versioned binary envelope used for model and background artifacts.
//!
//! Artifacts are written to a `.tmp` sibling and renamed into place, so a
//! reader never observes a half-written model. Each artifact gets a JSON
//! manifest next to it carrying its digest and shape; when the manifest is
//! present on load, the artifact bytes must match its digest.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::ArtifactError;
use crate::shape::InputShape;

/// Magic bytes at the start of every binary artifact.
pub const ARTIFACT_MAGIC: &[u8; 4] = b"SHPW";

/// Binary envelope version understood by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes to a `.tmp` sibling file,
/// then atomically renames to the target path.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then atomically renames to the target path.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Header stored in front of every binary artifact payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// What the payload is, e.g. `"model"` or `"background"`.
    pub kind: String,
    pub version: u32,
    /// Per-instance shape the payload was produced for.
    pub input_shape: InputShape,
    pub created_at: DateTime<Utc>,
}

/// JSON sidecar describing a written artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub kind: String,
    pub file: PathBuf,
    pub input_shape: InputShape,
    pub sha256: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Path of the manifest sidecar for an artifact at `path`.
pub fn manifest_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".manifest.json");
    path.with_file_name(name)
}

/// Encode `payload` behind an [`ArtifactHeader`] and write it atomically,
/// followed by its manifest sidecar.
pub fn save_artifact<T: Serialize>(
    path: &Path,
    kind: &str,
    input_shape: InputShape,
    payload: &T,
) -> Result<ArtifactManifest, ArtifactError> {
    let header = ArtifactHeader {
        kind: kind.to_string(),
        version: ARTIFACT_FORMAT_VERSION,
        input_shape,
        created_at: Utc::now(),
    };

    let mut bytes = ARTIFACT_MAGIC.to_vec();
    bincode::serialize_into(&mut bytes, &header).map_err(|e| ArtifactError::Encode {
        message: e.to_string(),
    })?;
    bincode::serialize_into(&mut bytes, payload).map_err(|e| ArtifactError::Encode {
        message: e.to_string(),
    })?;

    atomic_write(path, &bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest = ArtifactManifest {
        kind: header.kind,
        file: path.to_path_buf(),
        input_shape,
        sha256: sha256_hex(&bytes),
        size_bytes: bytes.len() as u64,
        created_at: header.created_at,
    };
    let sidecar = manifest_path(path);
    atomic_write_json(&sidecar, &manifest).map_err(|source| ArtifactError::Io {
        path: sidecar,
        source,
    })?;

    tracing::debug!(
        path = %path.display(),
        kind,
        bytes = manifest.size_bytes,
        "Artifact written"
    );
    Ok(manifest)
}

/// Compare `bytes` against the digest in the manifest sidecar of `path`.
///
/// A missing sidecar is tolerated; an unreadable one is a decode error.
fn verify_manifest(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let sidecar = manifest_path(path);
    let manifest: Option<ArtifactManifest> =
        load_json(&sidecar).map_err(|e| ArtifactError::Decode {
            path: sidecar.clone(),
            message: e.to_string(),
        })?;
    let Some(manifest) = manifest else {
        tracing::warn!(path = %path.display(), "Artifact has no manifest, digest not verified");
        return Ok(());
    };

    let actual = sha256_hex(bytes);
    if actual != manifest.sha256 {
        return Err(ArtifactError::DigestMismatch {
            path: path.to_path_buf(),
            expected: manifest.sha256,
            actual,
        });
    }
    Ok(())
}

/// Read an artifact written by [`save_artifact`], checking the manifest
/// digest, magic, kind and version.
pub fn load_artifact<T: DeserializeOwned>(
    path: &Path,
    kind: &str,
) -> Result<(ArtifactHeader, T), ArtifactError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArtifactError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    verify_manifest(path, &bytes)?;

    let decode_err = |message: String| ArtifactError::Decode {
        path: path.to_path_buf(),
        message,
    };

    let mut cursor = Cursor::new(bytes.as_slice());
    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| decode_err("file is too short".into()))?;
    if &magic != ARTIFACT_MAGIC {
        return Err(decode_err("not a shapwell artifact".into()));
    }

    let header: ArtifactHeader =
        bincode::deserialize_from(&mut cursor).map_err(|e| decode_err(e.to_string()))?;
    if header.kind != kind {
        return Err(ArtifactError::WrongKind {
            path: path.to_path_buf(),
            expected: kind.to_string(),
            actual: header.kind,
        });
    }
    if header.version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            path: path.to_path_buf(),
            expected: ARTIFACT_FORMAT_VERSION,
            actual: header.version,
        });
    }

    let payload: T =
        bincode::deserialize_from(&mut cursor).map_err(|e| decode_err(e.to_string()))?;
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        count: u32,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.json");

        let data = TestData {
            name: "hello".into(),
            count: 42,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<TestData> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
        assert!(!dir.path().join("test.tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("test.bin");
        atomic_write(&path, b"abc").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_load_json_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<TestData> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_manifest_path() {
        let path = Path::new("artifacts/models/lstm_model.bin");
        assert_eq!(
            manifest_path(path),
            PathBuf::from("artifacts/models/lstm_model.bin.manifest.json")
        );
    }

    #[test]
    fn test_artifact_roundtrip_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thing.bin");
        let data = TestData {
            name: "weights".into(),
            count: 7,
        };

        let manifest = save_artifact(&path, "model", InputShape::new(4, 2), &data).unwrap();
        assert_eq!(manifest.kind, "model");
        assert_eq!(manifest.sha256, sha256_hex(&std::fs::read(&path).unwrap()));

        let sidecar: ArtifactManifest = load_json(&manifest_path(&path)).unwrap().unwrap();
        assert_eq!(sidecar, manifest);

        let (header, loaded): (ArtifactHeader, TestData) = load_artifact(&path, "model").unwrap();
        assert_eq!(header.input_shape, InputShape::new(4, 2));
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_load_artifact_rejects_tampered_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thing.bin");
        save_artifact(&path, "model", InputShape::new(2, 2), &vec![1.0f32, 2.0, 3.0]).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = load_artifact::<Vec<f32>>(&path, "model").unwrap_err();
        assert!(matches!(err, ArtifactError::DigestMismatch { .. }));
    }

    #[test]
    fn test_load_artifact_without_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thing.bin");
        save_artifact(&path, "model", InputShape::new(1, 1), &9u32).unwrap();
        std::fs::remove_file(manifest_path(&path)).unwrap();

        let (_, value): (ArtifactHeader, u32) = load_artifact(&path, "model").unwrap();
        assert_eq!(value, 9);

        std::fs::write(manifest_path(&path), "{ not json").unwrap();
        assert!(matches!(
            load_artifact::<u32>(&path, "model"),
            Err(ArtifactError::Decode { .. })
        ));
    }

    #[test]
    fn test_load_artifact_wrong_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thing.bin");
        save_artifact(&path, "background", InputShape::new(1, 1), &1u32).unwrap();

        let err = load_artifact::<u32>(&path, "model").unwrap_err();
        assert!(matches!(err, ArtifactError::WrongKind { .. }));
    }

    #[test]
    fn test_load_artifact_missing_and_garbage() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            load_artifact::<u32>(&missing, "model"),
            Err(ArtifactError::NotFound { .. })
        ));

        let garbage = dir.path().join("garbage.bin");
        std::fs::write(&garbage, b"not an artifact at all").unwrap();
        assert!(matches!(
            load_artifact::<u32>(&garbage, "model"),
            Err(ArtifactError::Decode { .. })
        ));
    }
}
