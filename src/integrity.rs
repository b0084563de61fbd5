//! Integrity Manifest - 지정 파일의 변조 감지
//!
//! 등록 시점의 SHA-256을 기준선으로 저장하고, 검증 시 다시 계산해 비교합니다.
//! 재등록은 기준선을 교체하므로 신뢰할 수 있는 상태에서만 호출해야 합니다.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{TrustError, TrustResult};
use crate::models::{FailureReason, IntegrityFailure, ManifestDocument};
use crate::storage::{load_json, save_json, StoreLocation};
use crate::utils::{constant_time_eq, resolve_path, sha256_hex};

pub const MANIFEST_FILE_NAME: &str = "integrity.json";

pub struct IntegrityManifest {
    location: StoreLocation,
    write_lock: Mutex<()>,
}

impl Default for IntegrityManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityManifest {
    pub fn new() -> Self {
        Self {
            location: StoreLocation::new(MANIFEST_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    pub fn configure(&self, base_dir: &Path) -> bool {
        self.location.configure(base_dir)
    }

    /// 파일의 현재 내용을 기준선으로 등록. 저장된 digest 반환
    pub fn register(&self, path: &Path) -> TrustResult<String> {
        let manifest_path = self.location.path()?;
        let resolved = resolve_path(path)?;
        let digest = sha256_hex(&fs::read(&resolved)?);

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: ManifestDocument = load_json(&manifest_path)?;
        doc.insert(resolved.to_string_lossy().into_owned(), digest.clone());
        save_json(&manifest_path, &doc)?;

        tracing::info!("[IntegrityManifest] Registered {}", resolved.display());
        Ok(digest)
    }

    /// 등록되지 않은 경로나 사라진 파일은 false
    pub fn validate(&self, path: &Path) -> TrustResult<bool> {
        let manifest_path = self.location.path()?;
        let resolved = resolve_path(path)?;
        let doc: ManifestDocument = load_json(&manifest_path)?;

        let Some(expected) = doc.get(resolved.to_string_lossy().as_ref()) else {
            return Ok(false);
        };

        match current_digest(&resolved)? {
            Some(actual) => Ok(constant_time_eq(actual.as_bytes(), expected.as_bytes())),
            None => Ok(false),
        }
    }

    /// 모든 항목 검증. 문제가 없으면 빈 목록
    pub fn validate_all(&self) -> TrustResult<Vec<IntegrityFailure>> {
        let manifest_path = self.location.path()?;
        let doc: ManifestDocument = load_json(&manifest_path)?;

        let mut failures = Vec::new();
        for (path, expected) in &doc {
            let reason = match current_digest(Path::new(path))? {
                None => Some(FailureReason::Missing),
                Some(actual) if !constant_time_eq(actual.as_bytes(), expected.as_bytes()) => {
                    Some(FailureReason::Modified)
                }
                Some(_) => None,
            };
            if let Some(reason) = reason {
                tracing::warn!("[IntegrityManifest] {} failed check: {:?}", path, reason);
                failures.push(IntegrityFailure {
                    path: path.clone(),
                    reason,
                });
            }
        }

        Ok(failures)
    }

    /// 항목 제거. 제거된 것이 있으면 true
    pub fn unregister(&self, path: &Path) -> TrustResult<bool> {
        let manifest_path = self.location.path()?;
        let resolved = resolve_path(path)?;

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: ManifestDocument = load_json(&manifest_path)?;
        let removed = doc.remove(resolved.to_string_lossy().as_ref()).is_some();
        if removed {
            save_json(&manifest_path, &doc)?;
        }
        Ok(removed)
    }

    pub fn entries(&self) -> TrustResult<ManifestDocument> {
        load_json(&self.location.path()?)
    }
}

/// 파일이 없으면 None
fn current_digest(path: &Path) -> TrustResult<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(sha256_hex(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
