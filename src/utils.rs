use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

use crate::error::TrustResult;

/// 경로를 절대 경로로 정규화
/// - 파일이 존재하면 canonicalize
/// - 없으면 부모 디렉토리를 canonicalize하고 파일명을 붙임
/// - 부모도 없으면 현재 디렉토리 기준 절대 경로
pub fn resolve_path(path: &Path) -> TrustResult<PathBuf> {
    if path.exists() {
        return Ok(path.canonicalize()?);
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if !parent.as_os_str().is_empty() && parent.exists() {
            return Ok(parent.canonicalize()?.join(name));
        }
    }

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// SHA-256 hex digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// 비밀 값 비교용 상수 시간 비교 (길이가 다르면 false)
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
