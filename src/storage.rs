//! 디스크 문서 I/O
//!
//! - 문서가 없으면 "첫 실행"으로 보고 빈 구조를 반환
//! - 쓰기는 임시 파일에 쓰고 rename (atomic write)
//! - 파일은 0600, 디렉토리는 0700 (Unix)

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{TrustError, TrustResult};

/// 저장소 하나의 위치 (base dir은 1회만 설정)
#[derive(Debug)]
pub struct StoreLocation {
    base_dir: OnceCell<PathBuf>,
    file_name: &'static str,
}

impl StoreLocation {
    pub const fn new(file_name: &'static str) -> Self {
        Self {
            base_dir: OnceCell::new(),
            file_name,
        }
    }

    /// base dir 설정. 이미 다른 경로로 설정되어 있으면 false
    pub fn configure(&self, base_dir: &Path) -> bool {
        let current = self.base_dir.get_or_init(|| base_dir.to_path_buf());
        if current != base_dir {
            tracing::warn!(
                "[Storage] {} already bound to {}, ignoring {}",
                self.file_name,
                current.display(),
                base_dir.display()
            );
            return false;
        }
        true
    }

    /// 문서 경로. 설정 전이면 `NotInitialized`
    pub fn path(&self) -> TrustResult<PathBuf> {
        self.base_dir
            .get()
            .map(|dir| dir.join(self.file_name))
            .ok_or(TrustError::NotInitialized)
    }
}

/// JSON 문서 로드 (없거나 비어 있으면 기본값)
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> TrustResult<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        TrustError::CorruptStore(format!("{}: {}", path.display(), e))
    })
}

/// JSON 문서 저장
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> TrustResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_private(path, &bytes)
}

/// 소유자 전용 권한으로 atomic write
pub fn write_private(path: &Path, bytes: &[u8]) -> TrustResult<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    set_restrictive_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// 디렉토리 생성 (Unix: 0700)
pub fn ensure_private_dir(dir: &Path) -> TrustResult<()> {
    if dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) -> TrustResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path) -> TrustResult<()> {
    Ok(())
}
