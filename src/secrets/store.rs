//! Secret Store - 설치당 마스터키 1개를 생성/보관
//!
//! - 최초 접근 시 CSPRNG로 생성하고 정확히 1회 저장
//! - OS 보호가 가능하면 봉인된 형태로, 아니면 평문 hex로 저장
//! - 평문 hex가 발견되면 OS 보호가 가능해진 시점에 봉인 형태로 1회 마이그레이션
//! - 생성/마이그레이션은 캐시 mutex 안에서 직렬화

use rand::Rng;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use zeroize::Zeroize;

use crate::error::{TrustError, TrustResult};
use crate::secrets::blob::{KeyBlob, KeyProtector, MASTER_KEY_LEN};
use crate::storage::{ensure_private_dir, write_private, StoreLocation};

/// 마스터키 파일 이름
pub const KEY_FILE_NAME: &str = "master.key";

/// Zeroize가 적용된 마스터키 래퍼
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill(&mut bytes);
        Self { bytes }
    }

    fn from_slice(slice: &[u8]) -> TrustResult<Self> {
        if slice.len() != MASTER_KEY_LEN {
            return Err(TrustError::CorruptStore("invalid master key length".to_string()));
        }
        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// 현재 저장된 마스터키의 보호 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyProtection {
    Absent,
    Protected,
    LegacyPlain,
}

pub struct SecretStore {
    location: StoreLocation,
    protector: Box<dyn KeyProtector>,
    /// 마스터키 캐시. 최초 생성 경합을 막는 초기화 잠금을 겸함
    cached: Mutex<Option<MasterKey>>,
}

impl SecretStore {
    pub fn new(protector: Box<dyn KeyProtector>) -> Self {
        Self {
            location: StoreLocation::new(KEY_FILE_NAME),
            protector,
            cached: Mutex::new(None),
        }
    }

    pub fn configure(&self, base_dir: &Path) -> bool {
        self.location.configure(base_dir)
    }

    /// 마스터키 조회 (없으면 생성)
    pub fn get_or_create_key(&self) -> TrustResult<MasterKey> {
        let path = self.location.path()?;

        let mut cached = self.cached.lock().map_err(TrustError::poisoned)?;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = self.load_or_create(&path)?;
        *cached = Some(key.clone());
        Ok(key)
    }

    /// 디스크의 마스터키 보호 상태 (진단용)
    pub fn protection_status(&self) -> TrustResult<KeyProtection> {
        let path = self.location.path()?;
        let _guard = self.cached.lock().map_err(TrustError::poisoned)?;

        match read_blob(&path)? {
            None => Ok(KeyProtection::Absent),
            Some(KeyBlob::Protected(_)) => Ok(KeyProtection::Protected),
            Some(KeyBlob::LegacyPlain(_)) => Ok(KeyProtection::LegacyPlain),
        }
    }

    fn load_or_create(&self, path: &Path) -> TrustResult<MasterKey> {
        match read_blob(path)? {
            Some(blob) => self.open_blob(path, blob),
            None => self.create(path),
        }
    }

    fn create(&self, path: &Path) -> TrustResult<MasterKey> {
        tracing::info!("[SecretStore] No master key found, generating new one");
        let key = MasterKey::generate();
        let blob = self.seal(&key);

        if !write_new(path, &blob.to_bytes())? {
            // 다른 프로세스가 먼저 만들었으면 그 키를 사용
            tracing::warn!("[SecretStore] Master key appeared concurrently, using existing one");
            return match read_blob(path)? {
                Some(existing) => self.open_blob(path, existing),
                None => Err(TrustError::CorruptStore("master key vanished".to_string())),
            };
        }

        tracing::info!(
            "[SecretStore] New master key saved ({})",
            if blob.is_protected() { "protected" } else { "plaintext fallback" }
        );
        Ok(key)
    }

    fn open_blob(&self, path: &Path, blob: KeyBlob) -> TrustResult<MasterKey> {
        match blob {
            KeyBlob::Protected(sealed) => {
                let mut plain = self.protector.unprotect(&sealed).map_err(|e| match e {
                    TrustError::CorruptStore(msg) => TrustError::CorruptStore(msg),
                    other => TrustError::CorruptStore(format!("cannot unseal master key: {}", other)),
                })?;
                let key = MasterKey::from_slice(&plain);
                plain.zeroize();
                key
            }
            KeyBlob::LegacyPlain(hex_key) => {
                let mut plain = hex::decode(&hex_key)
                    .map_err(|_| TrustError::CorruptStore("invalid legacy key".to_string()))?;
                let key = MasterKey::from_slice(&plain);
                plain.zeroize();
                let key = key?;
                self.migrate_legacy(path, &key);
                Ok(key)
            }
        }
    }

    /// 평문 → 봉인 형태로 1회 마이그레이션 (실패해도 키는 그대로 사용)
    fn migrate_legacy(&self, path: &Path, key: &MasterKey) {
        if !self.protector.is_available() {
            tracing::debug!("[SecretStore] OS protection unavailable, keeping plaintext key");
            return;
        }

        match self.protector.protect(key.as_bytes()) {
            Ok(sealed) => match write_private(path, &KeyBlob::Protected(sealed).to_bytes()) {
                Ok(()) => tracing::info!("[SecretStore] Migrated plaintext master key to protected form"),
                Err(e) => tracing::warn!("[SecretStore] Failed to persist migrated key: {}", e),
            },
            Err(e) => tracing::warn!("[SecretStore] Failed to protect legacy key: {}", e),
        }
    }

    fn seal(&self, key: &MasterKey) -> KeyBlob {
        if self.protector.is_available() {
            match self.protector.protect(key.as_bytes()) {
                Ok(sealed) => return KeyBlob::Protected(sealed),
                Err(e) => tracing::warn!("[SecretStore] OS protection failed, using plaintext: {}", e),
            }
        }
        KeyBlob::LegacyPlain(hex::encode(key.as_bytes()))
    }

    #[cfg(test)]
    pub(crate) fn key_path(&self) -> TrustResult<std::path::PathBuf> {
        self.location.path()
    }

    #[cfg(test)]
    pub(crate) fn clear_cache(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }
}

fn read_blob(path: &Path) -> TrustResult<Option<KeyBlob>> {
    match fs::read(path) {
        Ok(bytes) => KeyBlob::parse(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// 파일이 없을 때만 생성 (0600). 이미 있으면 false
fn write_new(path: &Path, bytes: &[u8]) -> TrustResult<bool> {
    create_exclusive(path, |file| {
        file.write_all(bytes)?;
        file.sync_all()
    })
}

/// `create_new`로 연 파일을 채움. 채우다 실패하면 잘린 파일을 남기지 않도록 삭제
fn create_exclusive(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
) -> TrustResult<bool> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!("[SecretStore] Failed to remove partial key file: {}", cleanup);
        }
        return Err(e.into());
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::blob::testing::MemoryProtector;
    use crate::secrets::blob::NoProtector;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_in(dir: &Path, protector: MemoryProtector) -> SecretStore {
        let store = SecretStore::new(Box::new(protector));
        store.configure(dir);
        store
    }

    #[test]
    fn test_not_initialized() {
        let store = SecretStore::new(Box::new(NoProtector));
        assert!(matches!(store.get_or_create_key(), Err(TrustError::NotInitialized)));
    }

    #[test]
    fn test_key_is_stable() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), MemoryProtector::new());

        let first = store.get_or_create_key().unwrap();
        store.clear_cache();
        let second = store.get_or_create_key().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(store.protection_status().unwrap(), KeyProtection::Protected);
    }

    #[test]
    fn test_plaintext_fallback_when_unavailable() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(Box::new(NoProtector));
        store.configure(dir.path());

        let key = store.get_or_create_key().unwrap();
        let on_disk = fs::read_to_string(store.key_path().unwrap()).unwrap();
        assert_eq!(on_disk, hex::encode(key.as_bytes()));
        assert_eq!(store.protection_status().unwrap(), KeyProtection::LegacyPlain);
    }

    #[test]
    fn test_legacy_key_migrates_once() {
        let dir = tempdir().unwrap();
        let legacy = [42u8; MASTER_KEY_LEN];
        fs::write(dir.path().join(KEY_FILE_NAME), hex::encode(legacy)).unwrap();

        let protector = MemoryProtector::new();
        let store = store_in(dir.path(), protector.clone());

        let key = store.get_or_create_key().unwrap();
        assert_eq!(key.as_bytes(), &legacy);
        assert_eq!(store.protection_status().unwrap(), KeyProtection::Protected);

        // 두 번째 로드는 봉인된 파일에서 같은 키를 얻고 파일을 다시 쓰지 않음
        let sealed_bytes = fs::read(store.key_path().unwrap()).unwrap();
        store.clear_cache();
        let again = store.get_or_create_key().unwrap();
        assert_eq!(again.as_bytes(), &legacy);
        assert_eq!(fs::read(store.key_path().unwrap()).unwrap(), sealed_bytes);
    }

    #[test]
    fn test_legacy_key_stays_plain_without_protection() {
        let dir = tempdir().unwrap();
        let legacy = [9u8; MASTER_KEY_LEN];
        fs::write(dir.path().join(KEY_FILE_NAME), hex::encode(legacy)).unwrap();

        let protector = MemoryProtector::new();
        protector.set_available(false);
        let store = store_in(dir.path(), protector);

        assert_eq!(store.get_or_create_key().unwrap().as_bytes(), &legacy);
        assert_eq!(store.protection_status().unwrap(), KeyProtection::LegacyPlain);
    }

    #[test]
    fn test_corrupt_blob() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(KEY_FILE_NAME), b"definitely not a key").unwrap();

        let store = store_in(dir.path(), MemoryProtector::new());
        assert!(matches!(store.get_or_create_key(), Err(TrustError::CorruptStore(_))));
    }

    #[test]
    fn test_protected_blob_from_other_installation_is_corrupt() {
        let dir = tempdir().unwrap();
        let original = store_in(dir.path(), MemoryProtector::new());
        original.get_or_create_key().unwrap();

        let stranger = store_in(dir.path(), MemoryProtector::new());
        assert!(matches!(stranger.get_or_create_key(), Err(TrustError::CorruptStore(_))));
    }

    #[test]
    fn test_failed_write_leaves_no_partial_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(KEY_FILE_NAME);

        let result = create_exclusive(&path, |file| {
            file.write_all(b"TCKEY")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });
        assert!(matches!(result, Err(TrustError::Io(_))));
        assert!(!path.exists());

        // 다음 접근은 정상적으로 새 키를 만듦
        let store = store_in(dir.path(), MemoryProtector::new());
        store.get_or_create_key().unwrap();
        assert_eq!(store.protection_status().unwrap(), KeyProtection::Protected);
    }

    #[test]
    fn test_concurrent_first_access_yields_one_key() {
        let dir = tempdir().unwrap();
        let store = Arc::new(store_in(dir.path(), MemoryProtector::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_or_create_key().unwrap().as_bytes().to_vec())
            })
            .collect();

        let keys: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
