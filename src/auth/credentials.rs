//! Credential Vault - 비밀번호 해시 저장 및 검증
//!
//! PBKDF2-HMAC-SHA256 (salt 128-bit, 출력 256-bit).
//! 평문 비밀번호는 절대 저장하지 않습니다.

use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use std::path::Path;
use std::sync::Mutex;
use zeroize::Zeroize;

use crate::config::MIN_KDF_ITERATIONS;
use crate::error::{TrustError, TrustResult};
use crate::models::{CredentialDocument, CredentialRecord};
use crate::storage::{load_json, save_json, StoreLocation};
use crate::utils::constant_time_eq;

/// Salt 길이 (128-bit)
pub const SALT_LEN: usize = 16;

/// 파생 키 길이 (256-bit)
pub const DERIVED_KEY_LEN: usize = 32;

pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// 새 salt로 비밀번호 해시 생성
pub fn hash_password(password: &str, iterations: u32) -> CredentialRecord {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt);

    let mut derived = derive(password, &salt, iterations);
    let record = CredentialRecord {
        salt: hex::encode(salt),
        hash: hex::encode(derived),
    };
    derived.zeroize();
    record
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; DERIVED_KEY_LEN] {
    let mut out = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

pub struct CredentialVault {
    location: StoreLocation,
    iterations: u32,
    /// 존재하지 않는 사용자 검증 시 같은 비용을 치르기 위한 salt
    dummy_salt: [u8; SALT_LEN],
    write_lock: Mutex<()>,
}

impl CredentialVault {
    pub fn new(iterations: u32) -> Self {
        Self::with_iterations(iterations.max(MIN_KDF_ITERATIONS))
    }

    /// 반복 횟수 하한 없이 생성
    pub(crate) fn with_iterations(iterations: u32) -> Self {
        let mut dummy_salt = [0u8; SALT_LEN];
        rand::thread_rng().fill(&mut dummy_salt);
        Self {
            location: StoreLocation::new(CREDENTIALS_FILE_NAME),
            iterations,
            dummy_salt,
            write_lock: Mutex::new(()),
        }
    }

    pub fn configure(&self, base_dir: &Path) -> bool {
        self.location.configure(base_dir)
    }

    /// 사용자 비밀번호 저장 (기존 레코드 덮어쓰기)
    pub fn store(&self, username: &str, password: &str) -> TrustResult<()> {
        let path = self.location.path()?;
        let record = hash_password(password, self.iterations);

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: CredentialDocument = load_json(&path)?;
        doc.insert(username.to_string(), record);
        save_json(&path, &doc)?;

        tracing::info!("[CredentialVault] Credential stored for user");
        Ok(())
    }

    /// 비밀번호 검증
    ///
    /// 사용자가 없어도 같은 비용의 KDF를 수행해 응답 시간으로 구분되지 않게 합니다.
    pub fn verify(&self, username: &str, password: &str) -> TrustResult<bool> {
        let path = self.location.path()?;
        let doc: CredentialDocument = load_json(&path)?;

        let Some(record) = doc.get(username) else {
            let mut derived = derive(password, &self.dummy_salt, self.iterations);
            let _ = constant_time_eq(&derived, &[0u8; DERIVED_KEY_LEN]);
            derived.zeroize();
            return Ok(false);
        };

        let salt = hex::decode(&record.salt)
            .map_err(|_| TrustError::CorruptStore("invalid credential salt".to_string()))?;
        let expected = hex::decode(&record.hash)
            .map_err(|_| TrustError::CorruptStore("invalid credential hash".to_string()))?;

        let mut derived = derive(password, &salt, self.iterations);
        let matched = constant_time_eq(&derived, &expected);
        derived.zeroize();

        Ok(matched)
    }

    /// 사용자 레코드 삭제. 삭제된 것이 있으면 true
    pub fn remove(&self, username: &str) -> TrustResult<bool> {
        let path = self.location.path()?;

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: CredentialDocument = load_json(&path)?;
        let removed = doc.remove(username).is_some();
        if removed {
            save_json(&path, &doc)?;
        }
        Ok(removed)
    }

    pub fn exists(&self, username: &str) -> TrustResult<bool> {
        let path = self.location.path()?;
        let doc: CredentialDocument = load_json(&path)?;
        Ok(doc.contains_key(username))
    }
}
