//! 마스터키 디스크 표현 + OS 보호 계층
//!
//! 파일 포맷 (`master.key`):
//! - 보호됨: magic `TCKEY001` (8 bytes) + 보호 계층 출력 (nonce 12 bytes + AEAD 결과)
//! - 레거시: 64자 hex 평문 (OS 보호를 쓸 수 없을 때의 fallback)
//!
//! 레거시 → 보호됨 마이그레이션은 단방향입니다.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use keyring::Entry;
use rand::Rng;
use std::sync::Mutex;
use zeroize::Zeroize;

use crate::error::{TrustError, TrustResult};

/// 파일 매직 (8 bytes)
pub const KEY_BLOB_MAGIC: &[u8; 8] = b"TCKEY001";

/// 마스터키 길이 (256-bit)
pub const MASTER_KEY_LEN: usize = 32;

/// Nonce 길이 (ChaCha20-Poly1305, 96-bit)
pub const NONCE_LEN: usize = 12;

/// 래핑 키 Keychain 키
const WRAPPING_KEY_KEYCHAIN_KEY: &str = "trustcore:wrapping_key_v1";

/// 디스크에 저장된 마스터키 표현
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyBlob {
    /// OS 보호 계층이 봉인한 바이트
    Protected(Vec<u8>),
    /// 평문 hex (64자)
    LegacyPlain(String),
}

impl KeyBlob {
    /// 파일 바이트를 해석. 어느 형식에도 맞지 않으면 `CorruptStore`
    pub fn parse(bytes: &[u8]) -> TrustResult<Self> {
        if let Some(sealed) = bytes.strip_prefix(KEY_BLOB_MAGIC.as_slice()) {
            if sealed.len() <= NONCE_LEN {
                return Err(TrustError::CorruptStore("truncated key blob".to_string()));
            }
            return Ok(KeyBlob::Protected(sealed.to_vec()));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| TrustError::CorruptStore("unrecognized key blob".to_string()))?
            .trim();

        if is_legacy_hex(text) {
            Ok(KeyBlob::LegacyPlain(text.to_ascii_lowercase()))
        } else {
            Err(TrustError::CorruptStore("unrecognized key blob".to_string()))
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            KeyBlob::Protected(sealed) => {
                let mut out = Vec::with_capacity(KEY_BLOB_MAGIC.len() + sealed.len());
                out.extend_from_slice(KEY_BLOB_MAGIC);
                out.extend_from_slice(sealed);
                out
            }
            KeyBlob::LegacyPlain(hex) => hex.as_bytes().to_vec(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, KeyBlob::Protected(_))
    }
}

fn is_legacy_hex(text: &str) -> bool {
    text.len() == MASTER_KEY_LEN * 2 && text.chars().all(|c| c.is_ascii_hexdigit())
}

/// OS 제공 비밀 보호 기능 추상화
///
/// 보호 계층은 호스트가 손상되지 않았을 때의 강화 수단이지 보안 경계가 아닙니다.
pub trait KeyProtector: Send + Sync {
    fn is_available(&self) -> bool;
    fn protect(&self, plain: &[u8]) -> TrustResult<Vec<u8>>;
    fn unprotect(&self, sealed: &[u8]) -> TrustResult<Vec<u8>>;
}

/// OS 보호를 쓰지 않음 (항상 평문 fallback)
pub struct NoProtector;

impl KeyProtector for NoProtector {
    fn is_available(&self) -> bool {
        false
    }

    fn protect(&self, _plain: &[u8]) -> TrustResult<Vec<u8>> {
        Err(TrustError::Keychain("OS protection unavailable".to_string()))
    }

    fn unprotect(&self, _sealed: &[u8]) -> TrustResult<Vec<u8>> {
        Err(TrustError::Keychain("OS protection unavailable".to_string()))
    }
}

/// Keychain 기반 보호 계층
///
/// Keychain에는 래핑 키 1개만 저장하고 (`trustcore:wrapping_key_v1`),
/// 마스터키는 그 래핑 키로 AEAD 봉인하여 파일에 둡니다.
pub struct KeyringProtector {
    service: String,
    wrapping_key: Mutex<Option<WrappingKey>>,
}

/// Zeroize가 적용된 래핑 키
struct WrappingKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl Drop for WrappingKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl KeyringProtector {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            wrapping_key: Mutex::new(None),
        }
    }

    /// 캐시된 래핑 키로 작업 (없으면 Keychain에서 로드 또는 생성)
    fn with_wrapping_key<T>(
        &self,
        f: impl FnOnce(&[u8; MASTER_KEY_LEN]) -> TrustResult<T>,
    ) -> TrustResult<T> {
        let mut cached = self.wrapping_key.lock().map_err(TrustError::poisoned)?;
        if cached.is_none() {
            *cached = Some(WrappingKey {
                bytes: self.load_or_create_wrapping_key()?,
            });
        }
        match cached.as_ref() {
            Some(key) => f(&key.bytes),
            None => Err(TrustError::Keychain("wrapping key unavailable".to_string())),
        }
    }

    fn load_or_create_wrapping_key(&self) -> TrustResult<[u8; MASTER_KEY_LEN]> {
        let entry = Entry::new(&self.service, WRAPPING_KEY_KEYCHAIN_KEY)
            .map_err(|e| TrustError::Keychain(e.to_string()))?;

        match entry.get_password() {
            Ok(encoded) => {
                let mut bytes = BASE64
                    .decode(&encoded)
                    .map_err(|_| TrustError::Keychain("invalid wrapping key".to_string()))?;
                if bytes.len() != MASTER_KEY_LEN {
                    bytes.zeroize();
                    return Err(TrustError::Keychain("invalid wrapping key".to_string()));
                }
                let mut key = [0u8; MASTER_KEY_LEN];
                key.copy_from_slice(&bytes);
                bytes.zeroize();
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                tracing::info!("[KeyringProtector] No wrapping key found, generating new one");
                let mut key = [0u8; MASTER_KEY_LEN];
                rand::thread_rng().fill(&mut key);
                entry
                    .set_password(&BASE64.encode(key))
                    .map_err(|e| TrustError::Keychain(e.to_string()))?;
                Ok(key)
            }
            Err(e) => Err(TrustError::Keychain(e.to_string())),
        }
    }
}

impl KeyProtector for KeyringProtector {
    fn is_available(&self) -> bool {
        match self.with_wrapping_key(|_| Ok(())) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[KeyringProtector] OS protection unavailable: {}", e);
                false
            }
        }
    }

    fn protect(&self, plain: &[u8]) -> TrustResult<Vec<u8>> {
        self.with_wrapping_key(|key| seal(key, plain))
    }

    fn unprotect(&self, sealed: &[u8]) -> TrustResult<Vec<u8>> {
        self.with_wrapping_key(|key| open(key, sealed))
    }
}

/// nonce + AEAD(plain), AAD = magic (포맷 바인딩)
pub(crate) fn seal(key: &[u8; MASTER_KEY_LEN], plain: &[u8]) -> TrustResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let cipher = ChaCha20Poly1305::new(key.into());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plain,
                aad: KEY_BLOB_MAGIC,
            },
        )
        .map_err(|e| TrustError::Keychain(format!("seal failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(crate) fn open(key: &[u8; MASTER_KEY_LEN], sealed: &[u8]) -> TrustResult<Vec<u8>> {
    if sealed.len() <= NONCE_LEN {
        return Err(TrustError::CorruptStore("truncated key blob".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: KEY_BLOB_MAGIC,
            },
        )
        .map_err(|_| TrustError::CorruptStore("key blob failed to unseal".to_string()))
}
