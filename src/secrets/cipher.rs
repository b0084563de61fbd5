//! Encryption Engine - 마스터키로 임의 텍스트를 AEAD 암호화/복호화
//!
//! ChaCha20-Poly1305 (256-bit key, 96-bit nonce, 128-bit tag).
//! 호출마다 마스터키를 Secret Store에서 다시 가져오며, 엔진 자체는 상태가 없습니다.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::Rng;
use std::sync::Arc;
use zeroize::Zeroize;

use crate::error::{TrustError, TrustResult};
use crate::models::EncryptedPayload;
use crate::secrets::blob::NONCE_LEN;
use crate::secrets::store::SecretStore;

/// 인증 태그 길이 (128-bit)
pub const TAG_LEN: usize = 16;

pub struct EncryptionEngine {
    store: Arc<SecretStore>,
}

impl EncryptionEngine {
    pub fn new(store: Arc<SecretStore>) -> Self {
        Self { store }
    }

    /// 평문 암호화. 호출마다 새 랜덤 IV 사용
    pub fn encrypt(&self, plain_text: &str) -> TrustResult<EncryptedPayload> {
        let key = self.store.get_or_create_key()?;

        let mut iv = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut iv);

        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plain_text.as_bytes())
            .map_err(|_| TrustError::AuthenticationFailed)?;

        // AEAD 결과 = 암호문 || 태그
        let tag_start = sealed.len() - TAG_LEN;
        let payload = EncryptedPayload {
            iv: hex::encode(iv),
            auth_tag: hex::encode(&sealed[tag_start..]),
            ciphertext: hex::encode(&sealed[..tag_start]),
        };
        sealed.zeroize();

        Ok(payload)
    }

    /// 복호화. 태그 검증 실패나 잘못된 hex는 `AuthenticationFailed`
    pub fn decrypt(&self, payload: &EncryptedPayload) -> TrustResult<String> {
        let key = self.store.get_or_create_key()?;

        let iv = decode_exact(&payload.iv, NONCE_LEN)?;
        let tag = decode_exact(&payload.auth_tag, TAG_LEN)?;
        let mut sealed =
            hex::decode(&payload.ciphertext).map_err(|_| TrustError::AuthenticationFailed)?;
        sealed.extend_from_slice(&tag);

        let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
        let plain = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| TrustError::AuthenticationFailed)?;

        String::from_utf8(plain).map_err(|e| {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            TrustError::AuthenticationFailed
        })
    }
}

fn decode_exact(hex_str: &str, len: usize) -> TrustResult<Vec<u8>> {
    let bytes = hex::decode(hex_str).map_err(|_| TrustError::AuthenticationFailed)?;
    if bytes.len() != len {
        return Err(TrustError::AuthenticationFailed);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::blob::testing::MemoryProtector;
    use tempfile::{tempdir, TempDir};

    fn engine() -> (TempDir, Arc<SecretStore>, EncryptionEngine) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SecretStore::new(Box::new(MemoryProtector::new())));
        store.configure(dir.path());
        let engine = EncryptionEngine::new(Arc::clone(&store));
        (dir, store, engine)
    }

    /// hex 문자열의 특정 비트를 뒤집음
    fn flip_bit(hex_str: &str, bit: usize) -> String {
        let mut bytes = hex::decode(hex_str).unwrap();
        bytes[bit / 8] ^= 1 << (bit % 8);
        hex::encode(bytes)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (_dir, _store, engine) = engine();
        let long = "x".repeat(10_000);
        for text in ["", "hello", "한글 텍스트 🔐", long.as_str()] {
            let payload = engine.encrypt(text).unwrap();
            assert_eq!(engine.decrypt(&payload).unwrap(), text);
        }
    }

    #[test]
    fn test_payload_shape() {
        let (_dir, _store, engine) = engine();
        let payload = engine.encrypt("abc").unwrap();
        assert_eq!(payload.iv.len(), NONCE_LEN * 2);
        assert_eq!(payload.auth_tag.len(), TAG_LEN * 2);
        assert_eq!(payload.ciphertext.len(), 3 * 2);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let (_dir, _store, engine) = engine();
        let a = engine.encrypt("same").unwrap();
        let b = engine.encrypt("same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampering_is_detected() {
        let (_dir, _store, engine) = engine();
        let payload = engine.encrypt("sensitive order data").unwrap();

        for bit in [0, 7, 40, 95] {
            let mut p = payload.clone();
            p.iv = flip_bit(&p.iv, bit);
            assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));
        }
        for bit in [0, 63, 127] {
            let mut p = payload.clone();
            p.auth_tag = flip_bit(&p.auth_tag, bit);
            assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));
        }
        for bit in [0, 9, 100] {
            let mut p = payload.clone();
            p.ciphertext = flip_bit(&p.ciphertext, bit);
            assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));
        }
    }

    #[test]
    fn test_malformed_hex_fails_closed() {
        let (_dir, _store, engine) = engine();
        let payload = engine.encrypt("data").unwrap();

        let mut p = payload.clone();
        p.ciphertext = "zz".to_string();
        assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));

        let mut p = payload.clone();
        p.iv = "abcd".to_string();
        assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));

        let mut p = payload;
        p.auth_tag.push('0');
        assert!(matches!(engine.decrypt(&p), Err(TrustError::AuthenticationFailed)));
    }

    #[test]
    fn test_key_reload_still_decrypts() {
        let (_dir, store, engine) = engine();
        let payload = engine.encrypt("survives reload").unwrap();
        store.clear_cache();
        assert_eq!(engine.decrypt(&payload).unwrap(), "survives reload");
    }

    #[test]
    fn test_requires_initialization() {
        let store = Arc::new(SecretStore::new(Box::new(MemoryProtector::new())));
        let engine = EncryptionEngine::new(store);
        assert!(matches!(engine.encrypt("x"), Err(TrustError::NotInitialized)));
    }
}
