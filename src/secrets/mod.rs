//! Secret 모듈
//!
//! 마스터키 1개로 저장 데이터를 보호합니다.
//!
//! - `store`: 마스터키 생성/보관 (OS 보호 계층 우선, 평문 hex fallback)
//! - `blob`: 디스크 표현 (`KeyBlob`)과 OS 보호 계층 (`KeyProtector`)
//! - `cipher`: 마스터키 기반 AEAD 암호화 엔진

pub mod blob;
pub mod cipher;
pub mod store;

pub use blob::{KeyBlob, KeyProtector, KeyringProtector, NoProtector};
pub use cipher::EncryptionEngine;
pub use store::{KeyProtection, MasterKey, SecretStore};
