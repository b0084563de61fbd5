//! Trust Core Data Models
//!
//! 프론트엔드(TypeScript)와 디스크 문서에 매핑되는 데이터 모델

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AEAD 암호화 결과 (모든 필드는 hex)
///
/// 호출마다 새 IV로 생성되며, 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub iv: String,
    pub auth_tag: String,
    #[serde(rename = "data", alias = "ciphertext")]
    pub ciphertext: String,
}

/// 사용자별 비밀번호 해시 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub salt: String,
    pub hash: String,
}

/// 사용자별 세션 레코드 (사용자당 최대 1개)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    /// epoch milliseconds
    pub expires_at: i64,
}

/// `credentials.json`: username → record
pub type CredentialDocument = BTreeMap<String, CredentialRecord>;

/// `sessions.json`: userId → record
pub type SessionDocument = BTreeMap<String, SessionRecord>;

/// `integrity.json`: 절대 경로 → SHA-256 hex
pub type ManifestDocument = BTreeMap<String, String>;

/// 무결성 검증 실패 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Missing,
    Modified,
}

/// `validate_all()`이 보고하는 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityFailure {
    pub path: String,
    pub reason: FailureReason,
}
