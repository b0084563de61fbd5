//! Trust Core Error Types
//!
//! 장애(fault)와 정책 거부(denial)를 분리합니다.
//! - `TrustError`: 손상된 저장소, 암호 실패 등 호출자에게 반드시 전파되는 장애
//! - `Denial`: 권한 없음, 잠금, 만료처럼 예상 가능한 거부 (값으로 반환)

use serde::Serialize;
use thiserror::Error;

/// 신뢰 코어 장애
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Trust core not initialized")]
    NotInitialized,

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Unauthorized caller")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrustError {
    /// 잠금 오염(poisoned lock)은 저장소 상태를 더 이상 신뢰할 수 없다는 뜻
    pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> Self {
        TrustError::CorruptStore("lock poisoned".to_string())
    }
}

/// 정책에 의한 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Denial {
    Unauthorized,
    LockedOut,
    InvalidCredentials,
    SessionInvalid,
    SessionExpired,
}

/// 게이트웨이 판정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access<T> {
    Granted(T),
    Denied(Denial),
}

impl<T> Access<T> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }

    pub fn denial(&self) -> Option<Denial> {
        match self {
            Access::Granted(_) => None,
            Access::Denied(reason) => Some(*reason),
        }
    }
}

/// Tauri 명령 응답용 직렬화 가능한 에러
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<TrustError> for CommandError {
    fn from(error: TrustError) -> Self {
        let code = match &error {
            TrustError::NotInitialized => "NOT_INITIALIZED",
            TrustError::CorruptStore(_) => "CORRUPT_STORE",
            TrustError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            TrustError::Unauthorized => "UNAUTHORIZED",
            TrustError::InvalidInput(_) => "INVALID_INPUT",
            TrustError::Keychain(_) => "KEYCHAIN_ERROR",
            TrustError::Io(_) => "IO_ERROR",
            TrustError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

impl From<Denial> for CommandError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthorized => TrustError::Unauthorized.into(),
            other => CommandError {
                code: "DENIED".to_string(),
                message: "Request denied".to_string(),
                details: serde_json::to_string(&other).ok(),
            },
        }
    }
}

/// 신뢰 코어 결과 타입
pub type TrustResult<T> = Result<T, TrustError>;

/// Tauri 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_codes() {
        let err: CommandError = TrustError::CorruptStore("bad".into()).into();
        assert_eq!(err.code, "CORRUPT_STORE");
        assert!(err.message.contains("bad"));

        let err: CommandError = Denial::Unauthorized.into();
        assert_eq!(err.code, "UNAUTHORIZED");

        let err: CommandError = Denial::SessionExpired.into();
        assert_eq!(err.code, "DENIED");
        assert_eq!(err.details.as_deref(), Some("\"sessionExpired\""));
    }

    #[test]
    fn test_access_helpers() {
        let granted: Access<u8> = Access::Granted(1);
        assert!(granted.is_granted());
        assert_eq!(granted.denial(), None);

        let denied: Access<u8> = Access::Denied(Denial::LockedOut);
        assert!(!denied.is_granted());
        assert_eq!(denied.denial(), Some(Denial::LockedOut));
    }
}
