//! 인증 모듈
//!
//! - `credentials`: 비밀번호 해시 저장/검증 (Credential Vault)
//! - `sessions`: 사용자별 세션 토큰 (Session Registry)
//! - `lockout`: 로그인 시도 제한기 (게이트웨이가 소유)

pub mod credentials;
pub mod lockout;
pub mod sessions;

pub use credentials::CredentialVault;
pub use lockout::{
    AttemptGate, FileRateLimiter, LockoutPolicy, LoginAttemptState, LoginPhase, LoginRateLimiter,
    MemoryRateLimiter,
};
pub use sessions::{SessionCheck, SessionRegistry};
