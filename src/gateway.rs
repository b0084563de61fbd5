//! Access Gateway
//!
//! 외부(프론트엔드)에서 도달 가능한 유일한 진입점입니다.
//! 모든 요청은 다음 순서로 처리됩니다.
//!
//! 1. 호출자 확인: 호스트가 만든 신뢰 UI 표면(메인 웹뷰)에서 온 요청인지
//! 2. 작업별 정책: 로그인 시도 제한 등
//! 3. 담당 컴포넌트로 위임
//!
//! 정책 거부는 `Access::Denied`로, 장애는 `TrustError`로 반환합니다.

use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::auth::{
    AttemptGate, CredentialVault, FileRateLimiter, LockoutPolicy, LoginPhase, LoginRateLimiter,
    MemoryRateLimiter, SessionCheck, SessionRegistry,
};
use crate::config::{LockoutPersistence, TrustConfig};
use crate::error::{Access, Denial, TrustResult};
use crate::integrity::IntegrityManifest;
use crate::models::{EncryptedPayload, IntegrityFailure};
use crate::secrets::{EncryptionEngine, KeyProtection, KeyProtector, KeyringProtector, SecretStore};
use crate::storage::ensure_private_dir;

/// 요청을 보낸 UI 표면
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    surface: String,
}

impl Caller {
    /// Tauri 웹뷰 라벨로 호출자 생성
    pub fn from_surface(label: impl Into<String>) -> Self {
        Self {
            surface: label.into(),
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }
}

/// 신뢰 코어 (게이트웨이 + 하위 컴포넌트 소유)
pub struct TrustCore {
    config: TrustConfig,
    secrets: Arc<SecretStore>,
    engine: EncryptionEngine,
    credentials: CredentialVault,
    sessions: SessionRegistry,
    integrity: IntegrityManifest,
    limiter: Box<dyn LoginRateLimiter>,
}

impl TrustCore {
    /// OS Keychain 보호 계층과 설정에 맞는 시도 제한기로 생성
    pub fn new(config: TrustConfig) -> Self {
        let protector = Box::new(KeyringProtector::new(config.keychain_service.clone()));
        let policy = LockoutPolicy::from(&config);
        let limiter: Box<dyn LoginRateLimiter> = match config.lockout_persistence {
            LockoutPersistence::Memory => Box::new(MemoryRateLimiter::new(policy)),
            LockoutPersistence::Disk => Box::new(FileRateLimiter::new(policy)),
        };
        let credentials = CredentialVault::new(config.kdf_iterations);
        Self::with_parts(config, protector, limiter, credentials)
    }

    fn with_parts(
        config: TrustConfig,
        protector: Box<dyn KeyProtector>,
        limiter: Box<dyn LoginRateLimiter>,
        credentials: CredentialVault,
    ) -> Self {
        let secrets = Arc::new(SecretStore::new(protector));
        Self {
            engine: EncryptionEngine::new(Arc::clone(&secrets)),
            sessions: SessionRegistry::new(config.session_ttl),
            integrity: IntegrityManifest::new(),
            secrets,
            credentials,
            limiter,
            config,
        }
    }

    /// 각 저장소의 위치를 base dir 아래로 설정 (다른 작업 전에 1회 호출)
    ///
    /// 호스트 프로세스가 직접 호출하므로 호출자 확인 대상이 아닙니다.
    pub fn initialize(&self, base_dir: &Path) -> TrustResult<()> {
        ensure_private_dir(base_dir)?;

        self.secrets.configure(base_dir);
        self.credentials.configure(base_dir);
        self.sessions.configure(base_dir);
        self.integrity.configure(base_dir);
        self.limiter.configure(base_dir);

        tracing::info!("[TrustCore] Initialized at {}", base_dir.display());
        Ok(())
    }

    fn authorize(&self, caller: &Caller) -> bool {
        let trusted = caller.surface() == self.config.trusted_surface;
        if !trusted {
            tracing::warn!("[TrustCore] Rejected call from surface '{}'", caller.surface());
        }
        trusted
    }

    /// 호출자 확인 후 작업 실행
    fn gated<T>(&self, caller: &Caller, op: impl FnOnce() -> TrustResult<T>) -> TrustResult<Access<T>> {
        if !self.authorize(caller) {
            return Ok(Access::Denied(Denial::Unauthorized));
        }
        op().map(Access::Granted)
    }

    // ---------- 암호화 ----------

    pub fn encrypt(&self, caller: &Caller, plain_text: &str) -> TrustResult<Access<EncryptedPayload>> {
        self.gated(caller, || self.engine.encrypt(plain_text))
    }

    pub fn decrypt(&self, caller: &Caller, payload: &EncryptedPayload) -> TrustResult<Access<String>> {
        self.gated(caller, || self.engine.decrypt(payload))
    }

    pub fn key_protection(&self, caller: &Caller) -> TrustResult<Access<KeyProtection>> {
        self.gated(caller, || self.secrets.protection_status())
    }

    // ---------- 자격 증명 ----------

    pub fn store_credential(&self, caller: &Caller, username: &str, password: &str) -> TrustResult<Access<()>> {
        self.gated(caller, || self.credentials.store(username, password))
    }

    pub fn remove_credential(&self, caller: &Caller, username: &str) -> TrustResult<Access<bool>> {
        self.gated(caller, || self.credentials.remove(username))
    }

    /// 로그인 검증
    ///
    /// 시도는 검증 전에 실패로 먼저 기록되고, 잠금 중이면 Credential Vault를
    /// 호출하지 않고 거부합니다. 검증에 성공하면 기록을 지웁니다.
    pub fn validate_credential(&self, caller: &Caller, username: &str, password: &str) -> TrustResult<Access<()>> {
        if !self.authorize(caller) {
            return Ok(Access::Denied(Denial::Unauthorized));
        }

        let phase = match self.limiter.begin_attempt(username, Utc::now())? {
            AttemptGate::Locked(_) => {
                tracing::warn!("[TrustCore] Login attempt while locked out");
                return Ok(Access::Denied(Denial::LockedOut));
            }
            AttemptGate::Open(phase) => phase,
        };

        if self.credentials.verify(username, password)? {
            self.limiter.record_success(username)?;
            return Ok(Access::Granted(()));
        }

        if let LoginPhase::Locked { until } = phase {
            tracing::warn!("[TrustCore] Too many failed logins, locked until {}", until);
        }
        Ok(Access::Denied(Denial::InvalidCredentials))
    }

    pub fn remaining_lockout(&self, caller: &Caller, username: &str) -> TrustResult<Access<Option<Duration>>> {
        self.gated(caller, || self.limiter.remaining_lockout(username, Utc::now()))
    }

    // ---------- 세션 ----------

    pub fn create_session(&self, caller: &Caller, user_id: &str, ttl: Option<Duration>) -> TrustResult<Access<String>> {
        self.gated(caller, || self.sessions.create(user_id, ttl))
    }

    pub fn validate_session(&self, caller: &Caller, user_id: &str, token: &str) -> TrustResult<Access<()>> {
        if !self.authorize(caller) {
            return Ok(Access::Denied(Denial::Unauthorized));
        }
        Ok(match self.sessions.check(user_id, token)? {
            SessionCheck::Valid => Access::Granted(()),
            SessionCheck::Expired => Access::Denied(Denial::SessionExpired),
            SessionCheck::Missing | SessionCheck::Mismatch => Access::Denied(Denial::SessionInvalid),
        })
    }

    pub fn invalidate_session(&self, caller: &Caller, user_id: &str) -> TrustResult<Access<()>> {
        self.gated(caller, || self.sessions.invalidate(user_id))
    }

    pub fn purge_expired_sessions(&self, caller: &Caller) -> TrustResult<Access<usize>> {
        self.gated(caller, || self.sessions.purge_expired())
    }

    // ---------- 무결성 ----------

    pub fn register_file(&self, caller: &Caller, path: &Path) -> TrustResult<Access<String>> {
        self.gated(caller, || self.integrity.register(path))
    }

    pub fn validate_file(&self, caller: &Caller, path: &Path) -> TrustResult<Access<bool>> {
        self.gated(caller, || self.integrity.validate(path))
    }

    pub fn validate_all_files(&self, caller: &Caller) -> TrustResult<Access<Vec<IntegrityFailure>>> {
        self.gated(caller, || self.integrity.validate_all())
    }

    pub fn unregister_file(&self, caller: &Caller, path: &Path) -> TrustResult<Access<bool>> {
        self.gated(caller, || self.integrity.unregister(path))
    }
}

#[cfg(test)]
impl TrustCore {
    /// 낮은 KDF 반복 횟수 + 메모리 보호 계층으로 생성
    pub(crate) fn for_tests(config: TrustConfig) -> Self {
        use crate::secrets::blob::testing::MemoryProtector;

        let limiter = Box::new(MemoryRateLimiter::new(LockoutPolicy::from(&config)));
        let credentials = CredentialVault::with_iterations(1_000);
        Self::with_parts(config, Box::new(MemoryProtector::new()), limiter, credentials)
    }
}
