//! Trust Core 설정
//!
//! 기본값 + `TRUSTCORE_*` 환경 변수 오버라이드.
//! 데스크톱 진입점에서는 `.env`를 먼저 로드합니다 (dotenvy, 실패 무시).

use chrono::Duration;

/// PBKDF2 반복 횟수 기본값
pub const DEFAULT_KDF_ITERATIONS: u32 = 310_000;

/// 허용되는 최소 반복 횟수
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// 기본 키체인 서비스 이름
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.trustcore.app";

/// 로그인 시도 상태 보관 방식
///
/// `Memory`는 재시작 시 잠금이 풀립니다 (가용성 우선).
/// `Disk`는 `login_attempts.json`에 저장해 재시작 후에도 유지합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutPersistence {
    Memory,
    Disk,
}

#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub kdf_iterations: u32,
    pub session_ttl: Duration,
    pub max_login_failures: u32,
    pub lockout_duration: Duration,
    /// 이 시간보다 오래된 실패는 카운트를 다시 시작
    pub failure_window: Duration,
    /// 신뢰하는 UI 표면 (Tauri 메인 웹뷰 라벨)
    pub trusted_surface: String,
    pub lockout_persistence: LockoutPersistence,
    pub keychain_service: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            session_ttl: Duration::hours(1),
            max_login_failures: 5,
            lockout_duration: Duration::minutes(15),
            failure_window: Duration::minutes(15),
            trusted_surface: "main".to_string(),
            lockout_persistence: LockoutPersistence::Memory,
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
        }
    }
}

impl TrustConfig {
    /// `.env` 로드 후 환경 변수로 기본값을 덮어씀
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_var::<u32>(&lookup, "TRUSTCORE_KDF_ITERATIONS") {
            config.kdf_iterations = n;
        }
        if let Some(d) = seconds_var(&lookup, "TRUSTCORE_SESSION_TTL_SECS") {
            config.session_ttl = d;
        }
        if let Some(n) = parse_var::<u32>(&lookup, "TRUSTCORE_MAX_LOGIN_FAILURES") {
            config.max_login_failures = n.max(1);
        }
        if let Some(d) = seconds_var(&lookup, "TRUSTCORE_LOCKOUT_SECS") {
            config.lockout_duration = d;
        }
        if let Some(d) = seconds_var(&lookup, "TRUSTCORE_FAILURE_WINDOW_SECS") {
            config.failure_window = d;
        }
        if let Some(label) = lookup("TRUSTCORE_TRUSTED_SURFACE") {
            if !label.trim().is_empty() {
                config.trusted_surface = label.trim().to_string();
            }
        }
        if let Some(mode) = lookup("TRUSTCORE_LOCKOUT_PERSISTENCE") {
            config.lockout_persistence = match mode.trim().to_ascii_lowercase().as_str() {
                "disk" => LockoutPersistence::Disk,
                _ => LockoutPersistence::Memory,
            };
        }
        if let Some(service) = lookup("TRUSTCORE_KEYCHAIN_SERVICE") {
            if !service.trim().is_empty() {
                config.keychain_service = service.trim().to_string();
            }
        }

        config.kdf_iterations = config.kdf_iterations.max(MIN_KDF_ITERATIONS);
        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("[TrustConfig] Ignoring invalid value for {}", key);
            None
        }
    }
}

/// 양수 초 단위 기간. 0 이하나 범위를 넘는 값은 무시
fn seconds_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let secs = parse_var::<i64>(lookup, key)?;
    match Duration::try_seconds(secs) {
        Some(d) if secs > 0 => Some(d),
        _ => {
            tracing::warn!("[TrustConfig] Ignoring out-of-range value for {}", key);
            None
        }
    }
}
