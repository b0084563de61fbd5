//! Failed login lockout (사용자별 로그인 시도 제한)
//!
//! 상태 전이:
//! - Clear (레코드 없음) → Accumulating (최근 실패 1~4회) → Locked
//! - 성공 시 레코드 삭제 → Clear
//! - 잠금 중 시도는 Credential Vault를 호출하지 않고 거부
//! - 잠금 시간이 지나면 다음 시도부터 다시 Accumulating
//!
//! 시도는 검증 전에 실패로 먼저 기록됩니다 (`begin_attempt`).
//! 잠금 확인과 기록이 한 번의 잠금 안에서 이뤄지므로, 동시에 들어온 시도도
//! `max_failures`번을 넘어 Credential Vault에 도달하지 못합니다.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use crate::config::TrustConfig;
use crate::error::{TrustError, TrustResult};
use crate::storage::{load_json, save_json, StoreLocation};

pub const LOGIN_ATTEMPTS_FILE_NAME: &str = "login_attempts.json";

/// 잠금 정책
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_failures: u32,
    pub lockout_duration: Duration,
    pub failure_window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from(&TrustConfig::default())
    }
}

impl From<&TrustConfig> for LockoutPolicy {
    fn from(config: &TrustConfig) -> Self {
        Self {
            max_failures: config.max_login_failures,
            lockout_duration: config.lockout_duration,
            failure_window: config.failure_window,
        }
    }
}

/// 사용자별 시도 상태 (epoch milliseconds)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptState {
    pub failure_count: u32,
    pub last_attempt_at: i64,
    pub locked_until: Option<i64>,
}

/// 현재 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Clear,
    Accumulating(u32),
    Locked { until: DateTime<Utc> },
}

impl LoginAttemptState {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until
            .map_or(false, |until| now.timestamp_millis() < until)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> LoginPhase {
        match self.locked_until {
            Some(until) if now.timestamp_millis() < until => LoginPhase::Locked {
                until: millis_to_datetime(until),
            },
            _ if self.failure_count > 0 => LoginPhase::Accumulating(self.failure_count),
            _ => LoginPhase::Clear,
        }
    }

    /// 실패 1회 반영
    pub fn register_failure(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> LoginPhase {
        let now_ms = now.timestamp_millis();

        // 잠금이 끝났으면 정상 흐름으로 복귀
        if self.locked_until.is_some_and(|until| now_ms >= until) {
            self.locked_until = None;
            self.failure_count = 0;
        }

        if self.failure_count > 0
            && now_ms - self.last_attempt_at > policy.failure_window.num_milliseconds()
        {
            self.failure_count = 0;
        }

        self.failure_count += 1;
        self.last_attempt_at = now_ms;

        if self.failure_count >= policy.max_failures {
            self.locked_until = Some(now_ms.saturating_add(policy.lockout_duration.num_milliseconds()));
            self.failure_count = 0;
        }

        self.phase(now)
    }

    /// 잠금 중이 아니면 이번 시도를 실패로 미리 기록
    pub fn begin_attempt(&mut self, policy: &LockoutPolicy, now: DateTime<Utc>) -> AttemptGate {
        match self.locked_until {
            Some(until) if now.timestamp_millis() < until => {
                AttemptGate::Locked(millis_to_datetime(until))
            }
            _ => AttemptGate::Open(self.register_failure(policy, now)),
        }
    }

    /// 잠금이 끝났고 마지막 실패도 window 밖이면 더 보관할 필요 없음
    fn is_stale(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        !self.is_locked(now)
            && now.timestamp_millis() - self.last_attempt_at > policy.failure_window.num_milliseconds()
    }
}

/// `begin_attempt` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptGate {
    /// 검증 진행. 값은 이번 시도를 실패로 기록한 뒤의 단계
    Open(LoginPhase),
    /// 잠금 중 (검증하지 않음)
    Locked(DateTime<Utc>),
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// 로그인 시도 제한기
///
/// 게이트웨이가 소유하며, 메모리/디스크 구현을 호출부 변경 없이 교체할 수 있습니다.
pub trait LoginRateLimiter: Send + Sync {
    /// base dir 설정 (디스크 구현만 사용)
    fn configure(&self, _base_dir: &Path) {}

    /// 잠금 확인 + 시도 기록을 원자적으로 수행
    ///
    /// `Open`이면 이번 시도는 이미 실패로 계산된 상태이며, 검증이 성공하면
    /// `record_success`로 지웁니다.
    fn begin_attempt(&self, username: &str, now: DateTime<Utc>) -> TrustResult<AttemptGate>;

    fn remaining_lockout(&self, username: &str, now: DateTime<Utc>) -> TrustResult<Option<Duration>>;

    fn record_success(&self, username: &str) -> TrustResult<()>;
}

fn remaining(state: Option<&LoginAttemptState>, now: DateTime<Utc>) -> Option<Duration> {
    let until = state?.locked_until?;
    let left = until - now.timestamp_millis();
    (left > 0).then(|| Duration::milliseconds(left))
}

/// 프로세스 메모리에만 보관 (재시작 시 초기화)
pub struct MemoryRateLimiter {
    policy: LockoutPolicy,
    attempts: Mutex<HashMap<String, LoginAttemptState>>,
}

impl MemoryRateLimiter {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

impl LoginRateLimiter for MemoryRateLimiter {
    fn begin_attempt(&self, username: &str, now: DateTime<Utc>) -> TrustResult<AttemptGate> {
        let mut attempts = self.attempts.lock().map_err(TrustError::poisoned)?;
        attempts.retain(|_, state| !state.is_stale(&self.policy, now));
        let state = attempts.entry(username.to_string()).or_default();
        Ok(state.begin_attempt(&self.policy, now))
    }

    fn remaining_lockout(&self, username: &str, now: DateTime<Utc>) -> TrustResult<Option<Duration>> {
        let attempts = self.attempts.lock().map_err(TrustError::poisoned)?;
        Ok(remaining(attempts.get(username), now))
    }

    fn record_success(&self, username: &str) -> TrustResult<()> {
        let mut attempts = self.attempts.lock().map_err(TrustError::poisoned)?;
        attempts.remove(username);
        Ok(())
    }
}

/// `login_attempts.json`에 저장 (재시작 후에도 잠금 유지)
pub struct FileRateLimiter {
    policy: LockoutPolicy,
    location: StoreLocation,
    write_lock: Mutex<()>,
}

type AttemptDocument = BTreeMap<String, LoginAttemptState>;

impl FileRateLimiter {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            location: StoreLocation::new(LOGIN_ATTEMPTS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> TrustResult<(std::path::PathBuf, AttemptDocument)> {
        let path = self.location.path()?;
        let doc = load_json(&path)?;
        Ok((path, doc))
    }
}

impl LoginRateLimiter for FileRateLimiter {
    fn configure(&self, base_dir: &Path) {
        self.location.configure(base_dir);
    }

    fn begin_attempt(&self, username: &str, now: DateTime<Utc>) -> TrustResult<AttemptGate> {
        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let (path, mut doc) = self.load()?;
        doc.retain(|_, state| !state.is_stale(&self.policy, now));
        let gate = doc
            .entry(username.to_string())
            .or_default()
            .begin_attempt(&self.policy, now);
        if let AttemptGate::Open(_) = gate {
            save_json(&path, &doc)?;
        }
        Ok(gate)
    }

    fn remaining_lockout(&self, username: &str, now: DateTime<Utc>) -> TrustResult<Option<Duration>> {
        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let (_, doc) = self.load()?;
        Ok(remaining(doc.get(username), now))
    }

    fn record_success(&self, username: &str) -> TrustResult<()> {
        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let (path, mut doc) = self.load()?;
        if doc.remove(username).is_some() {
            save_json(&path, &doc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use tempfile::tempdir;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::minutes(minutes)
    }

    fn is_locked(limiter: &dyn LoginRateLimiter, username: &str, now: DateTime<Utc>) -> bool {
        limiter.remaining_lockout(username, now).unwrap().is_some()
    }

    #[test]
    fn test_policy_default() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_failures, 5);
        assert_eq!(policy.lockout_duration, Duration::minutes(15));
    }

    #[test]
    fn test_state_transitions() {
        let policy = LockoutPolicy::default();
        let mut state = LoginAttemptState::default();
        assert_eq!(state.phase(at(0)), LoginPhase::Clear);

        for n in 1..5 {
            assert_eq!(state.register_failure(&policy, at(0)), LoginPhase::Accumulating(n));
        }

        // 5번째 실패에서 잠금, 카운트는 0으로
        let phase = state.register_failure(&policy, at(1));
        assert_eq!(phase, LoginPhase::Locked { until: at(16) });
        assert_eq!(state.failure_count, 0);
        assert!(state.is_locked(at(15)));
        assert!(!state.is_locked(at(16)));

        // 잠금이 끝난 뒤의 실패는 Accumulating(1)부터 다시 시작
        assert_eq!(state.register_failure(&policy, at(17)), LoginPhase::Accumulating(1));
        assert_eq!(state.locked_until, None);
    }

    #[test]
    fn test_begin_attempt_counts_before_verification() {
        let policy = LockoutPolicy::default();
        let mut state = LoginAttemptState::default();

        for n in 1..5 {
            assert_eq!(
                state.begin_attempt(&policy, at(0)),
                AttemptGate::Open(LoginPhase::Accumulating(n))
            );
        }
        // 5번째 시도는 진행되지만 그 자리에서 잠금
        assert_eq!(
            state.begin_attempt(&policy, at(0)),
            AttemptGate::Open(LoginPhase::Locked { until: at(15) })
        );
        assert_eq!(state.begin_attempt(&policy, at(1)), AttemptGate::Locked(at(15)));
        // 잠금 중 시도는 카운트에 반영되지 않음
        assert_eq!(state.failure_count, 0);
    }

    #[test]
    fn test_stale_failures_are_forgotten() {
        let policy = LockoutPolicy::default();
        let mut state = LoginAttemptState::default();

        for _ in 0..4 {
            state.register_failure(&policy, at(0));
        }
        // window(15분)보다 오래 지난 뒤의 실패는 카운트를 다시 시작
        assert_eq!(state.register_failure(&policy, at(20)), LoginPhase::Accumulating(1));
    }

    #[test]
    fn test_memory_limiter() {
        let limiter = MemoryRateLimiter::new(LockoutPolicy::default());

        for _ in 0..5 {
            assert!(matches!(limiter.begin_attempt("alice", at(0)).unwrap(), AttemptGate::Open(_)));
        }
        assert_eq!(limiter.begin_attempt("alice", at(5)).unwrap(), AttemptGate::Locked(at(15)));
        assert!(is_locked(&limiter, "alice", at(5)));
        assert!(!is_locked(&limiter, "bob", at(5)));
        assert_eq!(
            limiter.remaining_lockout("alice", at(5)).unwrap(),
            Some(Duration::minutes(10))
        );
        assert!(!is_locked(&limiter, "alice", at(15)));
        assert_eq!(limiter.remaining_lockout("alice", at(15)).unwrap(), None);
    }

    #[test]
    fn test_success_clears_state() {
        let limiter = MemoryRateLimiter::new(LockoutPolicy::default());

        for _ in 0..4 {
            limiter.begin_attempt("alice", at(0)).unwrap();
        }
        limiter.record_success("alice").unwrap();

        // 카운트가 0으로 돌아갔으므로 4번 더 실패해도 잠기지 않음
        for _ in 0..4 {
            limiter.begin_attempt("alice", at(0)).unwrap();
        }
        assert!(!is_locked(&limiter, "alice", at(0)));
    }

    #[test]
    fn test_concurrent_attempts_respect_limit() {
        let limiter = Arc::new(MemoryRateLimiter::new(LockoutPolicy::default()));
        let barrier = Arc::new(Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.begin_attempt("alice", at(0)).unwrap()
                })
            })
            .collect();

        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|gate| matches!(gate, AttemptGate::Open(_)))
            .count();
        assert_eq!(opened, 5);
    }

    #[test]
    fn test_memory_limiter_drops_stale_entries() {
        let limiter = MemoryRateLimiter::new(LockoutPolicy::default());

        for n in 0..100 {
            limiter.begin_attempt(&format!("user{}", n), at(0)).unwrap();
        }
        for _ in 0..5 {
            limiter.begin_attempt("locked", at(0)).unwrap();
        }
        assert_eq!(limiter.attempts.lock().unwrap().len(), 101);

        // window가 지난 실패 기록은 다음 시도에서 정리, 잠금 중인 항목은 유지
        limiter.begin_attempt("fresh", at(14)).unwrap();
        assert_eq!(limiter.attempts.lock().unwrap().len(), 101 + 1);
        limiter.begin_attempt("fresh", at(16)).unwrap();
        assert_eq!(limiter.attempts.lock().unwrap().len(), 1);
        assert!(!is_locked(&limiter, "locked", at(16)));
    }

    #[test]
    fn test_file_limiter_survives_restart() {
        let dir = tempdir().unwrap();

        let limiter = FileRateLimiter::new(LockoutPolicy::default());
        limiter.configure(dir.path());
        for _ in 0..5 {
            limiter.begin_attempt("alice", at(0)).unwrap();
        }

        let reopened = FileRateLimiter::new(LockoutPolicy::default());
        reopened.configure(dir.path());
        assert!(is_locked(&reopened, "alice", at(1)));
        assert_eq!(reopened.begin_attempt("alice", at(1)).unwrap(), AttemptGate::Locked(at(15)));

        reopened.record_success("alice").unwrap();
        assert!(!is_locked(&reopened, "alice", at(1)));
    }

    #[test]
    fn test_file_limiter_requires_configuration() {
        let limiter = FileRateLimiter::new(LockoutPolicy::default());
        assert!(matches!(
            limiter.begin_attempt("alice", at(0)),
            Err(TrustError::NotInitialized)
        ));
    }
}
