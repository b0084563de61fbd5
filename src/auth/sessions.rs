//! Session Registry - 사용자별 세션 토큰 발급/검증/폐기
//!
//! - 사용자당 세션 1개 (새 세션이 이전 세션을 대체)
//! - 만료된 레코드는 타이머가 아니라 다음 검증 시도에서 삭제 (lazy expiry)

use chrono::{Duration, Utc};
use rand::Rng;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{TrustError, TrustResult};
use crate::models::{SessionDocument, SessionRecord};
use crate::storage::{load_json, save_json, StoreLocation};
use crate::utils::constant_time_eq;

/// 토큰 길이 (256-bit)
pub const TOKEN_LEN: usize = 32;

pub const SESSIONS_FILE_NAME: &str = "sessions.json";

/// 세션 검증 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Valid,
    Missing,
    Mismatch,
    Expired,
}

pub struct SessionRegistry {
    location: StoreLocation,
    default_ttl: Duration,
    write_lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            location: StoreLocation::new(SESSIONS_FILE_NAME),
            default_ttl,
            write_lock: Mutex::new(()),
        }
    }

    pub fn configure(&self, base_dir: &Path) -> bool {
        self.location.configure(base_dir)
    }

    /// 새 세션 발급 (기존 세션 덮어쓰기). ttl 생략 시 기본값
    ///
    /// ttl이 0 이하이거나 만료 시각이 표현 범위를 넘으면 `InvalidInput`
    pub fn create(&self, user_id: &str, ttl: Option<Duration>) -> TrustResult<String> {
        let path = self.location.path()?;

        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill(&mut bytes);
        let token = hex::encode(bytes);

        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl <= Duration::zero() {
            return Err(TrustError::InvalidInput("session ttl must be positive".to_string()));
        }
        let expires_at = Utc::now()
            .timestamp_millis()
            .checked_add(ttl.num_milliseconds())
            .ok_or_else(|| TrustError::InvalidInput("session ttl out of range".to_string()))?;

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: SessionDocument = load_json(&path)?;
        doc.insert(
            user_id.to_string(),
            SessionRecord {
                token: token.clone(),
                expires_at,
            },
        );
        save_json(&path, &doc)?;

        tracing::debug!("[SessionRegistry] Session issued, ttl={}ms", ttl.num_milliseconds());
        Ok(token)
    }

    pub fn validate(&self, user_id: &str, token: &str) -> TrustResult<bool> {
        Ok(self.check(user_id, token)? == SessionCheck::Valid)
    }

    pub fn check(&self, user_id: &str, token: &str) -> TrustResult<SessionCheck> {
        self.check_at(user_id, token, Utc::now().timestamp_millis())
    }

    fn check_at(&self, user_id: &str, token: &str, now_ms: i64) -> TrustResult<SessionCheck> {
        let path = self.location.path()?;

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: SessionDocument = load_json(&path)?;

        let Some(record) = doc.get(user_id) else {
            return Ok(SessionCheck::Missing);
        };

        if !constant_time_eq(record.token.as_bytes(), token.as_bytes()) {
            return Ok(SessionCheck::Mismatch);
        }

        if now_ms > record.expires_at {
            doc.remove(user_id);
            save_json(&path, &doc)?;
            tracing::debug!("[SessionRegistry] Expired session removed");
            return Ok(SessionCheck::Expired);
        }

        Ok(SessionCheck::Valid)
    }

    /// 세션 폐기 (없으면 no-op)
    pub fn invalidate(&self, user_id: &str) -> TrustResult<()> {
        let path = self.location.path()?;

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: SessionDocument = load_json(&path)?;
        if doc.remove(user_id).is_some() {
            save_json(&path, &doc)?;
        }
        Ok(())
    }

    /// 만료된 세션 일괄 삭제. 삭제된 수 반환
    pub fn purge_expired(&self) -> TrustResult<usize> {
        let path = self.location.path()?;
        let now_ms = Utc::now().timestamp_millis();

        let _guard = self.write_lock.lock().map_err(TrustError::poisoned)?;
        let mut doc: SessionDocument = load_json(&path)?;
        let before = doc.len();
        doc.retain(|_, record| now_ms <= record.expires_at);
        let removed = before - doc.len();
        if removed > 0 {
            save_json(&path, &doc)?;
        }
        Ok(removed)
    }
}
