//! Trust Core Tauri 명령어
//!
//! 호출한 웹뷰의 라벨을 호출자 식별자로 사용하여 게이트웨이에 전달합니다.
//! - 권한 없는 웹뷰: `UNAUTHORIZED` 에러 (로그인 검증만 예외로 false)
//! - 세션/로그인 거부: false
//! - 저장소 손상, 복호화 실패 등: 에러

use std::path::PathBuf;

use serde::Deserialize;
use tauri::{State, Webview};

use crate::error::{Access, CommandResult, TrustError};
use crate::gateway::{Caller, TrustCore};
use crate::models::{EncryptedPayload, IntegrityFailure};
use crate::secrets::KeyProtection;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialArgs {
    pub username: String,
    pub password: String,
}

fn caller_of(webview: &Webview) -> Caller {
    Caller::from_surface(webview.label())
}

/// 거부는 에러로 변환
fn granted<T>(access: Access<T>) -> CommandResult<T> {
    match access {
        Access::Granted(value) => Ok(value),
        Access::Denied(denial) => Err(denial.into()),
    }
}

#[tauri::command]
pub async fn trust_encrypt(
    webview: Webview,
    core: State<'_, TrustCore>,
    plain_text: String,
) -> CommandResult<EncryptedPayload> {
    granted(core.encrypt(&caller_of(&webview), &plain_text)?)
}

#[tauri::command]
pub async fn trust_decrypt(
    webview: Webview,
    core: State<'_, TrustCore>,
    payload: EncryptedPayload,
) -> CommandResult<String> {
    granted(core.decrypt(&caller_of(&webview), &payload)?)
}

#[tauri::command]
pub async fn trust_key_protection(
    webview: Webview,
    core: State<'_, TrustCore>,
) -> CommandResult<KeyProtection> {
    granted(core.key_protection(&caller_of(&webview))?)
}

#[tauri::command]
pub async fn trust_store_credential(
    webview: Webview,
    core: State<'_, TrustCore>,
    args: CredentialArgs,
) -> CommandResult<()> {
    granted(core.store_credential(&caller_of(&webview), &args.username, &args.password)?)
}

#[tauri::command]
pub async fn trust_remove_credential(
    webview: Webview,
    core: State<'_, TrustCore>,
    username: String,
) -> CommandResult<bool> {
    granted(core.remove_credential(&caller_of(&webview), &username)?)
}

/// 로그인 검증
///
/// 권한 없음/잠금/비밀번호 불일치를 응답 형태로 구분하지 않도록 모두 false.
#[tauri::command]
pub async fn trust_validate_credential(
    webview: Webview,
    core: State<'_, TrustCore>,
    args: CredentialArgs,
) -> CommandResult<bool> {
    let access = core.validate_credential(&caller_of(&webview), &args.username, &args.password)?;
    Ok(access.is_granted())
}

/// 남은 잠금 시간 (ms). 잠금이 아니면 null
#[tauri::command]
pub async fn trust_remaining_lockout(
    webview: Webview,
    core: State<'_, TrustCore>,
    username: String,
) -> CommandResult<Option<i64>> {
    let remaining = granted(core.remaining_lockout(&caller_of(&webview), &username)?)?;
    Ok(remaining.map(|d| d.num_milliseconds()))
}

#[tauri::command]
pub async fn trust_create_session(
    webview: Webview,
    core: State<'_, TrustCore>,
    user_id: String,
    ttl_ms: Option<i64>,
) -> CommandResult<String> {
    let ttl = ttl_ms
        .map(|ms| {
            chrono::Duration::try_milliseconds(ms)
                .ok_or_else(|| TrustError::InvalidInput("session ttl out of range".to_string()))
        })
        .transpose()?;
    granted(core.create_session(&caller_of(&webview), &user_id, ttl)?)
}

#[tauri::command]
pub async fn trust_validate_session(
    webview: Webview,
    core: State<'_, TrustCore>,
    user_id: String,
    token: String,
) -> CommandResult<bool> {
    match core.validate_session(&caller_of(&webview), &user_id, &token)? {
        Access::Granted(()) => Ok(true),
        Access::Denied(crate::error::Denial::Unauthorized) => {
            Err(crate::error::Denial::Unauthorized.into())
        }
        Access::Denied(_) => Ok(false),
    }
}

#[tauri::command]
pub async fn trust_invalidate_session(
    webview: Webview,
    core: State<'_, TrustCore>,
    user_id: String,
) -> CommandResult<()> {
    granted(core.invalidate_session(&caller_of(&webview), &user_id)?)
}

#[tauri::command]
pub async fn trust_purge_expired_sessions(
    webview: Webview,
    core: State<'_, TrustCore>,
) -> CommandResult<usize> {
    granted(core.purge_expired_sessions(&caller_of(&webview))?)
}

#[tauri::command]
pub async fn trust_register_file(
    webview: Webview,
    core: State<'_, TrustCore>,
    path: String,
) -> CommandResult<()> {
    granted(core.register_file(&caller_of(&webview), &PathBuf::from(path))?).map(|_| ())
}

#[tauri::command]
pub async fn trust_validate_file(
    webview: Webview,
    core: State<'_, TrustCore>,
    path: String,
) -> CommandResult<bool> {
    granted(core.validate_file(&caller_of(&webview), &PathBuf::from(path))?)
}

#[tauri::command]
pub async fn trust_validate_all_files(
    webview: Webview,
    core: State<'_, TrustCore>,
) -> CommandResult<Vec<IntegrityFailure>> {
    granted(core.validate_all_files(&caller_of(&webview))?)
}

#[tauri::command]
pub async fn trust_unregister_file(
    webview: Webview,
    core: State<'_, TrustCore>,
    path: String,
) -> CommandResult<bool> {
    granted(core.unregister_file(&caller_of(&webview), &PathBuf::from(path))?)
}
