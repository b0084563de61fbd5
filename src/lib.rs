//! Trust Core - Tauri Backend Library
//!
//! 저장 데이터 보호, 로컬 사용자 인증, 세션 발급/검증, 중요 파일 변조 감지를 담당하는
//! 로컬 신뢰 코어입니다. 프론트엔드는 `gateway::TrustCore`를 통해서만 접근합니다.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod integrity;
pub mod models;
pub mod secrets;
pub mod storage;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod commands;

pub use config::TrustConfig;
pub use error::{Access, Denial, TrustError, TrustResult};
pub use gateway::{Caller, TrustCore};

/// 신뢰 코어 데이터 디렉토리 이름 (app_data_dir 하위)
pub const TRUST_DIR_NAME: &str = "trust";

#[cfg(feature = "desktop")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    // RUST_LOG=trust_core_lib=debug 로 상세 로그. 기본 info 레벨은 비밀 값을 출력하지 않음
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trust_core_lib=info")),
        )
        .with_target(false)
        .try_init();
}

/// Tauri 앱 실행
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;

    init_tracing();
    let config = TrustConfig::load();

    tauri::Builder::default()
        .setup(move |app| {
            // 신뢰 코어 저장소는 앱 전용 데이터 디렉토리 아래에 둠
            let trust_dir = app.path().app_data_dir()?.join(TRUST_DIR_NAME);

            let core = TrustCore::new(config);
            core.initialize(&trust_dir)?;

            app.manage(core);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::trust::trust_encrypt,
            commands::trust::trust_decrypt,
            commands::trust::trust_key_protection,
            commands::trust::trust_store_credential,
            commands::trust::trust_remove_credential,
            commands::trust::trust_validate_credential,
            commands::trust::trust_remaining_lockout,
            commands::trust::trust_create_session,
            commands::trust::trust_validate_session,
            commands::trust::trust_invalidate_session,
            commands::trust::trust_purge_expired_sessions,
            commands::trust::trust_register_file,
            commands::trust::trust_validate_file,
            commands::trust::trust_validate_all_files,
            commands::trust::trust_unregister_file,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
