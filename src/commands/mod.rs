//! Tauri Commands Module
//!
//! 프론트엔드에서 호출 가능한 신뢰 코어 명령어 정의

pub mod trust;
