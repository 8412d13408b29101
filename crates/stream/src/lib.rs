//! Testdeck 분배 레이어 — 브로드캐스트 허브, 재생 히스토리, 재연결 포워더
//!
//! # 모듈 구성
//!
//! - [`history`]: 최근 이벤트의 용량 제한 FIFO 재생 버퍼
//! - [`hub`]: 관찰자 연결 수락, 히스토리 재생, 이벤트 팬아웃, 인바운드 명령 라우팅
//! - [`forwarder`]: 프로세스 경계 너머 무손실 릴레이 (큐 + 재연결)
//! - [`runner`]: 인바운드 명령을 외부 프로세스 실행으로 연결하는 브리지
//! - [`config`]: 스트림 레이어 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Producer ──► HubHandle ──► BroadcastHub ──┬──► Observer 1
//!  (or Forwarder ──TCP──►)      │           ├──► Observer 2
//!                            HistoryBuffer  └──► Observer N
//!                            (replay on connect)
//!
//! Observer ──"run_tests"──► ProcessRunner ──runner events──► BroadcastHub
//! ```
//!
//! 전달은 fire-and-forget입니다: 프로듀서는 어떤 관찰자의 수신
//! 확인도 기다리지 않으며, 단일 채널의 실패는 그 채널 제거로만
//! 이어집니다.

pub mod config;
pub mod error;
pub mod forwarder;
pub mod history;
pub mod hub;
pub mod runner;

// --- 주요 타입 re-export ---

// 허브
pub use hub::{BroadcastHub, HubBuilder, HubHandle, HubState};

// 포워더
pub use forwarder::{Forwarder, ForwarderState};

// 러너 브리지
pub use runner::ProcessRunner;

// 설정
pub use config::{ForwarderConfig, HubConfig, HubConfigBuilder, RunnerBridgeConfig};

// 에러
pub use error::StreamPipelineError;

// 히스토리
pub use history::HistoryBuffer;
