//! 이벤트 시스템 — 파이프라인을 흐르는 원자 단위
//!
//! 계측된 테스트 런이 방출하는 모든 것은 [`Event`] 하나로 표현됩니다.
//! 스트림 레이어는 이벤트를 변형하지 않고 그대로 전달하며,
//! 집계 레이어만 이벤트로부터 파생 상태를 만듭니다.
//!
//! # 와이어 형식
//! 개행 구분 JSON 한 줄이 이벤트 하나입니다. `type` 필드가 없는
//! 레거시 스텝 이벤트와 알 수 없는 추가 필드를 모두 허용합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{StepStatus, unix_timestamp};

// --- 생명주기 스텝 이름 상수 ---

/// 테스트 시작 마커 스텝
pub const STEP_TEST_START: &str = "test_start";
/// 테스트 종료 마커 스텝
pub const STEP_TEST_FINISH: &str = "test_finish";
/// 테스트 결과 마커 스텝 (그룹 롤업에서 우선)
pub const STEP_TEST_RESULT: &str = "test_result";

// --- 러너 라인 상수 ---

/// 러너 스트림 완료 마커 — 이 문자열을 포함한 라인이 실행 종료를 알립니다
pub const RUNNER_FINISHED_MARKER: &str = "Finished";

// --- 인바운드 명령 상수 ---

/// 외부 테스트 실행 명령 (`{"command": "run_tests", "args": [...]}`)
pub const COMMAND_RUN_TESTS: &str = "run_tests";

/// 이벤트 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// 외부 프로세스 출력 라인 (프로세스 생명주기)
    Runner,
    /// 계측된 액션 또는 생명주기 마커 (기본값 — 레거시 스텝 이벤트는
    /// 와이어에 `type` 필드가 없음)
    #[default]
    Step,
}

/// 파이프라인을 흐르는 불변 이벤트 레코드
///
/// 식별자(`test_name`)는 전역 상태가 아니라 이벤트와 함께 이동합니다.
/// 동시 실행 워커 간 공유 가변 상태를 제거하기 위한 설계입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 이벤트 종류 (와이어 필드명 `type`)
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    /// 테스트 식별자 — `Group#case`, `test_*` 토큰, 또는 그룹 토큰
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    /// 액션 이름 — 순수 러너 라인이면 빈 문자열
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step_name: String,
    /// 액션 인자 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// 스텝 상태 (없으면 pending)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    /// 실패 메시지
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 스크린샷 저장 경로
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// 인라인 이미지 (data URL) — 렌더링 시 저장 경로보다 우선
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// 러너 출력 라인
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// 발생 시각 (unix epoch 초)
    #[serde(default)]
    pub ts: u64,
}

impl Event {
    /// 스텝 이벤트를 생성합니다.
    pub fn step(
        step_name: impl Into<String>,
        detail: Option<String>,
        test_name: Option<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            kind: EventKind::Step,
            test_name,
            step_name: step_name.into(),
            detail,
            status: Some(status),
            error: None,
            screenshot: None,
            data_url: None,
            line: None,
            ts: unix_timestamp(),
        }
    }

    /// 러너 출력 라인 이벤트를 생성합니다.
    pub fn runner(line: impl Into<String>, status: StepStatus) -> Self {
        Self {
            kind: EventKind::Runner,
            test_name: None,
            step_name: String::new(),
            detail: None,
            status: Some(status),
            error: None,
            screenshot: None,
            data_url: None,
            line: Some(line.into()),
            ts: unix_timestamp(),
        }
    }

    /// `test_start` 생명주기 이벤트를 생성합니다.
    pub fn test_start(test_name: impl Into<String>) -> Self {
        let name = test_name.into();
        Self::step(
            STEP_TEST_START,
            Some(format!("Starting test: {name}")),
            Some(name),
            StepStatus::Running,
        )
    }

    /// `test_finish` 생명주기 이벤트를 생성합니다.
    pub fn test_finish(test_name: impl Into<String>, status: StepStatus) -> Self {
        let name = test_name.into();
        Self::step(
            STEP_TEST_FINISH,
            Some(format!("Test {status}: {name}")),
            Some(name),
            status,
        )
    }

    /// 실패 메시지를 설정합니다.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// 스크린샷 경로를 설정합니다.
    pub fn with_screenshot(mut self, path: impl Into<String>) -> Self {
        self.screenshot = Some(path.into());
        self
    }

    /// 인라인 이미지를 설정합니다.
    pub fn with_data_url(mut self, data_url: impl Into<String>) -> Self {
        self.data_url = Some(data_url.into());
        self
    }

    /// 발생 시각을 지정합니다 (테스트 및 재생용).
    pub fn with_ts(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }

    /// 러너 이벤트인지 확인합니다.
    pub fn is_runner(&self) -> bool {
        self.kind == EventKind::Runner
    }

    /// 러너 라인이 완료 마커를 포함하는지 확인합니다.
    pub fn is_finished_marker(&self) -> bool {
        self.is_runner()
            && self
                .line
                .as_deref()
                .is_some_and(|l| l.contains(RUNNER_FINISHED_MARKER))
    }

    /// 이벤트를 한 줄 JSON으로 직렬화합니다.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// JSON 한 줄에서 이벤트를 복원합니다.
    ///
    /// 알 수 없는 추가 필드는 무시합니다.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Runner => {
                write!(f, "Runner[{}] {}", self.ts, self.line.as_deref().unwrap_or(""))
            }
            EventKind::Step => write!(
                f,
                "Step[{}] {} test={} status={}",
                self.ts,
                self.step_name,
                self.test_name.as_deref().unwrap_or("-"),
                self.status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "pending".to_owned()),
            ),
        }
    }
}
