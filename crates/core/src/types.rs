//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 스트림 레이어와 집계 레이어가 공유하는 데이터 구조를 정의합니다.
//! 파생 트리(그룹 → 케이스 → 스텝)는 집계 레이어만 생성하며,
//! 여기서는 그 형태만 정의합니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 스텝 실행 상태
///
/// 계측된 액션 하나의 상태입니다. 이벤트에 상태가 없으면
/// (`Option::None`) 하위 레이어에서 pending으로 취급합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// 실행 중
    Running,
    /// 성공
    Passed,
    /// 실패
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Running => "running",
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// 롤업 상태
///
/// 케이스 또는 그룹의 구성 스텝에서 파생되는 집계 상태입니다.
/// `failed > passed > running` 우선순위로 롤업됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupStatus {
    /// 아직 통과/실패 스텝이 없음
    #[default]
    Running,
    /// 실패 스텝 없이 통과 스텝 존재
    Passed,
    /// 실패 스텝 존재
    Failed,
}

impl RollupStatus {
    /// 스텝 상태를 롤업 상태로 변환합니다.
    pub fn from_step(status: StepStatus) -> Self {
        match status {
            StepStatus::Running => RollupStatus::Running,
            StepStatus::Passed => RollupStatus::Passed,
            StepStatus::Failed => RollupStatus::Failed,
        }
    }

    /// 실패 상태인지 확인합니다.
    pub fn is_failed(&self) -> bool {
        matches!(self, RollupStatus::Failed)
    }
}

impl fmt::Display for RollupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RollupStatus::Running => "running",
            RollupStatus::Passed => "passed",
            RollupStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// 스텝 레코드 — 케이스 내에서 중복 제거된 단일 스텝
///
/// 동일한 `(step_name, detail)` 키를 가진 이벤트들 중 하나만 유지됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// 액션 이름 (visit, click_button, test_start 등)
    pub step_name: String,
    /// 액션 인자 설명
    pub detail: Option<String>,
    /// 스텝 상태 (없으면 pending)
    pub status: Option<StepStatus>,
    /// 실패 메시지
    pub error: Option<String>,
    /// 스크린샷 저장 경로
    pub screenshot: Option<String>,
    /// 인라인 이미지 (data URL)
    pub data_url: Option<String>,
    /// 발생 시각 (unix epoch 초)
    pub ts: u64,
}

impl StepRecord {
    /// 렌더링에 사용할 이미지 참조를 반환합니다.
    ///
    /// 인라인 이미지(`data_url`)가 저장 경로보다 우선합니다.
    pub fn display_image(&self) -> Option<&str> {
        self.data_url
            .as_deref()
            .or(self.screenshot.as_deref())
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "pending".to_owned());
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail}) [{status}]", self.step_name),
            None => write!(f, "{} [{status}]", self.step_name),
        }
    }
}

/// 테스트 케이스 — 순서 있는 중복 제거 스텝 시퀀스와 롤업 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// 케이스 이름 (예: `test_user_can_login`)
    pub name: String,
    /// 롤업 상태
    pub status: RollupStatus,
    /// 시간순으로 정렬된 스텝 레코드
    pub steps: Vec<StepRecord>,
}

/// 테스트 그룹 — 분류기가 부여한 이름과 소속 케이스 목록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGroup {
    /// 그룹 이름 (예: `LoginTest`)
    pub name: String,
    /// 롤업 상태
    pub status: RollupStatus,
    /// 최초 관측 순서를 유지하는 케이스 목록
    pub cases: Vec<TestCase>,
}

impl TestGroup {
    /// 그룹에 속한 전체 스텝 수를 반환합니다.
    pub fn step_count(&self) -> usize {
        self.cases.iter().map(|c| c.steps.len()).sum()
    }
}

/// 파생 트리 — 이벤트 로그의 순수 함수로 재계산되는 3단 구조
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestTree {
    /// 최초 관측 순서를 유지하는 그룹 목록
    pub groups: Vec<TestGroup>,
}

impl TestTree {
    /// 트리가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 전체 케이스 수를 반환합니다.
    pub fn case_count(&self) -> usize {
        self.groups.iter().map(|g| g.cases.len()).sum()
    }

    /// 이름으로 그룹을 찾습니다.
    pub fn group(&self, name: &str) -> Option<&TestGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// 완료된 런 레코드 — 영속화 협력자에 전달되는 형태
///
/// 런 하나가 끝나면 집계 레이어가 트리와 카운터를 스냅샷하여 생성합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// 런 ID (`<epoch>_<hex>` 형식)
    pub id: String,
    /// 생성 시각 (unix epoch 초)
    pub created_at: u64,
    /// 전체 케이스 수
    pub total_cases: u32,
    /// 통과 케이스 수
    pub passed_cases: u32,
    /// 실패 케이스 수
    pub failed_cases: u32,
    /// 완료 시점의 파생 트리
    pub tree: TestTree,
}

impl RunRecord {
    /// 트리 스냅샷에서 런 레코드를 생성합니다.
    pub fn from_tree(tree: TestTree) -> Self {
        let mut total = 0u32;
        let mut passed = 0u32;
        let mut failed = 0u32;
        for group in &tree.groups {
            for case in &group.cases {
                total += 1;
                match case.status {
                    RollupStatus::Passed => passed += 1,
                    RollupStatus::Failed => failed += 1,
                    RollupStatus::Running => {}
                }
            }
        }
        Self {
            id: generate_run_id(),
            created_at: unix_timestamp(),
            total_cases: total,
            passed_cases: passed,
            failed_cases: failed,
            tree,
        }
    }
}

/// 현재 시각을 unix epoch 초로 반환합니다.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `<epoch>_<hex8>` 형식의 런 ID를 생성합니다.
fn generate_run_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", unix_timestamp(), &hex[..8])
}
