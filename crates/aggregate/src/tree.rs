//! 파생 트리 재계산 -- 이벤트 로그의 순수 함수
//!
//! [`Aggregator`]는 누적 이벤트 로그를 보관하고, 새 이벤트마다
//! 그룹 → 케이스 → 스텝 트리 전체를 처음부터 다시 계산합니다.
//! 증분 패치가 아닌 전체 재계산이며, 업데이트당 비용 O(전체 이벤트 수)는
//! 목표 규모(런당 수백~수천 이벤트)에서 수용된 트레이드오프입니다.
//!
//! # 스캔 순서와 중복 제거
//! 로그는 최신 우선(newest-first) 도착 순서로 스캔됩니다 — 관찰자
//! UI의 메시지 목록과 같은 방향입니다. 케이스 내에서
//! `(step_name, detail)` 키가 반복되면 스캔 순서상 첫 번째(즉 가장
//! 최근) 발생만 유지되고, 유지된 스텝들은 뒤집혀 시간순으로
//! 표시됩니다. 이 방향은 반복 스텝에서 어떤 스크린샷/에러가
//! 보이는지를 결정하므로 그대로 보존해야 합니다.
//!
//! 에러 조건은 없습니다 — 불완전한 이벤트는 센티널 그룹/케이스로
//! 퇴행하며 파이프라인을 실패시키지 않습니다.

use metrics::counter;

use testdeck_core::event::{Event, STEP_TEST_RESULT};
use testdeck_core::metrics as metric;
use testdeck_core::types::{
    RollupStatus, RunRecord, StepRecord, StepStatus, TestCase, TestGroup, TestTree,
};

use crate::classify::classify;

/// 이벤트 로그를 누적하고 트리를 재계산하는 집계기
///
/// 단일 스레드/협력형으로 동작합니다: 이벤트 하나를 받아 동기
/// 재계산 한 번을 마친 뒤 다음 이벤트를 처리하며, 파생 트리에 대한
/// 동시 변경은 없습니다.
#[derive(Default)]
pub struct Aggregator {
    /// 도착 순서대로 누적된 이벤트 (오래된 것이 앞)
    log: Vec<Event>,
}

impl Aggregator {
    /// 빈 집계기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트를 로그에 추가합니다.
    pub fn push(&mut self, event: Event) {
        self.log.push(event);
    }

    /// 누적된 이벤트 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// 로그가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// 새 런을 위해 로그를 비웁니다.
    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// 현재 로그에서 트리를 재계산합니다.
    ///
    /// 같은 로그에 대해 항상 동일한 트리를 반환합니다 (멱등).
    pub fn tree(&self) -> TestTree {
        counter!(metric::AGGREGATE_REBUILDS_TOTAL).increment(1);
        tracing::trace!(events = self.log.len(), "rebuilding test tree");
        build_tree_newest_first(self.log.iter().rev())
    }

    /// 런 완료 시점의 트리를 카운터와 함께 스냅샷합니다.
    ///
    /// 결과는 영속화 협력자([`RunStore`](testdeck_core::pipeline::RunStore))에
    /// 전달되는 형태입니다.
    pub fn finish_run(&self) -> RunRecord {
        RunRecord::from_tree(self.tree())
    }
}

/// 최신 우선 슬라이스에서 트리를 구성합니다.
///
/// 입력은 가장 최근 이벤트가 앞에 오는 순서여야 합니다
/// (관찰자 메시지 목록의 방향).
pub fn build_tree(events_newest_first: &[Event]) -> TestTree {
    build_tree_newest_first(events_newest_first.iter())
}

fn build_tree_newest_first<'a>(events: impl Iterator<Item = &'a Event>) -> TestTree {
    // (그룹명, [(케이스명, [이벤트])]) — 최초 관측 순서 유지
    let mut groups: Vec<(String, Vec<(String, Vec<&'a Event>)>)> = Vec::new();

    for event in events {
        // 러너 출력은 트리에서 제외
        if event.is_runner() {
            continue;
        }

        let classification = classify(event.test_name.as_deref());

        let group_idx = match groups.iter().position(|(name, _)| *name == classification.group) {
            Some(idx) => idx,
            None => {
                groups.push((classification.group.clone(), Vec::new()));
                groups.len() - 1
            }
        };
        let cases = &mut groups[group_idx].1;

        let case_idx = match cases.iter().position(|(name, _)| *name == classification.case) {
            Some(idx) => idx,
            None => {
                cases.push((classification.case.clone(), Vec::new()));
                cases.len() - 1
            }
        };

        cases[case_idx].1.push(event);
    }

    let groups = groups
        .into_iter()
        .map(|(group_name, cases)| {
            let cases: Vec<TestCase> = cases
                .into_iter()
                .map(|(case_name, events)| build_case(case_name, &events))
                .collect();
            let status = group_rollup(&cases);
            TestGroup {
                name: group_name,
                status,
                cases,
            }
        })
        .collect();

    TestTree { groups }
}

/// 케이스 하나를 중복 제거 + 시간순 정렬 + 롤업으로 구성합니다.
fn build_case(name: String, events_newest_first: &[&Event]) -> TestCase {
    // 스캔 순서상 첫 번째(가장 최근) 발생만 유지
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut retained: Vec<StepRecord> = Vec::new();

    for event in events_newest_first {
        let key = (
            event.step_name.clone(),
            event.detail.clone().unwrap_or_default(),
        );
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        retained.push(StepRecord {
            step_name: event.step_name.clone(),
            detail: event.detail.clone(),
            status: event.status,
            error: event.error.clone(),
            screenshot: event.screenshot.clone(),
            data_url: event.data_url.clone(),
            ts: event.ts,
        });
    }

    // 뒤집어서 시간순 표시 (오래된 스텝이 앞)
    retained.reverse();

    let status = case_rollup(&retained);
    TestCase {
        name,
        status,
        steps: retained,
    }
}

/// 케이스 롤업: failed > passed > running.
fn case_rollup(steps: &[StepRecord]) -> RollupStatus {
    if steps.iter().any(|s| s.status == Some(StepStatus::Failed)) {
        RollupStatus::Failed
    } else if steps.iter().any(|s| s.status == Some(StepStatus::Passed)) {
        RollupStatus::Passed
    } else {
        RollupStatus::Running
    }
}

/// 그룹 롤업: `test_result` 스텝이 있으면 그 상태가 우선,
/// 없으면 전체 스텝에 대해 failed > passed > running.
fn group_rollup(cases: &[TestCase]) -> RollupStatus {
    for case in cases {
        if let Some(result_step) = case.steps.iter().find(|s| s.step_name == STEP_TEST_RESULT) {
            return result_step
                .status
                .map(RollupStatus::from_step)
                .unwrap_or_default();
        }
    }

    let all_steps = cases.iter().flat_map(|c| c.steps.iter());
    let mut any_passed = false;
    for step in all_steps {
        match step.status {
            Some(StepStatus::Failed) => return RollupStatus::Failed,
            Some(StepStatus::Passed) => any_passed = true,
            _ => {}
        }
    }
    if any_passed {
        RollupStatus::Passed
    } else {
        RollupStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_core::event::EventKind;

    fn step(name: &str, detail: &str, test: &str, status: StepStatus, ts: u64) -> Event {
        Event::step(
            name,
            Some(detail.to_owned()),
            Some(test.to_owned()),
            status,
        )
        .with_ts(ts)
    }

    #[test]
    fn dedup_keeps_most_recent_then_reverses() {
        // 최신 우선 도착: A(click,x,ts=3), B(click,x,ts=2), C(visit,/,ts=1)
        let events = vec![
            step("click", "x", "G#case", StepStatus::Passed, 3),
            step("click", "x", "G#case", StepStatus::Running, 2),
            step("visit", "/", "G#case", StepStatus::Passed, 1),
        ];

        let tree = build_tree(&events);
        let case = &tree.groups[0].cases[0];

        // 중복 제거는 도착 순서상 첫 번째(A)를 유지, 뒤집으면 [C, A]
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[0].step_name, "visit");
        assert_eq!(case.steps[0].ts, 1);
        assert_eq!(case.steps[1].step_name, "click");
        assert_eq!(case.steps[1].ts, 3);
        // 유지된 click은 가장 최근 발생 (passed, ts=3)
        assert_eq!(case.steps[1].status, Some(StepStatus::Passed));
    }

    #[test]
    fn dedup_key_includes_detail() {
        let events = vec![
            step("click", "save", "G#case", StepStatus::Passed, 2),
            step("click", "cancel", "G#case", StepStatus::Passed, 1),
        ];
        let tree = build_tree(&events);
        // detail이 다르면 별개 스텝
        assert_eq!(tree.groups[0].cases[0].steps.len(), 2);
    }

    #[test]
    fn runner_events_are_excluded() {
        let events = vec![
            Event::runner("Run options: --seed 1", StepStatus::Running),
            step("visit", "/", "G#case", StepStatus::Passed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups.len(), 1);
        assert_eq!(tree.groups[0].cases[0].steps.len(), 1);
    }

    #[test]
    fn case_rollup_failed_beats_passed() {
        // [passed, failed, passed] → failed
        let events = vec![
            step("a", "1", "G#case", StepStatus::Passed, 3),
            step("b", "2", "G#case", StepStatus::Failed, 2),
            step("c", "3", "G#case", StepStatus::Passed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].cases[0].status, RollupStatus::Failed);
    }

    #[test]
    fn case_rollup_passed_when_no_failure() {
        let events = vec![
            step("a", "1", "G#case", StepStatus::Passed, 2),
            step("b", "2", "G#case", StepStatus::Running, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].cases[0].status, RollupStatus::Passed);
    }

    #[test]
    fn case_rollup_running_without_terminal_steps() {
        let events = vec![step("a", "1", "G#case", StepStatus::Running, 1)];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].cases[0].status, RollupStatus::Running);
    }

    #[test]
    fn group_rollup_passed_with_two_passing_cases() {
        // 두 케이스 [passed, passed], test_result 없음 → 그룹 passed
        let events = vec![
            step("a", "1", "G#case_one", StepStatus::Passed, 2),
            step("b", "2", "G#case_two", StepStatus::Passed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].status, RollupStatus::Passed);
        assert_eq!(tree.groups[0].cases.len(), 2);
    }

    #[test]
    fn group_rollup_test_result_step_wins() {
        // 스텝들은 실패지만 test_result가 passed라면 그룹은 passed
        let events = vec![
            step(STEP_TEST_RESULT, "", "G#case_one", StepStatus::Passed, 3),
            step("b", "2", "G#case_one", StepStatus::Failed, 2),
            step("c", "3", "G#case_two", StepStatus::Failed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].status, RollupStatus::Passed);
    }

    #[test]
    fn group_rollup_failed_without_test_result() {
        let events = vec![
            step("a", "1", "G#case_one", StepStatus::Passed, 2),
            step("b", "2", "G#case_two", StepStatus::Failed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].status, RollupStatus::Failed);
    }

    #[test]
    fn groups_preserve_first_seen_order() {
        // 최신 우선 스캔이므로 가장 최근에 활동한 그룹이 앞에 옴
        let events = vec![
            step("a", "1", "Recent#case", StepStatus::Passed, 3),
            step("b", "2", "Older#case", StepStatus::Passed, 2),
            step("c", "3", "Recent#case", StepStatus::Passed, 1),
        ];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].name, "Recent");
        assert_eq!(tree.groups[1].name, "Older");
    }

    #[test]
    fn events_without_identifier_land_in_sentinel() {
        let mut event = step("visit", "/", "ignored", StepStatus::Running, 1);
        event.test_name = None;
        let tree = build_tree(&[event]);
        assert_eq!(tree.groups[0].name, "UnknownTest");
        assert_eq!(tree.groups[0].cases[0].name, "unknown_method");
    }

    #[test]
    fn prefix_identifiers_are_classified() {
        let events = vec![step(
            "visit",
            "/login",
            "test_user_can_login",
            StepStatus::Passed,
            1,
        )];
        let tree = build_tree(&events);
        assert_eq!(tree.groups[0].name, "AuthenticationTest");
        assert_eq!(tree.groups[0].cases[0].name, "test_user_can_login");
    }

    #[test]
    fn recomputation_is_idempotent() {
        let mut aggregator = Aggregator::new();
        for n in 0..20 {
            aggregator.push(step(
                "visit",
                &format!("/page/{}", n % 4),
                &format!("G#case_{}", n % 3),
                if n % 5 == 0 { StepStatus::Failed } else { StepStatus::Passed },
                n,
            ));
        }

        let first = serde_json::to_string(&aggregator.tree()).unwrap();
        let second = serde_json::to_string(&aggregator.tree()).unwrap();
        // 같은 로그에서 바이트 단위로 동일한 트리
        assert_eq!(first, second);
    }

    #[test]
    fn aggregator_push_scans_newest_first() {
        let mut aggregator = Aggregator::new();
        // 시간순으로 도착 (오래된 것 먼저 push)
        aggregator.push(step("visit", "/", "G#case", StepStatus::Passed, 1));
        aggregator.push(step("click", "x", "G#case", StepStatus::Running, 2));
        aggregator.push(step("click", "x", "G#case", StepStatus::Passed, 3));

        let tree = aggregator.tree();
        let case = &tree.groups[0].cases[0];
        // 중복 click은 가장 최근(ts=3) 발생이 유지됨
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[1].ts, 3);
        assert_eq!(case.steps[1].status, Some(StepStatus::Passed));
    }

    #[test]
    fn aggregator_clear_resets_log() {
        let mut aggregator = Aggregator::new();
        aggregator.push(step("a", "1", "G#case", StepStatus::Passed, 1));
        assert!(!aggregator.is_empty());

        aggregator.clear();
        assert!(aggregator.is_empty());
        assert!(aggregator.tree().is_empty());
    }

    #[test]
    fn finish_run_counts_cases() {
        let mut aggregator = Aggregator::new();
        aggregator.push(step("a", "1", "G#good", StepStatus::Passed, 1));
        aggregator.push(step("b", "2", "G#bad", StepStatus::Failed, 2));
        aggregator.push(step("c", "3", "G#pending", StepStatus::Running, 3));

        let record = aggregator.finish_run();
        assert_eq!(record.total_cases, 3);
        assert_eq!(record.passed_cases, 1);
        assert_eq!(record.failed_cases, 1);
    }

    #[test]
    fn empty_log_builds_empty_tree() {
        assert!(build_tree(&[]).is_empty());
    }

    #[test]
    fn malformed_partial_event_degrades_gracefully() {
        // 수동으로 만든 불완전한 이벤트 (상태 없음, 식별자 없음)
        let event = Event {
            kind: EventKind::Step,
            test_name: None,
            step_name: "mystery".to_owned(),
            detail: None,
            status: None,
            error: None,
            screenshot: None,
            data_url: None,
            line: None,
            ts: 0,
        };
        let tree = build_tree(&[event]);
        assert_eq!(tree.groups[0].name, "UnknownTest");
        assert_eq!(tree.groups[0].cases[0].status, RollupStatus::Running);
    }
}
