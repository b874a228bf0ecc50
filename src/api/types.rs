//! TestRail request and response shapes.
//!
//! Only the fields the reporter reads are modeled; serde ignores the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// One result for one case, as sent to `add_results_for_cases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: u64,
    pub status_id: Status,
    pub comment: String,
}

impl CaseResult {
    pub fn new(case_id: u64, status: Status, comment: impl Into<String>) -> Self {
        Self {
            case_id,
            status_id: status,
            comment: comment.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlan {
    pub id: u64,
    #[serde(default)]
    pub entries: Vec<RemotePlanEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlanEntry {
    #[serde(default)]
    pub runs: Vec<RemoteRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRun {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTest {
    pub id: u64,
    pub case_id: Option<u64>,
}

/// `get_tests` response. TestRail 6.7 and later paginate; older versions
/// return a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TestsPage {
    Paged {
        tests: Vec<RemoteTest>,
        #[serde(default, rename = "_links")]
        links: PageLinks,
    },
    Bare(Vec<RemoteTest>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PageLinks {
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewPlan<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    pub entries: Vec<NewPlanEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewPlanEntry<'a> {
    pub suite_id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignedto_id: Option<u64>,
    pub include_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_ids: Option<&'a [u64]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<NewPlanRun<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewPlanRun<'a> {
    pub include_all: bool,
    pub case_ids: &'a [u64],
}

#[derive(Debug, Serialize)]
pub(crate) struct NewRun<'a> {
    pub suite_id: u64,
    pub name: &'a str,
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignedto_id: Option<u64>,
    pub include_all: bool,
    pub case_ids: &'a [u64],
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultsForCases<'a> {
    pub results: &'a [CaseResult],
}

#[derive(Debug, Serialize)]
pub(crate) struct NewResult<'a> {
    pub status_id: Status,
    pub comment: &'a str,
}

/// Run ids of a plan, as cached under `runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PlanRuns {
    pub plan_id: u64,
    pub run_ids: Vec<u64>,
}

/// Run of a plan entry, as cached under `runId` in plan entry mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PlanEntryRun {
    pub plan_id: u64,
    pub run_id: u64,
}

/// Case id to test ids of a plan, as cached under `tests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PlanTests {
    pub plan_id: u64,
    pub tests: BTreeMap<u64, Vec<u64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_result_wire_format() {
        let result = CaseResult::new(200, Status::Failed, "boom");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"case_id": 200, "status_id": 5, "comment": "boom"})
        );
    }

    #[test]
    fn test_tests_page_shapes() {
        let bare: TestsPage =
            serde_json::from_value(json!([{"id": 1, "case_id": 10, "title": "t"}])).unwrap();
        assert!(matches!(bare, TestsPage::Bare(ref t) if t.len() == 1));

        let paged: TestsPage = serde_json::from_value(json!({
            "offset": 0,
            "limit": 250,
            "size": 1,
            "_links": {"next": "/api/v2/get_tests/5&limit=250&offset=250", "prev": null},
            "tests": [{"id": 2, "case_id": 20}]
        }))
        .unwrap();
        match paged {
            TestsPage::Paged { tests, links } => {
                assert_eq!(tests[0].case_id, Some(20));
                assert!(links.next.is_some());
            }
            TestsPage::Bare(_) => panic!("expected paged response"),
        }
    }

    #[test]
    fn test_plan_tests_cache_shape() {
        let cached = PlanTests {
            plan_id: 17,
            tests: BTreeMap::from([(1234, vec![9001])]),
        };
        let value = serde_json::to_value(&cached).unwrap();
        assert_eq!(value, json!({"plan_id": 17, "tests": {"1234": [9001]}}));

        let back: PlanTests = serde_json::from_value(value).unwrap();
        assert_eq!(back, cached);
    }
}
