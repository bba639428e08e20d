//! Answer scoring: compares the submitted answer against the expected one
//! under an explicit match policy and emits a binary reward with a
//! human-readable explanation.

use serde::Serialize;

/// How submitted and expected answers are compared (after trimming and
/// case-folding both). Two policies exist across deployments of this
/// environment; neither is silently preferred — the active one comes from
/// `TASKRIG_MATCH_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Normalized strings must be equal.
    Exact,
    /// Normalized expected answer appears anywhere in the normalized
    /// submitted answer.
    Contains,
}

impl MatchPolicy {
    pub fn from_env() -> Self {
        match std::env::var("TASKRIG_MATCH_POLICY")
            .ok()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "contains" | "substring" => Self::Contains,
            _ => Self::Exact,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub reward: f64,
    pub content: String,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Score an episode. No submitted answer always scores 0.0; otherwise the
/// reward is 1.0 on a policy match and 0.0 otherwise. The explanation always
/// carries the raw submitted/expected text and the episode's operation counts.
pub fn evaluate(
    submitted: Option<&str>,
    expected: &str,
    policy: MatchPolicy,
    search_count: u64,
    fetch_count: u64,
) -> EvaluationOutcome {
    let Some(submitted) = submitted else {
        return EvaluationOutcome {
            reward: 0.0,
            content: format!(
                "No answer submitted. Searches: {search_count}, Fetches: {fetch_count}"
            ),
        };
    };

    let submitted_clean = normalize(submitted);
    let expected_clean = normalize(expected);
    let is_correct = match policy {
        MatchPolicy::Exact => submitted_clean == expected_clean,
        MatchPolicy::Contains => submitted_clean.contains(&expected_clean),
    };

    let verdict = if is_correct { "Correct!" } else { "Incorrect." };
    let total = search_count + fetch_count;
    EvaluationOutcome {
        reward: if is_correct { 1.0 } else { 0.0 },
        content: format!(
            "{verdict} Submitted: '{submitted}', Expected: '{expected}'. \
             Stats: {search_count} searches, {fetch_count} fetches, {total} total operations."
        ),
    }
}
