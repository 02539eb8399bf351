// Output Classifier
// Best-effort failure detection over raw agent transcript text.

use std::sync::OnceLock;

use regex::Regex;

use drover_types::TaskErrorKind;

/// A failure pattern recognized in process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: TaskErrorKind,
    pub message: String,
}

struct Rule {
    kind: TaskErrorKind,
    label: &'static str,
    matches: fn(&str) -> Option<String>,
}

// Ordered by priority: an authentication failure that also trips capacity
// vocabulary must classify as auth_expired.
const RULES: &[Rule] = &[
    Rule {
        kind: TaskErrorKind::AuthExpired,
        label: "authentication failure",
        matches: match_auth,
    },
    Rule {
        kind: TaskErrorKind::CapacityReached,
        label: "capacity exhaustion",
        matches: match_capacity,
    },
];

const AUTH_NEEDLES: &[&str] = &[
    "session expired",
    "session has expired",
    "authentication failed",
    "authentication error",
    "not authenticated",
    "unauthorized",
    "login required",
    "please log in",
    "please run /login",
    "invalid api key",
    "token expired",
    "credentials have expired",
    "401",
];

const CAPACITY_NEEDLES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "too many requests",
    "quota exceeded",
    "insufficient_quota",
    "out of credits",
    "capacity",
    "overloaded",
    "throttl",
    "429",
];

fn match_auth(lowered: &str) -> Option<String> {
    AUTH_NEEDLES
        .iter()
        .find(|needle| lowered.contains(**needle))
        .map(|needle| (*needle).to_string())
}

fn match_capacity(lowered: &str) -> Option<String> {
    if let Some(needle) = CAPACITY_NEEDLES
        .iter()
        .find(|needle| lowered.contains(**needle))
    {
        return Some((*needle).to_string());
    }
    capacity_status_re()
        .find(lowered)
        .map(|m| m.as_str().to_string())
}

fn capacity_status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(503|529)\b").expect("valid status code regex"))
}

/// Classify accumulated process output. Pure and order-stable: rules are
/// evaluated by priority and the first match wins; no match returns `None`.
///
/// This is a heuristic over unstructured text. False negatives fall through
/// to exit-code handling; false positives are an accepted trade-off in favor
/// of fast operator notification.
pub fn classify_output(output: &str) -> Option<ClassifiedError> {
    let lowered = output.to_lowercase();
    for rule in RULES {
        if let Some(fragment) = (rule.matches)(&lowered) {
            return Some(ClassifiedError {
                kind: rule.kind,
                message: format!("{} reported in agent output (matched {:?})", rule.label, fragment),
            });
        }
    }
    None
}
