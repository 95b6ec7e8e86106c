//! Label-selector matching
//!
//! Equality-only matching, the rule services use to pick their backing pods:
//! a selector matches iff every selector key is present on the target's
//! labels with an equal value. A service with no selector (or an empty one)
//! manages no endpoints, so it matches no pods here either.

use std::collections::BTreeMap;

/// Whether `selector` matches `labels`.
///
/// Both sides may be absent on a freshly-created or malformed resource;
/// absence never panics, it simply fails to match.
pub fn matches(
    selector: Option<&BTreeMap<String, String>>,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(labels) = labels else {
        return false;
    };
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
