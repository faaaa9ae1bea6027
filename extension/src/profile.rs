//! # Profile Helpers
//!
//! Cleanup of scraped LinkedIn display names and profile URLs. Shared by the
//! content script and the API server so both sides agree on what a stored
//! name and a stored URL look like.

use std::sync::LazyLock;

use regex::Regex;

/// `(3) `, `[12] `, `{1} ` at the start of the string.
static LEADING_BRACKET_COUNTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[(\[{]\s*\d+\+?\s*[)\]}]\s*").expect("leading bracket pattern")
});

/// `12 `, `12· `, `3 - ` at the start of the string. A number glued to
/// letters (`3M`) is left alone.
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\+?\s*(?:[·•|:.\-]\s*|\s+)").expect("leading number pattern")
});

/// ` (1)` at the end of the string.
static TRAILING_BRACKET_COUNTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[(\[{]\s*\d+\+?\s*[)\]}]\s*$").expect("trailing bracket pattern")
});

/// `(1)` anywhere else in the string.
static INLINE_BRACKET_COUNTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[(\[{]\s*\d+\+?\s*[)\]}]").expect("inline bracket pattern")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Removes notification-count ornaments from a scraped display name.
///
/// LinkedIn prefixes the page title and sometimes the heading with unread
/// counters (`(3) John Doe`, `12· John Doe`). The passes run in a fixed
/// order: bracket counters are removed before bare leading numbers so that
/// `(3) 2Pac` keeps its digits. The pipeline is repeated until the output
/// stops changing, which makes the function idempotent.
///
/// Empty input is returned unchanged.
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut current = raw.to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return next;
        }
        // Every pass that changes the text either rewrites a non-breaking
        // space or shortens the string, so this terminates.
        current = next;
    }
}

/// Optional-input variant: `None` stays `None`, everything else goes through
/// [`sanitize`].
pub fn sanitize_profile_name(raw: Option<&str>) -> Option<String> {
    raw.map(sanitize)
}

fn sanitize_pass(input: &str) -> String {
    let text = input.replace('\u{00A0}', " ");
    let text = LEADING_BRACKET_COUNTER.replace(&text, "");
    let text = LEADING_NUMBER.replace(&text, "");
    let text = TRAILING_BRACKET_COUNTER.replace(&text, "");
    let text = INLINE_BRACKET_COUNTER.replace_all(&text, " ");
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

/// Canonical form of a profile URL: no query string, no fragment, no
/// trailing slash.
pub fn normalize_profile_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_query = trimmed.split('?').next().unwrap_or_default();
    let without_fragment = without_query.split('#').next().unwrap_or_default();
    without_fragment.trim_end_matches('/').to_string()
}

/// Best-effort name extraction from `document.title`, e.g.
/// `"(3) John Doe | LinkedIn"`.
pub fn name_from_title(title: &str) -> Option<String> {
    let head = title.split(" | ").next().unwrap_or_default();
    let head = head.strip_suffix(" - LinkedIn").unwrap_or(head);
    let name = sanitize(head);

    if name.is_empty() || name.eq_ignore_ascii_case("linkedin") {
        None
    } else {
        Some(name)
    }
}
