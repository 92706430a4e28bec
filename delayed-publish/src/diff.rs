//! Unified diff for `schedule --dry-run`.

use similar::TextDiff;

/// Diff `old` against `new` as `a/<path>` / `b/<path>`.
///
/// Returns `None` when the two are equal once line endings are normalised.
pub fn unified_diff(path: &str, old: &str, new: &str) -> Option<String> {
    let old = normalize_line_endings(old);
    let new = normalize_line_endings(new);
    if old == new {
        return None;
    }

    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    Some(
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string(),
    )
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
