// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Otto Contributors

//! Unified diff rendering for mutation previews and audit trails

use similar::TextDiff;

/// Render a unified diff between two texts with the given header labels.
/// Returns `None` when the texts are identical.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> Option<String> {
    if old == new {
        return None;
    }

    let diff = TextDiff::from_lines(old, new);
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string();
    Some(rendered)
}
