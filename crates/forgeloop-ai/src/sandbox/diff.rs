//! Text rendering for `fs_diff`: unified line diffs and tree snapshots.

/// Above this many line-pair comparisons the diff degrades to a full
/// remove/add listing instead of computing an LCS table.
const MAX_LCS_CELLS: usize = 4_000_000;
const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

fn line_ops(old: &[&str], new: &[&str]) -> Vec<Op> {
    let (n, m) = (old.len(), new.len());
    if n.saturating_mul(m) > MAX_LCS_CELLS {
        let mut ops: Vec<Op> = (0..n).map(Op::Delete).collect();
        ops.extend((0..m).map(Op::Insert));
        return ops;
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if old[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal(i, j));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

/// Render a unified diff of `old` against `new`. Returns an empty string when
/// the texts are identical.
pub(crate) fn unified_diff(label: &str, old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = line_ops(&old_lines, &new_lines);

    let changed: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Equal(..)))
        .map(|(idx, _)| idx)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    // Group changes whose context windows touch into one hunk.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for idx in changed {
        let start = idx.saturating_sub(CONTEXT_LINES);
        let end = (idx + CONTEXT_LINES + 1).min(ops.len());
        match ranges.last_mut() {
            Some((_, last_end)) if start <= *last_end => *last_end = end,
            _ => ranges.push((start, end)),
        }
    }

    let mut out = format!("--- a/{label}\n+++ b/{label}\n");
    for (start, end) in ranges {
        let hunk = &ops[start..end];
        let old_start = first_old_line(&ops, start);
        let new_start = first_new_line(&ops, start);
        let old_count = hunk.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
        let new_count = hunk.iter().filter(|op| !matches!(op, Op::Delete(_))).count();
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk_start(old_start, old_count),
            old_count,
            hunk_start(new_start, new_count),
            new_count
        ));
        for op in hunk {
            match *op {
                Op::Equal(i, _) => out.push_str(&format!(" {}\n", old_lines[i])),
                Op::Delete(i) => out.push_str(&format!("-{}\n", old_lines[i])),
                Op::Insert(j) => out.push_str(&format!("+{}\n", new_lines[j])),
            }
        }
    }
    out
}

fn hunk_start(zero_based: usize, count: usize) -> usize {
    if count == 0 { zero_based } else { zero_based + 1 }
}

fn first_old_line(ops: &[Op], upto: usize) -> usize {
    ops[..upto]
        .iter()
        .filter(|op| !matches!(op, Op::Insert(_)))
        .count()
}

fn first_new_line(ops: &[Op], upto: usize) -> usize {
    ops[..upto]
        .iter()
        .filter(|op| !matches!(op, Op::Delete(_)))
        .count()
}

/// One file in a snapshot.
pub(crate) struct SnapshotEntry {
    pub path: String,
    pub bytes: u64,
    pub preview: String,
}

/// Human readable summary of a set of files.
pub(crate) fn render_snapshot(entries: &[SnapshotEntry], max_listed: usize) -> String {
    let total: u64 = entries.iter().map(|e| e.bytes).sum();
    let mut out = format!("Snapshot: {} file(s), {} bytes\n", entries.len(), total);
    for entry in entries.iter().take(max_listed) {
        out.push_str(&format!("--- {} ({} bytes)\n", entry.path, entry.bytes));
        if !entry.preview.is_empty() {
            out.push_str(&entry.preview);
            if !entry.preview.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    if entries.len() > max_listed {
        out.push_str(&format!(
            "... and {} more file(s)\n",
            entries.len() - max_listed
        ));
    }
    out
}

/// First `max_chars` characters of `text`, marked when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[...]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_produce_no_diff() {
        assert_eq!(unified_diff("a.txt", "x\ny\n", "x\ny\n"), "");
    }

    #[test]
    fn test_single_line_change() {
        let old = "one\ntwo\nthree\n";
        let new = "one\n2\nthree\n";
        let diff = unified_diff("n.txt", old, new);

        assert!(diff.starts_with("--- a/n.txt\n+++ b/n.txt\n"));
        assert!(diff.contains("@@ -1,3 +1,3 @@"));
        assert!(diff.contains("-two\n"));
        assert!(diff.contains("+2\n"));
        assert!(diff.contains(" one\n"));
    }

    #[test]
    fn test_new_file_diff() {
        let diff = unified_diff("new.txt", "", "a\nb\n");
        assert!(diff.contains("@@ -0,0 +1,2 @@"));
        assert!(diff.contains("+a\n+b\n"));
    }

    #[test]
    fn test_distant_changes_form_separate_hunks() {
        let old: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 2\n", "line two\n").replace("line 19\n", "line nineteen\n");
        let diff = unified_diff("f", &old, &new);
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn test_snapshot_lists_counts_and_previews() {
        let entries = vec![
            SnapshotEntry {
                path: "a.txt".into(),
                bytes: 3,
                preview: "abc".into(),
            },
            SnapshotEntry {
                path: "b.txt".into(),
                bytes: 5,
                preview: "hello".into(),
            },
        ];
        let text = render_snapshot(&entries, 1);
        assert!(text.starts_with("Snapshot: 2 file(s), 8 bytes\n"));
        assert!(text.contains("--- a.txt (3 bytes)\nabc\n"));
        assert!(!text.contains("b.txt"));
        assert!(text.contains("... and 1 more file(s)"));
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé\n[...]");
        assert_eq!(preview("hi", 10), "hi");
    }
}
