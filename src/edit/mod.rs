//! Edit Engine (C7) — literal, uniqueness-checked text replacement.
//!
//! A whitespace-tolerant, Levenshtein-scored fuzzy replacer papers over
//! drift between an intended match and a file's literal bytes, but that
//! design directly conflicts with this server's invariant that a single
//! edit succeeds only when `oldText` occurs in the file **exactly once**
//! (zero or many is always a failure unless the caller explicitly opts into
//! `replaceAll`) — a fuzzy matcher can "succeed" against an ambiguous or
//! drifted match, which this contract forbids. This module uses a plain
//! literal occurrence count instead, alongside diff generation
//! (`edit::diff`) and atomic-write-after-validate (handled by the
//! `tools::edit` callers).

pub mod diff;

use crate::error::{ServerError, ServerResult};

/// Count non-overlapping literal occurrences of `needle` in `haystack`.
#[must_use]
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Apply a single literal edit to `content`.
///
/// - `replace_all = false` (default): `old_text` must occur exactly once.
///   Zero occurrences is a not-found error; two or more is a conflict
///   error. Neither mutates `content`.
/// - `replace_all = true`: every occurrence is replaced, including the
///   zero-occurrence case, which succeeds with a count of `0` — the caller
///   opted into "replace however many there are," and there happened to
///   be none.
///
/// Returns the new content and the number of replacements made.
///
/// # Errors
///
/// Returns [`ServerError::Validation`] if `old_text` is empty,
/// [`ServerError::NotFound`] if there is no match and `replace_all` is
/// false, or [`ServerError::Conflict`] if there are multiple matches and
/// `replace_all` is false.
pub fn apply_single_edit(
    content: &str,
    old_text: &str,
    new_text: &str,
    replace_all: bool,
) -> ServerResult<(String, usize)> {
    if old_text.is_empty() {
        return Err(ServerError::Validation {
            field: "oldText".to_owned(),
            reason: "must not be empty".to_owned(),
        });
    }

    let count = count_occurrences(content, old_text);

    if replace_all {
        return Ok((content.replace(old_text, new_text), count));
    }

    match count {
        0 => Err(ServerError::NotFound(format!(
            "oldText not found in file content (0 matches for {old_text:?})"
        ))),
        1 => {
            let idx = content.find(old_text).unwrap_or(0);
            let mut result = String::with_capacity(content.len() - old_text.len() + new_text.len());
            result.push_str(&content[..idx]);
            result.push_str(new_text);
            result.push_str(&content[idx + old_text.len()..]);
            Ok((result, 1))
        }
        n => Err(ServerError::Conflict(format!(
            "ambiguous match: oldText occurs {n} times; add more surrounding context or pass replaceAll=true"
        ))),
    }
}

/// One step of a multi-edit batch.
#[derive(Debug, Clone)]
pub struct EditOp {
    pub old_text: String,
    pub new_text: String,
    pub replace_all: bool,
}

/// Apply an ordered list of edits to `content`, each against the running
/// content produced by the previous one. If any step fails, the whole batch
/// is aborted and the original content is returned unchanged alongside the
/// error — callers must not write partial results.
///
/// # Errors
///
/// Returns the first [`ServerError`] produced by [`apply_single_edit`],
/// identifying which step (1-based) failed.
pub fn apply_multi_edit(content: &str, ops: &[EditOp]) -> ServerResult<(String, Vec<usize>)> {
    let mut current = content.to_owned();
    let mut counts = Vec::with_capacity(ops.len());

    for (i, op) in ops.iter().enumerate() {
        match apply_single_edit(&current, &op.old_text, &op.new_text, op.replace_all) {
            Ok((next, count)) => {
                current = next;
                counts.push(count);
            }
            Err(e) => {
                return Err(ServerError::Conflict(format!("edit #{} failed: {e}", i + 1)));
            }
        }
    }

    Ok((current, counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_match_replaces() {
        let (out, count) = apply_single_edit("hello world\n", "world", "there", false).expect("ok");
        assert_eq!(out, "hello there\n");
        assert_eq!(count, 1);
    }

    #[test]
    fn zero_matches_is_not_found() {
        let err = apply_single_edit("hello world\n", "xyz", "there", false).expect_err("should fail");
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn ambiguous_match_is_conflict_and_content_unchanged() {
        let content = "foo foo\n";
        let err = apply_single_edit(content, "foo", "bar", false).expect_err("should fail");
        assert!(matches!(err, ServerError::Conflict(_)));
    }

    #[test]
    fn replace_all_replaces_every_occurrence() {
        let (out, count) = apply_single_edit("foo foo foo\n", "foo", "bar", true).expect("ok");
        assert_eq!(out, "bar bar bar\n");
        assert_eq!(count, 3);
    }

    #[test]
    fn replace_all_with_zero_matches_succeeds() {
        let (out, count) = apply_single_edit("hello\n", "xyz", "abc", true).expect("ok");
        assert_eq!(out, "hello\n");
        assert_eq!(count, 0);
    }

    #[test]
    fn empty_old_text_is_validation_error() {
        let err = apply_single_edit("hello\n", "", "x", false).expect_err("should fail");
        assert!(matches!(err, ServerError::Validation { .. }));
    }

    #[test]
    fn multi_edit_applies_in_order_against_running_content() {
        let ops = vec![
            EditOp { old_text: "a".into(), new_text: "b".into(), replace_all: false },
            EditOp { old_text: "b".into(), new_text: "c".into(), replace_all: false },
        ];
        let (out, counts) = apply_multi_edit("a\n", &ops).expect("ok");
        assert_eq!(out, "c\n");
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn multi_edit_aborts_whole_batch_on_failure() {
        let ops = vec![
            EditOp { old_text: "a".into(), new_text: "b".into(), replace_all: false },
            EditOp { old_text: "zzz".into(), new_text: "c".into(), replace_all: false },
        ];
        let err = apply_multi_edit("a\n", &ops).expect_err("should fail");
        assert!(matches!(err, ServerError::Conflict(_)));
    }
}
