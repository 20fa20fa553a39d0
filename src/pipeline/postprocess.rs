//! Post-processing: deterministic cleanup of model output and final documents.
//!
//! Two entry points:
//!
//! * [`clean_model_output`] runs on every transform response before it is
//!   stored in the pipeline state.
//! * [`finish_document`] runs once on each assembled markdown document.
//!
//! Each rule is a pure `&str → String` function; the order matters (line
//! endings are normalised before trimming, fences stripped before label
//! detection).

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise one transform response.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Strip invisible Unicode
/// 5. Drop a leading "SUMMARY" label line
/// 6. Trim surrounding blank lines
pub fn clean_model_output(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    let s = drop_summary_label(&s);
    s.trim_matches('\n').to_string()
}

/// Polish an assembled document.
///
/// Rules (applied in order):
/// 1. Normalise line endings
/// 2. Trim trailing whitespace per line
/// 3. Ensure heading lines have a blank line before them
/// 4. Fix GFM tables missing their separator row
/// 5. Collapse runs of blank lines to one
/// 6. End with exactly one newline
pub fn finish_document(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_heading_spacing(&s);
    let s = fix_broken_tables(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule: Strip outer markdown fences ────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule: Normalise line endings ─────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Trim trailing whitespace per line ──────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule: Remove invisible Unicode characters ────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule: Drop a leading SUMMARY label ───────────────────────────────────────
//
// Summaries sometimes open with "# SUMMARY", "**Summary:**" or "요약:" even
// when told not to. The label carries no content, so the first such line goes.

static RE_SUMMARY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*)?(?:summary|요약)(?:\*\*)?\s*:?(?:\*\*)?\s*$")
        .unwrap()
});

fn drop_summary_label(input: &str) -> String {
    let trimmed = input.trim_start_matches('\n');
    match trimmed.split_once('\n') {
        Some((first, rest)) if RE_SUMMARY_LABEL.is_match(first) => rest.to_string(),
        None if RE_SUMMARY_LABEL.is_match(trimmed) => String::new(),
        _ => trimmed.to_string(),
    }
}

// ── Rule: Collapse blank lines ───────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule: Ensure file ends with single newline ───────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Rule: Normalise heading spacing ──────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    for (i, line) in input.lines().enumerate() {
        if RE_HEADING.is_match(line) && i > 0 {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule: Fix broken GFM tables ──────────────────────────────────────────────

/// Inserts a separator row after a table's first row when the model left it out.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result = Vec::with_capacity(lines.len() + 10);
    let mut in_table = false;

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());
        if !is_table_row(line) {
            in_table = false;
            continue;
        }
        let header = !in_table;
        in_table = true;
        if header && !is_separator_row(line) {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let col_count = line.matches('|').count().saturating_sub(1).max(1);
                let sep: String = std::iter::once("|")
                    .chain(std::iter::repeat_n(" --- |", col_count))
                    .collect();
                result.push(sep);
            }
        }
    }

    result.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n- point one\n- point two\n```";
        assert_eq!(strip_markdown_fences(input), "- point one\n- point two");
    }

    #[test]
    fn test_no_fences_passthrough() {
        let input = "# Hello\nWorld";
        assert_eq!(strip_markdown_fences(input), "# Hello\nWorld");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_drop_summary_label_variants() {
        assert_eq!(drop_summary_label("# SUMMARY\n- a"), "- a");
        assert_eq!(drop_summary_label("**Summary:**\n- a"), "- a");
        assert_eq!(drop_summary_label("요약:\n- a"), "- a");
        assert_eq!(drop_summary_label("- Summary of results\n- a"), "- Summary of results\n- a");
    }

    #[test]
    fn test_clean_model_output() {
        let raw = "```\n# Summary\r\n- 🚀 Faster training   \r\n- 📈 Better BLEU\u{200B}\n```\n";
        assert_eq!(clean_model_output(raw), "- 🚀 Faster training\n- 📈 Better BLEU");
    }

    #[test]
    fn test_clean_model_output_empty_stays_empty() {
        assert_eq!(clean_model_output("  \n\n"), "");
        assert_eq!(clean_model_output("SUMMARY"), "");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_heading_spacing() {
        let result = normalise_heading_spacing("some text\n# Heading\nmore text");
        assert!(result.contains("\n\n# Heading\n"));
        let untouched = normalise_heading_spacing("#hashtag\ntext");
        assert_eq!(untouched, "#hashtag\ntext\n");
    }

    #[test]
    fn test_fix_broken_table() {
        let result = fix_broken_tables("| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(is_separator_row(lines[1]));
        assert!(!is_separator_row(lines[3]));
    }

    #[test]
    fn test_table_with_separator_unchanged() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(fix_broken_tables(input), input);
    }

    #[test]
    fn test_finish_document() {
        let doc = "# Title\r\nintro   \n\n\n\n# Method\nbody";
        assert_eq!(finish_document(doc), "# Title\nintro\n\n# Method\nbody\n");
        assert_eq!(finish_document(&finish_document(doc)), finish_document(doc));
    }
}
