//! Normalization of markup returned by the recognition service.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:latex)?").expect("valid fence pattern"));
static TEXTBF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\textbf\{([^{}]*)\}").expect("valid textbf pattern"));
static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\documentclass[\s\S]*?\\begin\{document\}").expect("valid preamble pattern")
});
static END_DOCUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\end\{document\}").expect("valid end pattern"));
static MATHRM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\mathrm").expect("valid mathrm pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Lines shorter than this (ignoring whitespace) may repeat freely.
const REPEAT_MIN_CHARS: usize = 10;

pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Unwraps `\textbf{...}` until none is left, innermost first.
pub fn strip_textbf(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = TEXTBF.replace_all(&current, "$1").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Drops lines already seen earlier, comparing with whitespace removed.
/// Short lines are always kept.
pub fn clean_repetitions(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for line in text.lines() {
        let key = WHITESPACE.replace_all(line, "").into_owned();
        if key.chars().count() > REPEAT_MIN_CHARS && seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        kept.push(line);
    }
    kept.join("\n")
}

/// Full cleanup applied to every recognized region.
pub fn post_clean(text: &str) -> String {
    let text = strip_code_fences(text);
    let text = strip_textbf(&text);
    let text = PREAMBLE.replace_all(&text, "");
    let text = END_DOCUMENT.replace_all(&text, "");
    let text = MATHRM.replace_all(&text, r"\text");
    clean_repetitions(&text).trim().to_string()
}
