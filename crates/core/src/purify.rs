//! Text purification for scraped article content.
//!
//! Scraping providers hand back markdown-ish text full of image links, nav
//! chrome and stray HTML. [`purify`] strips that down to the prose an LLM
//! needs, and caps the result at [`MAX_CHARS`] characters.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on purified output, in characters.
pub const MAX_CHARS: usize = 30_000;

static CARRIAGE_RETURN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());

/// Markdown links and images, optionally `!`/`@`/`#` prefixed, with one level
/// of nested brackets in the label (`[![alt](img)](href)`).
static NESTED_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[!@#]?\[(?:[^\[\]]*\[[^\]]*\][^\[\]]*|[^\[\]]*)\]\([^)]*\)").unwrap()
});

static PLAIN_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\[[^\[\]]*\]\([^)]*\)").unwrap());

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Lines with neither an ASCII alphanumeric nor a BMP non-ASCII character
/// (which covers CJK).
static NOISE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[^A-Za-z0-9\x{0080}-\x{FFFF}]*$").unwrap());

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").unwrap());

/// Clean scraped text.
///
/// Steps, in order: normalise line endings, drop markdown links, images and
/// HTML tags until none are left, blank out lines without alphanumeric or CJK
/// content, collapse newline runs, truncate to [`MAX_CHARS`], trim.
///
/// The output is a fixed point: `purify(&purify(x)) == purify(x)`.
pub fn purify(text: &str) -> String {
    let mut text = CARRIAGE_RETURN.replace_all(text, "\n").into_owned();
    // Removing a tag can join a link back together, and the other way round.
    loop {
        let stripped = strip_markup(&text);
        if stripped == text {
            break;
        }
        text = stripped;
    }

    let text = drop_noise_lines(&text);
    // A cut can leave a trailing line that is all punctuation.
    drop_noise_lines(truncate_chars(&text, MAX_CHARS)).trim().to_string()
}

fn strip_markup(text: &str) -> String {
    let text = NESTED_LINK.replace_all(text, "");
    let text = PLAIN_LINK.replace_all(&text, "");
    HTML_TAG.replace_all(&text, "").into_owned()
}

fn drop_noise_lines(text: &str) -> String {
    let text = NOISE_LINE.replace_all(text, "");
    BLANK_RUN.replace_all(&text, "\n").into_owned()
}

/// Cut `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("line one\r\nline two\rline three", "line one\nline two\nline three")]
    #[case("Read [the docs](https://example.com) today", "Read today")]
    #[case("Logo ![logo](https://example.com/a.png)\nText", "Logo\nText")]
    #[case("[![badge](https://img)](https://link) Title", "Title")]
    #[case("<p>Hello <b>world</b></p>", "Hello world")]
    #[case("Title\n\n\n\nBody", "Title\nBody")]
    #[case("Title\n----\n***\nBody", "Title\nBody")]
    #[case("  padded  ", "padded")]
    fn test_purify_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(purify(input), expected);
    }

    #[test]
    fn test_keeps_cjk_lines() {
        assert_eq!(purify("标题\n---\n正文内容"), "标题\n正文内容");
    }

    #[test]
    fn test_truncates_to_max_chars() {
        let input = "a".repeat(MAX_CHARS + 10_000);
        assert_eq!(purify(&input).chars().count(), MAX_CHARS);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let input = "文".repeat(MAX_CHARS + 5);
        let out = purify(&input);
        assert_eq!(out.chars().count(), MAX_CHARS);
    }

    #[test]
    fn test_truncate_chars_short_input() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }

    #[test]
    fn test_idempotent_on_article_like_input() {
        let input = "# Heading\r\n\r\n![hero](https://cdn/x.jpg)\r\n<div class=\"x\">Intro paragraph with \
                     [a link](https://a.b) inside.</div>\n\n* * *\n\n## 第二节\n正文。\n\n[Share](https://s) | [Tweet](https://t)\n";
        let once = purify(input);
        assert_eq!(purify(&once), once);
        assert!(once.contains("Intro paragraph with inside."));
        assert!(once.contains("第二节"));
        assert!(!once.contains("Share"));
    }

    #[rstest]
    #[case("Intro [a]<i>(b) text", "Intro text")]
    #[case("<a[x](y)b>Body", "Body")]
    #[case("[![a]<b>(c)](d) kept", "kept")]
    fn test_markup_hidden_by_other_markup(#[case] input: &str, #[case] expected: &str) {
        let once = purify(input);
        assert_eq!(once, expected);
        assert_eq!(purify(&once), once);
    }

    #[test]
    fn test_truncation_does_not_leave_noise_line() {
        let input = format!("{}\n- item", "a".repeat(MAX_CHARS - 3));
        let once = purify(&input);
        assert_eq!(once, "a".repeat(MAX_CHARS - 3));
        assert_eq!(purify(&once), once);
    }

    #[test]
    fn test_idempotent_across_truncation_points() {
        let paragraph = "Body text.\n- * -\n[x](y) <br> more\n";
        let input = paragraph.repeat(MAX_CHARS / paragraph.len() + 50);
        for extra in 0..paragraph.len() {
            let once = purify(&input[extra..]);
            assert!(once.chars().count() <= MAX_CHARS);
            assert_eq!(purify(&once), once);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(purify(""), "");
        assert_eq!(purify("\n\n---\n"), "");
    }
}
