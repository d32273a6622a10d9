// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Formatted-content rendering.
//!
//! Runs once when a message is created; the result is stored next to the raw
//! text and served as-is afterwards. The output is HTML-escaped, with bare
//! `http(s)` URLs turned into anchors and line breaks into `<br>`.

use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"']+"#).unwrap());

/// Characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

/// Render raw message text into its cached formatted variant.
pub fn format_content(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 4);
    let mut cursor = 0;

    for found in URL_PATTERN.find_iter(raw) {
        if found.start() < cursor {
            continue;
        }
        let url = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        let Some((_, rest)) = url.split_once("://") else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        push_text(&mut out, &raw[cursor..found.start()]);
        let escaped = escape_html(url);
        out.push_str("<a href=\"");
        out.push_str(&escaped);
        out.push_str("\" target=\"_blank\" rel=\"noopener noreferrer\">");
        out.push_str(&escaped);
        out.push_str("</a>");
        cursor = found.start() + url.len();
    }

    push_text(&mut out, &raw[cursor..]);
    out
}

/// Escape the five HTML-significant characters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        other => out.push(other),
    }
}

fn push_text(out: &mut String, text: &str) {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("<br>");
            }
            '\n' => out.push_str("<br>"),
            other => push_escaped(out, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(format_content("Hi, is June 5 available?"), "Hi, is June 5 available?");
    }

    #[test]
    fn markup_is_escaped() {
        assert_eq!(
            format_content("<script>alert('x')</script> & more"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"
        );
    }

    #[test]
    fn urls_become_anchors() {
        assert_eq!(
            format_content("see https://example.com/menu."),
            "see <a href=\"https://example.com/menu\" target=\"_blank\" \
             rel=\"noopener noreferrer\">https://example.com/menu</a>."
        );
    }

    #[test]
    fn query_ampersands_are_escaped_inside_href() {
        let out = format_content("http://a.io/?x=1&y=2");
        assert!(out.starts_with("<a href=\"http://a.io/?x=1&amp;y=2\""));
    }

    #[test]
    fn several_links_and_breaks() {
        let out = format_content("one http://a.io\r\ntwo https://b.io)\nend");
        assert_eq!(out.matches("<a href=").count(), 2);
        assert_eq!(out.matches("<br>").count(), 2);
        assert!(out.contains("https://b.io</a>)"));
    }

    #[test]
    fn scheme_without_host_is_text() {
        assert_eq!(format_content("http://."), "http://.");
    }

    fn unescape(s: &str) -> String {
        s.replace("<br>", "\n")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    proptest! {
        #[test]
        fn url_free_text_round_trips_through_escaping(input in "[a-zA-Z0-9 <>&\"'\n.]{0,80}") {
            let out = format_content(&input);
            prop_assert_eq!(unescape(&out), input);
        }

        #[test]
        fn url_free_text_emits_no_tags_but_breaks(input in "[a-z <>/&\n]{0,80}") {
            let out = format_content(&input);
            let stripped = out.replace("<br>", "");
            prop_assert!(!stripped.contains('<'));
            prop_assert!(!stripped.contains('>'));
        }

        #[test]
        fn generated_links_are_wrapped(host in "[a-z]{1,12}", path in "[a-z0-9]{0,8}") {
            let url = format!("https://{host}.com/{path}");
            let out = format_content(&format!("go to {url} now"));
            let expected = format!(">{url}</a>");
            prop_assert!(out.contains(&expected));
        }
    }
}
