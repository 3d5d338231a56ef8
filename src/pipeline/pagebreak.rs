//! Page-break convention: a line holding only `---` starts a new page.
//!
//! The YAML front matter that Pandoc reads for title/author metadata is
//! delimited by the same `---` lines, so it is split off first and passed
//! through untouched.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

static RE_PAGEBREAK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*-{3}[ \t]*$").unwrap());

const PAGE_BREAK: &str = "\n\\newpage\n";

/// Split a leading YAML front-matter block from the body.
///
/// The header opens with a `---` line at the very start of the text and ends
/// with the first following line whose trimmed content is `---` or `...`
/// (that line included). Without an opener, or without a closer, the header
/// is empty. `header + body` always reproduces `text`.
pub fn split_front_matter(text: &str) -> (&str, &str) {
    let opener_len = if text.starts_with("---\n") {
        4
    } else if text.starts_with("---\r\n") {
        5
    } else {
        return ("", text);
    };

    let mut offset = opener_len;
    for line in text[opener_len..].split_inclusive('\n') {
        offset += line.len();
        let t = line.trim();
        if t == "---" || t == "..." {
            return text.split_at(offset);
        }
    }

    ("", text)
}

/// Replace every bare `---` line in the body with `\newpage`.
pub fn apply_page_breaks(markdown: &str) -> String {
    let (header, body) = split_front_matter(markdown);
    let body = RE_PAGEBREAK_LINE.replace_all(body, NoExpand(PAGE_BREAK));
    let mut out = String::with_capacity(header.len() + body.len());
    out.push_str(header);
    out.push_str(&body);
    out
}

/// Number of lines [`apply_page_breaks`] would rewrite.
pub fn count_page_breaks(markdown: &str) -> usize {
    let (_, body) = split_front_matter(markdown);
    RE_PAGEBREAK_LINE.find_iter(body).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_without_header() {
        let text = "# Title\n\n---\nbody";
        assert_eq!(split_front_matter(text), ("", text));
    }

    #[test]
    fn split_with_header() {
        let text = "---\ntitle: Book\n---\n# Chapter\n";
        let (header, body) = split_front_matter(text);
        assert_eq!(header, "---\ntitle: Book\n---\n");
        assert_eq!(body, "# Chapter\n");
    }

    #[test]
    fn split_accepts_dot_closer() {
        let text = "---\ntitle: Book\n...\nbody";
        let (header, body) = split_front_matter(text);
        assert_eq!(header, "---\ntitle: Book\n...\n");
        assert_eq!(body, "body");
    }

    #[test]
    fn split_with_crlf_opener() {
        let text = "---\r\ntitle: Book\r\n---\r\nbody\r\n";
        let (header, body) = split_front_matter(text);
        assert_eq!(header, "---\r\ntitle: Book\r\n---\r\n");
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn unclosed_header_is_all_body() {
        let text = "---\ntitle: Book\nno closer";
        assert_eq!(split_front_matter(text), ("", text));
    }

    #[test]
    fn split_round_trips() {
        for text in [
            "---\na: 1\n---\nbody\n---\nmore",
            "---\n---\n",
            "---\na: 1\n   ---   \nrest",
            "plain",
            "",
        ] {
            let (header, body) = split_front_matter(text);
            assert_eq!(format!("{header}{body}"), text);
        }
    }

    #[test]
    fn page_break_replaces_bare_lines() {
        let md = "one\n---\ntwo\n  ---\t\nthree";
        assert_eq!(
            apply_page_breaks(md),
            "one\n\n\\newpage\n\ntwo\n\n\\newpage\n\nthree"
        );
    }

    #[test]
    fn page_break_ignores_longer_rules_and_inline_dashes() {
        let md = "----\na --- b\n- - -\n";
        assert_eq!(apply_page_breaks(md), md);
        assert_eq!(count_page_breaks(md), 0);
    }

    #[test]
    fn page_break_never_touches_header() {
        let md = "---\ntitle: Book\n---\nIntro\n---\nNext";
        let out = apply_page_breaks(md);
        assert!(out.starts_with("---\ntitle: Book\n---\n"));
        assert_eq!(out, "---\ntitle: Book\n---\nIntro\n\n\\newpage\n\nNext");
        assert_eq!(count_page_breaks(md), 1);
    }

    #[test]
    fn header_with_dash_line_inside_is_preserved() {
        // The opener is itself a bare `---` line.
        let md = "---\ntitle: x\n...\n---\n";
        let out = apply_page_breaks(md);
        assert_eq!(out, "---\ntitle: x\n...\n\n\\newpage\n\n");
    }
}
