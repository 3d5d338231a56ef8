//! Dollar escaping for the LaTeX back end.
//!
//! Pandoc treats `$…$` as inline TeX math, so prose such as "costs $5 or $10"
//! turns into garbled math. Every `$` not already preceded by a backslash is
//! escaped. This runs once over the final document; diagram sources never see
//! it because they were replaced by image links earlier.

/// Prefix every `$` that is not immediately preceded by `\` with `\`.
pub fn escape_unescaped_dollars(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + 16);
    let mut prev: Option<char> = None;
    for c in markdown.chars() {
        if c == '$' && prev != Some('\\') {
            out.push('\\');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Number of `$` characters [`escape_unescaped_dollars`] would escape.
pub fn count_unescaped_dollars(markdown: &str) -> usize {
    let mut prev: Option<char> = None;
    let mut n = 0;
    for c in markdown.chars() {
        if c == '$' && prev != Some('\\') {
            n += 1;
        }
        prev = Some(c);
    }
    n
}
