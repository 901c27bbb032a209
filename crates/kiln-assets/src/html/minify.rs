//! HTML minification: comment removal and whitespace collapsing.

use std::sync::LazyLock;

use minify_html::Cfg;
use regex::{Captures, Regex};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));

/// Minify a document.
///
/// Closing tags and the `<html>`/`<head>` start tags stay in place. Inline
/// scripts and styles are only trimmed; the styles and scripts tasks own
/// their minification.
pub fn minify(html: &str) -> Vec<u8> {
    // Comments are filtered here so the kept ones can pass through the minifier.
    let html = COMMENT.replace_all(html, |caps: &Captures<'_>| {
        if is_kept_comment(&caps[0]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });

    let mut cfg = Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_input_type_text_attr = true;
    cfg.keep_comments = true;
    cfg.minify_css = false;
    cfg.minify_js = false;
    minify_html::minify(html.as_bytes(), &cfg)
}

/// Conditional comments and `<!--! ... -->` survive minification.
fn is_kept_comment(comment: &str) -> bool {
    comment.starts_with("<!--[if")
        || comment.starts_with("<!--<![endif]")
        || comment.starts_with("<!--!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minified(html: &str) -> String {
        String::from_utf8(minify(html)).unwrap()
    }

    #[test]
    fn removes_whitespace_between_blocks() {
        let html = "<div>\n  <p>\n    Hello   world\n  </p>\n</div>\n";
        assert_eq!(minified(html), "<div><p>Hello world</p></div>");
    }

    #[test]
    fn keeps_single_space_between_inline_elements() {
        let out = minified("<p>Read <a href=\"/docs\">the   docs</a> <em>now</em>.</p>");

        assert!(out.starts_with("<p>Read <a "), "{out}");
        assert!(out.ends_with(">the docs</a> <em>now</em>.</p>"), "{out}");
    }

    #[test]
    fn drops_comments_but_keeps_conditional_and_bang_comments() {
        let html = "<div>a<!-- note -->b</div><!--[if IE]><p>old</p><![endif]--><!--! keep -->";
        assert_eq!(
            minified(html),
            "<div>ab</div><!--[if IE]><p>old</p><![endif]--><!--! keep -->"
        );
    }

    #[test]
    fn preserves_pre() {
        let html = "<div>\n<pre>  a\n   b  </pre>\n</div>";
        assert_eq!(minified(html), "<div><pre>  a\n   b  </pre></div>");
    }

    #[test]
    fn leaves_inline_scripts_unminified() {
        let out = minified("<script>\n  let x  =  1;\n</script>");
        assert!(out.contains("let x  =  1;"), "{out}");
    }

    #[test]
    fn keeps_closing_tags_and_document_shell() {
        let html = "<html>\n<head></head>\n<body>\n<ul>\n<li>One</li>\n<li>Two</li>\n</ul>\n</body>\n</html>";

        assert_eq!(
            minified(html),
            "<html><head></head><body><ul><li>One</li><li>Two</li></ul></body></html>"
        );
    }

    #[test]
    fn keeps_non_breaking_space() {
        assert_eq!(minified("<p>a\u{a0}b</p>"), "<p>a\u{a0}b</p>");
    }
}
