//! HTML linting with the htmlhint default rule set.
//!
//! The document is parsed with `tl`. tl keeps no end tags, merges duplicate
//! attributes and forgets quote style, so those rules read the source text
//! inside the spans tl reports.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tl::{HTMLTag, Node, Parser, ParserOptions, VDom};

/// Elements that never have an end tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose end tag may be omitted.
const OPTIONAL_END: &[&str] = &[
    "html", "head", "body", "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th",
    "thead", "tbody", "tfoot", "colgroup", "rt", "rp",
];

/// Elements whose `src` must not be empty.
const SRC_ELEMENTS: &[&str] = &[
    "img", "script", "embed", "iframe", "frame", "audio", "video", "source", "track",
];

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<([^\s/>]+)((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("Invalid start tag regex")
});

static END_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</([A-Za-z][^\s/>]*)[^>]*>").expect("Invalid end tag regex")
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#)
        .expect("Invalid attribute regex")
});

static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!doctype[^>]*>").expect("Invalid doctype regex"));

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));

static RAW_TEXT_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(script|style|textarea)\b[^>]*>").expect("Invalid raw text regex")
});

/// One linter finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintMessage {
    pub rule: &'static str,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for LintMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, col {}: {} [{}]",
            self.line, self.col, self.message, self.rule
        )
    }
}

/// Lint a document and return its findings in source order.
pub fn lint(html: &str) -> Vec<LintMessage> {
    let blanked = Blanked::new(html);
    // tl only rejects documents longer than u32::MAX bytes.
    let Ok(dom) = tl::parse(&blanked.text, ParserOptions::default()) else {
        tracing::warn!("document too large to lint");
        return Vec::new();
    };

    let mut linter = Linter {
        html,
        findings: Vec::new(),
    };
    linter.run(&dom, &blanked);

    linter.findings.sort_by_key(|(offset, _)| *offset);
    linter.findings.into_iter().map(|(_, m)| m).collect()
}

/// A copy of the document, byte for byte the same length, where the parts tl
/// would misread are replaced by spaces: doctype declarations, the bodies of
/// raw text elements and a `<` that does not open markup. Offsets in the copy
/// are offsets in the source.
struct Blanked {
    text: String,
    stray: Vec<usize>,
}

impl Blanked {
    fn new(html: &str) -> Self {
        let mut text = html.to_string();

        for m in DOCTYPE.find_iter(html) {
            blank(&mut text, m.range());
        }

        let comments: Vec<Range<usize>> = COMMENT.find_iter(html).map(|m| m.range()).collect();
        let lower = html.to_ascii_lowercase();
        let mut pos = 0;
        while let Some(caps) = RAW_TEXT_OPEN.captures_at(html, pos) {
            let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            if comments.iter().any(|c| c.contains(&open.start())) {
                pos = open.end();
                continue;
            }
            let close = format!("</{}", name.as_str().to_ascii_lowercase());
            let end = lower[open.end()..]
                .find(&close)
                .map_or(html.len(), |i| open.end() + i);
            blank(&mut text, open.end()..end);
            pos = end;
        }

        let mut stray = Vec::new();
        for (i, _) in html.match_indices('<') {
            if text.as_bytes()[i] != b'<' {
                continue;
            }
            let opens_markup = html[i + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
            if !opens_markup {
                stray.push(i);
                text.replace_range(i..i + 1, " ");
            }
        }

        Self { text, stray }
    }
}

/// Replace a range with spaces, keeping newlines and the byte length.
fn blank(text: &mut String, range: Range<usize>) {
    let spaces: String = text[range.clone()]
        .chars()
        .flat_map(|c| {
            let fill = if c == '\n' { '\n' } else { ' ' };
            std::iter::repeat_n(fill, c.len_utf8())
        })
        .collect();
    text.replace_range(range, &spaces);
}

/// Byte offset of a slice tl handed out, relative to the text it parsed.
fn offset_in(text: &str, bytes: &[u8]) -> Option<usize> {
    let offset = (bytes.as_ptr() as usize).checked_sub(text.as_ptr() as usize)?;
    (offset + bytes.len() <= text.len()).then_some(offset)
}

struct Attr<'a> {
    name: &'a str,
    value: Option<&'a str>,
    /// Quote character around the value, if any
    quote: Option<char>,
    offset: usize,
}

fn parse_attrs(text: &str, base: usize) -> Vec<Attr<'_>> {
    ATTR.captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?;
            let (value, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                (Some(v), _, _) => (Some(v.as_str()), Some('"')),
                (_, Some(v), _) => (Some(v.as_str()), Some('\'')),
                (_, _, Some(v)) => (Some(v.as_str()), None),
                _ => (None, None),
            };
            Some(Attr {
                name: name.as_str(),
                value,
                quote,
                offset: base + name.start(),
            })
        })
        .collect()
}

struct StartTag<'a> {
    name: &'a str,
    attrs: Vec<Attr<'a>>,
    self_closing: bool,
    id: Option<String>,
}

impl StartTag<'_> {
    fn attr(&self, name: &str) -> Option<&Attr<'_>> {
        self.attrs.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

enum Event<'a> {
    Start(StartTag<'a>),
    End(&'a str),
}

struct Linter<'a> {
    html: &'a str,
    findings: Vec<(usize, LintMessage)>,
}

impl<'a> Linter<'a> {
    fn report(&mut self, offset: usize, rule: &'static str, message: String) {
        let (line, col) = line_col(self.html, offset);
        self.findings.push((
            offset,
            LintMessage {
                rule,
                line,
                col,
                message,
            },
        ));
    }

    fn run(&mut self, dom: &VDom<'_>, blanked: &Blanked) {
        let html: &'a str = self.html;
        let parser = dom.parser();
        let mut events: Vec<(usize, Event<'a>)> = Vec::new();
        let mut skipped: Vec<Range<usize>> = Vec::new();
        let mut first_content = None;
        let mut saw_head = false;

        for node in dom.nodes() {
            match node {
                Node::Tag(tag) => {
                    let (offset, _) = tag.boundaries(parser);
                    first_content.get_or_insert(offset);

                    let Some(start) = self.start_tag(tag, offset) else {
                        continue;
                    };
                    if let Some(m) = START_TAG.find(&self.html[offset..]) {
                        skipped.push(offset..offset + m.end());
                    }
                    if start.name.eq_ignore_ascii_case("head") && !saw_head {
                        saw_head = true;
                        if !has_title(tag, parser) {
                            self.report(
                                offset,
                                "title-require",
                                "<title></title> must be present in <head> tag.".to_string(),
                            );
                        }
                    }
                    events.push((offset, Event::Start(start)));
                }
                Node::Raw(bytes) => {
                    let text = bytes.as_bytes();
                    let Some(offset) = offset_in(&blanked.text, text) else {
                        continue;
                    };
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        first_content.get_or_insert(offset);
                    }
                    if let Some(i) = text.iter().position(|&b| b == b'>') {
                        self.report(
                            offset + i,
                            "spec-char-escape",
                            "Special characters must be escaped : [ > ].".to_string(),
                        );
                    }
                }
                Node::Comment(bytes) => {
                    if let Some(offset) = offset_in(&blanked.text, bytes.as_bytes()) {
                        skipped.push(offset..offset + bytes.as_bytes().len());
                    }
                }
            }
        }

        if let Some(offset) = first_content {
            let before = self.html[..offset].to_ascii_lowercase();
            if !before.contains("<!doctype") {
                self.report(
                    offset,
                    "doctype-first",
                    "Doctype must be declared first.".to_string(),
                );
            }
        }

        let inside = |offset: usize| skipped.iter().any(|r| r.contains(&offset));

        for &offset in &blanked.stray {
            if !inside(offset) {
                self.report(
                    offset,
                    "spec-char-escape",
                    "Special characters must be escaped : [ < ].".to_string(),
                );
            }
        }

        for caps in END_TAG.captures_iter(&blanked.text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !inside(whole.start()) {
                events.push((whole.start(), Event::End(&html[name.range()])));
            }
        }

        events.sort_by_key(|(offset, _)| *offset);
        self.check_structure(events);
    }

    fn start_tag(&self, tag: &HTMLTag<'_>, offset: usize) -> Option<StartTag<'a>> {
        let html: &'a str = self.html;
        let caps = START_TAG.captures(&html[offset..])?;
        let name = caps.get(1)?.as_str();
        let attrs = caps.get(2)?;

        Some(StartTag {
            name,
            attrs: parse_attrs(attrs.as_str(), offset + attrs.start()),
            self_closing: attrs.as_str().trim_end().ends_with('/'),
            id: tag
                .attributes()
                .id()
                .map(|id| id.as_utf8_str().into_owned()),
        })
    }

    /// Walk start and end tags in source order.
    fn check_structure(&mut self, events: Vec<(usize, Event<'a>)>) {
        let mut ids: HashSet<String> = HashSet::new();
        let mut open: Vec<(&'a str, usize)> = Vec::new();
        let mut svg_depth = 0usize;

        for (offset, event) in events {
            match event {
                Event::Start(tag) => {
                    self.check_start_tag(&tag, offset, svg_depth > 0);

                    if let Some(id) = tag.id.as_deref().filter(|id| !id.is_empty()) {
                        if !ids.insert(id.to_string()) {
                            self.report(
                                offset,
                                "id-unique",
                                format!("The id value [ {id} ] must be unique."),
                            );
                        }
                    }

                    if tag.self_closing || is_void(tag.name) {
                        continue;
                    }
                    if tag.name.eq_ignore_ascii_case("svg") {
                        svg_depth += 1;
                    }
                    open.push((tag.name, offset));
                }
                Event::End(name) => {
                    if svg_depth == 0 && name.chars().any(|c| c.is_ascii_uppercase()) {
                        self.report(
                            offset,
                            "tagname-lowercase",
                            format!("The html element name of [ {name} ] must be in lowercase."),
                        );
                    }
                    if name.eq_ignore_ascii_case("svg") {
                        svg_depth = svg_depth.saturating_sub(1);
                    }
                    self.close(&mut open, name, offset);
                }
            }
        }

        for (name, offset) in open {
            if !is_optional_end(name) {
                self.report(
                    offset,
                    "tag-pair",
                    format!("Tag must be paired, missing: [ </{name}> ]"),
                );
            }
        }
    }

    fn check_start_tag(&mut self, tag: &StartTag<'_>, offset: usize, in_svg: bool) {
        if tag.name.chars().any(|c| c.is_ascii_uppercase()) && !in_svg {
            self.report(
                offset,
                "tagname-lowercase",
                format!(
                    "The html element name of [ {} ] must be in lowercase.",
                    tag.name
                ),
            );
        }

        let in_svg = in_svg || tag.name.eq_ignore_ascii_case("svg");
        let mut names: Vec<String> = Vec::with_capacity(tag.attrs.len());

        for attr in &tag.attrs {
            if !in_svg && attr.name.chars().any(|c| c.is_ascii_uppercase()) {
                self.report(
                    attr.offset,
                    "attr-lowercase",
                    format!(
                        "The attribute name of [ {} ] must be in lowercase.",
                        attr.name
                    ),
                );
            }

            if let Some(value) = attr.value {
                let single_quoted = attr.quote == Some('\'');
                let unquoted = attr.quote.is_none() && !value.is_empty();
                if single_quoted || unquoted {
                    self.report(
                        attr.offset,
                        "attr-value-double-quotes",
                        format!(
                            "The value of attribute [ {} ] must be in double quotes.",
                            attr.name
                        ),
                    );
                }
            }

            let lower = attr.name.to_ascii_lowercase();
            if names.contains(&lower) {
                self.report(
                    attr.offset,
                    "attr-no-duplication",
                    format!("Duplicate of attribute name [ {} ] was found.", attr.name),
                );
            } else {
                names.push(lower);
            }
        }

        let src_attr = if SRC_ELEMENTS.iter().any(|n| tag.name.eq_ignore_ascii_case(n)) {
            Some("src")
        } else if tag.name.eq_ignore_ascii_case("input")
            && tag
                .attr("type")
                .and_then(|a| a.value)
                .is_some_and(|t| t.eq_ignore_ascii_case("image"))
        {
            Some("src")
        } else if tag.name.eq_ignore_ascii_case("link") {
            Some("href")
        } else if tag.name.eq_ignore_ascii_case("object") {
            Some("data")
        } else {
            None
        };

        if let Some(attr) = src_attr.and_then(|name| tag.attr(name)) {
            if attr.value.is_none_or(|v| v.trim().is_empty()) {
                self.report(
                    attr.offset,
                    "src-not-empty",
                    format!(
                        "The attribute [ {} ] of the tag [ {} ] must have a value.",
                        attr.name, tag.name
                    ),
                );
            }
        }
    }

    /// Match an end tag against the open element stack.
    fn close(&mut self, open: &mut Vec<(&'a str, usize)>, name: &str, offset: usize) {
        let Some(pos) = open
            .iter()
            .rposition(|(n, _)| n.eq_ignore_ascii_case(name))
        else {
            self.report(
                offset,
                "tag-pair",
                format!("Tag must be paired, no start tag: [ </{name}> ]"),
            );
            return;
        };

        for (unclosed, start) in open.drain(pos..).skip(1).collect::<Vec<_>>() {
            if !is_optional_end(unclosed) {
                self.report(
                    start,
                    "tag-pair",
                    format!("Tag must be paired, missing: [ </{unclosed}> ]"),
                );
            }
        }
    }
}

/// Whether a `<head>` holds a `<title>` with text, at any depth.
fn has_title<'p>(head: &HTMLTag<'p>, parser: &Parser<'p>) -> bool {
    head.children().all(parser).iter().any(|node| {
        node.as_tag().is_some_and(|tag| {
            tag.name().as_utf8_str().eq_ignore_ascii_case("title")
                && !tag.inner_text(parser).trim().is_empty()
        })
    })
}

fn is_void(name: &str) -> bool {
    VOID.iter().any(|v| name.eq_ignore_ascii_case(v))
}

fn is_optional_end(name: &str) -> bool {
    OPTIONAL_END.iter().any(|v| name.eq_ignore_ascii_case(v))
}

/// One-based line and column of a byte offset.
fn line_col(input: &str, offset: usize) -> (usize, usize) {
    let before = &input[..offset.min(input.len())];
    let line = before.matches('\n').count() + 1;
    let col = before.rfind('\n').map(|i| offset - i).unwrap_or(offset + 1);
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(html: &str) -> Vec<&'static str> {
        lint(html).into_iter().map(|m| m.rule).collect()
    }

    const CLEAN: &str = r#"<!DOCTYPE html>
<html>
<head><title>Home</title><link rel="stylesheet" href="styles/index.css"></head>
<body>
<ul><li>One<li>Two</ul>
<img src="a.png" alt="">
<svg viewBox="0 0 10 10"><path d="M0 0"/></svg>
<p>Tom &amp; Jerry</p>
</body>
</html>
"#;

    #[test]
    fn clean_document_has_no_findings() {
        assert_eq!(lint(CLEAN), vec![]);
    }

    #[test]
    fn requires_doctype_first() {
        assert_eq!(
            rules("<html><head><title>x</title></head></html>"),
            vec!["doctype-first"]
        );
    }

    #[test]
    fn legacy_doctype_is_not_text() {
        let html = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\">\n<p>x</p>";
        assert_eq!(rules(html), Vec::<&str>::new());
    }

    #[test]
    fn flags_attribute_problems() {
        let html = "<!DOCTYPE html><div CLASS='a' id=b id=\"c\"></div>";
        assert_eq!(
            rules(html),
            vec![
                "attr-lowercase",
                "attr-value-double-quotes",
                "attr-value-double-quotes",
                "attr-no-duplication",
            ]
        );
    }

    #[test]
    fn flags_duplicate_ids_and_empty_src() {
        let html = "<!DOCTYPE html><p id=\"a\"></p><p id=\"a\"></p><img src=\"\">";
        assert_eq!(rules(html), vec!["id-unique", "src-not-empty"]);
    }

    #[test]
    fn flags_unpaired_tags() {
        let html = "<!DOCTYPE html><div><span></div></em>";
        assert_eq!(rules(html), vec!["tag-pair", "tag-pair"]);
    }

    #[test]
    fn flags_unescaped_text_and_missing_title() {
        let messages = lint("<!DOCTYPE html>\n<head></head>\n<p>a > b</p>");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].rule, "title-require");
        assert_eq!(messages[1].rule, "spec-char-escape");
        assert_eq!((messages[1].line, messages[1].col), (3, 6));
    }

    #[test]
    fn flags_bare_less_than_in_text() {
        let messages = lint("<!DOCTYPE html><p>1 < 2</p>");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rule, "spec-char-escape");
        assert_eq!(messages[0].col, 21);
    }

    #[test]
    fn script_bodies_are_not_markup() {
        let html = "<!DOCTYPE html><script>if (a < b) { x = '</div>'; }</script><p>ok</p>";
        assert_eq!(rules(html), Vec::<&str>::new());
    }

    #[test]
    fn comments_are_not_markup() {
        let html = "<!DOCTYPE html><!-- </section> a < b <script> --><p>ok</p>";
        assert_eq!(rules(html), Vec::<&str>::new());
    }

    #[test]
    fn flags_uppercase_tag_names() {
        assert_eq!(
            rules("<!DOCTYPE html><DIV></DIV>"),
            vec!["tagname-lowercase", "tagname-lowercase"]
        );
    }

    #[test]
    fn computes_line_and_column() {
        let input = "a\nbc\nd";
        assert_eq!(line_col(input, 0), (1, 1));
        assert_eq!(line_col(input, 3), (2, 2));
        assert_eq!(line_col(input, 5), (3, 1));
    }
}
