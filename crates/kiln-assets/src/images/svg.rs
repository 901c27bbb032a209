//! SVG minification with quick-xml.

use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

/// Elements whose whitespace is rendered.
const TEXT_ELEMENTS: &[&[u8]] = &[b"text", b"tspan", b"textPath", b"title", b"desc", b"style"];

/// Drop comments, declarations, processing instructions, doctypes and
/// whitespace between elements. Every attribute is kept.
///
/// Whitespace-only text is dropped only when both neighbours are tags and it
/// is not inside a text element.
pub fn minify_svg(content: &[u8]) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_reader(content);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(content.len())));
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut after_tag = true;
    let mut pending = None;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => continue,
            Ok(Event::Text(text)) if text.iter().all(u8::is_ascii_whitespace) => {
                let in_text = open
                    .last()
                    .is_some_and(|name| TEXT_ELEMENTS.contains(&name.as_slice()));
                if in_text || !after_tag {
                    Event::Text(text)
                } else {
                    pending = Some(Event::Text(text));
                    continue;
                }
            }
            Ok(Event::Start(elem)) => {
                open.push(elem.local_name().as_ref().to_vec());
                Event::Start(normalize(elem)?)
            }
            Ok(Event::End(elem)) => {
                open.pop();
                Event::End(elem)
            }
            Ok(Event::Empty(elem)) => Event::Empty(normalize(elem)?),
            Ok(event) => event,
            Err(e) => {
                return Err(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                ))
            }
        };

        let is_tag = matches!(event, Event::Start(_) | Event::End(_) | Event::Empty(_));
        if let Some(space) = pending.take() {
            if !is_tag {
                writer.write_event(space).map_err(|e| e.to_string())?;
            }
        }
        after_tag = is_tag;
        writer.write_event(event).map_err(|e| e.to_string())?;
    }

    Ok(writer.into_inner().into_inner())
}

/// Rewrite a start tag with single spaces between attributes.
fn normalize(elem: BytesStart<'_>) -> Result<BytesStart<'_>, String> {
    let mut attrs = Vec::new();
    for attr in elem.attributes().with_checks(false) {
        let attr = attr.map_err(|e| e.to_string())?;
        // A single-quoted value holding `"` cannot be re-quoted without escaping.
        if attr.value.contains(&b'"') {
            return Ok(elem);
        }
        attrs.push((attr.key.as_ref().to_vec(), attr.value.to_vec()));
    }

    let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for (key, value) in &attrs {
        out.push_attribute((key.as_slice(), value.as_slice()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_prolog_comments_and_whitespace() {
        let svg = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- Generator: Sketch -->
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<svg xmlns="http://www.w3.org/2000/svg"
     viewBox="0 0 24 24"   width="24">
  <title>Arrow</title>
  <path d="M0 0L24 24"/>
</svg>
"#;

        let out = minify_svg(svg.as_bytes()).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" width="24"><title>Arrow</title><path d="M0 0L24 24"/></svg>"#
        );
    }

    #[test]
    fn keeps_text_content_and_entities() {
        let svg = r#"<svg><text x='1'>a &amp; b</text></svg>"#;

        let out = minify_svg(svg.as_bytes()).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<svg><text x="1">a &amp; b</text></svg>"#
        );
    }

    #[test]
    fn keeps_whitespace_between_entities() {
        let out = minify_svg(b"<svg><text>&lt; &gt;</text></svg>").unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "<svg><text>&lt; &gt;</text></svg>");
    }

    #[test]
    fn keeps_whitespace_inside_text_elements() {
        let svg = "<svg>\n  <text><tspan>a</tspan> <tspan>b</tspan></text>\n</svg>";

        let out = minify_svg(svg.as_bytes()).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<svg><text><tspan>a</tspan> <tspan>b</tspan></text></svg>"
        );
    }

    #[test]
    fn rejects_malformed_markup() {
        assert!(minify_svg(b"<svg><g></svg>").is_err());
    }
}
