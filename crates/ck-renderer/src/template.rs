//! Tag-expression templates.
//!
//! Container directives, attribute shorthands, and unnamed fenced blocks
//! all describe elements with a compact expression syntax:
//!
//! ```text
//! tag#id.class1.class2(attr="value", width=300) optional text
//! ```
//!
//! The tag defaults to `div` when omitted (`.row.padded` is a plain
//! wrapper). Multi-line templates nest elements by two-space indentation.

use std::fmt::Write;

use ck_dom::escape_attr;

/// Error type for tag-expression parsing.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The expression was empty.
    #[error("empty tag expression")]
    Empty,
    /// A tag name contained an invalid character.
    #[error("invalid tag expression: {0:?}")]
    InvalidTag(String),
    /// An attribute list was not closed.
    #[error("unterminated attribute list: {0:?}")]
    UnterminatedAttrs(String),
    /// A quoted attribute value was not closed.
    #[error("unterminated string in attributes: {0:?}")]
    UnterminatedString(String),
}

/// A parsed tag expression.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagExpr {
    /// Element tag (defaults to `div`).
    pub tag: String,
    /// Whether the tag name was written out (vs. the `div` default).
    pub explicit_tag: bool,
    /// Id from `#id`.
    pub id: Option<String>,
    /// Classes from `.class` segments.
    pub classes: Vec<String>,
    /// Key-value attributes from `(...)`, in source order.
    pub attrs: Vec<(String, String)>,
    /// Trailing text content.
    pub text: String,
}

impl TagExpr {
    /// Parse a single tag expression.
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        let src = src.trim();
        if src.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut expr = Self {
            tag: "div".to_owned(),
            ..Self::default()
        };
        let mut rest = src;

        // Tag name
        let tag_end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .unwrap_or(rest.len());
        if tag_end > 0 {
            let tag = &rest[..tag_end];
            if !tag.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Err(TemplateError::InvalidTag(src.to_owned()));
            }
            expr.tag = tag.to_owned();
            expr.explicit_tag = true;
            rest = &rest[tag_end..];
        }

        // #id and .class segments
        loop {
            if let Some(after) = rest.strip_prefix('#') {
                let end = segment_end(after);
                expr.id = Some(after[..end].to_owned());
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('.') {
                let end = segment_end(after);
                expr.classes.push(after[..end].to_owned());
                rest = &after[end..];
            } else {
                break;
            }
        }

        // (attributes)
        if let Some(after) = rest.strip_prefix('(') {
            let close = find_attrs_end(after)
                .ok_or_else(|| TemplateError::UnterminatedAttrs(src.to_owned()))?;
            parse_attrs(&after[..close], &mut expr.attrs)
                .map_err(|()| TemplateError::UnterminatedString(src.to_owned()))?;
            rest = &after[close + 1..];
        }

        // Trailing text
        let text = rest.trim_start();
        if !text.is_empty() {
            if !rest.starts_with(char::is_whitespace) {
                return Err(TemplateError::InvalidTag(src.to_owned()));
            }
            expr.text = text.to_owned();
        }

        Ok(expr)
    }

    /// Whether this expression is a plain attribute carrier (an implicit
    /// `div`), as opposed to a substantive element.
    #[must_use]
    pub fn is_wrapper(&self) -> bool {
        !self.explicit_tag
    }

    /// Render the opening tag.
    #[must_use]
    pub fn open_tag(&self) -> String {
        let mut out = String::with_capacity(32);
        out.push('<');
        out.push_str(&self.tag);
        if let Some(id) = &self.id {
            write!(out, r#" id="{}""#, escape_attr(id)).expect("string write");
        }
        if !self.classes.is_empty() {
            write!(out, r#" class="{}""#, escape_attr(&self.classes.join(" ")))
                .expect("string write");
        }
        for (key, value) in &self.attrs {
            write!(out, r#" {key}="{}""#, escape_attr(value)).expect("string write");
        }
        out.push('>');
        out
    }

    /// Render the closing tag.
    #[must_use]
    pub fn close_tag(&self) -> String {
        format!("</{}>", self.tag)
    }
}

fn segment_end(s: &str) -> usize {
    s.find(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        .unwrap_or(s.len())
}

/// Find the closing paren of an attribute list, respecting quotes.
fn find_attrs_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                ')' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse `key="value"` pairs separated by commas or whitespace.
fn parse_attrs(s: &str, attrs: &mut Vec<(String, String)>) -> Result<(), ()> {
    let mut rest = s.trim();
    while !rest.is_empty() {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let Some(eq) = rest.find('=') else {
            // Bare attribute name (boolean attribute)
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ',')
                .unwrap_or(rest.len());
            attrs.push((rest[..end].to_owned(), String::new()));
            rest = &rest[end..];
            continue;
        };
        let key = rest[..eq].trim().to_owned();
        let after = &rest[eq + 1..];
        if let Some(stripped) = after.strip_prefix('"') {
            let end = stripped.find('"').ok_or(())?;
            attrs.push((key, stripped[..end].to_owned()));
            rest = &stripped[end + 1..];
        } else if let Some(stripped) = after.strip_prefix('\'') {
            let end = stripped.find('\'').ok_or(())?;
            attrs.push((key, stripped[..end].to_owned()));
            rest = &stripped[end + 1..];
        } else {
            let end = after
                .find(|c: char| c.is_whitespace() || c == ',')
                .unwrap_or(after.len());
            attrs.push((key, after[..end].to_owned()));
            rest = &after[end..];
        }
    }
    Ok(())
}

/// Render a multi-line template block to HTML.
///
/// Each non-blank line is one element; a line indented deeper than the
/// previous one nests inside it (two-space steps, but any deeper indent
/// counts as nesting).
pub fn render_block(src: &str) -> Result<String, TemplateError> {
    let mut out = String::new();
    // Stack of (indent, close_tag) for currently-open elements.
    let mut open: Vec<(usize, String)> = Vec::new();

    for line in src.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        while let Some((top_indent, _)) = open.last() {
            if *top_indent >= indent {
                let (_, close) = open.pop().expect("checked non-empty");
                out.push_str(&close);
            } else {
                break;
            }
        }
        let expr = TagExpr::parse(line.trim())?;
        out.push_str(&expr.open_tag());
        out.push_str(&ck_dom::escape_text(&expr.text));
        open.push((indent, expr.close_tag()));
    }

    while let Some((_, close)) = open.pop() {
        out.push_str(&close);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_tag_only() {
        let expr = TagExpr::parse("x-tabbox").unwrap();
        assert_eq!(expr.tag, "x-tabbox");
        assert!(expr.explicit_tag);
        assert!(!expr.is_wrapper());
    }

    #[test]
    fn test_parse_classes_only() {
        let expr = TagExpr::parse(".theorem.red").unwrap();
        assert_eq!(expr.tag, "div");
        assert!(expr.is_wrapper());
        assert_eq!(expr.classes, vec!["theorem", "red"]);
    }

    #[test]
    fn test_parse_full() {
        let expr = TagExpr::parse(r#"x-geopad#pad.sticky(width=300 data-mode="draw")"#).unwrap();
        assert_eq!(expr.tag, "x-geopad");
        assert_eq!(expr.id.as_deref(), Some("pad"));
        assert_eq!(expr.classes, vec!["sticky"]);
        assert_eq!(
            expr.attrs,
            vec![
                ("width".to_owned(), "300".to_owned()),
                ("data-mode".to_owned(), "draw".to_owned())
            ]
        );
    }

    #[test]
    fn test_parse_comma_separated_attrs() {
        let expr = TagExpr::parse(r#"div(a="1", b="2")"#).unwrap();
        assert_eq!(
            expr.attrs,
            vec![
                ("a".to_owned(), "1".to_owned()),
                ("b".to_owned(), "2".to_owned())
            ]
        );
    }

    #[test]
    fn test_parse_trailing_text() {
        let expr = TagExpr::parse("button.next Continue").unwrap();
        assert_eq!(expr.tag, "button");
        assert_eq!(expr.text, "Continue");
    }

    #[test]
    fn test_open_tag() {
        let expr = TagExpr::parse(r#".box(data-x="1")"#).unwrap();
        assert_eq!(expr.open_tag(), r#"<div class="box" data-x="1">"#);
        assert_eq!(expr.close_tag(), "</div>");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(TagExpr::parse(""), Err(TemplateError::Empty)));
        assert!(matches!(
            TagExpr::parse("div(a=\"1\""),
            Err(TemplateError::UnterminatedAttrs(_))
        ));
        assert!(matches!(
            TagExpr::parse("1bad"),
            Err(TemplateError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_render_block_single() {
        let html = render_block(".box").unwrap();
        assert_eq!(html, r#"<div class="box"></div>"#);
    }

    #[test]
    fn test_render_block_nested() {
        let html = render_block("x-slideshow\n  .slide First\n  .slide Second").unwrap();
        assert_eq!(
            html,
            concat!(
                "<x-slideshow>",
                r#"<div class="slide">First</div>"#,
                r#"<div class="slide">Second</div>"#,
                "</x-slideshow>"
            )
        );
    }

    #[test]
    fn test_render_block_siblings_after_nesting() {
        let html = render_block("div\n  span a\ndiv\n  span b").unwrap();
        assert_eq!(html, "<div><span>a</span></div><div><span>b</span></div>");
    }

    #[test]
    fn test_render_block_escapes_text() {
        let html = render_block("p 1 < 2").unwrap();
        assert_eq!(html, "<p>1 &lt; 2</p>");
    }
}
