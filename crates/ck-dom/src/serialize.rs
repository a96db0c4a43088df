//! Serialization back to HTML, with an optional minifying mode.

use std::fmt::Write;

use crate::parse::is_void;
use crate::tree::{Document, NodeId};

/// Elements whose text must be preserved verbatim when minifying.
const PRESERVE_WHITESPACE: &[&str] = &["pre", "svg", "textarea"];

/// Escape text for HTML content.
#[must_use]
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text for HTML attribute values (double-quoted).
#[must_use]
pub fn escape_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

struct Serializer<'a> {
    doc: &'a Document,
    minify: bool,
    preserve_depth: usize,
    out: String,
}

impl Serializer<'_> {
    fn text(&mut self, text: &str) {
        let escaped = escape_text(text);
        if self.minify && self.preserve_depth == 0 {
            self.out.push_str(&collapse_whitespace(&escaped));
        } else {
            self.out.push_str(&escaped);
        }
    }

    fn node(&mut self, id: NodeId) {
        let tag = self.doc.tag(id);
        self.out.push('<');
        self.out.push_str(tag);
        for (key, value) in self.doc.attrs(id) {
            write!(self.out, r#" {key}="{}""#, escape_attr(value)).expect("string write");
        }

        if is_void(tag) {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');

        let preserve = PRESERVE_WHITESPACE.contains(&tag);
        if preserve {
            self.preserve_depth += 1;
        }
        self.contents(id);
        if preserve {
            self.preserve_depth -= 1;
        }

        write!(self.out, "</{tag}>").expect("string write");
    }

    fn contents(&mut self, id: NodeId) {
        self.text(&self.doc.text(id).to_owned());
        for &child in &self.doc.children(id).to_vec() {
            self.node(child);
            self.text(&self.doc.tail(child).to_owned());
        }
    }
}

/// Collapse whitespace runs to a single space (conservative: never removes
/// whitespace entirely, matching the build's minifier settings).
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

impl Document {
    /// Serialize the subtree at `id` including its own tag.
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut s = Serializer {
            doc: self,
            minify: false,
            preserve_depth: 0,
            out: String::with_capacity(1024),
        };
        s.node(id);
        s.out
    }

    /// Serialize the contents of `id` without its own tag.
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut s = Serializer {
            doc: self,
            minify: false,
            preserve_depth: 0,
            out: String::with_capacity(1024),
        };
        s.contents(id);
        s.out
    }

    /// Serialize the subtree at `id` with whitespace runs collapsed.
    #[must_use]
    pub fn minified_html(&self, id: NodeId) -> String {
        let mut s = Serializer {
            doc: self,
            minify: true,
            preserve_depth: 0,
            out: String::with_capacity(1024),
        };
        s.node(id);
        s.out
    }

    /// Serialize the contents of `id`, minified, without its own tag.
    #[must_use]
    pub fn minified_inner_html(&self, id: NodeId) -> String {
        let mut s = Serializer {
            doc: self,
            minify: true,
            preserve_depth: 0,
            out: String::with_capacity(1024),
        };
        s.contents(id);
        s.out
    }
}
