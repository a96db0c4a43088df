//! Source-text preprocessing.
//!
//! Everything that must happen before the markdown parser sees the text:
//! `:::` container directives become nested HTML wrappers, and a handful
//! of plain substitutions work around markdown grammar collisions
//! (escaped dollars, blank/table pipe conflicts, headerless tables).

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::template::TagExpr;

/// Private-use stand-in for `\$`, restored by the inline rewriter.
pub const DOLLAR_SENTINEL: char = '\u{f8ff}';

/// Stand-in for `|` inside `[[...]]` blanks, split on by the inline rewriter.
pub const BLANK_SEPARATOR: &str = "§§";

static IMAGE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(url\(|src=["'`]|href=["'`]|background=["'`]|poster=["'`])images/"#)
        .expect("invalid image path regex")
});

static RESERVED_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" (when|delay|animation|duration|voice)=").expect("invalid attr regex")
});

static HEADERLESS_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n\|(.*)\n\|(.*)\n").expect("invalid table regex"));

static TABLE_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s|:-]+$").expect("invalid separator regex"));

static BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("invalid blank regex"));

/// Run the full pre-parse pass for one step of a course document.
pub fn preprocess(source: &str, course_id: &str, warnings: &mut Vec<String>) -> String {
    let text = block_containers(source, warnings);

    // Markdown eats the backslash of \$; park the sequence in a sentinel.
    let text = text.replace("\\$", &DOLLAR_SENTINEL.to_string());

    // Relative asset references resolve under the course content root.
    let text = IMAGE_PATH_RE.replace_all(&text, format!("${{1}}/content/{course_id}/images/"));

    // Rename attributes that collide with native HTML semantics.
    let text = RESERVED_ATTR_RE.replace_all(&text, " data-$1=");

    // The table grammar requires a header row. Add an empty one to tables
    // without it; the post-processor deletes empty <thead>s again.
    let text = HEADERLESS_TABLE_RE.replace_all(&text, |caps: &Captures| {
        let (row1, row2) = (&caps[1], &caps[2]);
        if TABLE_SEPARATOR_RE.is_match(row2) {
            return caps[0].to_owned();
        }
        let cols = row1.split(" | ").count();
        format!(
            "\n\n|{}\n|{}\n|{row1}\n|{row2}\n",
            " |".repeat(cols),
            " - |".repeat(cols)
        )
    });

    // The |s separating blank choices collide with table cell delimiters.
    BLANK_RE
        .replace_all(&text, |caps: &Captures| {
            caps[0].replace('|', BLANK_SEPARATOR)
        })
        .into_owned()
}

/// Minimal pre-parse pass for standalone fragments (YAML markdown fields).
pub fn preprocess_fragment(source: &str, warnings: &mut Vec<String>) -> String {
    block_containers(source, warnings)
}

/// What kind of container sits on top of the stack.
#[derive(Debug, PartialEq, Eq)]
enum ContainerKind {
    Column,
    Tab,
    Other,
}

struct OpenContainer {
    kind: ContainerKind,
    close: String,
}

/// Rewrite `:::` container directives into nested HTML wrappers.
///
/// Consecutive `column`/`tab` directives share one group wrapper; a bare
/// `:::` closes the innermost container. Unclosed containers at the end
/// of the document are left open (author responsibility).
pub fn block_containers(source: &str, warnings: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<OpenContainer> = Vec::new();
    let mut fence: Option<&str> = None;

    for line in source.lines() {
        let trimmed = line.trim_start();

        // Never rewrite inside code fences.
        if let Some(marker) = fence {
            out.push_str(line);
            out.push('\n');
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = Some(&trimmed[..3]);
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let Some(rest) = line.strip_prefix(":::") else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let tag = rest.trim();

        if tag.is_empty() {
            match stack.pop() {
                Some(container) => {
                    out.push('\n');
                    out.push_str(&container.close);
                    out.push('\n');
                }
                None => {
                    warnings.push("stray ::: with no open container".to_owned());
                    out.push_str(line);
                    out.push('\n');
                }
            }
            continue;
        }

        let rewritten = if tag.starts_with("column") {
            column_directive(tag, &mut stack, warnings)
        } else if tag.starts_with("tab") {
            tab_directive(tag, &mut stack, warnings)
        } else {
            open_directive(tag, &mut stack, warnings)
        };

        match rewritten {
            Some(html) => {
                out.push_str(&html);
                out.push('\n');
            }
            None => {
                // Malformed tag expression degrades to verbatim text.
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    if !source.ends_with('\n') {
        out.pop();
    }
    out
}

fn column_directive(
    tag: &str,
    stack: &mut Vec<OpenContainer>,
    warnings: &mut Vec<String>,
) -> Option<String> {
    let mut expr = match TagExpr::parse(tag) {
        Ok(expr) => expr,
        Err(e) => {
            warnings.push(format!("invalid column directive: {e}"));
            return None;
        }
    };
    expr.tag = "div".to_owned();
    // Column widths are fixed pixel sizes.
    if let Some(pos) = expr.attrs.iter().position(|(k, _)| k == "width") {
        let (_, width) = expr.attrs.remove(pos);
        expr.attrs.push(("style".to_owned(), format!("width: {width}px")));
    }
    let open = expr.open_tag();

    if stack.last().is_some_and(|c| c.kind == ContainerKind::Column) {
        Some(format!("\n</div>{open}"))
    } else {
        stack.push(OpenContainer {
            kind: ContainerKind::Column,
            close: "</div></div>".to_owned(),
        });
        Some(format!(r#"<div class="row padded">{open}"#))
    }
}

fn tab_directive(
    tag: &str,
    stack: &mut Vec<OpenContainer>,
    warnings: &mut Vec<String>,
) -> Option<String> {
    let mut expr = match TagExpr::parse(tag) {
        Ok(expr) => expr,
        Err(e) => {
            warnings.push(format!("invalid tab directive: {e}"));
            return None;
        }
    };
    expr.tag = "div".to_owned();
    expr.classes.insert(0, "tab".to_owned());
    let open = expr.open_tag();

    if stack.last().is_some_and(|c| c.kind == ContainerKind::Tab) {
        Some(format!("\n</div>{open}"))
    } else {
        stack.push(OpenContainer {
            kind: ContainerKind::Tab,
            close: "</div></x-tabbox>".to_owned(),
        });
        Some(format!("<x-tabbox>{open}"))
    }
}

fn open_directive(
    tag: &str,
    stack: &mut Vec<OpenContainer>,
    warnings: &mut Vec<String>,
) -> Option<String> {
    match TagExpr::parse(tag) {
        Ok(expr) => {
            stack.push(OpenContainer {
                kind: ContainerKind::Other,
                close: expr.close_tag(),
            });
            Some(expr.open_tag())
        }
        Err(e) => {
            warnings.push(format!("invalid container directive {tag:?}: {e}"));
            None
        }
    }
}
