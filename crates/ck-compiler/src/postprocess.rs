//! Post-processing passes over the rendered step tree.
//!
//! After markdown rendering and equation substitution the step body is
//! parsed into a [`Document`] and rewritten in place. Pass order is fixed:
//! attribute shorthands may introduce elements that later passes inspect,
//! and the reserved-attribute renames run last so earlier passes still see
//! the authored names.

use ck_dom::{Document, NodeId};
use ck_renderer::{CourseRenderer, EquationService, RenderOptions, TagExpr, is_rtl};

/// Rendering context for passes that re-enter the markdown renderer.
pub(crate) struct RenderCtx<'a> {
    pub equations: &'a EquationService,
    pub options: &'a RenderOptions,
}

/// Inline-block elements that must not be separated from trailing
/// punctuation by a line break.
const NOWRAP_TAGS: &[&str] = &[
    "code",
    "x-blank",
    "x-blank-mc",
    "x-var",
    "x-gloss",
    "x-bio",
    "x-target",
];
const NOWRAP_CLASSED: &[(&str, &str)] = &[
    ("svg", "mathjax"),
    ("span", "step-target"),
    ("span", "pill"),
    ("span", "math"),
];

/// Elements that stay left-to-right even in RTL locales.
const LTR_ELEMENTS: &[&str] = &["x-geopad", "x-coordinate-system", "svg", "x-var"];

/// Attributes renamed to their `data-` form to avoid colliding with
/// native HTML semantics.
const RENAMED_ATTRS: &[&str] = &["when", "delay", "animation", "duration", "voice"];

/// Run the full pass sequence over one step body.
pub(crate) fn run_passes(doc: &mut Document, ctx: &RenderCtx<'_>, warnings: &mut Vec<String>) {
    expand_shorthands(doc, warnings);
    insert_nowraps(doc);
    reparse_markdown(doc, ctx, warnings);
    promote_parent_attrs(doc);
    remove_empty_headers(doc);
    mark_titled_boxes(doc);
    promote_table_class_rows(doc);
    add_alt_defaults(doc);
    if is_rtl(&ctx.options.locale) {
        add_ltr_overrides(doc);
    }
    rename_reserved_attrs(doc);
}

/// Shorthand and no-wrap passes only, for standalone fragments
/// (markdown-valued fields of localization files).
pub(crate) fn fragment_passes(doc: &mut Document, warnings: &mut Vec<String>) {
    expand_shorthands(doc, warnings);
    insert_nowraps(doc);
}

/// Elements in children-before-parent order, not descending into `<svg>`.
fn shorthand_targets(doc: &Document, id: NodeId, out: &mut Vec<NodeId>) {
    for &child in doc.children(id) {
        if doc.tag(child) != "svg" {
            shorthand_targets(doc, child, out);
        }
        out.push(child);
    }
}

/// Expand `{tag#id.class(attrs)}` shorthands at the start of element text.
///
/// A plain wrapper expression merges its attributes onto the element
/// itself (classes unioned); a substantive element replaces it, adopting
/// its children. Malformed expressions warn and leave the element alone.
fn expand_shorthands(doc: &mut Document, warnings: &mut Vec<String>) {
    let mut targets = Vec::new();
    shorthand_targets(doc, doc.root(), &mut targets);
    for id in targets {
        expand_shorthand(doc, id, warnings);
    }
}

fn expand_shorthand(doc: &mut Document, id: NodeId, warnings: &mut Vec<String>) {
    let text = doc.text(id);
    let Some(rest) = text.strip_prefix('{') else {
        return;
    };
    let Some(end) = rest.find('}') else { return };
    if end == 0 {
        return;
    }
    let src = rest[..end].to_owned();
    let remainder = rest[end + 1..].to_owned();

    let expr = match TagExpr::parse(&src) {
        Ok(expr) => expr,
        Err(e) => {
            warnings.push(format!("invalid attribute shorthand {{{src}}}: {e}"));
            return;
        }
    };

    if expr.is_wrapper() {
        doc.set_text(id, remainder);
        if let Some(html_id) = &expr.id {
            doc.set_attr(id, "id", html_id);
        }
        for class in &expr.classes {
            doc.add_class(id, class);
        }
        for (key, value) in &expr.attrs {
            doc.set_attr(id, key, value);
        }
    } else {
        let new = doc.create_element(&expr.tag);
        if let Some(html_id) = &expr.id {
            doc.set_attr(new, "id", html_id);
        }
        if !expr.classes.is_empty() {
            doc.set_attr(new, "class", &expr.classes.join(" "));
        }
        for (key, value) in &expr.attrs {
            doc.set_attr(new, key, value);
        }
        doc.set_text(id, remainder);
        doc.reparent_children(id, new);
        doc.replace_with(id, new);
    }
}

fn is_nowrap_target(doc: &Document, id: NodeId) -> bool {
    let tag = doc.tag(id);
    NOWRAP_TAGS.contains(&tag)
        || NOWRAP_CLASSED
            .iter()
            .any(|(t, class)| tag == *t && doc.has_class(id, class))
}

/// Move leading punctuation after an inline-block element into a shared
/// `<span class="nowrap">`, so the punctuation cannot wrap alone.
fn insert_nowraps(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if !is_nowrap_target(doc, id) {
            continue;
        }
        let tail = doc.tail(id);
        let Some(punct) = tail.chars().next() else {
            continue;
        };
        if !matches!(punct, ':' | '.' | ',' | '!' | '?' | '°') {
            continue;
        }
        let rest = tail[punct.len_utf8()..].to_owned();
        let wrapper = doc.wrap(id, "span");
        doc.add_class(wrapper, "nowrap");
        doc.set_tail(id, punct.to_string());
        doc.set_tail(wrapper, rest);
    }
}

/// Re-render the contents of `.md`-flagged elements as markdown.
fn reparse_markdown(doc: &mut Document, ctx: &RenderCtx<'_>, warnings: &mut Vec<String>) {
    for id in doc.descendants(doc.root()) {
        if !doc.has_class(id, "md") || !doc.is_attached(id) {
            continue;
        }
        doc.remove_class(id, "md");
        let source = doc.inner_html(id);
        let result = CourseRenderer::new(ctx.equations, ctx.options).render(&source);
        warnings.extend(result.warnings);
        let html = ctx.equations.fill_placeholders(&result.html, warnings);
        let html = html.strip_prefix("<p>").unwrap_or(&html);
        let html = html.strip_suffix("</p>").unwrap_or(html);
        set_inner_html(doc, id, html, warnings);
    }
}

/// Replace the contents of `id` with a parsed HTML fragment.
fn set_inner_html(doc: &mut Document, id: NodeId, html: &str, warnings: &mut Vec<String>) {
    let frag = match Document::parse(html, "body") {
        Ok(frag) => frag,
        Err(e) => {
            warnings.push(format!("invalid markup after markdown re-parse: {e}"));
            return;
        }
    };
    for child in doc.children(id).to_vec() {
        doc.detach(child);
    }
    doc.set_text(id, frag.text(frag.root()));
    for child in frag.children(frag.root()).to_vec() {
        let imported = doc.import(&frag, child);
        doc.append_child(id, imported);
    }
}

/// Move classes listed in a `parent` attribute onto the parent element.
fn promote_parent_attrs(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        let Some(classes) = doc.remove_attr(id, "parent") else {
            continue;
        };
        let Some(parent) = doc.parent(id) else {
            continue;
        };
        for class in classes.split_whitespace() {
            doc.add_class(parent, class);
        }
    }
}

/// Remove the synthetic empty `<thead>`s added by the preprocessor.
///
/// Real text or embedded math counts as content.
fn remove_empty_headers(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if doc.tag(id) != "thead" {
            continue;
        }
        let has_math = doc
            .descendants(id)
            .iter()
            .any(|&n| doc.has_class(n, "mathjax"));
        if doc.text_content(id).trim().is_empty() && !has_math {
            doc.detach(id);
        }
    }
}

/// `.box` elements containing an `<h3>` or `.tabs` gain `with-title`.
fn mark_titled_boxes(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if !doc.has_class(id, "box") {
            continue;
        }
        let titled = doc
            .descendants(id)
            .iter()
            .any(|&n| doc.tag(n) == "h3" || doc.has_class(n, "tabs"));
        if titled {
            doc.add_class(id, "with-title");
        }
    }
}

/// A table whose last row is a single classed, otherwise-empty `<td>` sets
/// the class of the whole table; the row is removed.
fn promote_table_class_rows(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if doc.tag(id) != "table" {
            continue;
        }
        let Some(&last) = doc.children(id).last() else {
            continue;
        };
        // The row may sit in a <tbody> or directly under the table.
        let row = if doc.tag(last) == "tr" {
            last
        } else {
            match doc.children(last).last() {
                Some(&row) if doc.tag(row) == "tr" => row,
                _ => continue,
            }
        };
        let &[cell] = doc.children(row) else {
            continue;
        };
        if doc.tag(cell) != "td" || !doc.has_attr(cell, "class") {
            continue;
        }
        if !doc.text_content(row).trim().is_empty() {
            continue;
        }
        if let Some(class) = doc.attr(cell, "class").map(str::to_owned) {
            doc.set_attr(id, "class", &class);
        }
        doc.detach(row);
    }
}

/// Images without an `alt` attribute get an empty one.
fn add_alt_defaults(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if doc.tag(id) == "img" && !doc.has_attr(id, "alt") {
            doc.set_attr(id, "alt", "");
        }
    }
}

/// Force `dir="ltr"` onto elements that never mirror.
fn add_ltr_overrides(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        if LTR_ELEMENTS.contains(&doc.tag(id)) {
            doc.set_attr(id, "dir", "ltr");
        }
    }
}

/// Rename `when=` and friends to their `data-` form.
fn rename_reserved_attrs(doc: &mut Document) {
    for id in doc.descendants(doc.root()) {
        for attr in RENAMED_ATTRS {
            if let Some(value) = doc.remove_attr(id, attr) {
                doc.set_attr(id, &format!("data-{attr}"), &value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ck_cache::{Cache, NullCache};
    use ck_renderer::NullEngine;
    use pretty_assertions::assert_eq;

    use super::*;

    fn process_with(html: &str, locale: &str) -> (String, Vec<String>) {
        let equations = EquationService::new(Box::new(NullEngine), NullCache.bucket("equations"));
        let options = RenderOptions {
            locale: locale.to_owned(),
            ..RenderOptions::default()
        };
        let mut warnings = Vec::new();
        let mut doc = Document::parse(html, "x-step").unwrap();
        run_passes(
            &mut doc,
            &RenderCtx {
                equations: &equations,
                options: &options,
            },
            &mut warnings,
        );
        (doc.inner_html(doc.root()), warnings)
    }

    fn process(html: &str) -> String {
        process_with(html, "en").0
    }

    #[test]
    fn test_shorthand_wrapper_merges_attrs() {
        let out = process(r#"<p>{.theorem.red} All angles are equal.</p>"#);
        assert_eq!(out, r#"<p class="theorem red"> All angles are equal.</p>"#);
    }

    #[test]
    fn test_shorthand_wrapper_unions_classes() {
        let out = process(r#"<p class="red">{.red.wide}text</p>"#);
        assert_eq!(out, r#"<p class="red wide">text</p>"#);
    }

    #[test]
    fn test_shorthand_element_replaces_parent() {
        let out = process("<p>{button.next} Continue <em>now</em></p>");
        assert_eq!(
            out,
            r#"<button class="next"> Continue <em>now</em></button>"#
        );
    }

    #[test]
    fn test_shorthand_malformed_warns_and_keeps_element() {
        let (out, warnings) = process_with("<p>{1bad} text</p>", "en");
        assert_eq!(out, "<p>{1bad} text</p>");
        assert!(warnings.iter().any(|w| w.contains("shorthand")));
    }

    #[test]
    fn test_shorthand_skipped_inside_svg() {
        let out = process("<svg><text>{not an attr}</text></svg>");
        assert_eq!(out, "<svg><text>{not an attr}</text></svg>");
    }

    #[test]
    fn test_nowrap_insertion() {
        let out = process("<p>Try <code>x</code>, then stop</p>");
        assert_eq!(
            out,
            r#"<p>Try <span class="nowrap"><code>x</code>,</span> then stop</p>"#
        );
    }

    #[test]
    fn test_nowrap_only_for_punctuation() {
        let out = process("<p><code>x</code> and more</p>");
        assert!(!out.contains("nowrap"));
    }

    #[test]
    fn test_nowrap_degree_sign() {
        let out = process(r#"<p>turn <x-blank solution="90"></x-blank>° around</p>"#);
        assert!(out.contains(r#"<span class="nowrap"><x-blank solution="90"></x-blank>°</span>"#));
    }

    #[test]
    fn test_markdown_reparse() {
        let out = process(r#"<div class="md">Some **bold** text</div>"#);
        assert_eq!(out, "<div>Some <strong>bold</strong> text</div>");
    }

    #[test]
    fn test_markdown_reparse_blanks() {
        let out = process(r#"<div class="md">Pick [[42]]</div>"#);
        assert!(out.contains(r#"<x-blank solution="42">"#));
        assert!(!out.contains("md"));
    }

    #[test]
    fn test_parent_attr_promotion() {
        let out = process(r#"<div><span parent="wide dark">x</span></div>"#);
        assert_eq!(out, r#"<div class="wide dark"><span>x</span></div>"#);
    }

    #[test]
    fn test_empty_thead_removed() {
        let out = process("<table><thead><tr><th></th></tr></thead><tbody><tr><td>a</td></tr></tbody></table>");
        assert_eq!(out, "<table><tbody><tr><td>a</td></tr></tbody></table>");
    }

    #[test]
    fn test_thead_with_text_kept() {
        let out = process("<table><thead><tr><th>Name</th></tr></thead></table>");
        assert!(out.contains("<thead>"));
    }

    #[test]
    fn test_thead_with_math_kept() {
        let out =
            process(r#"<table><thead><tr><th><svg class="mathjax"></svg></th></tr></thead></table>"#);
        assert!(out.contains("<thead>"));
    }

    #[test]
    fn test_box_with_title() {
        let out = process(r#"<div class="box"><h3>Theorem</h3><p>text</p></div>"#);
        assert!(out.contains(r#"class="box with-title""#));
    }

    #[test]
    fn test_box_without_title() {
        let out = process(r#"<div class="box"><p>text</p></div>"#);
        assert!(!out.contains("with-title"));
    }

    #[test]
    fn test_table_class_row_promoted() {
        let out = process(concat!(
            "<table><tbody>",
            "<tr><td>a</td><td>b</td></tr>",
            r#"<tr><td class="grid"></td></tr>"#,
            "</tbody></table>"
        ));
        assert_eq!(
            out,
            r#"<table class="grid"><tbody><tr><td>a</td><td>b</td></tr></tbody></table>"#
        );
    }

    #[test]
    fn test_table_class_row_with_text_kept() {
        let out = process(r#"<table><tbody><tr><td class="grid">text</td></tr></tbody></table>"#);
        assert!(out.contains(r#"<td class="grid">text</td>"#));
        assert!(!out.contains(r#"<table class="grid">"#));
    }

    #[test]
    fn test_table_class_row_must_be_last() {
        let out = process(concat!(
            "<table><tbody>",
            r#"<tr><td class="grid"></td></tr>"#,
            "<tr><td>a</td></tr>",
            "</tbody></table>"
        ));
        assert!(out.contains(r#"<td class="grid">"#));
        assert!(!out.contains(r#"<table class="grid">"#));
    }

    #[test]
    fn test_table_class_row_must_be_single_cell() {
        let out = process(concat!(
            "<table><tbody>",
            r#"<tr><td class="grid"></td><td></td></tr>"#,
            "</tbody></table>"
        ));
        assert!(!out.contains(r#"<table class="grid">"#));
    }

    #[test]
    fn test_img_alt_default() {
        let out = process(r#"<p><img src="a.png"/><img src="b.png" alt="dot"/></p>"#);
        assert!(out.contains(r#"<img src="a.png" alt=""/>"#));
        assert!(out.contains(r#"<img src="b.png" alt="dot"/>"#));
    }

    #[test]
    fn test_rtl_overrides() {
        let (out, _) = process_with("<x-geopad></x-geopad><p>text</p>", "ar");
        assert!(out.contains(r#"<x-geopad dir="ltr">"#));
        assert!(!out.contains(r#"<p dir"#));
    }

    #[test]
    fn test_no_rtl_overrides_for_ltr_locale() {
        let out = process("<x-geopad></x-geopad>");
        assert_eq!(out, "<x-geopad></x-geopad>");
    }

    #[test]
    fn test_reserved_attr_rename() {
        let out = process(r#"<p when="blank-0" delay="2">x</p>"#);
        assert_eq!(out, r#"<p data-when="blank-0" data-delay="2">x</p>"#);
    }

    #[test]
    fn test_fragment_passes_only() {
        let mut warnings = Vec::new();
        let mut doc = Document::parse(r#"<p>{.red} see <code>x</code>.</p>"#, "div").unwrap();
        fragment_passes(&mut doc, &mut warnings);
        let out = doc.inner_html(doc.root());
        assert!(out.contains(r#"<p class="red">"#));
        assert!(out.contains("nowrap"));
    }
}
