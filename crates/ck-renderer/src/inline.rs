//! Inline text rewriting.
//!
//! Pure text→text substitutions applied to paragraph, list-item, and
//! table-cell bodies after markdown inline rendering. The order is fixed:
//! blanks first (their contents must not be equation-scanned), then
//! equations, variables, unescaping, and emoji. Each pass emits markup the
//! later passes cannot re-match.

use std::sync::LazyLock;

use ck_dom::{entities, escape_attr};
use regex::{Captures, Regex};

use crate::equation::EquationService;
use crate::preprocess::{BLANK_SEPARATOR, DOLLAR_SENTINEL};

static BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("invalid blank regex"));

static BLANK_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^(]+)(?:\((.*)\))?\s*$").expect("invalid hint regex"));

static EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-zA-Z0-9_+-]+):").expect("invalid emoji regex"));

/// Run all inline rewriting passes over one text body.
pub fn rewrite(text: &str, equations: &EquationService, emoji_url: &str) -> String {
    let text = rewrite_blanks(text);
    let text = rewrite_equations(&text, equations);
    let text = rewrite_variables(&text);
    let text = unescape(&text);
    rewrite_emoji(&text, emoji_url)
}

/// `[[answer]]` → single-answer blank, `[[a|b|c]]` → multiple choice.
///
/// A parenthesized suffix on a single answer becomes its hint.
fn rewrite_blanks(text: &str) -> String {
    BLANK_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let choices: Vec<&str> = body.split(BLANK_SEPARATOR).collect();

            if let [single] = choices.as_slice() {
                let (value, hint) = match BLANK_HINT_RE.captures(single) {
                    Some(caps) => (
                        caps.get(1).map_or("", |m| m.as_str()).trim_end().to_owned(),
                        caps.get(2).map(|m| m.as_str().to_owned()),
                    ),
                    None => (single.trim_end().to_owned(), None),
                };
                let hint_attr = hint
                    .map(|h| format!(r#" hint="{}""#, escape_attr(&h)))
                    .unwrap_or_default();
                format!(
                    r#"<x-blank solution="{}"{hint_attr}></x-blank>"#,
                    escape_attr(&value)
                )
            } else {
                let buttons: String = choices
                    .iter()
                    .map(|c| format!(r#"<button class="choice">{c}</button>"#))
                    .collect();
                format!("<x-blank-mc>{buttons}</x-blank-mc>")
            }
        })
        .into_owned()
}

/// `$...$` → inline equation placeholder.
///
/// The opening `$` must not be followed by `{` (that form is a variable)
/// and the closing `$` must not be followed by a word character (so
/// currency amounts survive). Escaped dollars were parked in a sentinel
/// by the preprocessor and never reach this scan.
fn rewrite_equations(text: &str, equations: &EquationService) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after_open = &rest[pos + 1..];

        if after_open.starts_with('{') {
            out.push('$');
            rest = after_open;
            continue;
        }

        let matched = after_open.find('$').and_then(|close| {
            let body = &after_open[..close];
            let next = after_open[close + 1..].chars().next();
            let word_follows = next.is_some_and(|c| c.is_alphanumeric() || c == '_');
            (!body.is_empty() && !body.contains('\n') && !word_follows)
                .then(|| (body, close))
        });

        match matched {
            Some((body, close)) => {
                out.push_str(&equations.placeholder(&entities::decode(body), true));
                rest = &after_open[close + 1..];
            }
            None => {
                out.push('$');
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `${name}{binding}` → bound variable, `${name}` → variable display.
///
/// A single left-to-right scan, so emitted markup is never re-matched.
fn rewrite_variables(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let Some(name_end) = after.find('}') else {
            out.push_str("${");
            rest = after;
            continue;
        };
        let name = &after[..name_end];
        let after_name = &after[name_end + 1..];

        if let Some(binding_body) = after_name.strip_prefix('{')
            && let Some(binding_end) = binding_body.find('}')
        {
            let binding = &binding_body[..binding_end];
            out.push_str(&format!(
                r#"<x-var bind="{}">${{{name}}}</x-var>"#,
                escape_attr(binding)
            ));
            rest = &binding_body[binding_end + 1..];
        } else {
            out.push_str(&format!(r#"<span class="var">${{{name}}}</span>"#));
            rest = after_name;
        }
    }
    out.push_str(rest);
    out
}

/// Restore escaped spaces and dollars.
fn unescape(text: &str) -> String {
    text.replace("\\ ", "&nbsp;")
        .replace(DOLLAR_SENTINEL, "$")
}

/// `:name:` → emoji image.
fn rewrite_emoji(text: &str, emoji_url: &str) -> String {
    EMOJI_RE
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            format!(
                r#"<img class="emoji" width="20" height="20" src="{emoji_url}/{name}.png" alt="{name}"/>"#
            )
        })
        .into_owned()
}
