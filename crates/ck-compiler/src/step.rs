//! Step assembly.
//!
//! One segment of a course document becomes one [`CompiledStep`] through a
//! fixed pipeline: preprocess the source text, render it to HTML, fill the
//! equation placeholders, run the tree passes, extract goals, and estimate
//! the reading duration. The course assembler consumes the results in
//! document order.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use ck_dom::Document;
use ck_renderer::{
    CourseRenderer, EquationService, RenderOptions, StepMetadata, preprocess, preprocess_fragment,
};
use regex::Regex;

use crate::error::CompileError;
use crate::goals;
use crate::postprocess::{self, RenderCtx};

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w-]+$").expect("invalid id regex"));

/// One fully compiled document segment.
#[derive(Debug)]
pub(crate) struct CompiledStep {
    pub id: String,
    /// Explicit title from the front matter, if any.
    pub title: Option<String>,
    /// Validated explicit section id override.
    pub section_id: Option<String>,
    /// Section title from the `##` heading; starts a new section.
    pub section_title: Option<String>,
    /// Course title from the `#` heading (only meaningful on step 0).
    pub course_title: Option<String>,
    /// Minified step body, rooted at `<x-step>`.
    pub html: String,
    pub goals: Vec<String>,
    pub keywords: Vec<String>,
    /// Estimated reading duration in minutes.
    pub duration: f64,
    pub metadata: StepMetadata,
    /// Glossary ids referenced by this step.
    pub gloss: BTreeSet<String>,
    /// Biography ids referenced by this step.
    pub bios: BTreeSet<String>,
    pub warnings: Vec<String>,
}

/// Validate a declared id against the allowed `[\w-]+` syntax.
///
/// Invalid ids warn and fall back (positional id for steps, slugified
/// title for sections); absent ids fall back silently.
fn check_id(id: Option<&str>, kind: &str, warnings: &mut Vec<String>) -> Option<String> {
    let id = id?;
    if ID_RE.is_match(id) {
        Some(id.to_owned())
    } else {
        warnings.push(format!("invalid {kind} id: {id:?}"));
        None
    }
}

/// Compile one document segment into a step.
pub(crate) fn compile_step(
    source: &str,
    index: usize,
    course_id: &str,
    equations: &EquationService,
    options: &RenderOptions,
) -> Result<CompiledStep, CompileError> {
    let mut warnings = Vec::new();

    let text = preprocess(source, course_id, &mut warnings);
    let result = CourseRenderer::new(equations, options).render(&text);
    warnings.extend(result.warnings);

    let id = check_id(result.metadata.id.as_deref(), "step", &mut warnings)
        .unwrap_or_else(|| format!("step-{index}"));
    let section_id = check_id(result.metadata.section.as_deref(), "section", &mut warnings);

    let html = equations.fill_placeholders(&result.html, &mut warnings);
    let mut doc = Document::parse(&html, "x-step")?;

    postprocess::run_passes(&mut doc, &RenderCtx { equations, options }, &mut warnings);

    let goals = goals::extract_goals(&mut doc, result.metadata.goals.as_deref());
    let word_count = doc.text_content(doc.root()).split_whitespace().count();
    let duration = goals::estimate_duration(word_count, goals.len());

    let root = doc.root();
    doc.set_attr(root, "id", &id);
    doc.set_attr(root, "goals", &goals.join(" "));
    if let Some(class) = &result.metadata.class {
        doc.set_attr(root, "class", class);
    }

    let keywords = result
        .metadata
        .keywords
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_owned)
        .collect();

    Ok(CompiledStep {
        id,
        title: result.metadata.title.clone(),
        section_id,
        section_title: result.section_title,
        course_title: result.course_title,
        html: doc.minified_html(root),
        goals,
        keywords,
        duration,
        metadata: result.metadata,
        gloss: result.gloss,
        bios: result.bios,
        warnings,
    })
}

/// Render a standalone markdown fragment (a localization-file field).
///
/// Runs the same render pipeline as a step, minus metadata handling and
/// the step-only tree passes, and returns minified HTML.
pub(crate) fn render_fragment(
    source: &str,
    equations: &EquationService,
    options: &RenderOptions,
    warnings: &mut Vec<String>,
) -> String {
    let text = preprocess_fragment(source, warnings);
    let result = CourseRenderer::new(equations, options).render(&text);
    warnings.extend(result.warnings);
    let html = equations.fill_placeholders(&result.html, warnings);

    match Document::parse(&html, "body") {
        Ok(mut doc) => {
            postprocess::fragment_passes(&mut doc, warnings);
            doc.minified_inner_html(doc.root())
        }
        Err(e) => {
            warnings.push(format!("invalid fragment markup: {e}"));
            html
        }
    }
}
