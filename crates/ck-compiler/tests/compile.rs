//! End-to-end compilation of a temporary course tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ck_cache::{JsonCache, NullCache};
use ck_compiler::{Compiled, Compiler, CompilerConfig};
use ck_renderer::{TexEngine, TexError};
use serde_json::Value;

/// Engine double that counts how often the backend is consulted.
struct CountingEngine {
    calls: Arc<AtomicUsize>,
}

impl TexEngine for CountingEngine {
    fn render(&self, code: &str, inline: bool) -> Result<String, TexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(r#"<svg class="mathjax" data-inline="{inline}">{code}</svg>"#))
    }
}

fn write(path: PathBuf, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const CIRCLES_EN: &str = "\
# Circles and Pi

## Introduction

> id: intro
> color: \"#b30064\"
> goals: launch

Every [circle](gloss:circle) looks the same, unlike a [tangent](gloss:tangent).
Pick [[42]] to continue.

---

> id: radius

The distance is $r$ and you can pick [[red|blue|green]].

Click [Continue](btn:next) to move on.

---

## Advanced Ideas

> id: deep
> sectionStatus: dev

More things by [Euclid](bio:euclid).
";

const CIRCLES_DE: &str = "\
# Kreise

## Einführung

> id: intro

Ein [Kreis](gloss:circle) ist rund.
";

const POLYGONS_EN: &str = "\
## Basics

Polygons have corners.
";

/// Build the standard fixture tree and return (root, content dir).
fn fixture() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::TempDir::new().unwrap();
    let content = tmp.path().join("content");

    write(content.join("circles/content.md"), CIRCLES_EN);
    write(
        content.join("circles/glossary.yaml"),
        "circle:\n  text: A **round** shape.\n",
    );
    write(
        content.join("circles/bios.yaml"),
        "euclid:\n  name: Euclid\n  bio: Greek mathematician.\n",
    );
    write(content.join("circles/hints.yaml"), "tryAgain: Try again!\n");
    write(content.join("polygons/content.md"), POLYGONS_EN);
    write(
        content.join("shared/glossary.yaml"),
        "square:\n  text: Four equal sides.\n",
    );
    write(content.join("shared/hints.yaml"), "correct: Well done.\n");
    write(
        tmp.path().join("translations/de/circles/content.md"),
        CIRCLES_DE,
    );

    (tmp, content)
}

fn config(root: &Path, content: &Path) -> CompilerConfig {
    CompilerConfig {
        content_dir: content.to_path_buf(),
        output_dir: root.join("output"),
        locales: vec!["en".to_owned(), "de".to_owned()],
        ..CompilerConfig::default()
    }
}

fn counting_compiler(root: &Path, content: &Path) -> (Compiler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = CountingEngine {
        calls: Arc::clone(&calls),
    };
    let cache = JsonCache::with_throttle(root.join("cache"), std::time::Duration::ZERO);
    let compiler = Compiler::new(config(root, content), Box::new(engine), &cache);
    (compiler, calls)
}

fn expect_course(compiled: &Compiled) -> &ck_compiler::Course {
    match compiled {
        Compiled::Course { course, .. } => course,
        other => panic!("expected a compiled course, got {other:?}"),
    }
}

#[test]
fn test_course_assembly() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let compiled = compiler.compile(&content.join("circles"), "en").unwrap();
    let course = expect_course(&compiled);

    assert_eq!(course.id, "circles");
    assert_eq!(course.title, "Circles and Pi");
    assert_eq!(course.color, "#b30064");
    assert_eq!(course.hero, "/content/circles/hero.jpg");
    assert_eq!(course.next_course, "polygons");
    assert_eq!(course.prev_course, "polygons");
    assert_eq!(course.available_locales, vec!["en", "de"]);
    // No description metadata: fall back to the joined section titles.
    assert_eq!(course.description, "Introduction, Advanced Ideas");

    assert_eq!(course.sections.len(), 2);
    let intro = &course.sections[0];
    assert_eq!(intro.id, "introduction");
    assert_eq!(intro.steps, vec!["intro", "radius"]);
    assert_eq!(intro.goals, 4);
    assert_eq!(intro.url, "/course/circles/introduction");
    assert_eq!(intro.locked, None);

    let advanced = &course.sections[1];
    assert_eq!(advanced.id, "advanced-ideas");
    assert_eq!(advanced.locked, Some(true));

    assert_eq!(course.goals, 4);
    assert_eq!(course.steps.len(), 3);
    let radius = &course.steps["radius"];
    assert_eq!(radius["title"], "Radius");
    assert!(radius["duration"].as_f64().unwrap() > 0.0);
    assert_eq!(
        radius["goals"],
        serde_json::json!(["blank-0", "next-0"])
    );
    let html = radius["html"].as_str().unwrap();
    assert!(html.starts_with(r#"<x-step id="radius" goals="blank-0 next-0">"#));
    assert!(html.contains(r#"<svg class="mathjax" data-inline="true">r</svg>"#));
    assert!(html.contains("<x-blank-mc"));
}

#[test]
fn test_section_durations_rounded() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let compiled = compiler.compile(&content.join("circles"), "en").unwrap();
    let course = expect_course(&compiled);
    for section in &course.sections {
        assert!(section.duration >= 5);
        assert_eq!(section.duration % 5, 0);
    }
}

#[test]
fn test_bundles_filtered_and_merged() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let compiled = compiler.compile(&content.join("circles"), "en").unwrap();
    let Compiled::Course {
        course, warnings, ..
    } = &compiled
    else {
        panic!("expected a compiled course");
    };

    let gloss: Value = serde_json::from_str(&course.gloss_json).unwrap();
    assert_eq!(
        gloss["circle"]["text"],
        "<p>A <strong>round</strong> shape.</p>"
    );
    // Unreferenced shared entries are filtered out.
    assert!(gloss.get("square").is_none());
    // Referenced but undefined keys warn.
    assert!(
        warnings
            .iter()
            .any(|w| w.contains("missing glossary keys in circles: tangent"))
    );

    let bios: Value = serde_json::from_str(&course.bios_json).unwrap();
    assert_eq!(bios["euclid"]["bio"], "<p>Greek mathematician.</p>");
    assert_eq!(bios["euclid"]["name"], "Euclid");

    // Hints are unfiltered: course and shared entries merge.
    let hints: Value = serde_json::from_str(&course.hints_json).unwrap();
    assert_eq!(hints["tryAgain"], "<p>Try again!</p>");
    assert_eq!(hints["correct"], "<p>Well done.</p>");
}

#[test]
fn test_locale_compile_with_english_fallback() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let compiled = compiler.compile(&content.join("circles"), "de").unwrap();
    let course = expect_course(&compiled);

    assert_eq!(course.locale, "de");
    assert_eq!(course.title, "Kreise");
    assert_eq!(course.available_locales, vec!["en", "de"]);

    // No German glossary exists, so the English entry fills in.
    let gloss: Value = serde_json::from_str(&course.gloss_json).unwrap();
    assert_eq!(
        gloss["circle"]["text"],
        "<p>A <strong>round</strong> shape.</p>"
    );
}

#[test]
fn test_missing_locale_absent() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let compiled = compiler.compile(&content.join("polygons"), "de").unwrap();
    assert!(matches!(compiled, Compiled::Absent));
}

#[test]
fn test_unchanged_source_short_circuits() {
    let (tmp, content) = fixture();
    let (compiler, calls) = counting_compiler(tmp.path(), &content);

    let first = compiler.compile(&content.join("circles"), "en").unwrap();
    assert!(matches!(first, Compiled::Course { .. }));
    let calls_after_first = calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    // Unchanged source: neither the step pipeline nor the equation
    // backend runs again.
    let second = compiler.compile(&content.join("circles"), "en").unwrap();
    assert!(matches!(second, Compiled::Unchanged { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), calls_after_first);

    // Edited source recompiles.
    write(
        content.join("circles/content.md"),
        &CIRCLES_EN.replace("looks the same", "looks identical"),
    );
    let third = compiler.compile(&content.join("circles"), "en").unwrap();
    assert!(matches!(third, Compiled::Course { .. }));
}

#[test]
fn test_change_cache_survives_restart() {
    let (tmp, content) = fixture();

    {
        let (compiler, _) = counting_compiler(tmp.path(), &content);
        let compiled = compiler.compile(&content.join("circles"), "en").unwrap();
        assert!(matches!(compiled, Compiled::Course { .. }));
        compiler.flush();
    }

    // A fresh compiler over the same cache directory sees the hash.
    let (compiler, calls) = counting_compiler(tmp.path(), &content);
    let compiled = compiler.compile(&content.join("circles"), "en").unwrap();
    assert!(matches!(compiled, Compiled::Unchanged { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_idempotent_output() {
    let (tmp, content) = fixture();
    let compiler = Compiler::new(
        config(tmp.path(), &content),
        Box::new(ck_renderer::NullEngine),
        &NullCache,
    );

    let first = compiler.compile(&content.join("circles"), "en").unwrap();
    let second = compiler.compile(&content.join("circles"), "en").unwrap();
    let (first, second) = (expect_course(&first), expect_course(&second));
    assert_eq!(
        serde_json::to_string(first).unwrap(),
        serde_json::to_string(second).unwrap()
    );
}

#[test]
fn test_missing_section_title_fatal() {
    let tmp = tempfile::TempDir::new().unwrap();
    let content = tmp.path().join("content");
    write(
        content.join("broken/content.md"),
        "Just text, no section heading.\n",
    );

    let (compiler, _) = counting_compiler(tmp.path(), &content);
    let result = compiler.compile(&content.join("broken"), "en");
    assert!(matches!(
        result,
        Err(ck_compiler::CompileError::MissingSectionTitle { .. })
    ));

    // The failure is not cached: the next run tries again.
    let again = compiler.compile(&content.join("broken"), "en");
    assert!(again.is_err());
}

#[test]
fn test_compile_all_writes_artifacts() {
    let (tmp, content) = fixture();
    let (compiler, _) = counting_compiler(tmp.path(), &content);

    let outcomes = compiler.compile_all();
    assert_eq!(outcomes.len(), 4);
    for outcome in &outcomes {
        match (outcome.course_id.as_str(), outcome.locale.as_str()) {
            ("polygons", "de") => {
                assert!(matches!(outcome.result, Ok(Compiled::Absent)));
            }
            _ => assert!(
                matches!(outcome.result, Ok(Compiled::Course { .. })),
                "unexpected outcome for {}/{}",
                outcome.course_id,
                outcome.locale
            ),
        }
    }

    let output = tmp.path().join("output");
    assert!(output.join("circles/data_en.json").is_file());
    assert!(output.join("circles/data_de.json").is_file());
    assert!(output.join("polygons/data_en.json").is_file());
    assert!(!output.join("polygons/data_de.json").exists());

    let artifact: Value = serde_json::from_str(
        &fs::read_to_string(output.join("circles/data_en.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(artifact["id"], "circles");
    assert_eq!(artifact["sections"][0]["id"], "introduction");

    // Only unlocked English sections feed the sitemap.
    let urls = compiler.course_urls();
    assert!(urls.contains(&"/course/circles/introduction".to_owned()));
    assert!(urls.contains(&"/course/polygons/basics".to_owned()));
    assert!(!urls.contains(&"/course/circles/advanced-ideas".to_owned()));
}
