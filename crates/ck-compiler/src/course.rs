//! Course assembly.
//!
//! Joins the compiled steps of one document back into the Course artifact:
//! section grouping, course-level metadata with documented defaults,
//! localization bundles, and the change-cache short circuit. Course
//! metadata comes exclusively from the first step's front matter; section
//! grouping depends on original document order, which is why step results
//! are collected by index rather than completion order.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use md5::{Digest, Md5};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::error::CompileError;
use crate::step::{self, CompiledStep};
use crate::{Compiler, dir_name, is_course_dir_name, locale};

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n---+\r?\n").expect("invalid segment regex"));

const DEFAULT_COLOR: &str = "#2274e8";
const DEFAULT_TITLE: &str = "Untitled Course";

/// One step record of the course artifact.
#[derive(Clone, Debug, Serialize)]
pub struct StepRecord {
    /// Stable step id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Minified step body, rooted at `<x-step>`.
    pub html: String,
    /// Ordered goal ids.
    pub goals: Vec<String>,
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Estimated reading duration in minutes.
    pub duration: f64,
}

/// A contiguous run of steps sharing one `##` heading.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Slug from the title, or the explicit `section:` override.
    pub id: String,
    /// Heading text, backslash escapes stripped.
    pub title: String,
    /// Background image from `sectionBackground:`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Set when the section is under development (`sectionStatus: dev`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    /// Set when the section was machine-translated (`translated: auto`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_translated: Option<bool>,
    /// Routing target.
    pub url: String,
    /// Ordered step ids.
    pub steps: Vec<String>,
    /// Total goal count over all steps.
    pub goals: usize,
    /// Total duration in minutes, rounded up to a multiple of 5.
    pub duration: u64,
}

/// The compiled course artifact for one (course, locale) pair.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Course id (the directory name).
    pub id: String,
    /// Locale this artifact was compiled for.
    pub locale: String,
    /// Next course id (metadata override or alphabetically adjacent).
    pub next_course: String,
    /// Previous course id.
    pub prev_course: String,
    /// Course title from the `#` heading.
    pub title: String,
    /// Description, falling back to the joined section titles.
    pub description: String,
    /// Accent color.
    pub color: String,
    /// Trailer video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<String>,
    /// Author name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Difficulty level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Icon image path, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Hero image path.
    pub hero: String,
    /// Total goal count over all steps.
    pub goals: usize,
    /// Sections in document order.
    pub sections: Vec<Section>,
    /// Step records keyed by step id.
    pub steps: serde_json::Map<String, serde_json::Value>,
    /// Locales for which a source document exists on disk.
    pub available_locales: Vec<String>,
    /// Pre-serialized biography bundle.
    #[serde(rename = "biosJSON")]
    pub bios_json: String,
    /// Pre-serialized glossary bundle.
    #[serde(rename = "glossJSON")]
    pub gloss_json: String,
    /// Pre-serialized hints bundle.
    #[serde(rename = "hintsJSON")]
    pub hints_json: String,
}

/// Outcome of compiling one (course, locale) pair.
#[derive(Debug)]
pub enum Compiled {
    /// No source document exists for this locale.
    Absent,
    /// The source hash matches the change cache; the previous artifact is
    /// still valid.
    Unchanged {
        /// Path of the unchanged source file.
        src_file: PathBuf,
    },
    /// A freshly compiled course.
    Course {
        /// The compiled artifact.
        course: Box<Course>,
        /// Path of the source file.
        src_file: PathBuf,
        /// Recoverable problems encountered along the way.
        warnings: Vec<String>,
    },
}

impl Compiler {
    /// Compile one course directory for one locale.
    ///
    /// Returns [`Compiled::Absent`] when no source document exists for the
    /// locale and [`Compiled::Unchanged`] when the content hash matches
    /// the change cache. Steps compile in parallel; their results are
    /// joined in document order.
    pub fn compile(&self, course_dir: &Path, locale: &str) -> Result<Compiled, CompileError> {
        let course_id = dir_name(course_dir);
        let src_file = locale::resolve_path(course_dir, "content.md", locale);
        let Ok(content) = fs::read_to_string(&src_file) else {
            // Missing translations are expected; locale availability is
            // probed per locale against the same paths.
            return Ok(Compiled::Absent);
        };

        let hash = text_hash(&content);
        let cache_key = format!("{course_id}-{locale}");
        if self.changes.get(&cache_key).as_deref() == Some(hash.as_str()) {
            tracing::debug!(course = %course_id, locale, "source unchanged, skipping");
            return Ok(Compiled::Unchanged { src_file });
        }

        let options = self.config.render_options(locale);
        let segments: Vec<&str> = SEGMENT_RE.split(&content).collect();
        let steps = segments
            .par_iter()
            .enumerate()
            .map(|(index, segment)| {
                step::compile_step(segment, index, &course_id, &self.equations, &options)
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        let (course, warnings) = self.assemble(course_dir, &course_id, locale, &steps)?;
        for warning in &warnings {
            tracing::warn!(course = %course_id, locale, "{warning}");
        }

        self.changes.set(&cache_key, &hash);
        Ok(Compiled::Course {
            course: Box::new(course),
            src_file,
            warnings,
        })
    }

    fn assemble(
        &self,
        course_dir: &Path,
        course_id: &str,
        locale: &str,
        steps: &[CompiledStep],
    ) -> Result<(Course, Vec<String>), CompileError> {
        let missing_section = || CompileError::MissingSectionTitle {
            course_id: course_id.to_owned(),
            locale: locale.to_owned(),
        };
        let Some(first) = steps.first() else {
            return Err(missing_section());
        };

        let mut warnings = Vec::new();
        let mut gloss = BTreeSet::new();
        let mut bios = BTreeSet::new();
        for step in steps {
            warnings.extend(step.warnings.iter().cloned());
            gloss.extend(step.gloss.iter().cloned());
            bios.extend(step.bios.iter().cloned());
        }

        let mut sections: Vec<Section> = Vec::new();
        let mut durations: Vec<f64> = Vec::new();
        let mut step_map = serde_json::Map::new();
        let mut total_goals = 0;

        for step in steps {
            if step_map.contains_key(&step.id) {
                warnings.push(format!("duplicate step id: {}", step.id));
            }
            total_goals += step.goals.len();

            if let Some(section_title) = &step.section_title {
                let section_id = step
                    .section_id
                    .clone()
                    .unwrap_or_else(|| slugify(section_title));
                let url = step
                    .metadata
                    .url
                    .clone()
                    .unwrap_or_else(|| format!("/course/{course_id}/{section_id}"));
                sections.push(Section {
                    id: section_id,
                    title: section_title.replace('\\', ""),
                    background: step.metadata.section_background.clone(),
                    locked: (step.metadata.section_status.as_deref() == Some("dev"))
                        .then_some(true),
                    auto_translated: (step.metadata.translated.as_deref() == Some("auto"))
                        .then_some(true),
                    url,
                    steps: Vec::new(),
                    goals: 0,
                    duration: 0,
                });
                durations.push(0.0);
            }

            let Some(section) = sections.last_mut() else {
                return Err(missing_section());
            };
            section.steps.push(step.id.clone());
            section.goals += step.goals.len();
            if let Some(duration) = durations.last_mut() {
                *duration += step.duration;
            }

            let record = StepRecord {
                id: step.id.clone(),
                title: step
                    .title
                    .clone()
                    .unwrap_or_else(|| default_step_title(&step.id)),
                html: step.html.clone(),
                goals: step.goals.clone(),
                keywords: step.keywords.clone(),
                duration: step.duration,
            };
            step_map.insert(step.id.clone(), serde_json::to_value(record)?);
        }

        for (section, raw) in sections.iter_mut().zip(&durations) {
            section.duration = round_duration(*raw);
        }

        let description = first
            .metadata
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| {
                sections
                    .iter()
                    .map(|s| s.title.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            });

        let available_locales = self
            .config
            .locales
            .iter()
            .filter(|l| locale::resolve_path(course_dir, "content.md", l.as_str()).is_file())
            .cloned()
            .collect();

        let icon = match &first.metadata.icon {
            Some(icon) => Some(format!("/content/{course_id}/{icon}")),
            None if course_dir.join("icon.png").is_file() => {
                Some(format!("/content/{course_id}/icon.png"))
            }
            None => None,
        };

        let gloss_json = self.bundle("glossary.yaml", course_dir, locale, Some(&gloss), &mut warnings);
        let bios_json = self.bundle("bios.yaml", course_dir, locale, Some(&bios), &mut warnings);
        let hints_json = self.bundle("hints.yaml", course_dir, locale, None, &mut warnings);

        if locale == "en" {
            let mut urls = self.course_urls.lock().expect("course urls poisoned");
            for section in sections.iter().filter(|s| s.locked.is_none()) {
                urls.insert(section.url.clone());
            }
        }

        let course = Course {
            id: course_id.to_owned(),
            locale: locale.to_owned(),
            next_course: first
                .metadata
                .next
                .clone()
                .unwrap_or_else(|| adjacent_course(course_dir, 1)),
            prev_course: first
                .metadata
                .prev
                .clone()
                .unwrap_or_else(|| adjacent_course(course_dir, -1)),
            title: first
                .course_title
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
            description,
            color: first
                .metadata
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_COLOR.to_owned()),
            trailer: first.metadata.trailer.clone(),
            author: first.metadata.author.clone(),
            level: first.metadata.level.clone(),
            icon,
            hero: format!(
                "/content/{course_id}/{}",
                first.metadata.hero.as_deref().unwrap_or("hero.jpg")
            ),
            goals: total_goals,
            sections,
            steps: step_map,
            available_locales,
            bios_json,
            gloss_json,
            hints_json,
        };
        Ok((course, warnings))
    }
}

/// Hex MD5 fingerprint of one source document.
fn text_hash(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

/// Lowercased, dash-separated slug of a section title.
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Title-case a step id, dropping dashes and trailing digits.
fn default_step_title(id: &str) -> String {
    id.trim_end_matches(|c: char| c.is_ascii_digit())
        .split(['-', ' '])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Round a raw duration up to the next multiple of 5 minutes, floor 5.
fn round_duration(minutes: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = (minutes / 5.0).ceil() as u64 * 5;
    rounded.max(5)
}

/// The alphabetically adjacent course directory, with wraparound.
fn adjacent_course(course_dir: &Path, shift: isize) -> String {
    let course_id = dir_name(course_dir);
    let Some(parent) = course_dir.parent() else {
        return course_id;
    };
    let Ok(entries) = fs::read_dir(parent) else {
        return course_id;
    };
    let mut all: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| is_course_dir_name(name))
        .collect();
    all.sort();

    let len = all.len();
    let Some(position) = all.iter().position(|c| *c == course_id) else {
        return course_id;
    };
    let index = (position + len)
        .checked_add_signed(shift)
        .unwrap_or(position + len)
        % len;
    all[index].clone()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_text_hash_stable() {
        assert_eq!(text_hash("abc"), text_hash("abc"));
        assert_ne!(text_hash("abc"), text_hash("abd"));
        assert_eq!(text_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Triangles and Angles"), "triangles-and-angles");
        assert_eq!(slugify("Euler's Formula!"), "eulers-formula");
    }

    #[test]
    fn test_default_step_title() {
        assert_eq!(default_step_title("circle-area"), "Circle Area");
        assert_eq!(default_step_title("step-12"), "Step");
        assert_eq!(default_step_title("intro"), "Intro");
    }

    #[test]
    fn test_round_duration() {
        assert_eq!(round_duration(0.0), 5);
        assert_eq!(round_duration(4.2), 5);
        assert_eq!(round_duration(7.0), 10);
        assert_eq!(round_duration(12.0), 15);
        assert_eq!(round_duration(15.0), 15);
    }

    #[test]
    fn test_adjacent_course() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["circles", "polygons", "shared", "_drafts", "probability"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }

        let circles = tmp.path().join("circles");
        assert_eq!(adjacent_course(&circles, 1), "polygons");
        // Wraparound skips shared/ and underscore-prefixed directories.
        assert_eq!(adjacent_course(&circles, -1), "probability");

        let probability = tmp.path().join("probability");
        assert_eq!(adjacent_course(&probability, 1), "circles");
    }
}
