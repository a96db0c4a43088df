//! Localization bundles.
//!
//! Each course carries three companion YAML files (glossary, biographies,
//! hints) whose markdown-valued fields are rendered to HTML independently
//! of the course text. Entries resolve through three layers, most specific
//! first: the locale file, its English fallback, and the cross-course
//! `shared` directory. Parsed files are memoized per resolved path, so
//! repeated lookups across courses and locales never re-read disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{Compiler, dir_name, step};

/// Which part of each entry holds markdown.
enum MdField {
    /// Every top-level value is markdown (hints).
    All,
    /// One named subfield is markdown (glossary `text`, bios `bio`).
    Named(&'static str),
}

fn md_field(file: &str) -> MdField {
    match file {
        "glossary.yaml" => MdField::Named("text"),
        "bios.yaml" => MdField::Named("bio"),
        _ => MdField::All,
    }
}

/// Resolve the locale-specific path of a course file.
///
/// English files live in the course directory itself; other locales in
/// the sibling `translations/<locale>/<courseId>/` tree.
pub(crate) fn resolve_path(dir: &Path, file: &str, locale: &str) -> PathBuf {
    if locale == "en" {
        return dir.join(file);
    }
    dir.join("../../translations")
        .join(locale)
        .join(dir_name(dir))
        .join(file)
}

impl Compiler {
    /// Merge the course and shared YAML for `file` into a JSON string.
    ///
    /// With a `filter`, only the referenced keys are retained; keys found
    /// in neither layer are reported (for English, where the content is
    /// authored).
    pub(crate) fn bundle(
        &self,
        file: &str,
        dir: &Path,
        locale: &str,
        filter: Option<&BTreeSet<String>>,
        warnings: &mut Vec<String>,
    ) -> String {
        let course = self.parse_yaml(dir, file, locale, warnings);
        let shared_dir = dir
            .parent()
            .map_or_else(|| PathBuf::from("shared"), |p| p.join("shared"));
        let shared = self.parse_yaml(&shared_dir, file, locale, warnings);

        let mut result = Map::new();
        match filter {
            None => {
                for (key, value) in shared {
                    result.insert(key, value);
                }
                for (key, value) in course {
                    result.insert(key, value);
                }
            }
            Some(keys) => {
                let mut missing = Vec::new();
                for key in keys {
                    match course.get(key).or_else(|| shared.get(key)) {
                        Some(value) => {
                            result.insert(key.clone(), value.clone());
                        }
                        None => missing.push(key.as_str()),
                    }
                }
                if locale == "en" && !missing.is_empty() {
                    let name = file.split('.').next().unwrap_or(file);
                    warnings.push(format!(
                        "missing {name} keys in {}: {}",
                        dir_name(dir),
                        missing.join(", ")
                    ));
                }
            }
        }
        serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_owned())
    }

    /// Load one YAML file with markdown fields rendered, memoized per
    /// path, merged over its English fallback for non-English locales.
    fn parse_yaml(
        &self,
        dir: &Path,
        file: &str,
        locale: &str,
        warnings: &mut Vec<String>,
    ) -> Map<String, Value> {
        let src = resolve_path(dir, file, locale);
        if let Some(cached) = self
            .yaml_memo
            .lock()
            .expect("yaml memo poisoned")
            .get(&src)
        {
            return cached.clone();
        }

        let mut data = self.load_rendered_yaml(&src, &md_field(file), warnings);
        if locale != "en" {
            let mut merged = self.parse_yaml(dir, file, "en", warnings);
            for (key, value) in data {
                merged.insert(key, value);
            }
            data = merged;
        }

        self.yaml_memo
            .lock()
            .expect("yaml memo poisoned")
            .insert(src, data.clone());
        data
    }

    fn load_rendered_yaml(
        &self,
        path: &Path,
        field: &MdField,
        warnings: &mut Vec<String>,
    ) -> Map<String, Value> {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Map::new();
        };
        let parsed: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(format!("invalid YAML in {}: {e}", path.display()));
                return Map::new();
            }
        };
        match serde_json::to_value(parsed) {
            Ok(Value::Object(entries)) => entries
                .into_iter()
                .map(|(key, value)| (key, self.render_entry(value, field, warnings)))
                .collect(),
            Ok(Value::Null) => Map::new(),
            Ok(_) | Err(_) => {
                warnings.push(format!(
                    "expected a top-level mapping in {}",
                    path.display()
                ));
                Map::new()
            }
        }
    }

    fn render_entry(&self, value: Value, field: &MdField, warnings: &mut Vec<String>) -> Value {
        match field {
            MdField::All => match value {
                Value::String(text) => Value::String(self.render_md(&text, warnings)),
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(text) => {
                                Value::String(self.render_md(&text, warnings))
                            }
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            },
            MdField::Named(name) => {
                let mut value = value;
                if let Value::Object(entry) = &mut value {
                    let source = entry
                        .get(*name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned();
                    entry.insert(
                        (*name).to_owned(),
                        Value::String(self.render_md(&source, warnings)),
                    );
                }
                value
            }
        }
    }

    fn render_md(&self, source: &str, warnings: &mut Vec<String>) -> String {
        step::render_fragment(source, &self.equations, &self.fragment_options, warnings)
    }
}
