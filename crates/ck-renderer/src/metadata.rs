//! Step metadata from blockquote front matter.
//!
//! Authors attach metadata to a step with a `>` blockquote holding YAML
//! key-value pairs. Several blockquotes may appear in one step; later
//! values override earlier ones field by field.

use serde::Deserialize;

/// Metadata declared in a step's blockquote front matter.
///
/// All fields are optional; unknown keys are ignored. Course-level fields
/// (`color`, `author`, ...) only take effect on the first step of a
/// document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepMetadata {
    /// Stable step id (falls back to `step-N`).
    pub id: Option<String>,
    /// Step title (falls back to a title-cased id).
    pub title: Option<String>,
    /// Explicit section id override.
    pub section: Option<String>,
    /// Section background image.
    pub section_background: Option<String>,
    /// `dev` marks the section as locked / under development.
    pub section_status: Option<String>,
    /// `auto` marks the section as machine-translated.
    pub translated: Option<String>,
    /// Section URL override.
    pub url: Option<String>,
    /// Space-separated custom goal ids.
    pub goals: Option<String>,
    /// Extra classes for the step element.
    pub class: Option<String>,
    /// Space-separated search keywords.
    pub keywords: Option<String>,
    /// Course description (first step only).
    pub description: Option<String>,
    /// Course accent color (first step only).
    pub color: Option<String>,
    /// Course trailer video (first step only).
    pub trailer: Option<String>,
    /// Course author (first step only).
    pub author: Option<String>,
    /// Course difficulty level (first step only).
    pub level: Option<String>,
    /// Course icon image (first step only).
    pub icon: Option<String>,
    /// Course hero image (first step only).
    pub hero: Option<String>,
    /// Next course override (first step only).
    pub next: Option<String>,
    /// Previous course override (first step only).
    pub prev: Option<String>,
}

impl StepMetadata {
    /// Parse metadata from YAML blockquote text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Merge `other` into `self`, with `other`'s values winning.
    pub fn merge(&mut self, other: Self) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            id, title, section, section_background, section_status, translated, url, goals, class,
            keywords, description, color, trailer, author, level, icon, hero, next, prev
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let meta = StepMetadata::from_yaml("id: intro\ngoals: circle-draw").unwrap();
        assert_eq!(meta.id.as_deref(), Some("intro"));
        assert_eq!(meta.goals.as_deref(), Some("circle-draw"));
        assert_eq!(meta.section, None);
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let meta =
            StepMetadata::from_yaml("sectionStatus: dev\nsectionBackground: dark").unwrap();
        assert_eq!(meta.section_status.as_deref(), Some("dev"));
        assert_eq!(meta.section_background.as_deref(), Some("dark"));
    }

    #[test]
    fn test_parse_unknown_keys_ignored() {
        let meta = StepMetadata::from_yaml("id: x\ncustomThing: 3").unwrap();
        assert_eq!(meta.id.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(StepMetadata::from_yaml("id: [unclosed").is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut meta = StepMetadata::from_yaml("id: a\ntitle: First").unwrap();
        let other = StepMetadata::from_yaml("title: Second\ngoals: g1").unwrap();
        meta.merge(other);
        assert_eq!(meta.id.as_deref(), Some("a"));
        assert_eq!(meta.title.as_deref(), Some("Second"));
        assert_eq!(meta.goals.as_deref(), Some("g1"));
    }
}
