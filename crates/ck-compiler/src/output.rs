//! Artifact output.
//!
//! A compiled course is serialized to `<output>/<courseId>/data_<locale>.json`.
//! The write goes through a temporary file in the target directory followed
//! by a rename, so a crashed run never leaves a partial artifact behind and
//! the previous artifact stays valid until the new one is complete.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::course::Course;
use crate::error::CompileError;

/// Atomically write the course artifact, returning its path.
pub fn write_course(course: &Course, output_dir: &Path) -> Result<PathBuf, CompileError> {
    let dir = output_dir.join(&course.id);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("data_{}.json", course.locale));

    let json = serde_json::to_string(course)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(&path).map_err(|e| CompileError::Io(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn sample_course() -> Course {
        Course {
            id: "circles".to_owned(),
            locale: "en".to_owned(),
            next_course: "polygons".to_owned(),
            prev_course: "polygons".to_owned(),
            title: "Circles".to_owned(),
            description: "Introduction".to_owned(),
            color: "#2274e8".to_owned(),
            trailer: None,
            author: None,
            level: None,
            icon: None,
            hero: "/content/circles/hero.jpg".to_owned(),
            goals: 0,
            sections: Vec::new(),
            steps: serde_json::Map::new(),
            available_locales: vec!["en".to_owned()],
            bios_json: "{}".to_owned(),
            gloss_json: "{}".to_owned(),
            hints_json: "{}".to_owned(),
        }
    }

    #[test]
    fn test_write_course() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_course(&sample_course(), tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("circles/data_en.json"));

        let json: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["id"], "circles");
        assert_eq!(json["nextCourse"], "polygons");
        // Absent optional fields are omitted from the artifact.
        assert!(json.get("trailer").is_none());
    }

    #[test]
    fn test_write_course_overwrites() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut course = sample_course();
        write_course(&course, tmp.path()).unwrap();

        course.title = "Circles and Pi".to_owned();
        let path = write_course(&course, tmp.path()).unwrap();
        let json: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["title"], "Circles and Pi");
    }
}
