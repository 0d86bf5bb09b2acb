use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DESCRIPTOR_FILE: &str = "pom.xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl Coordinates {
    /// Filesystem-safe identifier for this build.
    pub fn slug(&self) -> String {
        format!("{}_{}_{}", self.group_id, self.artifact_id, self.version)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Coordinates {
            group_id: "unknown".to_string(),
            artifact_id: "unknown".to_string(),
            version: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    pub root: PathBuf,
    pub coordinates: Coordinates,
    pub class_dirs: Vec<PathBuf>,
    pub test_class_dirs: Vec<PathBuf>,
    pub source_roots: Vec<PathBuf>,
    pub test_source_roots: Vec<PathBuf>,
    pub resource_roots: Vec<PathBuf>,
    pub test_resource_roots: Vec<PathBuf>,
}

impl ProjectDescriptor {
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let source_root = root.join("src").join("main").join("java");
        let descriptor = root.join(DESCRIPTOR_FILE);
        if !descriptor.is_file() && !source_root.is_dir() {
            return Err(ConfigError::NotAProject(root.to_path_buf()));
        }
        let coordinates = fs::read_to_string(&descriptor)
            .ok()
            .and_then(|xml| read_coordinates(&xml))
            .unwrap_or_default();

        Ok(ProjectDescriptor {
            root: root.to_path_buf(),
            coordinates,
            class_dirs: vec![root.join("target").join("classes")],
            test_class_dirs: vec![root.join("target").join("test-classes")],
            source_roots: vec![source_root],
            test_source_roots: vec![root.join("src").join("test").join("java")],
            resource_roots: vec![root.join("src").join("main").join("resources")],
            test_resource_roots: vec![root.join("src").join("test").join("resources")],
        })
    }

    /// Production classes, compiled output first, sources as fallback.
    pub fn classes(&self) -> Vec<String> {
        discover_names(&self.class_dirs, &self.source_roots)
    }

    pub fn test_classes(&self) -> Vec<String> {
        discover_names(&self.test_class_dirs, &self.test_source_roots)
    }
}

#[derive(Debug, Deserialize)]
struct PomHead {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    parent: Option<PomParent>,
}

#[derive(Debug, Deserialize)]
struct PomParent {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    version: Option<String>,
}

/// Project coordinates, inheriting group and version from `<parent>`.
pub fn read_coordinates(pom: &str) -> Option<Coordinates> {
    let head: PomHead = quick_xml::de::from_str(pom).ok()?;
    let parent = head.parent.as_ref();
    Some(Coordinates {
        group_id: head
            .group_id
            .or_else(|| parent.and_then(|p| p.group_id.clone()))
            .unwrap_or_else(|| "unknown".to_string()),
        artifact_id: head.artifact_id?,
        version: head
            .version
            .or_else(|| parent.and_then(|p| p.version.clone()))
            .unwrap_or_else(|| "0".to_string()),
    })
}

fn discover_names(compiled: &[PathBuf], sources: &[PathBuf]) -> Vec<String> {
    let mut names = Vec::new();
    for dir in compiled.iter().filter(|d| d.is_dir()) {
        collect_names(dir, dir, "class", &mut names);
    }
    if names.is_empty() {
        for dir in sources.iter().filter(|d| d.is_dir()) {
            collect_names(dir, dir, "java", &mut names);
        }
    }
    names.sort();
    names.dedup();
    names
}

fn collect_names(root: &Path, dir: &Path, ext: &str, names: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_names(root, &path, ext, names);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.contains('$') || stem == "module-info" || stem == "package-info" {
            continue;
        }
        if let Some(name) = class_name_for(root, &path) {
            names.push(name);
        }
    }
}

fn class_name_for(root: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("."))
}
