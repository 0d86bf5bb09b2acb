use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::PackagingError;
use crate::partition::Partition;
use crate::project::{Coordinates, DESCRIPTOR_FILE, ProjectDescriptor};

pub const PATH_SUFFIX: &str = ".path";
pub const ENCODED_SUFFIX: &str = ".b64";
const SIDECAR_SUFFIXES: &[&str] = &[PATH_SUFFIX, ENCODED_SUFFIX];
/// Keys under this prefix carry run metadata, never files.
pub const CONTROL_PREFIX: &str = "mutfleet.";
pub const TARGET_CLASSES_KEY: &str = "mutfleet.targetClasses";
pub const TARGET_TESTS_KEY: &str = "mutfleet.targetTests";
pub const COORDINATES_KEY: &str = "mutfleet.coordinates";

const CODE_EXTENSIONS: &[&str] = &["java", "kt", "groovy"];

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".gradle",
    ".mvn",
    ".mutfleet",
    "target",
    "build",
    "out",
    "node_modules",
];

/// Legacy key prefixes, used only when a content key has no sidecar.
const LEGACY_ROOTS: &[(&str, &str)] = &[
    ("src_main_java_", "src/main/java"),
    ("src_test_java_", "src/test/java"),
    ("src_main_resources_", "src/main/resources"),
    ("src_test_resources_", "src/test/resources"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Code,
    Resource,
}

/// Flat key→text map shipped to one execution unit. Keys stay within
/// `[-._a-zA-Z0-9]`; the real path rides in a `<key>.path` sidecar and
/// non-UTF-8 content is base64 with a `<key>.b64` marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceChannel {
    entries: BTreeMap<String, String>,
}

impl SourceChannel {
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        SourceChannel { entries }
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Store `content` for `rel_path`, returning the key used.
    pub fn insert_file(&mut self, rel_path: &str, content: String) -> String {
        let base = transport_key(rel_path);
        let mut key = base.clone();
        let mut n = 1;
        while self.key_taken(&key) {
            key = format!("{base}-{n}");
            n += 1;
        }
        self.entries.insert(format!("{key}{PATH_SUFFIX}"), rel_path.to_string());
        self.entries.insert(key.clone(), content);
        key
    }

    /// Store raw bytes for `rel_path`, base64-encoded and marked as such.
    pub fn insert_binary(&mut self, rel_path: &str, bytes: &[u8]) -> String {
        let key = self.insert_file(rel_path, STANDARD.encode(bytes));
        self.entries.insert(format!("{key}{ENCODED_SUFFIX}"), "base64".to_string());
        key
    }

    pub fn insert_control(&mut self, name: &str, value: String) {
        self.entries.insert(format!("{CONTROL_PREFIX}{name}"), value);
    }

    fn key_taken(&self, key: &str) -> bool {
        self.entries.contains_key(key)
            || SIDECAR_SUFFIXES
                .iter()
                .any(|suffix| self.entries.contains_key(&format!("{key}{suffix}")))
            || self.is_sidecar(key)
    }

    fn is_sidecar(&self, key: &str) -> bool {
        SIDECAR_SUFFIXES.iter().any(|suffix| {
            key.strip_suffix(suffix)
                .is_some_and(|stem| self.entries.contains_key(stem))
        })
    }

    /// Content keys with their destination sidecar and decoded bytes.
    fn files(&self) -> Result<Vec<(&str, Option<&str>, Vec<u8>)>, PackagingError> {
        self.entries
            .iter()
            .filter(|(k, _)| !k.starts_with(CONTROL_PREFIX) && !self.is_sidecar(k))
            .map(|(k, v)| {
                let sidecar = self.get(&format!("{k}{PATH_SUFFIX}"));
                let bytes = if self.entries.contains_key(&format!("{k}{ENCODED_SUFFIX}")) {
                    STANDARD.decode(v.trim()).map_err(|e| PackagingError::BadEncoding {
                        key: k.clone(),
                        reason: e.to_string(),
                    })?
                } else {
                    v.clone().into_bytes()
                };
                Ok((k.as_str(), sidecar, bytes))
            })
            .collect()
    }
}

/// Fold a relative path into the channel's key alphabet.
pub fn transport_key(rel_path: &str) -> String {
    let key: String = rel_path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if key.starts_with(CONTROL_PREFIX) {
        format!("_{key}")
    } else {
        key
    }
}

pub struct PackageOptions<'a> {
    pub resource_extensions: &'a [String],
    pub max_entry_bytes: usize,
}

/// Package the project's source and resource roots plus its descriptor.
pub fn package_project(
    project: &ProjectDescriptor,
    partition: &Partition,
    options: &PackageOptions<'_>,
) -> Result<SourceChannel, PackagingError> {
    let mut channel = SourceChannel::default();

    let descriptor = project.root.join(DESCRIPTOR_FILE);
    if descriptor.is_file() {
        let entry = read_entry(&descriptor, options.max_entry_bytes)?;
        entry.insert_into(&mut channel, DESCRIPTOR_FILE);
    }

    let roots = [
        (&project.source_roots, "src/main/java", RootKind::Code),
        (&project.test_source_roots, "src/test/java", RootKind::Code),
        (&project.resource_roots, "src/main/resources", RootKind::Resource),
        (&project.test_resource_roots, "src/test/resources", RootKind::Resource),
    ];
    for (dirs, layout, kind) in roots {
        for dir in dirs.iter().filter(|d| d.is_dir()) {
            let mut files = Vec::new();
            walk_eligible(dir, kind, options.resource_extensions, &mut files)
                .map_err(|e| PackagingError::io(dir, e))?;
            for file in files {
                let Ok(rel) = file.strip_prefix(dir) else {
                    continue;
                };
                let entry = read_entry(&file, options.max_entry_bytes)?;
                entry.insert_into(&mut channel, &join_rel(layout, rel));
            }
        }
    }

    for name in ["targetClasses", "targetTests"] {
        let value = partition.properties.get(name).cloned().unwrap_or_default();
        channel.insert_control(name, value);
    }
    channel.insert_control(
        "coordinates",
        serde_json::to_string(&project.coordinates).unwrap_or_default(),
    );

    tracing::debug!(
        partition = %partition.id,
        entries = channel.len(),
        bytes = channel.total_bytes(),
        "packaged source channel"
    );
    Ok(channel)
}

fn join_rel(layout: &str, rel: &Path) -> String {
    let mut parts = vec![layout.to_string()];
    parts.extend(rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()));
    parts.join("/")
}

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.contains(&name)
}

fn is_eligible(path: &Path, kind: RootKind, resource_extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    match kind {
        RootKind::Code => CODE_EXTENSIONS.contains(&ext),
        RootKind::Resource => resource_extensions.iter().any(|e| e == ext),
    }
}

fn walk_eligible(
    dir: &Path,
    kind: RootKind,
    resource_extensions: &[String],
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        let ft = entry.file_type()?;
        if ft.is_dir() {
            walk_eligible(&path, kind, resource_extensions, out)?;
        } else if ft.is_file() && is_eligible(&path, kind, resource_extensions) {
            out.push(path);
        }
    }
    Ok(())
}

enum Entry {
    Text(String),
    Binary(Vec<u8>),
}

impl Entry {
    fn insert_into(self, channel: &mut SourceChannel, rel_path: &str) {
        match self {
            Entry::Text(text) => {
                channel.insert_file(rel_path, text);
            }
            Entry::Binary(bytes) => {
                channel.insert_binary(rel_path, &bytes);
            }
        }
    }
}

/// The limit applies to what actually ships, so encoded size for binaries.
fn read_entry(path: &Path, limit: usize) -> Result<Entry, PackagingError> {
    let bytes = fs::read(path).map_err(|e| PackagingError::io(path, e))?;
    let (entry, size) = match String::from_utf8(bytes) {
        Ok(text) => {
            let size = text.len();
            (Entry::Text(text), size)
        }
        Err(e) => {
            let bytes = e.into_bytes();
            tracing::debug!("{} is not UTF-8, shipping it base64-encoded", path.display());
            let size = base64::encoded_len(bytes.len(), true).unwrap_or(usize::MAX);
            (Entry::Binary(bytes), size)
        }
    };
    if size > limit {
        return Err(PackagingError::EntryTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(entry)
}

/// Read a mounted channel directory (one file per key) back into a channel.
pub fn load_channel_dir(dir: &Path) -> Result<SourceChannel, PackagingError> {
    let mut entries = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(|e| PackagingError::io(dir, e))? {
        let entry = entry.map_err(|e| PackagingError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        // Mounted volumes keep their bookkeeping under `..data` style names.
        if name.starts_with("..") {
            continue;
        }
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(&path).map_err(|e| PackagingError::io(&path, e))?;
        entries.insert(name, text);
    }
    Ok(SourceChannel::from_entries(entries))
}

/// Write every file in `channel` under `dest`. Returns the written paths.
pub fn reconstruct(channel: &SourceChannel, dest: &Path) -> Result<Vec<PathBuf>, PackagingError> {
    let mut written = Vec::new();
    for (key, sidecar, content) in channel.files()? {
        let rel = match sidecar {
            Some(path) => safe_relative(path)?,
            None => {
                tracing::warn!("no path sidecar for '{key}', inferring destination from key");
                legacy_destination(key)
            }
        };
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PackagingError::io(parent, e))?;
        }
        fs::write(&target, content).map_err(|e| PackagingError::io(&target, e))?;
        written.push(target);
    }
    Ok(written)
}

fn safe_relative(path: &str) -> Result<PathBuf, PackagingError> {
    let rel = PathBuf::from(path);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.is_empty() {
        return Err(PackagingError::UnsafePath(path.to_string()));
    }
    Ok(rel)
}

/// Guess a destination from the key alone. Ambiguous for names containing `_`.
pub fn legacy_destination(key: &str) -> PathBuf {
    if key == DESCRIPTOR_FILE {
        return PathBuf::from(DESCRIPTOR_FILE);
    }
    for (prefix, root) in LEGACY_ROOTS {
        if let Some(rest) = key.strip_prefix(prefix) {
            let (stem, ext) = match rest.rfind('.') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let mut path = PathBuf::from(root);
            for part in stem.split('_').filter(|p| !p.is_empty()) {
                path.push(part);
            }
            path.set_file_name(format!(
                "{}{ext}",
                path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
            ));
            return path;
        }
    }
    PathBuf::from(key)
}

/// Make sure `dest` has a descriptor; synthesize one from the channel's metadata if not.
pub fn ensure_descriptor(channel: &SourceChannel, dest: &Path) -> Result<bool, PackagingError> {
    let descriptor = dest.join(DESCRIPTOR_FILE);
    if descriptor.exists() {
        return Ok(false);
    }
    let coordinates = channel
        .get(COORDINATES_KEY)
        .and_then(|json| serde_json::from_str::<Coordinates>(json).ok())
        .unwrap_or_default();
    let classes = channel.get(TARGET_CLASSES_KEY).unwrap_or_default();
    let tests = channel.get(TARGET_TESTS_KEY).unwrap_or_default();
    let pom = minimal_descriptor(&coordinates, classes, tests);
    fs::write(&descriptor, pom).map_err(|e| PackagingError::io(&descriptor, e))?;
    tracing::info!("synthesized {}", descriptor.display());
    Ok(true)
}

pub fn minimal_descriptor(coords: &Coordinates, target_classes: &str, target_tests: &str) -> String {
    let list = |names: &str, tag: &str| -> String {
        names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| format!("            <{tag}>{n}</{tag}>\n"))
            .collect()
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>{group}</groupId>
  <artifactId>{artifact}</artifactId>
  <version>{version}</version>
  <properties>
    <maven.compiler.release>17</maven.compiler.release>
    <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
  </properties>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <groupId>org.pitest</groupId>
        <artifactId>pitest-maven</artifactId>
        <version>1.15.8</version>
        <configuration>
          <targetClasses>
{classes}          </targetClasses>
          <targetTests>
{tests}          </targetTests>
          <outputFormats>
            <param>XML</param>
          </outputFormats>
          <timestampedReports>false</timestampedReports>
        </configuration>
      </plugin>
    </plugins>
  </build>
</project>
"#,
        group = coords.group_id,
        artifact = coords.artifact_id,
        version = coords.version,
        classes = list(target_classes, "param"),
        tests = list(target_tests, "param"),
    )
}
