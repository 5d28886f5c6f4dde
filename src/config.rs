//! Configuration Management
//!
//! Label spec loading, validation and batch configuration files

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncMode;
use crate::target::{BatchOptions, RepositoryFilter, DEFAULT_PARALLEL};

/// Convention-based label file names searched in order
pub const CONVENTION_CONFIG_FILES: &[&str] = &[
    ".labelsync.json",
    ".labelsync.yaml",
    ".labelsync.yml",
    ".github/labels.json",
    ".github/labels.yaml",
    ".github/labels.yml",
];

/// Maximum length of a label name
pub const MAX_NAME_LENGTH: usize = 50;

/// Maximum length of a label description
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// Label Specification
///
/// The locally declared desired state of one label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSpec {
    /// Label name (unique within a spec, case-insensitive)
    pub name: String,

    /// Label color (6-digit hex code, normalized without #)
    pub color: String,

    /// Label description
    #[serde(default)]
    pub description: String,

    /// Grouping category, never sent to the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Free-form note, never sent to the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl LabelSpec {
    /// Create a new label spec without category or memo
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: description.into(),
            category: None,
            memo: None,
        }
    }

    /// Validate label spec
    ///
    /// # Errors
    /// - If the name is empty or too long
    /// - If the color format is invalid
    /// - If the description is too long
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::label_validation("Label name cannot be empty"));
        }

        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(Error::label_validation(format!(
                "Label name must be {} characters or less: {}",
                MAX_NAME_LENGTH, self.name
            )));
        }

        let color = self.color.trim_start_matches('#');
        if !is_valid_hex_color(color) {
            return Err(Error::InvalidLabelColor(self.color.clone()));
        }

        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(Error::label_validation(format!(
                "Description of '{}' must be {} characters or less",
                self.name, MAX_DESCRIPTION_LENGTH
            )));
        }

        Ok(())
    }

    /// Validate and return the spec with its color normalized
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;
        self.color = normalize_color(&self.color);
        Ok(self)
    }
}

/// Normalize color (remove #, expand shorthand, convert to lowercase)
pub fn normalize_color(color: &str) -> String {
    let color = color.trim_start_matches('#').to_lowercase();
    if color.len() == 3 {
        color.chars().flat_map(|c| [c, c]).collect()
    } else {
        color
    }
}

/// Validate hex color code (3 or 6 hex digits without #)
fn is_valid_hex_color(color: &str) -> bool {
    (color.len() == 6 || color.len() == 3) && color.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate and normalize a label collection
///
/// # Errors
/// If any label is invalid or two labels share a case-insensitive name
pub fn validate_labels(labels: Vec<LabelSpec>) -> Result<Vec<LabelSpec>> {
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(labels.len());

    for label in labels {
        let label = label.normalized()?;
        if !seen.insert(label.name.to_lowercase()) {
            return Err(Error::DuplicateLabel(label.name));
        }
        validated.push(label);
    }

    Ok(validated)
}

/// Labels grouped under a category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelCategory {
    /// Category name
    pub category: String,

    /// Labels in this category
    pub labels: Vec<LabelSpec>,
}

/// Label list, either flat or grouped by category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LabelList {
    Categorized(Vec<LabelCategory>),
    Flat(Vec<LabelSpec>),
}

impl LabelList {
    /// Flatten into an ordered label list
    ///
    /// Labels inside a category inherit its name unless they declare their own.
    pub fn flatten(self) -> Vec<LabelSpec> {
        match self {
            LabelList::Flat(labels) => labels,
            LabelList::Categorized(categories) => categories
                .into_iter()
                .flat_map(|group| {
                    let category = group.category;
                    group.labels.into_iter().map(move |mut label| {
                        if label.category.is_none() {
                            label.category = Some(category.clone());
                        }
                        label
                    })
                })
                .collect(),
        }
    }
}

/// Label Registry
///
/// Versioned label file format, also produced by `export`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelRegistry {
    /// Version of the label configuration
    pub version: String,

    /// RFC 3339 timestamp of the last update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// All labels, optionally grouped by category
    pub labels: LabelList,

    /// Custom metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LabelRegistry {
    /// Build a registry stamped with the current time
    ///
    /// # Arguments
    /// - `labels`: Labels to export
    /// - `version`: Registry version
    /// - `source`: Repository the labels came from, recorded in metadata
    pub fn export(labels: Vec<LabelSpec>, version: &str, source: Option<&str>) -> Self {
        let metadata = source.map(|source| {
            let mut map = serde_json::Map::new();
            map.insert(
                "source".to_string(),
                serde_json::Value::String(source.to_string()),
            );
            map
        });

        Self {
            version: version.to_string(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            labels: LabelList::Flat(labels),
            metadata,
        }
    }
}

/// Any accepted label file shape
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    Registry(LabelRegistry),
    List(LabelList),
}

impl LabelFile {
    fn into_labels(self) -> Vec<LabelSpec> {
        match self {
            LabelFile::Registry(registry) => registry.labels.flatten(),
            LabelFile::List(list) => list.flatten(),
        }
    }
}

/// Parse label spec from JSON content
///
/// # Errors
/// If parsing or validation fails
pub fn parse_labels_json(content: &str) -> Result<Vec<LabelSpec>> {
    let file: LabelFile = serde_json::from_str(content)?;
    validate_labels(file.into_labels())
}

/// Parse label spec from YAML content
///
/// # Errors
/// If parsing or validation fails
pub fn parse_labels_yaml(content: &str) -> Result<Vec<LabelSpec>> {
    let file: LabelFile = serde_yaml::from_str(content)?;
    validate_labels(file.into_labels())
}

/// Parse label spec from a content string, detecting format by file path extension
///
/// # Arguments
/// - `content`: Raw file content (JSON or YAML)
/// - `path`: File path used to determine format by extension
///
/// # Errors
/// If parsing or validation fails, or if the extension is unsupported
pub fn parse_labels_from_content(content: &str, path: &Path) -> Result<Vec<LabelSpec>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_labels_json(content),
        Some("yaml") | Some("yml") => parse_labels_yaml(content),
        _ => Err(Error::config_validation(format!(
            "Label file must be .json, .yaml, or .yml: {}",
            path.display()
        ))),
    }
}

/// Parse label spec from a string, auto-detecting JSON or YAML format
///
/// Tries JSON first, then YAML.
///
/// # Errors
/// If neither JSON nor YAML parsing succeeds, or validation fails
pub fn parse_labels_auto_detect(content: &str) -> Result<Vec<LabelSpec>> {
    if let Ok(file) = serde_json::from_str::<LabelFile>(content) {
        return validate_labels(file.into_labels());
    }

    parse_labels_yaml(content)
}

/// Load label spec from a file, detecting format by extension
///
/// # Errors
/// If file reading, parsing, or validation fails, or if the extension is unsupported
pub fn load_labels_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<LabelSpec>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Label file not found: {}", path.display()),
        )
        .into());
    }

    let content = std::fs::read_to_string(path)?;
    parse_labels_from_content(&content, path)
}

/// Load label spec from stdin
///
/// # Errors
/// If stdin is empty, or parsing/validation fails
pub fn load_labels_from_stdin() -> Result<Vec<LabelSpec>> {
    load_labels_from_reader(std::io::stdin())
}

/// Load label spec from any reader, auto-detecting JSON or YAML format
///
/// # Errors
/// If the reader is empty, or parsing/validation fails
pub fn load_labels_from_reader<R: std::io::Read>(mut reader: R) -> Result<Vec<LabelSpec>> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    if content.trim().is_empty() {
        return Err(Error::config_validation("Empty label input"));
    }

    parse_labels_auto_detect(&content)
}

/// Search for a convention-based label file in the current directory
pub fn find_convention_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_convention_config_in(&cwd)
}

/// Search for a convention-based label file in the given directory
///
/// Files are searched in [`CONVENTION_CONFIG_FILES`] order.
pub fn find_convention_config_in(dir: &Path) -> Option<PathBuf> {
    CONVENTION_CONFIG_FILES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
}

/// Parse repository string into owner and name
///
/// # Arguments
/// - `repo`: Repository string in "owner/repo" format
///
/// # Errors
/// Returns an error if the format is invalid
pub fn parse_repository(repo: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = repo.split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(Error::InvalidRepositoryFormat(repo.to_string()));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Defaults shared by every batch target
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchDefaults {
    /// Label file used when a target has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
}

/// One target entry of a batch configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<String>>,

    /// Label file for this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,

    #[serde(default)]
    pub filter: RepositoryFilter,
}

impl BatchTarget {
    fn has_scope(&self) -> bool {
        self.organization.is_some()
            || self.user.is_some()
            || self.repositories.as_ref().is_some_and(|r| !r.is_empty())
    }
}

/// Batch Configuration
///
/// Describes several batch runs, each with its own scope and label file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub defaults: BatchDefaults,

    #[serde(default)]
    pub targets: Vec<BatchTarget>,

    /// Directory relative label files are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// A batch target ready to run
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Label file to load
    pub label_file: PathBuf,

    /// Options for the orchestrator
    pub options: BatchOptions,
}

impl BatchConfig {
    /// Load and validate a batch configuration file (.json, .yaml, or .yml)
    ///
    /// # Errors
    /// If file reading, parsing, or validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let mut config: BatchConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => {
                return Err(Error::config_validation(
                    "Batch configuration must be .json, .yaml, or .yml",
                ))
            }
        };

        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Validate batch configuration
    ///
    /// # Errors
    /// - If the version is missing
    /// - If there are no targets
    /// - If a target has no repository scope or no label file
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::config_validation("Batch config version is required"));
        }

        if self.targets.is_empty() {
            return Err(Error::config_validation("At least one target is required"));
        }

        for (index, target) in self.targets.iter().enumerate() {
            if !target.has_scope() {
                return Err(Error::config_validation(format!(
                    "Target {index}: one of organization, user, or repositories is required"
                )));
            }

            if target.file.is_none() && self.defaults.file.is_none() {
                return Err(Error::config_validation(format!(
                    "Target {index}: a label file is required (target or defaults)"
                )));
            }
        }

        Ok(())
    }

    /// Convert every target into a runnable job
    ///
    /// Target values win over defaults.
    ///
    /// # Errors
    /// If validation fails
    pub fn jobs(&self) -> Result<Vec<BatchJob>> {
        self.validate()?;

        let jobs = self
            .targets
            .iter()
            .filter_map(|target| {
                let file = target.file.as_ref().or(self.defaults.file.as_ref())?;
                let label_file = match &self.base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.clone(),
                };

                let options = BatchOptions {
                    repositories: target.repositories.clone(),
                    organization: target.organization.clone(),
                    user: target.user.clone(),
                    mode: target.mode.or(self.defaults.mode).unwrap_or_default(),
                    dry_run: false,
                    parallel: target
                        .parallel
                        .or(self.defaults.parallel)
                        .unwrap_or(DEFAULT_PARALLEL),
                    filter: target.filter.clone(),
                };

                Some(BatchJob {
                    label_file,
                    options,
                })
            })
            .collect();

        Ok(jobs)
    }
}
