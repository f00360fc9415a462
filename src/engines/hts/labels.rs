use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::model::HtsError;

/// Position of the context class in a label record (`start end label`).
const CONTEXT_FIELD: usize = 2;

/// Deduplicated set of full-context labels seen in a run.
///
/// Used as the `AU` list when expanding decision trees. Equality is set
/// equality; the serialized list is sorted so two runs over the same labels
/// write byte-identical files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelVocabulary {
    classes: BTreeSet<String>,
}

impl LabelVocabulary {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// Newline-joined list, without trailing newline.
    pub fn to_list_text(&self) -> String {
        self.iter().collect::<Vec<_>>().join("\n")
    }

    pub fn write(&self, path: &Path) -> Result<(), HtsError> {
        fs::write(path, self.to_list_text()).map_err(|e| HtsError::fs(path, e))
    }
}

impl<S: Into<String>> FromIterator<S> for LabelVocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Collect the context classes of every record of every label file.
pub fn extract<P: AsRef<Path>>(label_paths: &[P]) -> Result<LabelVocabulary, HtsError> {
    let mut vocabulary = LabelVocabulary::default();
    for path in label_paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| HtsError::fs(path, e))?;
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let class = context_class(line).ok_or_else(|| HtsError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("expected at least 3 fields, got {:?}", line.trim()),
            })?;
            vocabulary.classes.insert(class.to_string());
        }
    }
    log::debug!(
        "Extracted {} context classes from {} label files",
        vocabulary.len(),
        label_paths.len()
    );
    Ok(vocabulary)
}

/// Third space/tab separated field of a label record.
fn context_class(line: &str) -> Option<&str> {
    line.trim()
        .split([' ', '\t'])
        .filter(|f| !f.is_empty())
        .nth(CONTEXT_FIELD)
}

/// One input label file and the base name its artifacts are keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub base: String,
    pub label: PathBuf,
}

impl Utterance {
    /// `dir/sample_01.lab` has base `sample_01`.
    pub fn from_label(label: impl Into<PathBuf>) -> Result<Self, HtsError> {
        let label = label.into();
        let base = label
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HtsError::Config(format!("cannot derive a base name from {}", label.display()))
            })?
            .to_string();
        Ok(Self { base, label })
    }

    /// `<dir>/<base>.<ext>`
    pub fn artifact(&self, dir: &Path, ext: &str) -> PathBuf {
        dir.join(format!("{}.{ext}", self.base))
    }
}

/// Read an utterance list (one label path per line, blank lines skipped).
///
/// Every artifact of an utterance is named after its base, so two labels
/// sharing a file stem are rejected.
pub fn read_utterance_list(path: &Path) -> Result<Vec<Utterance>, HtsError> {
    let content = fs::read_to_string(path).map_err(|e| HtsError::fs(path, e))?;
    let utterances = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| Utterance::from_label(line))
        .collect::<Result<Vec<_>, _>>()?;

    check_unique_bases(&utterances)?;
    Ok(utterances)
}

fn check_unique_bases(utterances: &[Utterance]) -> Result<(), HtsError> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for utt in utterances {
        if let Some(first) = seen.insert(utt.base.as_str(), utt.label.as_path()) {
            return Err(HtsError::Config(format!(
                "{} and {} share the base name '{}'",
                first.display(),
                utt.label.display(),
                utt.base
            )));
        }
    }
    Ok(())
}
