//! Class vocabularies and dataset allow-lists.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Names of the 80 COCO classes, in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class-id to name table supplied with a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|name| name.to_string()).collect())
    }

    /// Load names from a YAML dataset file (`names:` list or index map) or a
    /// plain text file with one name per line.
    pub fn load(path: &Path) -> Result<Self> {
        let names = read_names(path)?;
        if names.is_empty() {
            return Err(anyhow!("class names file {} is empty", path.display()));
        }
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a class id; out-of-range ids map to `class<N>`.
    pub fn label(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Labels considered valid for an application domain.
#[derive(Clone, Debug)]
pub struct AllowList {
    labels: Vec<String>,
    index: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();
        for label in labels {
            let label = label.into();
            if index.insert(label.clone()) {
                ordered.push(label);
            }
        }
        Self {
            labels: ordered,
            index,
        }
    }

    /// Every name in the model vocabulary.
    pub fn from_vocabulary(names: &ClassNames) -> Self {
        Self::new(names.iter())
    }

    /// Dataset class file when it exists, otherwise the full vocabulary.
    pub fn from_dataset_or_vocabulary(path: &Path, vocabulary: &ClassNames) -> Result<Self> {
        if path.exists() {
            let names = read_names(path)?;
            if names.is_empty() {
                log::warn!("dataset file {} lists no classes; nothing will match", path.display());
            } else {
                log::info!("dataset classes from {}: {}", path.display(), names.join(", "));
            }
            Ok(Self::new(names))
        } else {
            log::info!(
                "dataset file {} not found; allowing all {} model classes",
                path.display(),
                vocabulary.len()
            );
            Ok(Self::from_vocabulary(vocabulary))
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains(label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class names {}", path.display()))?;
    parse_names(&raw).with_context(|| format!("invalid class names file {}", path.display()))
}

/// A YAML mapping is a dataset file whose `names` key (list or index map)
/// holds the classes; a missing or null key means no classes. Anything else
/// is read as plain text, one name per line.
fn parse_names(raw: &str) -> Result<Vec<String>> {
    if let Ok(serde_yaml::Value::Mapping(mut dataset)) = serde_yaml::from_str(raw) {
        let names = match dataset.remove("names") {
            None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
            Some(names) => serde_yaml::from_value::<DatasetNames>(names)
                .map_err(|_| anyhow!("`names` must be a list or an index map"))?,
        };
        return Ok(match names {
            DatasetNames::List(names) => names,
            DatasetNames::Map(map) => map.into_values().collect(),
        });
    }
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_yaml_list_and_map() -> Result<()> {
        let list = parse_names("path: data\nnames:\n  - apple\n  - banana\n")?;
        assert_eq!(list, vec!["apple", "banana"]);

        let map = parse_names("nc: 2\nnames:\n  1: pear\n  0: apple\n")?;
        assert_eq!(map, vec!["apple", "pear"]);
        Ok(())
    }

    #[test]
    fn dataset_without_names_has_no_classes() -> Result<()> {
        assert!(parse_names("path: data\ntrain: images/train\n")?.is_empty());
        assert!(parse_names("names: []\n")?.is_empty());
        assert!(parse_names("names: 3\n").is_err());
        Ok(())
    }

    #[test]
    fn empty_dataset_allows_nothing() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"path: data\n")?;
        let allow = AllowList::from_dataset_or_vocabulary(file.path(), &ClassNames::coco())?;
        assert!(allow.labels().is_empty());
        assert!(!allow.contains("path: data"));
        assert!(ClassNames::load(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn parses_plain_text_names() -> Result<()> {
        let names = parse_names("# comment\napple\n\n banana \n")?;
        assert_eq!(names, vec!["apple", "banana"]);
        Ok(())
    }

    #[test]
    fn missing_dataset_falls_back_to_vocabulary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let allow = AllowList::from_dataset_or_vocabulary(
            &dir.path().join("absent.yaml"),
            &ClassNames::coco(),
        )?;
        assert_eq!(allow.labels().len(), 80);
        assert!(allow.contains("apple"));
        Ok(())
    }

    #[test]
    fn dataset_narrows_vocabulary() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"names: [apple, orange]\n")?;
        let allow = AllowList::from_dataset_or_vocabulary(file.path(), &ClassNames::coco())?;
        assert!(allow.contains("apple"));
        assert!(!allow.contains("person"));
        Ok(())
    }

    #[test]
    fn out_of_range_class_gets_placeholder() {
        let names = ClassNames::new(vec!["a".into()]);
        assert_eq!(names.label(0), "a");
        assert_eq!(names.label(3), "class3");
    }
}
