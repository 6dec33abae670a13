//! Format detection (RON/JSON/TOML), file discovery, and deserialization
//! helpers used by the layout and config loaders.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use signalbox_core::world::WorldError;

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The world rejected a definition (occupied position, full receiver, ...).
    #[error("invalid layout in {file}: {source}")]
    World {
        file: PathBuf,
        #[source]
        source: WorldError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    /// Probe order for [`find_data_file`].
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, DataLoadError> {
        let ext = path.extension().and_then(|e| e.to_str());
        Self::ALL
            .into_iter()
            .find(|f| Some(f.extension()) == ext)
            .ok_or_else(|| DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            })
    }

    fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, String> {
        match self {
            Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

// ===========================================================================
// Discovery and parsing
// ===========================================================================

/// Find `{base_name}.ron`, `.toml` or `.json` in `dir`. More than one match
/// is a [`DataLoadError::ConflictingFormats`].
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut matches = Format::ALL
        .into_iter()
        .map(|f| dir.join(format!("{base_name}.{}", f.extension())))
        .filter(|p| p.is_file());
    let first = matches.next();
    match (first, matches.next()) {
        (Some(a), Some(b)) => Err(DataLoadError::ConflictingFormats { a, b }),
        (first, _) => Ok(first),
    }
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    format.parse(&content).map_err(|detail| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    })
}

// ===========================================================================
// Names
// ===========================================================================

/// Controller names declared by one layout file, mapped to their keys.
#[derive(Debug)]
pub struct NameTable<'f, V> {
    file: &'f Path,
    names: HashMap<String, V>,
}

impl<'f, V: Copy> NameTable<'f, V> {
    pub fn new(file: &'f Path) -> Self {
        Self {
            file,
            names: HashMap::new(),
        }
    }

    /// Declare a name. Each name may be declared once per file.
    pub fn declare(&mut self, name: &str, value: V) -> Result<(), DataLoadError> {
        if self.names.contains_key(name) {
            return Err(DataLoadError::DuplicateName {
                file: self.file.to_path_buf(),
                name: name.to_string(),
            });
        }
        self.names.insert(name.to_string(), value);
        Ok(())
    }

    pub fn resolve(&self, name: &str, expected_kind: &'static str) -> Result<V, DataLoadError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| DataLoadError::UnresolvedRef {
                file: self.file.to_path_buf(),
                name: name.to_string(),
                expected_kind,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "signalbox_loader_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    #[test]
    fn format_from_extension() {
        for format in Format::ALL {
            let path = PathBuf::from(format!("layout.{}", format.extension()));
            assert_eq!(Format::from_path(&path).unwrap(), format);
        }
        assert!(matches!(
            Format::from_path(Path::new("a.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(Format::from_path(Path::new("layout")).is_err());
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("layout.ron"), "()").unwrap();
        fs::write(dir.join("layout.json"), "{}").unwrap();

        assert!(matches!(
            find_data_file(&dir, "layout"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn require_data_file_missing() {
        let dir = make_test_dir("missing");
        let err = require_data_file(&dir, "layout").unwrap_err();
        assert!(err.to_string().contains("layout"));
        cleanup(&dir);
    }

    #[test]
    fn deserialize_each_format() {
        let dir = make_test_dir("formats");
        fs::write(dir.join("a.ron"), r#"(name: "west")"#).unwrap();
        fs::write(dir.join("b.json"), r#"{"name": "west"}"#).unwrap();
        fs::write(dir.join("c.toml"), r#"name = "west""#).unwrap();

        for file in ["a.ron", "b.json", "c.toml"] {
            let named: Named = deserialize_file(&dir.join(file)).unwrap();
            assert_eq!(named.name, "west");
        }

        cleanup(&dir);
    }

    #[test]
    fn deserialize_parse_error_names_file() {
        let dir = make_test_dir("parse_error");
        let path = dir.join("bad.ron");
        fs::write(&path, "this is not valid RON {{{").unwrap();

        let err = deserialize_file::<Named>(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { ref file, .. } if *file == path));

        cleanup(&dir);
    }

    #[test]
    fn name_table_rejects_duplicates_and_unknown_names() {
        let file = Path::new("layout.ron");
        let mut names = NameTable::new(file);
        names.declare("west", 1).unwrap();

        assert_eq!(names.resolve("west", "controller").unwrap(), 1);
        assert!(matches!(
            names.resolve("east", "controller"),
            Err(DataLoadError::UnresolvedRef { expected_kind: "controller", .. })
        ));
        assert!(matches!(
            names.declare("west", 2),
            Err(DataLoadError::DuplicateName { ref name, .. }) if name == "west"
        ));
        assert_eq!(names.resolve("west", "controller").unwrap(), 1);
    }

    #[test]
    fn find_data_file_single_match() {
        let dir = make_test_dir("single");
        assert!(find_data_file(&dir, "layout").unwrap().is_none());
        fs::write(dir.join("layout.toml"), "").unwrap();
        assert_eq!(find_data_file(&dir, "layout").unwrap(), Some(dir.join("layout.toml")));
        cleanup(&dir);
    }
}
