// src/db/ini.rs

//! Ordered INI document codec
//!
//! The state database and every wire format in this system (`pkginfo.ini`,
//! `pkglist.ini`) are INI-structured. This codec preserves section and key
//! order, since the `File1…FileN` sequence carries meaning through its
//! indices, and rewrites the whole document durably on store.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Fixed per-value length limit
pub const MAX_VALUE_LEN: usize = 256;

/// Fixed per-section raw text cap
pub const MAX_SECTION_BYTES: usize = 64 * 1024;

/// One named section with its key/value pairs in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Raw serialized size of this section, header included
    fn raw_len(&self) -> usize {
        let mut len = self.name.len() + 3;
        for (k, v) in &self.entries {
            len += k.len() + v.len() + 2;
        }
        len
    }
}

/// An in-memory INI document with stable ordering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text into a document
    ///
    /// Blank lines and `;`/`#` comment lines are skipped. Keys repeated
    /// within a section keep their first occurrence.
    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = IniDocument::new();
        let mut current: Option<usize> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| Error::ParseError(format!("unterminated section header: {line}")))?;
                current = Some(doc.section_index_or_insert(name));
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let idx = match current {
                    Some(idx) => idx,
                    None => {
                        return Err(Error::ParseError(format!(
                            "key '{}' appears before any section header",
                            key.trim()
                        )));
                    }
                };
                let key = key.trim().to_string();
                let value = value.trim().to_string();
                let section = &mut doc.sections[idx];
                if !section.entries.iter().any(|(k, _)| *k == key) {
                    section.entries.push((key, value));
                }
            }
            // Lines without '=' outside a header are tolerated and dropped.
        }

        Ok(doc)
    }

    /// Serialize back to INI text
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if section.entries.is_empty() {
                continue;
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (k, v) in &section.entries {
                out.push_str(k);
                out.push('=');
                out.push_str(v);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    fn section_index_or_insert(&mut self, name: &str) -> usize {
        match self.section_index(name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        }
    }

    /// Look up a single value
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let idx = self.section_index(section)?;
        self.sections[idx]
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All key/value pairs of a section in order, enforcing the raw cap
    pub fn section_entries(&self, section: &str) -> Result<Vec<(String, String)>> {
        let Some(idx) = self.section_index(section) else {
            return Ok(Vec::new());
        };
        let s = &self.sections[idx];
        let size = s.raw_len();
        if size > MAX_SECTION_BYTES {
            return Err(Error::SectionTooLarge {
                section: section.to_string(),
                size,
                limit: MAX_SECTION_BYTES,
            });
        }
        Ok(s.entries.clone())
    }

    /// Insert or replace a key, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::ValueTooLong {
                key: key.to_string(),
                len: value.len(),
                limit: MAX_VALUE_LEN,
            });
        }
        let idx = self.section_index_or_insert(section);
        let entries = &mut self.sections[idx].entries;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Delete a key; removing the last key removes the section
    pub fn remove_key(&mut self, section: &str, key: &str) {
        if let Some(idx) = self.section_index(section) {
            self.sections[idx].entries.retain(|(k, _)| k != key);
            if self.sections[idx].entries.is_empty() {
                self.sections.remove(idx);
            }
        }
    }

    /// Delete a whole section and all of its keys
    pub fn remove_section(&mut self, section: &str) {
        if let Some(idx) = self.section_index(section) {
            self.sections.remove(idx);
        }
    }

    /// Names of all sections, in document order
    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }
}

/// Load a document from disk; a missing file is an empty document
pub fn load(path: &Path) -> Result<IniDocument> {
    match fs::read_to_string(path) {
        Ok(text) => IniDocument::parse(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IniDocument::new()),
        Err(e) => Err(Error::IoError(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

/// Write a document durably: temp file, fsync, atomic rename
pub fn store(path: &Path, doc: &IniDocument) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path).map_err(|e| {
        Error::WriteFault(format!("failed to create {}: {e}", tmp_path.display()))
    })?;
    file.write_all(doc.serialize().as_bytes())
        .map_err(|e| Error::WriteFault(format!("failed to write {}: {e}", tmp_path.display())))?;
    file.sync_all()
        .map_err(|e| Error::WriteFault(format!("failed to sync {}: {e}", tmp_path.display())))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        Error::WriteFault(format!(
            "failed to move {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    // fsync the parent directory so the rename itself is durable; not all
    // filesystems support this, so failures are ignored.
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_get() {
        let doc = IniDocument::parse(
            "[Installed]\nex=1.0\n\n[ex]\nVersion=1.0\nFileCount=2\nFile1=bin/ex\nFile2=share/ex.dat\n",
        )
        .unwrap();

        assert_eq!(doc.get("Installed", "ex"), Some("1.0"));
        assert_eq!(doc.get("ex", "File2"), Some("share/ex.dat"));
        assert_eq!(doc.get("ex", "File3"), None);
        assert_eq!(doc.get("missing", "key"), None);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let doc = IniDocument::parse("; comment\n\n[s]\n# another\nkey=value\n").unwrap();
        assert_eq!(doc.get("s", "key"), Some("value"));
    }

    #[test]
    fn test_parse_rejects_orphan_key() {
        assert!(IniDocument::parse("key=value\n").is_err());
    }

    #[test]
    fn test_value_keeps_embedded_equals() {
        let doc = IniDocument::parse("[s]\nkey=a=b=c\n").unwrap();
        assert_eq!(doc.get("s", "key"), Some("a=b=c"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut doc = IniDocument::new();
        doc.set("s", "a", "1").unwrap();
        doc.set("s", "b", "2").unwrap();
        doc.set("s", "a", "3").unwrap();

        let entries = doc.section_entries("s").unwrap();
        assert_eq!(entries, vec![("a".into(), "3".into()), ("b".into(), "2".into())]);
    }

    #[test]
    fn test_remove_last_key_drops_section() {
        let mut doc = IniDocument::new();
        doc.set("s", "a", "1").unwrap();
        doc.remove_key("s", "a");
        assert!(doc.section_names().is_empty());
    }

    #[test]
    fn test_value_length_limit() {
        let mut doc = IniDocument::new();
        let long = "x".repeat(MAX_VALUE_LEN + 1);
        assert!(matches!(
            doc.set("s", "k", &long),
            Err(Error::ValueTooLong { .. })
        ));
    }

    #[test]
    fn test_section_cap() {
        let mut doc = IniDocument::new();
        for i in 0..512 {
            doc.set("big", &format!("File{i}"), &"y".repeat(200)).unwrap();
        }
        assert!(matches!(
            doc.section_entries("big"),
            Err(Error::SectionTooLarge { .. })
        ));
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let text = "[a]\nk1=v1\nk2=v2\n\n[b]\nk=v\n\n";
        let doc = IniDocument::parse(text).unwrap();
        assert_eq!(doc.serialize(), text);
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.ini");

        let mut doc = IniDocument::new();
        doc.set("Installed", "ex", "1.0").unwrap();
        store(&path, &doc).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc = load(&dir.path().join("absent.ini")).unwrap();
        assert!(doc.section_names().is_empty());
    }
}
