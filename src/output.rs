//! Results folder layout
//!
//! ```text
//! <root>/<taxpayer name>/<cuit>/<year>/Nuestra_Parte/table_01.pdf
//! ```
//!
//! Artifacts whose content already exists in the leaf folder are not written
//! again, so re-running over a kept results folder only adds what changed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::taxpayer::Taxpayer;

pub const SECTION_DIR: &str = "Nuestra_Parte";
pub const FAILURE_NOTE: &str = "error.txt";
pub const FAILURE_SCREENSHOT: &str = "error.png";
const MAX_NAME_LEN: usize = 80;

/// One extracted file, not yet on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// `<stem>_NN.<ext>`, 1-based
    pub fn indexed(stem: &str, index: usize, extension: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: format!("{}_{:02}.{}", stem, index + 1, extension),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// Same content already stored at this path
    Duplicate(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub leaf: PathBuf,
    pub saved: usize,
    pub duplicates: usize,
}

/// What happens to a results folder left over from a previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanPolicy {
    #[default]
    Ask,
    Delete,
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    Created,
    Cleared,
    Kept,
}

#[derive(Debug, Clone)]
pub struct ResultOrganizer {
    root: PathBuf,
}

impl ResultOrganizer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn taxpayer_dir(&self, taxpayer: &Taxpayer) -> PathBuf {
        self.root.join(normalize_name(&taxpayer.name))
    }

    /// `<name>/<cuit>`; holds the year folders and failure notes
    pub fn cuit_dir(&self, taxpayer: &Taxpayer) -> PathBuf {
        self.taxpayer_dir(taxpayer).join(taxpayer.cuit.as_str())
    }

    pub fn leaf_dir(&self, taxpayer: &Taxpayer, year: i32) -> PathBuf {
        self.cuit_dir(taxpayer)
            .join(year.to_string())
            .join(SECTION_DIR)
    }

    /// Write every artifact into the taxpayer's leaf folder
    pub fn save_all(
        &self,
        taxpayer: &Taxpayer,
        year: i32,
        artifacts: &[Artifact],
    ) -> Result<SaveReport, ScraperError> {
        let leaf = self.leaf_dir(taxpayer, year);
        std::fs::create_dir_all(&leaf)?;

        let mut report = SaveReport {
            leaf: leaf.clone(),
            ..Default::default()
        };
        for artifact in artifacts {
            match save_artifact(&leaf, artifact)? {
                SaveOutcome::Saved(path) => {
                    debug!("Saved {:?}", path);
                    report.saved += 1;
                }
                SaveOutcome::Duplicate(path) => {
                    debug!("{} duplicates {:?}, not saved", artifact.file_name, path);
                    report.duplicates += 1;
                }
            }
        }

        info!(
            "{}: {} saved, {} duplicates in {:?}",
            taxpayer.name, report.saved, report.duplicates, leaf
        );
        Ok(report)
    }

    /// Leave a note (and a screenshot when available) in the CUIT folder
    pub fn record_failure(
        &self,
        taxpayer: &Taxpayer,
        message: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<PathBuf, ScraperError> {
        let dir = self.cuit_dir(taxpayer);
        std::fs::create_dir_all(&dir)?;

        let note = dir.join(FAILURE_NOTE);
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        std::fs::write(
            &note,
            format!("[{}] CUIT {}: {}\n", timestamp, taxpayer.cuit, message),
        )?;

        let png_path = dir.join(FAILURE_SCREENSHOT);
        match screenshot {
            Some(png) => std::fs::write(&png_path, png)?,
            None => {
                remove_if_exists(&png_path)?;
            }
        }
        Ok(note)
    }

    /// Drop failure files left by an earlier run
    pub fn clear_failure(&self, taxpayer: &Taxpayer) -> Result<(), ScraperError> {
        let dir = self.cuit_dir(taxpayer);
        for name in [FAILURE_NOTE, FAILURE_SCREENSHOT] {
            let path = dir.join(name);
            if remove_if_exists(&path)? {
                debug!("Removed stale {:?}", path);
            }
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Store `artifact` in `leaf` unless some file there already has its content.
pub fn save_artifact(leaf: &Path, artifact: &Artifact) -> Result<SaveOutcome, ScraperError> {
    if let Some(existing) = find_same_content(leaf, &artifact.bytes)? {
        return Ok(SaveOutcome::Duplicate(existing));
    }

    let path = leaf.join(&artifact.file_name);
    if path.exists() {
        warn!("Replacing {:?} with newer content", path);
    }
    std::fs::write(&path, &artifact.bytes)?;
    Ok(SaveOutcome::Saved(path))
}

fn find_same_content(dir: &Path, bytes: &[u8]) -> io::Result<Option<PathBuf>> {
    let mut wanted: Option<String> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() || meta.len() != bytes.len() as u64 {
            continue;
        }

        let digest = wanted.get_or_insert_with(|| content_digest(bytes));
        let existing = std::fs::read(entry.path())?;
        if content_digest(&existing) == *digest {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Hex SHA-256
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Make a taxpayer name safe to use as a folder name.
///
/// Accents are dropped (`Peña` becomes `Pena`) so paths stay ASCII where the
/// input allows it.
pub fn normalize_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORES: OnceLock<Regex> = OnceLock::new();

    let invalid = INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    let underscores = UNDERSCORES.get_or_init(|| Regex::new(r"_{2,}").expect("valid regex"));

    let plain: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let cleaned = invalid.replace_all(plain.trim(), "_");
    let cleaned = spaces.replace_all(&cleaned, "_");
    let cleaned = underscores.replace_all(&cleaned, "_");

    let capped: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    let result = capped.trim_matches(|c| c == '_' || c == '.').to_string();

    if result.is_empty() {
        "sin_nombre".to_string()
    } else {
        result
    }
}

/// Make sure `root` exists and decide what to do with a previous run's
/// content. `confirm` is only asked under [`CleanPolicy::Ask`].
pub fn prepare_root<F>(root: &Path, policy: CleanPolicy, confirm: F) -> Result<RootState, ScraperError>
where
    F: FnOnce(&str) -> io::Result<bool>,
{
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        info!("Created results folder {:?}", root);
        return Ok(RootState::Created);
    }

    if std::fs::read_dir(root)?.next().is_none() {
        return Ok(RootState::Kept);
    }

    let delete = match policy {
        CleanPolicy::Delete => true,
        CleanPolicy::Keep => false,
        CleanPolicy::Ask => confirm(&format!(
            "The results folder {} already has content. Delete it before starting?",
            root.display()
        ))?,
    };

    if delete {
        std::fs::remove_dir_all(root)?;
        std::fs::create_dir_all(root)?;
        info!("Cleared results folder {:?}", root);
        Ok(RootState::Cleared)
    } else {
        info!("Keeping results folder {:?}; duplicate files will be skipped", root);
        Ok(RootState::Kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxpayer::Cuit;

    fn taxpayer(name: &str) -> Taxpayer {
        Taxpayer::new(name, Cuit::parse("20123456789").unwrap(), "pw")
    }

    #[test]
    fn test_leaf_layout() {
        let organizer = ResultOrganizer::new("/r");
        let leaf = organizer.leaf_dir(&taxpayer("Juan Perez"), 2021);
        assert_eq!(leaf, PathBuf::from("/r/Juan_Perez/20123456789/2021/Nuestra_Parte"));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Juan   Perez "), "Juan_Perez");
        assert_eq!(normalize_name("A/B: C?"), "A_B_C");
        assert_eq!(normalize_name("Peña S.R.L."), "Pena_S.R.L");
        assert_eq!(normalize_name("José Peña"), "Jose_Pena");
        assert_eq!(normalize_name("MÜLLER Ñandú"), "MULLER_Nandu");
        assert_eq!(normalize_name("???"), "sin_nombre");
        assert_eq!(normalize_name(""), "sin_nombre");
        assert_eq!(normalize_name(&"x".repeat(200)).len(), 80);
    }

    #[test]
    fn test_duplicate_content_not_saved_again() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = ResultOrganizer::new(dir.path());
        let who = taxpayer("Empresa SA");

        let first = vec![
            Artifact::indexed("table", 0, "pdf", b"one".to_vec()),
            Artifact::indexed("table", 1, "pdf", b"two".to_vec()),
        ];
        let report = organizer.save_all(&who, 2020, &first).unwrap();
        assert_eq!((report.saved, report.duplicates), (2, 0));

        // Same content under a different index is still a duplicate.
        let second = vec![
            Artifact::indexed("table", 0, "pdf", b"two".to_vec()),
            Artifact::indexed("table", 1, "pdf", b"three".to_vec()),
        ];
        let report = organizer.save_all(&who, 2020, &second).unwrap();
        assert_eq!((report.saved, report.duplicates), (1, 1));

        let leaf = organizer.leaf_dir(&who, 2020);
        assert_eq!(std::fs::read(leaf.join("table_01.pdf")).unwrap(), b"one");
        assert_eq!(std::fs::read(leaf.join("table_02.pdf")).unwrap(), b"three");
    }

    #[test]
    fn test_record_failure_writes_note() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = ResultOrganizer::new(dir.path());
        let who = taxpayer("Juan Perez");

        let note = organizer
            .record_failure(&who, "login failed", Some(b"png"))
            .unwrap();
        let text = std::fs::read_to_string(&note).unwrap();
        assert!(text.contains("20123456789"));
        assert!(text.contains("login failed"));
        assert_eq!(note.parent().unwrap(), organizer.cuit_dir(&who));
        assert!(organizer.cuit_dir(&who).join(FAILURE_SCREENSHOT).exists());

        organizer.clear_failure(&who).unwrap();
        assert!(!organizer.cuit_dir(&who).join(FAILURE_NOTE).exists());
        assert!(!organizer.cuit_dir(&who).join(FAILURE_SCREENSHOT).exists());
        // Nothing left to clear is fine.
        organizer.clear_failure(&who).unwrap();
    }

    #[test]
    fn test_same_name_different_cuit_keeps_both_notes() {
        let dir = tempfile::tempdir().unwrap();
        let organizer = ResultOrganizer::new(dir.path());
        let first = taxpayer("Juan Perez");
        let second = Taxpayer::new("Juan Perez", Cuit::parse("27111222333").unwrap(), "pw");

        let a = organizer.record_failure(&first, "first failed", None).unwrap();
        let b = organizer.record_failure(&second, "second failed", None).unwrap();
        assert_ne!(a, b);
        assert!(std::fs::read_to_string(a).unwrap().contains("first failed"));
        assert!(std::fs::read_to_string(b).unwrap().contains("second failed"));
    }

    #[test]
    fn test_existing_root_prompts_before_delete() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Resultados");
        std::fs::create_dir_all(root.join("old")).unwrap();

        let mut asked = false;
        let state = prepare_root(&root, CleanPolicy::Ask, |question| {
            asked = true;
            assert!(question.contains("Resultados"));
            Ok(false)
        })
        .unwrap();
        assert!(asked);
        assert_eq!(state, RootState::Kept);
        assert!(root.join("old").exists());

        let state = prepare_root(&root, CleanPolicy::Ask, |_| Ok(true)).unwrap();
        assert_eq!(state, RootState::Cleared);
        assert!(root.exists());
        assert!(!root.join("old").exists());
    }

    #[test]
    fn test_new_or_forced_root_never_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Resultados");

        let state = prepare_root(&root, CleanPolicy::Ask, |_| panic!("unexpected prompt")).unwrap();
        assert_eq!(state, RootState::Created);

        std::fs::write(root.join("leftover.png"), b"x").unwrap();
        let state = prepare_root(&root, CleanPolicy::Keep, |_| panic!("unexpected prompt")).unwrap();
        assert_eq!(state, RootState::Kept);
        assert!(root.join("leftover.png").exists());

        let state = prepare_root(&root, CleanPolicy::Delete, |_| panic!("unexpected prompt")).unwrap();
        assert_eq!(state, RootState::Cleared);
        assert!(!root.join("leftover.png").exists());
    }
}
