//! SHA-256 hash listing.
//!
//! `hashes.sha256` uses the `sha256sum` text format, one `<hex>  <path>`
//! line per file, sorted by path. The listing never contains itself.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{Read, Seek};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::documents::HASHES;
use crate::error::{EvidenceError, EvidenceResult};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Relative path -> digest, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashListing {
    entries: BTreeMap<String, String>,
}

impl HashListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Hash every file under `dir` except an existing listing.
    pub fn from_dir(dir: &Path) -> EvidenceResult<Self> {
        let mut listing = Self::new();
        for (relative, path) in pack_files(dir)? {
            if relative == HASHES {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| EvidenceError::io(&path, e))?;
            listing.insert(relative, sha256_hex(&bytes));
        }
        debug!("Hashed {} file(s) in {:?}", listing.len(), dir);
        Ok(listing)
    }

    /// Parse `sha256sum` output. Binary-mode markers (`*path`) are accepted.
    pub fn parse(text: &str) -> EvidenceResult<Self> {
        let mut listing = Self::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let invalid = |message: &str| EvidenceError::InvalidListing {
                line: index + 1,
                message: message.to_string(),
            };
            let (digest, path) = line
                .split_once(' ')
                .ok_or_else(|| invalid("expected '<digest>  <path>'"))?;
            let path = path.strip_prefix(' ').or_else(|| path.strip_prefix('*')).unwrap_or(path);
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("digest is not 64 hex characters"));
            }
            if path.is_empty() {
                return Err(invalid("missing path"));
            }
            listing.insert(path, digest.to_ascii_lowercase());
        }
        Ok(listing)
    }

    /// Verify actual digests against this listing.
    pub fn verify(&self, actual: &HashListing) -> VerificationReport {
        let mut report = VerificationReport::default();
        for (path, expected) in &self.entries {
            match actual.get(path) {
                Some(digest) if digest == expected => report.verified += 1,
                Some(_) => report.mismatched.push(path.clone()),
                None => report.missing.push(path.clone()),
            }
        }
        report.unlisted = actual
            .paths()
            .filter(|p| !self.entries.contains_key(*p))
            .map(str::to_string)
            .collect();
        report
    }
}

impl fmt::Display for HashListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, digest) in &self.entries {
            writeln!(f, "{}  {}", digest, path)?;
        }
        Ok(())
    }
}

/// Outcome of recomputing a pack's digests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub verified: usize,
    /// Listed files whose bytes changed
    pub mismatched: Vec<String>,
    /// Listed files that are gone
    pub missing: Vec<String>,
    /// Files present but not listed
    pub unlisted: Vec<String>,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty() && self.unlisted.is_empty()
    }

    pub fn problems(&self) -> Vec<String> {
        let tagged = |tag: &str, paths: &[String]| -> Vec<String> {
            paths.iter().map(|p| format!("{}: {}", tag, p)).collect()
        };
        let mut problems = tagged("mismatch", &self.mismatched);
        problems.extend(tagged("missing", &self.missing));
        problems.extend(tagged("unlisted", &self.unlisted));
        problems
    }
}

/// Files under `dir` as (`/`-separated relative path, absolute path), sorted.
pub(crate) fn pack_files(dir: &Path) -> EvidenceResult<Vec<(String, std::path::PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| EvidenceError::InvalidPath(entry.path().display().to_string()))?;
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push((relative.join("/"), entry.path().to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Recompute every digest of an unpacked pack directory.
pub fn verify_pack(dir: &Path) -> EvidenceResult<VerificationReport> {
    let listing_path = dir.join(HASHES);
    if !listing_path.is_file() {
        return Err(EvidenceError::NotAPack(dir.to_path_buf()));
    }
    let text = fs::read_to_string(&listing_path).map_err(|e| EvidenceError::io(&listing_path, e))?;
    let expected = HashListing::parse(&text)?;
    let report = expected.verify(&HashListing::from_dir(dir)?);
    log_report(dir, &report);
    Ok(report)
}

/// Recompute every digest inside an evidence archive.
///
/// The listing is located by name; its folder is the pack root.
pub fn verify_archive(path: &Path) -> EvidenceResult<VerificationReport> {
    let file = fs::File::open(path).map_err(|e| EvidenceError::io(path, e))?;
    let mut archive = ZipArchive::new(file)?;

    let root = archive
        .file_names()
        .filter_map(|name| name.strip_suffix(HASHES).map(str::to_string))
        .filter(|prefix| prefix.is_empty() || prefix.ends_with('/'))
        .min_by_key(String::len)
        .ok_or_else(|| EvidenceError::NotAPack(path.to_path_buf()))?;

    let text = read_entry(&mut archive, &format!("{}{}", root, HASHES), path)?;
    let expected = HashListing::parse(&String::from_utf8_lossy(&text))?;

    let mut actual = HashListing::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.name().strip_prefix(root.as_str()).map(str::to_string) else {
            continue;
        };
        if relative == HASHES {
            continue;
        }
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| EvidenceError::io(path, e))?;
        actual.insert(relative, sha256_hex(&bytes));
    }

    let report = expected.verify(&actual);
    log_report(path, &report);
    Ok(report)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str, path: &Path) -> EvidenceResult<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| EvidenceError::io(path, e))?;
    Ok(bytes)
}

fn log_report(target: &Path, report: &VerificationReport) {
    if report.is_valid() {
        info!("Verified {} file(s) in {:?}", report.verified, target);
    } else {
        for problem in report.problems() {
            warn!("{:?}: {}", target, problem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_listing_format_is_sorted_sha256sum() {
        let mut listing = HashListing::new();
        listing.insert("scope.json", sha256_hex(b"b"));
        listing.insert("collected_at.json", sha256_hex(b"a"));
        let text = listing.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  collected_at.json"));
        assert!(lines[1].ends_with("  scope.json"));
        assert_eq!(HashListing::parse(&text).unwrap(), listing);
    }

    #[test]
    fn test_parse_rejects_bad_digest() {
        let err = HashListing::parse("abc  scope.json\n").unwrap_err();
        assert!(matches!(err, EvidenceError::InvalidListing { line: 1, .. }));
    }

    #[test]
    fn test_parse_accepts_binary_marker() {
        let digest = sha256_hex(b"x");
        let listing = HashListing::parse(&format!("{} *declared/a.json\n", digest)).unwrap();
        assert_eq!(listing.get("declared/a.json"), Some(digest.as_str()));
    }

    #[test]
    fn test_verify_pack_detects_tampering() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("declared")).unwrap();
        fs::write(dir.path().join("scope.json"), "{}").unwrap();
        fs::write(dir.path().join("declared/inventory.json"), "[]").unwrap();

        let listing = HashListing::from_dir(dir.path()).unwrap();
        fs::write(dir.path().join(HASHES), listing.to_string()).unwrap();
        assert!(verify_pack(dir.path()).unwrap().is_valid());

        fs::write(dir.path().join("scope.json"), "{\"changed\":true}").unwrap();
        fs::write(dir.path().join("extra.json"), "{}").unwrap();
        fs::remove_file(dir.path().join("declared/inventory.json")).unwrap();

        let report = verify_pack(dir.path()).unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.mismatched, vec!["scope.json"]);
        assert_eq!(report.missing, vec!["declared/inventory.json"]);
        assert_eq!(report.unlisted, vec!["extra.json"]);
    }

    #[test]
    fn test_verify_pack_requires_listing() {
        let dir = tempdir().unwrap();
        assert!(matches!(verify_pack(dir.path()), Err(EvidenceError::NotAPack(_))));
    }
}
