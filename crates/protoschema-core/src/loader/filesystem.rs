//! Root resolution: turns a caller-supplied location into searchable roots.
//!
//! A location names a directory, an archive (`.zip`/`.jar`) or a single
//! `.proto` file, possibly behind a symlink. Reads go through the physical
//! target; the [`Location`]s handed out keep the logical path the caller
//! supplied.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{SchemaError, SchemaResult};
use crate::models::Location;

const PROTO_SUFFIX: &str = ".proto";
const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".jar"];

#[derive(Clone, Debug)]
enum RootKind {
    Directory(PathBuf),
    Archive {
        physical: PathBuf,
        entries: BTreeSet<String>,
    },
    File {
        location: Location,
        physical: PathBuf,
    },
}

/// One concrete searchable root.
#[derive(Clone, Debug)]
pub struct Root {
    base: String,
    kind: RootKind,
}

fn is_archive(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn archive_entries(physical: &Path) -> SchemaResult<BTreeSet<String>> {
    let archive = zip::ZipArchive::new(File::open(physical)?)?;
    Ok(archive
        .file_names()
        .filter(|name| name.ends_with(PROTO_SUFFIX))
        .map(|name| name.trim_start_matches('/').to_string())
        .collect())
}

/// Expand `location` into the roots it denotes.
///
/// `base/path` (or just `path` when `base` is empty) is the logical path.
/// A directory or archive becomes a root whose base is that logical path.
/// Anything else is a single-file root that keeps `location` as given.
pub fn resolve_roots(location: &Location) -> SchemaResult<Vec<Root>> {
    let logical = location.to_string();
    let physical = std::fs::canonicalize(&logical)?;
    let metadata = std::fs::metadata(&physical)?;

    let kind = if metadata.is_dir() {
        RootKind::Directory(physical)
    } else if is_archive(&logical) {
        let entries = archive_entries(&physical)?;
        RootKind::Archive { physical, entries }
    } else {
        return Ok(vec![Root {
            base: location.base.clone(),
            kind: RootKind::File {
                location: location.clone(),
                physical,
            },
        }]);
    };
    debug!("resolved root {logical}");
    Ok(vec![Root {
        base: logical,
        kind,
    }])
}

impl Root {
    /// The search-root string recorded as `Location::base`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Every `.proto` file in this root, sorted by path.
    pub fn proto_files(&self) -> SchemaResult<Vec<Location>> {
        match &self.kind {
            RootKind::Directory(physical) => {
                let mut out = Vec::new();
                let walker = WalkDir::new(physical).follow_links(true).sort_by_file_name();
                for entry in walker {
                    let entry = entry?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let path = entry.path();
                    if !path.to_string_lossy().ends_with(PROTO_SUFFIX) {
                        continue;
                    }
                    let relative = path.strip_prefix(physical).unwrap_or(path);
                    out.push(Location::get(self.base.clone(), normalize(relative)));
                }
                Ok(out)
            }
            RootKind::Archive { entries, .. } => Ok(entries
                .iter()
                .map(|entry| Location::get(self.base.clone(), entry.clone()))
                .collect()),
            RootKind::File { location, .. } => Ok(vec![location.clone()]),
        }
    }

    /// The location of `import` inside this root, if present.
    pub fn find(&self, import: &str) -> Option<Location> {
        let found = match &self.kind {
            RootKind::Directory(physical) => physical.join(import).is_file(),
            RootKind::Archive { entries, .. } => entries.contains(import),
            RootKind::File { location, .. } => location.path == import,
        };
        if !found {
            return None;
        }
        match &self.kind {
            RootKind::File { location, .. } => Some(location.clone()),
            _ => Some(Location::get(self.base.clone(), import)),
        }
    }

    /// Absolute physical path of `relative` inside this root. Archive
    /// entries are rendered as `archive/entry`.
    pub fn physical_path(&self, relative: &str) -> String {
        match &self.kind {
            RootKind::Directory(physical) => {
                let joined = physical.join(relative);
                normalize(&std::fs::canonicalize(&joined).unwrap_or(joined))
            }
            RootKind::Archive { physical, .. } => format!("{}/{relative}", normalize(physical)),
            RootKind::File { physical, .. } => normalize(physical),
        }
    }

    /// Read the file at `location`, which must have come from this root.
    pub fn read(&self, location: &Location) -> SchemaResult<String> {
        match &self.kind {
            RootKind::Directory(physical) => {
                Ok(std::fs::read_to_string(physical.join(&location.path))?)
            }
            RootKind::Archive { physical, .. } => {
                let mut archive = zip::ZipArchive::new(File::open(physical)?)?;
                let name = if archive.index_for_name(&location.path).is_some() {
                    location.path.clone()
                } else {
                    format!("/{}", location.path)
                };
                let mut entry = archive.by_name(&name)?;
                let mut source = String::new();
                entry.read_to_string(&mut source)?;
                Ok(source)
            }
            RootKind::File { physical, .. } => Ok(std::fs::read_to_string(physical)?),
        }
    }
}

/// Resolve every location, failing on the first that does not exist.
pub fn resolve_all(locations: &[Location]) -> SchemaResult<Vec<Root>> {
    let mut roots = Vec::new();
    for location in locations {
        let resolved = resolve_roots(location).map_err(|err| match err {
            SchemaError::Io(io) => SchemaError::Io(std::io::Error::new(
                io.kind(),
                format!("{location}: {io}"),
            )),
            other => other,
        })?;
        roots.extend(resolved);
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_tree;
    use std::io::Write;

    #[test]
    fn directory_root_lists_proto_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(
            dir.path(),
            &[
                ("b/two.proto", "package b;"),
                ("a/one.proto", "package a;"),
                ("a/notes.txt", "ignored"),
            ],
        );
        let base = dir.path().to_string_lossy().to_string();
        let roots = resolve_roots(&Location::get("", base.clone())).unwrap();
        assert_eq!(roots.len(), 1);
        let files = roots[0].proto_files().unwrap();
        let paths: Vec<&str> = files.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["a/one.proto", "b/two.proto"]);
        assert!(files.iter().all(|l| l.base == base));
        assert!(roots[0].find("a/one.proto").is_some());
        assert!(roots[0].find("a/missing.proto").is_none());
    }

    #[test]
    fn single_file_root_keeps_location() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("acme/user.proto", "package acme;")]);
        let base = dir.path().to_string_lossy().to_string();
        let location = Location::get(base, "acme/user.proto");
        let roots = resolve_roots(&location).unwrap();
        assert_eq!(roots[0].proto_files().unwrap(), vec![location.clone()]);
        assert_eq!(roots[0].read(&location).unwrap(), "package acme;");
    }

    #[test]
    fn archive_root_mounts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("protos.jar");
        let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("acme/a.proto", options).unwrap();
        writer.write_all(b"package acme;").unwrap();
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(b"Manifest-Version: 1.0").unwrap();
        writer.finish().unwrap();

        let logical = archive_path.to_string_lossy().to_string();
        let roots = resolve_roots(&Location::get("", logical.clone())).unwrap();
        let files = roots[0].proto_files().unwrap();
        assert_eq!(files, vec![Location::get(logical, "acme/a.proto")]);
        assert_eq!(roots[0].read(&files[0]).unwrap(), "package acme;");
    }

    #[test]
    fn archive_entries_with_leading_slash_are_readable() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("rooted.zip");
        let mut writer = zip::ZipWriter::new(File::create(&archive_path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("/acme/b.proto", options).unwrap();
        writer.write_all(b"package acme;").unwrap();
        writer.finish().unwrap();

        let logical = archive_path.to_string_lossy().to_string();
        let roots = resolve_roots(&Location::get("", logical.clone())).unwrap();
        let files = roots[0].proto_files().unwrap();
        assert_eq!(files, vec![Location::get(logical, "acme/b.proto")]);
        assert_eq!(roots[0].read(&files[0]).unwrap(), "package acme;");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_root_keeps_logical_base() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("real/acme/a.proto", "package acme;")]);
        let link = dir.path().join("linked");
        std::os::unix::fs::symlink(dir.path().join("real"), &link).unwrap();

        let logical = link.to_string_lossy().to_string();
        let roots = resolve_roots(&Location::get("", logical.clone())).unwrap();
        let files = roots[0].proto_files().unwrap();
        assert_eq!(files, vec![Location::get(logical, "acme/a.proto")]);
        assert!(roots[0].physical_path("acme/a.proto").contains("/real/"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = resolve_all(&[Location::get("", "/definitely/not/here")]).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here"));
    }
}
