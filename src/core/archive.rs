// ─── Archive extraction ───
// Zip, tar and tar.gz unpacking with an optional leading-directory rewrite.
// All functions here block; async callers run them on the blocking pool.

use std::io::{Read, Seek};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

/// How archive entry names map onto the destination directory.
#[derive(Debug, Clone, Default)]
pub struct PathRewrite {
    /// Leading directory removed from every entry that starts with it.
    pub strip_prefix: Option<String>,
}

impl PathRewrite {
    pub fn strip(prefix: impl Into<String>) -> Self {
        Self {
            strip_prefix: Some(prefix.into().trim_end_matches('/').to_string()),
        }
    }

    /// Returns the sanitized relative output path, or `None` when the entry
    /// collapses to nothing (the stripped directory itself).
    ///
    /// Only normal components survive, so `..` and absolute names cannot
    /// escape the destination.
    pub fn apply(&self, entry: &Path) -> Option<PathBuf> {
        let mut parts = entry
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .peekable();

        if let Some(prefix) = &self.strip_prefix {
            if parts.peek().map(|p| *p == prefix.as_str()).unwrap_or(false) {
                parts.next();
            }
        }

        let rel: PathBuf = parts.collect();
        if rel.as_os_str().is_empty() {
            None
        } else {
            Some(rel)
        }
    }
}

pub fn extract_zip<R: Read + Seek>(
    reader: R,
    dest: &Path,
    rewrite: &PathRewrite,
) -> LauncherResult<usize> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let raw = zipped.name().replace('\\', "/");
        let Some(rel) = rewrite.apply(Path::new(&raw)) else {
            continue;
        };
        ensure_no_symlink_ancestors(dest, &rel)?;
        let out_path = dest.join(rel);

        if zipped.is_dir() {
            create_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let mut out =
            std::fs::File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut zipped, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = zipped.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                .map_err(|e| LauncherError::io(&out_path, e))?;
        }
        written += 1;
    }

    debug!("Extracted {} zip entries into {:?}", written, dest);
    Ok(written)
}

pub fn extract_tar<R: Read>(reader: R, dest: &Path, rewrite: &PathRewrite) -> LauncherResult<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let mut written = 0;

    let entries = archive
        .entries()
        .map_err(|e| LauncherError::ArchiveCorrupt(format!("bad tar archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| LauncherError::ArchiveCorrupt(format!("bad tar entry: {e}")))?;
        let raw = entry
            .path()
            .map_err(|e| LauncherError::ArchiveCorrupt(format!("invalid tar path: {e}")))?
            .to_path_buf();
        let Some(rel) = rewrite.apply(&raw) else {
            continue;
        };
        ensure_no_symlink_ancestors(dest, &rel)?;

        let kind = entry.header().entry_type();
        if kind.is_hard_link() {
            return Err(LauncherError::ArchiveCorrupt(format!(
                "hard link {:?} is not supported",
                raw
            )));
        }
        if kind.is_symlink() {
            let target = entry
                .link_name()
                .map_err(|e| LauncherError::ArchiveCorrupt(format!("invalid link target: {e}")))?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            if !link_stays_inside(&rel, &target) {
                return Err(LauncherError::ArchiveCorrupt(format!(
                    "symlink {:?} points outside the archive ({:?})",
                    raw, target
                )));
            }
        }

        let out_path = dest.join(rel);
        if kind.is_dir() {
            create_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| LauncherError::ArchiveCorrupt(format!("extract {:?}: {e}", out_path)))?;
        written += 1;
    }

    debug!("Extracted {} tar entries into {:?}", written, dest);
    Ok(written)
}

pub fn extract_tar_gz<R: Read>(
    reader: R,
    dest: &Path,
    rewrite: &PathRewrite,
) -> LauncherResult<usize> {
    extract_tar(GzDecoder::new(reader), dest, rewrite)
}

/// Unpacks a tarball stored as a single entry inside a zip.
pub fn extract_tar_in_zip<R: Read + Seek>(
    reader: R,
    inner_name: &str,
    dest: &Path,
    rewrite: &PathRewrite,
) -> LauncherResult<usize> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let inner = match archive.by_name(inner_name) {
        Ok(inner) => inner,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(LauncherError::ArchiveCorrupt(format!(
                "{inner_name} not found in archive"
            )))
        }
        Err(e) => return Err(e.into()),
    };
    extract_tar(inner, dest, rewrite)
}

/// Refuses entries that would be written through a symlink already on disk.
fn ensure_no_symlink_ancestors(dest: &Path, rel: &Path) -> LauncherResult<()> {
    let mut current = dest.to_path_buf();
    let mut parts = rel.components().peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            break;
        }
        current.push(part);
        if let Ok(meta) = std::fs::symlink_metadata(&current) {
            if meta.file_type().is_symlink() {
                return Err(LauncherError::ArchiveCorrupt(format!(
                    "{:?} is written through symlink {:?}",
                    rel, current
                )));
            }
        }
    }
    Ok(())
}

/// Whether a relative symlink at `rel` resolves to somewhere below the
/// extraction root.
fn link_stays_inside(rel: &Path, target: &Path) -> bool {
    let mut depth = rel.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    !target.as_os_str().is_empty()
}

fn create_dir(path: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(path).map_err(|e| LauncherError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn rewrite_strips_only_leading_prefix() {
        let rewrite = PathRewrite::strip("client_distribution/");
        assert_eq!(
            rewrite.apply(Path::new("client_distribution/linux/starbound")),
            Some(PathBuf::from("linux/starbound"))
        );
        assert_eq!(
            rewrite.apply(Path::new("other/client_distribution/x")),
            Some(PathBuf::from("other/client_distribution/x"))
        );
        assert_eq!(rewrite.apply(Path::new("client_distribution/")), None);
    }

    #[test]
    fn rewrite_drops_parent_components() {
        let rewrite = PathRewrite::default();
        assert_eq!(
            rewrite.apply(Path::new("../../etc/passwd")),
            Some(PathBuf::from("etc/passwd"))
        );
    }

    fn tar_with_link(link: &str, target: &Path, then: (&str, &[u8])) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        builder.append_link(&mut header, link, target).unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_size(then.1.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, then.0, then.1).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn symlink_out_of_destination_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tar = tar_with_link(
            "client_distribution/linux",
            outside.path(),
            ("client_distribution/linux/starbound", b"payload"),
        );

        let err = extract_tar(
            Cursor::new(tar),
            dest.path(),
            &PathRewrite::strip("client_distribution"),
        )
        .unwrap_err();

        assert!(matches!(err, LauncherError::ArchiveCorrupt(_)));
        assert!(!outside.path().join("starbound").exists());
    }

    #[test]
    fn writes_through_inner_symlinks_are_rejected() {
        let dest = tempfile::tempdir().unwrap();
        let tar = tar_with_link("here", Path::new("."), ("here/sub/file", b"x"));

        let err = extract_tar(Cursor::new(tar), dest.path(), &PathRewrite::default()).unwrap_err();
        assert!(matches!(err, LauncherError::ArchiveCorrupt(_)));
        assert!(!dest.path().join("sub").exists());
    }

    #[test]
    fn link_targets_are_resolved_from_their_directory() {
        assert!(link_stays_inside(Path::new("lib/libfoo.so"), Path::new("libfoo.so.1")));
        assert!(link_stays_inside(Path::new("a/b/c"), Path::new("../d")));
        assert!(!link_stays_inside(Path::new("a"), Path::new("../etc")));
        assert!(!link_stays_inside(Path::new("a/b"), Path::new("/etc/passwd")));
    }

    #[test]
    fn tar_in_zip_is_unpacked_with_prefix_removed() {
        let tar = tar_bytes(&[("client_distribution/linux/starbound", b"#!/bin/sh\n")]);
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("client.tar", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&tar).unwrap();
        let zip = zip.finish().unwrap().into_inner();

        let dir = tempfile::tempdir().unwrap();
        let written = extract_tar_in_zip(
            Cursor::new(zip),
            "client.tar",
            dir.path(),
            &PathRewrite::strip("client_distribution"),
        )
        .unwrap();

        assert_eq!(written, 1);
        assert!(dir.path().join("linux").join("starbound").is_file());
    }

    #[test]
    fn missing_inner_tar_is_corrupt_archive() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hi").unwrap();
        let zip = zip.finish().unwrap().into_inner();

        let dir = tempfile::tempdir().unwrap();
        let err = extract_tar_in_zip(Cursor::new(zip), "client.tar", dir.path(), &PathRewrite::default())
            .unwrap_err();
        assert!(matches!(err, LauncherError::ArchiveCorrupt(_)));
    }

    #[test]
    fn garbage_is_rejected_as_zip() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_zip(Cursor::new(b"not a zip".to_vec()), dir.path(), &PathRewrite::default())
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
