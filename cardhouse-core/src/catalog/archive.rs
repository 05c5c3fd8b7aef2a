//! Package archive extraction and creation.
//!
//! Imports accept zip, tar.gz and tar.xz archives; exports are always zip.
//! Entries that would land outside the destination directory are skipped.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// Archive Format
// ============================================================================

/// Supported package archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
    /// XZ-compressed tar archive (.tar.xz)
    TarXz,
    /// ZIP archive (.zip)
    Zip,
}

impl ArchiveFormat {
    /// Infers the archive format from a file name.
    ///
    /// Unknown extensions are treated as zip, the format packages are shared in.
    pub fn from_path(path: &Path) -> Self {
        let lower = path.to_string_lossy().to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar.xz") {
            Self::TarXz
        } else {
            Self::Zip
        }
    }

    /// Strips the archive extension(s) from a file name.
    pub fn stem<'a>(&self, file_name: &'a str) -> &'a str {
        let suffixes: &[&str] = match self {
            Self::TarGz => &[".tar.gz", ".tgz"],
            Self::TarXz => &[".tar.xz"],
            Self::Zip => &[".zip"],
        };
        let lower = file_name.to_lowercase();
        for suffix in suffixes {
            if lower.ends_with(suffix) {
                return &file_name[..file_name.len() - suffix.len()];
            }
        }
        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        }
    }
}

// ============================================================================
// Archive Extraction
// ============================================================================

/// Extracts an archive to a destination directory.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or is structurally invalid.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path, format: ArchiveFormat) -> Result<()> {
    info!(
        "Extracting {:?} archive {} to {}",
        format,
        archive_path.display(),
        dest_dir.display()
    );

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => {
            let file = open(archive_path)?;
            extract_tar(flate2::read::GzDecoder::new(BufReader::new(file)), dest_dir)
        }
        ArchiveFormat::TarXz => {
            let file = open(archive_path)?;
            extract_tar(xz2::read::XzDecoder::new(BufReader::new(file)), dest_dir)
        }
    }
}

fn open(archive_path: &Path) -> Result<File> {
    File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                debug!("Skipping unsafe path in zip");
                continue;
            }
        };

        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }

    debug!("ZIP extraction complete");
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping symlink/hardlink in tar archive");
            continue;
        }

        let path = entry.path()?.into_owned();
        if !is_enclosed(&path) {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;
            io::copy(&mut entry, &mut outfile)?;
            outfile.flush()?;
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

/// Relative path with no `..`, root or prefix components.
fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ============================================================================
// Archive Creation
// ============================================================================

/// Zips `source_dir` into `target_dir/archive_name`, replacing any existing file.
///
/// Entry names are relative to `source_dir`, so a source containing a single
/// folder produces an archive with that folder at its top level.
pub fn create_zip(source_dir: &Path, target_dir: &Path, archive_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create directory: {}", target_dir.display()))?;

    let archive_path = target_dir.join(archive_name);
    info!(
        "Creating zip {} from {}",
        archive_path.display(),
        source_dir.display()
    );

    let file = File::create(&archive_path)
        .with_context(|| format!("Failed to create: {}", archive_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut stack = vec![source_dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current)
            .with_context(|| format!("Failed to read directory: {}", current.display()))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let relative = entry_name(source_dir, &path)?;

            if path.is_dir() {
                zip.add_directory(relative, options)?;
                stack.push(path);
            } else {
                zip.start_file(relative, options)?;
                let mut source = File::open(&path)
                    .with_context(|| format!("Failed to open: {}", path.display()))?;
                io::copy(&mut source, &mut zip)?;
            }
        }
    }

    zip.finish().context("Failed to finish zip archive")?;
    Ok(archive_path)
}

/// Forward-slash entry name of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
