// Archive extraction for downloaded tools.
//
// Archives are unpacked into a staging directory next to the destination, the single
// wrapping top-level directory is optionally hoisted out (`rust-1.2.0-x86_64-.../*`
// becomes the install dir itself), and the result is renamed into place. A failed
// extraction therefore never leaves a half-populated install directory behind.

use crate::libs::utilities::deadline::Deadline;
use crate::libs::utilities::path_helpers::{is_populated, list_top_level};
use crate::schemas::errors::InstallError;
use crate::{log_debug, log_info, log_warn};
use bzip2::read::BzDecoder;
use colored::Colorize;
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Archive formats we know how to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    TarXz,
    Tar,
    Zip,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
        };
        f.write_str(s)
    }
}

/// What to do when the destination already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Fail with an extraction error.
    Refuse,
    /// Swap the existing directory for the new tree once unpacking succeeded.
    /// Extracting twice gives the same tree.
    Replace,
}

/// Detects the archive format, first from the file name, then from the leading bytes
/// (download URLs do not always carry an extension).
pub fn detect_archive_format(path: &Path) -> Result<ArchiveFormat, InstallError> {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Ok(ArchiveFormat::TarGz);
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
        return Ok(ArchiveFormat::TarBz2);
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        return Ok(ArchiveFormat::TarXz);
    } else if name.ends_with(".tar") {
        return Ok(ArchiveFormat::Tar);
    } else if name.ends_with(".zip") {
        return Ok(ArchiveFormat::Zip);
    }

    log_debug!(
        "[Extract] No known extension on {}, sniffing content",
        name.dimmed()
    );
    let mut head = [0u8; 262];
    let read = File::open(path)
        .and_then(|mut f| read_up_to(&mut f, &mut head))
        .map_err(|e| InstallError::io(path, e))?;
    let head = &head[..read];

    if head.starts_with(&[0x1f, 0x8b]) {
        Ok(ArchiveFormat::TarGz)
    } else if head.starts_with(b"BZh") {
        Ok(ArchiveFormat::TarBz2)
    } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Ok(ArchiveFormat::TarXz)
    } else if head.starts_with(b"PK\x03\x04") {
        Ok(ArchiveFormat::Zip)
    } else if head.len() >= 262 && &head[257..262] == b"ustar" {
        Ok(ArchiveFormat::Tar)
    } else {
        Err(InstallError::Extraction(format!(
            "{} is not a supported archive",
            path.display()
        )))
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Extracts `archive` so that its payload becomes the content of `dest`.
///
/// The archive is fully unpacked and its strip root resolved before `dest` is touched,
/// so a corrupt or ambiguous archive leaves an existing install as it was.
///
/// # Arguments
/// * `archive`: the downloaded archive.
/// * `dest`: the install directory.
/// * `strip_pattern`: glob for the single wrapping top-level directory to hoist.
///   No match means the archive is extracted verbatim; several matches is an error.
/// * `policy`: behaviour when `dest` already has content.
/// * `deadline`: bound on the whole extraction, checked between entries.
///
/// # Returns
/// * `Ok(())` once `dest` holds the new tree.
/// * `Err(InstallError::Extraction)` for unsupported, corrupt, empty or ambiguous archives,
///   and for a populated `dest` under [`OverwritePolicy::Refuse`].
pub fn extract(
    archive: &Path,
    dest: &Path,
    strip_pattern: Option<&str>,
    policy: OverwritePolicy,
    deadline: &Deadline,
) -> Result<(), InstallError> {
    log_info!(
        "[Extract] Extracting {} into {}",
        archive.display().to_string().blue(),
        dest.display().to_string().cyan()
    );

    // A bad glob is a table error, not an archive error.
    let pattern = strip_pattern
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| InstallError::Config(format!("invalid strip pattern '{p}': {e}")))
        })
        .transpose()?;

    // Refuse before anything is unpacked.
    let replace = is_populated(dest);
    if replace && policy == OverwritePolicy::Refuse {
        return Err(InstallError::Extraction(format!(
            "destination {} is not empty",
            dest.display()
        )));
    }

    // Stage next to `dest` so the final rename stays on one filesystem.
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".devmake-extract-")
        .tempdir_in(parent)
        .map_err(|e| InstallError::io(parent, e))?;

    let format = detect_archive_format(archive)?;
    log_debug!("[Extract] Archive format: {}", format.to_string().magenta());
    unpack(archive, format, staging.path(), deadline)?;

    let source = match &pattern {
        Some(pattern) => select_stripped_root(staging.path(), pattern)?,
        None => staging.path().to_path_buf(),
    };

    // Only now is the new tree known to be good; swap it in.
    if replace {
        log_info!(
            "[Extract] Replacing existing content of {}",
            dest.display().to_string().yellow()
        );
        fs::remove_dir_all(dest).map_err(|e| InstallError::io(dest, e))?;
    } else if dest.exists() {
        // An empty directory, e.g. created by the user beforehand.
        fs::remove_dir(dest).map_err(|e| InstallError::io(dest, e))?;
    }
    fs::rename(&source, dest).map_err(|e| InstallError::io(dest, e))?;
    if source == staging.path() {
        // The staging dir itself became `dest`; nothing is left to clean up.
        let _ = staging.keep();
        #[cfg(unix)]
        {
            // Temp dirs are created 0700.
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dest, fs::Permissions::from_mode(0o755))
                .map_err(|e| InstallError::io(dest, e))?;
        }
    }

    log_debug!(
        "[Extract] {} entries now under {}",
        walkdir::WalkDir::new(dest).min_depth(1).into_iter().count(),
        dest.display()
    );
    Ok(())
}

/// Finds the directory to hoist. Zero matches keeps the archive as is.
fn select_stripped_root(staging: &Path, pattern: &glob::Pattern) -> Result<PathBuf, InstallError> {
    let matches: Vec<String> = list_top_level(staging)
        .into_iter()
        .filter(|name| pattern.matches(name) && staging.join(name).is_dir())
        .collect();

    match matches.as_slice() {
        [] => {
            log_debug!(
                "[Extract] No top-level directory matches '{}', extracting verbatim",
                pattern.as_str()
            );
            Ok(staging.to_path_buf())
        }
        [single] => {
            log_debug!("[Extract] Stripping top-level directory '{}'", single.cyan());
            Ok(staging.join(single))
        }
        many => Err(InstallError::Extraction(format!(
            "strip pattern '{}' is ambiguous, it matches {}",
            pattern.as_str(),
            many.join(", ")
        ))),
    }
}

/// Unpacks every entry of the archive under `into`.
fn unpack(
    archive: &Path,
    format: ArchiveFormat,
    into: &Path,
    deadline: &Deadline,
) -> Result<(), InstallError> {
    let file = File::open(archive).map_err(|e| InstallError::io(archive, e))?;
    match format {
        ArchiveFormat::TarGz => unpack_tar(Archive::new(GzDecoder::new(file)), into, deadline),
        ArchiveFormat::TarBz2 => unpack_tar(Archive::new(BzDecoder::new(file)), into, deadline),
        ArchiveFormat::TarXz => unpack_tar(Archive::new(XzDecoder::new(file)), into, deadline),
        ArchiveFormat::Tar => unpack_tar(Archive::new(file), into, deadline),
        ArchiveFormat::Zip => unpack_zip(file, into, deadline),
    }
}

fn unpack_tar<R: Read>(
    mut archive: Archive<R>,
    into: &Path,
    deadline: &Deadline,
) -> Result<(), InstallError> {
    let corrupt = |e: io::Error| InstallError::Extraction(format!("corrupt tar archive: {e}"));
    let mut count = 0usize;
    for entry in archive.entries().map_err(corrupt)? {
        deadline.check()?;
        let mut entry = entry.map_err(corrupt)?;
        entry.unpack_in(into).map_err(corrupt)?;
        count += 1;
    }
    if count == 0 {
        return Err(InstallError::Extraction("archive is empty".to_string()));
    }
    Ok(())
}

fn unpack_zip(file: File, into: &Path, deadline: &Deadline) -> Result<(), InstallError> {
    let corrupt = |e: zip::result::ZipError| {
        InstallError::Extraction(format!("corrupt zip archive: {e}"))
    };
    let mut archive = ZipArchive::new(file).map_err(corrupt)?;
    if archive.len() == 0 {
        return Err(InstallError::Extraction("archive is empty".to_string()));
    }
    for i in 0..archive.len() {
        deadline.check()?;
        let mut entry = archive.by_index(i).map_err(corrupt)?;
        // Entries escaping the extraction root are skipped.
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            log_warn!("[Extract] Skipping unsafe zip entry '{}'", entry.name().red());
            continue;
        };
        let out = into.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| InstallError::io(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
        }
        let mut outfile = File::create(&out).map_err(|e| InstallError::io(&out, e))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|e| InstallError::Extraction(format!("corrupt zip entry {}: {e}", entry.name())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))
                    .map_err(|e| InstallError::io(&out, e))?;
            }
        }
    }
    Ok(())
}

/// Marks the expected executables of a tool as executable.
///
/// A missing executable means the upstream archive layout changed under us; the error
/// names what we expected and what the install dir actually holds.
pub fn mark_executables(install_dir: &Path, executables: &[String]) -> Result<Vec<PathBuf>, InstallError> {
    let mut marked = Vec::with_capacity(executables.len());
    for relative in executables {
        let path = install_dir.join(relative);
        if !path.is_file() {
            return Err(InstallError::Layout {
                dir: install_dir.to_path_buf(),
                expected: relative.clone(),
                found: list_top_level(install_dir),
            });
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)
                .map_err(|e| InstallError::io(&path, e))?
                .permissions();
            perms.set_mode(perms.mode() | 0o755);
            fs::set_permissions(&path, perms).map_err(|e| InstallError::io(&path, e))?;
        }
        log_debug!("[Extract] Marked {} executable", relative.green());
        marked.push(path);
    }
    Ok(marked)
}
