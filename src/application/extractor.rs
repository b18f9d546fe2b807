use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    domain::{AppError, ProductFolder},
    utils::extension_of,
};

#[derive(Debug, Clone, Copy)]
enum ArchiveKind {
    Tar,
    Zip,
}

/// Turns a downloaded artifact into a folder of plain files.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    laszip_path: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(laszip_path: PathBuf) -> Self {
        Self { laszip_path }
    }

    /// Unpacks `.tar`/`.zip` archives and decompresses `.laz` point clouds,
    /// removing the original on success. Other files are left alone.
    pub async fn extract_if_needed(&self, mut folder: ProductFolder) -> Result<ProductFolder, AppError> {
        let Some(archive) = folder.archive_path.clone() else {
            return Ok(folder);
        };

        let kind = match extension_of(&archive).as_deref() {
            Some("tar") => ArchiveKind::Tar,
            Some("zip") => ArchiveKind::Zip,
            Some("laz") => {
                let output = self.decompress_laz(&archive).await?;
                folder.archive_path = None;
                folder.extracted_files = vec![output];
                return Ok(folder);
            }
            _ => return Ok(folder),
        };

        let extracted = unpack(archive.clone(), folder.path.clone(), kind).await?;
        tokio::fs::remove_file(&archive).await?;

        info!(
            archive = %archive.display(),
            files = extracted.len(),
            "extracted"
        );
        folder.archive_path = None;
        folder.extracted_files = extracted;
        Ok(folder)
    }

    /// Runs `laszip -i <input> -o <output.las>` and deletes the input once the
    /// tool reports success. A failing exit status keeps the input in place.
    pub async fn decompress_laz(&self, input: &Path) -> Result<PathBuf, AppError> {
        let output = input.with_extension("las");

        let mut command = Command::new(&self.laszip_path);
        command
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Hide console window on Windows
        #[cfg(windows)]
        command.creation_flags(0x08000000); // CREATE_NO_WINDOW

        let status = command.status().await.map_err(|e| AppError::Extraction {
            path: input.to_path_buf(),
            reason: format!("failed to start {}: {}", self.laszip_path.display(), e),
        })?;

        if !status.success() {
            warn!(input = %input.display(), code = ?status.code(), "laszip failed");
            return Err(AppError::DecompressionFailed {
                path: input.to_path_buf(),
                code: status.code(),
            });
        }

        tokio::fs::remove_file(input).await?;
        Ok(output)
    }
}

async fn unpack(archive: PathBuf, destination: PathBuf, kind: ArchiveKind) -> Result<Vec<PathBuf>, AppError> {
    let path = archive.clone();
    let result = tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::Tar => unpack_tar(&archive, &destination),
        ArchiveKind::Zip => unpack_zip(&archive, &destination),
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|inner| inner);

    result.map_err(|reason| AppError::Extraction { path, reason })
}

fn unpack_tar(archive_path: &Path, destination: &Path) -> Result<Vec<PathBuf>, String> {
    let file = File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = tar::Archive::new(file);
    archive.set_overwrite(true);

    let mut files = Vec::new();
    for entry in archive.entries().map_err(|e| e.to_string())? {
        let mut entry = entry.map_err(|e| e.to_string())?;
        let relative = entry.path().map_err(|e| e.to_string())?.into_owned();
        let is_file = entry.header().entry_type().is_file();

        // unpack_in refuses entries that would escape the destination
        let unpacked = entry.unpack_in(destination).map_err(|e| e.to_string())?;
        if unpacked && is_file {
            files.push(destination.join(relative));
        }
    }

    Ok(files)
}

fn unpack_zip(archive_path: &Path, destination: &Path) -> Result<Vec<PathBuf>, String> {
    let file = File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if entry.is_dir() {
            continue;
        }
        if let Some(name) = entry.enclosed_name() {
            files.push(destination.join(name));
        }
    }

    archive.extract(destination).map_err(|e| e.to_string())?;
    Ok(files)
}
