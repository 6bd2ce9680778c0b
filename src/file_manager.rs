//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei media su filesystem per la CLI.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file media in una directory
//! - Determinazione del tipo di contenuto (immagine, video, audio) dall'estensione
//! - Conversione dei path in riferimenti relativi per `FileStorage`
//! - Utilità per dimensioni human-readable e percentuali
//!
//! ## Formati riconosciuti:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF, BMP, TIFF
//! - **Video**: MP4, MOV, AVI, MKV, WebM, M4V
//! - **Audio**: MP3, WAV, FLAC, AAC, M4A, OGG, OPUS
//!
//! ## Esempio:
//! ```rust
//! use content_optimizer::file_manager::FileManager;
//! use content_optimizer::ContentType;
//! use std::path::Path;
//!
//! assert_eq!(FileManager::content_type_for(Path::new("cover.JPG")), Some(ContentType::Image));
//! assert_eq!(FileManager::format_size(1536), "1.50 KB");
//! ```

use crate::types::ContentType;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "ogg", "opus"];

/// Filesystem helpers for the command line front end
pub struct FileManager;

impl FileManager {
    /// Find all supported media files under `media_dir`, sorted for stable batches
    pub fn find_media_files(media_dir: &Path) -> Result<Vec<PathBuf>> {
        if !media_dir.is_dir() {
            anyhow::bail!("Not a directory: {}", media_dir.display());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(media_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::content_type_for(path).is_some())
            .collect();
        files.sort();

        Ok(files)
    }

    pub fn content_type_for(path: &Path) -> Option<ContentType> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentType::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentType::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentType::Audio)
        } else {
            None
        }
    }

    /// Storage reference of `path` relative to `root`, with `/` separators
    pub fn relative_reference(root: &Path, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Bytes saved across a set of `(original, optimized)` pairs
    pub fn total_saved<I>(sizes: I) -> u64
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        sizes
            .into_iter()
            .map(|(original, optimized)| original.saturating_sub(optimized))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(FileManager::content_type_for(Path::new("a/b.PNG")), Some(ContentType::Image));
        assert_eq!(FileManager::content_type_for(Path::new("clip.mkv")), Some(ContentType::Video));
        assert_eq!(FileManager::content_type_for(Path::new("song.flac")), Some(ContentType::Audio));
        assert_eq!(FileManager::content_type_for(Path::new("notes.txt")), None);
        assert_eq!(FileManager::content_type_for(Path::new("README")), None);
    }

    #[test]
    fn test_find_media_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("nested/a.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("skip.txt"), b"x").unwrap();

        let files = FileManager::find_media_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| FileManager::content_type_for(f).is_some()));
        assert!(FileManager::find_media_files(&dir.path().join("b.jpg")).is_err());
    }

    #[test]
    fn test_relative_reference() {
        let root = Path::new("/media");
        let reference = FileManager::relative_reference(root, Path::new("/media/albums/one/cover.jpg")).unwrap();
        assert_eq!(reference, "albums/one/cover.jpg");
        assert!(FileManager::relative_reference(root, Path::new("/elsewhere/x.jpg")).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1024), "1.00 KB");
        assert_eq!(FileManager::format_size(1024 * 1024 * 3 / 2), "1.50 MB");
    }

    #[test]
    fn test_total_saved_ignores_growth() {
        assert_eq!(FileManager::total_saved(vec![(100, 40), (50, 80)]), 60);
    }
}
