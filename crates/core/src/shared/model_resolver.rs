use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot derive a model file name from {0}")]
    UnnamedUrl(String),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where a model comes from, as given on the command line or in config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Remote { url: String, file_name: String },
}

impl ModelSource {
    pub fn parse(source: &str) -> Result<Self, ModelResolveError> {
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Ok(Self::Local(PathBuf::from(source)));
        }
        let file_name = source
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty() && !name.contains(':'))
            .ok_or_else(|| ModelResolveError::UnnamedUrl(source.to_string()))?;
        Ok(Self::Remote {
            url: source.to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// Resolve a model given as a local path or an `http(s)` URL.
///
/// Local paths must exist. URLs are served from the user cache directory,
/// downloading on first use.
pub fn resolve(source: &str, progress: Option<ProgressFn>) -> Result<PathBuf, ModelResolveError> {
    match ModelSource::parse(source)? {
        ModelSource::Local(path) => resolve_local(path),
        remote => resolve_in(&remote, &model_cache_dir()?, progress),
    }
}

/// Resolution against an explicit cache directory.
pub fn resolve_in(
    source: &ModelSource,
    cache_dir: &Path,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    match source {
        ModelSource::Local(path) => resolve_local(path.clone()),
        ModelSource::Remote { url, file_name } => {
            let cached_path = cache_dir.join(file_name);
            if cached_path.exists() {
                return Ok(cached_path);
            }
            fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
            log::info!("Downloading model {url}");
            download(url, &cached_path, progress)?;
            Ok(cached_path)
        }
    }
}

fn resolve_local(path: PathBuf) -> Result<PathBuf, ModelResolveError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelResolveError::NotFound(path))
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/GalleryReid/models/`
/// - Linux: `$XDG_CACHE_HOME/GalleryReid/models/` or `~/.cache/GalleryReid/models/`
/// - Windows: `%LOCALAPPDATA%/GalleryReid/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join(APP_DIR_NAME).join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = stream_to(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn stream_to(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let download_err = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;
    let total = response.content_length().unwrap_or(0);

    let mut file = fs::File::create(temp_path).map_err(write_err)?;
    let mut buf = vec![0u8; 1024 * 1024];
    let mut downloaded: u64 = 0;
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|source| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_parse_local_path() {
        assert_eq!(
            ModelSource::parse("models/osnet.onnx").unwrap(),
            ModelSource::Local(PathBuf::from("models/osnet.onnx"))
        );
    }

    #[rstest]
    #[case::plain("https://host/models/yolo11n.onnx", "yolo11n.onnx")]
    #[case::query("https://host/osnet_x1_0.onnx?download=1", "osnet_x1_0.onnx")]
    #[case::http("http://host/a/b/model.onnx", "model.onnx")]
    fn test_parse_url_file_name(#[case] url: &str, #[case] expected: &str) {
        match ModelSource::parse(url).unwrap() {
            ModelSource::Remote { file_name, .. } => assert_eq!(file_name, expected),
            other => panic!("expected remote source, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_url_without_file_name() {
        assert!(matches!(
            ModelSource::parse("https://host/models/"),
            Err(ModelResolveError::UnnamedUrl(_))
        ));
    }

    #[test]
    fn test_resolve_existing_local_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("osnet.onnx");
        fs::write(&path, b"fake model").unwrap();

        let resolved = resolve(path.to_str().unwrap(), None).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_resolve_missing_local_file() {
        assert!(matches!(
            resolve("/nonexistent/osnet.onnx", None),
            Err(ModelResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_remote_uses_cached_copy() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("yolo11n.onnx"), b"cached").unwrap();
        let source = ModelSource::parse("http://invalid.nonexistent.example.com/yolo11n.onnx")
            .unwrap();

        let resolved = resolve_in(&source, tmp.path(), None).unwrap();
        assert_eq!(resolved, tmp.path().join("yolo11n.onnx"));
    }

    #[test]
    fn test_download_failure_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let source =
            ModelSource::parse("http://invalid.nonexistent.example.com/model.onnx").unwrap();

        assert!(resolve_in(&source, tmp.path(), None).is_err());
        assert!(!tmp.path().join("model.onnx").exists());
        assert!(!tmp.path().join("model.part").exists());
    }

    #[test]
    fn test_model_cache_dir_contains_app_name() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains(APP_DIR_NAME));
        assert!(path.to_string_lossy().contains("models"));
    }
}
