use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::MetricSample;

/// Asset class a built file is counted under.
pub fn asset_class(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "js" | "mjs" | "cjs" => Some("js"),
        "css" => Some("css"),
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" => Some("images"),
        "woff" | "woff2" | "ttf" | "otf" | "eot" => Some("fonts"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub path: PathBuf,
    pub class: Option<String>,
    pub bytes: u64,
}

/// Walks a build output directory and returns every file with its size.
pub fn scan_dist(dist: &Path) -> Result<Vec<AssetFile>> {
    if !dist.is_dir() {
        bail!("dist directory {} does not exist; build the site first", dist.display());
    }

    let mut files = Vec::new();
    let mut pending = vec![dist.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
            let path = entry.path();
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() {
                files.push(AssetFile {
                    class: asset_class(&path).map(str::to_string),
                    bytes: metadata.len(),
                    path,
                });
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Per-class sizes in KB plus `total` over every file.
pub fn bundle_sample(files: &[AssetFile], timestamp: DateTime<Utc>) -> MetricSample {
    let mut sample = MetricSample::new(timestamp, "dist");
    for class in ["js", "css", "images", "fonts"] {
        sample.metrics.insert(class.to_string(), 0.0);
    }

    let mut total = 0u64;
    for file in files {
        total += file.bytes;
        if let Some(class) = &file.class {
            *sample.metrics.entry(class.clone()).or_insert(0.0) += kilobytes(file.bytes);
        }
    }
    sample.metrics.insert("total".to_string(), kilobytes(total));
    sample
}

pub fn kilobytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0
}

/// Largest files first, for the report.
pub fn largest(files: &[AssetFile], limit: usize) -> Vec<AssetFile> {
    let mut sorted = files.to_vec();
    sorted.sort_by(|a, b| b.bytes.cmp(&a.bytes));
    sorted.truncate(limit);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sizes_are_grouped_by_extension() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("app.js"), vec![0u8; 2048]).unwrap();
        fs::write(assets.join("vendor.MJS"), vec![0u8; 1024]).unwrap();
        fs::write(dir.path().join("site.css"), vec![0u8; 512]).unwrap();
        fs::write(dir.path().join("index.html"), vec![0u8; 512]).unwrap();

        let files = scan_dist(dir.path()).unwrap();
        assert_eq!(files.len(), 4);

        let sample = bundle_sample(&files, Utc::now());
        assert_eq!(sample.get("js"), Some(3.0));
        assert_eq!(sample.get("css"), Some(0.5));
        assert_eq!(sample.get("images"), Some(0.0));
        assert_eq!(sample.get("total"), Some(4.0));
        assert_eq!(largest(&files, 1)[0].path, assets.join("app.js"));
    }

    #[test]
    fn missing_dist_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(scan_dist(&dir.path().join("dist")).is_err());
    }
}
