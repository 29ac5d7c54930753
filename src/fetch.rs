use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

/// Deterministic local filename for an image URL: the last path segment's
/// stem when it is a clean word, otherwise the sanitized trailing segment.
/// Everything is stored as .jpg, matching the CDN's delivery format.
pub fn target_filename(image_url: &str) -> String {
    let stem = Regex::new(r"/(\w+)\.\w+$").unwrap();
    if let Some(c) = stem.captures(image_url) {
        return format!("{}.jpg", &c[1]);
    }

    let last = image_url.rsplit('/').next().unwrap_or(image_url);
    let base = last.split('?').next().unwrap_or(last);
    let cleaned = Regex::new(r"[^\w\-. ]").unwrap().replace_all(base, "");
    let cleaned: String = cleaned.chars().take(100).collect();
    format!("{}.jpg", cleaned)
}

/// Download an image to its deterministic path under `save_dir`.
///
/// Skips the request when the file already exists. Inline data URLs are not
/// downloadable and return `None`. Network and IO failures bubble up so the
/// caller can count them without aborting the batch.
pub async fn save_image(
    client: &reqwest::Client,
    image_url: &str,
    save_dir: &Path,
) -> Result<Option<PathBuf>> {
    if !image_url.starts_with("http") {
        return Ok(None);
    }

    tokio::fs::create_dir_all(save_dir)
        .await
        .with_context(|| format!("Failed to create {}", save_dir.display()))?;

    let path = save_dir.join(target_filename(image_url));
    if tokio::fs::try_exists(&path).await? {
        return Ok(Some(path));
    }

    let bytes = client
        .get(image_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await
        .with_context(|| format!("Failed to download {}", image_url))?;
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(Some(path))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_clean_stem() {
        assert_eq!(
            target_filename("https://i.pinimg.com/736x/ab/cd/1234567890.jpg"),
            "1234567890.jpg"
        );
        assert_eq!(
            target_filename("https://i.pinimg.com/originals/deadbeef.png"),
            "deadbeef.jpg"
        );
    }

    #[test]
    fn filename_falls_back_to_sanitized_segment() {
        assert_eq!(
            target_filename("https://i.pinimg.com/736x/img-42.v2.jpg?w=320&h=200"),
            "img-42.v2.jpg.jpg"
        );
    }

    #[test]
    fn filename_is_stable() {
        let url = "https://i.pinimg.com/736x/555.jpg";
        assert_eq!(target_filename(url), target_filename(url));
    }

    #[tokio::test]
    async fn existing_file_skips_the_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("777.jpg");
        tokio::fs::write(&path, b"cached").await.unwrap();

        // No server behind this URL; an actual request would fail, so a
        // successful return proves the early exit.
        let client = reqwest::Client::new();
        let got = save_image(&client, "https://i.pinimg.com/736x/777.jpg", dir.path())
            .await
            .unwrap();
        assert_eq!(got, Some(path));
    }

    #[tokio::test]
    async fn data_urls_are_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let got = save_image(&client, "data:image/png;base64,AAAA", dir.path())
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
