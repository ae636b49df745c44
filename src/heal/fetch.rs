//! Download of the full frequency lists into a dictionary directory.
//!
//! The embedded core lists only cover common vocabulary. The public 50k
//! frequency lists are fetched once into [`Dictionary::default_dir`](crate::heal::Dictionary::default_dir) (or any
//! directory later passed as `dictionary_dir`) and picked up from there by
//! `Dictionary::with_dir` and `Dictionary::installed`.

use crate::error::PdfStructError;
use crate::heal::dictionary::{listing_word, LIST_FILES};
use crate::heal::language::Language;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "https://raw.githubusercontent.com/hermitdave/FrequencyWords/master/content/2018";

/// Source URL of the 50k list for `lang`.
pub fn source_url(lang: Language) -> String {
    format!("{BASE_URL}/{lang}/{lang}_50k.txt")
}

/// Keep the `word count` lines whose word is usable, counts included.
pub fn filter_listing(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let mut parts = line.split_whitespace();
        let (Some(_), Some(count)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Some(word) = listing_word(line) {
            out.push_str(&word);
            out.push(' ');
            out.push_str(count);
            out.push('\n');
        }
    }
    out
}

/// Download both lists into `dir`, replacing existing files atomically.
///
/// Returns the written paths.
pub async fn fetch_lists(dir: &Path, timeout_secs: u64) -> Result<Vec<PathBuf>, PdfStructError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PdfStructError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PdfStructError::DownloadFailed {
            url: BASE_URL.to_string(),
            reason: e.to_string(),
        })?;

    let mut written = Vec::with_capacity(LIST_FILES.len());
    for (lang, name) in LIST_FILES {
        let url = source_url(lang);
        info!(%lang, %url, "downloading frequency list");
        let raw = download(&client, &url, timeout_secs).await?;
        let listing = filter_listing(&raw);

        let path = dir.join(name);
        let tmp = path.with_extension("txt.tmp");
        let write_err = |e: std::io::Error| PdfStructError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        };
        tokio::fs::write(&tmp, listing.as_bytes()).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;
        info!(%lang, words = listing.lines().count(), path = %path.display(), "frequency list saved");
        written.push(path);
    }
    Ok(written)
}

async fn download(client: &reqwest::Client, url: &str, timeout_secs: u64) -> Result<String, PdfStructError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PdfStructError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PdfStructError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PdfStructError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    response.text().await.map_err(|e| PdfStructError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heal::Dictionary;

    #[test]
    fn urls_follow_the_language_code() {
        assert!(source_url(Language::Turkish).ends_with("/tr/tr_50k.txt"));
        assert!(source_url(Language::English).ends_with("/en/en_50k.txt"));
    }

    #[test]
    fn listing_filter_drops_unusable_entries() {
        let raw = "bir 1650043\nve 1230123\na 99\n2019 400\nne'ye 12\nZeytin 7\nyalnız\n";
        assert_eq!(filter_listing(raw), "bir 1650043\nve 1230123\nzeytin 7\n");
    }

    #[test]
    fn filtered_listing_loads_as_a_dictionary_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tr_freq.txt"), filter_listing("kooperatifçilik 31\n")).unwrap();
        let d = Dictionary::with_dir(dir.path()).unwrap();
        assert!(d.contains(Language::Turkish, "kooperatifçilik"));
    }
}
