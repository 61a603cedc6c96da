//! Artifact download logic

use std::path::{Path, PathBuf};

use crate::provider::LlmError;

use super::types::{DownloadProgress, DownloadStatus};

/// Transfer timeout; model artifacts run to several GB
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Fetch a single artifact into the models directory.
/// Returns the path to the finalized file.
///
/// If the destination file already exists the transfer is skipped
/// entirely and no progress is reported; the caller backfills any
/// missing size metadata. On failure the partial `.tmp` sibling is left
/// in place and must not be trusted until re-verified.
pub async fn fetch_artifact<F>(
    models_dir: &Path,
    filename: &str,
    url: &str,
    on_progress: F,
) -> Result<PathBuf, LlmError>
where
    F: Fn(DownloadProgress) + Send + 'static,
{
    let dest_path = models_dir.join(filename);

    if dest_path.exists() {
        log::info!("Artifact {} already present, skipping transfer", filename);
        return Ok(dest_path);
    }

    // Report starting
    on_progress(DownloadProgress {
        filename: filename.to_string(),
        downloaded_bytes: 0,
        total_bytes: 0,
        fraction: 0.0,
        status: DownloadStatus::InProgress,
    });

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()
        .map_err(|e| LlmError::DownloadFailed(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LlmError::DownloadFailed(format!("Failed to start download: {}", e)))?;

    if !response.status().is_success() {
        return Err(LlmError::DownloadFailed(format!(
            "Download failed with status: {}",
            response.status()
        )));
    }

    // May be absent; fractions then stay at 0.0 until completion
    let total_size = response.content_length().unwrap_or(0);

    let temp_path = temp_path_for(&dest_path);
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| LlmError::DownloadFailed(format!("Failed to create temp file: {}", e)))?;

    // Stream download with progress
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| LlmError::DownloadFailed(format!("Transfer error: {}", e)))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| LlmError::DownloadFailed(format!("Failed to write chunk: {}", e)))?;

        downloaded += chunk.len() as u64;
        let fraction = if total_size > 0 {
            (downloaded as f32 / total_size as f32).min(1.0)
        } else {
            0.0
        };

        on_progress(DownloadProgress {
            filename: filename.to_string(),
            downloaded_bytes: downloaded,
            total_bytes: total_size,
            fraction,
            status: DownloadStatus::InProgress,
        });
    }

    file.flush()
        .await
        .map_err(|e| LlmError::DownloadFailed(format!("Failed to flush file: {}", e)))?;
    drop(file);

    tokio::fs::rename(&temp_path, &dest_path)
        .await
        .map_err(|e| LlmError::DownloadFailed(format!("Failed to finalize download: {}", e)))?;

    on_progress(DownloadProgress {
        filename: filename.to_string(),
        downloaded_bytes: downloaded,
        total_bytes: total_size.max(downloaded),
        fraction: 1.0,
        status: DownloadStatus::Completed,
    });

    log::info!("Downloaded {} ({} bytes)", filename, downloaded);
    Ok(dest_path)
}

/// Temp sibling used while a transfer is in flight
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".tmp");
    dest.with_file_name(name)
}
