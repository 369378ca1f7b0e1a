//! Open a sealed file with its key.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use xfer_seal::{open_stream, SessionKey};

/// Run the open command.
///
/// `key` is either a bare key fragment or a full share link. Plaintext goes
/// to a temporary file next to `output` and is only moved into place once
/// every chunk has verified.
pub async fn run(input: &Path, key: &str, output: Option<&Path>, chunk_size: u64) -> Result<()> {
    let key = SessionKey::from_fragment(key).context("Invalid key")?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));
    let partial = partial_path(&output);

    let sealed_len = tokio::fs::metadata(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?
        .len();

    let mut reader = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut writer = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let result = open_stream(&key, &mut reader, sealed_len, chunk_size, &mut writer).await;
    drop(writer);

    let written = match result {
        Ok(written) => written,
        Err(e) => {
            // Never leave verified-prefix plaintext lying around
            let _ = tokio::fs::remove_file(&partial).await;
            tracing::warn!(input = %input.display(), error = %e, "Failed to open sealed file");
            return Err(e).context("Sealed file failed verification");
        }
    };

    tokio::fs::rename(&partial, &output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(input = %input.display(), output = %output.display(), written, "Opened file");
    eprintln!("Opened {} bytes to {}", written, output.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == "sealed" => input.with_extension(""),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".opened");
            PathBuf::from(name)
        }
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
