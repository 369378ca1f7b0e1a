//! Seal a file locally without uploading it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use xfer_seal::{seal_stream, SessionKey};

/// Run the seal command.
///
/// Writes the concatenated sealed chunks to `output` (default:
/// `<input>.sealed`) and prints the key fragment on stdout. Nothing is left
/// at `output` if sealing fails.
pub async fn run(input: &Path, output: Option<&Path>, chunk_size: u64) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));

    let plain_len = tokio::fs::metadata(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?
        .len();
    if plain_len == 0 {
        anyhow::bail!("{} is empty; nothing to seal", input.display());
    }

    let key = SessionKey::generate().context("Failed to generate session key")?;

    let mut reader = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let partial = partial_path(&output);
    let mut writer = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let result = seal_stream(&key, &mut reader, plain_len, chunk_size, &mut writer).await;
    drop(writer);

    let written = match result {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            tracing::warn!(input = %input.display(), error = %e, "Failed to seal file");
            return Err(e).context("Failed to seal file");
        }
    };

    tokio::fs::rename(&partial, &output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        plain_len,
        sealed_len = written,
        "Sealed file"
    );

    eprintln!("Sealed {} bytes to {}", plain_len, output.display());
    eprintln!("Keep this key; it is required to open the file:");
    println!("{}", key.to_fragment());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".sealed");
    PathBuf::from(name)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
