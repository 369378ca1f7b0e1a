//! Upload a file through the submit-chunk endpoint.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use xfer_client::{
    ChunkSource, ChunkTransport, FileSource, HttpTransport, MockTransport, RetryingTransport, UploadConfig,
    UploadSession,
};

/// Settings for one upload, after merging the config file and flags.
#[derive(Debug, Clone)]
pub struct UploadArgs {
    /// Submit-chunk endpoint; unused with the mock transport.
    pub endpoint: Option<String>,
    /// Session settings (chunk size, concurrency, metadata).
    pub session: UploadConfig,
    /// Name for the multipart file part; defaults to the file's own name.
    pub file_name: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Resubmissions per chunk after a network error.
    pub retries: u32,
}

/// Run the upload command.
pub async fn run(file: &Path, args: UploadArgs, use_mock: bool) -> Result<()> {
    let source = FileSource::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let mut session_config = args.session.clone();
    if let Some(name) = args.file_name.clone().or_else(|| source.file_name()) {
        session_config.file_name = name;
    }

    if use_mock {
        let transport = RetryingTransport::new(MockTransport::new(), args.retries);
        do_upload(source, transport, session_config).await
    } else {
        let endpoint = args
            .endpoint
            .as_deref()
            .context("No endpoint configured. Pass --endpoint or set [upload] endpoint in xfer.toml")?;
        let http = HttpTransport::new(endpoint)
            .context("Failed to create HTTP transport")?
            .with_timeout(args.timeout);
        let transport = RetryingTransport::new(http, args.retries);
        do_upload(source, transport, session_config).await
    }
}

async fn do_upload<T: ChunkTransport + 'static>(
    source: FileSource,
    transport: T,
    config: UploadConfig,
) -> Result<()> {
    let file_size = source.len();
    let mut session = UploadSession::new(source, transport, config);

    // Ctrl-C cancels the upload; in-flight chunks are dropped
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut progress = session.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let fraction = *progress.borrow_and_update();
            eprint!("\rUploading... {:>5.1}%", fraction * 100.0);
        }
    });

    eprintln!("Uploading {} bytes...", file_size);
    let result = session.run(cancel).await;
    drop(session);
    reporter.abort();
    let _ = reporter.await;
    eprintln!();

    let outcome = result.context("Upload failed")?;
    eprintln!("Upload complete. Share this link; anyone holding it can decrypt the file:");
    println!("{}", outcome.share_url());
    Ok(())
}
