use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use peerdrop_transfer::channel::memory::pair;
use peerdrop_transfer::{FileSource, LinkConfig, TracingLogger, TransferConfig, WireMode, spawn};
use peerdrop_types::TransferEvent;

/// Overall limit for one run.
const RUN_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peerdrop=debug,peerdrop_transfer=info".into()),
        )
        .init();

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("usage: peerdrop <file>...");
    }

    // Config
    let config = TransferConfig::from_env()?;
    let link = link_from_env(config.wire_mode)?;
    let output_dir =
        PathBuf::from(std::env::var("PEERDROP_OUTPUT_DIR").unwrap_or_else(|_| "received".into()));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    info!(
        mode = %config.wire_mode,
        window = config.window_size,
        chunk_size = config.chunk_size,
        loss = link.loss,
        reorder = link.reorder,
        "starting loopback peers"
    );

    let (a, b) = pair(link);
    let mut sender = spawn(a.channel, a.events, config.clone(), Arc::new(TracingLogger))?;
    let mut receiver = spawn(b.channel, b.events, config, Arc::new(TracingLogger))?;

    sender.handle.send_chat("hello from peerdrop").await?;

    let mut expected = Vec::new();
    let mut unacked = Vec::new();
    for path in &paths {
        let source = FileSource::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let id = sender
            .handle
            .send_file(Arc::new(source), file_name.clone(), guess_mime(path))
            .await?;
        info!(transfer_id = %id, file = %file_name, "queued");
        expected.push(id);
        unacked.push(id);
    }

    let receive = async {
        while !expected.is_empty() {
            let Some(event) = receiver.events.recv().await else {
                bail!("receiving session ended early");
            };
            match event {
                TransferEvent::IncomingComplete {
                    transfer_id,
                    file_name,
                    mime_type,
                    bytes,
                } => {
                    let out = output_dir.join(&file_name);
                    tokio::fs::write(&out, &bytes)
                        .await
                        .with_context(|| format!("cannot write {}", out.display()))?;
                    info!(
                        transfer_id = %transfer_id,
                        mime = %mime_type,
                        bytes = bytes.len(),
                        path = %out.display(),
                        "received"
                    );
                    expected.retain(|id| *id != transfer_id);
                }
                TransferEvent::IncomingProgress {
                    transfer_id,
                    received,
                    total_chunks,
                } => {
                    tracing::debug!(transfer_id = %transfer_id, "{}/{}", received, total_chunks);
                }
                TransferEvent::ChatReceived { text } => info!(%text, "chat"),
                TransferEvent::Failed {
                    transfer_id,
                    reason,
                    ..
                } => {
                    warn!(transfer_id = %transfer_id, %reason, "transfer failed");
                    expected.retain(|id| *id != transfer_id);
                }
                _ => {}
            }
        }

        // let the sender see its final ACKs before the channel goes away
        while !unacked.is_empty() {
            let Some(event) = sender.events.recv().await else {
                bail!("sending session ended early");
            };
            match event {
                TransferEvent::OutgoingComplete {
                    transfer_id,
                    retransmits,
                } => {
                    info!(transfer_id = %transfer_id, retransmits, "delivered");
                    unacked.retain(|id| *id != transfer_id);
                }
                TransferEvent::Failed { transfer_id, .. } => {
                    unacked.retain(|id| *id != transfer_id);
                }
                _ => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    };
    tokio::time::timeout(RUN_TIMEOUT, receive)
        .await
        .context("transfers did not finish in time")??;

    sender.handle.close();
    sender.task.await?;
    receiver.task.await?;
    info!("done");
    Ok(())
}

/// Link simulation from `PEERDROP_LINK_LOSS` and `PEERDROP_LINK_REORDER`.
/// Any loss or reordering makes the link unreliable, which paired mode refuses.
fn link_from_env(mode: WireMode) -> anyhow::Result<LinkConfig> {
    let rate = |key: &str| -> anyhow::Result<f64> {
        match std::env::var(key) {
            Ok(v) => v.trim().parse().with_context(|| format!("{}={}", key, v)),
            Err(_) => Ok(0.0),
        }
    };
    let loss = rate("PEERDROP_LINK_LOSS")?;
    let reorder = rate("PEERDROP_LINK_REORDER")?;

    if loss == 0.0 && reorder == 0.0 {
        return Ok(LinkConfig::default());
    }
    if mode == WireMode::Paired {
        bail!("paired wire mode cannot run over a lossy link");
    }
    Ok(LinkConfig::lossy(loss, reorder))
}

fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
    .to_string()
}
