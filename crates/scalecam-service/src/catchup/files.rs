use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scalecam_types::ClipName;

use super::{ClipDownload, ClipSource};
use crate::error::{Error, Result};
use crate::transcode::Transcoder;

/// Why a file catchup pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "clip", rename_all = "snake_case")]
pub enum StopReason {
    /// The remote has nothing newer.
    UpToDate,
    /// The per-pass fetch budget ran out.
    BudgetExhausted,
    /// The offered clip already exists locally and was left alone.
    Duplicate(ClipName),
}

/// Outcome of one file catchup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCatchupReport {
    /// Clips written during the pass, in order.
    pub fetched: Vec<ClipName>,
    pub stop: StopReason,
}

/// Newest clip name anywhere under `dir`.
///
/// Hidden files (in-flight downloads) and names that are not clip names
/// are ignored. A missing directory has no cursor.
pub async fn local_cursor(dir: &Path) -> Result<Option<ClipName>> {
    let mut newest: Option<ClipName> = None;
    walk_clips(dir, |clip, _| {
        if newest.as_ref().is_none_or(|n| clip > *n) {
            newest = Some(clip);
        }
    })
    .await?;
    Ok(newest)
}

/// Visit every clip file under `dir`, recursively, in no particular order.
pub(crate) async fn walk_clips(
    dir: &Path,
    mut visit: impl FnMut(ClipName, PathBuf),
) -> std::io::Result<()> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match ClipName::parse(name) {
                Ok(clip) => visit(clip, entry.path()),
                Err(e) => debug!("Ignoring {}: {}", entry.path().display(), e),
            }
        }
    }

    Ok(())
}

/// Fetch clips newer than the local cursor from `remote` into `dir`.
///
/// The first clip is always requested. After that, `budget` limits the
/// number of further fetches (`None` keeps going until the remote is
/// exhausted). Each clip is streamed to a hidden temporary file and then
/// published under its final name with a hard link, which fails instead of
/// replacing an existing file. Transcoder failures are logged and do not
/// end the pass.
pub async fn catchup_files(
    remote: &dyn ClipSource,
    dir: &Path,
    budget: Option<u32>,
    transcoder: &dyn Transcoder,
) -> Result<FileCatchupReport> {
    fs::create_dir_all(dir).await.map_err(|e| Error::ClipWrite {
        path: dir.to_path_buf(),
        source: e,
    })?;

    remove_partials(dir).await?;
    let mut cursor = local_cursor(dir).await?;
    let mut remaining = budget;
    let mut fetched = Vec::new();
    debug!(
        "Fetching clips into {} after {}",
        dir.display(),
        cursor.as_ref().map_or("(none)", |c| c.as_str())
    );

    let stop = loop {
        let Some(download) = remote.next_clip(cursor.as_ref()).await? else {
            debug!("No new files");
            break StopReason::UpToDate;
        };

        let name = download.name.clone();
        let Some(path) = publish(dir, download).await? else {
            warn!("Skipping existing file {}", name);
            break StopReason::Duplicate(name);
        };
        info!("Received file {}", name);

        if let Err(e) = transcoder.transcode(&path).await {
            warn!("{}", e);
        }

        if cursor.as_ref().is_none_or(|c| name > *c) {
            cursor = Some(name.clone());
        }
        fetched.push(name);

        match remaining.as_mut() {
            Some(0) => break StopReason::BudgetExhausted,
            Some(n) => *n -= 1,
            None => {}
        }
    };

    Ok(FileCatchupReport { fetched, stop })
}

/// Delete temporary files left by a pass that was abandoned mid-download.
async fn remove_partials(dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') && name.ends_with(".part") {
            debug!("Removing partial download {}", name);
            fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// Write `download` into `dir`. Returns `None` if the name is taken.
async fn publish(dir: &Path, download: ClipDownload) -> Result<Option<PathBuf>> {
    let final_path = dir.join(download.name.as_str());
    if fs::try_exists(&final_path).await? {
        return Ok(None);
    }

    let temp_path = dir.join(format!(
        ".{}.{}.part",
        download.name,
        Uuid::new_v4().simple()
    ));
    let result = write_and_link(&temp_path, &final_path, download.body).await;

    if let Err(e) = fs::remove_file(&temp_path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", temp_path.display(), e);
    }

    Ok(result?.then_some(final_path))
}

async fn write_and_link(
    temp_path: &Path,
    final_path: &Path,
    mut body: BoxStream<'static, Result<Bytes>>,
) -> Result<bool> {
    let write_err = |e| Error::ClipWrite {
        path: temp_path.to_path_buf(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await
        .map_err(write_err)?;

    while let Some(chunk) = body.next().await {
        file.write_all(&chunk?).await.map_err(write_err)?;
    }
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    match fs::hard_link(temp_path, final_path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::ClipWrite {
            path: final_path.to_path_buf(),
            source: e,
        }),
    }
}
