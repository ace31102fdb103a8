// ===============================
// src/recorder.rs
// ===============================
//
// Event journal (JSONL, append-only).
// Satu baris per Event: Tick / News / Trade / Note.
// Aktif bila RECORD_FILE atau --record-file di-set (lihat main.rs).
//
use std::io;
use std::path::Path;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::Event;

const FLUSH_EVERY: Duration = Duration::from_secs(1);
const FLUSH_EVERY_N_EVENTS: u32 = 256;

async fn open_journal(path: &str) -> io::Result<BufWriter<File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn append(writer: &mut BufWriter<File>, ev: &Event) -> io::Result<()> {
    let mut line = serde_json::to_vec(ev).map_err(io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_journal(&path).await {
        Ok(w) => w,
        Err(e) => {
            // journal mati, tapi channel tetap dikuras supaya pengirim tidak penuh
            error!(?e, %path, "recorder: cannot open journal, events will be dropped");
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(FLUSH_EVERY);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: u32 = 0;
    let mut written: u64 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else { break };

                if let Err(e) = append(&mut writer, &ev).await {
                    warn!(?e, "recorder: write failed, reopening journal");
                    let _ = writer.flush().await;
                    match open_journal(&path).await {
                        Ok(w) => writer = w,
                        Err(e) => {
                            error!(?e, %path, "recorder: reopen failed, stopping");
                            return;
                        }
                    }
                    if let Err(e) = append(&mut writer, &ev).await {
                        error!(?e, "recorder: write failed again, event dropped");
                        continue;
                    }
                }

                written += 1;
                pending += 1;
                if pending >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    pending = 0;
                }
            }

            _ = tick.tick() => {
                if pending > 0 {
                    let _ = writer.flush().await;
                    pending = 0;
                }
            }
        }
    }

    let _ = writer.flush().await;
    info!(written, "recorder: channel closed, stopped");
}
