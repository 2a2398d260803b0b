/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::PathBuf;
use std::time::SystemTime;

use log::{debug, info, warn};

use crate::engine::{DownloadEvent, DownloadTicket};
use crate::model::TabId;

const FALLBACK_FILENAME: &str = "download";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Downloading { fraction: f64 },
    Finished(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub ticket: DownloadTicket,
    /// Tab whose session started the download. The session may be gone.
    pub source_tab: TabId,
    pub filename: String,
    pub state: DownloadState,
    pub started_at: SystemTime,
}

/// Receives downloads handed off by sessions.
pub trait DownloadManager {
    /// Returns the new id when `event` started a download.
    fn handle(&mut self, tab: TabId, event: DownloadEvent) -> Option<DownloadId>;
    fn records(&self) -> Vec<DownloadRecord>;
}

/// Keeps a record per download, in start order.
#[derive(Debug, Default)]
pub struct DownloadLedger {
    records: Vec<DownloadRecord>,
    next_id: u64,
}

impl DownloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_mut(&mut self, ticket: DownloadTicket) -> Option<&mut DownloadRecord> {
        let record = self.records.iter_mut().find(|record| record.ticket == ticket);
        if record.is_none() {
            debug!("Ignoring event for unknown download {ticket:?}");
        }
        record
    }
}

impl DownloadManager for DownloadLedger {
    fn handle(&mut self, tab: TabId, event: DownloadEvent) -> Option<DownloadId> {
        match event {
            DownloadEvent::Started {
                ticket,
                suggested_filename,
            } => {
                if self.records.iter().any(|record| record.ticket == ticket) {
                    warn!("Download {ticket:?} started twice; keeping the first record");
                    return None;
                }
                let id = DownloadId(self.next_id);
                self.next_id += 1;
                let filename = suggested_filename
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
                info!("Download {filename} started from tab {tab}");
                self.records.push(DownloadRecord {
                    id,
                    ticket,
                    source_tab: tab,
                    filename,
                    state: DownloadState::Downloading { fraction: 0.0 },
                    started_at: SystemTime::now(),
                });
                Some(id)
            },
            DownloadEvent::FilenameResolved { ticket, filename } => {
                if let Some(record) = self.record_mut(ticket) {
                    record.filename = filename;
                }
                None
            },
            DownloadEvent::Progress { ticket, fraction } => {
                if let Some(record) = self.record_mut(ticket)
                    && let DownloadState::Downloading { .. } = record.state
                {
                    record.state = DownloadState::Downloading {
                        fraction: fraction.clamp(0.0, 1.0),
                    };
                }
                None
            },
            DownloadEvent::Finished {
                ticket,
                destination,
            } => {
                if let Some(record) = self.record_mut(ticket) {
                    info!("Download {} finished at {}", record.filename, destination.display());
                    record.state = DownloadState::Finished(destination);
                }
                None
            },
            DownloadEvent::Failed { ticket, reason } => {
                if let Some(record) = self.record_mut(ticket) {
                    warn!("Download {} failed: {reason}", record.filename);
                    record.state = DownloadState::Failed(reason);
                }
                None
            },
        }
    }

    fn records(&self) -> Vec<DownloadRecord> {
        self.records.clone()
    }
}
