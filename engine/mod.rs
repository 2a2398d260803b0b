/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Contract with the web rendering engine.
//!
//! One `RenderEngine` backs one live tab session. Engines report back through
//! an `EngineEventSink` and through completion callbacks; both may fire on
//! any thread. The session registry drains them on its own thread, so nothing
//! here touches shell state directly.

pub mod headless;
pub mod scripts;

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use crossbeam_channel::Sender;
use image::RgbaImage;
use log::debug;
use url::Url;

use crate::model::{ProfileId, TabId};

/// Identifies one engine instance of a tab. A tab that is detached and
/// re-acquired gets a new generation, so late events from the old instance
/// can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionGeneration(pub(crate) u64);

impl fmt::Display for SessionGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Engine-assigned download handle. Unique per factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadTicket(pub u64);

pub type SnapshotCallback = Box<dyn FnOnce(Result<RgbaImage, EngineError>) + Send + 'static>;
pub type ScriptCallback =
    Box<dyn FnOnce(Result<serde_json::Value, EngineError>) + Send + 'static>;

/// A live rendering-engine instance.
pub trait RenderEngine {
    fn load(&self, url: &Url);
    fn reload(&self);
    fn stop(&self);
    fn go_back(&self);
    fn go_forward(&self);
    /// Capture the currently painted content.
    fn take_snapshot(&self, on_done: SnapshotCallback);
    /// Evaluate `script` in the page's main frame.
    fn evaluate(&self, script: &str, on_done: ScriptCallback);
}

/// Everything an engine needs at creation time.
#[derive(Clone)]
pub struct EngineConfig {
    pub tab: TabId,
    /// Storage partition the engine must use.
    pub profile: ProfileId,
    pub events: EngineEventSink,
}

pub trait EngineFactory {
    fn create_engine(&self, config: EngineConfig) -> Result<Box<dyn RenderEngine>, EngineError>;
    /// Remove every piece of site data stored for `profile`.
    fn remove_profile_data(&self, profile: ProfileId) -> Result<(), EngineError>;
    /// Remove site data for `profile` modified at or after `since`.
    fn clear_site_data(&self, profile: ProfileId, since: SystemTime) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    NavigationStarted,
    NavigationFinished,
    NavigationFailed { reason: String },
    AddressChanged(Url),
    TitleChanged(String),
    HistoryChanged { can_go_back: bool, can_go_forward: bool },
    /// Download events keep flowing after their session is gone.
    Download(DownloadEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started {
        ticket: DownloadTicket,
        suggested_filename: Option<String>,
    },
    FilenameResolved {
        ticket: DownloadTicket,
        filename: String,
    },
    Progress {
        ticket: DownloadTicket,
        fraction: f64,
    },
    Finished {
        ticket: DownloadTicket,
        destination: PathBuf,
    },
    Failed {
        ticket: DownloadTicket,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub tab: TabId,
    pub generation: SessionGeneration,
    pub kind: EngineEventKind,
}

/// Per-engine event channel, tagged with the tab and generation it belongs to.
#[derive(Clone)]
pub struct EngineEventSink {
    tab: TabId,
    generation: SessionGeneration,
    tx: Sender<EngineEvent>,
}

impl EngineEventSink {
    pub(crate) fn new(tab: TabId, generation: SessionGeneration, tx: Sender<EngineEvent>) -> Self {
        Self { tab, generation, tx }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub fn emit(&self, kind: EngineEventKind) {
        let event = EngineEvent {
            tab: self.tab,
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            debug!("Engine event for tab {} dropped: registry gone", self.tab);
        }
    }
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink")
            .field("tab", &self.tab)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    CreationFailed(String),
    SnapshotFailed(String),
    ScriptFailed(String),
    Storage(String),
    Unsupported(&'static str),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::CreationFailed(e) => write!(f, "engine creation failed: {e}"),
            EngineError::SnapshotFailed(e) => write!(f, "snapshot failed: {e}"),
            EngineError::ScriptFailed(e) => write!(f, "script evaluation failed: {e}"),
            EngineError::Storage(e) => write!(f, "engine storage error: {e}"),
            EngineError::Unsupported(what) => write!(f, "unsupported by this engine: {what}"),
        }
    }
}

impl std::error::Error for EngineError {}
