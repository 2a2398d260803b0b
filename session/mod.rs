/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session registry: one live rendering-engine session per tab, and at most
//! one window owning that session at a time.
//!
//! Every mutation happens on the caller's thread. Engine events and
//! completion callbacks arrive over channels and are applied by
//! `drain_pending`, which returns what changed as `SessionNotification`s.
//! Results carry the session generation they were issued for; anything that
//! arrives after its session was detached is dropped.

pub mod downloads;
pub mod media;
pub mod snapshot;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender, unbounded};
use image::RgbaImage;
use log::{debug, info, warn};
use url::Url;

use crate::engine::{
    EngineConfig, EngineError, EngineEvent, EngineEventKind, EngineEventSink, EngineFactory,
    RenderEngine, SessionGeneration,
};
use crate::model::{ProfileId, Tab, TabId, WindowId};
use downloads::{DownloadId, DownloadManager};
use media::{PlaybackState, ScriptPurpose};

/// Opaque handle to a live session surface. Only meaningful while the holder
/// is the owner of that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    tab: TabId,
    generation: SessionGeneration,
}

impl SurfaceHandle {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }
}

/// Changes on every ownership transfer and on every snapshot update. Windows
/// compare it against the value they last saw to decide whether to re-check
/// what they should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct OwnershipToken(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationCommand {
    Load(Url),
    Reload,
    Stop,
    Back,
    Forward,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    LoadingChanged {
        tab: TabId,
        loading: bool,
    },
    AddressChanged {
        tab: TabId,
        address: Url,
    },
    TitleChanged {
        tab: TabId,
        title: String,
    },
    HistoryChanged {
        tab: TabId,
        can_go_back: bool,
        can_go_forward: bool,
    },
    NavigationFailed {
        tab: TabId,
        reason: String,
    },
    AudioChanged {
        tab: TabId,
        playing: bool,
    },
    NowPlayingChanged {
        tab: Option<TabId>,
    },
    PictureInPictureChanged {
        tab: TabId,
        active: bool,
    },
    OwnershipChanged(OwnershipToken),
    DownloadStarted {
        tab: TabId,
        download: DownloadId,
    },
}

/// Asynchronous results routed back to the registry.
pub(crate) enum Completion {
    Snapshot {
        tab: TabId,
        generation: SessionGeneration,
        result: Result<RgbaImage, EngineError>,
    },
    Script {
        tab: TabId,
        generation: SessionGeneration,
        purpose: ScriptPurpose,
        result: Result<serde_json::Value, EngineError>,
    },
}

pub(crate) struct Session {
    generation: SessionGeneration,
    engine: Box<dyn RenderEngine>,
    profile: ProfileId,
    owner: Option<WindowId>,
    snapshot: Option<Arc<RgbaImage>>,
    pinned: bool,
    loading: bool,
    /// Last address the engine reported or was told to load.
    current_address: Option<Url>,
    can_go_back: bool,
    can_go_forward: bool,
    playing_audio: bool,
    audio_probe_in_flight: bool,
    /// Address to load, interrupting whatever is in progress, when a window
    /// next acquires the session.
    pending_reset: Option<Url>,
}

impl Session {
    fn handle(&self, tab: TabId) -> SurfaceHandle {
        SurfaceHandle {
            tab,
            generation: self.generation,
        }
    }
}

pub struct SessionRegistry {
    factory: Box<dyn EngineFactory>,
    downloads: Box<dyn DownloadManager>,
    sessions: HashMap<TabId, Session>,
    next_generation: u64,
    ownership_token: OwnershipToken,
    playback: PlaybackState,
    snapshot_max_dimension: Option<u32>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    notifications: Vec<SessionNotification>,
}

impl SessionRegistry {
    pub fn new(
        factory: Box<dyn EngineFactory>,
        downloads: Box<dyn DownloadManager>,
        snapshot_max_dimension: Option<u32>,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        Self {
            factory,
            downloads,
            sessions: HashMap::new(),
            next_generation: 0,
            ownership_token: OwnershipToken::default(),
            playback: PlaybackState::default(),
            snapshot_max_dimension,
            completion_tx,
            completion_rx,
            event_tx,
            event_rx,
            notifications: Vec::new(),
        }
    }

    /// Give `window` ownership of the tab's session, creating the session in
    /// `profile`'s storage if none exists. When another window held it, that
    /// window's last presentation is captured as a snapshot first.
    pub fn acquire(
        &mut self,
        tab: &Tab,
        window: WindowId,
        profile: ProfileId,
    ) -> Result<SurfaceHandle, SessionError> {
        if let Some(existing) = self.sessions.get(&tab.id)
            && existing.profile != profile
        {
            info!(
                "Tab {} moved from profile {} to {profile}; recreating its session",
                tab.id, existing.profile
            );
            self.detach(tab.id);
        }

        if !self.sessions.contains_key(&tab.id) {
            let session = self.spawn_session(tab, profile)?;
            self.sessions.insert(tab.id, session);
        }

        let max_dimension = self.snapshot_max_dimension;
        let Some(session) = self.sessions.get_mut(&tab.id) else {
            return Err(SessionError::NoSession(tab.id));
        };
        session.pinned = tab.is_pinned;
        if let Some(address) = session.pending_reset.take() {
            debug!("Restoring tab {} to {address} on acquire", tab.id);
            session.engine.stop();
            session.engine.load(&address);
            session.current_address = Some(address);
            session.loading = true;
        }
        let handle = session.handle(tab.id);
        if session.owner == Some(window) {
            return Ok(handle);
        }

        if let Some(previous) = session.owner {
            debug!("Transferring tab {} from window {previous} to {window}", tab.id);
            snapshot::request_snapshot(
                session.engine.as_ref(),
                tab.id,
                session.generation,
                max_dimension,
                &self.completion_tx,
            );
        }
        session.owner = Some(window);
        self.bump_ownership();
        Ok(handle)
    }

    fn spawn_session(&mut self, tab: &Tab, profile: ProfileId) -> Result<Session, SessionError> {
        let generation = SessionGeneration(self.next_generation);
        self.next_generation += 1;
        let engine = self
            .factory
            .create_engine(EngineConfig {
                tab: tab.id,
                profile,
                events: EngineEventSink::new(tab.id, generation, self.event_tx.clone()),
            })
            .map_err(SessionError::Engine)?;
        debug!("Created session {generation} for tab {}", tab.id);
        engine.load(&tab.address);
        Ok(Session {
            generation,
            engine,
            profile,
            owner: None,
            snapshot: None,
            pinned: tab.is_pinned,
            loading: true,
            current_address: Some(tab.address.clone()),
            can_go_back: tab.can_go_back,
            can_go_forward: tab.can_go_forward,
            playing_audio: false,
            audio_probe_in_flight: false,
            pending_reset: None,
        })
    }

    pub fn is_owner(&self, tab: TabId, window: WindowId) -> bool {
        self.owner(tab) == Some(window)
    }

    pub fn owner(&self, tab: TabId) -> Option<WindowId> {
        self.sessions.get(&tab).and_then(|session| session.owner)
    }

    /// Last snapshot captured for the tab, if any.
    pub fn snapshot(&self, tab: TabId) -> Option<Arc<RgbaImage>> {
        self.sessions
            .get(&tab)
            .and_then(|session| session.snapshot.clone())
    }

    pub fn handle(&self, tab: TabId) -> Option<SurfaceHandle> {
        self.sessions.get(&tab).map(|session| session.handle(tab))
    }

    pub fn has_session(&self, tab: TabId) -> bool {
        self.sessions.contains_key(&tab)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn ownership_token(&self) -> OwnershipToken {
        self.ownership_token
    }

    /// Cached pinned flag of the tab's session.
    pub fn session_pinned(&self, tab: TabId) -> Option<bool> {
        self.sessions.get(&tab).map(|session| session.pinned)
    }

    /// Stop and discard the tab's session. Idempotent.
    pub fn detach(&mut self, tab: TabId) -> bool {
        let Some(session) = self.sessions.remove(&tab) else {
            return false;
        };
        session.engine.stop();
        debug!("Detached session {} of tab {tab}", session.generation);
        self.forget_playback(tab);
        if session.owner.is_some() {
            self.bump_ownership();
        }
        true
    }

    /// Drop every ownership held by a closing window.
    pub fn release_window(&mut self, window: WindowId) {
        let mut released = false;
        for session in self.sessions.values_mut() {
            if session.owner == Some(window) {
                session.owner = None;
                released = true;
            }
        }
        if released {
            self.bump_ownership();
        }
    }

    /// Forward a navigation command. Only the owning window may navigate.
    pub fn navigate(
        &mut self,
        tab: TabId,
        window: WindowId,
        command: NavigationCommand,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&tab)
            .ok_or(SessionError::NoSession(tab))?;
        if session.owner != Some(window) {
            return Err(SessionError::NotOwner { tab, window });
        }
        match command {
            NavigationCommand::Load(url) => {
                session.pending_reset = None;
                session.engine.load(&url);
                session.current_address = Some(url);
            },
            NavigationCommand::Reload => session.engine.reload(),
            NavigationCommand::Stop => session.engine.stop(),
            NavigationCommand::Back if session.can_go_back => session.engine.go_back(),
            NavigationCommand::Forward if session.can_go_forward => session.engine.go_forward(),
            command @ (NavigationCommand::Back | NavigationCommand::Forward) => {
                return Err(SessionError::NavigationUnavailable { tab, command });
            },
        }
        Ok(())
    }

    /// Load the tab's address when the owning window displays a session whose
    /// engine shows something else and is not mid-load. Returns whether a
    /// load was issued.
    pub fn sync_address(&mut self, tab: &Tab, window: WindowId) -> bool {
        let Some(session) = self.sessions.get_mut(&tab.id) else {
            return false;
        };
        if session.owner != Some(window)
            || session.loading
            || session.current_address.as_ref() == Some(&tab.address)
        {
            return false;
        }
        debug!("Syncing tab {} to {}", tab.id, tab.address);
        session.engine.load(&tab.address);
        session.current_address = Some(tab.address.clone());
        true
    }

    /// Have the tab's session load `address` the next time a window acquires
    /// it, even mid-load. Address and title reports from the page it is
    /// leaving are withheld until then. Returns false when the tab has no
    /// session.
    pub fn restore_on_acquire(&mut self, tab: TabId, address: Url) -> bool {
        let Some(session) = self.sessions.get_mut(&tab) else {
            return false;
        };
        session.pending_reset = Some(address);
        true
    }

    pub fn update_pinned_state(&mut self, tab: &Tab) {
        if let Some(session) = self.sessions.get_mut(&tab.id) {
            session.pinned = tab.is_pinned;
        }
    }

    pub fn purge_profile_storage(&self, profile: ProfileId) -> Result<(), EngineError> {
        self.factory.remove_profile_data(profile)
    }

    pub fn clear_site_data(&self, profile: ProfileId, since: SystemTime) -> Result<(), EngineError> {
        self.factory.clear_site_data(profile, since)
    }

    pub fn downloads(&self) -> &dyn DownloadManager {
        self.downloads.as_ref()
    }

    /// Apply every queued engine event and completion, in arrival order per
    /// channel, and return what changed.
    pub fn drain_pending(&mut self) -> Vec<SessionNotification> {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply_completion(completion);
        }
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply_event(event);
        }
        std::mem::take(&mut self.notifications)
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot {
                tab,
                generation,
                result,
            } => {
                let Some(session) = self
                    .sessions
                    .get_mut(&tab)
                    .filter(|session| session.generation == generation)
                else {
                    debug!("Discarding snapshot for detached session {generation} of tab {tab}");
                    return;
                };
                match result {
                    Ok(image) => {
                        session.snapshot = Some(Arc::new(image));
                        self.bump_ownership();
                    },
                    Err(e) => warn!("Snapshot of tab {tab} failed: {e}"),
                }
            },
            Completion::Script {
                tab,
                generation,
                purpose,
                result,
            } => self.apply_script_result(tab, generation, purpose, result),
        }
    }

    fn apply_event(&mut self, event: EngineEvent) {
        let EngineEvent {
            tab,
            generation,
            kind,
        } = event;
        if let EngineEventKind::Download(download) = kind {
            if let Some(id) = self.downloads.handle(tab, download) {
                self.notifications
                    .push(SessionNotification::DownloadStarted { tab, download: id });
            }
            return;
        }

        let Some(session) = self
            .sessions
            .get_mut(&tab)
            .filter(|session| session.generation == generation)
        else {
            debug!("Dropping event from detached session {generation} of tab {tab}");
            return;
        };
        let notification = match kind {
            EngineEventKind::AddressChanged(_) | EngineEventKind::TitleChanged(_)
                if session.pending_reset.is_some() =>
            {
                debug!("Tab {tab} is waiting to be restored; ignoring its page report");
                return;
            },
            EngineEventKind::NavigationStarted => {
                session.loading = true;
                // A new document abandons any probe the old one never answered.
                session.audio_probe_in_flight = false;
                SessionNotification::LoadingChanged { tab, loading: true }
            },
            EngineEventKind::NavigationFinished => {
                session.loading = false;
                SessionNotification::LoadingChanged {
                    tab,
                    loading: false,
                }
            },
            EngineEventKind::NavigationFailed { reason } => {
                session.loading = false;
                warn!("Navigation in tab {tab} failed: {reason}");
                self.notifications.push(SessionNotification::LoadingChanged {
                    tab,
                    loading: false,
                });
                SessionNotification::NavigationFailed { tab, reason }
            },
            EngineEventKind::AddressChanged(address) => {
                session.current_address = Some(address.clone());
                SessionNotification::AddressChanged { tab, address }
            },
            EngineEventKind::TitleChanged(title) => SessionNotification::TitleChanged { tab, title },
            EngineEventKind::HistoryChanged {
                can_go_back,
                can_go_forward,
            } => {
                session.can_go_back = can_go_back;
                session.can_go_forward = can_go_forward;
                SessionNotification::HistoryChanged {
                    tab,
                    can_go_back,
                    can_go_forward,
                }
            },
            EngineEventKind::Download(_) => return,
        };
        self.notifications.push(notification);
    }

    /// Evaluate `script` in the tab's session, routing the result back as a
    /// completion. Returns false when the tab has no session.
    fn evaluate_for(&self, tab: TabId, script: &str, purpose: ScriptPurpose) -> bool {
        let Some(session) = self.sessions.get(&tab) else {
            return false;
        };
        let generation = session.generation;
        let sender = self.completion_tx.clone();
        session.engine.evaluate(
            script,
            Box::new(move |result| {
                if sender
                    .send(Completion::Script {
                        tab,
                        generation,
                        purpose,
                        result,
                    })
                    .is_err()
                {
                    debug!("Script result for tab {tab} arrived after the registry was dropped");
                }
            }),
        );
        true
    }

    fn bump_ownership(&mut self) {
        self.ownership_token.0 += 1;
        self.notifications
            .push(SessionNotification::OwnershipChanged(self.ownership_token));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Engine(EngineError),
    NoSession(TabId),
    NotOwner { tab: TabId, window: WindowId },
    NavigationUnavailable { tab: TabId, command: NavigationCommand },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Engine(e) => write!(f, "{e}"),
            SessionError::NoSession(tab) => write!(f, "tab {tab} has no live session"),
            SessionError::NotOwner { tab, window } => {
                write!(f, "window {window} does not own the session of tab {tab}")
            },
            SessionError::NavigationUnavailable { tab, command } => {
                write!(f, "{command:?} is not available in tab {tab}")
            },
        }
    }
}

impl std::error::Error for SessionError {}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError::Engine(e)
    }
}
