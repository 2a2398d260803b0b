/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use log::{debug, info, warn};

use super::{ShellError, ShellIntent};
use crate::engine::EngineFactory;
use crate::model::{
    BLANK_ADDRESS, HistoryEntry, ProfileId, SpaceId, TabId, WindowId, Workspace,
};
use crate::persistence::{PersistentStore, Record, RecordKey};
use crate::prefs::ShellPrefs;
use crate::session::downloads::DownloadManager;
use crate::session::{SessionNotification, SessionRegistry, SurfaceHandle};

/// Per-window selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub space: SpaceId,
    pub selected_tab: Option<TabId>,
}

/// What the system media controls should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub tab: TabId,
    pub title: String,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DeferredWork {
    /// Erase storage and the record of a profile whose spaces were already
    /// reassigned and saved.
    PurgeProfile(ProfileId),
}

pub struct Browser {
    pub(super) prefs: ShellPrefs,
    pub(super) workspace: Workspace,
    pub(super) registry: SessionRegistry,
    store: Box<dyn PersistentStore>,
    pub(super) windows: BTreeMap<WindowId, WindowState>,
    dirty: BTreeSet<RecordKey>,
    pub(super) deferred: VecDeque<DeferredWork>,
    pub(super) pending_profile_deletions: HashSet<ProfileId>,
    repairs_on_open: usize,
}

impl Browser {
    /// Load every entity from `store`, repair it and save any repairs.
    pub fn open(
        prefs: ShellPrefs,
        store: Box<dyn PersistentStore>,
        factory: Box<dyn EngineFactory>,
        downloads: Box<dyn DownloadManager>,
    ) -> Result<Self, ShellError> {
        let workspace = Workspace::from_parts(
            store.fetch_profiles(&|_| true)?,
            store.fetch_spaces(&|_| true)?,
            store.fetch_tabs(&|_| true)?,
            store.fetch_history(&|_| true)?,
        );
        info!(
            "Loaded {} profiles, {} spaces, {} tabs",
            workspace.profiles().len(),
            workspace.space_count(),
            workspace.tab_count()
        );
        let registry = SessionRegistry::new(factory, downloads, prefs.snapshot_max_dimension);
        let mut browser = Self {
            prefs,
            workspace,
            registry,
            store,
            windows: BTreeMap::new(),
            dirty: BTreeSet::new(),
            deferred: VecDeque::new(),
            pending_profile_deletions: HashSet::new(),
            repairs_on_open: 0,
        };
        browser.repairs_on_open = browser.repair();
        if browser.repairs_on_open > 0 {
            info!("Repaired {} inconsistencies while loading", browser.repairs_on_open);
        }
        browser.persist();
        Ok(browser)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn prefs(&self) -> &ShellPrefs {
        &self.prefs
    }

    /// Repairs made to the stored workspace when it was loaded.
    pub fn repairs_on_open(&self) -> usize {
        self.repairs_on_open
    }

    // --- windows ---

    /// Register a window showing the first space.
    pub fn open_window(&mut self) -> WindowId {
        let window = WindowId::new();
        let space = match self.workspace.spaces_ordered().first() {
            Some(space) => space.id,
            None => self.bootstrap_space(),
        };
        self.windows.insert(
            window,
            WindowState {
                space,
                selected_tab: None,
            },
        );
        self.ensure_selected_tab(window);
        debug!("Opened window {window} on space {space}");
        self.persist();
        window
    }

    pub fn close_window(&mut self, window: WindowId) -> Result<(), ShellError> {
        let state = self
            .windows
            .remove(&window)
            .ok_or(ShellError::UnknownWindow(window))?;
        self.remember_selection(state.space, state.selected_tab);
        self.registry.release_window(window);
        self.persist();
        Ok(())
    }

    pub fn window(&self, window: WindowId) -> Option<&WindowState> {
        self.windows.get(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = (WindowId, &WindowState)> {
        self.windows.iter().map(|(id, state)| (*id, state))
    }

    pub(super) fn window_state(&self, window: WindowId) -> Result<WindowState, ShellError> {
        self.windows
            .get(&window)
            .copied()
            .ok_or(ShellError::UnknownWindow(window))
    }

    /// A tab is displayed when some window has it selected.
    pub fn displaying_window(&self, tab: TabId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, state)| state.selected_tab == Some(tab))
            .map(|(id, _)| *id)
    }

    /// Acquire the tab's session for `window` and bring its engine in line
    /// with the tab's address.
    pub fn acquire_surface(
        &mut self,
        window: WindowId,
        tab: TabId,
    ) -> Result<SurfaceHandle, ShellError> {
        self.window_state(window)?;
        let profile = self
            .workspace
            .effective_profile(tab)
            .ok_or(ShellError::UnknownTab(tab))?;
        let record = self.workspace.tab(tab).ok_or(ShellError::UnknownTab(tab))?;
        let handle = self.registry.acquire(record, window, profile)?;
        self.registry.sync_address(record, window);
        if let Some(record) = self.workspace.tab_mut(tab) {
            record.last_active = std::time::SystemTime::now();
        }
        self.mark_tab(tab);
        self.persist();
        Ok(handle)
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        let tab = self.workspace.tab(self.registry.now_playing()?)?;
        Some(NowPlaying {
            tab: tab.id,
            title: tab.title.clone(),
            host: tab.address.host_str().map(str::to_string),
        })
    }

    // --- event loop ---

    /// Run deferred work, then apply everything the registry reported.
    pub fn pump(&mut self) -> Vec<SessionNotification> {
        self.run_deferred();
        let notifications = self.registry.drain_pending();
        for notification in &notifications {
            self.apply_notification(notification);
        }
        self.persist();
        notifications
    }

    pub fn apply_intent(&mut self, intent: ShellIntent) {
        match intent {
            ShellIntent::ProbeAudio => {
                self.registry.probe_audio();
            },
            ShellIntent::Media(command) => {
                self.registry.media_command(command);
            },
            ShellIntent::ClearData(request) => {
                let summary = self.clear_data(&request);
                info!("Cleared browsing data: {summary:?}");
            },
        }
    }

    fn apply_notification(&mut self, notification: &SessionNotification) {
        match notification {
            SessionNotification::LoadingChanged { tab, loading } => {
                if let Some(record) = self.workspace.tab_mut(*tab) {
                    record.is_loading = *loading;
                }
            },
            SessionNotification::AddressChanged { tab, address } => {
                let Some(record) = self.workspace.tab_mut(*tab) else {
                    return;
                };
                let moved = record.address != *address;
                if moved {
                    record.address = address.clone();
                }
                let title = Some(record.title.clone()).filter(|title| !title.is_empty());
                if moved {
                    self.mark_tab(*tab);
                }
                if address.as_str() != BLANK_ADDRESS {
                    let entry = HistoryEntry::new(address.clone(), title);
                    self.mark(RecordKey::History(entry.id));
                    self.workspace.push_history(entry);
                }
            },
            SessionNotification::TitleChanged { tab, title } => {
                if title.is_empty() {
                    return;
                }
                if let Some(record) = self.workspace.tab_mut(*tab)
                    && record.title != *title
                {
                    record.title = title.clone();
                    self.mark_tab(*tab);
                }
            },
            SessionNotification::HistoryChanged {
                tab,
                can_go_back,
                can_go_forward,
            } => {
                if let Some(record) = self.workspace.tab_mut(*tab) {
                    record.can_go_back = *can_go_back;
                    record.can_go_forward = *can_go_forward;
                    self.mark_tab(*tab);
                }
            },
            SessionNotification::AudioChanged { tab, playing } => {
                if let Some(record) = self.workspace.tab_mut(*tab) {
                    record.is_playing_audio = *playing;
                }
            },
            SessionNotification::NavigationFailed { .. }
            | SessionNotification::NowPlayingChanged { .. }
            | SessionNotification::PictureInPictureChanged { .. }
            | SessionNotification::OwnershipChanged(_)
            | SessionNotification::DownloadStarted { .. } => {},
        }
    }

    fn run_deferred(&mut self) {
        while let Some(work) = self.deferred.pop_front() {
            match work {
                DeferredWork::PurgeProfile(profile) => self.purge_profile(profile),
            }
        }
    }

    // --- persistence ---

    pub(super) fn mark(&mut self, key: RecordKey) {
        self.dirty.insert(key);
    }

    pub(super) fn mark_tab(&mut self, tab: TabId) {
        self.mark(RecordKey::Tab(tab));
    }

    pub(super) fn mark_space(&mut self, space: SpaceId) {
        self.mark(RecordKey::Space(space));
    }

    pub(super) fn mark_profile(&mut self, profile: ProfileId) {
        self.mark(RecordKey::Profile(profile));
    }

    /// Stage every dirty record (or its removal) and save. A failed save keeps
    /// the dirty set so the next mutation retries it.
    pub(super) fn persist(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        for key in &self.dirty {
            let record = match key {
                RecordKey::Tab(id) => self.workspace.tab(*id).cloned().map(Record::Tab),
                RecordKey::Space(id) => self.workspace.space(*id).cloned().map(Record::Space),
                RecordKey::Profile(id) => {
                    self.workspace.profile(*id).cloned().map(Record::Profile)
                },
                RecordKey::History(id) => self
                    .workspace
                    .history()
                    .iter()
                    .find(|entry| entry.id == *id)
                    .cloned()
                    .map(Record::History),
            };
            match record {
                Some(record) => self.store.insert(record),
                None => self.store.delete(*key),
            }
        }
        match self.store.save() {
            Ok(()) => self.dirty.clear(),
            Err(e) => warn!(
                "Saving {} changed records failed; retrying on next change: {e}",
                self.dirty.len()
            ),
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::session::SessionError;
    use crate::shell::TabDestination;
    use crate::test_utils::TestShell;
    use url::Url;

    #[test]
    fn failed_engine_creation_leaves_tab_record_alone() {
        let mut shell = TestShell::new();
        let tab = shell
            .browser
            .create_tab(
                shell.window,
                Url::parse("https://a.example").unwrap(),
                TabDestination::Today,
            )
            .unwrap();
        let before = shell.browser.workspace().tab(tab).cloned();

        shell.factory.fail_next_creation();
        let result = shell.browser.acquire_surface(shell.window, tab);

        assert!(matches!(
            result,
            Err(ShellError::Session(SessionError::Engine(EngineError::CreationFailed(_))))
        ));
        assert!(!shell.browser.registry().has_session(tab));
        assert_eq!(shell.browser.workspace().tab(tab).cloned(), before);
        assert!(!shell.browser.has_unsaved_changes());
    }

    #[test]
    fn failed_recreation_after_profile_change_drops_the_old_session() {
        let mut shell = TestShell::new();
        let w = shell.window;
        let space = shell.browser.window(w).unwrap().space;
        let tab = shell
            .browser
            .create_tab(w, Url::parse("https://a.example").unwrap(), TabDestination::Today)
            .unwrap();
        shell.browser.acquire_surface(w, tab).unwrap();
        let private = shell.browser.create_profile("Private", true);
        shell.browser.assign_space_profile(space, private).unwrap();
        let before = shell.browser.workspace().tab(tab).cloned();

        shell.factory.fail_next_creation();
        assert!(matches!(
            shell.browser.acquire_surface(w, tab),
            Err(ShellError::Session(SessionError::Engine(_)))
        ));
        assert!(!shell.browser.registry().has_session(tab));
        assert_eq!(shell.browser.registry().owner(tab), None);
        assert_eq!(shell.browser.workspace().tab(tab).cloned(), before);

        shell.browser.acquire_surface(w, tab).unwrap();
        assert_eq!(shell.factory.created_count(), 2);
        assert_eq!(shell.factory.profile_of(tab), Some(private));
    }
}
