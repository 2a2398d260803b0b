/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab lifecycle transitions. Each one pairs its model change with the
//! session effect it requires (detach, reload, or nothing).

use log::debug;
use url::Url;

use super::selection::selection_after_close;
use super::{Browser, ShellError, TabDestination};
use crate::model::{SpaceId, Tab, TabId, TabList, TabLocation, WindowId};
use crate::session::NavigationCommand;

impl Browser {
    /// Create a tab in the window's space and select it. The session is
    /// created lazily on first display.
    pub fn create_tab(
        &mut self,
        window: WindowId,
        address: Url,
        destination: TabDestination,
    ) -> Result<TabId, ShellError> {
        let space = self.window_state(window)?.space;
        let tab = Tab::new(address, self.prefs.blank_title.clone());
        let id = self.workspace.insert_tab(tab);
        self.place(id, space, destination)?;
        self.mark_tab(id);
        self.set_selection(window, Some(id));
        self.persist();
        Ok(id)
    }

    /// Create an empty folder in the pinned or today list of the window's space.
    pub fn create_folder(&mut self, window: WindowId, pinned: bool) -> Result<TabId, ShellError> {
        let space = self.window_state(window)?.space;
        let folder = Tab::folder(self.prefs.blank_address.clone(), self.prefs.folder_title.clone());
        let id = self.workspace.insert_tab(folder);
        let destination = if pinned {
            TabDestination::Pinned
        } else {
            TabDestination::Today
        };
        self.place(id, space, destination)?;
        self.mark_tab(id);
        self.persist();
        Ok(id)
    }

    /// Move `tab` to the end of `folder`'s children.
    pub fn move_into_folder(&mut self, tab: TabId, folder: TabId) -> Result<(), ShellError> {
        let is_folder = self
            .workspace
            .tab(folder)
            .ok_or(ShellError::UnknownTab(folder))?
            .is_folder;
        if !is_folder {
            return Err(ShellError::NotFolder(folder));
        }
        if tab == folder || self.folder_descends_from(folder, tab) {
            return Err(ShellError::NotFolder(folder));
        }
        self.detach_from_location(tab)?;
        if let Some(record) = self.workspace.tab_mut(tab) {
            record.is_pinned = false;
            record.is_shared = false;
            record.pinned_original_address = None;
            self.registry.update_pinned_state(record);
        }
        if let Some(record) = self.workspace.tab_mut(folder) {
            record.children.push(tab);
        }
        self.mark_tab(tab);
        self.mark_tab(folder);
        self.persist();
        Ok(())
    }

    fn folder_descends_from(&self, folder: TabId, ancestor: TabId) -> bool {
        let mut current = folder;
        for _ in 0..self.workspace.tab_count() {
            match self.workspace.locate(current) {
                Some(TabLocation::InFolder { folder: parent, .. }) if parent == ancestor => {
                    return true;
                },
                Some(TabLocation::InFolder { folder: parent, .. }) => current = parent,
                _ => return false,
            }
        }
        false
    }

    /// Close `tab` according to where it lives:
    /// - shared: detach and delete
    /// - pinned: detach and reset to the blank address, keeping the pin
    /// - today: archive, detach, and move selection off it
    /// - archived or folder: detach and delete
    pub fn close_tab(&mut self, tab: TabId) -> Result<(), ShellError> {
        let location = self
            .workspace
            .locate(tab)
            .ok_or(ShellError::UnknownTab(tab))?;
        let is_folder = self.workspace.tab(tab).is_some_and(|record| record.is_folder);

        match location {
            _ if is_folder => {
                let gone = self.delete_tab_tree(tab)?;
                self.reselect_windows_showing(&gone);
            },
            TabLocation::Shared(_) | TabLocation::Space(_, TabList::Archived) => {
                let gone = self.delete_tab_tree(tab)?;
                self.reselect_windows_showing(&gone);
            },
            TabLocation::Space(_, TabList::Pinned) => self.reset_closed_pinned(tab),
            TabLocation::Space(space, TabList::Today) => self.archive_today_tab(space, tab),
            TabLocation::InFolder { space, .. } => match space {
                Some(space) => {
                    self.detach_from_location(tab)?;
                    self.archive_into(space, tab);
                    self.reselect_windows_showing(&[tab]);
                },
                None => {
                    let gone = self.delete_tab_tree(tab)?;
                    self.reselect_windows_showing(&gone);
                },
            },
        }
        self.persist();
        Ok(())
    }

    fn reset_closed_pinned(&mut self, tab: TabId) {
        let had_history = self.workspace.tab(tab).is_some_and(Tab::has_history);
        self.registry.detach(tab);
        let blank_address = self.prefs.blank_address.clone();
        let blank_title = self.prefs.blank_title.clone();
        if let Some(record) = self.workspace.tab_mut(tab) {
            record.address = blank_address;
            record.title = blank_title;
            record.can_go_back = false;
            record.can_go_forward = false;
            record.is_loading = false;
            record.is_playing_audio = false;
        }
        if had_history {
            debug!("Closed pinned tab {tab} with history; kept as blank pin");
        } else {
            debug!("Closed pinned tab {tab}; kept as blank pin");
        }
        self.mark_tab(tab);
    }

    fn archive_today_tab(&mut self, space: SpaceId, tab: TabId) {
        let fallback = selection_after_close(&self.workspace, space, tab);
        let selecting: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, state)| state.selected_tab == Some(tab))
            .map(|(id, _)| *id)
            .collect();
        if let Some(record) = self.workspace.space_mut(space) {
            record.today.retain(|id| *id != tab);
        }
        self.archive_into(space, tab);
        for window in selecting {
            self.set_selection(window, fallback);
        }
    }

    /// Append to the space's archive with placement flags cleared; detaches.
    fn archive_into(&mut self, space: SpaceId, tab: TabId) {
        if let Some(record) = self.workspace.tab_mut(tab) {
            record.is_pinned = false;
            record.is_shared = false;
            record.pinned_original_address = None;
            record.is_loading = false;
            record.is_playing_audio = false;
        }
        if let Some(record) = self.workspace.space_mut(space) {
            record.archived.push(tab);
        }
        self.registry.detach(tab);
        self.mark_tab(tab);
        self.mark_space(space);
    }

    /// Detach and delete `root` and every folder descendant. Returns the
    /// deleted ids.
    pub(super) fn delete_tab_tree(&mut self, root: TabId) -> Result<Vec<TabId>, ShellError> {
        self.detach_from_location(root)?;
        let mut gone = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if gone.contains(&id) {
                continue;
            }
            self.registry.detach(id);
            if let Some(record) = self.workspace.remove_tab(id) {
                stack.extend(record.children);
            }
            self.mark_tab(id);
            gone.push(id);
        }
        Ok(gone)
    }

    /// Remove `tab` from whatever list or folder holds it.
    pub(super) fn detach_from_location(&mut self, tab: TabId) -> Result<(), ShellError> {
        let location = self
            .workspace
            .locate(tab)
            .ok_or(ShellError::UnknownTab(tab))?;
        match location {
            TabLocation::Shared(profile) => {
                if let Some(record) = self.workspace.profile_mut(profile) {
                    record.shared_tabs.retain(|id| *id != tab);
                }
                self.mark_profile(profile);
            },
            TabLocation::Space(space, list) => {
                if let Some(record) = self.workspace.space_mut(space) {
                    record.list_mut(list).retain(|id| *id != tab);
                }
                self.mark_space(space);
            },
            TabLocation::InFolder { folder, .. } => {
                if let Some(record) = self.workspace.tab_mut(folder) {
                    record.children.retain(|id| *id != tab);
                }
                self.mark_tab(folder);
            },
        }
        Ok(())
    }

    /// Put a tab with no current location into `destination`, setting its
    /// placement flags.
    fn place(
        &mut self,
        tab: TabId,
        space: SpaceId,
        destination: TabDestination,
    ) -> Result<(), ShellError> {
        let profile = self
            .workspace
            .space(space)
            .ok_or(ShellError::UnknownSpace(space))?
            .profile;
        let record = self
            .workspace
            .tab_mut(tab)
            .ok_or(ShellError::UnknownTab(tab))?;
        match destination {
            TabDestination::Pinned => {
                record.is_pinned = true;
                record.is_shared = false;
                record.pinned_original_address = Some(record.address.clone());
            },
            TabDestination::Shared => {
                record.is_pinned = false;
                record.is_shared = true;
                record.pinned_original_address = None;
            },
            TabDestination::Today => {
                record.is_pinned = false;
                record.is_shared = false;
                record.pinned_original_address = None;
            },
        }
        self.registry.update_pinned_state(record);
        let pinned = record.is_pinned;
        match destination {
            TabDestination::Shared => {
                let Some(record) = self.workspace.profile_mut(profile) else {
                    return Err(ShellError::UnknownProfile(profile));
                };
                record.shared_tabs.push(tab);
                self.mark_profile(profile);
            },
            TabDestination::Pinned | TabDestination::Today => {
                let list = if pinned {
                    TabList::Pinned
                } else {
                    TabList::Today
                };
                if let Some(record) = self.workspace.space_mut(space) {
                    record.list_mut(list).push(tab);
                }
                self.mark_space(space);
            },
        }
        self.mark_tab(tab);
        Ok(())
    }

    /// Move tabs into `destination` of the window's space. Moving within the
    /// same list sends the tab to the end. Sessions are kept.
    pub fn move_tabs(
        &mut self,
        window: WindowId,
        tabs: &[TabId],
        destination: TabDestination,
    ) -> Result<(), ShellError> {
        let space = self.window_state(window)?.space;
        if let Some(missing) = tabs.iter().find(|id| self.workspace.locate(**id).is_none()) {
            return Err(ShellError::UnknownTab(*missing));
        }
        for tab in tabs {
            self.detach_from_location(*tab)?;
            self.place(*tab, space, destination)?;
        }
        self.persist();
        Ok(())
    }

    pub fn pin_tab(&mut self, window: WindowId, tab: TabId) -> Result<(), ShellError> {
        self.move_tabs(window, &[tab], TabDestination::Pinned)
    }

    /// Move a pinned or shared tab back to today. A displayed pinned tab that
    /// drifted is first restored to its pinned address.
    pub fn unpin_tab(&mut self, window: WindowId, tab: TabId) -> Result<(), ShellError> {
        let record = self.workspace.tab(tab).ok_or(ShellError::UnknownTab(tab))?;
        if !record.is_pinned && !record.is_shared {
            return Err(ShellError::NotPinned(tab));
        }
        if record.is_pinned && self.displaying_window(tab).is_some() {
            self.reset_pinned_tab(tab)?;
        }
        let space = match self.workspace.locate(tab) {
            Some(TabLocation::Space(space, _)) => space,
            _ => self.window_state(window)?.space,
        };
        self.detach_from_location(tab)?;
        self.place(tab, space, TabDestination::Today)?;
        self.persist();
        Ok(())
    }

    /// Move `tab` to the end of `target`'s today list. Windows that had it
    /// selected lose the selection. The session is kept.
    pub fn move_tab_to_space(&mut self, tab: TabId, target: SpaceId) -> Result<(), ShellError> {
        if self.workspace.space(target).is_none() {
            return Err(ShellError::UnknownSpace(target));
        }
        self.detach_from_location(tab)?;
        self.place(tab, target, TabDestination::Today)?;
        let selecting: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, state)| state.selected_tab == Some(tab))
            .map(|(id, _)| *id)
            .collect();
        for window in selecting {
            self.set_selection(window, None);
        }
        self.persist();
        Ok(())
    }

    /// Restore a drifted pinned tab to its pinned address. When the owning
    /// window displays the tab, its session loads that address right away;
    /// otherwise the session is restored the next time a window acquires it.
    /// Ownership never moves. Returns whether anything changed.
    pub fn reset_pinned_tab(&mut self, tab: TabId) -> Result<bool, ShellError> {
        let record = self.workspace.tab(tab).ok_or(ShellError::UnknownTab(tab))?;
        if !record.is_pinned {
            return Err(ShellError::NotPinned(tab));
        }
        let Some(original) = record
            .pinned_original_address
            .clone()
            .filter(|original| *original != record.address)
        else {
            return Ok(false);
        };
        if let Some(record) = self.workspace.tab_mut(tab) {
            record.address = original.clone();
        }
        self.mark_tab(tab);
        let owner = self.registry.owner(tab);
        if let Some(window) = owner
            && self
                .windows
                .get(&window)
                .is_some_and(|state| state.selected_tab == Some(tab))
        {
            self.registry
                .navigate(tab, window, NavigationCommand::Load(original))?;
        } else {
            self.registry.restore_on_acquire(tab, original);
            // Nobody owns it yet: the window showing it takes it now.
            if owner.is_none()
                && let Some(window) = self.displaying_window(tab)
            {
                let profile = self
                    .workspace
                    .effective_profile(tab)
                    .ok_or(ShellError::UnknownTab(tab))?;
                if let Some(record) = self.workspace.tab(tab) {
                    self.registry.acquire(record, window, profile)?;
                }
            }
        }
        self.persist();
        Ok(true)
    }

    /// Move the most recently archived tab of the window's space back to
    /// today and select it.
    pub fn reopen_last_closed(&mut self, window: WindowId) -> Result<Option<TabId>, ShellError> {
        let space = self.window_state(window)?.space;
        let Some(tab) = self
            .workspace
            .space_mut(space)
            .and_then(|record| record.archived.pop())
        else {
            return Ok(None);
        };
        if let Some(record) = self.workspace.space_mut(space) {
            record.today.push(tab);
        }
        self.mark_space(space);
        self.set_selection(window, Some(tab));
        self.persist();
        Ok(Some(tab))
    }

    /// Select the next (or previous) tab among shared, pinned and today,
    /// wrapping around.
    pub fn cycle_tab(&mut self, window: WindowId, forward: bool) -> Result<Option<TabId>, ShellError> {
        let state = self.window_state(window)?;
        let tabs = self.workspace.visible_tabs(state.space);
        if tabs.is_empty() {
            return Ok(None);
        }
        let current = state
            .selected_tab
            .and_then(|selected| tabs.iter().position(|id| *id == selected));
        let next = match (current, forward) {
            (Some(index), true) => (index + 1) % tabs.len(),
            (Some(index), false) => (index + tabs.len() - 1) % tabs.len(),
            (None, true) => 0,
            (None, false) => tabs.len() - 1,
        };
        self.select_tab(window, tabs[next])?;
        Ok(Some(tabs[next]))
    }

    /// Archive every today tab of the window's space.
    pub fn clear_today_tabs(&mut self, window: WindowId) -> Result<usize, ShellError> {
        let space = self.window_state(window)?.space;
        let today = self
            .workspace
            .space_mut(space)
            .map(|record| std::mem::take(&mut record.today))
            .unwrap_or_default();
        for tab in &today {
            self.archive_into(space, *tab);
        }
        self.reselect_windows_showing(&today);
        self.persist();
        Ok(today.len())
    }

    /// Detach and delete every archived tab of `space`.
    pub fn clear_archived_tabs(&mut self, space: SpaceId) -> Result<usize, ShellError> {
        let archived = self
            .workspace
            .space(space)
            .ok_or(ShellError::UnknownSpace(space))?
            .archived
            .clone();
        let mut gone = Vec::new();
        for tab in archived {
            gone.extend(self.delete_tab_tree(tab)?);
        }
        self.reselect_windows_showing(&gone);
        self.persist();
        Ok(gone.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Record, RecordKey};
    use crate::test_utils::{EngineCommand, TestShell};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn today(shell: &mut TestShell, address: &str) -> TabId {
        shell
            .browser
            .create_tab(shell.window, url(address), TabDestination::Today)
            .unwrap()
    }

    fn pinned(shell: &mut TestShell, address: &str) -> TabId {
        shell
            .browser
            .create_tab(shell.window, url(address), TabDestination::Pinned)
            .unwrap()
    }

    fn space_of(shell: &TestShell) -> SpaceId {
        shell.browser.window(shell.window).unwrap().space
    }

    fn selected(shell: &TestShell) -> Option<TabId> {
        shell.browser.window(shell.window).unwrap().selected_tab
    }

    #[test]
    fn create_selects_and_saves() {
        let mut shell = TestShell::new();
        let tab = today(&mut shell, "https://a.example");

        assert_eq!(selected(&shell), Some(tab));
        assert!(matches!(
            shell.store.committed(RecordKey::Tab(tab)),
            Some(Record::Tab(record)) if record.title == "New Tab"
        ));
        assert!(!shell.browser.has_unsaved_changes());
        assert!(!shell.browser.registry().has_session(tab));
    }

    #[test]
    fn closing_selected_today_tab_archives_and_moves_selection() {
        let mut shell = TestShell::new();
        let a = today(&mut shell, "https://a.example");
        let b = today(&mut shell, "https://b.example");
        let c = today(&mut shell, "https://c.example");
        shell.browser.select_tab(shell.window, b).unwrap();
        shell.browser.acquire_surface(shell.window, b).unwrap();

        shell.browser.close_tab(b).unwrap();

        let space = shell.browser.workspace().space(space_of(&shell)).unwrap();
        assert_eq!(space.today, vec![a, c]);
        assert_eq!(space.archived, vec![b]);
        assert_eq!(selected(&shell), Some(c));
        assert!(!shell.browser.registry().has_session(b));
        assert_eq!(shell.factory.commands(b).last(), Some(&EngineCommand::Stop));
        assert!(shell.factory.scripts_evaluated(b).is_empty());
    }

    #[test]
    fn closing_pinned_tab_blanks_it_and_keeps_the_pin() {
        let mut shell = TestShell::new();
        let tab = pinned(&mut shell, "https://mail.example");
        shell.browser.acquire_surface(shell.window, tab).unwrap();
        shell.navigate_engine(tab, "https://mail.example/inbox", "Inbox");

        shell.browser.close_tab(tab).unwrap();

        let record = shell.browser.workspace().tab(tab).unwrap();
        assert!(record.is_pinned);
        assert_eq!(record.address.as_str(), "about:blank");
        assert_eq!(record.title, "New Tab");
        assert!(!record.has_history());
        assert!(!shell.browser.registry().has_session(tab));
        assert_eq!(selected(&shell), Some(tab));
    }

    #[test]
    fn pin_unpin_pin_records_latest_address() {
        let mut shell = TestShell::new();
        let tab = today(&mut shell, "https://a.example");
        shell.browser.pin_tab(shell.window, tab).unwrap();
        shell.browser.unpin_tab(shell.window, tab).unwrap();
        let record = shell.browser.workspace().tab(tab).unwrap();
        assert!(!record.is_pinned);
        assert_eq!(record.pinned_original_address, None);

        shell.browser.acquire_surface(shell.window, tab).unwrap();
        shell.navigate_engine(tab, "https://b.example", "B");
        shell.browser.pin_tab(shell.window, tab).unwrap();

        let record = shell.browser.workspace().tab(tab).unwrap();
        assert!(record.is_pinned);
        assert_eq!(record.pinned_original_address, Some(url("https://b.example")));
        assert_eq!(shell.browser.registry().session_pinned(tab), Some(true));
    }

    #[test]
    fn unpin_requires_pinned_or_shared() {
        let mut shell = TestShell::new();
        let tab = today(&mut shell, "https://a.example");
        assert_eq!(
            shell.browser.unpin_tab(shell.window, tab),
            Err(ShellError::NotPinned(tab))
        );
    }

    #[test]
    fn reset_pinned_reloads_only_when_displayed() {
        let mut shell = TestShell::new();
        let tab = pinned(&mut shell, "https://a.example");
        shell.browser.acquire_surface(shell.window, tab).unwrap();
        shell.navigate_engine(tab, "https://a.example/deep", "Deep");

        assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(true));
        assert_eq!(
            shell.browser.workspace().tab(tab).unwrap().address,
            url("https://a.example")
        );
        assert_eq!(
            shell.factory.commands(tab).last(),
            Some(&EngineCommand::Load(url("https://a.example")))
        );
        assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(false));

        // Not displayed: data only.
        let other = today(&mut shell, "https://other.example");
        assert_eq!(selected(&shell), Some(other));
        shell.navigate_engine(tab, "https://a.example/again", "Again");
        let before = shell.factory.commands(tab).len();
        assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(true));
        assert_eq!(shell.factory.commands(tab).len(), before);
    }

    #[test]
    fn reset_reloads_through_the_owner_without_moving_it() {
        let mut shell = TestShell::new();
        let second = shell.browser.open_window();
        let tab = pinned(&mut shell, "https://a.example");
        shell.browser.select_tab(second, tab).unwrap();
        let first_shown = shell.browser.displaying_window(tab).unwrap();
        let owner = if first_shown == shell.window {
            second
        } else {
            shell.window
        };
        shell.browser.acquire_surface(owner, tab).unwrap();
        shell.navigate_engine(tab, "https://a.example/deep", "Deep");
        let token = shell.browser.registry().ownership_token();

        assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(true));

        assert!(shell.browser.registry().is_owner(tab, owner));
        assert_eq!(shell.browser.registry().ownership_token(), token);
        assert_eq!(shell.factory.pending_snapshot_count(), 0);
        assert_eq!(
            shell.factory.commands(tab).last(),
            Some(&EngineCommand::Load(url("https://a.example")))
        );
    }

    #[test]
    fn reset_while_hidden_restores_on_next_display_even_mid_load() {
        let mut shell = TestShell::new();
        let tab = pinned(&mut shell, "https://a.example");
        shell.browser.acquire_surface(shell.window, tab).unwrap();
        shell.navigate_engine(tab, "https://a.example/deep", "Deep");
        today(&mut shell, "https://other.example");
        shell
            .factory
            .emit(tab, crate::engine::EngineEventKind::NavigationStarted);
        shell.browser.pump();

        assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(true));
        shell.factory.emit(
            tab,
            crate::engine::EngineEventKind::AddressChanged(url("https://a.example/deeper")),
        );
        shell.browser.pump();
        assert_eq!(
            shell.browser.workspace().tab(tab).unwrap().address,
            url("https://a.example")
        );

        shell.browser.select_tab(shell.window, tab).unwrap();
        shell.browser.acquire_surface(shell.window, tab).unwrap();

        let commands = shell.factory.commands(tab);
        assert_eq!(
            commands[commands.len() - 2..],
            [EngineCommand::Stop, EngineCommand::Load(url("https://a.example"))]
        );
    }

    #[test]
    fn move_to_shared_clears_pin_and_keeps_session() {
        let mut shell = TestShell::new();
        let tab = pinned(&mut shell, "https://a.example");
        shell.browser.acquire_surface(shell.window, tab).unwrap();

        shell
            .browser
            .move_tabs(shell.window, &[tab], TabDestination::Shared)
            .unwrap();

        let record = shell.browser.workspace().tab(tab).unwrap();
        assert!(record.is_shared && !record.is_pinned);
        assert_eq!(record.pinned_original_address, None);
        assert!(shell.browser.registry().has_session(tab));
        assert!(matches!(
            shell.browser.workspace().locate(tab),
            Some(TabLocation::Shared(_))
        ));
    }

    #[test]
    fn move_tabs_rejects_unknown_ids_before_moving() {
        let mut shell = TestShell::new();
        let tab = today(&mut shell, "https://a.example");
        let missing = TabId::new();
        assert_eq!(
            shell
                .browser
                .move_tabs(shell.window, &[tab, missing], TabDestination::Pinned),
            Err(ShellError::UnknownTab(missing))
        );
        assert!(!shell.browser.workspace().tab(tab).unwrap().is_pinned);
    }

    #[test]
    fn cross_space_move_clears_selection_without_detach() {
        let mut shell = TestShell::new();
        let tab = today(&mut shell, "https://a.example");
        shell.browser.acquire_surface(shell.window, tab).unwrap();
        let target = shell.browser.create_space(None, None).unwrap();

        shell.browser.move_tab_to_space(tab, target).unwrap();

        assert_eq!(selected(&shell), None);
        assert!(shell.browser.registry().has_session(tab));
        assert_eq!(
            shell.browser.workspace().space(target).unwrap().today,
            vec![tab]
        );
    }

    #[test]
    fn folders_nest_and_close_as_a_tree() {
        let mut shell = TestShell::new();
        let folder = shell.browser.create_folder(shell.window, false).unwrap();
        let child = today(&mut shell, "https://child.example");
        let leaf = today(&mut shell, "https://leaf.example");
        shell.browser.move_into_folder(child, folder).unwrap();
        shell.browser.move_into_folder(leaf, folder).unwrap();
        shell.browser.acquire_surface(shell.window, leaf).unwrap();

        assert_eq!(
            shell.browser.move_into_folder(folder, folder),
            Err(ShellError::NotFolder(folder))
        );
        assert_eq!(
            shell.browser.move_into_folder(folder, child),
            Err(ShellError::NotFolder(child))
        );
        assert_eq!(
            shell.browser.workspace().tab(folder).unwrap().title,
            "New Folder"
        );

        shell.browser.close_tab(folder).unwrap();
        for id in [folder, child, leaf] {
            assert!(!shell.browser.workspace().contains_tab(id));
        }
        assert!(!shell.browser.registry().has_session(leaf));
        assert!(shell.store.committed(RecordKey::Tab(child)).is_none());
    }

    #[test]
    fn closing_folder_child_archives_it() {
        let mut shell = TestShell::new();
        let folder = shell.browser.create_folder(shell.window, true).unwrap();
        let child = today(&mut shell, "https://child.example");
        shell.browser.move_into_folder(child, folder).unwrap();

        shell.browser.close_tab(child).unwrap();

        let space = shell.browser.workspace().space(space_of(&shell)).unwrap();
        assert_eq!(space.archived, vec![child]);
        assert!(shell.browser.workspace().tab(folder).unwrap().children.is_empty());
    }

    #[test]
    fn reopen_restores_most_recent_archive() {
        let mut shell = TestShell::new();
        let a = today(&mut shell, "https://a.example");
        let b = today(&mut shell, "https://b.example");
        shell.browser.close_tab(a).unwrap();
        shell.browser.close_tab(b).unwrap();

        assert_eq!(shell.browser.reopen_last_closed(shell.window), Ok(Some(b)));
        assert_eq!(selected(&shell), Some(b));
        assert_eq!(shell.browser.reopen_last_closed(shell.window), Ok(Some(a)));
        assert_eq!(shell.browser.reopen_last_closed(shell.window), Ok(None));
    }

    #[test]
    fn cycle_wraps_over_visible_tabs() {
        let mut shell = TestShell::new();
        let p = pinned(&mut shell, "https://p.example");
        let a = today(&mut shell, "https://a.example");
        let b = today(&mut shell, "https://b.example");

        assert_eq!(shell.browser.cycle_tab(shell.window, true), Ok(Some(p)));
        assert_eq!(shell.browser.cycle_tab(shell.window, true), Ok(Some(a)));
        assert_eq!(shell.browser.cycle_tab(shell.window, false), Ok(Some(p)));
        assert_eq!(shell.browser.cycle_tab(shell.window, false), Ok(Some(b)));
    }

    #[test]
    fn clear_today_then_archive() {
        let mut shell = TestShell::new();
        let p = pinned(&mut shell, "https://p.example");
        let a = today(&mut shell, "https://a.example");
        let b = today(&mut shell, "https://b.example");
        shell.browser.acquire_surface(shell.window, b).unwrap();

        assert_eq!(shell.browser.clear_today_tabs(shell.window), Ok(2));
        assert!(!shell.browser.registry().has_session(b));
        assert_eq!(selected(&shell), Some(p));

        let space = space_of(&shell);
        assert_eq!(shell.browser.clear_archived_tabs(space), Ok(2));
        assert!(!shell.browser.workspace().contains_tab(a));
        assert!(shell.browser.workspace().space(space).unwrap().archived.is_empty());
    }

    #[test]
    fn failed_save_is_retried_on_next_change() {
        let mut shell = TestShell::new();
        shell.store.fail_next_saves(1);
        let a = today(&mut shell, "https://a.example");
        assert!(shell.browser.has_unsaved_changes());
        assert!(shell.store.committed(RecordKey::Tab(a)).is_none());

        let b = today(&mut shell, "https://b.example");
        assert!(!shell.browser.has_unsaved_changes());
        assert!(shell.store.committed(RecordKey::Tab(a)).is_some());
        assert!(shell.store.committed(RecordKey::Tab(b)).is_some());
    }
}
