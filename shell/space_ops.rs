/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Spaces and profiles: creation, deletion, reordering, and the repair pass
//! run when the workspace is loaded.

use log::{debug, info, warn};
use rand::seq::SliceRandom;

use super::browser::DeferredWork;
use super::{Browser, ShellError};
use crate::model::{Profile, ProfileId, Space, SpaceId, TabId, WindowId};
use crate::persistence::RecordKey;

const SPACE_COLORS: [&str; 5] = ["#FF5733", "#33FF57", "#3357FF", "#F333FF", "#33FFF3"];
const SPACE_EMOJI: [&str; 8] = ["🌿", "🚀", "📚", "🎨", "🔭", "🧪", "🎧", "🌊"];

impl Browser {
    /// Create a space bound to the first profile and, when `window` is given,
    /// switch that window to it.
    pub fn create_space(
        &mut self,
        window: Option<WindowId>,
        name: Option<String>,
    ) -> Result<SpaceId, ShellError> {
        if let Some(window) = window {
            self.window_state(window)?;
        }
        let profile = self
            .live_profiles()
            .first()
            .copied()
            .ok_or(ShellError::LastProfile)?;
        let id = self.insert_new_space(name, profile);
        if let Some(window) = window {
            self.select_space(window, id)?;
        }
        self.persist();
        Ok(id)
    }

    fn insert_new_space(&mut self, name: Option<String>, profile: ProfileId) -> SpaceId {
        let count = self.workspace.space_count();
        let name = name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Space {}", count + 1));
        let mut rng = rand::thread_rng();
        let color = SPACE_COLORS.choose(&mut rng).copied().unwrap_or(SPACE_COLORS[0]);
        let mut space = Space::new(name, color, profile);
        space.emoji_icon = SPACE_EMOJI.choose(&mut rng).map(|emoji| emoji.to_string());
        space.order_index = self
            .workspace
            .spaces_ordered()
            .last()
            .map_or(0, |last| last.order_index + 1);
        let id = self.workspace.insert_space(space);
        debug!("Created space {id} in profile {profile}");
        self.mark_space(id);
        id
    }

    pub fn rename_space(&mut self, space: SpaceId, name: impl Into<String>) -> Result<(), ShellError> {
        let record = self
            .workspace
            .space_mut(space)
            .ok_or(ShellError::UnknownSpace(space))?;
        record.name = name.into();
        self.mark_space(space);
        self.persist();
        Ok(())
    }

    /// Rebind a space to another profile. Its tabs move to the new profile's
    /// storage the next time they are displayed.
    pub fn assign_space_profile(
        &mut self,
        space: SpaceId,
        profile: ProfileId,
    ) -> Result<(), ShellError> {
        if self.workspace.profile(profile).is_none()
            || self.pending_profile_deletions.contains(&profile)
        {
            return Err(ShellError::UnknownProfile(profile));
        }
        let record = self
            .workspace
            .space_mut(space)
            .ok_or(ShellError::UnknownSpace(space))?;
        if record.profile == profile {
            return Ok(());
        }
        record.profile = profile;
        self.mark_space(space);
        for window in self.windows_on(space) {
            self.ensure_selected_tab(window);
        }
        self.persist();
        Ok(())
    }

    /// Delete a space and every tab it contains. Windows showing it move to
    /// the first remaining space.
    pub fn delete_space(&mut self, space: SpaceId) -> Result<(), ShellError> {
        if self.workspace.space(space).is_none() {
            return Err(ShellError::UnknownSpace(space));
        }
        if self.workspace.space_count() <= 1 {
            return Err(ShellError::LastSpace);
        }
        let tree = self.workspace.space_tab_tree(space);
        for tab in &tree {
            self.registry.detach(*tab);
            self.workspace.remove_tab(*tab);
            self.mark_tab(*tab);
        }
        self.workspace.remove_space(space);
        self.mark_space(space);
        self.reindex_spaces();
        info!("Deleted space {space} with {} tabs", tree.len());

        let fallback = self.workspace.spaces_ordered().first().map(|first| first.id);
        if let Some(fallback) = fallback {
            for window in self.windows_on(space) {
                if let Some(state) = self.windows.get_mut(&window) {
                    state.space = fallback;
                }
                self.set_selection(window, None);
                self.ensure_selected_tab(window);
            }
        }
        self.persist();
        Ok(())
    }

    /// Move a space to `to_index` in sidebar order, clamped to the end.
    pub fn move_space(&mut self, space: SpaceId, to_index: usize) -> Result<(), ShellError> {
        let mut order: Vec<SpaceId> = self
            .workspace
            .spaces_ordered()
            .iter()
            .map(|record| record.id)
            .collect();
        let from = order
            .iter()
            .position(|id| *id == space)
            .ok_or(ShellError::UnknownSpace(space))?;
        let moved = order.remove(from);
        order.insert(to_index.min(order.len()), moved);
        self.write_order(&order);
        self.persist();
        Ok(())
    }

    fn reindex_spaces(&mut self) {
        let order: Vec<SpaceId> = self
            .workspace
            .spaces_ordered()
            .iter()
            .map(|record| record.id)
            .collect();
        self.write_order(&order);
    }

    fn write_order(&mut self, order: &[SpaceId]) {
        for (index, id) in order.iter().enumerate() {
            if let Some(record) = self.workspace.space_mut(*id)
                && record.order_index != index
            {
                record.order_index = index;
                self.mark_space(*id);
            }
        }
    }

    /// Switch `window` to `space`, remembering the tab it leaves.
    pub fn select_space(&mut self, window: WindowId, space: SpaceId) -> Result<(), ShellError> {
        let state = self.window_state(window)?;
        if self.workspace.space(space).is_none() {
            return Err(ShellError::UnknownSpace(space));
        }
        if state.space == space {
            return Ok(());
        }
        self.remember_selection(state.space, state.selected_tab);
        if let Some(state) = self.windows.get_mut(&window) {
            state.space = space;
        }
        self.ensure_selected_tab(window);
        self.persist();
        Ok(())
    }

    fn windows_on(&self, space: SpaceId) -> Vec<WindowId> {
        self.windows
            .iter()
            .filter(|(_, state)| state.space == space)
            .map(|(id, _)| *id)
            .collect()
    }

    // --- profiles ---

    pub fn create_profile(&mut self, name: impl Into<String>, incognito: bool) -> ProfileId {
        let mut profile = Profile::new(name);
        profile.is_incognito = incognito;
        let id = self.workspace.insert_profile(profile);
        self.mark_profile(id);
        self.persist();
        id
    }

    /// Profiles not awaiting deletion, oldest first.
    fn live_profiles(&self) -> Vec<ProfileId> {
        self.workspace
            .profiles()
            .iter()
            .map(|profile| profile.id)
            .filter(|id| !self.pending_profile_deletions.contains(id))
            .collect()
    }

    /// Reassign the profile's spaces to the first remaining profile and save,
    /// then schedule its storage and record for removal on the next pump.
    pub fn delete_profile(&mut self, profile: ProfileId) -> Result<(), ShellError> {
        if self.workspace.profile(profile).is_none()
            || self.pending_profile_deletions.contains(&profile)
        {
            return Err(ShellError::UnknownProfile(profile));
        }
        let Some(fallback) = self
            .live_profiles()
            .into_iter()
            .find(|id| *id != profile)
        else {
            return Err(ShellError::LastProfile);
        };

        let mut moved = Vec::new();
        for space in self.workspace.spaces_mut() {
            if space.profile == profile {
                space.profile = fallback;
                moved.push(space.id);
            }
        }
        for space in &moved {
            self.mark_space(*space);
        }
        info!(
            "Deleting profile {profile}; moved {} spaces to {fallback}",
            moved.len()
        );
        self.pending_profile_deletions.insert(profile);
        self.deferred.push_back(DeferredWork::PurgeProfile(profile));
        for space in moved {
            for window in self.windows_on(space) {
                self.ensure_selected_tab(window);
            }
        }
        self.persist();
        Ok(())
    }

    /// Second half of profile deletion: drop its shared tabs, erase its
    /// engine storage and delete the record.
    pub(super) fn purge_profile(&mut self, profile: ProfileId) {
        let shared: Vec<TabId> = self
            .workspace
            .profile(profile)
            .map(|record| record.shared_tabs.clone())
            .unwrap_or_default();
        let mut gone = Vec::new();
        for tab in shared {
            match self.delete_tab_tree(tab) {
                Ok(ids) => gone.extend(ids),
                Err(e) => warn!("Dropping shared tab {tab} of profile {profile} failed: {e}"),
            }
        }
        if let Err(e) = self.registry.purge_profile_storage(profile) {
            warn!("Erasing storage for profile {profile} failed: {e}");
        }
        self.workspace.remove_profile(profile);
        self.mark_profile(profile);
        self.pending_profile_deletions.remove(&profile);
        self.reselect_windows_showing(&gone);
        debug!("Purged profile {profile}");
    }

    // --- repair ---

    /// Run the repair pass and save what it changed.
    pub fn sanitize(&mut self) -> usize {
        let repairs = self.repair();
        self.persist();
        repairs
    }

    /// Ensure a profile and a space exist, rebind spaces whose profile is
    /// missing, and drop ids that point at no tab. Returns the number of
    /// repairs made.
    pub(super) fn repair(&mut self) -> usize {
        let mut repairs = 0;
        let fallback = match self
            .workspace
            .profile_by_name(&self.prefs.default_profile_name)
            .or_else(|| self.workspace.profiles().first())
        {
            Some(profile) => profile.id,
            None => {
                repairs += 1;
                let profile = Profile::new(self.prefs.default_profile_name.clone());
                let id = self.workspace.insert_profile(profile);
                self.mark_profile(id);
                info!("Created default profile {id}");
                id
            },
        };

        let orphaned: Vec<(SpaceId, ProfileId)> = self
            .workspace
            .spaces_ordered()
            .iter()
            .filter(|space| self.workspace.profile(space.profile).is_none())
            .map(|space| (space.id, space.profile))
            .collect();
        for (space, profile) in orphaned {
            warn!("Space {space} referenced missing profile {profile}; rebinding to {fallback}");
            if let Some(record) = self.workspace.space_mut(space) {
                record.profile = fallback;
            }
            self.mark_space(space);
            repairs += 1;
        }

        let dangling = self.workspace.drop_dangling_ids();
        if dangling > 0 {
            warn!("Dropped {dangling} dangling tab references");
            repairs += dangling;
            self.mark_all();
        }

        if self.workspace.space_count() == 0 {
            repairs += 1;
            self.insert_new_space(None, fallback);
        }
        self.reindex_spaces();
        repairs
    }

    /// Create the first space when none exists.
    pub(super) fn bootstrap_space(&mut self) -> SpaceId {
        let profile = match self.live_profiles().first() {
            Some(profile) => *profile,
            None => {
                let profile = Profile::new(self.prefs.default_profile_name.clone());
                let id = self.workspace.insert_profile(profile);
                self.mark_profile(id);
                id
            },
        };
        self.insert_new_space(None, profile)
    }

    fn mark_all(&mut self) {
        let keys: Vec<RecordKey> = self
            .workspace
            .spaces_ordered()
            .iter()
            .map(|space| RecordKey::Space(space.id))
            .chain(
                self.workspace
                    .profiles()
                    .iter()
                    .map(|profile| RecordKey::Profile(profile.id)),
            )
            .chain(self.workspace.tabs().map(|tab| RecordKey::Tab(tab.id)))
            .collect();
        for key in keys {
            self.mark(key);
        }
    }
}
