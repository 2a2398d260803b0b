/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use super::{HistoryEntry, Profile, ProfileId, Space, SpaceId, Tab, TabId};

/// Top-level list of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabList {
    Pinned,
    Today,
    Archived,
}

/// Where a tab currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabLocation {
    Shared(ProfileId),
    Space(SpaceId, TabList),
    /// Child of a folder tab; carries the folder's space when it has one.
    InFolder {
        folder: TabId,
        space: Option<SpaceId>,
    },
}

/// In-memory entity model.
///
/// Profiles keep insertion order; spaces are addressed by id and presented in
/// `order_index` order.
#[derive(Debug, Default, Clone)]
pub struct Workspace {
    tabs: HashMap<TabId, Tab>,
    spaces: Vec<Space>,
    profiles: Vec<Profile>,
    history: Vec<HistoryEntry>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded records. Profiles are ordered by creation time so
    /// the "first profile" fallback is stable across restarts.
    pub fn from_parts(
        profiles: Vec<Profile>,
        spaces: Vec<Space>,
        tabs: Vec<Tab>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let mut profiles = profiles;
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let mut spaces = spaces;
        spaces.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        let mut history = history;
        history.sort_by(|a, b| a.visited_at.cmp(&b.visited_at));
        Self {
            tabs: tabs.into_iter().map(|tab| (tab.id, tab)).collect(),
            spaces,
            profiles,
            history,
        }
    }

    // --- tabs ---

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.get(&id)
    }

    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.get_mut(&id)
    }

    pub fn insert_tab(&mut self, tab: Tab) -> TabId {
        let id = tab.id;
        self.tabs.insert(id, tab);
        id
    }

    /// Remove the tab record. List membership is the caller's concern.
    pub fn remove_tab(&mut self, id: TabId) -> Option<Tab> {
        self.tabs.remove(&id)
    }

    pub fn contains_tab(&self, id: TabId) -> bool {
        self.tabs.contains_key(&id)
    }

    pub fn tabs(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.values()
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    // --- spaces ---

    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.iter().find(|space| space.id == id)
    }

    pub fn space_mut(&mut self, id: SpaceId) -> Option<&mut Space> {
        self.spaces.iter_mut().find(|space| space.id == id)
    }

    pub fn insert_space(&mut self, space: Space) -> SpaceId {
        let id = space.id;
        self.spaces.push(space);
        id
    }

    pub fn remove_space(&mut self, id: SpaceId) -> Option<Space> {
        let index = self.spaces.iter().position(|space| space.id == id)?;
        Some(self.spaces.remove(index))
    }

    /// Spaces in sidebar order.
    pub fn spaces_ordered(&self) -> Vec<&Space> {
        let mut ordered: Vec<&Space> = self.spaces.iter().collect();
        ordered.sort_by_key(|space| space.order_index);
        ordered
    }

    pub fn spaces_mut(&mut self) -> impl Iterator<Item = &mut Space> {
        self.spaces.iter_mut()
    }

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    // --- profiles ---

    pub fn profile(&self, id: ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn profile_mut(&mut self, id: ProfileId) -> Option<&mut Profile> {
        self.profiles.iter_mut().find(|profile| profile.id == id)
    }

    pub fn insert_profile(&mut self, profile: Profile) -> ProfileId {
        let id = profile.id;
        self.profiles.push(profile);
        id
    }

    pub fn remove_profile(&mut self, id: ProfileId) -> Option<Profile> {
        let index = self.profiles.iter().position(|profile| profile.id == id)?;
        Some(self.profiles.remove(index))
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile_by_name(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    // --- history ---

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Drop entries matching `predicate`, returning them.
    pub fn drain_history(&mut self, predicate: impl Fn(&HistoryEntry) -> bool) -> Vec<HistoryEntry> {
        let (removed, kept) = std::mem::take(&mut self.history)
            .into_iter()
            .partition(|entry| predicate(entry));
        self.history = kept;
        removed
    }

    // --- placement queries ---

    pub fn locate(&self, tab: TabId) -> Option<TabLocation> {
        if let Some(profile) = self.profiles.iter().find(|p| p.shared_tabs.contains(&tab)) {
            return Some(TabLocation::Shared(profile.id));
        }
        if let Some((space, list)) = self
            .spaces
            .iter()
            .find_map(|space| space.list_of(tab).map(|list| (space.id, list)))
        {
            return Some(TabLocation::Space(space, list));
        }
        let folder = self
            .tabs
            .values()
            .find(|candidate| candidate.is_folder && candidate.children.contains(&tab))?;
        let space = self.space_of_folder(folder.id);
        Some(TabLocation::InFolder {
            folder: folder.id,
            space,
        })
    }

    fn space_of_folder(&self, folder: TabId) -> Option<SpaceId> {
        // Folders nest; walk up until a space list is reached.
        let mut current = folder;
        for _ in 0..self.tabs.len() {
            match self.locate_shallow(current) {
                Some(TabLocation::Space(space, _)) => return Some(space),
                Some(TabLocation::InFolder { folder, .. }) => current = folder,
                _ => return None,
            }
        }
        None
    }

    fn locate_shallow(&self, tab: TabId) -> Option<TabLocation> {
        if let Some((space, list)) = self
            .spaces
            .iter()
            .find_map(|space| space.list_of(tab).map(|list| (space.id, list)))
        {
            return Some(TabLocation::Space(space, list));
        }
        self.tabs
            .values()
            .find(|candidate| candidate.is_folder && candidate.children.contains(&tab))
            .map(|folder| TabLocation::InFolder {
                folder: folder.id,
                space: None,
            })
    }

    /// Profile whose storage a tab's session must use.
    pub fn effective_profile(&self, tab: TabId) -> Option<ProfileId> {
        match self.locate(tab)? {
            TabLocation::Shared(profile) => Some(profile),
            TabLocation::Space(space, _) => self.space(space).map(|space| space.profile),
            TabLocation::InFolder { space, .. } => {
                space.and_then(|space| self.space(space)).map(|space| space.profile)
            },
        }
    }

    /// Tabs reachable from the space's lists, including folder descendants.
    pub fn space_tab_tree(&self, space: SpaceId) -> Vec<TabId> {
        let Some(space) = self.space(space) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<TabId> = space
            .pinned
            .iter()
            .chain(space.today.iter())
            .chain(space.archived.iter())
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            if out.contains(&id) {
                continue;
            }
            out.push(id);
            if let Some(tab) = self.tabs.get(&id) {
                stack.extend(tab.children.iter().rev().copied());
            }
        }
        out
    }

    /// Shared tabs of the space's profile, then pinned, then today.
    pub fn visible_tabs(&self, space: SpaceId) -> Vec<TabId> {
        let Some(space) = self.space(space) else {
            return Vec::new();
        };
        let shared = self
            .profile(space.profile)
            .map(|profile| profile.shared_tabs.clone())
            .unwrap_or_default();
        shared
            .into_iter()
            .chain(space.pinned.iter().copied())
            .chain(space.today.iter().copied())
            .collect()
    }

    /// Remove ids with no tab record from every list. Returns how many were dropped.
    pub fn drop_dangling_ids(&mut self) -> usize {
        let tabs = &self.tabs;
        let mut dropped = 0;
        let mut keep = |id: &TabId| {
            let live = tabs.contains_key(id);
            if !live {
                dropped += 1;
            }
            live
        };
        for space in &mut self.spaces {
            space.pinned.retain(&mut keep);
            space.today.retain(&mut keep);
            space.archived.retain(&mut keep);
            if space.last_selected_tab.is_some_and(|id| !tabs.contains_key(&id)) {
                space.last_selected_tab = None;
            }
        }
        for profile in &mut self.profiles {
            profile.shared_tabs.retain(&mut keep);
        }
        let dangling_children: Vec<(TabId, TabId)> = tabs
            .values()
            .flat_map(|tab| {
                tab.children
                    .iter()
                    .filter(move |child| !tabs.contains_key(child))
                    .map(move |child| (tab.id, *child))
            })
            .collect();
        for (parent, child) in &dangling_children {
            if let Some(tab) = self.tabs.get_mut(parent) {
                tab.children.retain(|id| id != child);
            }
        }
        dropped + dangling_children.len()
    }
}
