/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Persisted record types for rkyv serialization.
//!
//! Ids and URLs are stored as strings, timestamps as milliseconds since the
//! Unix epoch. Transient tab state (loading, audio) is never written.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::warn;
use rkyv::{Archive, Deserialize, Serialize};
use url::Url;

use crate::model::{HistoryEntry, HistoryId, Profile, ProfileId, Space, SpaceId, Tab, TabId};

#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedProfile {
    pub profile_id: String,
    pub name: String,
    pub is_incognito: bool,
    pub shared_tabs: Vec<String>,
    pub created_at_ms: u64,
}

#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedSpace {
    pub space_id: String,
    pub name: String,
    pub color_hex: String,
    pub emoji_icon: Option<String>,
    pub pinned: Vec<String>,
    pub today: Vec<String>,
    pub archived: Vec<String>,
    pub order_index: u64,
    pub last_selected_tab: Option<String>,
    pub profile_id: String,
}

#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedTab {
    pub tab_id: String,
    pub address: String,
    pub title: String,
    pub emoji_icon: Option<String>,
    pub is_pinned: bool,
    pub is_shared: bool,
    pub is_folder: bool,
    pub children: Vec<String>,
    pub pinned_original_address: Option<String>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub created_at_ms: u64,
    pub last_active_ms: u64,
}

#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedHistoryEntry {
    pub entry_id: String,
    pub url: String,
    pub title: Option<String>,
    pub visited_at_ms: u64,
}

pub(crate) fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

fn ids<T: std::str::FromStr>(raw: &[String]) -> Vec<T> {
    raw.iter().filter_map(|id| id.parse().ok()).collect()
}

impl From<&Profile> for PersistedProfile {
    fn from(profile: &Profile) -> Self {
        Self {
            profile_id: profile.id.to_string(),
            name: profile.name.clone(),
            is_incognito: profile.is_incognito,
            shared_tabs: profile.shared_tabs.iter().map(ToString::to_string).collect(),
            created_at_ms: to_millis(profile.created_at),
        }
    }
}

impl PersistedProfile {
    pub fn into_profile(self) -> Option<Profile> {
        let Ok(id) = self.profile_id.parse::<ProfileId>() else {
            warn!("Skipping profile record with bad id {:?}", self.profile_id);
            return None;
        };
        Some(Profile {
            id,
            name: self.name,
            is_incognito: self.is_incognito,
            shared_tabs: ids(&self.shared_tabs),
            created_at: from_millis(self.created_at_ms),
        })
    }
}

impl From<&Space> for PersistedSpace {
    fn from(space: &Space) -> Self {
        let strings = |list: &[TabId]| list.iter().map(ToString::to_string).collect();
        Self {
            space_id: space.id.to_string(),
            name: space.name.clone(),
            color_hex: space.color_hex.clone(),
            emoji_icon: space.emoji_icon.clone(),
            pinned: strings(&space.pinned),
            today: strings(&space.today),
            archived: strings(&space.archived),
            order_index: space.order_index as u64,
            last_selected_tab: space.last_selected_tab.map(|id| id.to_string()),
            profile_id: space.profile.to_string(),
        }
    }
}

impl PersistedSpace {
    /// A space whose profile id does not parse is kept with a fresh id so
    /// sanitation can rebind it.
    pub fn into_space(self) -> Option<Space> {
        let Ok(id) = self.space_id.parse::<SpaceId>() else {
            warn!("Skipping space record with bad id {:?}", self.space_id);
            return None;
        };
        Some(Space {
            id,
            name: self.name,
            color_hex: self.color_hex,
            emoji_icon: self.emoji_icon,
            pinned: ids(&self.pinned),
            today: ids(&self.today),
            archived: ids(&self.archived),
            order_index: self.order_index as usize,
            last_selected_tab: self.last_selected_tab.and_then(|id| id.parse().ok()),
            profile: self.profile_id.parse().unwrap_or_default(),
        })
    }
}

impl From<&Tab> for PersistedTab {
    fn from(tab: &Tab) -> Self {
        Self {
            tab_id: tab.id.to_string(),
            address: tab.address.to_string(),
            title: tab.title.clone(),
            emoji_icon: tab.emoji_icon.clone(),
            is_pinned: tab.is_pinned,
            is_shared: tab.is_shared,
            is_folder: tab.is_folder,
            children: tab.children.iter().map(ToString::to_string).collect(),
            pinned_original_address: tab.pinned_original_address.as_ref().map(Url::to_string),
            can_go_back: tab.can_go_back,
            can_go_forward: tab.can_go_forward,
            created_at_ms: to_millis(tab.created_at),
            last_active_ms: to_millis(tab.last_active),
        }
    }
}

impl PersistedTab {
    pub fn into_tab(self) -> Option<Tab> {
        let Ok(id) = self.tab_id.parse::<TabId>() else {
            warn!("Skipping tab record with bad id {:?}", self.tab_id);
            return None;
        };
        let Ok(address) = Url::parse(&self.address) else {
            warn!("Skipping tab {id} with unparseable address {:?}", self.address);
            return None;
        };
        Some(Tab {
            id,
            address,
            title: self.title,
            emoji_icon: self.emoji_icon,
            is_pinned: self.is_pinned,
            is_shared: self.is_shared,
            is_folder: self.is_folder,
            children: ids(&self.children),
            pinned_original_address: self
                .pinned_original_address
                .and_then(|raw| Url::parse(&raw).ok()),
            can_go_back: self.can_go_back,
            can_go_forward: self.can_go_forward,
            is_loading: false,
            is_playing_audio: false,
            created_at: from_millis(self.created_at_ms),
            last_active: from_millis(self.last_active_ms),
        })
    }
}

impl From<&HistoryEntry> for PersistedHistoryEntry {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            entry_id: entry.id.to_string(),
            url: entry.url.to_string(),
            title: entry.title.clone(),
            visited_at_ms: to_millis(entry.visited_at),
        }
    }
}

impl PersistedHistoryEntry {
    pub fn into_entry(self) -> Option<HistoryEntry> {
        let id = self.entry_id.parse::<HistoryId>().ok()?;
        let url = Url::parse(&self.url).ok()?;
        Some(HistoryEntry {
            id,
            url,
            title: self.title,
            visited_at: from_millis(self.visited_at_ms),
        })
    }
}
