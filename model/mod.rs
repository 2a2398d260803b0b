/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab, space and profile entities for the browser chrome.
//!
//! Core structures:
//! - `Tab`: one logical browsing context (address, title, placement flags)
//! - `Space`: ordered pinned/today/archived tab lists bound to one profile
//! - `Profile`: storage isolation boundary that owns the shared tabs
//! - `Workspace`: the in-memory model; authoritative until the next save

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

mod workspace;

pub use workspace::{TabList, TabLocation, Workspace};

/// Address a pinned tab is reset to when its session is closed.
pub const BLANK_ADDRESS: &str = "about:blank";

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Stable tab identity; also the key of the tab's session.
    TabId
);
entity_id!(SpaceId);
entity_id!(ProfileId);
entity_id!(
    /// Identity of one top-level window. Never persisted.
    WindowId
);
entity_id!(HistoryId);

/// A logical browsing context.
#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub id: TabId,
    pub address: Url,
    pub title: String,
    pub emoji_icon: Option<String>,
    pub is_pinned: bool,
    pub is_shared: bool,
    pub is_folder: bool,
    /// Ordered child tabs; only meaningful when `is_folder` is set.
    pub children: Vec<TabId>,
    /// Address recorded at the moment the tab was last pinned.
    pub pinned_original_address: Option<Url>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    /// Transient, never persisted.
    pub is_loading: bool,
    /// Transient, never persisted.
    pub is_playing_audio: bool,
    pub created_at: SystemTime,
    pub last_active: SystemTime,
}

impl Tab {
    pub fn new(address: Url, title: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: TabId::new(),
            address,
            title: title.into(),
            emoji_icon: None,
            is_pinned: false,
            is_shared: false,
            is_folder: false,
            children: Vec::new(),
            pinned_original_address: None,
            can_go_back: false,
            can_go_forward: false,
            is_loading: false,
            is_playing_audio: false,
            created_at: now,
            last_active: now,
        }
    }

    pub fn folder(address: Url, title: impl Into<String>) -> Self {
        Self {
            is_folder: true,
            ..Self::new(address, title)
        }
    }

    /// Capability flags double as "has a session with history".
    pub fn has_history(&self) -> bool {
        self.can_go_back || self.can_go_forward
    }

    /// Pinned tab whose live address drifted from the pinned one.
    pub fn has_drifted_from_pin(&self) -> bool {
        self.is_pinned
            && self
                .pinned_original_address
                .as_ref()
                .is_some_and(|original| *original != self.address)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    pub color_hex: String,
    pub emoji_icon: Option<String>,
    pub pinned: Vec<TabId>,
    pub today: Vec<TabId>,
    pub archived: Vec<TabId>,
    pub order_index: usize,
    pub last_selected_tab: Option<TabId>,
    pub profile: ProfileId,
}

impl Space {
    pub fn new(name: impl Into<String>, color_hex: impl Into<String>, profile: ProfileId) -> Self {
        Self {
            id: SpaceId::new(),
            name: name.into(),
            color_hex: color_hex.into(),
            emoji_icon: None,
            pinned: Vec::new(),
            today: Vec::new(),
            archived: Vec::new(),
            order_index: 0,
            last_selected_tab: None,
            profile,
        }
    }

    pub fn list(&self, list: TabList) -> &Vec<TabId> {
        match list {
            TabList::Pinned => &self.pinned,
            TabList::Today => &self.today,
            TabList::Archived => &self.archived,
        }
    }

    pub fn list_mut(&mut self, list: TabList) -> &mut Vec<TabId> {
        match list {
            TabList::Pinned => &mut self.pinned,
            TabList::Today => &mut self.today,
            TabList::Archived => &mut self.archived,
        }
    }

    /// Which top-level list holds `tab`, if any.
    pub fn list_of(&self, tab: TabId) -> Option<TabList> {
        [TabList::Pinned, TabList::Today, TabList::Archived]
            .into_iter()
            .find(|list| self.list(*list).contains(&tab))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub is_incognito: bool,
    pub shared_tabs: Vec<TabId>,
    pub created_at: SystemTime,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(),
            name: name.into(),
            is_incognito: false,
            shared_tabs: Vec::new(),
            created_at: SystemTime::now(),
        }
    }
}

/// One committed navigation, recorded from a session's address change.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub url: Url,
    pub title: Option<String>,
    pub visited_at: SystemTime,
}

impl HistoryEntry {
    pub fn new(url: Url, title: Option<String>) -> Self {
        Self {
            id: HistoryId::new(),
            url,
            title,
            visited_at: SystemTime::now(),
        }
    }
}

/// `about:blank` as a parsed URL.
pub fn blank_url() -> Url {
    Url::parse(BLANK_ADDRESS).unwrap_or_else(|_| unreachable!("about:blank is a valid URL"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = TabId::new();
        let parsed: TabId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn drift_requires_pin_and_differing_address() {
        let mut tab = Tab::new(url("https://a.example/page"), "A");
        tab.pinned_original_address = Some(url("https://a.example"));
        assert!(!tab.has_drifted_from_pin());

        tab.is_pinned = true;
        assert!(tab.has_drifted_from_pin());

        tab.address = url("https://a.example");
        assert!(!tab.has_drifted_from_pin());
    }

    #[test]
    fn space_list_of_reports_source_list() {
        let mut space = Space::new("S", "#000000", ProfileId::new());
        let a = TabId::new();
        let b = TabId::new();
        space.pinned.push(a);
        space.today.push(b);

        assert_eq!(space.list_of(b), Some(TabList::Today));
        assert_eq!(space.list_of(a), Some(TabList::Pinned));
        space.list_mut(TabList::Today).clear();
        assert_eq!(space.list_of(b), None);
    }
}
