/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::BTreeSet;
use std::time::SystemTime;

use log::{info, warn};

use super::Browser;
use crate::model::{ProfileId, TabId};
use crate::persistence::RecordKey;
use crate::prefs::ClearTabsPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataCategory {
    /// Today tabs of every space.
    Tabs,
    History,
    /// Cookies, caches and other engine storage.
    SiteData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClearDataRequest {
    pub since: SystemTime,
    pub categories: BTreeSet<DataCategory>,
}

impl ClearDataRequest {
    pub fn new(since: SystemTime, categories: impl IntoIterator<Item = DataCategory>) -> Self {
        Self {
            since,
            categories: categories.into_iter().collect(),
        }
    }

    pub fn wants(&self, category: DataCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearDataSummary {
    pub tabs_removed: usize,
    pub history_removed: usize,
    pub profiles_cleared: usize,
}

impl Browser {
    pub fn clear_data(&mut self, request: &ClearDataRequest) -> ClearDataSummary {
        let mut summary = ClearDataSummary::default();
        if request.wants(DataCategory::Tabs) {
            summary.tabs_removed = self.clear_today_everywhere(request.since);
        }
        if request.wants(DataCategory::History) {
            let removed = self
                .workspace
                .drain_history(|entry| entry.visited_at >= request.since);
            for entry in &removed {
                self.mark(RecordKey::History(entry.id));
            }
            summary.history_removed = removed.len();
        }
        if request.wants(DataCategory::SiteData) {
            let profiles: Vec<ProfileId> = self
                .workspace
                .profiles()
                .iter()
                .map(|profile| profile.id)
                .collect();
            for profile in profiles {
                match self.registry.clear_site_data(profile, request.since) {
                    Ok(()) => summary.profiles_cleared += 1,
                    Err(e) => warn!("Clearing site data for profile {profile} failed: {e}"),
                }
            }
        }
        self.persist();
        summary
    }

    /// Delete today tabs in every space according to the clear-tabs policy.
    fn clear_today_everywhere(&mut self, since: SystemTime) -> usize {
        let policy = self.prefs.clear_tabs_policy;
        if policy == ClearTabsPolicy::AllToday {
            info!("Clearing all today tabs; the requested cutoff does not apply to tabs");
        }
        let mut doomed: Vec<TabId> = Vec::new();
        for space in self.workspace.spaces_ordered() {
            doomed.extend(space.today.iter().copied().filter(|id| {
                policy == ClearTabsPolicy::AllToday
                    || self
                        .workspace
                        .tab(*id)
                        .is_some_and(|tab| tab.created_at >= since)
            }));
        }
        let mut gone = Vec::new();
        for tab in doomed {
            match self.delete_tab_tree(tab) {
                Ok(ids) => gone.extend(ids),
                Err(e) => warn!("Clearing tab {tab} failed: {e}"),
            }
        }
        self.reselect_windows_showing(&gone);
        gone.len()
    }
}
