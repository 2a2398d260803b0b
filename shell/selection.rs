/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab selection per window, and the fallback rules used when the selected
//! tab goes away.

use log::debug;

use super::{Browser, ShellError};
use crate::model::{SpaceId, TabId, WindowId, Workspace};

/// Shared tabs of the space's profile, pinned and today tabs.
fn selectable_in(workspace: &Workspace, space: SpaceId, tab: TabId) -> bool {
    workspace.visible_tabs(space).contains(&tab)
}

/// Selection when a window enters `space`: the current tab if it belongs
/// there, else the remembered one, else first shared, first pinned, first
/// today.
pub(crate) fn entry_selection(
    workspace: &Workspace,
    space: SpaceId,
    current: Option<TabId>,
) -> Option<TabId> {
    if let Some(current) = current
        && selectable_in(workspace, space, current)
    {
        return Some(current);
    }
    let record = workspace.space(space)?;
    if let Some(remembered) = record.last_selected_tab
        && selectable_in(workspace, space, remembered)
    {
        return Some(remembered);
    }
    let shared = workspace
        .profile(record.profile)
        .and_then(|profile| profile.shared_tabs.first().copied());
    shared
        .or_else(|| record.pinned.first().copied())
        .or_else(|| record.today.first().copied())
}

/// Selection after the today tab `closed` leaves `space`: the next today
/// tab, the previous one, the last pinned tab, the first shared tab.
pub(crate) fn selection_after_close(
    workspace: &Workspace,
    space: SpaceId,
    closed: TabId,
) -> Option<TabId> {
    let record = workspace.space(space)?;
    if let Some(index) = record.today.iter().position(|id| *id == closed) {
        if let Some(next) = record.today.get(index + 1) {
            return Some(*next);
        }
        if index > 0 {
            return Some(record.today[index - 1]);
        }
    }
    record.pinned.last().copied().or_else(|| {
        workspace
            .profile(record.profile)
            .and_then(|profile| profile.shared_tabs.first().copied())
    })
}

impl Browser {
    pub fn select_tab(&mut self, window: WindowId, tab: TabId) -> Result<(), ShellError> {
        let state = self.window_state(window)?;
        if !self.workspace.contains_tab(tab) {
            return Err(ShellError::UnknownTab(tab));
        }
        if state.selected_tab == Some(tab) {
            return Ok(());
        }
        self.set_selection(window, Some(tab));
        self.persist();
        Ok(())
    }

    /// Re-run the entry rules for the window's space.
    pub(super) fn ensure_selected_tab(&mut self, window: WindowId) {
        let Some(state) = self.windows.get(&window).copied() else {
            return;
        };
        let selection = entry_selection(&self.workspace, state.space, state.selected_tab);
        if selection != state.selected_tab {
            debug!("Window {window} selection falls back to {selection:?}");
            self.set_selection(window, selection);
        }
    }

    /// Re-run the entry rules for every window whose selection is in `gone`.
    pub(super) fn reselect_windows_showing(&mut self, gone: &[TabId]) {
        let affected: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, state)| state.selected_tab.is_some_and(|tab| gone.contains(&tab)))
            .map(|(id, _)| *id)
            .collect();
        for window in affected {
            self.set_selection(window, None);
            self.ensure_selected_tab(window);
        }
    }

    /// Every selection change goes through here. Leaving a tab offers it
    /// picture-in-picture; arriving at a tab in picture-in-picture takes it
    /// back.
    pub(super) fn set_selection(&mut self, window: WindowId, tab: Option<TabId>) {
        let Some(state) = self.windows.get_mut(&window) else {
            return;
        };
        let previous = std::mem::replace(&mut state.selected_tab, tab);
        let space = state.space;
        if previous != tab {
            self.hand_off_pip(previous, tab);
        }
        if tab.is_some() {
            self.remember_selection(space, tab);
        }
    }

    fn hand_off_pip(&mut self, left: Option<TabId>, arrived: Option<TabId>) {
        // A tab still selected in another window stays on screen.
        if let Some(left) = left
            && !self
                .windows
                .values()
                .any(|state| state.selected_tab == Some(left))
        {
            self.registry.enter_pip(left);
        }
        if let Some(arrived) = arrived
            && self.registry.is_in_pip(arrived)
        {
            self.registry.exit_pip(arrived);
        }
    }

    pub(super) fn remember_selection(&mut self, space: SpaceId, tab: Option<TabId>) {
        if let Some(record) = self.workspace.space_mut(space)
            && tab.is_some()
            && record.last_selected_tab != tab
        {
            record.last_selected_tab = tab;
            self.mark_space(space);
        }
    }
}
