/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-window binding between the selected tab and what the window paints.
//!
//! A window holds at most a `SurfaceHandle` for the session it owns. When
//! another window takes the session, the binder falls back to the snapshot
//! captured at transfer time, or to a blank surface until one arrives.

use std::sync::Arc;

use image::RgbaImage;
use log::trace;

use super::{Browser, ShellError};
use crate::model::{TabId, WindowId};
use crate::session::{OwnershipToken, SessionRegistry, SurfaceHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Blank,
    Live(SurfaceHandle),
    Snapshot(Arc<RgbaImage>),
}

pub struct WindowSurface {
    window: WindowId,
    tab: Option<TabId>,
    observed: Option<OwnershipToken>,
    presentation: Presentation,
}

impl WindowSurface {
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            tab: None,
            observed: None,
            presentation: Presentation::Blank,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn tab(&self) -> Option<TabId> {
        self.tab
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// Display `tab`, taking ownership of its session.
    pub fn show(&mut self, browser: &mut Browser, tab: TabId) -> Result<&Presentation, ShellError> {
        let handle = browser.acquire_surface(self.window, tab)?;
        self.tab = Some(tab);
        self.observed = Some(browser.registry().ownership_token());
        self.presentation = Presentation::Live(handle);
        Ok(&self.presentation)
    }

    /// Re-evaluate the presentation when ownership changed since the last
    /// look. Returns whether it changed.
    pub fn refresh(&mut self, registry: &SessionRegistry) -> bool {
        let token = registry.ownership_token();
        let snapshot_pending = matches!(self.presentation, Presentation::Blank)
            && self.tab.is_some_and(|tab| registry.snapshot(tab).is_some());
        if self.observed == Some(token) && !snapshot_pending {
            return false;
        }
        self.observed = Some(token);
        let next = match self.tab {
            None => Presentation::Blank,
            Some(tab) if registry.is_owner(tab, self.window) => match registry.handle(tab) {
                Some(handle) => Presentation::Live(handle),
                None => Presentation::Blank,
            },
            Some(tab) => registry
                .snapshot(tab)
                .map_or(Presentation::Blank, Presentation::Snapshot),
        };
        if next == self.presentation {
            return false;
        }
        trace!("Window {} presentation now {:?}", self.window, variant(&next));
        self.presentation = next;
        true
    }

    pub fn clear(&mut self) {
        self.tab = None;
        self.observed = None;
        self.presentation = Presentation::Blank;
    }
}

fn variant(presentation: &Presentation) -> &'static str {
    match presentation {
        Presentation::Blank => "blank",
        Presentation::Live(_) => "live",
        Presentation::Snapshot(_) => "snapshot",
    }
}
