/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab/space mutation layer.
//!
//! `Browser` owns the entity model, the session registry and the store, and
//! is the only place that changes any of them. Every public mutation leaves
//! the model consistent and persists what it touched before returning.

mod browser;
mod clear_data;
mod selection;
mod space_ops;
mod tab_ops;
pub mod window_surface;

use std::fmt;

use crate::model::{ProfileId, SpaceId, TabId, WindowId};
use crate::persistence::StoreError;
use crate::session::SessionError;
use crate::session::media::MediaCommand;

pub use browser::{Browser, NowPlaying, WindowState};
pub use clear_data::{ClearDataRequest, ClearDataSummary, DataCategory};
pub use window_surface::{Presentation, WindowSurface};

/// Work queued by background producers and applied on the shell's thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellIntent {
    ProbeAudio,
    Media(MediaCommand),
    ClearData(ClearDataRequest),
}

/// Where a new tab goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabDestination {
    Pinned,
    Shared,
    Today,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShellError {
    LastSpace,
    LastProfile,
    UnknownTab(TabId),
    UnknownSpace(SpaceId),
    UnknownProfile(ProfileId),
    UnknownWindow(WindowId),
    NotPinned(TabId),
    NotFolder(TabId),
    Store(StoreError),
    Session(SessionError),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::LastSpace => write!(f, "the last space cannot be deleted"),
            ShellError::LastProfile => write!(f, "the last profile cannot be deleted"),
            ShellError::UnknownTab(id) => write!(f, "unknown tab {id}"),
            ShellError::UnknownSpace(id) => write!(f, "unknown space {id}"),
            ShellError::UnknownProfile(id) => write!(f, "unknown profile {id}"),
            ShellError::UnknownWindow(id) => write!(f, "unknown window {id}"),
            ShellError::NotPinned(id) => write!(f, "tab {id} is not pinned"),
            ShellError::NotFolder(id) => write!(f, "tab {id} is not a folder"),
            ShellError::Store(e) => write!(f, "{e}"),
            ShellError::Session(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<SessionError> for ShellError {
    fn from(e: SessionError) -> Self {
        ShellError::Session(e)
    }
}

impl From<StoreError> for ShellError {
    fn from(e: StoreError) -> Self {
        ShellError::Store(e)
    }
}
