/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session ownership and tab/space lifecycle core for a multi-window tabbed
//! browser.
//!
//! - [`model`]: tabs, spaces, profiles and history entries.
//! - [`engine`]: the contract a rendering engine implements.
//! - [`session`]: live engine sessions, one per tab, owned by one window.
//! - [`shell`]: the mutation layer that keeps model, sessions and store in step.
//! - [`persistence`]: the entity store.
//! - [`runtime`]: background producers feeding the shell's loop.

pub mod engine;
pub mod model;
pub mod persistence;
pub mod prefs;
pub mod runtime;
pub mod session;
pub mod shell;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
