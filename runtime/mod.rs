/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Background producers that feed the shell's single-threaded loop.

pub mod control_panel;

pub use control_panel::{ControlPanel, IntentSource, QueuedIntent};
