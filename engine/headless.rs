/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Engine with no renderer, used by the command line tool. Loads commit
//! immediately and nothing ever plays media.

use std::time::SystemTime;

use log::debug;
use url::Url;

use super::{
    EngineConfig, EngineError, EngineEventKind, EngineEventSink, EngineFactory, RenderEngine,
    ScriptCallback, SnapshotCallback,
};
use crate::model::ProfileId;

#[derive(Debug, Default)]
pub struct HeadlessEngineFactory;

impl EngineFactory for HeadlessEngineFactory {
    fn create_engine(&self, config: EngineConfig) -> Result<Box<dyn RenderEngine>, EngineError> {
        debug!(
            "Creating headless engine for tab {} in profile {}",
            config.tab, config.profile
        );
        Ok(Box::new(HeadlessEngine {
            events: config.events,
        }))
    }

    fn remove_profile_data(&self, profile: ProfileId) -> Result<(), EngineError> {
        debug!("Headless engine holds no data for profile {profile}");
        Ok(())
    }

    fn clear_site_data(&self, profile: ProfileId, _since: SystemTime) -> Result<(), EngineError> {
        debug!("Headless engine holds no site data for profile {profile}");
        Ok(())
    }
}

pub struct HeadlessEngine {
    events: EngineEventSink,
}

impl RenderEngine for HeadlessEngine {
    fn load(&self, url: &Url) {
        self.events.emit(EngineEventKind::NavigationStarted);
        self.events.emit(EngineEventKind::AddressChanged(url.clone()));
        self.events.emit(EngineEventKind::NavigationFinished);
    }

    fn reload(&self) {
        self.events.emit(EngineEventKind::NavigationStarted);
        self.events.emit(EngineEventKind::NavigationFinished);
    }

    fn stop(&self) {}

    fn go_back(&self) {}

    fn go_forward(&self) {}

    fn take_snapshot(&self, on_done: SnapshotCallback) {
        on_done(Err(EngineError::Unsupported("snapshot")));
    }

    fn evaluate(&self, _script: &str, on_done: ScriptCallback) {
        on_done(Ok(serde_json::Value::Bool(false)));
    }
}
