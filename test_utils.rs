/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Test doubles shared by unit tests and the `scenarios` integration binary.
//!
//! `RecordingEngineFactory` hands out engines that record every command and
//! hold snapshot and script callbacks until the test resolves them. Engines
//! never emit events on their own; tests drive them through `emit`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use image::RgbaImage;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::engine::{
    EngineConfig, EngineError, EngineEventKind, EngineEventSink, EngineFactory, RenderEngine,
    ScriptCallback, SnapshotCallback,
};
use crate::model::{ProfileId, TabId, WindowId};
use crate::persistence::MemoryStore;
use crate::prefs::ShellPrefs;
use crate::session::downloads::DownloadLedger;
use crate::shell::Browser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Load(Url),
    Reload,
    Stop,
    GoBack,
    GoForward,
    Snapshot,
    Evaluate(String),
}

struct EngineRecord {
    tab: TabId,
    profile: ProfileId,
    sink: EngineEventSink,
    commands: Vec<EngineCommand>,
}

#[derive(Default)]
struct FactoryState {
    /// Every engine ever created, oldest first.
    engines: Vec<EngineRecord>,
    pending_snapshots: Vec<SnapshotCallback>,
    pending_scripts: Vec<(String, ScriptCallback)>,
    removed_profiles: Vec<ProfileId>,
    cleared_site_data: Vec<(ProfileId, SystemTime)>,
    fail_next_creation: bool,
}

impl FactoryState {
    fn latest_for(&self, tab: TabId) -> Option<&EngineRecord> {
        self.engines.iter().rev().find(|engine| engine.tab == tab)
    }
}

#[derive(Clone, Default)]
pub struct RecordingEngineFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl RecordingEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().engines.len()
    }

    /// Commands received by the tab's most recent engine.
    pub fn commands(&self, tab: TabId) -> Vec<EngineCommand> {
        self.state
            .lock()
            .latest_for(tab)
            .map(|engine| engine.commands.clone())
            .unwrap_or_default()
    }

    /// Profile the tab's most recent engine was created in.
    pub fn profile_of(&self, tab: TabId) -> Option<ProfileId> {
        self.state.lock().latest_for(tab).map(|engine| engine.profile)
    }

    pub fn pending_snapshot_count(&self) -> usize {
        self.state.lock().pending_snapshots.len()
    }

    /// Resolve every outstanding snapshot request with `image`.
    pub fn complete_snapshots(&self, image: RgbaImage) {
        let pending = std::mem::take(&mut self.state.lock().pending_snapshots);
        for callback in pending {
            callback(Ok(image.clone()));
        }
    }

    /// Resolve every outstanding script evaluation through `answer`.
    pub fn complete_scripts(&self, answer: impl Fn(&str) -> Result<Value, EngineError>) {
        let pending = std::mem::take(&mut self.state.lock().pending_scripts);
        for (script, callback) in pending {
            callback(answer(&script));
        }
    }

    /// Scripts evaluated by the tab's most recent engine, in order.
    pub fn scripts_evaluated(&self, tab: TabId) -> Vec<String> {
        self.commands(tab)
            .into_iter()
            .filter_map(|command| match command {
                EngineCommand::Evaluate(script) => Some(script),
                _ => None,
            })
            .collect()
    }

    /// Emit an event from the tab's most recent engine.
    pub fn emit(&self, tab: TabId, kind: EngineEventKind) {
        if let Some(sink) = self.sink(tab) {
            sink.emit(kind);
        }
    }

    pub fn sink(&self, tab: TabId) -> Option<EngineEventSink> {
        self.state.lock().latest_for(tab).map(|engine| engine.sink.clone())
    }

    pub fn removed_profiles(&self) -> Vec<ProfileId> {
        self.state.lock().removed_profiles.clone()
    }

    pub fn cleared_site_data(&self) -> Vec<(ProfileId, SystemTime)> {
        self.state.lock().cleared_site_data.clone()
    }

    pub fn fail_next_creation(&self) {
        self.state.lock().fail_next_creation = true;
    }
}

impl EngineFactory for RecordingEngineFactory {
    fn create_engine(&self, config: EngineConfig) -> Result<Box<dyn RenderEngine>, EngineError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_creation) {
            return Err(EngineError::CreationFailed("injected".to_string()));
        }
        let index = state.engines.len();
        state.engines.push(EngineRecord {
            tab: config.tab,
            profile: config.profile,
            sink: config.events,
            commands: Vec::new(),
        });
        Ok(Box::new(RecordingEngine {
            index,
            state: self.state.clone(),
        }))
    }

    fn remove_profile_data(&self, profile: ProfileId) -> Result<(), EngineError> {
        self.state.lock().removed_profiles.push(profile);
        Ok(())
    }

    fn clear_site_data(&self, profile: ProfileId, since: SystemTime) -> Result<(), EngineError> {
        self.state.lock().cleared_site_data.push((profile, since));
        Ok(())
    }
}

struct RecordingEngine {
    index: usize,
    state: Arc<Mutex<FactoryState>>,
}

impl RecordingEngine {
    fn record(&self, command: EngineCommand) {
        if let Some(engine) = self.state.lock().engines.get_mut(self.index) {
            engine.commands.push(command);
        }
    }
}

impl RenderEngine for RecordingEngine {
    fn load(&self, url: &Url) {
        self.record(EngineCommand::Load(url.clone()));
    }

    fn reload(&self) {
        self.record(EngineCommand::Reload);
    }

    fn stop(&self) {
        self.record(EngineCommand::Stop);
    }

    fn go_back(&self) {
        self.record(EngineCommand::GoBack);
    }

    fn go_forward(&self) {
        self.record(EngineCommand::GoForward);
    }

    fn take_snapshot(&self, on_done: SnapshotCallback) {
        self.record(EngineCommand::Snapshot);
        self.state.lock().pending_snapshots.push(on_done);
    }

    fn evaluate(&self, script: &str, on_done: ScriptCallback) {
        self.record(EngineCommand::Evaluate(script.to_string()));
        self.state
            .lock()
            .pending_scripts
            .push((script.to_string(), on_done));
    }
}

/// A `Browser` over an in-memory store and recording engines, with one
/// window open.
pub struct TestShell {
    pub browser: Browser,
    pub factory: RecordingEngineFactory,
    pub store: MemoryStore,
    pub window: WindowId,
}

impl TestShell {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), ShellPrefs::default())
    }

    /// Open over `store`, which may already hold records.
    pub fn with_store(store: MemoryStore, prefs: ShellPrefs) -> Self {
        let factory = RecordingEngineFactory::new();
        let mut browser = match Browser::open(
            prefs,
            Box::new(store.clone()),
            Box::new(factory.clone()),
            Box::new(DownloadLedger::new()),
        ) {
            Ok(browser) => browser,
            Err(e) => panic!("opening a browser over a memory store failed: {e}"),
        };
        let window = browser.open_window();
        Self {
            browser,
            factory,
            store,
            window,
        }
    }

    /// Finish the current navigation of `tab` so address syncs may run.
    pub fn finish_loading(&mut self, tab: TabId) {
        self.factory.emit(tab, EngineEventKind::NavigationFinished);
        self.browser.pump();
    }

    /// Report a committed navigation in `tab`.
    pub fn navigate_engine(&mut self, tab: TabId, address: &str, title: &str) {
        let Ok(address) = Url::parse(address) else {
            panic!("bad test address {address}");
        };
        self.factory.emit(tab, EngineEventKind::NavigationStarted);
        self.factory.emit(tab, EngineEventKind::AddressChanged(address));
        self.factory
            .emit(tab, EngineEventKind::TitleChanged(title.to_string()));
        self.factory.emit(
            tab,
            EngineEventKind::HistoryChanged {
                can_go_back: true,
                can_go_forward: false,
            },
        );
        self.factory.emit(tab, EngineEventKind::NavigationFinished);
        self.browser.pump();
    }
}

impl Default for TestShell {
    fn default() -> Self {
        Self::new()
    }
}
