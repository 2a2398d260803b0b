/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Audio probing, the now-playing tab, media remote commands and
//! picture-in-picture.

use std::collections::HashSet;

use log::{debug, warn};

use super::{SessionNotification, SessionRegistry};
use crate::engine::{EngineError, SessionGeneration, scripts};
use crate::model::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    Play,
    Pause,
    TogglePlayPause,
}

impl MediaCommand {
    fn script(self) -> &'static str {
        match self {
            MediaCommand::Play => scripts::MEDIA_PLAY,
            MediaCommand::Pause => scripts::MEDIA_PAUSE,
            MediaCommand::TogglePlayPause => scripts::MEDIA_TOGGLE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ScriptPurpose {
    AudioProbe,
    Media(MediaCommand),
    EnterPip,
    ExitPip,
}

#[derive(Debug, Default)]
pub(crate) struct PlaybackState {
    now_playing: Option<TabId>,
    pip: HashSet<TabId>,
    pip_requested: HashSet<TabId>,
}

impl SessionRegistry {
    /// Issue one audio probe per live session that has none outstanding.
    /// Returns how many probes were sent.
    pub fn probe_audio(&mut self) -> usize {
        let idle: Vec<TabId> = self
            .sessions
            .iter()
            .filter(|(_, session)| !session.audio_probe_in_flight)
            .map(|(tab, _)| *tab)
            .collect();
        let mut sent = 0;
        for tab in idle {
            if let Some(session) = self.sessions.get_mut(&tab) {
                session.audio_probe_in_flight = true;
            }
            if self.evaluate_for(tab, scripts::AUDIO_PROBE, ScriptPurpose::AudioProbe) {
                sent += 1;
            }
        }
        sent
    }

    pub fn now_playing(&self) -> Option<TabId> {
        self.playback.now_playing
    }

    pub fn is_playing_audio(&self, tab: TabId) -> bool {
        self.sessions
            .get(&tab)
            .is_some_and(|session| session.playing_audio)
    }

    /// Send a remote media command to the now-playing tab. Returns false when
    /// nothing is playing.
    pub fn media_command(&mut self, command: MediaCommand) -> bool {
        let Some(tab) = self.playback.now_playing else {
            debug!("Media command {command:?} ignored: nothing is playing");
            return false;
        };
        self.evaluate_for(tab, command.script(), ScriptPurpose::Media(command))
    }

    /// Ask the tab to put its playing video into picture-in-picture. Does
    /// nothing if the tab is already in, or on its way into, PiP.
    pub fn enter_pip(&mut self, tab: TabId) -> bool {
        if self.playback.pip.contains(&tab) || self.playback.pip_requested.contains(&tab) {
            return false;
        }
        if !self.evaluate_for(tab, scripts::PIP_ENTER, ScriptPurpose::EnterPip) {
            return false;
        }
        self.playback.pip_requested.insert(tab);
        true
    }

    pub fn exit_pip(&mut self, tab: TabId) -> bool {
        if !self.playback.pip.contains(&tab) {
            return false;
        }
        self.evaluate_for(tab, scripts::PIP_EXIT, ScriptPurpose::ExitPip)
    }

    pub fn is_in_pip(&self, tab: TabId) -> bool {
        self.playback.pip.contains(&tab)
    }

    pub(super) fn apply_script_result(
        &mut self,
        tab: TabId,
        generation: SessionGeneration,
        purpose: ScriptPurpose,
        result: Result<serde_json::Value, EngineError>,
    ) {
        if matches!(purpose, ScriptPurpose::EnterPip) {
            self.playback.pip_requested.remove(&tab);
        }
        let Some(session) = self
            .sessions
            .get_mut(&tab)
            .filter(|session| session.generation == generation)
        else {
            debug!("Dropping {purpose:?} result from detached session {generation} of tab {tab}");
            return;
        };

        match purpose {
            ScriptPurpose::AudioProbe => {
                session.audio_probe_in_flight = false;
                let playing = match result {
                    Ok(serde_json::Value::Bool(playing)) => playing,
                    Ok(other) => {
                        debug!("Audio probe in tab {tab} returned {other}; keeping previous state");
                        return;
                    },
                    Err(e) => {
                        warn!("Audio probe in tab {tab} failed: {e}");
                        return;
                    },
                };
                if session.playing_audio == playing {
                    return;
                }
                session.playing_audio = playing;
                self.notifications
                    .push(SessionNotification::AudioChanged { tab, playing });
                self.update_now_playing(tab, playing);
            },
            ScriptPurpose::Media(command) => {
                if let Err(e) = result {
                    warn!("Media command {command:?} in tab {tab} failed: {e}");
                }
            },
            ScriptPurpose::EnterPip => match result {
                Ok(serde_json::Value::Bool(true)) => {
                    if self.playback.pip.insert(tab) {
                        self.notifications
                            .push(SessionNotification::PictureInPictureChanged { tab, active: true });
                    }
                },
                Ok(_) => debug!("Tab {tab} had no video eligible for picture-in-picture"),
                Err(e) => warn!("Entering picture-in-picture in tab {tab} failed: {e}"),
            },
            ScriptPurpose::ExitPip => match result {
                Ok(_) => {
                    if self.playback.pip.remove(&tab) {
                        self.notifications.push(
                            SessionNotification::PictureInPictureChanged { tab, active: false },
                        );
                    }
                },
                Err(e) => warn!("Leaving picture-in-picture in tab {tab} failed: {e}"),
            },
        }
    }

    fn update_now_playing(&mut self, tab: TabId, playing: bool) {
        let next = if playing {
            Some(tab)
        } else if self.playback.now_playing == Some(tab) {
            None
        } else {
            return;
        };
        if self.playback.now_playing != next {
            self.playback.now_playing = next;
            self.notifications
                .push(SessionNotification::NowPlayingChanged { tab: next });
        }
    }

    /// Clear playback state of a session that is going away.
    pub(super) fn forget_playback(&mut self, tab: TabId) {
        self.playback.pip_requested.remove(&tab);
        if self.playback.pip.remove(&tab) {
            self.notifications
                .push(SessionNotification::PictureInPictureChanged { tab, active: false });
        }
        if self.playback.now_playing == Some(tab) {
            self.playback.now_playing = None;
            self.notifications
                .push(SessionNotification::NowPlayingChanged { tab: None });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineEventKind;
    use crate::model::{ProfileId, Tab, WindowId};
    use crate::session::downloads::DownloadLedger;
    use crate::test_utils::RecordingEngineFactory;
    use serde_json::json;
    use url::Url;

    fn setup() -> (SessionRegistry, RecordingEngineFactory, Tab) {
        let factory = RecordingEngineFactory::new();
        let mut registry = SessionRegistry::new(
            Box::new(factory.clone()),
            Box::new(DownloadLedger::new()),
            None,
        );
        let tab = Tab::new(Url::parse("https://media.example").unwrap(), "Media");
        registry.acquire(&tab, WindowId::new(), ProfileId::new()).unwrap();
        registry.drain_pending();
        (registry, factory, tab)
    }

    #[test]
    fn probe_result_updates_flag_and_now_playing() {
        let (mut registry, factory, tab) = setup();
        assert_eq!(registry.probe_audio(), 1);
        factory.complete_scripts(|_| Ok(json!(true)));

        let notes = registry.drain_pending();
        assert!(registry.is_playing_audio(tab.id));
        assert_eq!(registry.now_playing(), Some(tab.id));
        assert!(notes.contains(&SessionNotification::AudioChanged {
            tab: tab.id,
            playing: true
        }));
        assert!(notes.contains(&SessionNotification::NowPlayingChanged { tab: Some(tab.id) }));
    }

    #[test]
    fn failed_probe_keeps_previous_state() {
        let (mut registry, factory, tab) = setup();
        registry.probe_audio();
        factory.complete_scripts(|_| Ok(json!(true)));
        registry.drain_pending();

        registry.probe_audio();
        factory.complete_scripts(|_| Err(EngineError::ScriptFailed("boom".to_string())));
        assert!(registry.drain_pending().is_empty());
        assert!(registry.is_playing_audio(tab.id));

        registry.probe_audio();
        factory.complete_scripts(|_| Ok(json!("not a bool")));
        registry.drain_pending();
        assert!(registry.is_playing_audio(tab.id));
    }

    #[test]
    fn probes_do_not_overlap_per_session() {
        let (mut registry, factory, _tab) = setup();
        assert_eq!(registry.probe_audio(), 1);
        assert_eq!(registry.probe_audio(), 0);
        factory.complete_scripts(|_| Ok(json!(false)));
        registry.drain_pending();
        assert_eq!(registry.probe_audio(), 1);
    }

    #[test]
    fn navigation_frees_an_unanswered_probe() {
        let (mut registry, factory, tab) = setup();
        assert_eq!(registry.probe_audio(), 1);
        assert_eq!(registry.probe_audio(), 0);

        factory.emit(tab.id, EngineEventKind::NavigationStarted);
        registry.drain_pending();
        assert_eq!(registry.probe_audio(), 1);
    }

    #[test]
    fn media_command_targets_now_playing() {
        let (mut registry, factory, tab) = setup();
        assert!(!registry.media_command(MediaCommand::Pause));

        registry.probe_audio();
        factory.complete_scripts(|_| Ok(json!(true)));
        registry.drain_pending();

        assert!(registry.media_command(MediaCommand::Pause));
        assert_eq!(factory.scripts_evaluated(tab.id).last().map(String::as_str), Some(scripts::MEDIA_PAUSE));
    }

    #[test]
    fn pip_enter_is_idempotent_and_exit_clears() {
        let (mut registry, factory, tab) = setup();
        assert!(registry.enter_pip(tab.id));
        assert!(!registry.enter_pip(tab.id));
        factory.complete_scripts(|_| Ok(json!(true)));
        registry.drain_pending();
        assert!(registry.is_in_pip(tab.id));
        assert!(!registry.enter_pip(tab.id));

        assert!(registry.exit_pip(tab.id));
        factory.complete_scripts(|_| Ok(json!(true)));
        let notes = registry.drain_pending();
        assert!(!registry.is_in_pip(tab.id));
        assert!(notes.contains(&SessionNotification::PictureInPictureChanged {
            tab: tab.id,
            active: false
        }));
        assert!(!registry.exit_pip(tab.id));
    }

    #[test]
    fn detach_clears_now_playing() {
        let (mut registry, factory, tab) = setup();
        registry.probe_audio();
        factory.complete_scripts(|_| Ok(json!(true)));
        registry.drain_pending();

        registry.detach(tab.id);
        let notes = registry.drain_pending();
        assert_eq!(registry.now_playing(), None);
        assert!(notes.contains(&SessionNotification::NowPlayingChanged { tab: None }));
    }
}
