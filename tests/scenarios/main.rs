/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::{Duration, SystemTime};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use url::Url;

use spaceshell::VERSION;
use spaceshell::engine::{DownloadEvent, DownloadTicket, EngineEventKind};
use spaceshell::persistence::RedbStore;
use spaceshell::prefs::ShellPrefs;
use spaceshell::runtime::{ControlPanel, IntentSource};
use spaceshell::session::downloads::{DownloadLedger, DownloadManager, DownloadState};
use spaceshell::session::media::MediaCommand;
use spaceshell::shell::{
    Browser, ClearDataRequest, DataCategory, Presentation, ShellError, ShellIntent, TabDestination,
    WindowSurface,
};
use spaceshell::test_utils::{EngineCommand, RecordingEngineFactory, TestShell};

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn selected(shell: &TestShell, window: spaceshell::model::WindowId) -> Option<spaceshell::model::TabId> {
    shell.browser.window(window).unwrap().selected_tab
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn two_windows_share_one_session() {
    let mut shell = TestShell::new();
    let w1 = shell.window;
    let w2 = shell.browser.open_window();
    let tab = shell
        .browser
        .create_tab(w1, url("https://shared.example"), TabDestination::Today)
        .unwrap();
    let mut first = WindowSurface::new(w1);
    let mut second = WindowSurface::new(w2);

    first.show(&mut shell.browser, tab).unwrap();
    second.show(&mut shell.browser, tab).unwrap();
    assert_eq!(shell.factory.created_count(), 1);
    assert!(shell.browser.registry().is_owner(tab, w2));
    assert!(!shell.browser.registry().is_owner(tab, w1));

    shell
        .factory
        .complete_snapshots(RgbaImage::from_pixel(16, 16, Rgba([9, 9, 9, 255])));
    shell.browser.pump();
    first.refresh(shell.browser.registry());
    second.refresh(shell.browser.registry());

    assert!(matches!(first.presentation(), Presentation::Snapshot(_)));
    assert!(matches!(second.presentation(), Presentation::Live(handle) if handle.tab() == tab));

    // Taking it back swaps the roles without a new engine.
    first.show(&mut shell.browser, tab).unwrap();
    second.refresh(shell.browser.registry());
    assert!(matches!(first.presentation(), Presentation::Live(_)));
    assert!(matches!(second.presentation(), Presentation::Snapshot(_)));
    assert_eq!(shell.factory.created_count(), 1);
}

#[test]
fn closing_selected_today_tab_walks_the_fallback_order() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let shared = shell
        .browser
        .create_tab(w, url("https://s.example"), TabDestination::Shared)
        .unwrap();
    let a = shell
        .browser
        .create_tab(w, url("https://a.example"), TabDestination::Today)
        .unwrap();
    let b = shell
        .browser
        .create_tab(w, url("https://b.example"), TabDestination::Today)
        .unwrap();
    let c = shell
        .browser
        .create_tab(w, url("https://c.example"), TabDestination::Today)
        .unwrap();
    shell.browser.select_tab(w, b).unwrap();

    shell.browser.close_tab(b).unwrap();
    assert_eq!(selected(&shell, w), Some(c));
    shell.browser.close_tab(c).unwrap();
    assert_eq!(selected(&shell, w), Some(a));
    shell.browser.close_tab(a).unwrap();
    assert_eq!(selected(&shell, w), Some(shared));
    shell.browser.close_tab(shared).unwrap();
    assert_eq!(selected(&shell, w), None);
    assert!(!shell.browser.workspace().contains_tab(shared));
}

#[test]
fn reset_to_pinned_restores_and_reloads_displayed_tab() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let tab = shell
        .browser
        .create_tab(w, url("https://docs.example"), TabDestination::Pinned)
        .unwrap();
    let mut surface = WindowSurface::new(w);
    surface.show(&mut shell.browser, tab).unwrap();
    shell.navigate_engine(tab, "https://docs.example/page/7", "Page 7");
    assert!(shell.browser.workspace().tab(tab).unwrap().has_drifted_from_pin());

    assert_eq!(shell.browser.reset_pinned_tab(tab), Ok(true));

    assert!(!shell.browser.workspace().tab(tab).unwrap().has_drifted_from_pin());
    assert_eq!(
        shell.factory.commands(tab).last(),
        Some(&EngineCommand::Load(url("https://docs.example")))
    );
    assert_eq!(shell.factory.created_count(), 1);
}

#[test]
fn detached_tab_gets_a_fresh_session() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let tab = shell
        .browser
        .create_tab(w, url("https://a.example"), TabDestination::Pinned)
        .unwrap();
    let first = shell.browser.acquire_surface(w, tab).unwrap();

    shell.browser.close_tab(tab).unwrap();
    assert!(!shell.browser.registry().has_session(tab));

    let second = shell.browser.acquire_surface(w, tab).unwrap();
    assert_ne!(first.generation(), second.generation());
    assert_eq!(shell.factory.created_count(), 2);
    assert_eq!(
        shell.factory.commands(tab),
        vec![EngineCommand::Load(url("about:blank"))]
    );
}

#[test]
fn clear_tabs_keeps_pinned_and_shared_everywhere() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let pinned = shell
        .browser
        .create_tab(w, url("https://p.example"), TabDestination::Pinned)
        .unwrap();
    let shared = shell
        .browser
        .create_tab(w, url("https://s.example"), TabDestination::Shared)
        .unwrap();
    let here = shell
        .browser
        .create_tab(w, url("https://a.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(w, here).unwrap();
    shell.browser.create_space(Some(w), None).unwrap();
    let there = shell
        .browser
        .create_tab(w, url("https://b.example"), TabDestination::Today)
        .unwrap();

    shell.browser.apply_intent(ShellIntent::ClearData(ClearDataRequest::new(
        SystemTime::now(),
        [DataCategory::Tabs],
    )));

    let workspace = shell.browser.workspace();
    assert!(!workspace.contains_tab(here));
    assert!(!workspace.contains_tab(there));
    assert!(workspace.contains_tab(pinned));
    assert!(workspace.contains_tab(shared));
    assert!(!shell.browser.registry().has_session(here));
    assert_eq!(selected(&shell, w), Some(shared));
}

#[test]
fn structural_deletions_refuse_the_last_of_each() {
    let mut shell = TestShell::new();
    let space = shell.browser.window(shell.window).unwrap().space;
    let profile = shell.browser.workspace().profiles()[0].id;

    assert_eq!(shell.browser.delete_space(space), Err(ShellError::LastSpace));
    assert_eq!(shell.browser.delete_profile(profile), Err(ShellError::LastProfile));

    let spare = shell.browser.create_profile("Spare", true);
    shell.browser.delete_profile(profile).unwrap();
    assert_eq!(
        shell.browser.workspace().space(space).unwrap().profile,
        spare
    );
    shell.browser.pump();
    assert_eq!(shell.browser.workspace().profiles().len(), 1);
    assert_eq!(shell.factory.removed_profiles(), vec![profile]);
}

#[test]
fn moving_a_space_to_another_profile_recreates_sessions() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let space = shell.browser.window(w).unwrap().space;
    let tab = shell
        .browser
        .create_tab(w, url("https://a.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(w, tab).unwrap();
    let incognito = shell.browser.create_profile("Private", true);

    shell.browser.assign_space_profile(space, incognito).unwrap();
    shell.browser.acquire_surface(w, tab).unwrap();

    assert_eq!(shell.factory.created_count(), 2);
    assert_eq!(shell.factory.profile_of(tab), Some(incognito));
}

#[test]
fn downloads_outlive_their_tab() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let tab = shell
        .browser
        .create_tab(w, url("https://files.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(w, tab).unwrap();
    let sink = shell.factory.sink(tab).unwrap();
    sink.emit(EngineEventKind::Download(DownloadEvent::Started {
        ticket: DownloadTicket(7),
        suggested_filename: None,
    }));
    shell.browser.close_tab(tab).unwrap();

    sink.emit(EngineEventKind::Download(DownloadEvent::FilenameResolved {
        ticket: DownloadTicket(7),
        filename: "report.pdf".to_string(),
    }));
    sink.emit(EngineEventKind::Download(DownloadEvent::Finished {
        ticket: DownloadTicket(7),
        destination: "/tmp/report.pdf".into(),
    }));
    shell.browser.pump();

    let records = shell.browser.registry().downloads().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "report.pdf");
    assert_eq!(records[0].source_tab, tab);
    assert!(matches!(records[0].state, DownloadState::Finished(_)));
}

#[test]
fn navigation_updates_model_and_history() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let tab = shell
        .browser
        .create_tab(w, url("https://a.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(w, tab).unwrap();
    shell.navigate_engine(tab, "https://a.example/next", "Next");

    let record = shell.browser.workspace().tab(tab).unwrap();
    assert_eq!(record.address, url("https://a.example/next"));
    assert_eq!(record.title, "Next");
    assert!(record.can_go_back);
    assert!(!record.is_loading);
    let history = shell.browser.workspace().history();
    assert_eq!(history.last().map(|entry| entry.url.clone()), Some(url("https://a.example/next")));
}

#[test]
fn media_keys_reach_the_playing_tab() {
    let mut shell = TestShell::new();
    let w = shell.window;
    let tab = shell
        .browser
        .create_tab(w, url("https://music.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(w, tab).unwrap();

    shell.browser.apply_intent(ShellIntent::ProbeAudio);
    shell.factory.complete_scripts(|_| Ok(serde_json::json!(true)));
    shell.browser.pump();
    let playing = shell.browser.now_playing().unwrap();
    assert_eq!(playing.tab, tab);
    assert_eq!(playing.host.as_deref(), Some("music.example"));
    assert!(shell.browser.workspace().tab(tab).unwrap().is_playing_audio);

    shell
        .browser
        .apply_intent(ShellIntent::Media(MediaCommand::TogglePlayPause));
    assert!(matches!(
        shell.factory.commands(tab).last(),
        Some(EngineCommand::Evaluate(_))
    ));
}

#[test]
fn workspace_survives_restart_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.redb");
    let prefs = ShellPrefs::default();

    let (space, pinned, today) = {
        let mut browser = Browser::open(
            prefs.clone(),
            Box::new(RedbStore::open(&path).unwrap()),
            Box::new(RecordingEngineFactory::new()),
            Box::new(DownloadLedger::new()),
        )
        .unwrap();
        let w = browser.open_window();
        let pinned = browser
            .create_tab(w, url("https://p.example"), TabDestination::Pinned)
            .unwrap();
        let today = browser
            .create_tab(w, url("https://t.example"), TabDestination::Today)
            .unwrap();
        browser.rename_space(browser.window(w).unwrap().space, "Home").unwrap();
        (browser.window(w).unwrap().space, pinned, today)
    };

    let browser = Browser::open(
        prefs,
        Box::new(RedbStore::open(&path).unwrap()),
        Box::new(RecordingEngineFactory::new()),
        Box::new(DownloadLedger::new()),
    )
    .unwrap();
    let workspace = browser.workspace();
    let record = workspace.space(space).unwrap();
    assert_eq!(record.name, "Home");
    assert_eq!(record.pinned, vec![pinned]);
    assert_eq!(record.today, vec![today]);
    assert_eq!(record.last_selected_tab, Some(today));
    assert_eq!(
        workspace.tab(pinned).unwrap().pinned_original_address,
        Some(url("https://p.example"))
    );
    assert_eq!(browser.repairs_on_open(), 0);
}

#[tokio::test]
async fn control_panel_feeds_audio_probes_to_the_shell() {
    let mut shell = TestShell::new();
    let tab = shell
        .browser
        .create_tab(shell.window, url("https://a.example"), TabDestination::Today)
        .unwrap();
    shell.browser.acquire_surface(shell.window, tab).unwrap();

    let mut panel = ControlPanel::new();
    panel.spawn_audio_probe(Duration::from_millis(5));
    let mut probed = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let intents = panel.drain_pending();
        if intents.is_empty() {
            continue;
        }
        assert!(intents.iter().all(|queued| queued.source == IntentSource::AudioProbe));
        for queued in intents {
            shell.browser.apply_intent(queued.intent);
        }
        probed = true;
        break;
    }
    panel.shutdown().await;

    assert!(probed);
    assert!(
        shell
            .factory
            .scripts_evaluated(tab)
            .iter()
            .any(|script| script == spaceshell::engine::scripts::AUDIO_PROBE)
    );
}
