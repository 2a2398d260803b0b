/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `spaceshell` maintenance tool: inspect and repair a profile's entity store
//! without a rendering engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

use bpaf::Bpaf;
use log::{error, info, warn};

use spaceshell::engine::headless::HeadlessEngineFactory;
use spaceshell::persistence::{MemoryStore, PersistentStore, RedbStore};
use spaceshell::prefs::ShellPrefs;
use spaceshell::session::downloads::DownloadLedger;
use spaceshell::shell::{Browser, ClearDataRequest, DataCategory};

const STORE_FILE_NAME: &str = "store.redb";

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
struct CliOptions {
    /// Directory holding the entity store
    #[bpaf(long("data-dir"), argument("DIR"))]
    data_dir: Option<PathBuf>,
    /// Preferences file to read instead of the default one
    #[bpaf(long("prefs"), argument("FILE"))]
    prefs: Option<PathBuf>,
    /// Log filter, for example `debug` or `spaceshell=trace`
    #[bpaf(long("log"), argument("FILTER"))]
    log: Option<String>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Debug, Clone, Bpaf)]
enum Command {
    /// Print profiles, spaces and their tabs
    #[bpaf(command("list"))]
    List,
    /// Repair dangling references and orphaned spaces, then save
    #[bpaf(command("sanitize"))]
    Sanitize,
    /// Delete every today tab in every space
    #[bpaf(command("clear-tabs"))]
    ClearTabs,
}

fn main() -> ExitCode {
    let options = cli_options().run();
    init_logging(options.log.as_deref());

    let mut prefs = match &options.prefs {
        Some(path) => ShellPrefs::load(path),
        None => ShellPrefs::load_default_location(),
    }
    .unwrap_or_else(|e| {
        warn!("{e}; using default prefs");
        ShellPrefs::default()
    });
    if options.data_dir.is_some() {
        prefs.data_dir = options.data_dir.clone();
    }

    let store = open_store(&prefs);
    let mut browser = match Browser::open(
        prefs,
        store,
        Box::new(HeadlessEngineFactory),
        Box::new(DownloadLedger::new()),
    ) {
        Ok(browser) => browser,
        Err(e) => {
            error!("Could not load the store: {e}");
            return ExitCode::FAILURE;
        },
    };

    match options.command {
        Command::List => print_workspace(&browser),
        Command::Sanitize => {
            let repairs = browser.repairs_on_open() + browser.sanitize();
            println!("{repairs} repairs");
        },
        Command::ClearTabs => {
            let summary = browser.clear_data(&ClearDataRequest::new(
                SystemTime::now(),
                [DataCategory::Tabs],
            ));
            println!("{} tabs removed", summary.tabs_removed);
        },
    }

    if browser.has_unsaved_changes() {
        error!("Some changes could not be saved");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn open_store(prefs: &ShellPrefs) -> Box<dyn PersistentStore> {
    let Some(dir) = prefs.resolved_data_dir() else {
        warn!("No data directory available; changes will not be kept");
        return Box::new(MemoryStore::new());
    };
    let path = dir.join(STORE_FILE_NAME);
    match RedbStore::open(&path) {
        Ok(store) => {
            info!("Opened store at {}", path.display());
            Box::new(store)
        },
        Err(e) => {
            warn!("Could not open {}: {e}; changes will not be kept", path.display());
            Box::new(MemoryStore::new())
        },
    }
}

fn print_workspace(browser: &Browser) {
    let workspace = browser.workspace();
    for profile in workspace.profiles() {
        let incognito = if profile.is_incognito { " (incognito)" } else { "" };
        println!("profile {} {}{incognito}", profile.id, profile.name);
        for tab in profile.shared_tabs.iter().filter_map(|id| workspace.tab(*id)) {
            println!("  shared  {}  {}", tab.title, tab.address);
        }
        for space in workspace
            .spaces_ordered()
            .into_iter()
            .filter(|space| space.profile == profile.id)
        {
            println!("  space {} {}", space.id, space.name);
            for (label, ids) in [
                ("pinned", &space.pinned),
                ("today", &space.today),
                ("archived", &space.archived),
            ] {
                for tab in ids.iter().filter_map(|id| workspace.tab(*id)) {
                    println!("    {label:<8}  {}  {}", tab.title, tab.address);
                }
            }
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(version = spaceshell::VERSION, "logging initialized");
}

#[cfg(not(feature = "tracing"))]
fn init_logging(_filter: Option<&str>) {}
