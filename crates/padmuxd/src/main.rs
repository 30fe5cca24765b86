mod cli;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use crossbeam_channel::{select, unbounded};
use padmux_control::{KeySink, NullSink, Performer};
use padmux_gamepad::{DeviceBackend, Sdl2Backend};
use padmux_workspace::{Settings, Workspace, WorkspaceEvent};

use padmuxd::engine::{Engine, EngineConfig, EngineEvent};
use padmuxd::registry::{SelfFilter, VirtualCounts};
use padmuxd::virtual_pad::platform_backend;
use padmuxd::{logging, print_debug, print_error, print_info, print_warning, Error, Result};

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup(cli.verbose, cli.no_color).expect("Unable to set up logger");

    let result = match cli.command {
        Command::Run { workspace, rate } => run(workspace.as_deref(), rate),
        Command::Devices => devices(),
        Command::Check { workspace } => check(workspace.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(workspace: Option<&Path>, rate: u32) -> Result<()> {
    let workspace = Workspace::new(workspace)?;

    // Handle Ctrl+C to exit cleanly
    let (stop_tx, stop_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| Error::Startup(format!("failed to set Ctrl+C handler: {e}")))?;

    // The watcher speaks std::mpsc; bridge it to crossbeam for select!.
    let (_watcher, watcher_rx) = workspace.start_settings_watcher()?;
    let (settings_tx, settings_rx) = unbounded::<WorkspaceEvent>();
    std::thread::spawn(move || {
        while let Ok(event) = watcher_rx.recv() {
            if settings_tx.send(event).is_err() {
                break;
            }
        }
    });

    let config = EngineConfig {
        rate_hz: rate.max(1),
        ..EngineConfig::default()
    };
    let mut engine = Engine::start(config, Settings::default(), || {
        let devices = Sdl2Backend::new()?;
        let keys: Box<dyn KeySink> = match Performer::new() {
            Ok(performer) => Box::new(performer),
            Err(e) => {
                print_warning!("key injection unavailable, key actions are skipped: {e}");
                Box::new(NullSink)
            }
        };
        Ok((devices, platform_backend(), keys))
    })?;
    let events = engine.subscribe();
    print_info!(
        "padmuxd started. Watching {}",
        workspace.settings_path().display()
    );

    loop {
        select! {
            recv(stop_rx) -> _ => {
                break;
            }
            recv(settings_rx) -> msg => {
                match msg {
                    Ok(WorkspaceEvent::Changed(settings)) => {
                        print_info!(
                            "settings loaded: {} slots, {} profiles, {} assignments",
                            settings.slots.len(),
                            settings.profiles.len(),
                            settings.assignments.len()
                        );
                        engine.update_settings(settings);
                    }
                    Ok(WorkspaceEvent::Removed) => {
                        print_warning!("settings file removed, releasing every slot");
                        engine.update_settings(Settings::default());
                    }
                    Ok(WorkspaceEvent::Error(e)) => {
                        // Keep running on the last good settings.
                        print_error!("settings error: {e}");
                    }
                    Err(_) => {
                        print_error!("settings watcher stopped");
                        break;
                    }
                }
            }
            recv(events) -> msg => {
                match msg {
                    Ok(event) => log_event(&event),
                    Err(_) => break,
                }
            }
        }
    }

    print_info!("shutting down");
    engine.stop();
    Ok(())
}

/// Errors and warnings are logged by the worker itself.
fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::DevicesChanged => print_debug!("device list changed"),
        EngineEvent::DeviceMigrated { from, to } => {
            print_info!("update assignments of {from} to {to} to keep them after a restart");
        }
        EngineEvent::Error { message, .. } | EngineEvent::Warning { message, .. } => {
            print_debug!("engine reported: {message}");
        }
    }
}

fn devices() -> Result<()> {
    let mut backend = Sdl2Backend::new()?;
    let infos = backend.enumerate()?;
    if infos.is_empty() {
        print_info!("no devices found");
        return Ok(());
    }

    let counts = VirtualCounts::default();
    let mut filter = SelfFilter::new(&counts);
    for info in &infos {
        let status = match filter.check(info) {
            Some(reason) => format!("ignored, {reason}"),
            None => "ok".to_string(),
        };
        print_info!(
            "{}  {}  {}  [{status}]",
            info.instance_id,
            info.product,
            info.name
        );
    }
    Ok(())
}

fn check(workspace: Option<&Path>) -> Result<()> {
    let workspace = Workspace::new(workspace)?;
    let settings = workspace.load()?;
    print_info!("{} is valid", workspace.settings_path().display());
    for slot in &settings.slots {
        print_info!(
            "slot {}: {}{}, {} macros, {} devices",
            slot.index,
            slot.kind,
            if slot.is_on() { "" } else { " (off)" },
            slot.macros.len(),
            settings.assignments_for_slot(slot.index).count()
        );
    }
    for name in settings.profiles.keys() {
        print_debug!("profile: {name}");
    }
    Ok(())
}
