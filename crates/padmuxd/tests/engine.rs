mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{config, settings, FakeDevices, FakeVirtuals, PAD_PRODUCT};
use padmux_control::NullSink;
use padmux_gamepad::Button;
use padmux_workspace::Settings;
use padmuxd::engine::{Engine, EngineCommand, EngineEvent};
use padmuxd::Error;

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn worker_drives_slots_until_stopped() {
    let devices = FakeDevices::default();
    let virtuals = FakeVirtuals::default();
    devices.plug("pad-a", PAD_PRODUCT);
    devices.set_button("pad-a", 0, true);

    let (d, v) = (devices.clone(), virtuals.clone());
    let mut engine = Engine::start(config(100), settings(), move || Ok((d, v, NullSink))).unwrap();
    let events = engine.subscribe();
    assert!(engine.is_running());

    wait_for("button A on slot 0", || {
        engine
            .submitted(0)
            .is_some_and(|state| state.buttons.contains(Button::A))
    });
    assert_eq!(engine.devices().len(), 1);

    devices.unplug("pad-a");
    engine.send(EngineCommand::RefreshDevices);
    wait_for("device change event", || {
        events.try_iter().any(|e| e == EngineEvent::DevicesChanged)
    });

    engine.update_settings(Settings::default());
    wait_for("slot 0 released", || engine.submitted(0).is_none());
    assert_eq!(virtuals.bus().live, 0);

    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(devices.times_closed("pad-a"), 1);
}

#[test]
fn frequency_is_measured() {
    let (d, v) = (FakeDevices::default(), FakeVirtuals::default());
    let engine = Engine::start(config(100), Settings::default(), move || Ok((d, v, NullSink))).unwrap();
    wait_for("a frequency sample", || engine.frequency() > 0.0);
}

#[test]
fn factory_failure_is_returned_to_the_caller() {
    let result = Engine::start::<FakeDevices, FakeVirtuals, NullSink, _>(
        config(100),
        Settings::default(),
        || Err(Error::Startup("no device layer".into())),
    );
    assert!(matches!(result, Err(Error::Startup(_))));
}

#[test]
fn dropping_the_engine_releases_controllers() {
    let devices = FakeDevices::default();
    let virtuals = FakeVirtuals::default();
    devices.plug("pad-a", PAD_PRODUCT);

    let (d, v) = (devices.clone(), virtuals.clone());
    let engine = Engine::start(config(100), settings(), move || Ok((d, v, NullSink))).unwrap();
    wait_for("a live controller", || virtuals.bus().live == 1);

    drop(engine);
    assert_eq!(virtuals.bus().live, 0);
    assert_eq!(devices.times_closed("pad-a"), 1);
}
