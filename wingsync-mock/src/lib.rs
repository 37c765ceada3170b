use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time;
use wingsync_embedded::{
    Controller, LightSensor, LocalTime, Now, Pass, SettingsStore, SimulatedMotor, TargetValue,
    WingMask,
};

use crate::settings::Settings;
use crate::simulate::{SimClock, SimulatedAdc, TracingNotifier};
use crate::solar::SunriseCalculator;
use crate::store::FileStorage;

pub mod settings;
mod simulate;
mod solar;
mod store;

type MockController = Controller<
    SimulatedMotor,
    LightSensor<SimulatedAdc>,
    FileStorage,
    SunriseCalculator,
    TracingNotifier,
>;

/// Runs the firmware core against simulated hardware, compressing
/// `seconds_per_tick` of device time into every `tick_ms`.
pub async fn run(settings: &Arc<Settings>) -> anyhow::Result<()> {
    let device = &settings.device;
    let mock = &settings.mock;

    let clock = SimClock::new(mock.start_unix, device.utc_offset_minutes);
    let store = FileStorage::open(&device.storage_path)?;
    let mut controller = Controller::new(
        SimulatedMotor::new(),
        LightSensor::new(SimulatedAdc::new(clock.clone(), mock.light_noise)),
        store,
        SunriseCalculator::new(device.utc_offset_minutes),
        TracingNotifier,
    );
    controller.boot();
    install(&mut controller, settings)?;

    let mut interval = time::interval(Duration::from_millis(mock.tick_ms.max(1)));
    let mut commands = mock.commands.iter().peekable();
    let mut uptime_s = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for _ in 0..mock.seconds_per_tick {
                    uptime_s += 1;
                    clock.advance(1);

                    while let Some(command) = commands.next_if(|command| command.at_s <= uptime_s) {
                        let wings = WingMask::from_digits(command.wings);
                        match controller.apply_target(wings, TargetValue::Percent(command.percent)) {
                            Ok(moved) => tracing::info!("Command: wings {} to {}% ({})", wings, command.percent, if moved { "moving" } else { "unchanged" }),
                            Err(e) => tracing::warn!("Command rejected: {}", e),
                        }
                    }

                    let now = Now::new(uptime_s, LocalTime::from_unix(clock.unix(), clock.utc_offset_minutes()));
                    simulate_second(&mut controller, &now, mock.polls_per_second);
                }

                let status = controller.get_state();
                tracing::debug!(
                    "t={} wings {}/{} {}/{} {}/{}",
                    uptime_s,
                    status[0].actual, status[0].destination,
                    status[1].actual, status[1].destination,
                    status[2].actual, status[2].destination,
                );
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down after {} simulated seconds", uptime_s);
                controller.stop();
                break;
            }
        }
    }

    Ok(())
}

/// Writes the configured installation on first start.
fn install(controller: &mut MockController, settings: &Settings) -> anyhow::Result<()> {
    if controller.store().load_settings()?.is_some() {
        return Ok(());
    }

    let device = &settings.device;
    let record = json!({
        "steps": device.steps,
        "location": device.location.clone().unwrap_or_default(),
        "smart": device.smart.clone().unwrap_or_default(),
        "dusk": device.dusk,
        "dawn": device.dawn,
    });
    controller.update_settings(&record.to_string())?;
    tracing::info!("Installed device settings: {}", controller.settings_json()?);
    Ok(())
}

/// One second of device time: motor pulses until the budget is used, then
/// at most one housekeeping pass.
fn simulate_second(controller: &mut MockController, now: &Now, polls: u32) {
    for _ in 0..polls {
        match controller.poll(now) {
            Pass::Idle => break,
            Pass::Stepped(outcome) if outcome.converged => {
                tracing::info!("Wings at rest: {:?}", controller.state().actuals());
            }
            _ => {}
        }
    }
}
