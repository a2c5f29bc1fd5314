//! Live view of a belay's slider switches read from GPIO.

use belay_config::{Config, SensorCfg};

/// Switch index and GPIO pin of every switch of the selected belay.
fn switch_pins(cfg: &Config, belay: Option<&str>) -> eyre::Result<(String, Vec<(usize, u8)>)> {
    let b = match belay {
        Some(name) => cfg.belays.iter().find(|b| b.name == name),
        None => cfg.belays.first(),
    }
    .ok_or_else(|| {
        eyre::Report::new(belay_core::BelayError::UnknownBelay(
            belay.unwrap_or_default().to_string(),
        ))
    })?;
    let pins = match &b.sensor {
        SensorCfg::SingleSwitch { pin } => vec![(0, *pin)],
        SensorCfg::DualSwitch {
            compression_pin,
            expansion_pin,
        } => vec![(0, *compression_pin), (1, *expansion_pin)],
        SensorCfg::Analog(_) => eyre::bail!("belay {}: watch needs a switch sensor", b.name),
    };
    Ok((b.name.clone(), pins))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn run(
    cfg: &Config,
    belay: Option<&str>,
    seconds: f64,
    hz: u32,
    active_high: bool,
) -> eyre::Result<()> {
    use belay_core::sampler::Sampler;
    use belay_hardware::GpioSwitch;
    use belay_traits::{Clock, MonotonicClock};
    use eyre::WrapErr;

    let (name, pins) = switch_pins(cfg, belay)?;
    let clock = MonotonicClock::new();
    let mut samplers = Vec::with_capacity(pins.len());
    for (index, pin) in pins {
        let input = GpioSwitch::open(pin, !active_high)
            .wrap_err_with(|| format!("gpio: open switch {index} of belay {name}"))?;
        samplers.push((index, pin, Sampler::spawn_switch(input, hz, clock)));
    }
    tracing::info!(belay = %name, switches = samplers.len(), seconds, "watching switches");

    let deadline = clock.now() + seconds;
    while clock.now() < deadline {
        for (index, pin, sampler) in &samplers {
            for (t, triggered) in sampler.drain() {
                tracing::info!(belay = %name, switch = index, pin, t, triggered, "switch edge");
                println!("t={t:10.3}s belay {name}: switch {index} (pin {pin}) triggered={triggered}");
            }
        }
        clock.sleep(std::time::Duration::from_millis(10));
    }
    for (index, pin, sampler) in &samplers {
        let errors = sampler.read_errors();
        if errors > 0 {
            tracing::warn!(switch = index, pin, errors, "switch reads failed");
        }
    }
    Ok(())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn run(
    cfg: &Config,
    belay: Option<&str>,
    _seconds: f64,
    _hz: u32,
    _active_high: bool,
) -> eyre::Result<()> {
    let (name, _) = switch_pins(cfg, belay)?;
    eyre::bail!("belay {name}: watch needs GPIO access; rebuild with the hardware feature")
}
