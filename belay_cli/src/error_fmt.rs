//! Human-readable error descriptions and structured JSON error formatting.

use std::path::PathBuf;

/// Context attached to errors raised while loading the config file.
#[derive(Debug)]
pub struct ConfigError(pub PathBuf);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration in {}", self.0.display())
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use belay_core::error::{BelayError, BuildError};

    if let Some(ConfigError(path)) = err.downcast_ref::<ConfigError>() {
        let detail = err
            .chain()
            .nth(1)
            .map_or_else(String::new, |c| format!(" ({c})"));
        return format!(
            "What happened: The config file {} is invalid{detail}.\nLikely causes: A missing [[belay]] table, a misspelled key, or an out-of-range value.\nHow to fix: Edit the TOML and run `belay check` until it passes.",
            path.display()
        );
    }

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::UnknownExtruder(name) => format!(
                "What happened: The secondary extruder {name:?} does not exist.\nLikely causes: extruder_stepper_name does not match a stepper the host knows, or no filament driver is loaded for extruder_type = \"trad_rack\".\nHow to fix: Fix the name in the [[belay]] table or load the missing object."
            ),
            BuildError::MissingAnalogInput | BuildError::MissingPrimaryExtruder => format!(
                "What happened: The analog slider sensor could not be wired ({be}).\nLikely causes: The analog input or the primary extruder was not handed to the builder.\nHow to fix: Provide both via with_analog_input(...) and with_primary_extruder(...)."
            ),
            BuildError::InvalidConfig { field, reason } => format!(
                "What happened: Invalid configuration ({field}: {reason}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `belay check`."
            ),
            other => format!(
                "What happened: A belay could not be built ({other}).\nLikely causes: The builder was not given every part.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BelayError>() {
        return match be {
            BelayError::EnableRefused(name) => format!(
                "What happened: Belay {name} refused to enable.\nLikely causes: The belay is already enabled, or its filament driver is not synced to the extruder.\nHow to fix: Sync the filament driver first, or check the belay with a query."
            ),
            BelayError::DisableRefused(name) => format!(
                "What happened: Belay {name} refused to disable.\nLikely causes: The belay is already disabled, or its filament driver is still synced.\nHow to fix: Unsync the filament driver first."
            ),
            BelayError::Actuator(msg) | BelayError::ActuatorFault(msg) => format!(
                "What happened: The secondary extruder rejected an update ({msg}).\nLikely causes: A stepper or filament driver went away or was given an impossible value.\nHow to fix: Check the actuator, then re-enable the belay."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or I/O
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file."
        );
    }

    if lower.contains("gpio") || lower.contains("hardware feature") {
        return format!(
            "What happened: GPIO access failed ({msg}).\nLikely causes: Incorrect pin numbers, insufficient GPIO permissions, or a build without the `hardware` feature.\nHow to fix: Fix the pins in the [[belay]] sensor table and run on the target with --features hardware."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name of the error kind, used in JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    use belay_core::error::{BelayError, BuildError};
    if err.downcast_ref::<ConfigError>().is_some() {
        return "InvalidConfig";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<BelayError>() {
        Some(BelayError::Actuator(_) | BelayError::ActuatorFault(_)) => "ActuatorFault",
        Some(BelayError::EnableRefused(_) | BelayError::DisableRefused(_)) => "Refused",
        Some(_) => "Command",
        None => "Error",
    }
}

/// Map error kinds to stable exit codes.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match reason_name(err) {
        "InvalidConfig" | "Build" => 3,
        "Refused" | "Command" => 4,
        "ActuatorFault" => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
