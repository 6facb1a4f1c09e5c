//! Stdin command language
//!
//! Plain lines become barrages. Lines starting with `/` control the engine:
//!
//! ```text
//! /clear                 remove everything on screen and in the queue
//! /pause, /resume        freeze or resume animation
//! /screen 1280x720       resize the drawable area
//! /speed 1.5             speed multiplier
//! /density 4             admissions per second
//! /travel 0.8            travel range fraction
//! /lifetime 6            seconds before fading
//! /direction ltr|rtl|both
//! /style neon            default preset
//! /random on|off         random styling
//! /animations on|off     per-frame effects
//! /narration on|off      speech on or off
//! /error TEXT, /system TEXT, /highlight TEXT
//! ```

use barrage_core::{BarrageConfig, BarrageKind, DirectionPolicy, ScreenSize, StylePreset};
use thiserror::Error;

/// Errors from parsing a control line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Unrecognized `/command`
    #[error("unknown command: /{0}")]
    Unknown(String),

    /// The command needs an argument
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),

    /// The argument could not be parsed
    #[error("invalid argument for /{command}: {value}")]
    InvalidArgument {
        /// Command name
        command: &'static str,
        /// Offending value
        value: String,
    },
}

/// One parsed stdin line
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Text to show (segmented, may be narrated)
    Say {
        /// The text
        text: String,
        /// Kind of barrage
        kind: BarrageKind,
    },
    /// Clear live set and queue
    Clear,
    /// Pause or resume
    Pause(bool),
    /// Resize the screen
    Screen(ScreenSize),
    /// Change the barrage configuration
    Configure(ConfigChange),
    /// Toggle narration
    Narration(bool),
}

/// A single configuration tweak
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfigChange {
    /// Speed multiplier
    Speed(f64),
    /// Admissions per second
    Density(f64),
    /// Travel range fraction
    Travel(f64),
    /// Lifetime in seconds
    Lifetime(f64),
    /// Direction policy
    Direction(DirectionPolicy),
    /// Default preset
    Style(StylePreset),
    /// Random styling
    Random(bool),
    /// Per-frame effects
    Animations(bool),
}

impl ConfigChange {
    /// Apply the tweak to a copy of `config`
    #[must_use]
    pub fn apply(self, config: &BarrageConfig) -> BarrageConfig {
        let config = config.clone();
        match self {
            Self::Speed(v) => config.with_speed(v),
            Self::Density(v) => config.with_density(v),
            Self::Travel(v) => config.with_travel_range(v),
            Self::Lifetime(v) => config.with_lifetime_secs(v),
            Self::Direction(d) => config.with_direction(d),
            Self::Style(s) => config.with_default_style(s),
            Self::Random(b) => config.with_random_style(b),
            Self::Animations(b) => config.with_animations(b),
        }
    }
}

/// Parse one stdin line; blank lines yield `None`
///
/// # Errors
///
/// Returns an error for malformed `/commands`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say {
            text: line.to_string(),
            kind: BarrageKind::Normal,
        }));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "clear" => Command::Clear,
        "pause" => Command::Pause(true),
        "resume" => Command::Pause(false),
        "screen" => Command::Screen(
            ScreenSize::parse(required("screen", arg)?).ok_or_else(|| invalid("screen", arg))?,
        ),
        "speed" => Command::Configure(ConfigChange::Speed(number("speed", arg)?)),
        "density" => Command::Configure(ConfigChange::Density(number("density", arg)?)),
        "travel" => Command::Configure(ConfigChange::Travel(number("travel", arg)?)),
        "lifetime" => Command::Configure(ConfigChange::Lifetime(number("lifetime", arg)?)),
        "direction" => Command::Configure(ConfigChange::Direction(
            match required("direction", arg)? {
                "ltr" => DirectionPolicy::LeftToRight,
                "rtl" => DirectionPolicy::RightToLeft,
                "both" => DirectionPolicy::Bidirectional,
                _ => return Err(invalid("direction", arg)),
            },
        )),
        "style" => {
            let wanted = required("style", arg)?.to_lowercase();
            let preset = StylePreset::ALL
                .into_iter()
                .find(|p| p.to_string() == wanted)
                .ok_or_else(|| invalid("style", arg))?;
            Command::Configure(ConfigChange::Style(preset))
        }
        "random" => Command::Configure(ConfigChange::Random(switch("random", arg)?)),
        "animations" => Command::Configure(ConfigChange::Animations(switch("animations", arg)?)),
        "narration" => Command::Narration(switch("narration", arg)?),
        "error" => say(BarrageKind::Error, "error", arg)?,
        "system" => say(BarrageKind::System, "system", arg)?,
        "highlight" => say(BarrageKind::Highlight, "highlight", arg)?,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        command,
        value: value.to_string(),
    }
}

fn required<'a>(command: &'static str, arg: &'a str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(arg)
    }
}

fn number(command: &'static str, arg: &str) -> Result<f64, CommandError> {
    required(command, arg)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(command, arg))
}

fn switch(command: &'static str, arg: &str) -> Result<bool, CommandError> {
    match required(command, arg)? {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(invalid(command, arg)),
    }
}

fn say(kind: BarrageKind, command: &'static str, arg: &str) -> Result<Command, CommandError> {
    Ok(Command::Say {
        text: required(command, arg)?.to_string(),
        kind,
    })
}
