//! Text commands accepted by the terminal front end.
//!
//! | command | signal |
//! |---|---|
//! | `start` | [`GameSignal::Start`] |
//! | `next` | [`GameSignal::NextLevel`] |
//! | `restart` | [`GameSignal::Restart`] |
//! | `blur` / `hide` | focus loss |
//! | `ended <level>` / `fail <level> <reason>` | playback signals |
//! | `volume <x> <y>` / `brightness <x> <y>` | dial drag from the center to `(x, y)` |
//! | `quit` | [`GameSignal::Shutdown`] |

use staring_ui::Point;

use crate::runtime::{DialControl, GameSignal};

/// Parses one command line.
///
/// # Errors
/// Returns a short usage message for unknown or malformed commands.
pub fn parse_command(line: &str) -> Result<GameSignal, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err("empty command".to_string());
    };

    let signal = match command.to_ascii_lowercase().as_str() {
        "start" => GameSignal::Start,
        "next" => GameSignal::NextLevel,
        "restart" | "again" => GameSignal::Restart,
        "blur" => GameSignal::WindowBlur,
        "hide" => GameSignal::VisibilityHidden,
        "quit" | "exit" => GameSignal::Shutdown,
        "ended" => GameSignal::PlaybackEnded {
            level: parse_level(words.next())?,
        },
        "fail" => {
            let level = parse_level(words.next())?;
            let reason = words.collect::<Vec<_>>().join(" ");
            GameSignal::PlaybackFailed {
                level,
                reason: if reason.is_empty() {
                    "unspecified".to_string()
                } else {
                    reason
                },
            }
        }
        "volume" | "brightness" => {
            let control = if command.eq_ignore_ascii_case("volume") {
                DialControl::Volume
            } else {
                DialControl::Brightness
            };
            let x = parse_coordinate(words.next())?;
            let y = parse_coordinate(words.next())?;
            GameSignal::DialDragged {
                control,
                center: Point::new(0.0, 0.0),
                path: vec![Point::new(x, y)],
            }
        }
        other => return Err(format!("unknown command `{other}`")),
    };

    Ok(signal)
}

fn parse_level(word: Option<&str>) -> Result<u32, String> {
    word.and_then(|word| word.parse().ok())
        .ok_or_else(|| "expected a level number".to_string())
}

fn parse_coordinate(word: Option<&str>) -> Result<f64, String> {
    word.and_then(|word| word.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| "expected two pointer coordinates".to_string())
}
