//! Time-of-day greeting shown on the display

use chrono::{Local, Timelike};

/// Greeting for a local hour (0-23), addressed to the speaker when one is set
pub fn greeting_for(hour: u32, speaker: Option<&str>) -> String {
    let base = match hour {
        0..=11 => "Bom dia",
        12..=17 => "Boa tarde",
        _ => "Boa noite",
    };

    match speaker.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => format!("{base}, {name}!"),
        None => base.to_string(),
    }
}

pub fn current_greeting(speaker: Option<&str>) -> String {
    greeting_for(Local::now().hour(), speaker)
}
