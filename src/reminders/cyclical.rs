//! Household routine shown alongside stored reminders
//!
//! These are derived from the clock on every listing and never stored.

use chrono::{DateTime, Datelike, Local, Timelike, Utc, Weekday};

use super::{ReminderCategory, ReminderRecord};

/// Recurring reminders due at `now`
pub fn cyclical_reminders(now: DateTime<Local>) -> Vec<ReminderRecord> {
    let created_at = now.with_timezone(&Utc);
    cyclical_for(now.weekday(), now.hour())
        .into_iter()
        .map(|(id, category, text, time)| ReminderRecord {
            id: id.to_string(),
            text: text.to_string(),
            category,
            created_at,
            display_time: time.to_string(),
        })
        .collect()
}

type Entry = (&'static str, ReminderCategory, &'static str, &'static str);

fn cyclical_for(weekday: Weekday, hour: u32) -> Vec<Entry> {
    use ReminderCategory::{Action, Alert, Info};

    match weekday {
        Weekday::Mon if hour >= 19 => vec![("c1", Alert, "Marmitas: André não tem aula amanhã.", "19:00")],
        Weekday::Tue => vec![
            ("c2", Action, "Terapia da Marcelly", "Dia"),
            ("c3", Action, "Terapia do André", "Dia"),
            ("c4", Info, "Terapia Familiar", "Dia"),
            ("c5", Alert, "André: Cozinhar (Marcelly Terapia)", "Noite"),
        ],
        Weekday::Wed => vec![("c6", Info, "Verificar plantas e jardim", "09:00")],
        Weekday::Thu => vec![("c7", Action, "Vôlei do André (Bicicleta)", "16:30")],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ids(weekday: Weekday, hour: u32) -> Vec<&'static str> {
        cyclical_for(weekday, hour).into_iter().map(|e| e.0).collect()
    }

    #[test]
    fn test_monday_evening_only() {
        assert!(ids(Weekday::Mon, 0).is_empty());
        assert!(ids(Weekday::Mon, 18).is_empty());
        assert_eq!(ids(Weekday::Mon, 19), ["c1"]);
        assert_eq!(ids(Weekday::Mon, 23), ["c1"]);
    }

    #[test]
    fn test_weekday_routines() {
        assert_eq!(ids(Weekday::Tue, 0), ["c2", "c3", "c4", "c5"]);
        assert_eq!(ids(Weekday::Tue, 23), ["c2", "c3", "c4", "c5"]);
        assert_eq!(ids(Weekday::Wed, 8), ["c6"]);
        assert_eq!(ids(Weekday::Thu, 20), ["c7"]);
    }

    #[test]
    fn test_quiet_days() {
        for weekday in [Weekday::Fri, Weekday::Sat, Weekday::Sun] {
            for hour in [0, 12, 19, 23] {
                assert!(ids(weekday, hour).is_empty(), "{weekday} {hour}h");
            }
        }
    }

    #[test]
    fn test_records_from_clock() {
        // 2024-01-02 was a Tuesday
        let now = Local.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let records = cyclical_reminders(now);

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].id, "c2");
        assert_eq!(records[0].category, ReminderCategory::Action);
        assert_eq!(records[3].display_time, "Noite");
        assert_eq!(records[3].category, ReminderCategory::Alert);
        assert!(records.iter().all(|r| r.created_at == now.with_timezone(&Utc)));
    }
}
