// src/services/market_hours.rs

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::settings::Settings;

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Day-of-week + local-time gate for the scheduler. A timezone or open/close
/// time that fails to parse closes the gate rather than letting the loops
/// run against a misread clock.
pub fn is_market_open(now: DateTime<Utc>, settings: &Settings) -> bool {
    if settings.market_allow_after_hours {
        return true;
    }

    let tz: Tz = match settings.market_tz.parse() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::error!(tz = %settings.market_tz, "invalid MARKET_TZ, gating out");
            return false;
        }
    };
    let local = now.with_timezone(&tz);

    let days = settings.market_days_list();
    if !days.iter().any(|d| d == weekday_code(local.weekday())) {
        return false;
    }

    let (Some(open), Some(close)) = (
        parse_hhmm(&settings.market_open_time),
        parse_hhmm(&settings.market_close_time),
    ) else {
        tracing::error!(
            open = %settings.market_open_time,
            close = %settings.market_close_time,
            "invalid market open/close time, gating out"
        );
        return false;
    };

    let t = local.time();
    open <= t && t <= close
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
