//! Time source used for upload names, `Date` headers and idle timeouts

use chrono::{DateTime, Local, Utc};
use std::time::Instant;

/// Clock abstraction so timestamps can be pinned in tests
pub trait Clock: Send + Sync {
    /// Wall-clock time in UTC (used for the `Date` header)
    fn now_utc(&self) -> DateTime<Utc>;

    /// Wall-clock time in the server's local zone (used for upload file names)
    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }

    /// Monotonic instant for measuring idle time
    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock frozen at a single wall-clock time
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Format a time as an RFC 7231 IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_format() {
        let time = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_fixed_clock() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let clock = FixedClock(time);
        assert_eq!(clock.now_utc(), time);
        assert_eq!(clock.now_local().with_timezone(&Utc), time);
    }
}
