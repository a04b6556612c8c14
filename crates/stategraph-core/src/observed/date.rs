#![forbid(unsafe_code)]

//! Date setters for `Observed<NaiveDateTime>`.
//!
//! Each setter replaces one component in place and notifies owners once.
//! Components that would produce an invalid date (February 30th, hour 24)
//! leave the value untouched, fire nothing, and return `false`.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

use super::Observed;

impl Observed<NaiveDateTime> {
    /// Milliseconds since the Unix epoch, read through the wrapper.
    #[must_use]
    pub fn get_time(&self) -> i64 {
        self.get_field("time", |raw| raw.and_utc().timestamp_millis())
    }

    pub fn set_full_year(&self, year: i32) -> bool {
        self.apply("fullYear", |raw| raw.with_year(year))
    }

    /// Set the month, 1 through 12.
    pub fn set_month(&self, month: u32) -> bool {
        self.apply("month", |raw| raw.with_month(month))
    }

    /// Set the day of the month, starting at 1.
    pub fn set_date(&self, day: u32) -> bool {
        self.apply("date", |raw| raw.with_day(day))
    }

    pub fn set_hours(&self, hours: u32) -> bool {
        self.apply("hours", |raw| raw.with_hour(hours))
    }

    pub fn set_minutes(&self, minutes: u32) -> bool {
        self.apply("minutes", |raw| raw.with_minute(minutes))
    }

    pub fn set_seconds(&self, seconds: u32) -> bool {
        self.apply("seconds", |raw| raw.with_second(seconds))
    }

    /// Set the sub-second part, 0 through 999.
    pub fn set_milliseconds(&self, millis: u32) -> bool {
        if millis >= 1_000 {
            return false;
        }
        self.apply("milliseconds", |raw| raw.with_nanosecond(millis * 1_000_000))
    }

    /// Replace the whole instant with `millis` since the Unix epoch (UTC).
    pub fn set_time(&self, millis: i64) -> bool {
        self.apply("time", |_| {
            DateTime::from_timestamp_millis(millis).map(|utc| utc.naive_utc())
        })
    }

    fn apply(
        &self,
        field: &str,
        update: impl FnOnce(&NaiveDateTime) -> Option<NaiveDateTime>,
    ) -> bool {
        self.mutate_if(field, |raw| match update(raw) {
            Some(next) => {
                *raw = next;
                (true, true)
            }
            None => {
                tracing::debug!(field, "observed date: invalid component ignored");
                (false, false)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SubscriberId;
    use crate::subscriber::{Notification, Roles, Subscriber};
    use crate::value::CellValue;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    struct Hits(Cell<u32>);

    impl Subscriber for Hits {
        fn id(&self) -> SubscriberId {
            SubscriberId::new(1)
        }

        fn roles(&self) -> Roles {
            Roles::OBJECT_PROPERTY_CHANGED
        }

        fn notify(&self, _notification: &Notification<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|day| day.and_hms_opt(12, 0, 0))
            .expect("valid test date")
    }

    #[test]
    fn setters_notify_once_each() {
        let when = Observed::new(date(2024, 1, 31));
        let hits = Rc::new(Hits(Cell::new(0)));
        when.attach_owner(hits.id(), Rc::downgrade(&hits) as Weak<dyn Subscriber>);

        assert!(when.set_full_year(2025));
        assert!(when.set_hours(8));
        assert!(when.set_milliseconds(250));
        assert_eq!(hits.0.get(), 3);

        let raw = when.get_raw();
        assert_eq!(raw.year(), 2025);
        assert_eq!(raw.hour(), 8);
        assert_eq!(raw.nanosecond(), 250_000_000);
    }

    #[test]
    fn invalid_components_are_rejected_silently() {
        let when = Observed::new(date(2024, 1, 31));
        let hits = Rc::new(Hits(Cell::new(0)));
        when.attach_owner(hits.id(), Rc::downgrade(&hits) as Weak<dyn Subscriber>);

        assert!(!when.set_month(2), "Feb 31st does not exist");
        assert!(!when.set_hours(24));
        assert!(!when.set_milliseconds(1_000));
        assert_eq!(hits.0.get(), 0);
        assert_eq!(when.get_raw(), date(2024, 1, 31));
    }

    #[test]
    fn set_time_round_trips_epoch_millis() {
        let when = Observed::new(date(2000, 1, 1));
        assert!(when.set_time(86_400_000));
        assert_eq!(when.get_time(), 86_400_000);
        assert_eq!(when.get_raw().date(), NaiveDate::from_ymd_opt(1970, 1, 2).expect("date"));
    }
}
