//! Computes when a recurring transaction is next due.

use time::{Date, Duration, Month};

use crate::{Error, recurring::Recurrence};

impl Recurrence {
    /// The date of the occurrence that follows `date`.
    ///
    /// - daily adds one day,
    /// - weekly adds seven days,
    /// - bi-weekly adds fourteen days,
    /// - monthly moves to the same day of the following month. If the
    ///   following month is too short, the excess days roll over into the
    ///   month after, e.g. 2024-01-31 becomes 2024-03-02 and 2023-01-31
    ///   becomes 2023-03-03.
    ///
    /// # Errors
    /// Returns an [Error::DateOutOfRange] if the next occurrence is not a representable date.
    pub fn advance(self, date: Date) -> Result<Date, Error> {
        let next = match self {
            Recurrence::Daily => date.checked_add(Duration::days(1)),
            Recurrence::Weekly => date.checked_add(Duration::weeks(1)),
            Recurrence::BiWeekly => date.checked_add(Duration::weeks(2)),
            Recurrence::Monthly => add_month_rolling_over(date),
        };

        next.ok_or(Error::DateOutOfRange(date))
    }
}

fn add_month_rolling_over(date: Date) -> Option<Date> {
    let (year, month) = match date.month() {
        Month::December => (date.year().checked_add(1)?, Month::January),
        month => (date.year(), month.next()),
    };

    let last_day = month.length(year);
    let day = date.day();

    if day <= last_day {
        Date::from_calendar_date(year, month, day).ok()
    } else {
        let overflow = i64::from(day - last_day);

        Date::from_calendar_date(year, month, last_day)
            .ok()?
            .checked_add(Duration::days(overflow))
    }
}
