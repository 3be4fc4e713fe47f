use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};

/// Source of "now" and "today". Core functions take these as arguments;
/// only the command layer reads a clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// The caller's calendar day.
    fn today(&self) -> NaiveDate;

    /// Offset of the calendar `today` is read in. Dates derived from
    /// timestamps (a task's `do_date` from its block) use the same one.
    fn offset(&self) -> FixedOffset;
}

/// Wall clock, with "today" in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn offset(&self) -> FixedOffset {
        *Local::now().offset()
    }
}

/// A clock stopped at one instant. `today` is the date of that instant in
/// `offset` (UTC unless set with [`FixedClock::with_offset`]).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
    pub offset: FixedOffset,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            today: now.date_naive(),
            offset: Utc.fix(),
        }
    }

    pub fn with_offset(self, offset: FixedOffset) -> Self {
        Self {
            today: self.now.with_timezone(&offset).date_naive(),
            offset,
            ..self
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
