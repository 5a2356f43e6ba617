use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Calendar date at the deployment's configured offset.
pub fn today(clock: &dyn Clock, offset: FixedOffset) -> NaiveDate {
    clock.now().with_timezone(&offset).date_naive()
}
