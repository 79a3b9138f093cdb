use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of "now" in the service's local wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;

    fn timezone(&self) -> Tz;

    /// Local wall time to an absolute instant. Times that fall into a DST gap
    /// are moved forward by the gap.
    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        local_to_utc(self.timezone(), local)
    }

    /// How long to sleep until `at`, zero if it already passed.
    fn until(&self, at: NaiveDateTime) -> std::time::Duration {
        (at - self.now()).to_std().unwrap_or_default()
    }
}

pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let resolved = tz.from_local_datetime(&local).earliest().or_else(|| {
        local
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
    });

    match resolved {
        Some(at) => at.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local),
    }
}

pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Wall clock driven by tokio's timer, so it follows `tokio::time::pause`
/// and `advance` in tests.
pub struct TokioClock {
    origin_wall: NaiveDateTime,
    origin: tokio::time::Instant,
    timezone: Tz,
}

impl TokioClock {
    pub fn starting_at(origin_wall: NaiveDateTime) -> Self {
        Self {
            origin_wall,
            origin: tokio::time::Instant::now(),
            timezone: Tz::UTC,
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin_wall
            .checked_add_signed(elapsed)
            .unwrap_or(NaiveDateTime::MAX)
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use test_strategy::proptest;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 30)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn local_time_converts_with_the_zone_offset() {
        let utc = local_to_utc(chrono_tz::Europe::Berlin, at(1, 30));
        assert_eq!(utc.naive_utc(), at(0, 30));
    }

    #[test]
    fn dst_gap_is_skipped_forward() {
        // 02:30 does not exist in Berlin on 2025-03-30.
        let utc = local_to_utc(chrono_tz::Europe::Berlin, at(2, 30));
        assert_eq!(utc.naive_utc(), at(1, 30));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(at(9, 0));
        assert_eq!(clock.now(), at(9, 0));

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), at(9, 1) + TimeDelta::seconds(30));
        assert_eq!(clock.until(at(9, 2)), Duration::from_secs(30));
        assert_eq!(clock.until(at(8, 0)), Duration::ZERO);
    }

    #[proptest]
    fn conversion_lands_on_the_wall_time_or_just_past_a_gap(
        #[strategy(0i64..2_000_000_000)] secs: i64,
    ) {
        let tz = chrono_tz::Europe::Berlin;
        let local = at(0, 0) + TimeDelta::seconds(secs - 1_000_000_000);

        let back = local_to_utc(tz, local).with_timezone(&tz).naive_local();
        assert!(back == local || back == local + TimeDelta::hours(1));
    }
}
