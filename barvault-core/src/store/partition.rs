//! Partition addressing — one Parquet file per (series, year, month).

use chrono::{DateTime, Datelike, NaiveDate};
use std::fmt;

/// One calendar month, the time slice of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    /// Month containing an epoch-seconds timestamp (UTC). `None` for
    /// out-of-range timestamps.
    pub fn of_ts(ts: i64) -> Option<Month> {
        DateTime::from_timestamp(ts, 0).map(|dt| {
            let date = dt.date_naive();
            Month {
                year: date.year(),
                month: date.month(),
            }
        })
    }

    pub fn next(self) -> Month {
        if self.month == 12 {
            Month {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Month {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Epoch seconds at the first instant of this month (UTC).
    pub fn first_ts(self) -> i64 {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("month 1..=12 always forms a valid first-of-month date")
            .and_hms_opt(0, 0, 0)
            .expect("midnight always exists")
            .and_utc()
            .timestamp()
    }

    /// File name within the year directory.
    pub fn file_name(self) -> String {
        format!("{:02}.parquet", self.month)
    }

    /// Whether any instant of this month lies within `[from, to]`
    /// (either bound optional, epoch seconds).
    pub fn intersects(self, from: Option<i64>, to: Option<i64>) -> bool {
        let start = self.first_ts();
        let end = self.next().first_ts(); // exclusive
        if let Some(from) = from {
            if end <= from {
                return false;
            }
        }
        if let Some(to) = to {
            if start > to {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
