use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Half-open UTC interval used to filter expenses:
/// `created_at >= start AND created_at < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

pub fn month_window(year: i32, month: u32) -> Option<DateWindow> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateWindow {
        start: start_of_day(start),
        end: start_of_day(end),
    })
}

pub fn year_window(year: i32) -> Option<DateWindow> {
    Some(DateWindow {
        start: start_of_day(NaiveDate::from_ymd_opt(year, 1, 1)?),
        end: start_of_day(NaiveDate::from_ymd_opt(year + 1, 1, 1)?),
    })
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Window for the dashboard stats routes: `monthly` (default) and `yearly`
/// are anchored on `now`; `custom` takes YYYY-MM-DD bounds, end inclusive.
/// Anything else means no date filter.
pub fn resolve_period_window(
    period: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Utc>,
) -> Option<DateWindow> {
    match period {
        "monthly" => month_window(now.year(), now.month()),
        "yearly" => year_window(now.year()),
        "custom" => {
            let start = NaiveDate::parse_from_str(start_date?, "%Y-%m-%d").ok()?;
            let end = NaiveDate::parse_from_str(end_date?, "%Y-%m-%d").ok()?;
            Some(DateWindow {
                start: start_of_day(start),
                end: start_of_day(end.succ_opt()?),
            })
        }
        _ => None,
    }
}

/// Window for the reports/export routes, which take explicit month/year
/// numbers instead of a named period.
pub fn resolve_report_window(
    period: &str,
    month: u32,
    year: i32,
    now: DateTime<Utc>,
) -> DateWindow {
    let fallback = DateWindow {
        start: start_of_day(NaiveDate::from_ymd_opt(now.year(), 1, 1).unwrap_or_default()),
        end: start_of_day(NaiveDate::from_ymd_opt(now.year() + 1, 1, 1).unwrap_or_default()),
    };

    if period == "month" {
        month_window(year, month).unwrap_or(fallback)
    } else {
        year_window(year).unwrap_or(fallback)
    }
}

pub fn percentage_of(part: Decimal, total: Decimal) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    (part / total * Decimal::from(100)).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn month_window_covers_whole_month() {
        let w = month_window(2025, 2).unwrap();
        assert_eq!(w.start, utc(2025, 2, 1, 0));
        assert_eq!(w.end, utc(2025, 3, 1, 0));
        assert!(utc(2025, 2, 28, 23) < w.end);
        assert!(utc(2025, 3, 1, 0) >= w.end);
    }

    #[test]
    fn december_rolls_into_next_year() {
        let w = month_window(2024, 12).unwrap();
        assert_eq!(w.end, utc(2025, 1, 1, 0));
    }

    #[test]
    fn previous_month_wraps_january() {
        assert_eq!(previous_month(2025, 1), (2024, 12));
        assert_eq!(previous_month(2025, 7), (2025, 6));
    }

    #[test]
    fn custom_period_is_end_inclusive() {
        let now = utc(2025, 6, 15, 12);
        let w = resolve_period_window("custom", Some("2025-01-10"), Some("2025-01-20"), now)
            .unwrap();
        assert_eq!(w.start, utc(2025, 1, 10, 0));
        // Expenses created any time on the 20th fall inside the window.
        assert!(utc(2025, 1, 20, 23) < w.end);
        assert_eq!(w.end, utc(2025, 1, 21, 0));
    }

    #[test]
    fn custom_without_bounds_means_no_filter() {
        let now = utc(2025, 6, 15, 12);
        assert!(resolve_period_window("custom", None, Some("2025-01-20"), now).is_none());
        assert!(resolve_period_window("all", None, None, now).is_none());
    }

    #[test]
    fn monthly_and_yearly_anchor_on_now() {
        let now = utc(2025, 6, 15, 12);
        let m = resolve_period_window("monthly", None, None, now).unwrap();
        assert_eq!(m.start, utc(2025, 6, 1, 0));
        assert_eq!(m.end, utc(2025, 7, 1, 0));

        let y = resolve_period_window("yearly", None, None, now).unwrap();
        assert_eq!(y.start, utc(2025, 1, 1, 0));
        assert_eq!(y.end, utc(2026, 1, 1, 0));
    }

    #[test]
    fn report_window_month_and_year() {
        let now = utc(2025, 6, 15, 12);
        let m = resolve_report_window("month", 3, 2025, now);
        assert_eq!(m.start, utc(2025, 3, 1, 0));
        assert_eq!(m.end, utc(2025, 4, 1, 0));

        let y = resolve_report_window("year", 3, 2024, now);
        assert_eq!(y.start, utc(2024, 1, 1, 0));
        assert_eq!(y.end, utc(2025, 1, 1, 0));
    }

    #[test]
    fn percentages_match_share_of_total() {
        let total = dec("200.00");
        assert_eq!(percentage_of(dec("50.00"), total), 25.0);
        assert_eq!(percentage_of(dec("200.00"), total), 100.0);
        assert_eq!(percentage_of(dec("0"), total), 0.0);
    }

    #[test]
    fn percentage_of_zero_total_is_zero() {
        assert_eq!(percentage_of(dec("10.00"), Decimal::ZERO), 0.0);
    }

    #[test]
    fn category_shares_sum_to_at_most_hundred() {
        let parts = [dec("33.33"), dec("33.33"), dec("33.34")];
        let total: Decimal = parts.iter().copied().sum();
        let sum: f64 = parts.iter().map(|p| percentage_of(*p, total)).sum();
        assert!(sum <= 100.0 + 1e-9);
        assert!((sum - 100.0).abs() < 1e-6);
    }
}
