//! Placement of already-resolved events into day, week and month views.

use chrono::{Datelike, Days, Months, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use shared::domain::{Event, Holiday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarView {
    Day,
    Week,
    #[default]
    Month,
}

impl std::str::FromStr for CalendarView {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(CalendarView::Day),
            "week" => Ok(CalendarView::Week),
            "month" => Ok(CalendarView::Month),
            other => Err(format!("unknown calendar view '{other}'")),
        }
    }
}

/// Inclusive date range covered by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first <= day && day <= self.last
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last;
        self.first.iter_days().take_while(move |day| *day <= last)
    }
}

pub fn week_start(anchor: NaiveDate) -> NaiveDate {
    anchor - Days::new(u64::from(anchor.weekday().num_days_from_monday()))
}

fn month_start(anchor: NaiveDate) -> NaiveDate {
    anchor.with_day(1).unwrap_or(anchor)
}

pub fn visible_range(view: CalendarView, anchor: NaiveDate) -> DateRange {
    match view {
        CalendarView::Day => DateRange {
            first: anchor,
            last: anchor,
        },
        CalendarView::Week => {
            let first = week_start(anchor);
            DateRange {
                first,
                last: first + Days::new(6),
            }
        }
        CalendarView::Month => {
            let first = month_start(anchor);
            let last = first
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(first);
            DateRange { first, last }
        }
    }
}

/// Moves the anchor one view-unit backwards or forwards. Month steps clamp to
/// the last valid day (Jan 31 -> Feb 28).
pub fn step(view: CalendarView, anchor: NaiveDate, forward: bool) -> NaiveDate {
    let moved = match (view, forward) {
        (CalendarView::Day, true) => anchor.checked_add_days(Days::new(1)),
        (CalendarView::Day, false) => anchor.checked_sub_days(Days::new(1)),
        (CalendarView::Week, true) => anchor.checked_add_days(Days::new(7)),
        (CalendarView::Week, false) => anchor.checked_sub_days(Days::new(7)),
        (CalendarView::Month, true) => anchor.checked_add_months(Months::new(1)),
        (CalendarView::Month, false) => anchor.checked_sub_months(Months::new(1)),
    };
    moved.unwrap_or(anchor)
}

/// Events are placed on the cell of their start date.
pub fn events_on<'a>(day: NaiveDate, events: &[&'a Event]) -> Vec<&'a Event> {
    let mut placed: Vec<&Event> = events
        .iter()
        .copied()
        .filter(|event| event.start.date() == day)
        .collect();
    placed.sort_by_key(|event| (event.start, event.id));
    placed
}

pub fn holidays_on(day: NaiveDate, holidays: &[Holiday]) -> Vec<&Holiday> {
    holidays
        .iter()
        .filter(|holiday| holiday.month == day.month() && holiday.day == day.day())
        .collect()
}

/// Rows covered by an event on the single-day timeline, `end_hour` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourSpan {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourSpan {
    pub fn hours(&self) -> u32 {
        self.end_hour - self.start_hour
    }
}

/// Inverted or zero-length spans clamp to one hour at `start.hour`; an end on
/// a later day runs to midnight.
pub fn timeline_span(event: &Event) -> HourSpan {
    let start_hour = event.start.hour();
    let end_hour = if event.end <= event.start {
        start_hour + 1
    } else if event.end.date() > event.start.date() {
        24
    } else if event.end.hour() <= start_hour {
        start_hour + 1
    } else {
        event.end.hour()
    };
    HourSpan {
        start_hour,
        end_hour,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub date: NaiveDate,
    pub in_month: bool,
}

pub const GRID_ROWS: usize = 6;
pub const GRID_COLUMNS: usize = 7;

/// Monday-first month grid, always 6 rows of 7 days.
pub fn month_grid(anchor: NaiveDate) -> Vec<Vec<GridCell>> {
    let first = month_start(anchor);
    let mut cursor = week_start(first);
    let mut rows = Vec::with_capacity(GRID_ROWS);
    for _ in 0..GRID_ROWS {
        let mut row = Vec::with_capacity(GRID_COLUMNS);
        for _ in 0..GRID_COLUMNS {
            row.push(GridCell {
                date: cursor,
                in_month: cursor.month() == first.month() && cursor.year() == first.year(),
            });
            cursor = cursor.succ_opt().unwrap_or(cursor);
        }
        rows.push(row);
    }
    rows
}
