//! Plain-text and JSON rendering of an already-resolved calendar.

use std::{collections::HashMap, fmt::Write as _};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use shared::{
    domain::{Event, Group, Holiday, Label, LabelId},
    filter::FilterState,
};
use visibility::layout::{
    events_on, holidays_on, month_grid, timeline_span, visible_range, CalendarView, DateRange,
};

pub struct CalendarPage<'a> {
    pub view: CalendarView,
    pub anchor: NaiveDate,
    pub events: &'a [&'a Event],
    pub labels: &'a [Label],
    pub groups: &'a [Group],
    pub holidays: &'a [Holiday],
    pub filter: &'a FilterState,
}

#[derive(Debug, Serialize)]
pub struct PageJson<'a> {
    pub view: CalendarView,
    pub range: DateRange,
    pub days: Vec<DayJson<'a>>,
}

#[derive(Debug, Serialize)]
pub struct DayJson<'a> {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub holidays: Vec<&'a str>,
    pub events: Vec<&'a Event>,
}

impl<'a> CalendarPage<'a> {
    pub fn to_json(&self) -> PageJson<'a> {
        let range = visible_range(self.view, self.anchor);
        let days = range
            .days()
            .map(|date| DayJson {
                date,
                holidays: holidays_on(date, self.holidays)
                    .into_iter()
                    .map(|holiday| holiday.name.as_str())
                    .collect(),
                events: events_on(date, self.events),
            })
            .collect();
        PageJson {
            view: self.view,
            range,
            days,
        }
    }

    pub fn render(&self) -> String {
        let names: LabelNames<'_> = self
            .labels
            .iter()
            .map(|label| (label.id, label.name.as_str()))
            .collect();
        let mut out = String::new();
        self.render_sidebar(&mut out);
        out.push('\n');
        match self.view {
            CalendarView::Day => self.render_day(&mut out, &names),
            CalendarView::Week => self.render_week(&mut out, &names),
            CalendarView::Month => self.render_month(&mut out, &names),
        }
        out
    }

    fn render_sidebar(&self, out: &mut String) {
        let labels: Vec<String> = self
            .labels
            .iter()
            .map(|label| {
                let mark = checkbox(self.filter.is_label_checked(label.id));
                format!("{mark} {} #{}", label.name, label.id.0)
            })
            .collect();
        let groups: Vec<String> = self
            .groups
            .iter()
            .map(|group| {
                let mark = checkbox(self.filter.is_group_checked(group.id));
                format!("{mark} {} #{}", group.name, group.id.0)
            })
            .collect();
        let _ = writeln!(out, "Labels: {}", or_none(&labels));
        let _ = writeln!(out, "Groups: {}", or_none(&groups));
    }

    fn render_day(&self, out: &mut String, names: &LabelNames<'_>) {
        let _ = writeln!(out, "{}", self.anchor.format("%A %Y-%m-%d"));
        self.write_holidays(out, self.anchor, "  ");
        let placed = events_on(self.anchor, self.events);
        if placed.is_empty() {
            let _ = writeln!(out, "  (no events)");
        }
        for event in placed {
            let span = timeline_span(event);
            let _ = writeln!(
                out,
                "  {:02}:00-{:02}:00  {}",
                span.start_hour,
                span.end_hour,
                describe(event, names)
            );
        }
    }

    fn render_week(&self, out: &mut String, names: &LabelNames<'_>) {
        for day in visible_range(CalendarView::Week, self.anchor).days() {
            let _ = writeln!(out, "{}", day.format("%a %Y-%m-%d"));
            self.write_holidays(out, day, "  ");
            for event in events_on(day, self.events) {
                let _ = writeln!(
                    out,
                    "  {}  {}",
                    event.start.format("%H:%M"),
                    describe(event, names)
                );
            }
        }
    }

    fn render_month(&self, out: &mut String, names: &LabelNames<'_>) {
        let _ = writeln!(out, "{}", self.anchor.format("%B %Y"));
        let _ = writeln!(out, " Mo  Tu  We  Th  Fr  Sa  Su");
        let grid = month_grid(self.anchor);
        for row in &grid {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| {
                    if !cell.in_month {
                        return "   ".to_string();
                    }
                    let marker = if !holidays_on(cell.date, self.holidays).is_empty() {
                        '!'
                    } else if !events_on(cell.date, self.events).is_empty() {
                        '*'
                    } else {
                        ' '
                    };
                    format!("{:>2}{marker}", cell.date.day())
                })
                .collect();
            let _ = writeln!(out, "{}", cells.join(" ").trim_end());
        }

        for day in visible_range(CalendarView::Month, self.anchor).days() {
            let placed = events_on(day, self.events);
            let holidays = holidays_on(day, self.holidays);
            if placed.is_empty() && holidays.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{}", day.format("%a %d"));
            self.write_holidays(out, day, "  ");
            for event in placed {
                let _ = writeln!(
                    out,
                    "  {}  {}",
                    event.start.format("%H:%M"),
                    describe(event, names)
                );
            }
        }
    }

    fn write_holidays(&self, out: &mut String, day: NaiveDate, indent: &str) {
        for holiday in holidays_on(day, self.holidays) {
            let _ = writeln!(out, "{indent}holiday: {}", holiday.name);
        }
    }
}

type LabelNames<'a> = HashMap<LabelId, &'a str>;

fn describe(event: &Event, names: &LabelNames<'_>) -> String {
    let mut text = format!("{} #{}", event.title, event.id.0);
    if let Some(name) = event.label.and_then(|id| names.get(&id)) {
        let _ = write!(text, " [{name}]");
    }
    if let Some(location) = &event.location {
        let _ = write!(text, " @ {location}");
    }
    text
}

fn checkbox(checked: bool) -> &'static str {
    if checked {
        "[x]"
    } else {
        "[ ]"
    }
}

fn or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join("  ")
    }
}
