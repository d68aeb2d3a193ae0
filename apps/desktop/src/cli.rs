use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use shared::{domain::Role, protocol::Invitee};
use visibility::layout::CalendarView;

#[derive(Parser, Debug)]
#[command(name = "calendar", about = "Shared calendar with personal and group labels")]
pub struct Cli {
    /// Overrides the configured database url.
    #[arg(long, global = true)]
    pub database_url: Option<String>,
    #[arg(long, global = true)]
    pub email: Option<String>,
    #[arg(long, global = true)]
    pub password: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Creates an account for --email / --password.
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    Show(ShowArgs),
    #[command(subcommand)]
    Event(EventCommand),
    #[command(subcommand)]
    Label(LabelCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    /// Changes the password of the signed-in user.
    Password {
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
    #[command(subcommand)]
    Holiday(HolidayCommand),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[arg(long, default_value = "month")]
    pub view: CalendarView,
    /// Any day inside the period to show; defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Label name or id to uncheck. Repeatable.
    #[arg(long = "hide-label")]
    pub hide_labels: Vec<String>,
    /// Group name or id to uncheck. Repeatable.
    #[arg(long = "hide-group")]
    pub hide_groups: Vec<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, value_parser = parse_datetime)]
        start: NaiveDateTime,
        #[arg(long, value_parser = parse_datetime)]
        end: Option<NaiveDateTime>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        label: Option<i64>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum LabelCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        color: String,
        /// Shares the label with this group.
        #[arg(long)]
        group: Option<i64>,
    },
    Delete {
        id: i64,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// `email` or `email:admin`. Repeatable.
        #[arg(long = "invite", value_parser = parse_invitee)]
        invitees: Vec<Invitee>,
    },
    AddMember {
        #[arg(long)]
        group: i64,
        #[arg(long)]
        member: String,
        #[arg(long, default_value = "member", value_parser = parse_role)]
        role: Role,
    },
    Members {
        #[arg(long)]
        group: i64,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum HolidayCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        day: u32,
    },
    List,
}

pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("expected 'YYYY-MM-DD HH:MM', got '{raw}'"))
}

pub fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(Role::Admin),
        "member" => Ok(Role::Member),
        other => Err(format!("unknown role '{other}', expected admin or member")),
    }
}

pub fn parse_invitee(raw: &str) -> Result<Invitee, String> {
    let (email, role) = match raw.rsplit_once(':') {
        Some((email, role)) => (email, parse_role(role)?),
        None => (raw, Role::Member),
    };
    if email.trim().is_empty() {
        return Err("invitee email is empty".into());
    }
    Ok(Invitee {
        email: email.trim().to_string(),
        role,
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_show_with_filters() {
        let cli = Cli::try_parse_from([
            "calendar",
            "--email",
            "u@example.com",
            "show",
            "--view",
            "week",
            "--date",
            "2025-06-04",
            "--hide-label",
            "Gym",
            "--hide-group",
            "3",
        ])
        .expect("parse");
        let Command::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.view, CalendarView::Week);
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2025, 6, 4));
        assert_eq!(args.hide_labels, vec!["Gym".to_string()]);
        assert_eq!(args.hide_groups, vec!["3".to_string()]);
        assert_eq!(cli.email.as_deref(), Some("u@example.com"));
    }

    #[test]
    fn parses_datetimes_with_and_without_time() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1)
            .and_then(|day| day.and_hms_opt(14, 30, 0))
            .expect("datetime");
        assert_eq!(parse_datetime("2025-06-01 14:30"), Ok(expected));
        assert_eq!(parse_datetime("2025-06-01T14:30"), Ok(expected));
        assert_eq!(
            parse_datetime("2025-06-01").map(|dt| dt.date()),
            Ok(expected.date())
        );
        assert!(parse_datetime("tomorrow").is_err());
    }

    #[test]
    fn parses_invitees_with_optional_role() {
        let plain = parse_invitee("bob@example.com").expect("plain");
        assert_eq!(plain.email, "bob@example.com");
        assert_eq!(plain.role, Role::Member);

        let admin = parse_invitee("carol@example.com:admin").expect("admin");
        assert_eq!(admin.role, Role::Admin);

        assert!(parse_invitee("dave@example.com:owner").is_err());
    }
}
