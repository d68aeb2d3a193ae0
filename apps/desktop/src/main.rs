use std::{process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use calendar_api::{
    add_holiday, add_member, change_password, create_event, create_group, create_label,
    default_filter, delete_event, delete_label, list_groups, list_holidays, list_labels,
    list_members, load_calendar, login, register, visible_events, ApiContext, Session,
    TracingNotifier,
};
use chrono::Local;
use clap::Parser;
use shared::{
    domain::{EventId, Group, GroupId, Label, LabelId},
    error::{ApiError, ApiException},
    protocol::{EventDraft, GroupDraft, LabelDraft, RegisterRequest},
};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod render;

use cli::{Cli, Command, EventCommand, GroupCommand, HolidayCommand, LabelCommand, ShowArgs};
use config::{load_settings, normalize_database_url};
use render::CalendarPage;

type Api = ApiContext<Storage>;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, settings: config::Settings) -> Result<()> {
    let raw_url = cli.database_url.as_deref().unwrap_or(&settings.database_url);
    let database_url = normalize_database_url(raw_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let ctx = ApiContext::new(storage, Arc::new(TracingNotifier::new(settings.mail_from)));
    info!(%database_url, "calendar store ready");

    match cli.command {
        Command::Register {
            first_name,
            last_name,
        } => {
            let (email, password) = credentials(&cli.email, &cli.password)?;
            let request = RegisterRequest {
                first_name,
                last_name,
                email,
                password,
            };
            let user_id = register(&ctx, &request).await.map_err(api)?;
            println!("registered user_id={}", user_id.0);
        }
        Command::Show(args) => {
            let session = sign_in(&ctx, &cli.email, &cli.password).await?;
            show(&ctx, &session, args).await?;
        }
        Command::Event(command) => {
            let session = sign_in(&ctx, &cli.email, &cli.password).await?;
            event_command(&ctx, &session, command).await?;
        }
        Command::Label(command) => {
            let session = sign_in(&ctx, &cli.email, &cli.password).await?;
            label_command(&ctx, &session, command).await?;
        }
        Command::Group(command) => {
            let session = sign_in(&ctx, &cli.email, &cli.password).await?;
            group_command(&ctx, &session, command).await?;
        }
        Command::Password { new, confirm } => {
            let mut session = sign_in(&ctx, &cli.email, &cli.password).await?;
            change_password(&ctx, &mut session, &new, &confirm)
                .await
                .map_err(api)?;
            println!("password changed");
        }
        Command::Holiday(HolidayCommand::Add { name, month, day }) => {
            let holiday_id = add_holiday(&ctx, &name, month, day).await.map_err(api)?;
            println!("created holiday_id={}", holiday_id.0);
        }
        Command::Holiday(HolidayCommand::List) => {
            for holiday in list_holidays(&ctx).await.map_err(api)? {
                println!("{:02}-{:02}  {}", holiday.month, holiday.day, holiday.name);
            }
        }
    }

    Ok(())
}

async fn show(ctx: &Api, session: &Session, args: ShowArgs) -> Result<()> {
    let snapshot = load_calendar(ctx, session).await.map_err(api)?;
    let mut filter = default_filter(&snapshot);
    for raw in &args.hide_labels {
        let label_id = find_label(&snapshot.labels, raw)?;
        filter.set_label(label_id, false);
    }
    for raw in &args.hide_groups {
        let group_id = find_group(&snapshot.groups, raw)?;
        filter.set_group(group_id, false);
    }

    let visible = visible_events(session, &snapshot, &filter);
    let page = CalendarPage {
        view: args.view,
        anchor: args.date.unwrap_or_else(|| Local::now().date_naive()),
        events: &visible,
        labels: &snapshot.labels,
        groups: &snapshot.groups,
        holidays: &snapshot.holidays,
        filter: &filter,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page.to_json())?);
    } else {
        println!("Signed in as {}", session.display_name());
        print!("{}", page.render());
    }
    Ok(())
}

async fn event_command(ctx: &Api, session: &Session, command: EventCommand) -> Result<()> {
    match command {
        EventCommand::Add {
            title,
            start,
            end,
            description,
            location,
            label,
        } => {
            let draft = EventDraft {
                title,
                description,
                start: Some(start),
                end,
                location,
                label: label.map(LabelId),
            };
            let event_id = create_event(ctx, session, &draft).await.map_err(api)?;
            println!("created event_id={}", event_id.0);
        }
        EventCommand::Delete { id } => {
            delete_event(ctx, session, EventId(id)).await.map_err(api)?;
            println!("deleted event_id={id}");
        }
    }
    Ok(())
}

async fn label_command(ctx: &Api, session: &Session, command: LabelCommand) -> Result<()> {
    match command {
        LabelCommand::Add { name, color, group } => {
            let draft = LabelDraft {
                name,
                color,
                group: group.map(GroupId),
            };
            let label_id = create_label(ctx, session, &draft).await.map_err(api)?;
            println!("created label_id={}", label_id.0);
        }
        LabelCommand::Delete { id } => {
            delete_label(ctx, session, LabelId(id)).await.map_err(api)?;
            println!("deleted label_id={id}");
        }
        LabelCommand::List => {
            for label in list_labels(ctx, session).await.map_err(api)? {
                let scope = match label.owning_group {
                    Some(group_id) => format!("group #{}", group_id.0),
                    None => "personal".to_string(),
                };
                println!("#{}  {}  ({}, {scope})", label.id.0, label.name, label.color);
            }
        }
    }
    Ok(())
}

async fn group_command(ctx: &Api, session: &Session, command: GroupCommand) -> Result<()> {
    match command {
        GroupCommand::Create {
            name,
            description,
            invitees,
        } => {
            let draft = GroupDraft {
                name,
                description,
                invitees,
            };
            let created = create_group(ctx, session, &draft).await.map_err(api)?;
            println!(
                "created group_id={} with {} invited member(s)",
                created.group_id.0,
                created.added.len()
            );
            for email in &created.unknown_emails {
                println!("skipped unregistered invitee {email}");
            }
        }
        GroupCommand::AddMember {
            group,
            member,
            role,
        } => {
            let user_id = add_member(ctx, session, GroupId(group), &member, role)
                .await
                .map_err(api)?;
            println!("added user_id={} as {}", user_id.0, role.as_str());
        }
        GroupCommand::Members { group } => {
            for member in list_members(ctx, session, GroupId(group))
                .await
                .map_err(api)?
            {
                let name = member.display_name.as_deref().unwrap_or("-");
                println!("{:<6} {}  {name}", member.role.as_str(), member.email);
            }
        }
        GroupCommand::List => {
            for group in list_groups(ctx, session).await.map_err(api)? {
                let description = group.description.as_deref().unwrap_or("");
                println!("#{}  {}  {description}", group.id.0, group.name);
            }
        }
    }
    Ok(())
}

async fn sign_in(
    ctx: &Api,
    email: &Option<String>,
    password: &Option<String>,
) -> Result<Session> {
    let (email, password) = credentials(email, password)?;
    let session = login(ctx, &email, &password).await.map_err(api)?;
    info!(user_id = session.user_id().0, "signed in");
    Ok(session)
}

fn credentials(email: &Option<String>, password: &Option<String>) -> Result<(String, String)> {
    let email = email.clone().context("--email is required")?;
    let password = password.clone().context("--password is required")?;
    Ok((email, password))
}

fn api(err: ApiError) -> anyhow::Error {
    ApiException::from(err).into()
}

/// Matches a label by numeric id first, then by case-insensitive name.
fn find_label(labels: &[Label], raw: &str) -> Result<LabelId> {
    let raw = raw.trim();
    if let Some(label) = raw
        .parse::<i64>()
        .ok()
        .and_then(|id| labels.iter().find(|label| label.id.0 == id))
    {
        return Ok(label.id);
    }
    match labels
        .iter()
        .find(|label| label.name.eq_ignore_ascii_case(raw))
    {
        Some(label) => Ok(label.id),
        None => bail!("no label named '{raw}'"),
    }
}

fn find_group(groups: &[Group], raw: &str) -> Result<GroupId> {
    let raw = raw.trim();
    if let Some(group) = raw
        .parse::<i64>()
        .ok()
        .and_then(|id| groups.iter().find(|group| group.id.0 == id))
    {
        return Ok(group.id);
    }
    match groups
        .iter()
        .find(|group| group.name.eq_ignore_ascii_case(raw))
    {
        Some(group) => Ok(group.id),
        None => bail!("no group named '{raw}'"),
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
