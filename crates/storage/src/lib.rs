use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{
        Event, EventId, Group, GroupId, Holiday, HolidayId, Label, LabelId, Member, Person,
        PersonId, Role, User, UserId,
    },
    protocol::{LabelDraft, NewEvent, NewPerson},
    store::{AuthStore, EventStore, GroupStore, HolidayStore, LabelStore},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

const EVENT_COLUMNS: &str =
    "e.id, e.title, e.description, e.starts_at, e.ends_at, e.location, e.creator_id, e.label_id";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Ids of users who are recorded as share targets of an event.
    pub async fn list_event_shares(&self, event_id: EventId) -> Result<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT user_id FROM event_shares WHERE event_id = ? ORDER BY user_id ASC",
        )
        .bind(event_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserId(r.get::<i64, _>(0)))
            .collect())
    }
}

fn event_from_row(r: &SqliteRow) -> Event {
    Event {
        id: EventId(r.get::<i64, _>(0)),
        title: r.get::<String, _>(1),
        description: r.get::<Option<String>, _>(2),
        start: r.get::<NaiveDateTime, _>(3),
        end: r.get::<NaiveDateTime, _>(4),
        location: r.get::<Option<String>, _>(5),
        creator: UserId(r.get::<i64, _>(6)),
        label: r.get::<Option<i64>, _>(7).map(LabelId),
    }
}

fn label_from_row(r: &SqliteRow) -> Label {
    Label {
        id: LabelId(r.get::<i64, _>(0)),
        name: r.get::<String, _>(1),
        color: r.get::<String, _>(2),
        owning_group: r.get::<Option<i64>, _>(3).map(GroupId),
    }
}

fn user_from_row(r: &SqliteRow) -> User {
    User {
        id: UserId(r.get::<i64, _>(0)),
        person_id: r.get::<Option<i64>, _>(1).map(PersonId),
        email: r.get::<String, _>(2),
        password_hash: r.get::<String, _>(3),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl EventStore for Storage {
    async fn find_visible_candidates(&self, user_id: UserId) -> Result<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e
            WHERE e.creator_id = ?1
               OR EXISTS (
                    SELECT 1 FROM event_shares s
                    WHERE s.event_id = e.id AND s.user_id = ?1)
               OR EXISTS (
                    SELECT 1 FROM label_users lu
                    WHERE lu.label_id = e.label_id AND lu.user_id = ?1)
               OR EXISTS (
                    SELECT 1 FROM labels l
                    INNER JOIN group_members gm ON gm.group_id = l.group_id
                    WHERE l.id = e.label_id AND gm.user_id = ?1)
               OR EXISTS (
                    SELECT 1 FROM group_members mine
                    INNER JOIN group_members theirs ON theirs.group_id = mine.group_id
                    WHERE mine.user_id = ?1 AND theirs.user_id = e.creator_id)
            ORDER BY e.starts_at ASC, e.id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .context("failed to load candidate events")?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn save_event(&self, event: &NewEvent) -> Result<EventId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO events (title, description, starts_at, ends_at, location, creator_id, label_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&event.title)
        .bind(event.description.as_deref())
        .bind(event.start)
        .bind(event.end)
        .bind(event.location.as_deref())
        .bind(event.creator.0)
        .bind(event.label.map(|id| id.0))
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert event")?;
        let event_id = EventId(rec.get::<i64, _>(0));

        // Events tagged with a group label are shared with the rest of the group.
        if let Some(label_id) = event.label {
            let share_count = sqlx::query(
                "INSERT OR IGNORE INTO event_shares (event_id, user_id)
                 SELECT ?1, gm.user_id
                 FROM labels l
                 INNER JOIN group_members gm ON gm.group_id = l.group_id
                 WHERE l.id = ?2 AND gm.user_id != ?3",
            )
            .bind(event_id.0)
            .bind(label_id.0)
            .bind(event.creator.0)
            .execute(&mut *tx)
            .await
            .context("failed to share event with group members")?
            .rows_affected();
            debug!(event_id = event_id.0, share_count, "event shares recorded");
        }

        tx.commit().await?;
        Ok(event_id)
    }

    async fn find_event(&self, event_id: EventId) -> Result<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = ?");
        let row = sqlx::query(&sql)
            .bind(event_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn delete_event(&self, event_id: EventId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(event_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}

#[async_trait]
impl LabelStore for Storage {
    async fn find_labels_for_user(&self, user_id: UserId) -> Result<Vec<Label>> {
        let rows = sqlx::query(
            "SELECT l.id, l.name, l.color, l.group_id
             FROM labels l
             WHERE EXISTS (
                     SELECT 1 FROM label_users lu
                     WHERE lu.label_id = l.id AND lu.user_id = ?1)
                OR EXISTS (
                     SELECT 1 FROM group_members gm
                     WHERE gm.group_id = l.group_id AND gm.user_id = ?1)
             ORDER BY lower(l.name) ASC, l.id ASC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load labels")?;
        Ok(rows.iter().map(label_from_row).collect())
    }

    async fn save_label(&self, draft: &LabelDraft, user_id: UserId) -> Result<LabelId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query("INSERT INTO labels (name, color, group_id) VALUES (?, ?, ?) RETURNING id")
            .bind(&draft.name)
            .bind(&draft.color)
            .bind(draft.group.map(|id| id.0))
            .fetch_one(&mut *tx)
            .await
            .context("failed to insert label")?;
        let label_id = LabelId(rec.get::<i64, _>(0));

        if draft.group.is_none() {
            sqlx::query("INSERT INTO label_users (label_id, user_id) VALUES (?, ?)")
                .bind(label_id.0)
                .bind(user_id.0)
                .execute(&mut *tx)
                .await
                .context("failed to link personal label")?;
        }

        tx.commit().await?;
        Ok(label_id)
    }

    async fn find_label(&self, label_id: LabelId) -> Result<Option<Label>> {
        let row = sqlx::query("SELECT id, name, color, group_id FROM labels WHERE id = ?")
            .bind(label_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(label_from_row))
    }

    async fn label_owner(&self, label_id: LabelId) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "SELECT lu.user_id
             FROM label_users lu
             INNER JOIN labels l ON l.id = lu.label_id
             WHERE lu.label_id = ? AND l.group_id IS NULL
             ORDER BY lu.user_id ASC
             LIMIT 1",
        )
        .bind(label_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserId(r.get::<i64, _>(0))))
    }

    async fn delete_label(&self, label_id: LabelId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM labels WHERE id = ?")
            .bind(label_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}

#[async_trait]
impl GroupStore for Storage {
    async fn find_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name, g.description
             FROM calendar_groups g
             INNER JOIN group_members gm ON gm.group_id = g.id
             WHERE gm.user_id = ?
             ORDER BY lower(g.name) ASC, g.id ASC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load groups")?;
        Ok(rows
            .into_iter()
            .map(|r| Group {
                id: GroupId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                description: r.get::<Option<String>, _>(2),
            })
            .collect())
    }

    async fn find_group(&self, group_id: GroupId) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name, description FROM calendar_groups WHERE id = ?")
            .bind(group_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Group {
            id: GroupId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            description: r.get::<Option<String>, _>(2),
        }))
    }

    async fn find_member_ids(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id ASC",
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserId(r.get::<i64, _>(0)))
            .collect())
    }

    async fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            "SELECT u.id, u.email, p.first_name, p.last_name, gm.role
             FROM group_members gm
             INNER JOIN users u ON u.id = gm.user_id
             LEFT JOIN persons p ON p.id = u.person_id
             WHERE gm.group_id = ?
             ORDER BY gm.role ASC, lower(u.email) ASC",
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let display_name = match (
                    r.get::<Option<String>, _>(2),
                    r.get::<Option<String>, _>(3),
                ) {
                    (Some(first), Some(last)) => Some(format!("{first} {last}").trim().to_string()),
                    (Some(first), None) => Some(first),
                    _ => None,
                };
                Member {
                    user_id: UserId(r.get::<i64, _>(0)),
                    email: r.get::<String, _>(1),
                    display_name,
                    role: Role::from_db(&r.get::<String, _>(4)),
                }
            })
            .collect())
    }

    async fn membership_role(&self, group_id: GroupId, user_id: UserId) -> Result<Option<Role>> {
        let row = sqlx::query("SELECT role FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Role::from_db(&r.get::<String, _>(0))))
    }

    async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        creator: UserId,
        members: &[(UserId, Role)],
    ) -> Result<GroupId> {
        let mut tx = self.pool.begin().await?;
        let rec =
            sqlx::query("INSERT INTO calendar_groups (name, description) VALUES (?, ?) RETURNING id")
                .bind(name)
                .bind(description)
                .fetch_one(&mut *tx)
                .await
                .context("failed to insert group")?;
        let group_id = GroupId(rec.get::<i64, _>(0));

        sqlx::query("INSERT INTO group_members (group_id, user_id, role) VALUES (?, ?, ?)")
            .bind(group_id.0)
            .bind(creator.0)
            .bind(Role::Admin.as_str())
            .execute(&mut *tx)
            .await
            .context("failed to enrol group creator")?;

        for (user_id, role) in members {
            sqlx::query(
                "INSERT INTO group_members (group_id, user_id, role)
                 VALUES (?, ?, ?)
                 ON CONFLICT(group_id, user_id) DO NOTHING",
            )
            .bind(group_id.0)
            .bind(user_id.0)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to enrol user {} in new group", user_id.0))?;
        }

        tx.commit().await?;
        debug!(group_id = group_id.0, invited = members.len(), "group created");
        Ok(group_id)
    }

    async fn add_member(&self, group_id: GroupId, user_id: UserId, role: Role) -> Result<()> {
        sqlx::query(
            "INSERT INTO group_members (group_id, user_id, role)
             VALUES (?, ?, ?)
             ON CONFLICT(group_id, user_id) DO UPDATE SET role=excluded.role",
        )
        .bind(group_id.0)
        .bind(user_id.0)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .context("failed to add group member")?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for Storage {
    async fn authenticate(&self, email: &str, password_hash: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, person_id, email, password_hash
             FROM users
             WHERE email = ? AND password_hash = ?",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn register(
        &self,
        person: &NewPerson,
        email: &str,
        password_hash: &str,
    ) -> Result<UserId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query("INSERT INTO persons (first_name, last_name) VALUES (?, ?) RETURNING id")
            .bind(&person.first_name)
            .bind(&person.last_name)
            .fetch_one(&mut *tx)
            .await
            .context("failed to insert person")?;
        let person_id = rec.get::<i64, _>(0);

        let rec = sqlx::query(
            "INSERT INTO users (person_id, email, password_hash) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(person_id)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert user")?;
        let user_id = UserId(rec.get::<i64, _>(0));

        tx.commit().await?;
        Ok(user_id)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, person_id, email, password_hash FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_person(&self, person_id: PersonId) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT id, first_name, last_name, created_on FROM persons WHERE id = ?")
            .bind(person_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Person {
            id: PersonId(r.get::<i64, _>(0)),
            first_name: r.get::<String, _>(1),
            last_name: r.get::<String, _>(2),
            created_on: r.get::<NaiveDate, _>(3),
        }))
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(password_hash)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        anyhow::ensure!(updated == 1, "no user row for id {}", user_id.0);
        Ok(())
    }
}

#[async_trait]
impl HolidayStore for Storage {
    async fn list_holidays(&self) -> Result<Vec<Holiday>> {
        let rows = sqlx::query("SELECT id, name, month, day FROM holidays ORDER BY month ASC, day ASC")
            .fetch_all(&self.pool)
            .await
            .context("failed to load holidays")?;
        Ok(rows
            .into_iter()
            .map(|r| Holiday {
                id: HolidayId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                month: u32::try_from(r.get::<i64, _>(2)).unwrap_or_default(),
                day: u32::try_from(r.get::<i64, _>(3)).unwrap_or_default(),
            })
            .collect())
    }

    async fn add_holiday(&self, name: &str, month: u32, day: u32) -> Result<HolidayId> {
        let rec = sqlx::query("INSERT INTO holidays (name, month, day) VALUES (?, ?, ?) RETURNING id")
            .bind(name)
            .bind(i64::from(month))
            .bind(i64::from(day))
            .fetch_one(&self.pool)
            .await
            .context("failed to insert holiday")?;
        Ok(HolidayId(rec.get::<i64, _>(0)))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
