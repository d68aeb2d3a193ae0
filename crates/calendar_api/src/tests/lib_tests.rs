use super::*;

use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use shared::{
    domain::{EventId, LabelId},
    protocol::{EventDraft, GroupDraft, Invitee, LabelDraft, RegisterRequest},
    store::{AuthStore, EventStore},
};
use storage::Storage;

#[derive(Default)]
struct RecordingNotifier {
    invitations: Mutex<Vec<GroupInvitation>>,
    password_notices: Mutex<Vec<PasswordChanged>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_group_invitation(&self, invitation: &GroupInvitation) -> anyhow::Result<()> {
        self.invitations
            .lock()
            .expect("lock")
            .push(invitation.clone());
        Ok(())
    }

    async fn send_password_change_notification(
        &self,
        notice: &PasswordChanged,
    ) -> anyhow::Result<()> {
        self.password_notices
            .lock()
            .expect("lock")
            .push(notice.clone());
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_group_invitation(&self, _: &GroupInvitation) -> anyhow::Result<()> {
        bail!("smtp relay unreachable")
    }

    async fn send_password_change_notification(&self, _: &PasswordChanged) -> anyhow::Result<()> {
        bail!("smtp relay unreachable")
    }
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, day)
        .expect("date")
        .and_hms_opt(hour, 0, 0)
        .expect("time")
}

fn signup(first_name: &str) -> RegisterRequest {
    RegisterRequest {
        first_name: first_name.into(),
        last_name: "Smith".into(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        password: "secret".into(),
    }
}

async fn context(notifier: Arc<dyn Notifier>) -> ApiContext<Storage> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext::new(storage, notifier)
}

async fn signed_in(ctx: &ApiContext<Storage>, first_name: &str) -> Session {
    let request = signup(first_name);
    register(ctx, &request).await.expect("register");
    login(ctx, &request.email, &request.password)
        .await
        .expect("login")
}

async fn setup() -> (ApiContext<Storage>, Arc<RecordingNotifier>, Session, Session) {
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = context(notifier.clone()).await;
    let alice = signed_in(&ctx, "Alice").await;
    let bob = signed_in(&ctx, "Bob").await;
    (ctx, notifier, alice, bob)
}

fn draft(title: &str, label: Option<LabelId>) -> EventDraft {
    EventDraft {
        title: title.into(),
        start: Some(at(1, 9)),
        end: Some(at(1, 10)),
        label,
        ..EventDraft::default()
    }
}

fn titles(events: &[&shared::domain::Event]) -> Vec<String> {
    events.iter().map(|event| event.title.clone()).collect()
}

#[test]
fn hashes_password_as_base64_sha256() {
    assert_eq!(
        hash_password("password"),
        "XohImNooBHFR0OVvjcYpJ3NgPQ1qq73WKhHvch0VQtg="
    );
    assert_eq!(hash_password(""), "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
}

#[tokio::test]
async fn register_rejects_missing_fields_and_bad_email() {
    let (ctx, _, _, _) = setup().await;

    let mut request = signup("Carol");
    request.last_name = "  ".into();
    let err = register(&ctx, &request).await.expect_err("missing last name");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut request = signup("Carol");
    request.email = "carol.example.com".into();
    let err = register(&ctx, &request).await.expect_err("bad email");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn register_rejects_duplicate_email_ignoring_case() {
    let (ctx, _, _, _) = setup().await;
    let mut request = signup("Alice");
    request.email = " ALICE@example.com ".into();
    let err = register(&ctx, &request).await.expect_err("duplicate");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.message, "email already registered");
}

#[tokio::test]
async fn login_errors_are_identical_for_unknown_email_and_wrong_password() {
    let (ctx, _, _, _) = setup().await;
    let wrong_password = login(&ctx, "alice@example.com", "nope")
        .await
        .expect_err("wrong password");
    let unknown_email = login(&ctx, "nobody@example.com", "secret")
        .await
        .expect_err("unknown email");
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.code, ErrorCode::NotFound);

    let empty = login(&ctx, "", "secret").await.expect_err("empty email");
    assert_eq!(empty.code, ErrorCode::Validation);
}

#[tokio::test]
async fn session_carries_person_name() {
    let (_, _, alice, _) = setup().await;
    assert_eq!(alice.display_name(), "Alice Smith");
    assert_eq!(alice.user.email, "alice@example.com");
}

#[tokio::test]
async fn change_password_validates_and_notifies() {
    let (ctx, notifier, mut alice, _) = setup().await;

    let err = change_password(&ctx, &mut alice, "new", "other")
        .await
        .expect_err("mismatch");
    assert_eq!(err.code, ErrorCode::Validation);
    let err = change_password(&ctx, &mut alice, "", "")
        .await
        .expect_err("empty");
    assert_eq!(err.code, ErrorCode::Validation);

    change_password(&ctx, &mut alice, "new-secret", "new-secret")
        .await
        .expect("change");
    login(&ctx, "alice@example.com", "new-secret")
        .await
        .expect("login with new password");
    assert!(login(&ctx, "alice@example.com", "secret").await.is_err());

    let notices = notifier.password_notices.lock().expect("lock");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].recipient_email, "alice@example.com");
}

#[tokio::test]
async fn create_event_defaults_end_to_start_and_keeps_inverted_range() {
    let (ctx, _, alice, _) = setup().await;

    let event_id = create_event(
        &ctx,
        &alice,
        &EventDraft {
            title: "Dentist".into(),
            start: Some(at(1, 14)),
            ..EventDraft::default()
        },
    )
    .await
    .expect("event");
    let stored = ctx
        .store
        .find_event(event_id)
        .await
        .expect("lookup")
        .expect("event");
    assert_eq!(stored.end, stored.start);
    assert_eq!(stored.creator, alice.user_id());

    let backwards = create_event(
        &ctx,
        &alice,
        &EventDraft {
            title: "Backwards".into(),
            start: Some(at(1, 14)),
            end: Some(at(1, 13)),
            ..EventDraft::default()
        },
    )
    .await
    .expect("inverted range is accepted");
    let stored = ctx
        .store
        .find_event(backwards)
        .await
        .expect("lookup")
        .expect("event");
    assert_eq!(stored.end, at(1, 13));
    let span = visibility::layout::timeline_span(&stored);
    assert_eq!((span.start_hour, span.end_hour), (14, 15));

    let err = create_event(&ctx, &alice, &EventDraft::default())
        .await
        .expect_err("missing title");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn create_event_rejects_label_of_another_user() {
    let (ctx, _, alice, bob) = setup().await;
    let bobs_label = create_label(
        &ctx,
        &bob,
        &LabelDraft {
            name: "Private".into(),
            color: "black".into(),
            group: None,
        },
    )
    .await
    .expect("label");

    let err = create_event(&ctx, &alice, &draft("sneaky", Some(bobs_label)))
        .await
        .expect_err("foreign label");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn only_creator_can_delete_event() {
    let (ctx, _, alice, bob) = setup().await;
    let event_id = create_event(&ctx, &alice, &draft("mine", None))
        .await
        .expect("event");

    let err = delete_event(&ctx, &bob, event_id)
        .await
        .expect_err("not creator");
    assert_eq!(err.code, ErrorCode::Forbidden);

    delete_event(&ctx, &alice, event_id).await.expect("delete");
    let err = delete_event(&ctx, &alice, event_id)
        .await
        .expect_err("already gone");
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = delete_event(&ctx, &alice, EventId(9_999))
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn group_creator_is_admin_and_invitees_are_notified() {
    let (ctx, notifier, alice, bob) = setup().await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Climbing".into(),
            description: Some("Tuesday sessions".into()),
            invitees: vec![
                Invitee {
                    email: "Bob@Example.com".into(),
                    role: Role::Member,
                },
                Invitee {
                    email: "ghost@example.com".into(),
                    role: Role::Member,
                },
            ],
        },
    )
    .await
    .expect("group");

    assert_eq!(created.added, vec![bob.user_id()]);
    assert_eq!(created.unknown_emails, vec!["ghost@example.com".to_string()]);

    let members = list_members(&ctx, &bob, created.group_id)
        .await
        .expect("members");
    let admin = members
        .iter()
        .find(|member| member.user_id == alice.user_id())
        .expect("creator listed");
    assert_eq!(admin.role, Role::Admin);

    let invitations = notifier.invitations.lock().expect("lock");
    assert_eq!(invitations.len(), 1);
    assert_eq!(invitations[0].recipient_email, "bob@example.com");
    assert_eq!(invitations[0].recipient_name, "Bob Smith");
    assert_eq!(invitations[0].added_by, "Alice Smith");
    assert_eq!(invitations[0].group_name, "Climbing");
}

#[tokio::test]
async fn non_admins_cannot_add_members() {
    let (ctx, _, alice, bob) = setup().await;
    let carol = signed_in(&ctx, "Carol").await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Team".into(),
            description: None,
            invitees: vec![Invitee {
                email: "bob@example.com".into(),
                role: Role::Member,
            }],
        },
    )
    .await
    .expect("group");

    let err = add_member(&ctx, &bob, created.group_id, "carol@example.com", Role::Member)
        .await
        .expect_err("member cannot add");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = add_member(&ctx, &carol, created.group_id, "carol@example.com", Role::Member)
        .await
        .expect_err("outsider cannot add");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = add_member(&ctx, &alice, created.group_id, "nobody@example.com", Role::Member)
        .await
        .expect_err("unknown email");
    assert_eq!(err.code, ErrorCode::NotFound);

    let added = add_member(&ctx, &alice, created.group_id, "carol@example.com", Role::Admin)
        .await
        .expect("admin adds");
    assert_eq!(added, carol.user_id());
}

#[tokio::test]
async fn sole_admin_cannot_demote_themselves() {
    let (ctx, notifier, alice, bob) = setup().await;
    let group = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Team".into(),
            description: None,
            invitees: Vec::new(),
        },
    )
    .await
    .expect("group")
    .group_id;

    let err = add_member(&ctx, &alice, group, "alice@example.com", Role::Member)
        .await
        .expect_err("last admin");
    assert_eq!(err.code, ErrorCode::Validation);
    let err = add_member(&ctx, &alice, group, "alice@example.com", Role::Admin)
        .await
        .expect_err("already admin");
    assert_eq!(err.code, ErrorCode::Validation);

    add_member(&ctx, &alice, group, "bob@example.com", Role::Member)
        .await
        .expect("alice is still admin");
    let err = add_member(&ctx, &alice, group, "bob@example.com", Role::Member)
        .await
        .expect_err("already a member");
    assert_eq!(err.code, ErrorCode::Validation);

    add_member(&ctx, &alice, group, "bob@example.com", Role::Admin)
        .await
        .expect("promote bob");
    add_member(&ctx, &bob, group, "alice@example.com", Role::Member)
        .await
        .expect("another admin remains");

    let members = list_members(&ctx, &alice, group).await.expect("members");
    let roles: Vec<(UserId, Role)> = members
        .iter()
        .map(|member| (member.user_id, member.role))
        .collect();
    assert_eq!(
        roles,
        vec![(bob.user_id(), Role::Admin), (alice.user_id(), Role::Member)]
    );
    assert_eq!(notifier.invitations.lock().expect("lock").len(), 3);
}

#[tokio::test]
async fn repeated_invitees_are_enrolled_once() {
    let (ctx, notifier, alice, bob) = setup().await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Team".into(),
            description: None,
            invitees: vec![
                Invitee {
                    email: "bob@example.com".into(),
                    role: Role::Member,
                },
                Invitee {
                    email: " BOB@example.com ".into(),
                    role: Role::Admin,
                },
                Invitee {
                    email: "alice@example.com".into(),
                    role: Role::Member,
                },
            ],
        },
    )
    .await
    .expect("group");

    assert_eq!(created.added, vec![bob.user_id()]);
    let members = list_members(&ctx, &alice, created.group_id)
        .await
        .expect("members");
    assert_eq!(members.len(), 2);
    assert!(members
        .iter()
        .any(|member| member.user_id == alice.user_id() && member.role == Role::Admin));
    assert!(members
        .iter()
        .any(|member| member.user_id == bob.user_id() && member.role == Role::Member));
    assert_eq!(notifier.invitations.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn failing_notifier_does_not_fail_add_member() {
    let ctx = context(Arc::new(FailingNotifier)).await;
    let alice = signed_in(&ctx, "Alice").await;
    let bob = signed_in(&ctx, "Bob").await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Team".into(),
            description: None,
            invitees: Vec::new(),
        },
    )
    .await
    .expect("group");

    add_member(&ctx, &alice, created.group_id, "bob@example.com", Role::Member)
        .await
        .expect("member added despite notifier failure");
    let groups = list_groups(&ctx, &bob).await.expect("groups");
    assert_eq!(groups.len(), 1);

    let mut alice = alice;
    change_password(&ctx, &mut alice, "x", "x")
        .await
        .expect("password changed despite notifier failure");
}

#[tokio::test]
async fn outsiders_cannot_list_members_or_create_group_labels() {
    let (ctx, _, alice, bob) = setup().await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Private".into(),
            description: None,
            invitees: Vec::new(),
        },
    )
    .await
    .expect("group");

    let err = list_members(&ctx, &bob, created.group_id)
        .await
        .expect_err("outsider");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = create_label(
        &ctx,
        &bob,
        &LabelDraft {
            name: "Hijack".into(),
            color: "red".into(),
            group: Some(created.group_id),
        },
    )
    .await
    .expect_err("outsider label");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = create_label(
        &ctx,
        &alice,
        &LabelDraft {
            name: "".into(),
            color: "red".into(),
            group: None,
        },
    )
    .await
    .expect_err("missing name");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn group_labels_are_deleted_by_admins_only() {
    let (ctx, _, alice, bob) = setup().await;
    let created = create_group(
        &ctx,
        &alice,
        &GroupDraft {
            name: "Team".into(),
            description: None,
            invitees: vec![Invitee {
                email: "bob@example.com".into(),
                role: Role::Member,
            }],
        },
    )
    .await
    .expect("group");
    let label = create_label(
        &ctx,
        &bob,
        &LabelDraft {
            name: "Standup".into(),
            color: "blue".into(),
            group: Some(created.group_id),
        },
    )
    .await
    .expect("member creates group label");

    let err = delete_label(&ctx, &bob, label).await.expect_err("not admin");
    assert_eq!(err.code, ErrorCode::Forbidden);
    delete_label(&ctx, &alice, label).await.expect("admin deletes");
}

#[tokio::test]
async fn deleting_label_leaves_events_visible_unlabelled() {
    let (ctx, _, alice, bob) = setup().await;
    let label = create_label(
        &ctx,
        &alice,
        &LabelDraft {
            name: "Gym".into(),
            color: "green".into(),
            group: None,
        },
    )
    .await
    .expect("label");
    create_event(&ctx, &alice, &draft("workout", Some(label)))
        .await
        .expect("event");

    let err = delete_label(&ctx, &bob, label).await.expect_err("not owner");
    assert_eq!(err.code, ErrorCode::Forbidden);

    delete_label(&ctx, &alice, label).await.expect("delete");
    let snapshot = load_calendar(&ctx, &alice).await.expect("snapshot");
    let filter = default_filter(&snapshot);
    let visible = visible_events(&alice, &snapshot, &filter);
    assert_eq!(titles(&visible), vec!["workout"]);
    assert_eq!(visible[0].label, None);
}

#[tokio::test]
async fn calendar_scenarios_resolve_through_the_snapshot() {
    let (ctx, _, u, v) = setup().await;
    let group = create_group(
        &ctx,
        &u,
        &GroupDraft {
            name: "G".into(),
            description: None,
            invitees: vec![Invitee {
                email: v.user.email.clone(),
                role: Role::Member,
            }],
        },
    )
    .await
    .expect("group")
    .group_id;
    let label = create_label(
        &ctx,
        &u,
        &LabelDraft {
            name: "L".into(),
            color: "red".into(),
            group: None,
        },
    )
    .await
    .expect("label");

    create_event(&ctx, &u, &draft("A", None)).await.expect("A");
    create_event(&ctx, &u, &draft("B", Some(label)))
        .await
        .expect("B");
    create_event(&ctx, &v, &draft("C", None)).await.expect("C");

    let snapshot = load_calendar(&ctx, &u).await.expect("snapshot");
    assert!(snapshot.memberships.is_member(group, v.user_id()));

    let mut filter = default_filter(&snapshot);
    assert_eq!(
        titles(&visible_events(&u, &snapshot, &filter)),
        vec!["A", "B", "C"]
    );

    filter.toggle_label(label);
    assert_eq!(
        titles(&visible_events(&u, &snapshot, &filter)),
        vec!["A", "C"]
    );

    filter.toggle_group(group);
    assert_eq!(titles(&visible_events(&u, &snapshot, &filter)), vec!["A"]);

    filter.toggle_group(group);
    filter.toggle_label(label);
    assert_eq!(
        titles(&visible_events(&u, &snapshot, &filter)),
        vec!["A", "B", "C"]
    );
}

#[tokio::test]
async fn holidays_validate_dates() {
    let (ctx, _, alice, _) = setup().await;
    add_holiday(&ctx, "Leap day", 2, 29).await.expect("feb 29");
    let err = add_holiday(&ctx, "Nope", 2, 30)
        .await
        .expect_err("feb 30");
    assert_eq!(err.code, ErrorCode::Validation);

    let snapshot = load_calendar(&ctx, &alice).await.expect("snapshot");
    assert_eq!(snapshot.holidays.len(), 1);
    assert_eq!(list_holidays(&ctx).await.expect("holidays").len(), 1);
}

#[tokio::test]
async fn registered_user_is_linked_to_a_person() {
    let (ctx, _, alice, _) = setup().await;
    let user = ctx
        .store
        .find_user_by_email("alice@example.com")
        .await
        .expect("lookup")
        .expect("user");
    assert_eq!(user.id, alice.user_id());
    assert!(user.person_id.is_some());
    assert_eq!(user.password_hash, hash_password("secret"));
}
