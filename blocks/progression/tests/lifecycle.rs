use chrono::{DateTime, Duration, TimeZone, Utc};
use progression_block::{delete_account, reset_weekly_xp, DeletionStep};
use taskgo_atoms::social::{self, InviteResponse};
use taskgo_atoms::store::{keys, Collection, DocumentStore, MemoryStore};
use taskgo_atoms::tasks::{self, CreateTaskPayload};
use taskgo_atoms::users::{self, SignUpPayload};
use taskgo_atoms::WeekBoundary;

fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()
}

fn monday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap()
}

async fn register(store: &MemoryStore, user_id: &str, username: &str) {
    users::sign_up(
        store,
        wednesday(),
        WeekBoundary::default(),
        user_id,
        SignUpPayload {
            email: format!("{}@example.com", username),
            username: username.to_string(),
            display_name: None,
        },
    )
    .await
    .unwrap();
}

async fn join(store: &MemoryStore, host: &str, group_id: &str, username: &str, user_id: &str) {
    let invite = social::invite(store, wednesday(), host, group_id, username).await.unwrap();
    social::respond_to_invite(store, wednesday(), user_id, &invite.invite_id, InviteResponse::Accept)
        .await
        .unwrap();
}

async fn award(store: &MemoryStore, user_id: &str, task_id: &str, xp: u64) {
    let outcome = users::commit_xp_award(store, wednesday(), WeekBoundary::default(), user_id, task_id, xp)
        .await
        .unwrap();
    if let users::AwardOutcome::Committed(profile) = outcome {
        social::sync_member_mirrors(store, &profile).await.unwrap();
    }
}

#[tokio::test]
async fn weekly_sweep_zeroes_profiles_and_mirrors_once() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    register(&store, "u1", "amy").await;
    register(&store, "u2", "bo").await;
    let group = social::create_group(&store, wednesday(), "u1", "Crew").await.unwrap();
    join(&store, "u1", &group.group_id, "bo", "u2").await;
    award(&store, "u1", "t1", 40).await;
    award(&store, "u2", "t2", 15).await;

    let early = reset_weekly_xp(&store, week, wednesday()).await.unwrap();
    assert!(early.users_reset.is_empty());
    assert_eq!(early.users_skipped, 2);

    let sweep = reset_weekly_xp(&store, week, monday()).await.unwrap();
    assert_eq!(sweep.users_reset.len(), 2);
    assert!(sweep.failures.is_empty());
    assert!(sweep.mirror_failures.is_empty());

    let amy = users::get_profile(&store, "u1").await.unwrap();
    assert_eq!((amy.weekly_xp, amy.total_xp, amy.level), (0, 40, 3));
    assert_eq!(amy.weekly_xp_reset_date, monday() + Duration::weeks(1));
    let board = social::leaderboard(&store, "u2", &group.group_id).await.unwrap();
    assert!(board.iter().all(|e| e.weekly_xp == 0 && e.rank == 1));

    // a second delivery in the same week changes nothing
    let again = reset_weekly_xp(&store, week, monday() + Duration::hours(1)).await.unwrap();
    assert!(again.users_reset.is_empty());
    assert_eq!(again.users_skipped, 2);
    assert_eq!(users::get_profile(&store, "u1").await.unwrap(), amy);
}

#[tokio::test(start_paused = true)]
async fn sweep_reports_mirror_failures_without_undoing_the_reset() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    register(&store, "u1", "amy").await;
    social::create_group(&store, wednesday(), "u1", "Crew").await.unwrap();
    award(&store, "u1", "t1", 12).await;

    store.fail_writes_to(Collection::Members, 5);
    let sweep = reset_weekly_xp(&store, week, monday()).await.unwrap();
    assert_eq!(sweep.users_reset, ["u1".to_string()]);
    assert_eq!(sweep.mirror_failures.len(), 1);
    assert_eq!(users::get_profile(&store, "u1").await.unwrap().weekly_xp, 0);
}

#[tokio::test]
async fn deleting_an_account_removes_every_trace() {
    let store = MemoryStore::new();
    register(&store, "u1", "amy").await;
    register(&store, "u2", "bo").await;

    let hosted = social::create_group(&store, wednesday(), "u1", "Amy's").await.unwrap();
    join(&store, "u1", &hosted.group_id, "bo", "u2").await;
    let joined = social::create_group(&store, wednesday(), "u2", "Bo's").await.unwrap();
    join(&store, "u2", &joined.group_id, "amy", "u1").await;
    let pending = social::create_group(&store, wednesday(), "u2", "Later").await.unwrap();
    social::invite(&store, wednesday(), "u2", &pending.group_id, "amy").await.unwrap();

    let default_group = tasks::list_groups(&store, "u1").await.unwrap()[0].group_id.clone();
    tasks::create_task(
        &store,
        wednesday(),
        "u1",
        &default_group,
        CreateTaskPayload {
            name: "Pack".to_string(),
            description: None,
            time_estimate: 600,
        },
    )
    .await
    .unwrap();
    award(&store, "u1", "t1", 20).await;

    let report = delete_account(&store, "u1").await;
    assert!(report.is_complete(), "failed steps: {:?}", report.failed_steps());

    assert_eq!(users::lookup(&store, "amy").await.unwrap(), None);
    assert!(users::is_available(&store, "amy").await.unwrap());
    assert!(store.get(&keys::user("u1")).await.unwrap().is_none());

    // hosted group is gone, including the other member's index entry
    assert!(social::get_group(&store, &hosted.group_id).await.is_err());
    assert!(social::list_members(&store, &hosted.group_id).await.unwrap().is_empty());
    assert!(social::list_user_groups(&store, "u2")
        .await
        .unwrap()
        .iter()
        .all(|m| m.group_id != hosted.group_id));
    // left the group hosted by someone else
    assert_eq!(social::list_members(&store, &joined.group_id).await.unwrap().len(), 1);

    let leftovers: Vec<String> = store
        .keys()
        .into_iter()
        .filter(|k| {
            k.id == "u1"
                || k.path
                    .parent
                    .as_ref()
                    .is_some_and(|(_, parent_id)| parent_id == "u1")
        })
        .map(|k| k.to_string())
        .collect();
    assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);

    // bo is untouched
    assert_eq!(users::get_profile(&store, "u2").await.unwrap().username, "bo");
}

#[tokio::test]
async fn deletion_is_safe_to_repeat() {
    let store = MemoryStore::new();
    register(&store, "u1", "amy").await;

    let first = delete_account(&store, "u1").await;
    assert!(first.is_complete());
    let profile_step = first.steps.iter().find(|s| s.step == DeletionStep::Profile).unwrap();
    assert_eq!(profile_step.removed, 1);

    let second = delete_account(&store, "u1").await;
    assert!(second.is_complete());
    assert!(second.steps.iter().all(|s| s.removed == 0));
}

#[tokio::test]
async fn a_reclaimed_name_survives_the_old_owners_deletion() {
    let store = MemoryStore::new();
    register(&store, "u1", "amy").await;

    // the registry entry now belongs to someone else; only u1's index remains
    store.delete(&keys::username("amy")).await.unwrap();
    users::claim_username(&store, wednesday(), "u2", "amy").await.unwrap();

    let report = delete_account(&store, "u1").await;
    assert!(report.is_complete());
    assert_eq!(users::lookup(&store, "amy").await.unwrap(), Some("u2".to_string()));
    assert!(store.get(&keys::username_claim("u1", "amy")).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn a_failing_step_does_not_stop_the_rest() {
    let store = MemoryStore::new();
    register(&store, "u1", "amy").await;

    store.fail_writes_to(Collection::Users, 5);
    let report = delete_account(&store, "u1").await;
    assert!(!report.is_complete());
    assert_eq!(report.failed_steps(), [DeletionStep::Profile]);
    assert_eq!(users::lookup(&store, "amy").await.unwrap(), None);

    let retry = delete_account(&store, "u1").await;
    assert!(retry.is_complete());
    assert!(store.get(&keys::user("u1")).await.unwrap().is_none());
}
