use chrono::{DateTime, Duration, TimeZone, Utc};
use taskgo_atoms::store::{keys, DocumentStore, MemoryStore};
use taskgo_atoms::tasks;
use taskgo_atoms::users::{self, AwardOutcome, SignUpPayload};
use taskgo_atoms::{CoreError, WeekBoundary};

fn wednesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()
}

fn payload(username: &str) -> SignUpPayload {
    SignUpPayload {
        email: format!("{}@example.com", username.to_lowercase()),
        username: username.to_string(),
        display_name: None,
    }
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let store = MemoryStore::new();
    let now = wednesday();

    let (a, b) = tokio::join!(
        users::claim_username(&store, now, "u1", "Amy"),
        users::claim_username(&store, now, "u2", "amy"),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { &b } else { &a };
    assert_eq!(loser, &Err(CoreError::AlreadyTaken("amy".to_string())));

    let winner_id = if a.is_ok() { "u1" } else { "u2" };
    assert_eq!(users::lookup(&store, "AMY").await.unwrap(), Some(winner_id.to_string()));
}

#[tokio::test]
async fn reclaiming_your_own_name_is_not_a_conflict() {
    let store = MemoryStore::new();
    users::claim_username(&store, wednesday(), "u1", "amy").await.unwrap();
    let again = users::claim_username(&store, wednesday(), "u1", "Amy").await.unwrap();
    assert_eq!(again.user_id, "u1");
}

#[tokio::test]
async fn usernames_are_validated_and_folded() {
    let store = MemoryStore::new();
    for bad in ["ab", "has space", "way_too_long_for_a_username", "émile"] {
        assert!(matches!(
            users::is_available(&store, bad).await,
            Err(CoreError::InvalidUsername(_))
        ));
    }
    assert_eq!(users::normalize_username("  Amy.B_1 ").unwrap(), "amy.b_1");
    assert_eq!(users::lookup(&store, "x").await.unwrap(), None);
}

#[tokio::test]
async fn sign_up_creates_profile_claim_and_default_group() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    let profile = users::sign_up(&store, wednesday(), week, "u1", payload("Amy")).await.unwrap();

    assert_eq!(profile.username, "Amy");
    assert_eq!(profile.display_name, "Amy");
    assert_eq!((profile.total_xp, profile.level, profile.weekly_xp), (0, 1, 0));
    assert_eq!(
        profile.weekly_xp_reset_date,
        Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap()
    );
    assert_eq!(users::lookup(&store, "amy").await.unwrap(), Some("u1".to_string()));
    assert!(store.get(&keys::username_claim("u1", "amy")).await.unwrap().is_some());

    let groups = tasks::list_groups(&store, "u1").await.unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].is_default);
}

#[tokio::test]
async fn losing_the_name_race_leaves_no_partial_account() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    users::sign_up(&store, wednesday(), week, "u1", payload("amy")).await.unwrap();

    let lost = users::sign_up(&store, wednesday(), week, "u2", payload("AMY")).await;
    assert_eq!(lost, Err(CoreError::AlreadyTaken("amy".to_string())));
    assert!(store.get(&keys::user("u2")).await.unwrap().is_none());
    assert!(tasks::list_groups(&store, "u2").await.unwrap().is_empty());

    // same identity, new name
    let profile = users::sign_up(&store, wednesday(), week, "u2", payload("amy2")).await.unwrap();
    assert_eq!(profile.user_id, "u2");

    let twice = users::sign_up(&store, wednesday(), week, "u2", payload("amy3")).await;
    assert!(matches!(twice, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn xp_award_is_at_most_once_per_task() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    let now = wednesday();
    users::sign_up(&store, now, week, "u1", payload("amy")).await.unwrap();

    let first = users::commit_xp_award(&store, now, week, "u1", "t1", 20).await.unwrap();
    let AwardOutcome::Committed(profile) = first else {
        panic!("expected a committed award");
    };
    assert_eq!((profile.total_xp, profile.weekly_xp, profile.level), (20, 20, 2));

    let second = users::commit_xp_award(&store, now, week, "u1", "t1", 20).await.unwrap();
    assert_eq!(second, AwardOutcome::AlreadyAwarded);
    assert_eq!(users::get_profile(&store, "u1").await.unwrap().total_xp, 20);
}

#[tokio::test]
async fn award_after_the_boundary_starts_a_new_week() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    let now = wednesday();
    users::sign_up(&store, now, week, "u1", payload("amy")).await.unwrap();
    users::commit_xp_award(&store, now, week, "u1", "t1", 30).await.unwrap();

    let next_tuesday = now + Duration::days(6);
    users::commit_xp_award(&store, next_tuesday, week, "u1", "t2", 5).await.unwrap();

    let profile = users::get_profile(&store, "u1").await.unwrap();
    assert_eq!(profile.total_xp, 35);
    assert_eq!(profile.weekly_xp, 5);
    assert_eq!(
        profile.weekly_xp_reset_date,
        Utc.with_ymd_and_hms(2026, 10, 26, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn weekly_reset_is_idempotent_within_a_week() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    let now = wednesday();
    users::sign_up(&store, now, week, "u1", payload("amy")).await.unwrap();
    users::commit_xp_award(&store, now, week, "u1", "t1", 12).await.unwrap();

    assert_eq!(users::reset_weekly_xp_if_due(&store, now, week, "u1").await.unwrap(), None);

    let monday = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
    let reset = users::reset_weekly_xp_if_due(&store, monday, week, "u1").await.unwrap().unwrap();
    assert_eq!(reset.weekly_xp, 0);
    assert_eq!(reset.total_xp, 12);
    assert_eq!(reset.weekly_xp_reset_date, monday + Duration::weeks(1));

    let later = monday + Duration::hours(3);
    assert_eq!(users::reset_weekly_xp_if_due(&store, later, week, "u1").await.unwrap(), None);
}

#[tokio::test]
async fn display_name_changes_are_validated() {
    let store = MemoryStore::new();
    let week = WeekBoundary::default();
    users::sign_up(&store, wednesday(), week, "u1", payload("amy")).await.unwrap();

    let renamed = users::update_display_name(&store, "u1", "  Amy B ").await.unwrap();
    assert_eq!(renamed.display_name, "Amy B");
    assert_eq!(renamed.revision, 1);
    assert!(matches!(
        users::update_display_name(&store, "u1", "   ").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        users::get_profile(&store, "ghost").await,
        Err(CoreError::NotFound(_))
    ));
}
