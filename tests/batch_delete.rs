use chrono::{TimeZone, Utc};
use courtside::adapters::MemoryEventStore;
use courtside::domain::{EventType, GameEvent, Modifier, Resource, TeamRoster};
use courtside::session::{GameContext, SessionNotice, StatAggregator};
use std::sync::Arc;
use std::time::Duration;

fn context() -> GameContext {
    let home = TeamRoster::new("home", ["a", "b", "c", "d", "e"].map(String::from).to_vec());
    let away = TeamRoster::new("away", ["v", "w", "x", "y", "z"].map(String::from).to_vec());
    GameContext::new("g1", home, away)
}

fn shot(seq: i64, subject: &str, team: &str) -> GameEvent {
    GameEvent {
        id: format!("e{seq}"),
        game_id: "g1".to_string(),
        subject_id: subject.to_string(),
        team_id: team.to_string(),
        event_type: EventType::Shot2,
        modifier: Some(Modifier::Made),
        quarter: 1,
        clock_minutes: 11,
        clock_seconds: (59 - seq) as u8,
        created_at: Utc.timestamp_opt(1_770_000_000 + seq, 0).unwrap(),
        external_media_timestamp: None,
    }
}

async fn seeded(count: i64) -> (Arc<StatAggregator>, Arc<MemoryEventStore>) {
    let store = Arc::new(MemoryEventStore::new());
    for seq in 0..count {
        let team = if seq % 2 == 0 { "home" } else { "away" };
        store.seed_event(&shot(seq, if seq % 2 == 0 { "a" } else { "v" }, team)).unwrap();
    }
    let session = StatAggregator::new(context(), store.clone(), Duration::from_millis(750));
    session.reload().await.unwrap();
    (session, store)
}

fn ids(range: std::ops::Range<i64>) -> Vec<String> {
    range.map(|seq| format!("e{seq}")).collect()
}

#[tokio::test]
async fn deleting_n_events_removes_exactly_n() {
    let (session, store) = seeded(10).await;
    let before = session.snapshot().log.events.len();

    let outcome = session.delete_batch(&ids(2..6)).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.deleted, 4);
    assert!(!outcome.reloaded);
    assert_eq!(session.snapshot().log.events.len(), before - 4);
    assert_eq!(store.row_count(Resource::GameEvents), 6);
    assert_eq!(store.delete_count(), 4);

    // Remaining: e0 e1 e6 e7 e8 e9
    assert_eq!(session.snapshot().box_score.team_points("home"), 6);
    assert_eq!(session.snapshot().box_score.team_points("away"), 6);
}

#[tokio::test]
async fn any_failure_forces_a_full_reload() {
    let (session, store) = seeded(6).await;
    let mut notices = session.notices();
    store.fail_delete_of("e3");

    let outcome = session.delete_batch(&ids(1..5)).await.unwrap();

    assert!(!outcome.is_complete());
    assert!(outcome.reloaded);
    assert_eq!(outcome.deleted, 3);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "e3");

    // The reload restored the authoritative log, e3 included
    let snapshot = session.snapshot();
    assert_eq!(store.row_count(Resource::GameEvents), 3);
    assert_eq!(snapshot.log.events.len(), 3);
    assert!(snapshot.log.contains("e3"));
    assert!(snapshot.last_error.is_none());

    let mut saw_failure = false;
    let mut saw_reload = false;
    while let Ok(notice) = notices.try_recv() {
        match notice {
            SessionNotice::MutationFailed { operation, .. } => {
                assert_eq!(operation, "batch delete");
                saw_failure = true;
            }
            SessionNotice::Reloaded { events, .. } => {
                assert_eq!(events, 3);
                saw_reload = true;
            }
            _ => {}
        }
    }
    assert!(saw_failure && saw_reload);
}

#[tokio::test]
async fn unknown_ids_count_as_failures() {
    let (session, store) = seeded(3).await;

    let outcome = session
        .delete_batch(&["e0".to_string(), "missing".to_string()])
        .await
        .unwrap();

    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.failed[0].0, "missing");
    assert!(outcome.reloaded);
    assert_eq!(store.delete_count(), 1);
    assert_eq!(session.snapshot().log.events.len(), 2);
}
