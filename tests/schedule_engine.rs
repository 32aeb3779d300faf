//! Recurring patch and reboot schedules.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod support;

use chrono::{Duration, TimeZone, Utc};
use fleetops::orchestrator::{ScheduleDraft, ScheduleRun, ScheduleUpdate};
use fleetops::store::{PatchStore, RebootStore, ScheduleStore};
use fleetops::{AgentId, FleetError, PatchMode, RebootStatus, ScheduleKind};
use support::{start_time, Fleet};

fn draft(kind: ScheduleKind, agent_id: &str, cron: &str) -> ScheduleDraft {
    ScheduleDraft {
        kind,
        agent_id: AgentId::new(agent_id),
        container_id: None,
        cron_expression: cron.to_string(),
        active: true,
        reason: None,
    }
}

// ============================================================================
// DEFINITION
// ============================================================================

#[tokio::test]
async fn test_create_computes_next_run() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;

    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "30 3 * * *"))
        .await
        .unwrap();

    // Clock starts at 2026-03-02 10:00 UTC.
    let expected = Utc.with_ymd_and_hms(2026, 3, 3, 3, 30, 0).single().unwrap();
    assert_eq!(schedule.next_run_at, Some(expected));
    assert!(schedule.last_run_at.is_none());
}

#[tokio::test]
async fn test_second_active_schedule_for_same_target_conflicts() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let user = Fleet::user();
    let schedules = &fleet.services.schedules;

    let first = schedules
        .create(&user, draft(ScheduleKind::Reboot, "x", "0 4 * * 0"))
        .await
        .unwrap();
    let duplicate = schedules
        .create(&user, draft(ScheduleKind::Reboot, "x", "0 5 * * 0"))
        .await;
    let other_kind = schedules
        .create(&user, draft(ScheduleKind::Patch, "x", "0 5 * * 0"))
        .await;
    let updated = schedules
        .update(
            &user,
            &first.id,
            ScheduleUpdate {
                cron_expression: Some("0 6 * * 0".to_string()),
                ..ScheduleUpdate::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(duplicate, Err(FleetError::Conflict(_))));
    assert!(other_kind.is_ok());
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.cron_expression, "0 6 * * 0");
    assert_ne!(updated.next_run_at, first.next_run_at);
}

#[tokio::test]
async fn test_inactive_schedule_does_not_block_a_new_one() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let user = Fleet::user();
    let schedules = &fleet.services.schedules;

    let mut paused = draft(ScheduleKind::Patch, "x", "@daily");
    paused.active = false;
    let paused = schedules.create(&user, paused).await.unwrap();
    schedules
        .create(&user, draft(ScheduleKind::Patch, "x", "@hourly"))
        .await
        .unwrap();

    assert!(paused.next_run_at.is_none());
    let reactivate = schedules
        .update(
            &user,
            &paused.id,
            ScheduleUpdate {
                active: Some(true),
                ..ScheduleUpdate::default()
            },
        )
        .await;
    assert!(matches!(reactivate, Err(FleetError::Conflict(_))));
}

#[tokio::test]
async fn test_invalid_cron_is_rejected() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;

    let result = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "61 * * * *"))
        .await;

    match result {
        Err(e @ FleetError::Cron { .. }) => assert_eq!(e.http_status(), 400),
        other => panic!("expected cron error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_schedules_are_owner_scoped() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "@daily"))
        .await
        .unwrap();
    let stranger = fleetops::Identity::user(support::OTHER_OWNER);

    assert!(matches!(
        fleet.services.schedules.get(&stranger, &schedule.id).await,
        Err(FleetError::Forbidden(_))
    ));
    assert!(matches!(
        fleet.services.schedules.delete(&stranger, &schedule.id).await,
        Err(FleetError::Forbidden(_))
    ));
    assert!(matches!(
        fleet
            .services
            .schedules
            .create(&Fleet::agent_identity("x"), draft(ScheduleKind::Patch, "x", "@daily"))
            .await,
        Err(FleetError::Forbidden(_))
    ));
    assert_eq!(fleet.services.schedules.list(&Fleet::user()).await.unwrap().len(), 1);

    fleet
        .services
        .schedules
        .delete(&Fleet::user(), &schedule.id)
        .await
        .unwrap();
    assert!(fleet.services.schedules.list(&Fleet::user()).await.unwrap().is_empty());
}

// ============================================================================
// EXECUTION
// ============================================================================

#[tokio::test]
async fn test_patch_schedule_launches_apply_with_current_exclusions() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.register_script("debian", None).await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "0 * * * *"))
        .await
        .unwrap();

    // Exceptions added after the schedule was defined still apply.
    fleet.exclude_for_agent("x", "vim").await;
    fleet.clock.set(start_time() + Duration::hours(1));
    let run = fleet.services.schedules.execute(&schedule.id).await.unwrap();

    let ScheduleRun::Launched { kind, operation_id } = run else {
        panic!("expected launch, got {run:?}");
    };
    assert_eq!(kind, ScheduleKind::Patch);
    let operation = fleet
        .store
        .get_patch(&operation_id.as_str().into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(operation.mode, PatchMode::Apply);
    assert_eq!(operation.exclusions, vec!["vim".to_string()]);

    let stored = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.last_run_at, Some(start_time() + Duration::hours(1)));
    assert_eq!(stored.next_run_at, Some(start_time() + Duration::hours(2)));
}

#[tokio::test]
async fn test_reboot_schedule_skips_when_reboot_outstanding() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let mut reboot_draft = draft(ScheduleKind::Reboot, "x", "*/10 * * * *");
    reboot_draft.reason = Some("weekly maintenance".to_string());
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), reboot_draft)
        .await
        .unwrap();

    fleet.advance(600);
    let first = fleet.services.schedules.execute(&schedule.id).await.unwrap();
    let ScheduleRun::Launched { operation_id, .. } = first else {
        panic!("expected launch, got {first:?}");
    };
    let reboot = fleet
        .store
        .get_reboot(&operation_id.as_str().into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reboot.status, RebootStatus::Sent);
    assert_eq!(reboot.reason.as_deref(), Some("weekly maintenance"));
    let after_launch = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();

    fleet.advance(600);
    let second = fleet.services.schedules.execute(&schedule.id).await.unwrap();
    let after_skip = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();

    assert!(matches!(second, ScheduleRun::Skipped { .. }));
    assert_eq!(after_skip.last_run_at, after_launch.last_run_at);
    assert!(after_skip.next_run_at > after_launch.next_run_at);
    assert_eq!(fleet.agent("x").await.pending_reboot_id, Some(reboot.id));
}

#[tokio::test]
async fn test_failed_execution_still_advances_next_run() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "suse").await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "@hourly"))
        .await
        .unwrap();

    fleet.clock.set(start_time() + Duration::hours(1));
    let result = fleet.services.schedules.execute(&schedule.id).await;
    let stored = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();

    assert!(matches!(result, Err(FleetError::ScriptNotFound)));
    assert!(stored.last_run_at.is_none());
    assert_eq!(stored.next_run_at, Some(start_time() + Duration::hours(2)));
}

#[tokio::test]
async fn test_inactive_schedule_execution_is_a_no_op() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let mut paused = draft(ScheduleKind::Reboot, "x", "@hourly");
    paused.active = false;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), paused)
        .await
        .unwrap();

    let run = fleet.services.schedules.execute(&schedule.id).await.unwrap();

    assert_eq!(run, ScheduleRun::Inactive);
    assert!(!fleet.agent("x").await.has_pending_reboot());
}

#[tokio::test]
async fn test_run_due_fires_only_due_schedules() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.add_agent("y", "debian").await;
    fleet.register_script("debian", None).await;
    let user = Fleet::user();
    let hourly = fleet
        .services
        .schedules
        .create(&user, draft(ScheduleKind::Patch, "x", "@hourly"))
        .await
        .unwrap();
    let daily = fleet
        .services
        .schedules
        .create(&user, draft(ScheduleKind::Reboot, "y", "@daily"))
        .await
        .unwrap();

    let now = start_time() + Duration::hours(1);
    fleet.clock.set(now);
    let report = fleet.services.schedules.run_due(now).await.unwrap();

    assert_eq!(report.launched, vec![hourly.id.clone()]);
    assert!(report.skipped.is_empty());
    assert!(report.failed.is_empty());
    let untouched = fleet.store.get_schedule(&daily.id).await.unwrap().unwrap();
    assert!(untouched.last_run_at.is_none());

    // Running the same tick again finds nothing due.
    let again = fleet.services.schedules.run_due(now).await.unwrap();
    assert!(again.launched.is_empty());
}

#[tokio::test]
async fn test_deleted_schedule_is_not_recreated_by_run() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "@hourly"))
        .await
        .unwrap();
    fleet
        .services
        .schedules
        .delete(&Fleet::user(), &schedule.id)
        .await
        .unwrap();

    let recorded = fleet
        .store
        .record_schedule_run(&schedule.id, Some(start_time()), None)
        .await
        .unwrap();

    assert!(!recorded);
    assert!(fleet.store.get_schedule(&schedule.id).await.unwrap().is_none());
    assert!(matches!(
        fleet.services.schedules.execute(&schedule.id).await,
        Err(FleetError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_racing_a_run_keeps_run_bookkeeping() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.register_script("debian", None).await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Patch, "x", "@hourly"))
        .await
        .unwrap();

    // Given an edit that read the schedule before it fired
    let mut stale = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();
    let now = start_time() + Duration::hours(1);
    fleet.clock.set(now);
    let report = fleet.services.schedules.run_due(now).await.unwrap();
    assert_eq!(report.launched, vec![schedule.id.clone()]);

    // When the reason-only edit lands afterwards
    stale.reason = Some("renamed".to_string());
    let saved = fleet
        .store
        .update_schedule(stale, false)
        .await
        .unwrap()
        .unwrap();

    // Then the run stays recorded and nothing is due again
    assert_eq!(saved.reason.as_deref(), Some("renamed"));
    assert_eq!(saved.last_run_at, Some(now));
    assert_eq!(saved.next_run_at, Some(now + Duration::hours(1)));
    let again = fleet.services.schedules.run_due(now).await.unwrap();
    assert!(again.launched.is_empty());
    let patches = fleet
        .store
        .patches_for_user(&fleetops::UserId::new(support::OWNER))
        .await
        .unwrap();
    assert_eq!(patches.len(), 1);
}

#[tokio::test]
async fn test_update_does_not_recreate_deleted_schedule() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let schedule = fleet
        .services
        .schedules
        .create(&Fleet::user(), draft(ScheduleKind::Reboot, "x", "@daily"))
        .await
        .unwrap();
    let mut stale = fleet.store.get_schedule(&schedule.id).await.unwrap().unwrap();
    fleet
        .services
        .schedules
        .delete(&Fleet::user(), &schedule.id)
        .await
        .unwrap();

    stale.reason = Some("late edit".to_string());
    let saved = fleet.store.update_schedule(stale, true).await.unwrap();

    assert!(saved.is_none());
    assert!(fleet.store.get_schedule(&schedule.id).await.unwrap().is_none());
}
