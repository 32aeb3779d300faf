//! Status codes, bodies and messages of the request handlers.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod support;

use fleetops::api::dto::{
    CreatePatchBody, CreateRebootBody, CreateScheduleBody, PatchResultForm, RebootListParams,
    UpdateScheduleBody,
};
use fleetops::api::{REBOOT_ACKNOWLEDGED_MESSAGE, REBOOT_SENT_MESSAGE};
use serde_json::Value;
use support::Fleet;

fn patch_body(agent_id: &str, mode: &str) -> CreatePatchBody {
    CreatePatchBody {
        agent_id: agent_id.to_string(),
        container_id: None,
        mode: mode.to_string(),
    }
}

fn reboot_body(agent_id: &str) -> CreateRebootBody {
    CreateRebootBody {
        agent_id: agent_id.to_string(),
        ..CreateRebootBody::default()
    }
}

fn string_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body[key].as_str().unwrap_or_else(|| panic!("{key} missing in {body}"))
}

#[tokio::test]
async fn test_create_patch_returns_created_operation() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let script = fleet.register_script("debian", None).await;
    fleet.exclude_for_agent("x", "vim").await;

    let response = fleet
        .api()
        .create_patch(&Fleet::user(), patch_body("x", "dry-run"))
        .await;

    assert_eq!(response.status, 201);
    assert_eq!(response.body["status"], "pending");
    assert_eq!(response.body["mode"], "dry-run");
    assert_eq!(string_field(&response.body, "script_sha256"), script.sha256);
    assert_eq!(string_field(&response.body, "script_url"), script.url);
    assert_eq!(response.body["exclusions"], serde_json::json!(["vim"]));
}

#[tokio::test]
async fn test_create_patch_rejects_bad_input() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let api = fleet.api();

    let bad_mode = api.create_patch(&Fleet::user(), patch_body("x", "yolo")).await;
    let no_agent = api.create_patch(&Fleet::user(), patch_body("", "apply")).await;
    let by_agent = api
        .create_patch(&Fleet::agent_identity("x"), patch_body("x", "apply"))
        .await;

    assert_eq!(bad_mode.status, 400);
    assert_eq!(bad_mode.body["error"], "invalid mode: must be dry-run or apply");
    assert_eq!(bad_mode.body["code"], "VALIDATION");
    assert_eq!(no_agent.status, 400);
    assert_eq!(no_agent.body["error"], "agent_id is required");
    assert_eq!(by_agent.status, 403);
}

#[tokio::test]
async fn test_unsupported_platform_is_bad_request() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.add_container("ct-1", "x", 100, "templeos").await;

    let mut body = patch_body("x", "apply");
    body.container_id = Some("ct-1".to_string());
    let response = fleet.api().create_patch(&Fleet::user(), body).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], "UNSUPPORTED_PLATFORM");
    assert!(string_field(&response.body, "error").contains("templeos"));
}

#[tokio::test]
async fn test_result_upload_contract() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.add_agent("y", "debian").await;
    fleet.register_script("debian", None).await;
    let api = fleet.api();
    let created = api.create_patch(&Fleet::user(), patch_body("x", "apply")).await;
    let patch_id = string_field(&created.body, "id").to_string();

    let form = |exit_code: &str| PatchResultForm {
        exit_code: exit_code.to_string(),
        stdout_file: b"ok\n".to_vec(),
        stderr_file: Vec::new(),
    };

    let foreign = api
        .upload_patch_result(&Fleet::agent_identity("y"), &patch_id, form("0"))
        .await;
    let garbled = api
        .upload_patch_result(&Fleet::agent_identity("x"), &patch_id, form("zero"))
        .await;
    let accepted = api
        .upload_patch_result(&Fleet::agent_identity("x"), &patch_id, form(" 0 "))
        .await;
    let fetched = api.get_patch(&Fleet::user(), &patch_id).await;

    assert_eq!(foreign.status, 403);
    assert_eq!(
        foreign.body["error"],
        "unauthorized: operation does not belong to agent"
    );
    assert_eq!(garbled.status, 400);
    assert_eq!(accepted.status, 200);
    assert_eq!(accepted.body, serde_json::json!({ "status": "updated" }));
    assert_eq!(fetched.body["status"], "completed");
    assert_eq!(fetched.body["exit_code"], 0);
}

#[tokio::test]
async fn test_script_validation_contract() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let script = fleet.register_script("debian", None).await;
    let api = fleet.api();

    let ok = api
        .validate_script(&Fleet::agent_identity("x"), script.id.value())
        .await;
    let missing = api
        .validate_script(&Fleet::agent_identity("x"), "missing")
        .await;

    assert_eq!(ok.status, 200);
    assert_eq!(
        ok.body,
        serde_json::json!({ "name": script.name, "sha256": script.sha256 })
    );
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["error"], "script not found");
}

#[tokio::test]
async fn test_reboot_contract() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let api = fleet.api();

    let created = api.create_reboot(&Fleet::user(), reboot_body("x")).await;
    let duplicate = api.create_reboot(&Fleet::user(), reboot_body("x")).await;
    let by_agent = api
        .create_reboot(&Fleet::agent_identity("x"), reboot_body("x"))
        .await;
    let unknown = api.create_reboot(&Fleet::user(), reboot_body("ghost")).await;

    assert_eq!(created.status, 200);
    assert_eq!(created.body["success"], true);
    assert_eq!(created.body["status"], "sent");
    assert_eq!(created.body["message"], REBOOT_SENT_MESSAGE);
    assert_eq!(duplicate.status, 409);
    assert_eq!(duplicate.body["error"], "agent already has a pending reboot");
    assert_eq!(by_agent.status, 403);
    assert_eq!(by_agent.body["error"], "agents cannot initiate reboots");
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.body["error"], "agent not found");

    let reboot_id = string_field(&created.body, "reboot_id").to_string();
    let wrong_agent = api
        .acknowledge_reboot(&Fleet::agent_identity("y"), &reboot_id)
        .await;
    let acked = api
        .acknowledge_reboot(&Fleet::agent_identity("x"), &reboot_id)
        .await;
    let missing = api
        .acknowledge_reboot(&Fleet::agent_identity("x"), "nope")
        .await;

    assert_eq!(wrong_agent.status, 403);
    assert_eq!(wrong_agent.body["error"], "not your reboot operation");
    assert_eq!(acked.status, 200);
    assert_eq!(
        acked.body,
        serde_json::json!({ "success": true, "message": REBOOT_ACKNOWLEDGED_MESSAGE })
    );
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body["error"], "reboot operation not found");
}

#[tokio::test]
async fn test_reboot_listing_filters() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    fleet.add_agent("y", "debian").await;
    let api = fleet.api();
    api.create_reboot(&Fleet::user(), reboot_body("x")).await;
    fleet.advance(1);
    api.create_reboot(&Fleet::user(), reboot_body("y")).await;

    let all = api
        .list_reboots(&Fleet::agent_identity("x"), RebootListParams::default())
        .await;
    let only_x = api
        .list_reboots(
            &Fleet::user(),
            RebootListParams {
                agent_id: Some("x".to_string()),
                status: Some("sent".to_string()),
            },
        )
        .await;
    let bad_status = api
        .list_reboots(
            &Fleet::user(),
            RebootListParams {
                agent_id: None,
                status: Some("exploded".to_string()),
            },
        )
        .await;

    let all = all.body.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["target"]["agent_id"], "y");
    assert_eq!(only_x.body.as_array().unwrap().len(), 1);
    assert_eq!(bad_status.status, 400);
}

#[tokio::test]
async fn test_schedule_contract() {
    let fleet = Fleet::new().await;
    fleet.add_agent("x", "debian").await;
    let api = fleet.api();
    let body = || CreateScheduleBody {
        kind: "reboot".to_string(),
        agent_id: "x".to_string(),
        container_id: None,
        cron_expression: "0 4 * * sun".to_string(),
        active: true,
        reason: Some("weekly".to_string()),
    };

    let created = api.create_schedule(&Fleet::user(), body()).await;
    let duplicate = api.create_schedule(&Fleet::user(), body()).await;
    let bad_kind = api
        .create_schedule(
            &Fleet::user(),
            CreateScheduleBody {
                kind: "defrag".to_string(),
                ..body()
            },
        )
        .await;
    let bad_cron = api
        .create_schedule(
            &Fleet::user(),
            CreateScheduleBody {
                kind: "patch".to_string(),
                cron_expression: "every tuesday".to_string(),
                ..body()
            },
        )
        .await;

    assert_eq!(created.status, 201);
    assert_eq!(created.body["reason"], "weekly");
    assert_eq!(duplicate.status, 409);
    assert_eq!(bad_kind.status, 400);
    assert_eq!(bad_cron.status, 400);
    assert_eq!(bad_cron.body["code"], "INVALID_CRON");

    let id = string_field(&created.body, "id").to_string();
    let paused = api
        .update_schedule(
            &Fleet::user(),
            &id,
            UpdateScheduleBody {
                active: Some(false),
                ..UpdateScheduleBody::default()
            },
        )
        .await;
    assert_eq!(paused.status, 200);
    assert_eq!(paused.body["active"], false);
    assert!(paused.body["next_run_at"].is_null());

    let deleted = api.delete_schedule(&Fleet::user(), &id).await;
    let gone = api.get_schedule(&Fleet::user(), &id).await;
    assert_eq!(deleted.status, 200);
    assert_eq!(gone.status, 404);
    assert_eq!(
        api.list_schedules(&Fleet::user()).await.body,
        serde_json::json!([])
    );
}
