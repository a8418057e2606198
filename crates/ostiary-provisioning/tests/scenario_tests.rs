//! End-to-end delivery scenarios against a real PostgreSQL and a mock
//! SCIM server.
//!
//! Run with: `cargo test -p ostiary-provisioning --features integration`

#![cfg(feature = "integration")]

mod common;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{drive_once, test_worker, TestContext};
use ostiary_db::models::{Delivery, DeliveryStatus, ResourceMapping};
use ostiary_events::{ChangeKind, LocalEvent, ResourceType};
use ostiary_provisioning::{
    DeleteAction, DeliveryStore, DestinationCreateRequest, DestinationService, EventIntake,
    OperationKind,
};

async fn create_destination(
    ctx: &TestContext,
    base_url: &str,
    operations: Vec<OperationKind>,
    delete_action: DeleteAction,
) -> ostiary_db::models::Destination {
    let service = DestinationService::new(ctx.pool().clone());
    let created = service
        .create(DestinationCreateRequest {
            tenant_id: ctx.tenant_id,
            name: format!("dest-{}", Uuid::new_v4()),
            base_url: base_url.to_string(),
            attribute_mapping: None,
            enabled_operations: operations,
            delete_action,
            retry_policy: None,
            enabled: true,
            client_app_id: None,
        })
        .await
        .expect("create destination");
    assert!(created.client_secret.is_some(), "auto-provisioned secret");
    created.destination
}

fn user_event(ctx: &TestContext, kind: ChangeKind, resource_id: &str) -> LocalEvent {
    LocalEvent::new(
        ctx.tenant_id.into(),
        ResourceType::User,
        resource_id,
        kind,
        json!({
            "user": { "id": resource_id, "username": "alice", "email": "a@x" },
            "profile": { "given_name": "Al", "family_name": "Ice" }
        }),
    )
}

/// S1: create user against an auto-provisioned destination; downstream
/// returns 201 with an id, which becomes the resource mapping.
#[tokio::test]
async fn test_create_user_delivery_records_mapping() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(header("Authorization", "Bearer test-bearer-token"))
        .and(header("Content-Type", "application/scim+json"))
        .and(body_partial_json(json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": "alice",
            "externalId": "u-A",
            "name": { "givenName": "Al", "familyName": "Ice" },
            "emails": [ { "value": "a@x", "primary": true } ]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "dw-u-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let destination = create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::CreateUser],
        DeleteAction::Deactivate,
    )
    .await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Create, "u-A");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    assert_eq!(drive_once(&store, &worker, 0).await, 1);

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.status_kind(), DeliveryStatus::Success);
    assert_eq!(delivery.http_status, Some(201));
    assert_eq!(delivery.scim_resource_id.as_deref(), Some("dw-u-1"));
    assert!(delivery.completed_at.is_some());
    assert!(delivery.next_retry_at.is_none());

    let mapping = ResourceMapping::find(ctx.pool(), destination.id, "USER", "u-A")
        .await
        .unwrap()
        .expect("mapping recorded");
    assert_eq!(mapping.scim_resource_id, "dw-u-1");
}

/// S2: update with no mapping fails permanently without any HTTP call.
#[tokio::test]
async fn test_update_without_mapping_fails_permanently() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    // Any request reaching the server is a test failure.
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::UpdateUser],
        DeleteAction::Deactivate,
    )
    .await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Update, "u-B");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    drive_once(&store, &worker, 0).await;

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.status_kind(), DeliveryStatus::Failed);
    assert!(delivery.last_error.as_deref().unwrap().contains("mapping"));
    assert!(delivery.http_status.is_none());
    assert!(delivery.completed_at.is_some());
}

/// S3: transient 503s then success; retry count is preserved on the final
/// successful record.
#[tokio::test]
async fn test_transient_failures_then_success() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "dw-u-3" })))
        .expect(1)
        .mount(&server)
        .await;

    create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::CreateUser],
        DeleteAction::Deactivate,
    )
    .await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Create, "u-C");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());

    // First attempt: 503, scheduled for retry in ~1s.
    drive_once(&store, &worker, 0).await;
    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries[0].status_kind(), DeliveryStatus::Retrying);
    assert_eq!(deliveries[0].retry_count, 1);
    assert!(deliveries[0].next_retry_at.is_some());

    // Second attempt (clock skewed past the backoff): 503 again, ~2s.
    assert_eq!(drive_once(&store, &worker, 5).await, 1);
    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries[0].status_kind(), DeliveryStatus::Retrying);
    assert_eq!(deliveries[0].retry_count, 2);

    // Third attempt: 200.
    assert_eq!(drive_once(&store, &worker, 10).await, 1);
    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    let delivery = &deliveries[0];
    assert_eq!(delivery.status_kind(), DeliveryStatus::Success);
    assert_eq!(delivery.http_status, Some(200));
    assert_eq!(delivery.retry_count, 2);
    assert!(delivery.next_retry_at.is_none());
}

/// S4: delete with deactivate semantics PATCHes active=false and removes
/// the mapping on success.
#[tokio::test]
async fn test_deactivate_on_delete_removes_mapping() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/Users/dw-u-1"))
        .and(body_partial_json(json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [ { "op": "replace", "path": "active", "value": false } ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let destination = create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::DeactivateUser],
        DeleteAction::Deactivate,
    )
    .await;

    ResourceMapping::upsert(ctx.pool(), destination.id, "USER", "u-A", "dw-u-1")
        .await
        .unwrap();

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Delete, "u-A");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    drive_once(&store, &worker, 0).await;

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries[0].status_kind(), DeliveryStatus::Success);

    let mapping = ResourceMapping::find(ctx.pool(), destination.id, "USER", "u-A")
        .await
        .unwrap();
    assert!(mapping.is_none(), "mapping removed after deactivation");
}

/// S5: membership add PATCHes the group with the member's downstream id.
#[tokio::test]
async fn test_membership_add_patch() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/Groups/g1"))
        .and(body_partial_json(json!({
            "Operations": [
                { "op": "add", "path": "members", "value": [ { "value": "u1" } ] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let destination = create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::AddGroupMember],
        DeleteAction::Deactivate,
    )
    .await;

    ResourceMapping::upsert(ctx.pool(), destination.id, "GROUP", "G", "g1")
        .await
        .unwrap();
    ResourceMapping::upsert(ctx.pool(), destination.id, "USER", "U", "u1")
        .await
        .unwrap();

    let intake = EventIntake::new(ctx.pool().clone());
    let event = LocalEvent::new(
        ctx.tenant_id.into(),
        ResourceType::GroupMember,
        "G:U",
        ChangeKind::Create,
        json!({ "groupMember": { "groupId": "G", "userId": "U" } }),
    );
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    drive_once(&store, &worker, 0).await;

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries[0].status_kind(), DeliveryStatus::Success);
}

/// S6: one event fans out to three destinations; a persistent 400 on one
/// does not influence the others.
#[tokio::test]
async fn test_fanout_isolation_across_destinations() {
    let ctx = TestContext::new().await;

    let good_one = MockServer::start().await;
    let bad = MockServer::start().await;
    let good_two = MockServer::start().await;

    for server in [&good_one, &good_two] {
        Mock::given(method("POST"))
            .and(path("/Users"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "dw-ok" })))
            .expect(1)
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "detail": "rejected" })))
        .expect(1)
        .mount(&bad)
        .await;

    let operations = vec![OperationKind::CreateUser];
    let d1 = create_destination(&ctx, &good_one.uri(), operations.clone(), DeleteAction::Deactivate).await;
    let d2 = create_destination(&ctx, &bad.uri(), operations.clone(), DeleteAction::Deactivate).await;
    let d3 = create_destination(&ctx, &good_two.uri(), operations, DeleteAction::Deactivate).await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Create, "u-F");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    assert_eq!(drive_once(&store, &worker, 0).await, 3, "fan-out count");

    let by_destination = |id: Uuid, deliveries: &[Delivery]| {
        deliveries
            .iter()
            .find(|d| d.destination_id == id)
            .cloned()
            .expect("delivery for destination")
    };

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries.len(), 3);
    assert_eq!(
        by_destination(d1.id, &deliveries).status_kind(),
        DeliveryStatus::Success
    );
    assert_eq!(
        by_destination(d2.id, &deliveries).status_kind(),
        DeliveryStatus::Failed
    );
    assert_eq!(
        by_destination(d3.id, &deliveries).status_kind(),
        DeliveryStatus::Success
    );
}

/// Duplicate event publication does not create duplicate deliveries.
#[tokio::test]
async fn test_fanout_is_idempotent_by_event() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::CreateUser],
        DeleteAction::Deactivate,
    )
    .await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Create, "u-G");
    intake.on_event(&event).await;
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries.len(), 1);
}

/// An operation outside the enabled set resolves to synthetic success
/// without network I/O.
#[tokio::test]
async fn test_disabled_operation_is_synthetic_success() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    // Only group operations are enabled; a user create must not call out.
    create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::CreateGroup],
        DeleteAction::Deactivate,
    )
    .await;

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Create, "u-H");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    drive_once(&store, &worker, 0).await;

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    let delivery = &deliveries[0];
    assert_eq!(delivery.status_kind(), DeliveryStatus::Success);
    assert_eq!(delivery.http_status, Some(200));
    assert!(delivery.scim_resource_id.is_none());
}

/// Hard delete: a 404 from the destination counts as success and drops
/// the stale mapping.
#[tokio::test]
async fn test_hard_delete_treats_404_as_success() {
    let ctx = TestContext::new().await;
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/Users/dw-stale"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let destination = create_destination(
        &ctx,
        &server.uri(),
        vec![OperationKind::DeleteUser],
        DeleteAction::HardDelete,
    )
    .await;

    ResourceMapping::upsert(ctx.pool(), destination.id, "USER", "u-I", "dw-stale")
        .await
        .unwrap();

    let intake = EventIntake::new(ctx.pool().clone());
    let event = user_event(&ctx, ChangeKind::Delete, "u-I");
    intake.on_event(&event).await;

    let store = DeliveryStore::new(ctx.pool().clone());
    let worker = test_worker(ctx.pool().clone());
    drive_once(&store, &worker, 0).await;

    let deliveries = store.list_by_event(event.event_id.into_uuid()).await.unwrap();
    assert_eq!(deliveries[0].status_kind(), DeliveryStatus::Success);

    let mapping = ResourceMapping::find(ctx.pool(), destination.id, "USER", "u-I")
        .await
        .unwrap();
    assert!(mapping.is_none());
}
