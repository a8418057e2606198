//! Integration tests for the destination service facade and scope policy.
//!
//! Run with: `cargo test -p ostiary-provisioning --features integration`

#![cfg(feature = "integration")]

mod common;

use uuid::Uuid;

use common::TestContext;
use ostiary_db::models::{
    ClientApplication, CreateClientApplication, Delivery, ResourceMapping, ScimScope,
};
use ostiary_provisioning::{
    DeleteAction, DestinationCreateRequest, DestinationService, DestinationUpdateRequest,
    OperationKind, ProvisioningError, ScopePolicy, SCOPE_GROUPS_WRITE, SCOPE_USERS_WRITE,
};

fn create_request(ctx: &TestContext, operations: Vec<OperationKind>) -> DestinationCreateRequest {
    DestinationCreateRequest {
        tenant_id: ctx.tenant_id,
        name: format!("dest-{}", Uuid::new_v4()),
        base_url: "https://scim.example.com/v2".to_string(),
        attribute_mapping: None,
        enabled_operations: operations,
        delete_action: DeleteAction::Deactivate,
        retry_policy: None,
        enabled: true,
        client_app_id: None,
    }
}

#[tokio::test]
async fn test_auto_provisioned_app_has_exactly_required_scopes() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let created = service
        .create(create_request(
            &ctx,
            vec![OperationKind::CreateUser, OperationKind::AddGroupMember],
        ))
        .await
        .unwrap();

    let secret = created.client_secret.expect("secret returned once");
    assert_eq!(secret.len(), 64);

    let application = ClientApplication::get_by_id(
        ctx.pool(),
        ctx.tenant_id,
        created.destination.client_app_id,
    )
    .await
    .unwrap()
    .expect("application exists");

    let mut scopes = application.scope_names();
    scopes.sort();
    assert_eq!(scopes, vec![SCOPE_GROUPS_WRITE, SCOPE_USERS_WRITE]);
    // The raw secret is not recoverable from the stored record.
    assert_ne!(application.secret_hash, secret);
}

#[tokio::test]
async fn test_create_with_underscoped_app_lists_missing_scopes() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let application = ClientApplication::create(
        ctx.pool(),
        &CreateClientApplication {
            tenant_id: ctx.tenant_id,
            name: "Underscoped".to_string(),
            secret_hash: "irrelevant".to_string(),
            scopes: serde_json::json!([SCOPE_USERS_WRITE]),
        },
    )
    .await
    .unwrap();

    let mut request = create_request(
        &ctx,
        vec![OperationKind::CreateUser, OperationKind::CreateGroup],
    );
    request.client_app_id = Some(application.id);

    let err = service.create(request).await.unwrap_err();
    match err {
        ProvisioningError::MissingScopes {
            application_id,
            scopes,
        } => {
            assert_eq!(application_id, application.id);
            assert_eq!(scopes, vec![SCOPE_GROUPS_WRITE.to_string()]);
        }
        other => panic!("expected MissingScopes, got {other}"),
    }
}

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let mut request = create_request(&ctx, vec![OperationKind::CreateUser]);
    request.name = "Payroll".to_string();
    service.create(request.clone()).await.unwrap();

    let err = service.create(request).await.unwrap_err();
    assert!(matches!(err, ProvisioningError::DuplicateName { .. }));
}

#[tokio::test]
async fn test_update_revalidates_scopes_when_operations_change() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    // Auto-provisioned with only users:write.
    let created = service
        .create(create_request(&ctx, vec![OperationKind::CreateUser]))
        .await
        .unwrap();

    let err = service
        .update(
            ctx.tenant_id,
            created.destination.id,
            DestinationUpdateRequest {
                enabled_operations: Some(vec![
                    OperationKind::CreateUser,
                    OperationKind::CreateGroup,
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::MissingScopes { .. }));
}

#[tokio::test]
async fn test_delete_removes_mappings_and_keeps_deliveries() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let created = service
        .create(create_request(&ctx, vec![OperationKind::CreateUser]))
        .await
        .unwrap();
    let destination_id = created.destination.id;

    ResourceMapping::upsert(ctx.pool(), destination_id, "USER", "u-1", "dw-1")
        .await
        .unwrap();
    let event_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO provisioning_events (id, tenant_id, resource_type, resource_id, change_kind, snapshot, occurred_at)
         VALUES ($1, $2, 'USER', 'u-1', 'CREATE', '{}'::jsonb, NOW())",
    )
    .bind(event_id)
    .bind(ctx.tenant_id)
    .execute(ctx.pool())
    .await
    .unwrap();
    Delivery::insert_pending(ctx.pool(), event_id, destination_id)
        .await
        .unwrap();

    assert!(service.delete(ctx.tenant_id, destination_id).await.unwrap());

    let mapping = ResourceMapping::find(ctx.pool(), destination_id, "USER", "u-1")
        .await
        .unwrap();
    assert!(mapping.is_none(), "mappings removed");

    let deliveries = service.list_deliveries(destination_id, 10, 0).await.unwrap();
    assert_eq!(deliveries.len(), 1, "historical deliveries retained");
    assert_eq!(service.count_deliveries(destination_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_get_and_list_destinations() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let created = service
        .create(create_request(&ctx, vec![OperationKind::CreateUser]))
        .await
        .unwrap();

    let fetched = service
        .get(ctx.tenant_id, created.destination.id)
        .await
        .unwrap();
    assert_eq!(fetched.name, created.destination.name);

    let listed = service.list(ctx.tenant_id, 10, 0).await.unwrap();
    assert!(listed.iter().any(|d| d.id == created.destination.id));

    let err = service.get(ctx.tenant_id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ProvisioningError::DestinationNotFound { .. }));
}

#[tokio::test]
async fn test_ensure_tenant_scopes_is_idempotent() {
    let ctx = TestContext::new().await;
    let policy = ScopePolicy::new(ctx.pool().clone());

    assert_eq!(policy.ensure_tenant_scopes(ctx.tenant_id).await.unwrap(), 4);
    assert_eq!(policy.ensure_tenant_scopes(ctx.tenant_id).await.unwrap(), 0);

    let names = ScimScope::list_names(ctx.pool(), ctx.tenant_id).await.unwrap();
    assert_eq!(
        names,
        vec![
            "scim:groups:read",
            "scim:groups:write",
            "scim:users:read",
            "scim:users:write"
        ]
    );
}

#[tokio::test]
async fn test_relative_base_url_is_rejected() {
    let ctx = TestContext::new().await;
    let service = DestinationService::new(ctx.pool().clone());

    let mut request = create_request(&ctx, vec![OperationKind::CreateUser]);
    request.base_url = "scim.example.com".to_string();

    let err = service.create(request).await.unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidDestination(_)));
}
