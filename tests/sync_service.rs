use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use httpmock::prelude::*;
use scrooge::config::CmdbSettings;
use scrooge::db::MemoryStore;
use scrooge::models::{Owner, OwnershipType, ProfitCenter};
use scrooge::sync::{CmdbHttpClient, ServiceSync, SyncContext, SyncJob, SyncOutcome, SyncStatus};
use serde_json::json;

fn ctx() -> SyncContext {
    SyncContext {
        today: NaiveDate::from_ymd_opt(2014, 3, 1).unwrap(),
    }
}

async fn store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (id, ci_uid, name) in [(1, "pc-default", "Default"), (2, "pc-2", "Cloud")] {
        store
            .insert_profit_center(ProfitCenter {
                id,
                ci_uid: ci_uid.to_string(),
                name: name.to_string(),
            })
            .await;
    }
    for cmdb_id in [10, 11, 12] {
        store
            .insert_owner(Owner {
                id: cmdb_id,
                cmdb_id,
                name: format!("owner {cmdb_id}"),
            })
            .await;
    }
    Arc::new(store)
}

fn job(store: Arc<MemoryStore>, server: &MockServer) -> ServiceSync {
    let api = CmdbHttpClient::new(CmdbSettings {
        url: server.base_url(),
        token: Some("cmdb-token".to_string()),
    })
    .unwrap();
    ServiceSync::new(store, Some(Arc::new(api))).with_default_profit_center(1)
}

#[tokio::test]
async fn service_sync_creates_services_and_owners() {
    let server = MockServer::start_async().await;
    let services = server.mock(|when, then| {
        when.method(GET)
            .path("/services")
            .header("Authorization", "Bearer cmdb-token");
        then.status(200).json_body(json!([
            {
                "ci_uid": "svc-1",
                "name": "Scrooge",
                "profit_center": "pc-2",
                "technical_owners": [10, 11, 99],
                "business_owners": [12],
            },
            {
                "ci_uid": "svc-2",
                "name": "Ralph",
                "profit_center": null,
                "technical_owners": [],
                "business_owners": [],
            },
        ]));
    });
    let store = store().await;

    let outcome = job(store.clone(), &server).run(&ctx()).await.unwrap();

    services.assert();
    assert_eq!(
        outcome,
        SyncOutcome::completed("2 new service(s), 0 updated, 2 total")
    );
    let stored = store.services().await;
    let scrooge = stored.iter().find(|s| s.ci_uid == "svc-1").unwrap();
    let ralph = stored.iter().find(|s| s.ci_uid == "svc-2").unwrap();
    assert_eq!(scrooge.profit_center_id, 2);
    assert_eq!(ralph.profit_center_id, 1);
    assert_eq!(
        store
            .service_owners(scrooge.id, OwnershipType::Technical)
            .await,
        BTreeSet::from([10, 11])
    );
    assert_eq!(
        store.service_owners(scrooge.id, OwnershipType::Business).await,
        BTreeSet::from([12])
    );
}

#[tokio::test]
async fn second_run_updates_names_and_reconciles_owners() {
    let server = MockServer::start_async().await;
    let mut first = server.mock(|when, then| {
        when.method(GET).path("/services");
        then.status(200).json_body(json!([
            { "ci_uid": "svc-1", "name": "Scrooge", "technical_owners": [10, 11] },
        ]));
    });
    let store = store().await;
    job(store.clone(), &server).run(&ctx()).await.unwrap();
    first.delete();

    server.mock(|when, then| {
        when.method(GET).path("/services");
        then.status(200).json_body(json!([
            { "ci_uid": "svc-1", "name": "Scrooge 2", "technical_owners": [11, 12] },
        ]));
    });
    let outcome = job(store.clone(), &server).run(&ctx()).await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::completed("0 new service(s), 1 updated, 1 total")
    );
    let stored = store.services().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "Scrooge 2");
    assert_eq!(
        store
            .service_owners(stored[0].id, OwnershipType::Technical)
            .await,
        BTreeSet::from([11, 12])
    );
}

#[tokio::test]
async fn missing_default_profit_center_fails() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/services");
        then.status(200).json_body(json!([]));
    });

    let job = job(store().await, &server).with_default_profit_center(42);
    let err = job.run(&ctx()).await.unwrap_err();

    assert_eq!(err.to_string(), "profit center `42` does not exist");
}

#[tokio::test]
async fn unconfigured_cmdb_is_skipped() {
    let job = ServiceSync::new(store().await, None);
    let outcome = job.run(&ctx()).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Skipped);
    assert_eq!(outcome.message, "not configured.");
}
