use std::sync::Arc;

use chrono::NaiveDate;
use httpmock::prelude::*;
use rust_decimal_macros::dec;
use scrooge::config::OpenStackSettings;
use scrooge::db::MemoryStore;
use scrooge::models::Venture;
use scrooge::sync::{
    OpenStackHttpClient, OpenStackSync, SyncContext, SyncJob, SyncPipeline, SyncStatus,
};
use serde_json::json;

fn ctx() -> SyncContext {
    SyncContext {
        today: NaiveDate::from_ymd_opt(2013, 4, 25).unwrap(),
    }
}

fn settings(server: &MockServer) -> OpenStackSettings {
    OpenStackSettings {
        url: server.base_url(),
        user: "scrooge".to_string(),
        password: "secret".to_string(),
        regions: vec!["RegionOne".to_string()],
        tenants_url: None,
        extra_queries: vec![(server.url("/extra"), "volumes".to_string())],
    }
}

fn mock_keystone(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/tokens")
            .json_body_partial(r#"{"auth": {"passwordCredentials": {"username": "scrooge"}}}"#);
        then.status(200).json_body(json!({
            "access": {
                "token": { "id": "token-1" },
                "serviceCatalog": [
                    { "type": "identity", "endpoints": [] },
                    {
                        "type": "compute",
                        "endpoints": [
                            { "region": "RegionTwo", "publicURL": server.url("/elsewhere") },
                            { "region": "RegionOne", "publicURL": server.url("/compute") },
                        ],
                    },
                ],
            }
        }));
    })
}

fn mock_usage(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/compute/os-simple-tenant-usage")
            .header("X-Auth-Token", "token-1")
            .query_param("start", "2013-04-24T00:00:00")
            .query_param("end", "2013-04-25T00:00:00");
        then.status(200).json_body(json!({
            "tenant_usages": [
                {
                    "tenant_id": "t1",
                    "total_memory_mb_usage": 3072,
                    "total_vcpus_usage": 12.5,
                    "total_local_gb_usage": 40,
                },
                { "tenant_id": "t2", "total_vcpus_usage": 100 },
                { "tenant_id": "t3", "total_vcpus_usage": 7 },
            ]
        }));
    })
}

fn mock_extra_query(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/extra/volumes");
        then.status(200).json_body(json!([
            { "tenant_id": "t1", "total_volume_gb_usage": 15 },
        ]));
    })
}

fn mock_tenants<'a>(server: &'a MockServer, t1_description: &str) -> httpmock::Mock<'a> {
    let body = json!({
        "tenants": [
            { "id": "t1", "enabled": true, "description": t1_description },
            { "id": "t2", "enabled": false, "description": "venture:ralph;" },
            { "id": "t3", "enabled": true, "description": "shared tenant" },
        ]
    });
    server.mock(|when, then| {
        when.method(GET).path("/tenants").query_param("limit", "1000");
        then.status(200).json_body(body);
    })
}

async fn store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .insert_venture(Venture::new(1, "Ralph", true).with_symbol("ralph"))
        .await;
    Arc::new(store)
}

fn job(store: Arc<MemoryStore>, server: &MockServer) -> OpenStackSync {
    let settings = settings(server);
    let api = Arc::new(OpenStackHttpClient::new(settings.clone()).unwrap());
    OpenStackSync::new(store, settings, api)
}

#[tokio::test]
async fn openstack_sync_saves_tenant_usages_per_venture() {
    let server = MockServer::start_async().await;
    let keystone = mock_keystone(&server);
    let usage = mock_usage(&server);
    let extra = mock_extra_query(&server);
    let tenants = mock_tenants(&server, "venture:ralph; owned by ralph team");
    let store = store().await;

    let outcome = job(store.clone(), &server).run(&ctx()).await.unwrap();

    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(outcome.message, "Openstack usages were saved");
    keystone.assert_hits(3);
    usage.assert();
    extra.assert();
    tenants.assert();

    let usage_types = store.all_usage_types().await;
    let usages = store.all_daily_usages().await;
    let value_of = |name: &str| {
        let usage_type = usage_types.iter().find(|ut| ut.name == name).unwrap();
        usages
            .iter()
            .find(|usage| usage.usage_type_id == usage_type.id)
            .map(|usage| (usage.venture_id, usage.date, usage.value))
            .unwrap()
    };

    assert_eq!(usages.len(), 4);
    assert_eq!(
        value_of("OpenStack 10000 Memory GiB Hours"),
        (1, ctx().today, dec!(3))
    );
    assert_eq!(value_of("OpenStack 10000 CPU Hours").2, dec!(12.5));
    assert_eq!(value_of("OpenStack 10000 Disk GiB Hours").2, dec!(40));
    assert_eq!(value_of("OpenStack 10000 Volume GiB Hours").2, dec!(15));
    assert!(usage_types
        .iter()
        .all(|ut| ut.name != "OpenStack 10000 Images GiB Hours"));
}

#[tokio::test]
async fn rerunning_the_sync_replaces_values() {
    let server = MockServer::start_async().await;
    let _keystone = mock_keystone(&server);
    let _usage = mock_usage(&server);
    let _extra = mock_extra_query(&server);
    let _tenants = mock_tenants(&server, "venture:ralph;");
    let store = store().await;
    let job = job(store.clone(), &server);

    job.run(&ctx()).await.unwrap();
    job.run(&ctx()).await.unwrap();

    assert_eq!(store.all_daily_usages().await.len(), 4);
}

#[tokio::test]
async fn unknown_venture_symbol_fails_the_job() {
    let server = MockServer::start_async().await;
    let _keystone = mock_keystone(&server);
    let _usage = mock_usage(&server);
    let _extra = mock_extra_query(&server);
    let _tenants = mock_tenants(&server, "venture:ghost;");
    let store = store().await;

    let pipeline = SyncPipeline::new().with_job(Arc::new(job(store.clone(), &server)));
    let reports = pipeline.run(&ctx()).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].job, "openstack");
    assert_eq!(reports[0].outcome.status, SyncStatus::Failed);
    assert_eq!(reports[0].outcome.message, "venture `ghost` does not exist");
    assert!(store.all_daily_usages().await.is_empty());
}

#[tokio::test]
async fn rejected_credentials_surface_as_upstream_error() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/tokens");
        then.status(401);
    });

    let err = job(store().await, &server).run(&ctx()).await.unwrap_err();
    assert!(matches!(err, scrooge::error::AppError::Upstream(_)));
}
