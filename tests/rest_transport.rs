use std::sync::Arc;
use std::time::Duration;

use entity_relay::application::{
    CallerHints, EntityContext, EntityFacade, HandlerRegistry, IndexOptions, SaveOptions,
    WriteOptions, oneshot_callbacks,
};
use entity_relay::cache::{CacheConfig, MemoryStore};
use entity_relay::domain::{Entity, EntityError};
use entity_relay::infra::rest::RestTransport;
use httpmock::MockServer;
use reqwest::Url;
use serde_json::{Value, json};

fn facade(server: &MockServer) -> EntityFacade {
    let base = Url::parse(&server.base_url()).expect("mock server URL");
    let transport = Arc::new(
        RestTransport::new(&base, "api", Duration::from_secs(5)).expect("transport"),
    );
    let mut registry = HandlerRegistry::new();
    transport.register_all(
        &mut registry,
        [
            ("node", None),
            ("user", None),
            ("commerce_product", Some("product_id")),
        ],
    );
    EntityFacade::new(EntityContext::new(
        CacheConfig::default(),
        Arc::new(MemoryStore::new()),
        registry,
    ))
}

async fn save(
    facade: &EntityFacade,
    entity_type: &str,
    entity: Value,
) -> Result<Value, EntityError> {
    let (success, error, outcome) = oneshot_callbacks();
    facade.save(
        entity_type,
        "article",
        Entity::try_from(entity).expect("object"),
        SaveOptions {
            success: Some(success),
            error: Some(error),
        },
    );
    outcome.await
}

#[tokio::test]
async fn retrieve_hits_resource_once_then_serves_cache() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/node/4.json");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"nid":"4","title":"Hello"}"#);
    });

    let facade = facade(&server);
    let first = facade
        .fetch("node", 4, CallerHints::default())
        .await
        .expect("remote entity");
    let second = facade
        .fetch("node", "4", CallerHints::default())
        .await
        .expect("cached entity");

    assert_eq!(first, second);
    assert_eq!(first.primary_key_value("nid"), Some(4));
    mock.assert();
}

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/user/9.json");
        then.status(200)
            .header("content-type", "application/json")
            .delay(Duration::from_millis(50))
            .body(r#"{"uid":9,"name":"editor"}"#);
    });

    let facade = facade(&server);
    let (a, b, c) = tokio::join!(
        facade.fetch("user", 9, CallerHints::default()),
        facade.fetch("user", 9, CallerHints::default()),
        facade.fetch("user", 9, CallerHints::default()),
    );

    for result in [a, b, c] {
        assert_eq!(result.expect("entity").primary_key_value("uid"), Some(9));
    }
    mock.assert();
}

#[tokio::test]
async fn remote_failure_carries_status_and_message() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/node/404.json");
        then.status(404)
            .header("content-type", "application/json")
            .body(r#"["Node 404 could not be found"]"#);
    });

    let facade = facade(&server);
    let err = facade
        .fetch("node", 404, CallerHints::default())
        .await
        .expect_err("missing node");

    match err {
        EntityError::Remote {
            handle,
            status,
            message,
        } => {
            assert_eq!(status, Some(404));
            assert_eq!(message, "Node 404 could not be found");
            assert!(handle.target.ends_with("/api/node/404.json"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert();
}

#[tokio::test]
async fn create_posts_to_collection() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/api/node.json")
            .json_body_includes(r#"{"title":"Draft","language":"und","type":"article"}"#);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"nid":"31","uri":"http://cms.example/api/node/31"}"#);
    });

    let facade = facade(&server);
    let response = save(&facade, "node", json!({"title": "Draft"}))
        .await
        .expect("created");

    assert_eq!(response["nid"], "31");
    mock.assert();
}

#[tokio::test]
async fn update_puts_to_resource() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("PUT")
            .path("/api/node/7.json")
            .json_body_includes(r#"{"nid":7,"title":"Edited"}"#);
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"nid":7}"#);
    });

    let facade = facade(&server);
    save(&facade, "node", json!({"nid": 7, "title": "Edited"}))
        .await
        .expect("updated");
    mock.assert();
}

#[tokio::test]
async fn custom_primary_key_selects_update() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("PUT").path("/api/commerce_product/12.json");
        then.status(200)
            .header("content-type", "application/json")
            .body("{}");
    });

    let facade = facade(&server);
    assert_eq!(facade.primary_key_of("commerce_product"), Some("product_id"));
    save(&facade, "commerce_product", json!({"product_id": 12, "sku": "A-1"}))
        .await
        .expect("updated");
    mock.assert();
}

#[tokio::test]
async fn delete_sends_delete_and_keeps_cache() {
    let server = MockServer::start();
    let get = server.mock(|when, then| {
        when.method("GET").path("/api/node/5.json");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"nid":5}"#);
    });
    let delete = server.mock(|when, then| {
        when.method("DELETE").path("/api/node/5.json");
        then.status(200)
            .header("content-type", "application/json")
            .body("[true]");
    });

    let facade = facade(&server);
    facade
        .fetch("node", 5, CallerHints::default())
        .await
        .expect("entity");

    let (success, error, outcome) = oneshot_callbacks();
    facade.delete(
        "node",
        5,
        WriteOptions {
            success: Some(success),
            error: Some(error),
        },
    );
    assert_eq!(outcome.await.expect("deleted"), json!([true]));

    // Still cached: no second GET.
    facade
        .fetch("node", 5, CallerHints::default())
        .await
        .expect("cached entity");
    get.assert();
    delete.assert();
}

#[tokio::test]
async fn index_query_populates_both_caches() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/api/node.json")
            .query_param("page", "0");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"nid":"10","title":"a"},{"nid":"11","title":"b"}]"#);
    });

    let facade = facade(&server);
    let listed = facade
        .fetch_index("node", "node.json?page=0", CallerHints::default())
        .await
        .expect("index");
    assert_eq!(listed.len(), 2);

    let again = facade
        .fetch_index("node", "node.json?page=0", CallerHints::default())
        .await
        .expect("cached index");
    assert_eq!(again, listed);

    // Listed entities are individually cached as well.
    facade
        .fetch("node", 11, CallerHints::default())
        .await
        .expect("cached entity");
    mock.assert();
}

#[tokio::test]
async fn index_reset_goes_back_to_remote() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/user.json");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"uid":1}]"#);
    });

    let facade = facade(&server);
    for reset in [false, true] {
        let (success, error, outcome) = oneshot_callbacks();
        facade.index(
            "user",
            "user.json",
            IndexOptions {
                reset,
                success: Some(success),
                error: Some(error),
                ..Default::default()
            },
        );
        outcome.await.expect("index");
    }
    mock.assert_calls(2);
}

#[tokio::test]
async fn transport_root_joins_configured_endpoint() {
    let base = Url::parse("http://127.0.0.1:9").expect("url");
    let transport = RestTransport::new(&base, "/services/rest/", Duration::from_secs(1))
        .expect("transport");
    assert_eq!(transport.root().as_str(), "http://127.0.0.1:9/services/rest/");
}
