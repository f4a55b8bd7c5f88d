use actgate_core::ErrorKind;
use actgate_core::schema::ServiceKey;
use actgate_core::schema::cache::BuildError;
use router_fixture::{FixtureCompiler, cache};
use std::sync::Arc;
use std::time::Duration;

mod router_fixture;

#[tokio::test]
async fn test_second_get_is_a_cache_hit() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler.clone(), 3600);

    let first = cache.get_bundle("router").await.unwrap();
    let second = cache.get_bundle("router").await.unwrap();

    assert_eq!(compiler.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.list_services(), second.list_services());
}

#[tokio::test]
async fn test_expired_entry_is_recompiled() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler.clone(), 1);

    cache.get_bundle("router").await.unwrap();
    assert_eq!(compiler.calls(), 1);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    cache.get_bundle("router").await.unwrap();

    assert_eq!(compiler.calls(), 2);
}

#[tokio::test]
async fn test_failed_compilation_is_not_cached() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler.clone(), 3600);

    let err = cache.get_bundle("broken").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);
    match err {
        BuildError::Compile(err) => assert_eq!(err.file(), Some("broken.proto")),
        other => panic!("Expected a compilation error, got {other:?}"),
    }
    assert!(cache.is_empty());

    cache.get_bundle("broken").await.unwrap_err();
    assert_eq!(compiler.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_misses_converge_on_one_build() {
    let compiler = Arc::new(FixtureCompiler::slow(Duration::from_millis(50)));
    let cache = cache(compiler.clone(), 3600);

    let (a, b, c) = tokio::join!(
        cache.get_bundle("router"),
        cache.get_bundle("router"),
        cache.get_bundle("router"),
    );

    assert_eq!(compiler.calls(), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
}

#[tokio::test]
async fn test_bundle_indexes_every_file_of_the_component() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler, 3600);

    let services = cache.list_services("router").await.unwrap();

    assert_eq!(
        services,
        vec![ServiceKey::new("router", "Desk"), ServiceKey::new("router", "Echo")]
    );
}

#[tokio::test]
async fn test_describe_service_reports_qualified_types() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler, 3600);

    let service = cache
        .describe_service(&ServiceKey::new("router", "Echo"))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&service).unwrap(),
        serde_json::json!({
            "name": "router:Echo",
            "methods": [
                {
                    "methodName": "Ping",
                    "inputType": "router.EchoRequest",
                    "outputType": "router.EchoResponse"
                },
                {
                    "methodName": "Check",
                    "inputType": "router.EchoRequest",
                    "outputType": "router.CheckResponse"
                }
            ]
        })
    );
}

#[tokio::test]
async fn test_method_schema_lookup() {
    let compiler = Arc::new(FixtureCompiler::default());
    let cache = cache(compiler, 3600);
    let key = ServiceKey::new("router", "Echo");

    let all = cache.json_schema(&key, None).await.unwrap();
    let ping = cache.json_schema(&key, Some("Ping")).await.unwrap();
    let missing = cache.json_schema(&key, Some("Shout")).await.unwrap_err();

    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["router.EchoRequest"]);
    assert_eq!(ping.len(), 2);
    assert_eq!(ping["router.EchoResponse"].schema["title"], "router.EchoResponse");
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}
