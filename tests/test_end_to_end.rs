use std::sync::Arc;
use std::time::Duration;

use docstore::mock::MemoryDocumentStore;
use docstore::WatchSource;
use props::registry::{Group, LayerOptions, PropDef, Registry, Scheduler};
use props::sources::{MemorySource, StaticSource};
use props::Source;

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_three_layer_stack() {
    let defaults = StaticSource::new(
        "defaults",
        "server.port=8080\nserver.pool.min=1\nserver.pool.max=4\n",
    );
    let store = MemoryDocumentStore::new("shared-config");
    store.insert("server.port", "9090");
    let overrides = Arc::new(MemorySource::new("local-overrides"));

    let scheduler = Arc::new(Scheduler::current().unwrap());
    let registry = Registry::builder()
        .source_with(Arc::new(defaults), LayerOptions::default().priority(0))
        .source_with(
            Arc::new(WatchSource::new(store.clone(), scheduler.clone())),
            LayerOptions::default().priority(10),
        )
        .source_with(overrides.clone(), LayerOptions::default().priority(20))
        .scheduler(scheduler)
        .build()
        .unwrap();

    // defaults visible immediately; the document store wins once watched
    assert_eq!(registry.get("server.pool.min").as_deref(), Some("1"));
    let r = registry.clone();
    wait_for(move || r.get("server.port").as_deref() == Some("9090")).await;

    // the local override beats everything
    overrides.set("server.port", "7000");
    overrides.refresh();
    assert_eq!(registry.get("server.port").as_deref(), Some("7000"));

    // withdrawing it falls back to the document store
    overrides.remove("server.port");
    overrides.refresh();
    assert_eq!(registry.get("server.port").as_deref(), Some("9090"));

    // and deleting the document falls back to the bundled default
    store.delete("server.port");
    let r = registry.clone();
    wait_for(move || r.get("server.port").as_deref() == Some("8080")).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_group_over_live_layers() {
    let store = MemoryDocumentStore::new("shared-config");
    store.insert("pool.min", "1");
    store.insert("pool.max", "4");

    let scheduler = Arc::new(Scheduler::current().unwrap());
    let registry = Registry::builder()
        .source(Arc::new(WatchSource::new(store.clone(), scheduler.clone())))
        .scheduler(scheduler)
        .build()
        .unwrap();

    let min = registry.bind(PropDef::int("pool.min")).unwrap();
    let max = registry.bind(PropDef::int("pool.max")).unwrap();
    {
        let min = min.clone();
        wait_for(move || min.get().unwrap() == Some(1)).await;
    }
    {
        let max = max.clone();
        wait_for(move || max.get().unwrap() == Some(4)).await;
    }

    let bounds = Group::of((min, max));
    assert_eq!(bounds.get(), (Some(1), Some(4)));

    store.insert("pool.max", "16");
    {
        let bounds = bounds.clone();
        wait_for(move || bounds.get() == (Some(1), Some(16))).await;
    }
}
