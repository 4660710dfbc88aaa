use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use registry::{KeyLoader, OnDemand, PropDef, Registry, Scheduler};

struct SlowLoader {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl KeyLoader for SlowLoader {
    fn id(&self) -> &str {
        "slow-vault"
    }

    async fn load_key(&self, key: &str) -> utils::error::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Some(format!("{}-value", key)))
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within timeout");
}

#[test]
fn test_hundred_concurrent_readers_single_load() {
    let scheduler = Arc::new(Scheduler::new("ondemand-test", 2).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(OnDemand::new(
        SlowLoader {
            calls: calls.clone(),
        },
        scheduler.clone(),
    ));

    let registry = Registry::builder()
        .source(source)
        .scheduler(scheduler)
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let r = registry.clone();
        handles.push(std::thread::spawn(move || r.get("secret1")));
    }
    for h in handles {
        h.join().unwrap();
    }

    wait_for(|| registry.get("secret1").is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.get("secret1").as_deref(), Some("secret1-value"));

    registry.shutdown();
}

#[test]
fn test_bound_prop_observes_lazy_load() {
    let scheduler = Arc::new(Scheduler::new("ondemand-test", 2).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(OnDemand::new(
        SlowLoader {
            calls: calls.clone(),
        },
        scheduler.clone(),
    ));

    let registry = Registry::builder()
        .source(source)
        .scheduler(scheduler)
        .build()
        .unwrap();

    // binding an unknown key kicks off the load
    let prop = registry.bind(PropDef::string("token")).unwrap();
    assert_eq!(prop.get().unwrap(), None);

    wait_for(|| prop.get().unwrap().is_some());
    assert_eq!(prop.get().unwrap().as_deref(), Some("token-value"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    registry.shutdown();
}
