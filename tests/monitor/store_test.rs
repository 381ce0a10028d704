// =============================================================================
// INTEGRATION TESTS - MYSQL MONITOR STORE
// Run only when TEST_DATABASE_URL points at a MySQL instance
// =============================================================================

use std::sync::Arc;

use crate::common::{mysql_store, test_url};
use pagewatch::modules::monitor::model::{CheckInterval, MatchPattern, NewMonitor};
use pagewatch::modules::monitor::MonitorStore;

fn new_monitor(url: &str, text: &str, interval: CheckInterval) -> NewMonitor {
    NewMonitor {
        url: url.to_string(),
        pattern: MatchPattern::Text(text.to_string()),
        interval,
        email_to: "owner@example.com".to_string(),
        email_message: None,
    }
}

#[tokio::test]
async fn test_mysql_create_then_get_by_id() {
    let Some(store) = mysql_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let url = test_url();
    let (definition, created) = store
        .create_or_reuse(new_monitor(&url, "SOLD OUT", CheckInterval::ThreeHours))
        .await
        .unwrap();

    assert!(created);
    assert_eq!(definition.url, url);

    let fetched = store.get_by_id(&definition.id).await.unwrap();
    assert_eq!(fetched, Some(definition));
    assert!(store.get_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mysql_reuse_keeps_stored_definition() {
    let Some(store) = mysql_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let url = test_url();
    let (first, _) = store
        .create_or_reuse(new_monitor(&url, "SOLD OUT", CheckInterval::OneHour))
        .await
        .unwrap();

    let mut changed = new_monitor(&url, "Back in stock", CheckInterval::TwelveHours);
    changed.pattern = MatchPattern::Selector("div.stock".to_string());
    changed.email_message = Some("new body".to_string());
    let (second, created) = store.create_or_reuse(changed).await.unwrap();

    assert!(!created);
    assert_eq!(second, first);
    assert_eq!(store.get_by_id(&first.id).await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_mysql_concurrent_creation_yields_one_row() {
    let Some(store) = mysql_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = Arc::new(store);
    let url = test_url();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let monitor = new_monitor(&url, &format!("pattern {}", i), CheckInterval::SixHours);
            tokio::spawn(async move { store.create_or_reuse(monitor).await.unwrap() })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let created = results.iter().filter(|(_, created)| *created).count();
    assert_eq!(created, 1);

    let id = &results[0].0.id;
    assert!(results.iter().all(|(definition, _)| &definition.id == id));
}
