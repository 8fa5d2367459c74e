//! Store behavior through the scheduler's persistence trait.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use cadence_scheduler::{SubscriptionStore, Subscription};
use cadence_store::SqliteStore;

#[tokio::test]
async fn subscriptions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.db");
    let created_at = Utc::now();

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .create(&Subscription::new(42, created_at, Duration::from_secs(3600)))
            .await
            .unwrap();
        store
            .create(&Subscription::new(7, created_at, Duration::from_secs(900)))
            .await
            .unwrap();
        store.delete(7).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let all = store.get_all().await.unwrap();

    assert_eq!(all.len(), 1);
    assert_eq!(all[0].subscriber_id, 42);
    assert_eq!(all[0].period, Duration::from_secs(3600));
    // Stored with second precision.
    assert_eq!(all[0].created_at.timestamp(), created_at.timestamp());
}

#[tokio::test]
async fn works_as_trait_object() {
    let store: Arc<dyn SubscriptionStore> = Arc::new(SqliteStore::open_in_memory().unwrap());

    let sub = Subscription::new(5, Utc::now(), Duration::from_secs(1800));
    store.create(&sub).await.unwrap();
    store.create(&sub).await.unwrap();

    assert_eq!(store.get_all().await.unwrap().len(), 1);
}
