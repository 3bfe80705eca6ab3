//! Integration tests for the Order aggregate.
//!
//! These tests verify the full order lifecycle including event persistence,
//! aggregate reconstruction, snapshots and concurrency handling.

use common::{AggregateId, UserId};
use domain::{
    Aggregate, DomainError, DomainEvent, EventSourcingOptions, Order, OrderError, OrderEvent,
    Repository,
};
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, InMemoryEventStore, Version,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Helper to create a repository without automatic snapshots
fn create_repository(store: InMemoryEventStore) -> Repository<InMemoryEventStore, Order> {
    init_tracing();
    Repository::with_options(store, EventSourcingOptions::without_snapshots()).unwrap()
}

/// Creates an order and saves it, returning its id and the acting user.
async fn seed_order(repo: &Repository<InMemoryEventStore, Order>) -> (AggregateId, UserId) {
    let id = AggregateId::new();
    let user = UserId::new();
    let mut order = Order::create(id, "Order 1", user, None).unwrap();
    repo.save(&mut order).await.unwrap();
    (id, user)
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_update_add_products_and_rehydrate() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let id = AggregateId::new();
        let user = UserId::new();

        let mut order = Order::create(id, "Order 1", user, None).unwrap();
        order.update_name("Order 1 Updated", user).unwrap();
        order.add_product("Product 1", user).unwrap();
        order.add_product("Product 2", user).unwrap();
        order.add_product("Product 3", user).unwrap();
        assert_eq!(order.pending_events().len(), 5);

        // All five go out in one append expecting an empty stream
        let version = repo.save(&mut order).await.unwrap();
        assert_eq!(version, Version::new(5));
        assert!(order.pending_events().is_empty());

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.name(), "Order 1 Updated");
        assert_eq!(loaded.products().len(), 3);
        assert_eq!(loaded.version(), Version::new(5));
        assert!(loaded.is_active());
        assert_eq!(loaded.audit().created_by(), Some(user));
        assert_eq!(loaded, order);

        let stored = store.load_events("order", id).await.unwrap();
        let types: Vec<_> = stored.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            [
                "order.v1.created",
                "order.v1.name_updated",
                "order.v1.product_added",
                "order.v1.product_added",
                "order.v1.product_added",
            ]
        );
    }

    #[tokio::test]
    async fn deleted_order_stays_readable_but_frozen() {
        let repo = create_repository(InMemoryEventStore::new());
        let (id, user) = seed_order(&repo).await;

        repo.execute(id, |order| order.delete(user)).await.unwrap();

        let order = repo.load_existing(id).await.unwrap().unwrap();
        assert!(order.is_deleted());
        assert_eq!(order.version(), Version::new(2));

        let err = repo
            .execute(id, |order| order.add_product("Widget", user))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::Deleted)));
    }

    #[tokio::test]
    async fn metadata_travels_with_events() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, user) = seed_order(&repo).await;

        let mut order = repo.load(id).await.unwrap();
        let event = DomainEvent::new(id, OrderEvent::product_added("Widget", user))
            .with_metadata("trace_id", serde_json::json!("trace-42"));
        order.add_event(event).unwrap();
        repo.save(&mut order).await.unwrap();

        let stored = store.load_events("order", id).await.unwrap();
        assert_eq!(stored[1].metadata["trace_id"], serde_json::json!("trace-42"));

        let found = repo.search(&OrderEvent::PRODUCT_ADDED).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata()["trace_id"], serde_json::json!("trace-42"));
    }
}

mod rehydration {
    use super::*;

    #[tokio::test]
    async fn replay_is_deterministic() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, user) = seed_order(&repo).await;
        repo.execute(id, |order| order.add_product("Widget", user))
            .await
            .unwrap();

        let first = repo.load_full(id).await.unwrap();
        let second = repo.load_full(id).await.unwrap();
        assert_eq!(first, second);

        let events = store
            .load_events("order", id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| repo.decode(e).unwrap())
            .collect::<Vec<_>>();
        let rehydrated = Order::rehydrate(id, events).unwrap();
        assert_eq!(rehydrated, first);
    }

    #[tokio::test]
    async fn snapshot_and_full_replay_agree() {
        let store = InMemoryEventStore::new();
        let options = EventSourcingOptions::default().with_snapshot_frequency(3);
        let repo: Repository<_, Order> = Repository::with_options(store.clone(), options).unwrap();
        let (id, user) = seed_order(&repo).await;

        for i in 0..7 {
            repo.execute(id, |order| order.add_product(format!("Product {i}"), user))
                .await
                .unwrap();
        }
        repo.execute(id, |order| order.remove_product("Product 2", user))
            .await
            .unwrap();

        let snapshot = store.load_snapshot("order", id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(9));

        let via_snapshot = repo.load(id).await.unwrap();
        let via_full = repo.load_full(id).await.unwrap();
        assert_eq!(via_snapshot, via_full);
        assert_eq!(via_full.version(), Version::new(9));
        assert_eq!(via_full.products().len(), 6);
    }

    #[tokio::test]
    async fn versions_are_contiguous() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, user) = seed_order(&repo).await;

        let mut order = repo.load(id).await.unwrap();
        order.add_product("A", user).unwrap();
        order.add_product("B", user).unwrap();
        repo.save(&mut order).await.unwrap();
        repo.execute(id, |order| order.update_name("Renamed", user))
            .await
            .unwrap();

        let versions: Vec<i64> = store
            .load_events("order", id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.version.as_i64())
            .collect();
        assert_eq!(versions, [1, 2, 3, 4]);
        assert_eq!(repo.load(id).await.unwrap().version(), Version::new(4));
    }

    #[tokio::test]
    async fn empty_stream_loads_blank_aggregate() {
        let repo = create_repository(InMemoryEventStore::new());
        let id = AggregateId::new();

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded, Order::with_id(id));
        assert_eq!(loaded.version(), Version::initial());
        assert!(loaded.pending_events().is_empty());
        assert!(repo.load_existing(id).await.unwrap().is_none());
        assert_eq!(
            Order::rehydrate(id, Vec::new()).unwrap(),
            Order::with_id(id)
        );
    }

    #[tokio::test]
    async fn other_categories_do_not_leak_in() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, _) = seed_order(&repo).await;

        let foreign = EventEnvelope::builder()
            .event_type("invoice.v1.created")
            .category("invoice")
            .aggregate_id(id)
            .payload_raw(serde_json::json!({"type": "invoice.v1.created", "data": {}}))
            .build();
        store.append_event(foreign, AppendOptions::expect_new()).await.unwrap();

        let order = repo.load(id).await.unwrap();
        assert_eq!(order.version(), Version::first());
    }
}

mod unknown_events {
    use super::*;

    fn archived(id: AggregateId) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("order.v1.archived")
            .category("order")
            .aggregate_id(id)
            .payload_raw(serde_json::json!({"type": "order.v1.archived", "data": {}}))
            .build()
    }

    #[tokio::test]
    async fn unknown_event_type_fails_the_load() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, _) = seed_order(&repo).await;

        store.append_event(archived(id), AppendOptions::new()).await.unwrap();

        let err = repo.load(id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::UnsupportedEvent { ref event_type, ref category }
                if event_type == "order.v1.archived" && category == "order"
        ));
        assert!(repo.load_full(id).await.is_err());
    }

    #[tokio::test]
    async fn unknown_event_after_snapshot_fails_the_load() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, _) = seed_order(&repo).await;

        let order = repo.load(id).await.unwrap();
        repo.save_snapshot(&order).await.unwrap();
        store.append_event(archived(id), AppendOptions::new()).await.unwrap();

        let err = repo.load(id).await.unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedEvent { .. }));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_saves_one_wins() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, user) = seed_order(&repo).await;

        let mut a = repo.load(id).await.unwrap();
        let mut b = repo.load(id).await.unwrap();
        a.add_product("From A", user).unwrap();
        b.add_product("From B", user).unwrap();

        let (ra, rb) = tokio::join!(repo.save(&mut a), repo.save(&mut b));

        let (winner, loser, err) = match (ra, rb) {
            (Ok(_), Err(e)) => (a, b, e),
            (Err(e), Ok(_)) => (b, a, e),
            (ra, rb) => panic!("expected exactly one winner, got {ra:?} and {rb:?}"),
        };
        assert!(err.is_concurrency_conflict());
        assert!(winner.pending_events().is_empty());
        assert_eq!(loser.pending_events().len(), 1);
        assert_eq!(store.get_version("order", id).await.unwrap(), Version::new(2));
    }

    #[tokio::test]
    async fn reload_and_retry_after_conflict() {
        let repo = create_repository(InMemoryEventStore::new());
        let (id, user) = seed_order(&repo).await;

        let mut stale = repo.load(id).await.unwrap();
        repo.execute(id, |order| order.add_product("Widget", user))
            .await
            .unwrap();

        stale.add_product("Gadget", user).unwrap();
        let err = repo.save(&mut stale).await.unwrap_err();
        assert!(err.is_concurrency_conflict());

        let result = repo
            .execute_with_retry(id, 3, |order| order.add_product("Gadget", user))
            .await
            .unwrap();
        assert_eq!(result.new_version, Version::new(3));
        assert_eq!(result.aggregate.products(), ["Widget", "Gadget"]);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let store = InMemoryEventStore::new();
        let repo = create_repository(store.clone());
        let (id, user) = seed_order(&repo).await;

        let mut calls = 0;
        let err = repo
            .execute_with_retry(id, 5, |order| {
                calls += 1;
                order.remove_product("Missing", user)
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::ProductNotFound { .. })
        ));
        assert_eq!(calls, 1);
        assert_eq!(store.event_count().await, 1);
    }
}
