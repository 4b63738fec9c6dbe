//! Behaviour every [`BundleStorage`] backend must share.
//!
//! Each check takes a freshly opened, empty store.

use satnet_bpa::{
    bundle::{Bundle, Priority},
    metadata::BundleStatus,
    storage::{BundleStorage, Error, Filter, Order},
};
use std::sync::Arc;

pub type Store = Arc<dyn BundleStorage>;

fn bundle(destination: &str, priority: Priority, payload: &'static str) -> Bundle {
    Bundle::builder("dtn://src/", destination)
        .priority(priority)
        .payload(payload)
        .build()
}

// Gives each store call a distinct stored_at, even at millisecond resolution
async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
}

fn ids(bundles: &[Bundle]) -> Vec<String> {
    bundles.iter().map(|b| b.id().to_string()).collect()
}

pub async fn store_and_retrieve(store: Store) {
    let b = bundle("dtn://dst/", Priority::Expedited, "hello");
    assert!(store.store(&b).await.unwrap());

    let copy = store.retrieve(&b.id()).await.unwrap();
    assert_eq!(copy.id(), b.id());
    assert_eq!(copy.source(), "dtn://src/");
    assert_eq!(copy.destination(), "dtn://dst/");
    assert_eq!(copy.priority(), Priority::Expedited);
    assert_eq!(copy.payload(), b.payload());
    assert_eq!(copy.hash(), b.hash());
    assert_eq!(store.status(&b.id()).await.unwrap(), BundleStatus::Pending);
    assert_eq!(store.count().await.unwrap(), 1);
}

pub async fn duplicate_is_not_restored(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "once");
    assert!(store.store(&b).await.unwrap());
    store
        .update_status(&b.id(), BundleStatus::InTransit)
        .await
        .unwrap();

    assert!(!store.store(&b).await.unwrap());
    assert_eq!(
        store.status(&b.id()).await.unwrap(),
        BundleStatus::InTransit
    );
    assert_eq!(store.count().await.unwrap(), 1);
}

pub async fn invalid_bundle_is_rejected(store: Store) {
    let b = Bundle::create("dtn://src/", "", "nowhere");
    assert!(matches!(store.store(&b).await, Err(Error::Invalid(_))));
    assert_eq!(store.count().await.unwrap(), 0);
}

pub async fn unknown_ids(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "ghost");
    assert!(matches!(
        store.retrieve(&b.id()).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(store.delete(&b.id()).await, Err(Error::NotFound(_))));
    assert!(matches!(store.status(&b.id()).await, Err(Error::NotFound(_))));
    assert!(matches!(
        store.update_status(&b.id(), BundleStatus::Delivered).await,
        Err(Error::NotFound(_))
    ));
}

pub async fn delete_removes(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "bye");
    store.store(&b).await.unwrap();
    store.delete(&b.id()).await.unwrap();
    assert!(matches!(store.delete(&b.id()).await, Err(Error::NotFound(_))));

    assert_eq!(store.count().await.unwrap(), 0);
    assert!(matches!(
        store.retrieve(&b.id()).await,
        Err(Error::NotFound(_))
    ));
}

pub async fn terminal_status_is_final(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "done");
    store.store(&b).await.unwrap();
    store
        .update_status(&b.id(), BundleStatus::InTransit)
        .await
        .unwrap();
    store
        .update_status(&b.id(), BundleStatus::Pending)
        .await
        .unwrap();
    store
        .update_status(&b.id(), BundleStatus::Delivered)
        .await
        .unwrap();

    // Re-applying is harmless
    store
        .update_status(&b.id(), BundleStatus::Delivered)
        .await
        .unwrap();
    assert!(matches!(
        store.update_status(&b.id(), BundleStatus::Pending).await,
        Err(Error::TerminalStatus {
            from: BundleStatus::Delivered,
            to: BundleStatus::Pending,
            ..
        })
    ));
    assert_eq!(
        store.status(&b.id()).await.unwrap(),
        BundleStatus::Delivered
    );
}

pub async fn replace_keeps_custody(store: Store) {
    let mut b = bundle("dtn://dst/", Priority::Normal, "moving");
    store.store(&b).await.unwrap();
    store
        .update_status(&b.id(), BundleStatus::InTransit)
        .await
        .unwrap();

    b.increment_hop("relay");
    store.replace(&b).await.unwrap();

    let held = store.retrieve(&b.id()).await.unwrap();
    assert_eq!(held.hop_count(), 1);
    assert_eq!(held.previous_node(), Some("relay"));
    assert_eq!(
        store.status(&b.id()).await.unwrap(),
        BundleStatus::InTransit
    );

    let missing = bundle("dtn://dst/", Priority::Normal, "missing");
    assert!(matches!(store.replace(&missing).await, Err(Error::NotFound(_))));
}

pub async fn concurrent_status_updates(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "contested");
    let id = b.id();
    store.store(&b).await.unwrap();

    let targets = [
        BundleStatus::Delivered,
        BundleStatus::Failed,
        BundleStatus::Expired,
    ];
    let tasks = (0..24)
        .map(|i| {
            let store = store.clone();
            let target = targets[i % targets.len()];
            tokio::spawn(async move { (target, store.update_status(&id, target).await) })
        })
        .collect::<Vec<_>>();

    let mut winners = Vec::new();
    let mut refused = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            (target, Ok(())) => winners.push(target),
            (target, Err(Error::TerminalStatus { from, to, .. })) => {
                assert_eq!(to, target);
                refused.push(from);
            }
            (_, Err(e)) => panic!("unexpected error {e}"),
        }
    }

    // One terminal state won, and everything refused saw that same winner
    let last = store.status(&id).await.unwrap();
    assert!(!winners.is_empty());
    assert!(winners.iter().all(|s| *s == last));
    assert!(refused.iter().all(|s| *s == last));
    assert_eq!(winners.len() + refused.len(), 24);
}

pub async fn concurrent_updates_on_many_ids(store: Store) {
    let mut ids = Vec::new();
    for _ in 0..32 {
        let b = bundle("dtn://dst/", Priority::Normal, "many");
        ids.push(b.id());
        store.store(&b).await.unwrap();
    }

    let tasks = ids
        .iter()
        .map(|id| {
            let store = store.clone();
            let id = *id;
            tokio::spawn(async move { store.update_status(&id, BundleStatus::InTransit).await })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let moved = store
        .list(&Filter::with_status(BundleStatus::InTransit))
        .await
        .unwrap();
    assert_eq!(moved.len(), ids.len());
    assert!(
        store
            .list(&Filter::with_status(BundleStatus::Pending))
            .await
            .unwrap()
            .is_empty()
    );
}

pub async fn concurrent_delete_and_update(store: Store) {
    let b = bundle("dtn://dst/", Priority::Normal, "contested");
    let id = b.id();
    store.store(&b).await.unwrap();

    let deletes = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.delete(&id).await })
        })
        .collect::<Vec<_>>();
    let updates = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.update_status(&id, BundleStatus::InTransit).await })
        })
        .collect::<Vec<_>>();

    let mut deleted = 0;
    for task in deletes {
        match task.await.unwrap() {
            Ok(()) => deleted += 1,
            Err(Error::NotFound(_)) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    for task in updates {
        assert!(matches!(
            task.await.unwrap(),
            Ok(()) | Err(Error::NotFound(_))
        ));
    }

    assert_eq!(deleted, 1);
    assert!(matches!(store.status(&id).await, Err(Error::NotFound(_))));
    assert_eq!(store.count().await.unwrap(), 0);
}

pub async fn list_filters(store: Store) {
    let to_a = bundle("dtn://a/", Priority::Bulk, "1");
    let to_b = bundle("dtn://b/", Priority::Normal, "2");
    let urgent = bundle("dtn://a/", Priority::Expedited, "3");
    for b in [&to_a, &to_b, &urgent] {
        store.store(b).await.unwrap();
    }
    store
        .update_status(&to_b.id(), BundleStatus::InTransit)
        .await
        .unwrap();

    let by_destination = store
        .list(&Filter {
            destination: Some("dtn://a/".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ids(&by_destination), ids(&[urgent.clone(), to_a.clone()]));

    let pending = store
        .list(&Filter::with_status(BundleStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|b| b.id() != to_b.id()));

    let important = store
        .list(&Filter {
            min_priority: Some(Priority::Normal),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ids(&important), ids(&[urgent.clone(), to_b.clone()]));

    let none = store
        .list(&Filter {
            source: Some("dtn://elsewhere/".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());

    let recent = store
        .list(&Filter {
            max_age: Some(time::Duration::minutes(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.len(), 3);
}

pub async fn list_orders(store: Store) {
    let large = bundle("dtn://a/", Priority::Normal, "a considerably larger payload");
    let bulk = bundle("dtn://a/", Priority::Bulk, "");
    let small = bundle("dtn://a/", Priority::Normal, "x");
    let urgent = bundle("dtn://a/", Priority::Expedited, "xx");
    for b in [&large, &bulk, &small, &urgent] {
        store.store(b).await.unwrap();
        tick().await;
    }

    let by_priority = store.list(&Filter::default()).await.unwrap();
    assert_eq!(
        ids(&by_priority),
        ids(&[urgent.clone(), large.clone(), small.clone(), bulk.clone()])
    );

    let by_age = store
        .list(&Filter {
            order: Order::Age,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        ids(&by_age),
        ids(&[large.clone(), bulk.clone(), small.clone(), urgent.clone()])
    );

    let by_size = store
        .list(&Filter {
            order: Order::Size,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ids(&by_size), ids(&[bulk.clone(), small, urgent, large]));

    let limited = store
        .list(&Filter {
            limit: Some(1),
            order: Order::Age,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id(), by_age[0].id());
    assert_eq!(by_age[1].id(), bulk.id());
}

pub async fn purge_removes_only_expired(store: Store) {
    let brief = Bundle::builder("dtn://src/", "dtn://dst/")
        .lifetime(time::Duration::milliseconds(20))
        .payload("brief")
        .build();
    let lasting = bundle("dtn://dst/", Priority::Normal, "lasting");
    store.store(&brief).await.unwrap();
    store.store(&lasting).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(store.purge_expired().await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.retrieve(&lasting.id()).await.is_ok());
}

/// Runs every check in this crate against stores produced by `$open`.
#[macro_export]
macro_rules! contract_tests {
    ($open:expr) => {
        $crate::contract_tests!(@tests $open;
            store_and_retrieve,
            duplicate_is_not_restored,
            invalid_bundle_is_rejected,
            unknown_ids,
            delete_removes,
            terminal_status_is_final,
            replace_keeps_custody,
            concurrent_status_updates,
            concurrent_updates_on_many_ids,
            concurrent_delete_and_update,
            list_filters,
            list_orders,
            purge_removes_only_expired
        );
    };
    (@tests $open:expr; $($name:ident),+) => {
        $(
            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn $name() {
                let (store, _guard) = $open;
                $crate::$name(store).await;
            }
        )+
    };
}
