use contacts_core::{Contact, ContactQuery, ContactStore, StoreConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn names(rows: &[Contact]) -> Vec<String> {
    rows.iter().map(|c| c.name.clone()).collect()
}

fn drain_latest(rx: &Receiver<Vec<Contact>>) -> Option<Vec<Contact>> {
    let mut latest = None;
    while let Ok(rows) = rx.try_recv() {
        latest = Some(rows);
    }
    latest
}

#[test]
fn favorites_subscription_receives_new_favorite_after_insert() {
    let store = ContactStore::open_in_memory().unwrap();
    let (_subscription, rx) = store.subscribe_channel(ContactQuery::Favorites);

    let initial = rx.try_recv().unwrap();
    assert!(initial.is_empty());

    store
        .insert(&Contact::new("Ada", "1").with_favorite(true))
        .unwrap();

    let refreshed = rx.try_recv().unwrap();
    assert_eq!(names(&refreshed), vec!["Ada"]);
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn every_mutation_kind_refreshes_views() {
    let store = ContactStore::open_in_memory().unwrap();
    let (_subscription, rx) = store.subscribe_channel(ContactQuery::All);
    assert!(rx.try_recv().unwrap().is_empty());

    let id = store.insert(&Contact::new("Ada", "1")).unwrap();
    assert_eq!(names(&rx.try_recv().unwrap()), vec!["Ada"]);

    let mut renamed = store.get_by_id(id).unwrap().unwrap();
    renamed.name = "Ada L".to_string();
    store.update(&renamed).unwrap();
    assert_eq!(names(&rx.try_recv().unwrap()), vec!["Ada L"]);

    store.toggle_favorite(id, true).unwrap();
    assert!(rx.try_recv().unwrap()[0].is_favorite);

    store.mark_called(id, 500).unwrap();
    assert_eq!(rx.try_recv().unwrap()[0].last_called_at, Some(500));

    store.delete_by_id(id).unwrap();
    assert!(rx.try_recv().unwrap().is_empty());
}

#[test]
fn noop_mutations_do_not_redeliver() {
    let store = ContactStore::open_in_memory().unwrap();
    let (_subscription, rx) = store.subscribe_channel(ContactQuery::All);
    rx.try_recv().unwrap();

    store.delete_by_id(404).unwrap();
    store.toggle_favorite(404, true).unwrap();
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn failed_mutation_does_not_redeliver() {
    let store = ContactStore::open_in_memory().unwrap();
    let mut ada = Contact::new("Ada", "1");
    ada.id = 1;
    store.insert(&ada).unwrap();

    let (_subscription, rx) = store.subscribe_channel(ContactQuery::All);
    rx.try_recv().unwrap();

    assert!(store.insert(&ada).is_err());
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn cancelled_subscription_stops_delivery() {
    let store = ContactStore::open_in_memory().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let subscription = store.subscribe(ContactQuery::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    store.insert(&Contact::new("Ada", "1")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    subscription.cancel();
    assert_eq!(store.subscription_count(), 0);
    store.insert(&Contact::new("Bob", "2")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dropping_receiver_releases_subscription() {
    let store = ContactStore::open_in_memory().unwrap();
    let (subscription, rx) = store.subscribe_channel(ContactQuery::All);
    drop(rx);

    store.insert(&Contact::new("Ada", "1")).unwrap();
    assert_eq!(store.subscription_count(), 0);
    assert!(!subscription.is_active());
}

#[test]
fn views_only_include_matching_rows() {
    let store = ContactStore::open_in_memory().unwrap();
    let (_work, work_rx) = store.subscribe_channel(ContactQuery::ByGroup("Work".to_string()));
    let (_recent, recent_rx) = store.subscribe_channel(ContactQuery::RecentlyContacted(1));
    work_rx.try_recv().unwrap();
    recent_rx.try_recv().unwrap();

    let a = store.insert(&Contact::new("A", "1").with_group("Work")).unwrap();
    let b = store.insert(&Contact::new("B", "2").with_group("Home")).unwrap();
    store.mark_called(a, 10).unwrap();
    store.mark_called(b, 20).unwrap();

    assert_eq!(names(&drain_latest(&work_rx).unwrap()), vec!["A"]);
    assert_eq!(names(&drain_latest(&recent_rx).unwrap()), vec!["B"]);
}

#[test]
fn callback_may_mutate_store_without_deadlock() {
    let store = Arc::new(ContactStore::open_in_memory().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let store_in_callback = Arc::clone(&store);
    let seen_in_callback = Arc::clone(&seen);
    let _subscription = store.subscribe(ContactQuery::Favorites, move |rows| {
        seen_in_callback.lock().unwrap().push(rows.len());
        // Auto-favorite anyone named "Ada" the first time they show up.
        if rows.is_empty() {
            if let Some(ada) = store_in_callback
                .search("Ada")
                .unwrap()
                .into_iter()
                .find(|c| !c.is_favorite)
            {
                store_in_callback.toggle_favorite(ada.id, true).unwrap();
            }
        }
    });

    store.insert(&Contact::new("Ada", "1")).unwrap();

    assert_eq!(store.get_favorites().unwrap().len(), 1);
    assert_eq!(seen.lock().unwrap().last().copied(), Some(1));
}

#[test]
fn file_backed_store_delivers_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::with_path(dir.path().join("live.sqlite3"));
    let store = Arc::new(ContactStore::open(&config).unwrap());
    let (_subscription, rx) = store.subscribe_channel(ContactQuery::All);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let handles = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..5 {
                    store
                        .insert(&Contact::new(format!("w{worker}-{n}"), "555"))
                        .unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    let latest = drain_latest(&rx).expect("at least one refresh");
    assert_eq!(latest.len(), 20);
    assert_eq!(store.count().unwrap(), 20);
}
