use std::time::Duration;

use shoplane_core::{Money, ProductId, VariantKey};

use super::*;
use crate::cache::{LocalCacheExt, MemoryCache, keys};
use crate::notify::{NoticeLevel, drain};
use crate::test_support::{Failure, FakeRemote, Harness, product, sample_identity};

/// Poll `condition` until it holds, yielding to background tasks in between.
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

#[tokio::test]
async fn test_same_variant_twice_keeps_one_line() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    let p1 = product("p1", 500);

    assert_eq!(
        h.store.add_item(&p1, Some(VariantKey::size("M"))),
        AddOutcome::Added
    );
    assert_eq!(
        h.store.add_item(&p1, Some(VariantKey::size("M"))),
        AddOutcome::AlreadyPresent
    );
    assert_eq!(h.store.cart().len(), 1);
    assert_eq!(h.store.cart()[0].quantity, 1);

    h.store.add_item(&p1, Some(VariantKey::size("L")));
    assert_eq!(h.store.cart().len(), 2);
}

#[tokio::test]
async fn test_duplicate_add_notifies_and_skips_remote() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    let mut notices = h.notifier.subscribe();
    let p1 = product("p1", 500);

    h.store.add_item(&p1, None);
    h.store.add_item(&p1, None);
    h.store.settle().await;

    let notices = drain(&mut notices);
    assert_eq!(notices[0].message, "Added to bag!");
    assert_eq!(notices[1].message, "Item already in bag!");
    assert_eq!(notices[1].level, NoticeLevel::Info);
    assert_eq!(h.remote.calls(), vec!["add p1 x1"]);
}

#[tokio::test]
async fn test_removing_only_line_empties_memory_and_cache() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.remove_item(&pid("p1"), None);

    assert!(h.store.cart().is_empty());
    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn test_writes_through_before_returning() {
    let h = Harness::signed_out(FakeRemote::new());
    h.store.add_item(&product("p1", 500), None);
    h.store.update_quantity(&pid("p1"), 4, None);

    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].quantity, 4);
}

#[tokio::test]
async fn test_update_quantity_below_one_is_noop() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.update_quantity(&pid("p1"), 3, None);
    h.store.update_quantity(&pid("p1"), 0, None);
    h.store.settle().await;

    assert_eq!(h.store.cart()[0].quantity, 3);
    assert_eq!(h.remote.calls(), vec!["add p1 x1", "update p1 x3"]);
}

#[tokio::test]
async fn test_mutations_reach_server_in_order() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.add_to_wishlist(&product("p2", 800));
    h.store.add_item(&product("p2", 800), None);
    h.store.remove_item(&pid("p1"), None);
    h.store.remove_from_wishlist(&pid("p2"));
    h.store.settle().await;

    assert_eq!(
        h.remote.calls(),
        vec!["add p1 x1", "wish+ p2", "add p2 x1", "remove p1", "wish- p2"]
    );
}

#[tokio::test]
async fn test_superseded_quantity_updates_are_coalesced() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.update_quantity(&pid("p1"), 2, None);
    h.store.update_quantity(&pid("p1"), 3, None);
    h.store.update_quantity(&pid("p1"), 5, None);
    h.store.settle().await;

    assert_eq!(h.remote.calls(), vec!["add p1 x1", "update p1 x5"]);
    assert_eq!(h.remote.remote_cart()[0].quantity, 5);
}

#[tokio::test]
async fn test_revisions_increase_per_change() {
    let h = Harness::signed_out(FakeRemote::new());
    h.store.add_item(&product("p1", 500), None);
    let first = h.store.line(&pid("p1"), None).unwrap().revision;
    h.store.update_quantity(&pid("p1"), 2, None);
    let second = h.store.line(&pid("p1"), None).unwrap().revision;
    assert!(second > first);
}

#[tokio::test]
async fn test_update_for_absent_line_leaves_revisions_alone() {
    let h = Harness::signed_out(FakeRemote::new());
    h.store.add_item(&product("p1", 500), None);
    let first = h.store.line(&pid("p1"), None).unwrap().revision;

    h.store.update_quantity(&pid("p9"), 2, None);
    h.store.update_quantity(&pid("p1"), 2, None);

    assert!(h.store.line(&pid("p9"), None).is_none());
    assert_eq!(h.store.line(&pid("p1"), None).unwrap().revision, first + 1);
}

#[tokio::test]
async fn test_signed_out_mutations_stay_local() {
    let h = Harness::signed_out(FakeRemote::new());
    h.store.add_item(&product("p1", 500), None);
    h.store.add_to_wishlist(&product("p2", 500));
    h.store.settle().await;

    assert_eq!(h.store.cart().len(), 1);
    assert_eq!(h.store.wishlist().len(), 1);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_wishlist_has_set_semantics() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    let p1 = product("p1", 500);
    assert_eq!(h.store.add_to_wishlist(&p1), AddOutcome::Added);
    assert_eq!(h.store.add_to_wishlist(&p1), AddOutcome::AlreadyPresent);
    assert!(h.store.in_wishlist(&pid("p1")));

    h.store.remove_from_wishlist(&pid("p1"));
    assert!(!h.store.in_wishlist(&pid("p1")));
}

#[tokio::test]
async fn test_keep_optimistic_policy_keeps_local_line() {
    let remote = FakeRemote::new();
    remote.fail_mutations(Some(Failure::Server));
    let h = Harness::signed_in(remote, MutationFailurePolicy::KeepOptimistic);
    let mut notices = h.notifier.subscribe();

    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;

    assert_eq!(h.store.cart().len(), 1);
    assert!(h.session.is_signed_in());
    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| n.level == NoticeLevel::Error
        && n.message.starts_with("Couldn't sync your bag")));
    assert!(!h.remote.calls().contains(&"fetch_cart".to_string()));
}

#[tokio::test]
async fn test_reconcile_policy_restores_remote_state() {
    let remote = FakeRemote::new();
    remote.fail_mutations(Some(Failure::Server));
    let h = Harness::signed_in(remote, MutationFailurePolicy::Reconcile);

    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;

    assert!(h.store.cart().is_empty());
    assert!(h.remote.calls().contains(&"fetch_cart".to_string()));
    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn test_reconcile_waits_for_queue_to_drain() {
    let remote = FakeRemote::new();
    remote.fail_mutations(Some(Failure::Server));
    let h = Harness::signed_in(remote, MutationFailurePolicy::Reconcile);

    h.store.add_item(&product("p1", 500), None);
    h.store.add_item(&product("p2", 500), None);
    h.store.add_item(&product("p3", 500), None);
    h.store.settle().await;

    let fetches = h
        .remote
        .calls()
        .iter()
        .filter(|call| *call == "fetch_cart")
        .count();
    assert_eq!(fetches, 1);
}

#[tokio::test]
async fn test_unauthorized_mutation_wipes_everything() {
    let remote = FakeRemote::new();
    remote.fail_mutations(Some(Failure::Unauthorized));
    let h = Harness::signed_in(remote, MutationFailurePolicy::KeepOptimistic);

    h.store.add_to_wishlist(&product("p2", 500));
    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;

    assert!(h.store.cart().is_empty());
    assert!(h.store.wishlist().is_empty());
    assert!(!h.session.is_signed_in());
    assert_eq!(h.cache.get_raw(keys::TOKEN).unwrap(), None);
}

#[tokio::test]
async fn test_fetch_replaces_local_state() {
    let mut remote_line = CartLine::new(product("p9", 1200), None, 0);
    remote_line.quantity = 2;
    let h = Harness::signed_in(
        FakeRemote::with_cart(vec![remote_line]),
        MutationFailurePolicy::default(),
    );
    assert!(h.store.is_loading());

    assert_eq!(h.store.fetch_remote_state().await, SyncOutcome::Synced);
    let cart = h.store.cart();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].product.id.as_str(), "p9");
    assert!(cart[0].revision > 0);
    assert!(!h.store.is_loading());

    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert_eq!(cached, cart);
}

#[tokio::test]
async fn test_fetch_unauthorized_clears_credential() {
    let remote = FakeRemote::new();
    remote.fail_fetch(Some(Failure::Unauthorized));
    let h = Harness::signed_in(remote, MutationFailurePolicy::default());
    h.store.add_to_wishlist(&product("p1", 500));
    h.store.settle().await;

    assert_eq!(h.store.fetch_remote_state().await, SyncOutcome::Unauthorized);
    assert!(h.store.wishlist().is_empty());
    assert!(!h.session.is_signed_in());
    assert_eq!(h.cache.get_raw(keys::WISHLIST).unwrap(), None);
}

#[tokio::test]
async fn test_fetch_failure_keeps_local_state() {
    let remote = FakeRemote::new();
    let h = Harness::signed_in(Arc::clone(&remote), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;
    remote.fail_fetch(Some(Failure::Server));

    assert_eq!(h.store.fetch_remote_state().await, SyncOutcome::Failed);
    assert_eq!(h.store.cart().len(), 1);
}

#[tokio::test]
async fn test_fetch_when_signed_out_is_skipped() {
    let h = Harness::signed_out(FakeRemote::new());
    assert_eq!(h.store.fetch_remote_state().await, SyncOutcome::Skipped);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_clear_after_order_empties_cart_on_success() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.add_to_wishlist(&product("p2", 500));

    h.store.clear_after_order().await;

    assert!(h.store.cart().is_empty());
    assert_eq!(h.store.wishlist().len(), 1);
    assert!(h.remote.remote_cart().is_empty());
    assert!(h.remote.calls().contains(&"empty".to_string()));
    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn test_clear_after_order_empties_cart_on_failure() {
    let remote = FakeRemote::new();
    let h = Harness::signed_in(Arc::clone(&remote), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;
    remote.fail_mutations(Some(Failure::Server));

    h.store.clear_after_order().await;

    assert!(h.store.cart().is_empty());
    let cached: Vec<CartLine> = h.cache.get(keys::CART).unwrap().unwrap();
    assert!(cached.is_empty());
    assert_eq!(h.remote.remote_cart().len(), 1);
}

#[tokio::test]
async fn test_clear_all_wipes_state_and_credential() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.add_to_wishlist(&product("p2", 500));

    h.store.clear_all();

    assert!(h.store.cart().is_empty());
    assert!(h.store.wishlist().is_empty());
    assert!(!h.session.is_signed_in());
    assert_eq!(h.cache.get_raw(keys::CART).unwrap(), None);
}

#[tokio::test]
async fn test_external_sign_out_clears_store() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;

    h.session.sign_out();

    let store = h.store.clone();
    eventually(move || store.cart().is_empty()).await;
}

#[tokio::test]
async fn test_sign_in_triggers_remote_load() {
    let remote = FakeRemote::with_cart(vec![CartLine::new(product("p7", 300), None, 0)]);
    let h = Harness::signed_out(remote);
    assert!(h.store.cart().is_empty());

    h.session.sign_in(sample_identity()).unwrap();

    let store = h.store.clone();
    eventually(move || store.cart().len() == 1).await;
}

#[tokio::test]
async fn test_store_seeds_from_cache() {
    let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
    let mut line = CartLine::new(product("p1", 500), None, 7);
    line.quantity = 2;
    cache.set(keys::CART, &vec![line]).unwrap();

    let session = Session::restore(Arc::clone(&cache));
    let h = Harness::build(
        cache,
        FakeRemote::new(),
        session,
        MutationFailurePolicy::default(),
    );
    assert_eq!(h.store.cart()[0].quantity, 2);
    assert!(!h.store.is_loading());

    h.store.add_item(&product("p2", 100), None);
    assert!(h.store.line(&pid("p2"), None).unwrap().revision > 7);
}

#[tokio::test]
async fn test_summary_uses_snapshot_prices() {
    let h = Harness::signed_out(FakeRemote::new());
    h.store.add_item(&product("p1", 500), None);
    let summary = h.store.summary(&Pricing::default());
    assert_eq!(summary.total, Money::from_major(520));
}

#[tokio::test]
async fn test_shutdown_stops_remote_delivery() {
    let h = Harness::signed_in(FakeRemote::new(), MutationFailurePolicy::default());
    h.store.shutdown().await;

    h.store.add_item(&product("p1", 500), None);
    h.store.settle().await;

    assert_eq!(h.store.cart().len(), 1);
    assert!(h.remote.calls().is_empty());
}

#[test]
fn test_failure_policy_parsing() {
    assert_eq!(
        "reconcile".parse::<MutationFailurePolicy>(),
        Ok(MutationFailurePolicy::Reconcile)
    );
    assert_eq!(
        "Keep_Optimistic".parse::<MutationFailurePolicy>(),
        Ok(MutationFailurePolicy::KeepOptimistic)
    );
    assert!("sometimes".parse::<MutationFailurePolicy>().is_err());
}
