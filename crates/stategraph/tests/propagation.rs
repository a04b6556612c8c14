#![forbid(unsafe_code)]

//! Integration tests: change propagation through cells, wrappers, synced
//! cells and stores.

use std::cell::Cell;
use std::rc::Rc;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use stategraph::{
    AbstractProperty, FnSubscriber, Observed, ObservedProperty, Prop, Roles, StateContext,
    StateError, Subscriber, TrackedProperty, observed_fields,
};

fn counter(ctx: &StateContext, roles: Roles) -> (Rc<FnSubscriber>, Rc<Cell<u32>>) {
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    let sub = FnSubscriber::new(ctx, roles, move |_| h.set(h.get() + 1));
    (sub, hits)
}

#[derive(Debug, Clone, PartialEq)]
struct Settings {
    volume: u8,
    muted: bool,
}

observed_fields! {
    trait SettingsFields for Settings {
        volume, set_volume: u8;
        muted, set_muted: bool;
    }
}

// ============================================================================
// Property cells
// ============================================================================

#[test]
fn equal_writes_never_notify() {
    let ctx = StateContext::new();
    let cell = ObservedProperty::new(&ctx, "same".to_string(), None, "label");
    let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
    cell.subscribe_me(sub.id());

    for _ in 0..5 {
        cell.set("same".to_string());
    }
    assert_eq!(hits.get(), 0);

    let list = Observed::new(vec![1]);
    let objects = ObservedProperty::new(&ctx, list.clone(), None, "list");
    objects.subscribe_me(sub.id());
    objects.set(list.clone());
    assert_eq!(hits.get(), 0, "same wrapper identity is an equal write");
    objects.set(Observed::new(vec![1]));
    assert_eq!(hits.get(), 1, "equal contents, new identity");
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn peer_links_do_not_ping_pong() {
    let ctx = StateContext::new();
    let source = ObservedProperty::new(&ctx, 0_i64, None, "s");
    let l1 = source.create_link(None, "l1");
    let l2 = source.create_link(None, "l2");
    let (own, own_hits) = counter(&ctx, Roles::VALUE_CHANGED);
    let (peer, peer_hits) = counter(&ctx, Roles::VALUE_CHANGED);
    l1.subscribe_me(own.id());
    l2.subscribe_me(peer.id());

    l1.set(42);
    assert_eq!(source.get(), 42);
    assert_eq!(l2.get(), 42);
    assert_eq!(peer_hits.get(), 1);
    assert_eq!(own_hits.get(), 1);

    l2.set(43);
    assert_eq!(l1.get(), 43);
    assert_eq!(own_hits.get(), 2);
    assert_eq!(peer_hits.get(), 2);
}

#[test]
fn links_see_object_mutation_through_the_source() {
    let ctx = StateContext::new();
    let settings = Observed::new(Settings {
        volume: 3,
        muted: false,
    });
    let source = ObservedProperty::new(&ctx, settings.clone(), None, "settings");
    let link = source.create_link(None, "settings");
    let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
    link.subscribe_me(sub.id());

    assert!(link.get().set_muted(true));
    assert_eq!(hits.get(), 1);
    assert!(source.get().muted());
    assert!(!link.get().set_muted(true), "equal field write");
    assert_eq!(hits.get(), 1);
}

// ============================================================================
// Props
// ============================================================================

#[test]
fn object_prop_is_isolated_until_reset() {
    let ctx = StateContext::new();
    let source = ObservedProperty::new(
        &ctx,
        Observed::new(Settings {
            volume: 1,
            muted: false,
        }),
        None,
        "settings",
    );
    let prop = Prop::new(source.as_source(), None, "settings");

    prop.get().set_volume(9);
    assert_eq!(source.get().volume(), 1);
    assert_eq!(prop.get().volume(), 9);

    let replacement = Observed::new(Settings {
        volume: 5,
        muted: true,
    });
    prop.reset(replacement.clone());
    assert_eq!(source.get(), replacement);
    assert_eq!(prop.get().volume(), 5);
}

#[test]
fn primitive_prop_follows_upstream() {
    let ctx = StateContext::new();
    let source = ObservedProperty::new(&ctx, 1_u32, None, "n");
    let prop = source.create_prop(None, "n").expect("primitive");
    prop.set(2);
    assert_eq!(source.get(), 1);
    source.set(3);
    assert_eq!(prop.get(), 3);
}

#[test]
fn object_state_cells_only_link() {
    let ctx = StateContext::new();
    let source = ObservedProperty::new(&ctx, Observed::new(vec!["a"]), None, "tags");
    assert_eq!(
        source.create_prop(None, "p").map(|_| ()),
        Err(StateError::ObjectPropUnsupported {
            name: "tags".into()
        })
    );
}

// ============================================================================
// Observed wrappers
// ============================================================================

#[test]
fn array_calls_notify_once_each_and_chain() {
    let ctx = StateContext::new();
    let list = Observed::new(vec![10, 20]);
    let cell = ObservedProperty::new(&ctx, list.clone(), None, "list");
    let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
    cell.subscribe_me(sub.id());

    let removed = list.push(30).splice(0, 1, []).into_removed();
    assert_eq!(removed, vec![10]);
    assert_eq!(hits.get(), 2);
    assert_eq!(list.get_raw(), vec![20, 30]);

    list.splice(0, 0, [1]).push(2).reverse();
    assert_eq!(hits.get(), 5);
    assert_eq!(list.get_raw(), vec![2, 30, 20, 1]);
}

#[test]
fn unwrapping_is_observation_free() {
    let ctx = StateContext::new();
    let list = Observed::new(vec![1, 2, 3]);
    let cell = ObservedProperty::new(&ctx, list.clone(), None, "list");
    let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED | Roles::PROPERTY_READ);
    cell.subscribe_me(sub.id());

    let _ = list.get_raw();
    let _ = list.with_raw(|raw| raw.len());
    assert_eq!(hits.get(), 0);
}

#[test]
fn date_setters_are_intercepted() {
    let ctx = StateContext::new();
    let start = NaiveDate::from_ymd_opt(2024, 1, 31)
        .and_then(|date| date.and_hms_opt(9, 30, 0))
        .expect("valid date");
    let date = Observed::new(start);
    let cell = ObservedProperty::new(&ctx, date.clone(), None, "due");
    let (sub, hits) = counter(&ctx, Roles::VALUE_CHANGED);
    cell.subscribe_me(sub.id());

    assert!(date.set_full_year(2025));
    assert!(!date.set_month(2), "February 31st does not exist");
    assert!(date.set_hours(17));
    assert_eq!(hits.get(), 2);
    assert_eq!(date.get_raw().to_string(), "2025-01-31 17:30:00");
}

// ============================================================================
// Stores
// ============================================================================

#[test]
fn store_delete_waits_for_subscribers() {
    let ctx = StateContext::new();
    let store = ctx.app_storage();
    assert!(Rc::ptr_eq(&store, &ctx.app_storage()));

    store.set_or_create("theme", "dark".to_string());
    let link = store.link::<String>("theme", None).expect("key exists");
    assert_eq!(store.number_of_subscribers_to("theme"), Some(1));
    assert!(!store.delete("theme"));
    assert!(store.has("theme"));

    link.about_to_be_deleted();
    assert_eq!(store.number_of_subscribers_to("theme"), Some(0));
    assert!(store.delete("theme"));
    assert!(!store.has("theme"));
}

#[test]
fn store_set_is_soft() {
    let ctx = StateContext::new();
    let store = ctx.app_storage();
    assert!(!store.set("missing", 1));
    assert!(store.set_or_create("maybe", Some(1)));
    assert!(!store.set("maybe", None::<i32>));
    assert_eq!(store.get::<Option<i32>>("maybe"), Some(Some(1)));
    assert_eq!(store.keys(), vec!["maybe".to_string()]);
    assert_eq!(store.size(), 1);
}

#[test]
fn teardown_clears_the_context() {
    let ctx = StateContext::new();
    ctx.app_storage().set_or_create("k", 1);
    let cell = ObservedProperty::new(&ctx, 0, None, "x");
    assert!(ctx.registry().has(cell.id()));
    ctx.teardown();
    assert!(!ctx.has_app_storage());
    assert!(ctx.registry().is_empty());
}
