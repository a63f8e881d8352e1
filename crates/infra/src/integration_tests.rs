//! Integration tests for the full pipeline.
//!
//! Tests: PosService → CommandDispatcher → EventStore → EventBus → Projections
//!
//! Verifies:
//! - Order creation reserves stock all-or-nothing
//! - Status transitions follow the table and cancelling restocks exactly once
//! - One active order per owner, also under concurrent callers
//! - Listings agree with the store after commits and after a rebuild

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use brewforce_auth::Principal;
use brewforce_catalog::{CatalogEvent, CatalogItemId};
use brewforce_core::{AggregateId, ExpectedVersion};
use brewforce_orders::{ActiveOrderOpened, ActiveOrderSlot, Order, OrderId, OrderStatus, SlotEvent, active_slot};

use crate::bootstrap::{self, InMemoryPosService};
use crate::config::EngineConfig;
use crate::event_store::{EventStore, UncommittedEvent};
use crate::services::{ServiceError, parse_statuses};

fn service() -> InMemoryPosService {
    bootstrap::in_memory(EngineConfig::default())
}

/// Generous retry budget for the thread races.
fn contended_service() -> InMemoryPosService {
    bootstrap::in_memory(EngineConfig {
        reserve_max_attempts: 1_000,
        transition_max_attempts: 1_000,
        ..EngineConfig::default()
    })
}

fn stock_of(svc: &InMemoryPosService, item_id: CatalogItemId) -> i64 {
    svc.get_item(item_id).unwrap().stock
}

fn coffee(svc: &InMemoryPosService, stock: i64) -> CatalogItemId {
    svc.list_item("Kopi Susu", "iced, palm sugar", 20_000, stock).unwrap().item_id
}

fn active_order_of(svc: &InMemoryPosService, owner: &str) -> Option<OrderId> {
    let slot: ActiveOrderSlot = svc
        .dispatcher()
        .load(ActiveOrderSlot::id_for(owner), || ActiveOrderSlot::empty(owner))
        .unwrap();
    slot.active_order()
}

/// Claim `owner`'s slot for an order that is never placed, as a creation that
/// died after claiming would leave it.
fn seed_dead_claim(svc: &InMemoryPosService, owner: &str, claimed_ago: Duration) -> OrderId {
    let order_id = OrderId::new(AggregateId::new());
    let opened = SlotEvent::Opened(ActiveOrderOpened {
        owner: owner.to_string(),
        order_id,
        occurred_at: Utc::now() - claimed_ago,
    });
    let event = UncommittedEvent::from_typed(
        ActiveOrderSlot::id_for(owner),
        active_slot::AGGREGATE_TYPE,
        Uuid::now_v7(),
        &opened,
    )
    .unwrap();
    svc.dispatcher()
        .store()
        .append(vec![event], ExpectedVersion::Exact(0))
        .unwrap();
    order_id
}

#[test]
fn ordering_reserves_stock_and_totals_the_lines() {
    let svc = service();
    let coffee = coffee(&svc, 10);

    let order = svc.create_order("alice", &[(coffee, 3)]).unwrap();

    assert_eq!(order.total_price, 60_000);
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
    assert_eq!(order.owner, "alice");
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].unit_price, 20_000);
    assert_eq!(order.lines[0].line_no, 1);
    assert_eq!(stock_of(&svc, coffee), 7);
    assert_eq!(svc.list_items(false)[0].stock, 7);
}

#[test]
fn cancelling_restores_stock() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 3)]).unwrap();

    let cancelled = svc.cancel_order(order.order_id, "alice").unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&svc, coffee), 10);
    assert_eq!(svc.get_order(order.order_id).unwrap().status, OrderStatus::Cancelled);
}

#[test]
fn insufficient_stock_leaves_stock_untouched() {
    let svc = service();
    let tea = svc.list_item("Teh Tarik", "", 15_000, 1).unwrap().item_id;

    let err = svc.create_order("bob", &[(tea, 2)]).unwrap_err();

    assert_eq!(
        err,
        ServiceError::InsufficientStock {
            item_id: tea,
            available: 1,
            requested: 2
        }
    );
    assert_eq!(stock_of(&svc, tea), 1);
    assert!(svc.list_orders_by_owner("bob").is_empty());
}

#[test]
fn skipping_a_status_is_rejected() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 1)]).unwrap();

    let err = svc
        .transition_status(order.order_id, OrderStatus::Ready, "dina")
        .unwrap_err();

    assert_eq!(
        err,
        ServiceError::InvalidTransition {
            from: OrderStatus::AwaitingPayment,
            to: OrderStatus::Ready
        }
    );
    assert_eq!(svc.get_order(order.order_id).unwrap().status, OrderStatus::AwaitingPayment);
}

#[test]
fn second_active_order_is_a_conflict() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    svc.create_order("carol", &[(coffee, 1)]).unwrap();

    let err = svc.create_order("carol", &[(coffee, 1)]).unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(msg) if msg.contains("active order exists")));
    assert_eq!(stock_of(&svc, coffee), 9);
    assert_eq!(svc.list_orders_by_owner("carol").len(), 1);
}

#[test]
fn owner_can_order_again_once_the_order_ends() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let first = svc.create_order("carol", &[(coffee, 1)]).unwrap();

    for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
        svc.transition_status(first.order_id, status, "dina").unwrap();
    }
    let second = svc.create_order("carol", &[(coffee, 2)]).unwrap();

    assert_ne!(first.order_id, second.order_id);
    assert_eq!(stock_of(&svc, coffee), 7);

    svc.cancel_order(second.order_id, "carol").unwrap();
    svc.create_order("carol", &[(coffee, 1)]).unwrap();
    assert_eq!(svc.list_orders_by_owner("carol").len(), 3);
}

#[test]
fn failing_line_rolls_back_earlier_reservations() {
    let svc = service();
    let a = svc.list_item("A", "", 5_000, 5).unwrap().item_id;
    let b = svc.list_item("B", "", 5_000, 0).unwrap().item_id;

    let err = svc.create_order("dave", &[(a, 2), (b, 1)]).unwrap_err();

    assert!(matches!(err, ServiceError::InsufficientStock { item_id, .. } if item_id == b));
    assert_eq!(stock_of(&svc, a), 5);
    assert_eq!(stock_of(&svc, b), 0);
    assert!(svc.list_orders(None).is_empty());

    // The slot was freed along with the reservations.
    svc.set_item_stock(b, 1).unwrap();
    svc.create_order("dave", &[(a, 2), (b, 1)]).unwrap();
    assert_eq!(stock_of(&svc, a), 3);
}

#[test]
fn unknown_and_deleted_items_abort_creation() {
    let svc = service();
    let a = svc.list_item("A", "", 5_000, 5).unwrap().item_id;
    let gone = svc.list_item("Gone", "", 5_000, 5).unwrap().item_id;
    svc.delete_item(gone).unwrap();
    let missing = CatalogItemId::new(AggregateId::new());

    let err = svc.create_order("erin", &[(a, 1), (missing, 1)]).unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { entity: "catalog item", .. }));

    let err = svc.create_order("erin", &[(a, 1), (gone, 1)]).unwrap_err();
    assert_eq!(err, ServiceError::DeletedItem { item_id: gone });

    let err = svc.create_order("erin", &[(a, 1), (a, 0)]).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert_eq!(stock_of(&svc, a), 5);
    assert_eq!(stock_of(&svc, gone), 5);
}

#[test]
fn invalid_requests_are_rejected_before_anything_is_reserved() {
    let svc = service();
    let a = svc.list_item("A", "", 5_000, 5).unwrap().item_id;

    assert!(matches!(svc.create_order("erin", &[]), Err(ServiceError::Validation(_))));
    assert!(matches!(svc.create_order("  ", &[(a, 1)]), Err(ServiceError::Validation(_))));
    assert_eq!(stock_of(&svc, a), 5);
    assert!(svc.dispatcher().store().load_by_type(brewforce_orders::active_slot::AGGREGATE_TYPE).unwrap().is_empty());
}

#[test]
fn captured_prices_survive_repricing() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 2)]).unwrap();

    svc.update_item_details(coffee, "Kopi Susu", "now with oat milk", 25_000)
        .unwrap();

    let reread = svc.get_order(order.order_id).unwrap();
    assert_eq!(reread.lines[0].unit_price, 20_000);
    assert_eq!(reread.total_price, 40_000);
    assert_eq!(svc.get_item(coffee).unwrap().unit_price, 25_000);
}

#[test]
fn terminal_orders_reject_every_transition() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let done = svc.create_order("alice", &[(coffee, 1)]).unwrap();
    for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed] {
        svc.transition_status(done.order_id, status, "dina").unwrap();
    }
    let cancelled = svc.create_order("bob", &[(coffee, 1)]).unwrap();
    svc.transition_status(cancelled.order_id, OrderStatus::Cancelled, "dina")
        .unwrap();

    for (order_id, from) in [
        (done.order_id, OrderStatus::Completed),
        (cancelled.order_id, OrderStatus::Cancelled),
    ] {
        for to in OrderStatus::ALL {
            let err = svc.transition_status(order_id, to, "dina").unwrap_err();
            assert_eq!(err, ServiceError::InvalidTransition { from, to });
        }
    }
    assert_eq!(stock_of(&svc, coffee), 9);
}

#[test]
fn cancel_is_owner_only_and_only_while_awaiting_payment() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 1)]).unwrap();

    let err = svc.cancel_order(order.order_id, "mallory").unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    svc.transition_status(order.order_id, OrderStatus::Preparing, "dina")
        .unwrap();
    let err = svc.cancel_order(order.order_id, "alice").unwrap_err();
    assert_eq!(
        err,
        ServiceError::InvalidTransition {
            from: OrderStatus::Preparing,
            to: OrderStatus::Cancelled
        }
    );
    assert_eq!(stock_of(&svc, coffee), 9);
}

#[test]
fn unknown_orders_are_not_found() {
    let svc = service();
    let ghost = OrderId::new(AggregateId::new());

    assert!(matches!(svc.get_order(ghost), Err(ServiceError::NotFound { entity: "order", .. })));
    assert!(matches!(
        svc.transition_status(ghost, OrderStatus::Preparing, "dina"),
        Err(ServiceError::NotFound { entity: "order", .. })
    ));
    assert!(matches!(svc.cancel_order(ghost, "alice"), Err(ServiceError::NotFound { .. })));
}

#[test]
fn customers_only_read_their_own_orders() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 1)]).unwrap();

    assert!(svc.get_order_for(order.order_id, &Principal::customer("alice")).is_ok());
    assert!(svc.get_order_for(order.order_id, &Principal::cashier("dina")).is_ok());
    assert!(matches!(
        svc.get_order_for(order.order_id, &Principal::customer("bob")),
        Err(ServiceError::Unauthorized(_))
    ));
}

#[test]
fn listings_filter_by_owner_and_status() {
    let svc = service();
    let coffee = coffee(&svc, 20);
    let a = svc.create_order("alice", &[(coffee, 1)]).unwrap();
    let b = svc.create_order("bob", &[(coffee, 1)]).unwrap();
    let c = svc.create_order("carol", &[(coffee, 1)]).unwrap();
    svc.transition_status(b.order_id, OrderStatus::Preparing, "dina").unwrap();
    svc.cancel_order(c.order_id, "carol").unwrap();
    let a2 = svc.create_order("carol", &[(coffee, 2)]).unwrap();

    let ids = |views: Vec<crate::projections::OrderView>| views.into_iter().map(|v| v.order_id).collect::<Vec<_>>();

    assert_eq!(ids(svc.list_orders(None)), vec![a.order_id, b.order_id, c.order_id, a2.order_id]);
    assert_eq!(ids(svc.list_orders(Some(&[][..]))).len(), 4);
    assert_eq!(
        ids(svc.list_orders(Some(&[OrderStatus::AwaitingPayment][..]))),
        vec![a.order_id, a2.order_id]
    );
    let active = parse_statuses(&["preparing", "CANCELLED"]).unwrap();
    assert_eq!(ids(svc.list_orders(Some(active.as_slice()))), vec![b.order_id, c.order_id]);
    assert_eq!(ids(svc.list_orders_by_owner("carol")), vec![c.order_id, a2.order_id]);
    assert!(parse_statuses(&["SHIPPED"]).is_err());
}

#[test]
fn status_changes_record_the_requester() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 1)]).unwrap();
    let sub = svc.subscribe();

    svc.transition_status(order.order_id, OrderStatus::Preparing, "dina")
        .unwrap();

    let changes = sub.drain_type("orders.order.status_changed");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].payload()["StatusChanged"]["requested_by"], "dina");
    assert_eq!(changes[0].payload()["StatusChanged"]["to"], "PREPARING");
}

#[test]
fn catalog_management_round_trip() {
    let svc = service();
    let coffee = coffee(&svc, 10);

    assert!(matches!(svc.list_item(" ", "", 1, 1), Err(ServiceError::Validation(_))));
    assert!(matches!(svc.list_item("Free", "", 0, 1), Err(ServiceError::Validation(_))));
    assert!(matches!(svc.set_item_stock(coffee, -1), Err(ServiceError::Validation(_))));

    svc.set_item_stock(coffee, 42).unwrap();
    assert_eq!(stock_of(&svc, coffee), 42);

    svc.delete_item(coffee).unwrap();
    svc.delete_item(coffee).unwrap();
    assert!(svc.get_item(coffee).unwrap().deleted);
    assert!(svc.list_items(false).is_empty());
    assert_eq!(svc.list_items(true).len(), 1);
    assert_eq!(svc.set_item_stock(coffee, 1).unwrap_err(), ServiceError::DeletedItem { item_id: coffee });

    let missing = CatalogItemId::new(AggregateId::new());
    assert!(matches!(svc.get_item(missing), Err(ServiceError::NotFound { .. })));
}

#[test]
fn cancelling_after_deletion_still_restocks() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let order = svc.create_order("alice", &[(coffee, 4)]).unwrap();
    svc.delete_item(coffee).unwrap();

    svc.cancel_order(order.order_id, "alice").unwrap();

    assert_eq!(stock_of(&svc, coffee), 10);
}

#[test]
fn rebuild_reproduces_listings_from_the_store() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let a = svc.create_order("alice", &[(coffee, 2)]).unwrap();
    svc.create_order("bob", &[(coffee, 1)]).unwrap();
    svc.transition_status(a.order_id, OrderStatus::Preparing, "dina").unwrap();

    let orders_before = svc.list_orders(None);
    let items_before = svc.list_items(true);

    svc.rebuild_read_models().unwrap();

    assert_eq!(svc.list_orders(None), orders_before);
    assert_eq!(svc.list_items(true), items_before);
}

#[test]
fn stock_events_are_published_after_commit() {
    let svc = service();
    let sub = svc.subscribe();
    let coffee = coffee(&svc, 10);
    svc.create_order("alice", &[(coffee, 3)]).unwrap();

    let reserved: Vec<CatalogEvent> = sub
        .drain_type("catalog.item.stock_reserved")
        .iter()
        .map(|e| e.decode().unwrap())
        .collect();
    assert_eq!(reserved.len(), 1);
    assert!(matches!(&reserved[0], CatalogEvent::StockReserved(e) if e.quantity == 3));
}

#[test]
fn concurrent_orders_never_oversell() {
    const THREADS: usize = 8;
    let svc = Arc::new(contended_service());
    let coffee = coffee(&svc, 5);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.create_order(&format!("customer-{i}"), &[(coffee, 1)])
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 5);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, ServiceError::InsufficientStock { .. }), "unexpected {err:?}");
    }
    assert_eq!(stock_of(&svc, coffee), 0);
    assert_eq!(svc.list_items(false)[0].stock, 0);
    assert_eq!(svc.list_orders(None).len(), 5);
}

#[test]
fn concurrent_creates_by_one_owner_yield_one_order() {
    const THREADS: usize = 6;
    let svc = Arc::new(contended_service());
    let coffee = coffee(&svc, 100);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.create_order("frank", &[(coffee, 2)])
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, ServiceError::Conflict(_)), "unexpected {err:?}");
    }
    assert_eq!(stock_of(&svc, coffee), 98);
    assert_eq!(svc.list_orders_by_owner("frank").len(), 1);
}

#[test]
fn concurrent_cancels_restock_once() {
    const THREADS: usize = 6;
    let svc = Arc::new(contended_service());
    let coffee = coffee(&svc, 10);
    let order_id = svc.create_order("alice", &[(coffee, 4)]).unwrap().order_id;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.cancel_order(order_id, "alice")
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, ServiceError::InvalidTransition { from: OrderStatus::Cancelled, .. }),
            "unexpected {err:?}"
        );
    }
    assert_eq!(stock_of(&svc, coffee), 10);
}

#[test]
fn abandoned_claim_is_reclaimed_once_expired() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let dead = seed_dead_claim(&svc, "gina", Duration::minutes(10));

    let order = svc.create_order("gina", &[(coffee, 2)]).unwrap();

    assert_eq!(active_order_of(&svc, "gina"), Some(order.order_id));
    assert_eq!(stock_of(&svc, coffee), 8);
    let voided: Order = svc.dispatcher().load(dead.0, || Order::empty(dead)).unwrap();
    assert!(voided.is_voided());
    assert!(matches!(
        svc.get_order(dead).unwrap_err(),
        ServiceError::NotFound { entity: "order", .. }
    ));
    assert_eq!(svc.list_orders_by_owner("gina").len(), 1);
}

#[test]
fn fresh_claim_still_blocks_a_second_order() {
    let svc = service();
    let coffee = coffee(&svc, 10);
    let in_flight = seed_dead_claim(&svc, "gina", Duration::zero());

    let err = svc.create_order("gina", &[(coffee, 2)]).unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(_)), "unexpected {err:?}");
    assert_eq!(active_order_of(&svc, "gina"), Some(in_flight));
    assert_eq!(stock_of(&svc, coffee), 10);
}

#[test]
fn reclaim_timeout_is_configurable() {
    let svc = bootstrap::in_memory(EngineConfig {
        slot_claim_timeout: std::time::Duration::from_secs(3_600),
        ..EngineConfig::default()
    });
    let coffee = coffee(&svc, 10);
    seed_dead_claim(&svc, "gina", Duration::minutes(10));

    assert!(matches!(
        svc.create_order("gina", &[(coffee, 1)]).unwrap_err(),
        ServiceError::Conflict(_)
    ));
}

#[test]
fn cancels_on_a_busy_item_restock_everything_with_default_retries() {
    const ORDERS: usize = 64;
    const STOCK: i64 = 100_000;
    let svc = Arc::new(service());
    let coffee = coffee(&svc, STOCK);

    // Long item history makes every optimistic attempt slower.
    for _ in 0..500 {
        let warmup = svc.create_order("warmup", &[(coffee, 1)]).unwrap();
        svc.cancel_order(warmup.order_id, "warmup").unwrap();
    }
    let orders: Vec<_> = (0..ORDERS)
        .map(|i| {
            let owner = format!("customer-{i}");
            let order_id = svc.create_order(&owner, &[(coffee, 1)]).unwrap().order_id;
            (owner, order_id)
        })
        .collect();
    assert_eq!(stock_of(&svc, coffee), STOCK - ORDERS as i64);

    let barrier = Arc::new(Barrier::new(ORDERS));
    let handles: Vec<_> = orders
        .into_iter()
        .map(|(owner, order_id)| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.cancel_order(order_id, &owner)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for result in &results {
        assert!(result.is_ok(), "unexpected {result:?}");
    }
    assert_eq!(stock_of(&svc, coffee), STOCK);
    assert_eq!(svc.list_items(false)[0].stock, STOCK);
    assert_eq!(svc.list_orders(Some(&[OrderStatus::Cancelled][..])).len(), ORDERS + 500);
}

#[test]
fn racing_creates_and_cancels_conserve_stock_with_default_retries() {
    const THREADS: usize = 16;
    let svc = Arc::new(service());
    let coffee = coffee(&svc, 12);
    let tea = svc.list_item("Teh Tarik", "", 15_000, 40).unwrap().item_id;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let owner = format!("customer-{i}");
                barrier.wait();
                let created = svc.create_order(&owner, &[(tea, 2), (coffee, 1)]);
                match &created {
                    Ok(order) if i % 2 == 0 => {
                        svc.cancel_order(order.order_id, &owner).unwrap();
                    }
                    _ => {}
                }
                (owner, created)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (owner, result) in &results {
        match result {
            Ok(_) => {}
            Err(ServiceError::Conflict(_)) | Err(ServiceError::InsufficientStock { .. }) => {
                assert_eq!(active_order_of(&svc, owner), None);
            }
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    let held = |item: CatalogItemId| -> i64 {
        svc.list_orders(None)
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .flat_map(|o| o.lines.iter())
            .filter(|l| l.catalog_item_id == item)
            .map(|l| l.quantity)
            .sum()
    };
    assert_eq!(stock_of(&svc, coffee) + held(coffee), 12);
    assert_eq!(stock_of(&svc, tea) + held(tea), 40);
    assert_eq!(svc.list_orders(None).len(), results.iter().filter(|(_, r)| r.is_ok()).count());
}

#[derive(Debug, Clone)]
enum Op {
    Create { owner: usize, qty_a: i64, qty_b: i64 },
    Cancel { owner: usize },
    Advance { owner: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..4i64, 0..4i64).prop_map(|(owner, qty_a, qty_b)| Op::Create { owner, qty_a, qty_b }),
        (0..3usize).prop_map(|owner| Op::Cancel { owner }),
        (0..3usize).prop_map(|owner| Op::Advance { owner }),
    ]
}

fn next_status(status: OrderStatus) -> Option<OrderStatus> {
    match status {
        OrderStatus::AwaitingPayment => Some(OrderStatus::Preparing),
        OrderStatus::Preparing => Some(OrderStatus::Ready),
        OrderStatus::Ready => Some(OrderStatus::Completed),
        OrderStatus::Completed | OrderStatus::Cancelled => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_lifecycles_conserve_stock(ops in proptest::collection::vec(op(), 1..25)) {
        const OWNERS: [&str; 3] = ["ana", "ben", "cy"];
        let svc = service();
        let a = svc.list_item("A", "", 3_000, 6).unwrap().item_id;
        let b = svc.list_item("B", "", 7_000, 4).unwrap().item_id;

        for op in ops {
            match op {
                Op::Create { owner, qty_a, qty_b } => {
                    let items: Vec<_> = [(a, qty_a), (b, qty_b)].into_iter().filter(|(_, q)| *q > 0).collect();
                    let _ = svc.create_order(OWNERS[owner], &items);
                }
                Op::Cancel { owner } => {
                    for order in svc.list_orders_by_owner(OWNERS[owner]) {
                        let _ = svc.cancel_order(order.order_id, OWNERS[owner]);
                    }
                }
                Op::Advance { owner } => {
                    for order in svc.list_orders_by_owner(OWNERS[owner]) {
                        if let Some(next) = next_status(order.status) {
                            svc.transition_status(order.order_id, next, "counter").unwrap();
                        }
                    }
                }
            }
        }

        let orders = svc.list_orders(None);
        let held = |item: CatalogItemId| -> i64 {
            orders
                .iter()
                .filter(|o| o.status != OrderStatus::Cancelled)
                .flat_map(|o| o.lines.iter())
                .filter(|l| l.catalog_item_id == item)
                .map(|l| l.quantity)
                .sum()
        };
        prop_assert!(stock_of(&svc, a) >= 0 && stock_of(&svc, b) >= 0);
        prop_assert_eq!(stock_of(&svc, a) + held(a), 6);
        prop_assert_eq!(stock_of(&svc, b) + held(b), 4);

        for order in &orders {
            let expected: u64 = order.lines.iter().map(|l| l.quantity as u64 * l.unit_price).sum();
            prop_assert_eq!(order.total_price, expected);
            prop_assert_eq!(&svc.get_order(order.order_id).unwrap(), order);
        }
        for owner in OWNERS {
            let active = svc
                .list_orders_by_owner(owner)
                .iter()
                .filter(|o| !o.status.is_terminal())
                .count();
            prop_assert!(active <= 1);
        }
    }
}
