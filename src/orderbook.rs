//! Limit order book with price-time priority and continuous crossing
//!
//! # Structure
//!
//! - Two ordered maps of price levels: bids keyed by `Reverse<Price>` so the
//!   first entry is the highest bid, asks keyed ascending so the first entry
//!   is the lowest ask.
//! - An order-id index (`FxHashMap`) for O(1) cancel/modify lookups. The
//!   index holds exactly the set of currently-resting orders.
//! - A fixed-capacity order arena; pool exhaustion rejects the submission.
//!
//! # Matching
//!
//! An incoming order crosses against the opposite side's best level while it
//! is marketable. The execution price is always the passive (resting) side's
//! price. Both sides of each fill receive a TRADE report sharing price,
//! quantity, and timestamp. A settled book never crosses:
//! `best_bid < best_ask` whenever both sides are non-empty.
//!
//! Thread-safety: none. The engine serializes all access; the harness
//! keeps each book on a single thread.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{OrderArena, OrderHandle, NIL};
use crate::clock;
use crate::core_types::{OrderId, OrderType, Price, Quantity, Quote, Side, Symbol};
use crate::order::{ExecutionReport, Order};
use crate::price_level::PriceLevel;

/// Default per-book order pool size
pub const DEFAULT_ARENA_CAPACITY: usize = 1 << 20;

/// Aggregate book snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct BookStats {
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub total_orders: usize,
    pub total_bid_quantity: Quantity,
    pub total_ask_quantity: Quantity,
    pub trades_matched: u64,
    pub volume_matched: Quantity,
}

/// One row of a depth snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Top-N levels per side, in priority order
#[derive(Debug, Default, Clone)]
pub struct Depth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Per-symbol limit order book
#[derive(Debug)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    index: FxHashMap<OrderId, OrderHandle>,
    arena: OrderArena,
    trades_matched: u64,
    volume_matched: Quantity,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self::with_capacity(symbol, DEFAULT_ARENA_CAPACITY)
    }

    pub fn with_capacity(symbol: Symbol, pool_capacity: usize) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: FxHashMap::default(),
            arena: OrderArena::with_capacity(pool_capacity),
            trades_matched: 0,
            volume_matched: 0,
        }
    }

    // ============================================================
    // SUBMIT
    // ============================================================

    /// Add an order: cross what is marketable, rest the remainder.
    ///
    /// Returns false (after a REJECTED report) for POST_ONLY that would
    /// cross, FOK that cannot fully fill, STOP_LIMIT, and pool exhaustion.
    pub fn add_order(
        &mut self,
        mut order: Order,
        emit: &mut dyn FnMut(&ExecutionReport),
    ) -> bool {
        match order.order_type {
            OrderType::PostOnly if self.would_cross(order.side, order.price) => {
                order.reject();
                emit(&ExecutionReport::rejected(&order));
                return false;
            }
            OrderType::Fok if !self.can_fill_fully(order.side, order.price, order.quantity) => {
                order.reject();
                emit(&ExecutionReport::rejected(&order));
                return false;
            }
            // No stop-trigger infrastructure: refuse rather than silently
            // matching as a limit order.
            OrderType::StopLimit => {
                order.reject();
                emit(&ExecutionReport::rejected(&order));
                return false;
            }
            _ => {}
        }

        let Some(handle) = self.arena.alloc(order) else {
            order.reject();
            emit(&ExecutionReport::rejected(&order));
            return false;
        };

        emit(&ExecutionReport::accepted(&order));

        if order.order_type != OrderType::PostOnly {
            match order.side {
                Side::Buy => self.match_buy(handle, emit),
                Side::Sell => self.match_sell(handle, emit),
            }
        }

        let (remaining, active, order_type) = {
            let o = self.arena.get(handle);
            (o.remaining_quantity(), o.is_active(), o.order_type)
        };

        if remaining > 0 && active {
            match order_type {
                OrderType::Limit | OrderType::PostOnly => {
                    let order_id = self.arena.get(handle).order_id;
                    self.insert_resting(handle);
                    self.index.insert(order_id, handle);
                }
                OrderType::Market | OrderType::Ioc | OrderType::Fok => {
                    // Remainder is terminal, never rested. FOK cannot get
                    // here: the pre-check guaranteed a full fill.
                    debug_assert!(order_type != OrderType::Fok);
                    let cancelled = {
                        let o = self.arena.get_mut(handle);
                        o.cancel();
                        *o
                    };
                    emit(&ExecutionReport::cancelled(&cancelled));
                    self.arena.free(handle);
                }
                OrderType::StopLimit => unreachable!("rejected before allocation"),
            }
        } else {
            // Fully filled inside this call; the handle never reached the
            // index, so only the slot needs releasing.
            self.arena.free(handle);
        }

        self.debug_check_no_cross();
        true
    }

    /// Match a buy aggressor against asks, best (lowest) price first
    fn match_buy(&mut self, aggressor: OrderHandle, emit: &mut dyn FnMut(&ExecutionReport)) {
        let is_market = self.arena.get(aggressor).order_type == OrderType::Market;

        loop {
            if self.arena.get(aggressor).remaining_quantity() == 0 {
                break;
            }
            let Some(mut entry) = self.asks.first_entry() else {
                break;
            };
            let best_price = *entry.key();
            if !is_market && self.arena.get(aggressor).price < best_price {
                break;
            }

            let level = entry.get_mut();
            while !level.is_empty() && self.arena.get(aggressor).remaining_quantity() > 0 {
                let passive = level.front();
                debug_assert!(passive != NIL);

                let fill = self
                    .arena
                    .get(aggressor)
                    .remaining_quantity()
                    .min(self.arena.get(passive).remaining_quantity());
                let exec_price = self.arena.get(passive).price;

                self.arena.get_mut(aggressor).fill(fill);
                self.arena.get_mut(passive).fill(fill);
                level.update_quantity(fill);

                self.trades_matched += 1;
                self.volume_matched += fill;

                let ts = clock::now();
                let agg = *self.arena.get(aggressor);
                let pas = *self.arena.get(passive);
                emit(&ExecutionReport::trade(&agg, pas.order_id, exec_price, fill, ts));
                emit(&ExecutionReport::trade(&pas, agg.order_id, exec_price, fill, ts));

                if pas.is_filled() {
                    level.pop_front(&mut self.arena);
                    self.index.remove(&pas.order_id);
                    self.arena.free(passive);
                }
            }

            if level.is_empty() {
                entry.remove();
            }
        }
    }

    /// Match a sell aggressor against bids, best (highest) price first
    fn match_sell(&mut self, aggressor: OrderHandle, emit: &mut dyn FnMut(&ExecutionReport)) {
        let is_market = self.arena.get(aggressor).order_type == OrderType::Market;

        loop {
            if self.arena.get(aggressor).remaining_quantity() == 0 {
                break;
            }
            let Some(mut entry) = self.bids.first_entry() else {
                break;
            };
            let best_price = entry.key().0;
            if !is_market && self.arena.get(aggressor).price > best_price {
                break;
            }

            let level = entry.get_mut();
            while !level.is_empty() && self.arena.get(aggressor).remaining_quantity() > 0 {
                let passive = level.front();
                debug_assert!(passive != NIL);

                let fill = self
                    .arena
                    .get(aggressor)
                    .remaining_quantity()
                    .min(self.arena.get(passive).remaining_quantity());
                let exec_price = self.arena.get(passive).price;

                self.arena.get_mut(aggressor).fill(fill);
                self.arena.get_mut(passive).fill(fill);
                level.update_quantity(fill);

                self.trades_matched += 1;
                self.volume_matched += fill;

                let ts = clock::now();
                let agg = *self.arena.get(aggressor);
                let pas = *self.arena.get(passive);
                emit(&ExecutionReport::trade(&agg, pas.order_id, exec_price, fill, ts));
                emit(&ExecutionReport::trade(&pas, agg.order_id, exec_price, fill, ts));

                if pas.is_filled() {
                    level.pop_front(&mut self.arena);
                    self.index.remove(&pas.order_id);
                    self.arena.free(passive);
                }
            }

            if level.is_empty() {
                entry.remove();
            }
        }
    }

    /// Would a limit order at `price` be marketable on insert?
    fn would_cross(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self.best_ask().is_some_and(|ask| price >= ask),
            Side::Sell => self.best_bid().is_some_and(|bid| price <= bid),
        }
    }

    /// Can the opposite side supply `qty` at prices acceptable to `price`?
    fn can_fill_fully(&self, side: Side, price: Price, qty: Quantity) -> bool {
        let mut need = qty;
        match side {
            Side::Buy => {
                for (level_price, level) in &self.asks {
                    if *level_price > price {
                        break;
                    }
                    need -= level.total_quantity();
                    if need <= 0 {
                        return true;
                    }
                }
            }
            Side::Sell => {
                for (level_price, level) in &self.bids {
                    if level_price.0 < price {
                        break;
                    }
                    need -= level.total_quantity();
                    if need <= 0 {
                        return true;
                    }
                }
            }
        }
        need <= 0
    }

    fn insert_resting(&mut self, handle: OrderHandle) {
        let (side, price) = {
            let o = self.arena.get(handle);
            (o.side, o.price)
        };
        match side {
            Side::Buy => {
                let level = self
                    .bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price));
                level.add_order(&mut self.arena, handle);
            }
            Side::Sell => {
                let level = self
                    .asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price));
                level.add_order(&mut self.arena, handle);
            }
        }
    }

    // ============================================================
    // CANCEL / MODIFY
    // ============================================================

    /// Cancel a resting order. False when the id is unknown (no report).
    pub fn cancel_order(
        &mut self,
        order_id: OrderId,
        emit: &mut dyn FnMut(&ExecutionReport),
    ) -> bool {
        let Some(handle) = self.index.remove(&order_id) else {
            return false;
        };

        self.unlink_resting(handle);

        let cancelled = {
            let o = self.arena.get_mut(handle);
            o.cancel();
            *o
        };
        emit(&ExecutionReport::cancelled(&cancelled));
        self.arena.free(handle);
        true
    }

    /// Modify a resting order.
    ///
    /// A pure quantity reduction at the same price (new total above the
    /// filled quantity) is applied in place and keeps time priority,
    /// emitting a REPLACED report. Reducing at or below the filled
    /// quantity is rejected. Any other change is cancel-then-resubmit
    /// under the same order id, losing time priority.
    pub fn modify_order(
        &mut self,
        order_id: OrderId,
        new_price: Price,
        new_qty: Quantity,
        emit: &mut dyn FnMut(&ExecutionReport),
    ) -> bool {
        let Some(&handle) = self.index.get(&order_id) else {
            return false;
        };
        if new_qty <= 0 {
            return false;
        }
        let current = *self.arena.get(handle);

        if new_price == current.price && new_qty < current.quantity {
            if new_qty <= current.filled_quantity {
                return false;
            }
            let reduction = current.quantity - new_qty;
            {
                let o = self.arena.get_mut(handle);
                o.quantity = new_qty;
                o.update_time = clock::now();
            }
            self.reduce_level_quantity(current.side, current.price, reduction);
            let replaced = *self.arena.get(handle);
            emit(&ExecutionReport::replaced(&replaced));
            return true;
        }

        // Price change or quantity increase: silent unlink, then resubmit
        // at the new terms with the same id. Reports come from add_order.
        self.index.remove(&order_id);
        self.unlink_resting(handle);
        self.arena.free(handle);

        let resubmitted = Order::new(
            order_id,
            self.symbol,
            current.side,
            current.order_type,
            new_price,
            new_qty,
            current.client_id,
        );
        self.add_order(resubmitted, emit)
    }

    fn unlink_resting(&mut self, handle: OrderHandle) {
        let (side, price) = {
            let o = self.arena.get(handle);
            (o.side, o.price)
        };
        match side {
            Side::Buy => {
                let key = Reverse(price);
                if let Some(level) = self.bids.get_mut(&key) {
                    level.remove_order(&mut self.arena, handle);
                    if level.is_empty() {
                        self.bids.remove(&key);
                    }
                } else {
                    debug_assert!(false, "indexed order has no bid level");
                }
            }
            Side::Sell => {
                if let Some(level) = self.asks.get_mut(&price) {
                    level.remove_order(&mut self.arena, handle);
                    if level.is_empty() {
                        self.asks.remove(&price);
                    }
                } else {
                    debug_assert!(false, "indexed order has no ask level");
                }
            }
        }
    }

    fn reduce_level_quantity(&mut self, side: Side, price: Price, reduction: Quantity) {
        match side {
            Side::Buy => {
                if let Some(level) = self.bids.get_mut(&Reverse(price)) {
                    level.update_quantity(reduction);
                }
            }
            Side::Sell => {
                if let Some(level) = self.asks.get_mut(&price) {
                    level.update_quantity(reduction);
                }
            }
        }
    }

    // ============================================================
    // OBSERVABLES
    // ============================================================

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first_key_value().map(|(k, _)| k.0)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(k, _)| *k)
    }

    /// Defined only when both sides are non-empty
    pub fn get_quote(&self) -> Option<Quote> {
        let (bid_key, bid_level) = self.bids.first_key_value()?;
        let (ask_key, ask_level) = self.asks.first_key_value()?;
        Some(Quote {
            bid_price: bid_key.0,
            ask_price: *ask_key,
            bid_quantity: bid_level.total_quantity(),
            ask_quantity: ask_level.total_quantity(),
            timestamp: clock::now(),
        })
    }

    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn mid_price(&self) -> Option<Price> {
        Some((self.best_ask()? + self.best_bid()?) / 2)
    }

    /// Top-N levels per side as (price, aggregate quantity, order count)
    pub fn get_depth(&self, levels: usize) -> Depth {
        let mut depth = Depth {
            bids: Vec::with_capacity(levels.min(self.bids.len())),
            asks: Vec::with_capacity(levels.min(self.asks.len())),
        };
        for (key, level) in self.bids.iter().take(levels) {
            depth.bids.push(DepthLevel {
                price: key.0,
                quantity: level.total_quantity(),
                order_count: level.order_count(),
            });
        }
        for (key, level) in self.asks.iter().take(levels) {
            depth.asks.push(DepthLevel {
                price: *key,
                quantity: level.total_quantity(),
                order_count: level.order_count(),
            });
        }
        depth
    }

    pub fn get_order(&self, order_id: OrderId) -> Option<&Order> {
        self.index.get(&order_id).map(|&h| self.arena.get(h))
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            total_orders: self.index.len(),
            total_bid_quantity: self.bids.values().map(|l| l.total_quantity()).sum(),
            total_ask_quantity: self.asks.values().map(|l| l.total_quantity()).sum(),
            trades_matched: self.trades_matched,
            volume_matched: self.volume_matched,
        }
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn trades_matched(&self) -> u64 {
        self.trades_matched
    }

    #[inline]
    pub fn volume_matched(&self) -> Quantity {
        self.volume_matched
    }

    /// Release every resting order and empty both sides. Cumulative trade
    /// counters are preserved.
    pub fn clear(&mut self) {
        self.index.clear();
        self.bids.clear();
        self.asks.clear();
        self.arena.reset();
    }

    #[inline]
    fn debug_check_no_cross(&self) {
        #[cfg(debug_assertions)]
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            debug_assert!(bid < ask, "book crossed at rest: bid {} >= ask {}", bid, ask);
        }
    }
}
