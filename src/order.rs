//! Order record and execution reports

use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock;
use crate::core_types::{
    ExecType, OrderId, OrderStatus, OrderType, Price, Quantity, Side, Symbol, Timestamp,
};

/// A single order. Plain data, `Copy`, owned by the book that accepted it
/// until it reaches a terminal status.
#[derive(Debug, Clone, Copy, Default)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    /// Total quantity (remaining = quantity − filled_quantity)
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub status: OrderStatus,
    /// When the order entered the engine; ties are impossible because the
    /// engine assigns time inside the serialized submit call
    pub entry_time: Timestamp,
    pub update_time: Timestamp,
    pub client_id: u64,
}

impl Order {
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        client_id: u64,
    ) -> Self {
        let entry_time = clock::now();
        Self {
            order_id,
            symbol,
            side,
            order_type,
            price,
            quantity,
            filled_quantity: 0,
            status: OrderStatus::New,
            entry_time,
            update_time: entry_time,
            client_id,
        }
    }

    #[inline]
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Apply a fill, updating status and the modification timestamp
    pub fn fill(&mut self, qty: Quantity) {
        debug_assert!(qty > 0 && qty <= self.remaining_quantity());
        self.filled_quantity += qty;
        self.update_time = clock::now();
        self.status = if self.filled_quantity >= self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    pub fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
        self.update_time = clock::now();
    }

    pub fn reject(&mut self) {
        self.status = OrderStatus::Rejected;
        self.update_time = clock::now();
    }
}

/// Monotonic order-id source; relaxed arithmetic is enough because ids are
/// only ever compared for identity
#[derive(Debug)]
pub struct OrderIdGenerator {
    next: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(start: OrderId) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    #[inline]
    pub fn next_id(&self) -> OrderId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn current(&self) -> OrderId {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// EXECUTION REPORTS
// ============================================================

/// Emitted for every observable order transition. For a TRADE both sides
/// receive a report sharing execution price, quantity, and timestamp;
/// leaves/cumulative reflect each order's post-fill state.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    /// Counterparty order for TRADE reports; 0 otherwise
    pub contra_order_id: OrderId,
    pub symbol: Symbol,
    pub exec_type: ExecType,
    pub order_status: OrderStatus,
    pub side: Side,
    /// Resting side's price for trades; the order's own price otherwise
    pub execution_price: Price,
    pub execution_quantity: Quantity,
    pub leaves_quantity: Quantity,
    pub cumulative_quantity: Quantity,
    pub client_id: u64,
    pub timestamp: Timestamp,
}

impl ExecutionReport {
    /// NEW: order accepted
    pub fn accepted(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            contra_order_id: 0,
            symbol: order.symbol,
            exec_type: ExecType::New,
            order_status: OrderStatus::New,
            side: order.side,
            execution_price: order.price,
            execution_quantity: 0,
            leaves_quantity: order.quantity,
            cumulative_quantity: 0,
            client_id: order.client_id,
            timestamp: clock::now(),
        }
    }

    /// TRADE for one side of a fill; call after the fill has been applied
    pub fn trade(
        order: &Order,
        contra_order_id: OrderId,
        price: Price,
        qty: Quantity,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            order_id: order.order_id,
            contra_order_id,
            symbol: order.symbol,
            exec_type: ExecType::Trade,
            order_status: order.status,
            side: order.side,
            execution_price: price,
            execution_quantity: qty,
            leaves_quantity: order.remaining_quantity(),
            cumulative_quantity: order.filled_quantity,
            client_id: order.client_id,
            timestamp,
        }
    }

    pub fn cancelled(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            contra_order_id: 0,
            symbol: order.symbol,
            exec_type: ExecType::Cancelled,
            order_status: OrderStatus::Cancelled,
            side: order.side,
            execution_price: order.price,
            execution_quantity: 0,
            leaves_quantity: 0,
            cumulative_quantity: order.filled_quantity,
            client_id: order.client_id,
            timestamp: clock::now(),
        }
    }

    pub fn rejected(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            contra_order_id: 0,
            symbol: order.symbol,
            exec_type: ExecType::Rejected,
            order_status: OrderStatus::Rejected,
            side: order.side,
            execution_price: order.price,
            execution_quantity: 0,
            leaves_quantity: 0,
            cumulative_quantity: order.filled_quantity,
            client_id: order.client_id,
            timestamp: clock::now(),
        }
    }

    /// REPLACED: in-place quantity reduction that kept time priority
    pub fn replaced(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            contra_order_id: 0,
            symbol: order.symbol,
            exec_type: ExecType::Replaced,
            order_status: order.status,
            side: order.side,
            execution_price: order.price,
            execution_quantity: 0,
            leaves_quantity: order.remaining_quantity(),
            cumulative_quantity: order.filled_quantity,
            client_id: order.client_id,
            timestamp: clock::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::PRICE_MULTIPLIER;

    fn make_order(qty: Quantity) -> Order {
        Order::new(
            1,
            Symbol::new("TEST"),
            Side::Buy,
            OrderType::Limit,
            100 * PRICE_MULTIPLIER,
            qty,
            7,
        )
    }

    #[test]
    fn test_fill_transitions() {
        let mut order = make_order(10);
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.remaining_quantity(), 10);

        order.fill(4);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), 6);
        assert!(order.is_active());

        order.fill(6);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert!(!order.is_active());
    }

    #[test]
    fn test_cancel_and_reject_are_terminal() {
        let mut a = make_order(10);
        a.cancel();
        assert_eq!(a.status, OrderStatus::Cancelled);
        assert!(!a.is_active());

        let mut b = make_order(10);
        b.reject();
        assert_eq!(b.status, OrderStatus::Rejected);
        assert!(!b.is_active());
    }

    #[test]
    fn test_id_generator_monotonic() {
        let gen = OrderIdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        let c = gen.next_id();
        assert_eq!(a, 1);
        assert!(b > a && c > b);
    }

    #[test]
    fn test_trade_report_reflects_post_fill_state() {
        let mut order = make_order(10);
        order.fill(4);
        let report = ExecutionReport::trade(&order, 99, order.price, 4, 12345);

        assert_eq!(report.exec_type, ExecType::Trade);
        assert_eq!(report.contra_order_id, 99);
        assert_eq!(report.execution_quantity, 4);
        assert_eq!(report.leaves_quantity, 6);
        assert_eq!(report.cumulative_quantity, 4);
        assert_eq!(report.order_status, OrderStatus::PartiallyFilled);
        assert_eq!(report.timestamp, 12345);
    }

    #[test]
    fn test_new_report_shape() {
        let order = make_order(10);
        let report = ExecutionReport::accepted(&order);
        assert_eq!(report.exec_type, ExecType::New);
        assert_eq!(report.leaves_quantity, 10);
        assert_eq!(report.cumulative_quantity, 0);
        assert_eq!(report.contra_order_id, 0);
    }

    #[test]
    fn test_cancel_report_carries_cumulative() {
        let mut order = make_order(10);
        order.fill(3);
        order.cancel();
        let report = ExecutionReport::cancelled(&order);
        assert_eq!(report.exec_type, ExecType::Cancelled);
        assert_eq!(report.leaves_quantity, 0);
        assert_eq!(report.cumulative_quantity, 3);
    }
}
