//! Core types used throughout the system
//!
//! Fixed-point prices, order enums, and the fixed-width symbol. These are
//! fundamental types shared by every module; keeping them together means a
//! single place to reason about sizes and representations.

use std::fmt;

/// Order ID - unique and monotonically assigned per engine
pub type OrderId = u64;

/// Fixed-point price: human price × 10^8
///
/// All price arithmetic is exact integer math. No floating point touches
/// the matching path.
pub type Price = i64;

/// Order quantity - signed, non-negative in all valid states
pub type Quantity = i64;

/// Nanosecond timestamp (calibrated counter reading, see [`crate::clock`])
pub type Timestamp = i64;

/// Sentinel for "no order" (returned by submit on rejection)
pub const INVALID_ORDER_ID: OrderId = 0;

/// Sentinel for "no price"
pub const INVALID_PRICE: Price = i64::MIN;

/// Fixed-point scale: 8 decimal places
pub const PRICE_MULTIPLIER: i64 = 100_000_000;

/// Convert a human price to fixed-point representation
#[inline]
pub fn to_fixed_price(price: f64) -> Price {
    (price * PRICE_MULTIPLIER as f64) as Price
}

/// Convert a fixed-point price back to a float (display only)
#[inline]
pub fn to_float_price(price: Price) -> f64 {
    price as f64 / PRICE_MULTIPLIER as f64
}

// ============================================================
// SYMBOL
// ============================================================

/// Fixed-width 16-byte instrument identifier, NUL-padded
///
/// Equality and hashing are byte-wise over the full array, so two symbols
/// compare equal iff their padded bytes match. Construction truncates to
/// 15 bytes, keeping at least one trailing NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Symbol([u8; 16]);

impl Symbol {
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; 16];
        let len = name.len().min(15);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Symbol(buf)
    }

    /// Human string form (up to the first NUL)
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(16);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

// ============================================================
// SIDE / ORDER TYPE / STATUS
// ============================================================

/// Order side: Buy or Sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderType {
    /// Limit order: crosses what it can, any remainder rests
    #[default]
    Limit,
    /// Market order: executes at any price, remainder is cancelled
    Market,
    /// Immediate-or-cancel: like Limit but the remainder is cancelled
    Ioc,
    /// Fill-or-kill: all-or-nothing against current liquidity
    Fok,
    /// Rests only; rejected if it would cross on insert
    PostOnly,
    /// Accepted on the wire but rejected at submit (no trigger infrastructure)
    StopLimit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Ioc => "IOC",
            OrderType::Fok => "FOK",
            OrderType::PostOnly => "POST_ONLY",
            OrderType::StopLimit => "STOP_LIMIT",
        }
    }
}

/// Order status
///
/// Transitions:
/// - New → PartiallyFilled → Filled
/// - New | PartiallyFilled → Cancelled
/// - New → Rejected
///
/// Filled, Cancelled, Rejected, and Expired are terminal; a terminal order
/// is removed from the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderStatus {
    #[default]
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

/// Execution report kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecType {
    New,
    Trade,
    Cancelled,
    Replaced,
    Rejected,
}

// ============================================================
// QUOTE
// ============================================================

/// Top-of-book snapshot; defined only when both sides are non-empty
#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_quantity: Quantity,
    pub ask_quantity: Quantity,
    pub timestamp: Timestamp,
}

impl Quote {
    #[inline]
    pub fn spread(&self) -> Price {
        self.ask_price - self.bid_price
    }

    #[inline]
    pub fn mid_price(&self) -> Price {
        (self.bid_price + self.ask_price) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_roundtrip() {
        let sym = Symbol::new("BTC-USD");
        assert_eq!(sym.as_str(), "BTC-USD");
        assert_eq!(sym, Symbol::new("BTC-USD"));
        assert_ne!(sym, Symbol::new("ETH-USD"));
    }

    #[test]
    fn test_symbol_truncation() {
        // 16+ byte names are truncated to 15 bytes, keeping a trailing NUL
        let sym = Symbol::new("ABCDEFGHIJKLMNOPQRST");
        assert_eq!(sym.as_str(), "ABCDEFGHIJKLMNO");
        assert_eq!(sym.as_bytes()[15], 0);
    }

    #[test]
    fn test_symbol_hash_is_bytewise() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let h = |s: Symbol| {
            let mut hasher = DefaultHasher::new();
            s.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(h(Symbol::new("TEST")), h(Symbol::new("TEST")));
    }

    #[test]
    fn test_price_conversion() {
        assert_eq!(to_fixed_price(100.0), 100 * PRICE_MULTIPLIER);
        assert_eq!(to_float_price(100 * PRICE_MULTIPLIER), 100.0);
        assert_eq!(to_fixed_price(0.00000001), 1);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_status_terminality() {
        assert!(OrderStatus::New.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn test_quote_derived_prices() {
        let q = Quote {
            bid_price: 100 * PRICE_MULTIPLIER,
            ask_price: 101 * PRICE_MULTIPLIER,
            bid_quantity: 10,
            ask_quantity: 20,
            timestamp: 0,
        };
        assert_eq!(q.spread(), PRICE_MULTIPLIER);
        assert_eq!(q.mid_price(), 100 * PRICE_MULTIPLIER + PRICE_MULTIPLIER / 2);
    }
}
