//! Per-customer cart

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::intent::OrderIntent;
use crate::menu::Section;

/// One cart entry. The unit price is captured on first add so a menu refresh
/// never rewrites the price of something already in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Result of [`Cart::apply_delta`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaOutcome {
    pub total: Decimal,
    pub changed: bool,
}

/// Line of a rendered cart summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedLine {
    pub item: String,
    pub quantity: u32,
    pub line_total: Decimal,
}

/// Rendered cart: lines in order of first add, plus the grand total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub lines: Vec<RenderedLine>,
    pub total: Decimal,
}

/// Item quantities with a cached running total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    total: Decimal,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn quantity(&self, item: &str) -> u32 {
        self.lines
            .iter()
            .find(|l| l.item == item)
            .map_or(0, |l| l.quantity)
    }

    /// Apply removals, then additions. Items the section does not sell are
    /// dropped without comment.
    pub fn apply_delta(&mut self, intent: &OrderIntent, section: &Section) -> DeltaOutcome {
        let mut changed = false;

        for (item, qty) in intent.remove.iter() {
            let Some(pos) = self.lines.iter().position(|l| l.item == item) else {
                continue;
            };
            let line = &mut self.lines[pos];
            let removed = qty.min(line.quantity);
            if removed == 0 {
                continue;
            }
            line.quantity -= removed;
            self.total -= line.unit_price * Decimal::from(removed);
            changed = true;
            if line.quantity == 0 {
                self.lines.remove(pos);
            }
        }

        for (item, qty) in intent.add.iter() {
            if qty == 0 {
                continue;
            }
            match self.lines.iter_mut().find(|l| l.item == item) {
                Some(line) => {
                    line.quantity = line.quantity.saturating_add(qty);
                    self.total += line.unit_price * Decimal::from(qty);
                }
                None => {
                    let Some(unit_price) = section.price_of(item) else {
                        tracing::debug!(item, "Dropping item not on the bound menu");
                        continue;
                    };
                    self.lines.push(CartLine {
                        item: item.to_string(),
                        quantity: qty,
                        unit_price,
                    });
                    self.total += unit_price * Decimal::from(qty);
                }
            }
            changed = true;
        }

        DeltaOutcome {
            total: self.total,
            changed,
        }
    }

    pub fn render(&self) -> CartSummary {
        CartSummary {
            lines: self
                .lines
                .iter()
                .map(|l| RenderedLine {
                    item: l.item.clone(),
                    quantity: l.quantity,
                    line_total: l.line_total(),
                })
                .collect(),
            total: self.total,
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = Decimal::ZERO;
    }
}
