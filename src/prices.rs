// 💱 Price lookup seam
// Current per-unit prices come from outside (exchange feeds, manual entry).
// Engines only ever see this trait.

use crate::db::Asset;
use std::collections::HashMap;

pub trait PriceSource {
    /// Latest price per unit for `symbol`, if known.
    fn price(&self, symbol: &str) -> Option<f64>;
}

/// In-memory prices keyed by upper-cased symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticPrices {
    prices: HashMap<String, f64>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, price: f64) {
        if price.is_finite() && price >= 0.0 {
            self.prices.insert(symbol.to_uppercase(), price);
        } else {
            tracing::warn!(symbol, price, "ignoring invalid price");
        }
    }

    /// Use each asset's stored per-unit value as its price.
    pub fn from_assets(assets: &[Asset]) -> Self {
        let mut prices = StaticPrices::new();
        for asset in assets {
            if let Some(symbol) = asset.symbol.as_deref() {
                prices.insert(symbol, asset.value);
            }
        }
        prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceSource for StaticPrices {
    fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&symbol.to_uppercase()).copied()
    }
}

impl<S: PriceSource + ?Sized> PriceSource for &S {
    fn price(&self, symbol: &str) -> Option<f64> {
        (**self).price(symbol)
    }
}
