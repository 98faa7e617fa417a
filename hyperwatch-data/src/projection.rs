//! Read-side filtering of the display buffer.

use crate::{
    config::{env_parse, parse_coins, parse_flag},
    trade::NormalizedTradeRecord,
};
use fnv::FnvHashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Independent display predicates. A default value lets every record through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ViewFilters {
    pub tracked_only: bool,
    pub large_only: bool,
    /// Inclusive lower bound on notional
    pub min_notional: Option<Decimal>,
    /// Coin whitelist, `None` allows every coin
    pub coins: Option<FnvHashSet<SmolStr>>,
}

impl ViewFilters {
    /// Build from `HYPERWATCH_VIEW_*` environment variables. Unset variables disable the
    /// corresponding predicate.
    pub fn from_env() -> Self {
        let flag = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|value| parse_flag(&value))
                .unwrap_or(false)
        };

        Self {
            tracked_only: flag("HYPERWATCH_VIEW_TRACKED_ONLY"),
            large_only: flag("HYPERWATCH_VIEW_LARGE_ONLY"),
            min_notional: env_parse("HYPERWATCH_VIEW_MIN_NOTIONAL"),
            coins: std::env::var("HYPERWATCH_VIEW_COINS")
                .ok()
                .map(|coins| parse_coins(&coins).into_iter().collect()),
        }
    }

    pub fn with_tracked_only(mut self, tracked_only: bool) -> Self {
        self.tracked_only = tracked_only;
        self
    }

    pub fn with_large_only(mut self, large_only: bool) -> Self {
        self.large_only = large_only;
        self
    }

    pub fn with_min_notional(mut self, min_notional: Decimal) -> Self {
        self.min_notional = Some(min_notional);
        self
    }

    pub fn with_coins<I, C>(mut self, coins: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<SmolStr>,
    {
        self.coins = Some(coins.into_iter().map(Into::into).collect());
        self
    }

    /// Does the record satisfy every enabled predicate?
    pub fn matches(&self, record: &NormalizedTradeRecord) -> bool {
        (!self.tracked_only || record.is_tracked)
            && (!self.large_only || record.is_large)
            && self
                .min_notional
                .is_none_or(|min_notional| record.notional >= min_notional)
            && self
                .coins
                .as_ref()
                .is_none_or(|coins| coins.contains(&record.coin))
    }
}

/// Lazily filter `records`, preserving input order (newest first for the display buffer).
pub fn project<'a, I>(
    records: I,
    filters: &'a ViewFilters,
) -> impl Iterator<Item = &'a NormalizedTradeRecord> + 'a
where
    I: IntoIterator<Item = &'a NormalizedTradeRecord>,
    I::IntoIter: 'a,
{
    records
        .into_iter()
        .filter(move |record| filters.matches(record))
}
