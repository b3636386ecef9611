use crate::types::{ColumnType, DataDigest, DataSignal};
use std::collections::BTreeSet;

const CUSTOMER_HINTS: &[&str] = &[
    "customer", "client", "user", "member", "subscriber", "account", "cust_",
];
const TEMPORAL_HINTS: &[&str] = &[
    "date", "time", "timestamp", "month", "year", "week", "day", "period", "created", "signup",
];
const MONETARY_HINTS: &[&str] = &[
    "revenue", "price", "amount", "sales", "cost", "spend", "income", "profit", "payment",
    "total", "value", "ltv",
];
const GEOGRAPHIC_HINTS: &[&str] = &[
    "country", "city", "state", "region", "province", "zip", "postal", "latitude", "longitude",
    "location", "address", "geo",
];

fn mentions(name: &str, hints: &[&str]) -> bool {
    hints.iter().any(|h| name.contains(h))
}

/// Classify a digest into coarse signal flags by column name and type.
pub fn detect_signals(digest: &DataDigest) -> BTreeSet<DataSignal> {
    let mut signals = BTreeSet::new();
    let mut numeric = false;
    let mut categorical = false;

    for (name, ty) in digest.columns() {
        let name = name.to_lowercase();
        if mentions(&name, CUSTOMER_HINTS) {
            signals.insert(DataSignal::Customer);
        }
        if ty == ColumnType::Datetime || mentions(&name, TEMPORAL_HINTS) {
            signals.insert(DataSignal::Temporal);
        }
        if mentions(&name, MONETARY_HINTS) && !matches!(ty, ColumnType::Datetime | ColumnType::Boolean) {
            signals.insert(DataSignal::Monetary);
        }
        if mentions(&name, GEOGRAPHIC_HINTS) {
            signals.insert(DataSignal::Geographic);
        }
        numeric |= ty.is_numeric();
        categorical |= ty.is_categorical();
    }

    if numeric && categorical {
        signals.insert(DataSignal::MixedTypes);
    }
    signals
}
