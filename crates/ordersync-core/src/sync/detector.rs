//! Field-level conflict detection
//!
//! Detection only feeds the audit trail. The whole winning version is kept
//! regardless of which fields differ.

use std::collections::BTreeSet;

use crate::models::{ConflictField, OrderVersion};
use crate::util::same_cents;

/// Monitored fields whose values differ between the two versions
///
/// Items, timestamps, and server bookkeeping are never compared.
pub fn detect(local: &OrderVersion, server: &OrderVersion) -> BTreeSet<ConflictField> {
    ConflictField::ALL
        .into_iter()
        .filter(|field| differs(*field, local, server))
        .collect()
}

fn differs(field: ConflictField, local: &OrderVersion, server: &OrderVersion) -> bool {
    match field {
        ConflictField::ClientName => local.client_name != server.client_name,
        ConflictField::ClientPhone => local.client_phone != server.client_phone,
        ConflictField::Total => !same_cents(local.total, server.total),
        ConflictField::DeliveryDate => local.delivery_date != server.delivery_date,
        ConflictField::DeliveryTime => local.delivery_time != server.delivery_time,
        ConflictField::Status => local.status != server.status,
        ConflictField::Notes => local.notes != server.notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::version;
    use crate::models::{LineItem, OrderStatus};

    #[test]
    fn identical_versions_have_no_conflicts() {
        assert!(detect(&version(120.0, 5), &version(120.0, 5)).is_empty());
    }

    #[test]
    fn timestamps_alone_are_not_conflicts() {
        assert!(detect(&version(120.0, 10), &version(120.0, 5)).is_empty());
    }

    #[test]
    fn reports_each_differing_field() {
        let server = version(120.0, 5);
        let mut local = version(150.0, 10);
        local.status = OrderStatus::Ready;
        local.notes = Some("Leave at the door".to_string());

        let fields = detect(&local, &server);
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![ConflictField::Total, ConflictField::Status, ConflictField::Notes]
        );
    }

    #[test]
    fn totals_compare_at_two_decimals() {
        let server = version(0.3, 5);
        let local = version(0.1 + 0.2, 10);
        assert!(detect(&local, &server).is_empty());

        let local = version(0.31, 10);
        assert!(detect(&local, &server).contains(&ConflictField::Total));
    }

    #[test]
    fn large_totals_still_differ() {
        let server = version(1e20, 5);
        let local = version(2e20, 10);
        assert_eq!(
            detect(&local, &server).into_iter().collect::<Vec<_>>(),
            vec![ConflictField::Total]
        );
        assert!(detect(&version(1e20, 10), &server).is_empty());
    }

    #[test]
    fn optional_fields_compare_presence() {
        let server = version(120.0, 5);
        let mut local = version(120.0, 10);
        local.client_phone = None;
        local.delivery_time = None;

        let fields = detect(&local, &server);
        assert!(fields.contains(&ConflictField::ClientPhone));
        assert!(fields.contains(&ConflictField::DeliveryTime));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn item_changes_are_not_monitored() {
        let server = version(120.0, 5);
        let mut local = version(120.0, 10);
        local.items.push(LineItem {
            product_name: "Candles".to_string(),
            quantity: 3,
            unit_price: 0.0,
            notes: None,
        });
        assert!(detect(&local, &server).is_empty());
    }
}
