//! Order analytics computed from canonical orders.

use chrono::{DateTime, Utc};
use idev_types::{AnalyticsPeriod, AnalyticsReport, Order, OrderStage, TopProduct};
use rust_decimal::Decimal;
use std::collections::HashMap;

const TOP_PRODUCTS: usize = 5;

/// Aggregates the orders created within `period` before `now`.
///
/// Cancelled orders are left out. Orders without a creation time are counted,
/// since some vendors omit it from list responses.
pub fn summarize(period: AnalyticsPeriod, orders: &[Order], now: DateTime<Utc>) -> AnalyticsReport {
	let since = period.since(now);
	let in_window: Vec<&Order> = orders
		.iter()
		.filter(|o| o.stage != OrderStage::Cancelled)
		.filter(|o| o.created_at.map_or(true, |at| at >= since && at <= now))
		.collect();

	let total_orders = in_window.len() as u64;
	let total_revenue: Decimal = in_window.iter().map(|o| o.total).sum();
	let average_order_value = if total_orders == 0 {
		Decimal::ZERO
	} else {
		(total_revenue / Decimal::from(total_orders)).round_dp(2)
	};

	let mut currencies = in_window.iter().map(|o| o.currency.as_str());
	let currency = currencies.next().and_then(|first| {
		currencies
			.all(|c| c == first)
			.then(|| first.to_string())
	});

	let mut quantities: HashMap<&str, u64> = HashMap::new();
	for item in in_window.iter().flat_map(|o| o.line_items.iter()) {
		*quantities.entry(item.name.as_str()).or_default() += u64::from(item.quantity);
	}
	let mut top_products: Vec<TopProduct> = quantities
		.into_iter()
		.map(|(name, quantity)| TopProduct {
			name: name.to_string(),
			quantity,
		})
		.collect();
	top_products.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
	top_products.truncate(TOP_PRODUCTS);

	AnalyticsReport {
		period,
		total_orders,
		total_revenue,
		average_order_value,
		currency,
		top_products,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use idev_types::{Customer, LineItem, PlatformKind};

	fn order(id: &str, total: i64, days_ago: i64, stage: OrderStage, items: &[(&str, u32)]) -> Order {
		let now = Utc::now();
		Order {
			id: id.to_string(),
			platform: PlatformKind::Shopify,
			number: None,
			customer: Customer::default(),
			shipping_address: None,
			line_items: items
				.iter()
				.map(|(name, quantity)| LineItem {
					sku: None,
					name: name.to_string(),
					quantity: *quantity,
					unit_price: Decimal::ONE,
				})
				.collect(),
			total: Decimal::from(total),
			currency: "USD".to_string(),
			status: "paid".to_string(),
			stage,
			tracking_numbers: vec![],
			created_at: Some(now - Duration::days(days_ago)),
		}
	}

	#[test]
	fn test_window_and_totals() {
		let orders = vec![
			order("1", 100, 1, OrderStage::Paid, &[("Mug", 2), ("Cap", 1)]),
			order("2", 50, 5, OrderStage::Shipped, &[("Mug", 1)]),
			order("3", 999, 2, OrderStage::Cancelled, &[("Cap", 10)]),
			order("4", 70, 40, OrderStage::Paid, &[("Old", 9)]),
		];
		let report = summarize(AnalyticsPeriod::days(30), &orders, Utc::now());
		assert_eq!(report.total_orders, 2);
		assert_eq!(report.total_revenue, Decimal::from(150));
		assert_eq!(report.average_order_value, Decimal::from(75));
		assert_eq!(report.currency.as_deref(), Some("USD"));
		assert_eq!(report.top_products[0].name, "Mug");
		assert_eq!(report.top_products[0].quantity, 3);
		assert_eq!(report.top_products.len(), 2);
	}

	#[test]
	fn test_empty_window() {
		let report = summarize(AnalyticsPeriod::hours(1), &[], Utc::now());
		assert_eq!(report.total_orders, 0);
		assert_eq!(report.average_order_value, Decimal::ZERO);
		assert!(report.currency.is_none());
	}
}
