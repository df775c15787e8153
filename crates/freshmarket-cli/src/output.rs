//! Plain-text rendering of marketplace data for the terminal.

use chrono::{DateTime, Utc};

use freshmarket_core::cart::{Cart, CheckoutSummary};
use freshmarket_core::models::{Order, OrderStats, OrderStatus, Product, User};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

pub fn format_money(amount: f64) -> String {
    format!("KES {:.2}", amount)
}

pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_user(user: &User) {
    println!("{} (#{}) - {}", user.name, user.id, user.role_display());
    if let Some(ref phone) = user.phone_number {
        println!("  Phone:    {}", phone);
    }
    if let Some(ref location) = user.location {
        println!("  Location: {}", location);
    }
    if let Some(ref bio) = user.bio {
        println!("  Bio:      {}", bio);
    }
    if let Some(count) = user.total_products {
        println!("  Products: {}", count);
    }
    if user.date_joined.is_some() {
        println!("  Joined:   {}", format_date(user.date_joined));
    }
}

pub fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("No products found.");
        return;
    }
    println!(
        "{:>5}  {:<24} {:<12} {:>22}  {:<14} {:<18} {}",
        "ID", "NAME", "CATEGORY", "PRICE", "LOCATION", "FARMER", "STATUS"
    );
    for p in products {
        println!(
            "{:>5}  {:<24} {:<12} {:>22}  {:<14} {:<18} {}",
            p.id,
            truncate_string(&p.name, 24),
            truncate_string(p.category.as_deref().unwrap_or("-"), 12),
            p.price_display(),
            truncate_string(p.location.as_deref().unwrap_or("-"), 14),
            truncate_string(p.farmer_name(), 18),
            if p.available { "available" } else { "sold out" }
        );
    }
}

pub fn print_orders(orders: &[Order]) {
    if orders.is_empty() {
        println!("No orders found.");
        return;
    }
    println!(
        "{:>5}  {:<12} {:<18} {:<20} {:>14}  {}",
        "ID", "ORDER", "STATUS", "CUSTOMER", "TOTAL", "PLACED"
    );
    for o in orders {
        println!(
            "{:>5}  {:<12} {:<18} {:<20} {:>14}  {}",
            o.id,
            truncate_string(&o.order_id, 12),
            o.status.display_name(),
            truncate_string(&o.customer_name, 20),
            format_money(o.total_amount),
            format_date(o.created_at)
        );
    }
}

pub fn print_stats(stats: &OrderStats) {
    println!("Total orders:    {}", stats.total_orders);
    println!("Pending:         {}", stats.pending_orders);
    println!("Delivered today: {}", stats.delivered_today);
    println!("Revenue:         {}", format_money(stats.total_revenue));
    println!();
    for status in OrderStatus::ALL {
        println!("  {:<18} {}", status.display_name(), stats.count_for(status));
    }
}

pub fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    println!("Your cart ({} items)", cart.item_count());
    for item in cart.items() {
        println!(
            "{:>5}  {:<24} {:>4} x {:>12} = {:>14}",
            item.product_id,
            truncate_string(&item.name, 24),
            item.quantity,
            format_money(item.price),
            format_money(item.subtotal())
        );
    }
    println!("Total: {}", format_money(cart.total()));
}

pub fn print_checkout(summary: &CheckoutSummary) {
    println!("Order summary");
    for item in &summary.items {
        println!(
            "  {:<24} {:>4} {:<8} {:>14}",
            truncate_string(&item.name, 24),
            item.quantity,
            item.unit.as_deref().unwrap_or(""),
            format_money(item.subtotal())
        );
    }
    println!("Total: {}", format_money(summary.total));
    println!("No order has been placed; your cart is unchanged.");
}
