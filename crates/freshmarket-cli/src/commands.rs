//! Subcommand dispatch for the `freshmarket` binary.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};

use freshmarket_core::cart::Cart;
use freshmarket_core::models::{
    Credentials, OrderFilter, OrderStatus, ProductDraft, ProfileUpdate, RegisterRequest, User,
    UserRole,
};
use freshmarket_core::{AuthOutcome, Config, SessionEvent, SessionManager};

use crate::output;

const USAGE: &str = "\
Usage: freshmarket <command> [args]

Account:
  login [username]                       Sign in (prompts for the password)
  register <name> <farmer|buyer> [phone] [location]
                                         Create an account and sign in
  logout                                 Forget the stored tokens
  whoami [--json]                        Show the signed-in profile
  update-profile <field> <value>         Change name, phone, location or bio

Products:
  products                               Browse all listings
  my-products                            Your listings (farmers)
  add-product <name> <price> <unit> [category] [location]
  set-price <id> <price>
  toggle-product <id>                    Flip a listing between available and sold out
  delete-product <id>

Orders:
  orders [status] [--from DATE] [--to DATE]
  order-stats
  order-status <id> <status>             Move an open order to a new status
  delete-order <id>
  dashboard                              Listings and order stats at a glance

Cart:
  cart [show|add <id>|remove <id>|qty <id> <n>|clear|checkout]

Set RUST_LOG=debug for verbose logging.";

pub fn print_usage() {
    println!("{}", USAGE);
}

/// Print session transitions the user should act on.
pub fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(SessionEvent::LoginRequired) => {
                eprintln!("Session expired. Run `freshmarket login` to sign in again.");
            }
            Ok(event) => debug!(?event, "Session event"),
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "Session events dropped"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

pub struct App {
    config: Config,
    session: SessionManager,
}

impl App {
    pub fn new(config: Config, session: SessionManager) -> Self {
        Self { config, session }
    }

    pub async fn run(&mut self, command: &str, args: &[String]) -> Result<()> {
        debug!(command, "Running command");
        match command {
            "login" => self.login(args.first().cloned()).await,
            "register" => self.register(args).await,
            "logout" => {
                self.session.logout();
                println!("Signed out.");
                Ok(())
            }
            "whoami" => self.whoami(args),
            "update-profile" => self.update_profile(args).await,
            "products" => self.products().await,
            "my-products" => self.my_products().await,
            "add-product" => self.add_product(args).await,
            "set-price" => self.set_price(args).await,
            "toggle-product" => self.toggle_product(args).await,
            "delete-product" => self.delete_product(args).await,
            "orders" => self.orders(args).await,
            "order-stats" => self.order_stats().await,
            "order-status" => self.order_status(args).await,
            "delete-order" => self.delete_order(args).await,
            "dashboard" => self.dashboard().await,
            "cart" => self.cart(args).await,
            other => {
                print_usage();
                bail!("Unknown command: {}", other)
            }
        }
    }

    fn require_user(&self) -> Result<&User> {
        self.session
            .user()
            .ok_or_else(|| anyhow!("Not signed in. Run `freshmarket login` first."))
    }

    fn require_farmer(&self) -> Result<&User> {
        let user = self.require_user()?;
        if !user.is_farmer() {
            bail!("This command is only available to farmer accounts");
        }
        Ok(user)
    }

    // ===== Account =====

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(name) => name,
            None => prompt("Username: ")?,
        };
        let password = rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?;

        match self.session.login(&Credentials::new(&username, password)).await {
            AuthOutcome::Success => {
                self.remember_username(username);
                if let Some(user) = self.session.user() {
                    println!("Signed in as {} ({}).", user.name, user.role_display());
                }
                Ok(())
            }
            AuthOutcome::Failed(message) => bail!(message),
        }
    }

    async fn register(&mut self, args: &[String]) -> Result<()> {
        let (name, role) = match args {
            [name, role, ..] => (name.as_str(), role.as_str()),
            _ => bail!("Usage: freshmarket register <name> <farmer|buyer> [phone] [location]"),
        };
        let role = UserRole::parse(role)
            .ok_or_else(|| anyhow!("Account type must be 'farmer' or 'buyer', got '{}'", role))?;

        let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
        let confirmation =
            rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
        if password != confirmation {
            bail!("Passwords do not match");
        }

        let mut request = RegisterRequest::new(name, password, role);
        request.phone_number = args.get(2).cloned();
        request.location = args.get(3).cloned();

        match self.session.register(&request).await {
            AuthOutcome::Success => {
                self.remember_username(name.to_string());
                println!("Account created. Signed in as {} ({}).", name, role);
                Ok(())
            }
            AuthOutcome::Failed(message) => bail!(message),
        }
    }

    fn remember_username(&mut self, username: String) {
        if self.config.last_username.as_deref() == Some(username.as_str()) {
            return;
        }
        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            tracing::warn!(error = %e, "Failed to save config");
        }
    }

    fn whoami(&self, args: &[String]) -> Result<()> {
        let user = self.require_user()?;
        if args.iter().any(|a| a == "--json") {
            println!("{}", serde_json::to_string_pretty(user)?);
        } else {
            output::print_user(user);
        }
        Ok(())
    }

    async fn update_profile(&mut self, args: &[String]) -> Result<()> {
        self.require_user()?;
        let update = parse_profile_update(args)?;
        let user = self.session.update_profile(&update).await?;
        println!("Profile updated.");
        output::print_user(user);
        Ok(())
    }

    // ===== Products =====

    async fn products(&self) -> Result<()> {
        let products = self.session.api().list_products().await?;
        output::print_products(&products);
        Ok(())
    }

    async fn my_products(&self) -> Result<()> {
        self.require_farmer()?;
        let products = self.session.api().my_products().await?;
        output::print_products(&products);
        Ok(())
    }

    async fn add_product(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let (name, price, unit) = match args {
            [name, price, unit, ..] => (name, parse_price(price)?, unit),
            _ => bail!("Usage: freshmarket add-product <name> <price> <unit> [category] [location]"),
        };
        let mut draft = ProductDraft::new(name.as_str(), price, unit.as_str());
        draft.category = args.get(3).cloned();
        draft.location = args.get(4).cloned();

        let product = self.session.api().create_product(&draft).await?;
        info!(id = product.id, "Product created");
        println!("Listed {} (#{}) at {}.", product.name, product.id, product.price_display());
        Ok(())
    }

    async fn set_price(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let (id, price) = match args {
            [id, price, ..] => (parse_id(id)?, parse_price(price)?),
            _ => bail!("Usage: freshmarket set-price <id> <price>"),
        };
        let api = self.session.api();
        let current = api.get_product(id).await?;
        let mut draft = ProductDraft::from(&current);
        draft.price = price;

        let product = api.update_product(id, &draft).await?;
        println!("{} now sells at {}.", product.name, product.price_display());
        Ok(())
    }

    async fn toggle_product(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let id = parse_id(single_arg(args, "toggle-product <id>")?)?;
        let api = self.session.api();
        let current = api.get_product(id).await?;
        let product = api.set_product_availability(id, !current.available).await?;
        println!(
            "{} is now {}.",
            product.name,
            if product.available { "available" } else { "sold out" }
        );
        Ok(())
    }

    async fn delete_product(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let id = parse_id(single_arg(args, "delete-product <id>")?)?;
        self.session.api().delete_product(id).await?;
        println!("Product #{} deleted.", id);
        Ok(())
    }

    // ===== Orders =====

    async fn orders(&self, args: &[String]) -> Result<()> {
        self.require_user()?;
        let filter = parse_order_filter(args)?;
        let orders = self.session.api().list_orders(&filter).await?;
        output::print_orders(&orders);
        Ok(())
    }

    async fn order_stats(&self) -> Result<()> {
        self.require_farmer()?;
        let stats = self.session.api().order_stats().await?;
        output::print_stats(&stats);
        Ok(())
    }

    async fn order_status(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let (id, status) = match args {
            [id, status, ..] => (parse_id(id)?, parse_status(status)?),
            _ => bail!("Usage: freshmarket order-status <id> <status>"),
        };
        let api = self.session.api();
        let orders = api.list_orders(&OrderFilter::default()).await?;
        let order = orders
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| anyhow!("Order #{} not found", id))?;
        if !order.status.is_open() {
            bail!(
                "Order {} is {} and can no longer change status",
                order.order_id,
                order.status.display_name().to_lowercase()
            );
        }

        api.update_order_status(id, status).await?;
        println!("Order {} marked {}.", order.order_id, status.display_name());
        Ok(())
    }

    async fn delete_order(&self, args: &[String]) -> Result<()> {
        self.require_farmer()?;
        let id = parse_id(single_arg(args, "delete-order <id>")?)?;
        self.session.api().delete_order(id).await?;
        println!("Order #{} deleted.", id);
        Ok(())
    }

    async fn dashboard(&self) -> Result<()> {
        let user = self.require_farmer()?;
        let api = self.session.api();
        let (products, stats) = futures::try_join!(api.my_products(), api.order_stats())?;

        println!("Welcome back, {}.", user.name);
        println!();
        output::print_stats(&stats);
        println!();
        output::print_products(&products);
        Ok(())
    }

    // ===== Cart =====

    async fn cart(&self, args: &[String]) -> Result<()> {
        let path = Cart::snapshot_path(&self.config.data_dir()?);
        let mut cart = Cart::load(&path)?;

        let change = match args.first().map(String::as_str).unwrap_or("show") {
            "add" => {
                let id = parse_id(args.get(1).ok_or_else(|| anyhow!("Usage: freshmarket cart add <id>"))?)?;
                let product = self.session.api().get_product(id).await?;
                if !product.available {
                    bail!("{} is sold out", product.name);
                }
                cart.add(&product);
                println!("Added {} to your cart.", product.name);
                CartChange::Changed
            }
            "checkout" => {
                self.require_user()?;
                apply_cart_action(&mut cart, args)?
            }
            _ => apply_cart_action(&mut cart, args)?,
        };

        if change == CartChange::Changed {
            cart.save(&path)?;
            output::print_cart(&cart);
        }
        Ok(())
    }
}

/// Whether a cart action left the snapshot needing a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CartChange {
    Unchanged,
    Changed,
}

/// Cart actions that need no API call.
///
/// Checkout only reports what would be ordered; the cart is kept until an
/// order is actually placed.
fn apply_cart_action(cart: &mut Cart, args: &[String]) -> Result<CartChange> {
    match args.first().map(String::as_str).unwrap_or("show") {
        "show" => {
            output::print_cart(cart);
            Ok(CartChange::Unchanged)
        }
        "remove" => {
            let id = parse_id(args.get(1).ok_or_else(|| anyhow!("Usage: freshmarket cart remove <id>"))?)?;
            if !cart.remove(id) {
                bail!("Product #{} is not in your cart", id);
            }
            Ok(CartChange::Changed)
        }
        "qty" => {
            let (id, quantity) = match args {
                [_, id, quantity, ..] => (
                    parse_id(id)?,
                    quantity
                        .parse::<u32>()
                        .with_context(|| format!("Invalid quantity: {}", quantity))?,
                ),
                _ => bail!("Usage: freshmarket cart qty <id> <n>"),
            };
            if !cart.set_quantity(id, quantity) {
                bail!("Product #{} is not in your cart", id);
            }
            Ok(CartChange::Changed)
        }
        "clear" => {
            cart.clear();
            Ok(CartChange::Changed)
        }
        "checkout" => {
            let summary = cart.checkout()?;
            output::print_checkout(&summary);
            Ok(CartChange::Unchanged)
        }
        other => bail!("Unknown cart action: {}", other),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

fn single_arg<'a>(args: &'a [String], usage: &str) -> Result<&'a String> {
    args.first()
        .ok_or_else(|| anyhow!("Usage: freshmarket {}", usage))
}

fn parse_id(s: &str) -> Result<i64> {
    s.parse().with_context(|| format!("Invalid id: {}", s))
}

fn parse_price(s: &str) -> Result<f64> {
    let price: f64 = s.parse().with_context(|| format!("Invalid price: {}", s))?;
    if !price.is_finite() || price < 0.0 {
        bail!("Price must be a non-negative number");
    }
    Ok(price)
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    OrderStatus::parse(s).ok_or_else(|| {
        let valid: Vec<_> = OrderStatus::ALL.iter().map(OrderStatus::as_str).collect();
        anyhow!("Unknown status '{}'. Expected one of: {}", s, valid.join(", "))
    })
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

fn parse_order_filter(args: &[String]) -> Result<OrderFilter> {
    let mut filter = OrderFilter::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--from" => {
                let value = iter.next().ok_or_else(|| anyhow!("--from needs a date"))?;
                filter.date_from = Some(parse_date(value)?);
            }
            "--to" => {
                let value = iter.next().ok_or_else(|| anyhow!("--to needs a date"))?;
                filter.date_to = Some(parse_date(value)?);
            }
            "all" => filter.status = None,
            status => filter.status = Some(parse_status(status)?),
        }
    }
    Ok(filter)
}

fn parse_profile_update(args: &[String]) -> Result<ProfileUpdate> {
    let (field, value) = match args {
        [field, rest @ ..] if !rest.is_empty() => (field.as_str(), rest.join(" ")),
        _ => bail!("Usage: freshmarket update-profile <name|phone|location|bio> <value>"),
    };
    let mut update = ProfileUpdate::default();
    match field {
        "name" => update.name = Some(value),
        "phone" | "phone_number" => update.phone_number = Some(value),
        "location" => update.location = Some(value),
        "bio" => update.bio = Some(value),
        other => bail!("Unknown profile field: {}", other),
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_order_filter() {
        let filter = parse_order_filter(&args(&["pending", "--from", "2025-06-01"])).unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Pending));
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert!(filter.date_to.is_none());

        let filter = parse_order_filter(&args(&["all"])).unwrap();
        assert!(filter.status.is_none());

        assert!(parse_order_filter(&args(&["shipped"])).is_err());
        assert!(parse_order_filter(&args(&["--to"])).is_err());
        assert!(parse_order_filter(&args(&["--to", "01/06/2025"])).is_err());
    }

    #[test]
    fn test_parse_profile_update() {
        let update = parse_profile_update(&args(&["location", "Kiambu", "County"])).unwrap();
        assert_eq!(update.location.as_deref(), Some("Kiambu County"));
        assert!(update.name.is_none());

        let update = parse_profile_update(&args(&["phone", "0712345678"])).unwrap();
        assert_eq!(update.phone_number.as_deref(), Some("0712345678"));

        assert!(parse_profile_update(&args(&["bio"])).is_err());
        assert!(parse_profile_update(&args(&["email", "x@y.z"])).is_err());
    }

    #[test]
    fn test_parse_price_and_id() {
        assert_eq!(parse_price("49.5").unwrap(), 49.5);
        assert!(parse_price("-1").is_err());
        assert!(parse_price("free").is_err());
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(parse_id("twelve").is_err());
    }

    fn cart_with_two_lines() -> Cart {
        let mut cart = Cart::new();
        for (id, price) in [(1, 50.0), (2, 60.0)] {
            let product = serde_json::from_value(serde_json::json!({
                "id": id, "name": format!("Sukuma {}", id), "price": price, "unit": "bundle"
            }))
            .unwrap();
            cart.add(&product);
        }
        cart
    }

    #[test]
    fn test_checkout_keeps_cart() {
        let mut cart = cart_with_two_lines();
        let before = cart.clone();

        let change = apply_cart_action(&mut cart, &args(&["checkout"])).unwrap();

        assert_eq!(change, CartChange::Unchanged);
        assert_eq!(cart, before);
        assert_eq!(cart.total(), 110.0);
    }

    #[test]
    fn test_checkout_refuses_empty_cart() {
        let mut cart = Cart::new();
        let err = apply_cart_action(&mut cart, &args(&["checkout"])).unwrap_err();
        assert_eq!(err.to_string(), "Your cart is empty");
    }

    #[test]
    fn test_local_cart_actions() {
        let mut cart = cart_with_two_lines();

        assert_eq!(
            apply_cart_action(&mut cart, &args(&["qty", "2", "3"])).unwrap(),
            CartChange::Changed
        );
        assert_eq!(cart.total(), 50.0 + 180.0);

        assert_eq!(
            apply_cart_action(&mut cart, &args(&["remove", "1"])).unwrap(),
            CartChange::Changed
        );
        assert!(apply_cart_action(&mut cart, &args(&["remove", "1"])).is_err());
        assert_eq!(apply_cart_action(&mut cart, &[]).unwrap(), CartChange::Unchanged);

        apply_cart_action(&mut cart, &args(&["clear"])).unwrap();
        assert!(cart.is_empty());
        assert!(apply_cart_action(&mut cart, &args(&["empty"])).is_err());
    }

    #[test]
    fn test_report_session_events_drains_channel() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(SessionEvent::TokenRefreshed).unwrap();
        tx.send(SessionEvent::LoginRequired).unwrap();
        report_session_events(&mut rx);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
