//! Customer commands.
//!
//! Each invocation restores the session and cart from the on-device cache,
//! runs one operation, waits for queued remote writes to finish and exits.

use std::io::BufRead;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Subcommand;
use shoplane_core::{AddressId, AddressKind, PaymentMode, Pincode, ProductId, VariantKey};
use shoplane_storefront::address::{AddressBook, AddressBookError, AddressDraft, PincodeInput};
use shoplane_storefront::api::ApiClient;
use shoplane_storefront::bookmarks::Bookmarks;
use shoplane_storefront::cache::{FileCache, LocalCache};
use shoplane_storefront::cart::{AddOutcome, CartStore, SyncOutcome};
use shoplane_storefront::catalog::{Catalog, Pager, ProductQuery};
use shoplane_storefront::checkout::{
    CheckoutFlow, CheckoutOptions, ConfirmationStage, GatewayAuthorizer, GatewayOutcome,
    PaymentResult,
};
use shoplane_storefront::config::StorefrontConfig;
use shoplane_storefront::notify::{Notice, NoticeLevel, Notifier, drain};
use shoplane_storefront::services::auth::AuthService;
use shoplane_storefront::services::orders::my_orders;
use shoplane_storefront::services::postal::{PostalClient, PostalLookup};
use shoplane_storefront::session::Session;
use tokio::sync::broadcast;

use super::{CliResult, Out};

#[derive(Subcommand)]
pub enum ShopCommand {
    /// Sign in and pull the saved cart and wishlist
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign out and wipe local cart, wishlist and credential
    Logout,
    /// Update the signed-in profile
    Profile {
        #[arg(short, long)]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Browse the catalog
    Products {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(long)]
        section: Option<String>,
        /// Number of pages to load; defaults to where the last listing of
        /// the same query left off
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Show one product and related items
    Product { id: String },
    /// Manage the bag
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Manage saved addresses
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Look up the city and state for a pincode
    Pincode { pincode: String },
    /// List past orders
    Orders,
    /// Place an order for the current bag
    Checkout {
        /// Saved address id; defaults to the selected address
        #[arg(short, long)]
        address: Option<String>,
        /// `upi`, `card` or `cod`
        #[arg(short, long, default_value = "cod")]
        mode: PaymentMode,
    },
}

#[derive(Subcommand)]
pub enum CartAction {
    Show,
    Add {
        product_id: String,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Remove {
        product_id: String,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Set the quantity of a line (0 removes it)
    Qty {
        product_id: String,
        quantity: u32,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Replace local state with the server's
    Sync,
}

#[derive(Subcommand)]
pub enum WishlistAction {
    Show,
    Add { product_id: String },
    Remove { product_id: String },
}

#[derive(Subcommand)]
pub enum AddressAction {
    List,
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        pincode: String,
        #[arg(long)]
        locality: String,
        #[arg(long)]
        address: String,
        /// Fill in when the pincode lookup is unavailable
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value = "home")]
        kind: String,
    },
    Remove { id: String },
    Select { id: String },
}

fn variant(size: Option<String>, color: Option<String>) -> Option<VariantKey> {
    VariantKey::normalize(Some(VariantKey { size, color }))
}

// =============================================================================
// Context
// =============================================================================

/// Everything one invocation needs.
struct Shop {
    config: StorefrontConfig,
    cache: Arc<dyn LocalCache>,
    api: ApiClient,
    notifier: Notifier,
    notices: broadcast::Receiver<Notice>,
    out: Out,
}

impl Shop {
    fn open() -> Result<Self, super::CliError> {
        let config = StorefrontConfig::from_env()?;
        let cache: Arc<dyn LocalCache> = Arc::new(FileCache::open(&config.cache_dir)?);
        let session = Session::restore(Arc::clone(&cache));
        let api = ApiClient::new(config.api_url.clone(), session);
        let notifier = Notifier::default();
        let notices = notifier.subscribe();
        Ok(Self {
            config,
            cache,
            api,
            notifier,
            notices,
            out: Out::new(),
        })
    }

    fn store(&self) -> CartStore {
        let store = CartStore::new(
            Arc::clone(&self.cache),
            Arc::new(self.api.clone()),
            self.api.session().clone(),
            self.notifier.clone(),
            self.config.failure_policy,
        );
        if let Some(period) = self.config.reconcile_interval {
            store.spawn_reconciler(period);
        }
        store
    }

    fn catalog(&self) -> Catalog {
        Catalog::new(self.api.clone())
    }

    /// Let queued writes finish, stop background work, then show notices.
    async fn finish(&mut self, store: &CartStore) -> CliResult {
        store.settle().await;
        store.shutdown().await;
        self.flush_notices()
    }

    fn flush_notices(&mut self) -> CliResult {
        for notice in drain(&mut self.notices) {
            let tag = match notice.level {
                NoticeLevel::Success => "ok",
                NoticeLevel::Info => "note",
                NoticeLevel::Error => "failed",
            };
            self.out.line(format_args!("[{tag}] {}", notice.message))?;
        }
        Ok(())
    }

    fn report_sync(&mut self, outcome: SyncOutcome) -> CliResult {
        let text = match outcome {
            SyncOutcome::Skipped => return Ok(()),
            SyncOutcome::Synced => "Synced with your account.",
            SyncOutcome::Stale => "Local changes pending; showing local state.",
            SyncOutcome::Unauthorized => "Session expired. Please sign in again.",
            SyncOutcome::Failed => "Could not reach the store; showing saved state.",
        };
        self.out.line(text)?;
        Ok(())
    }
}

pub async fn run(command: ShopCommand) -> CliResult {
    let mut shop = Shop::open()?;
    match command {
        ShopCommand::Login { email, password } => login(&mut shop, &email, &password).await,
        ShopCommand::Register {
            name,
            email,
            password,
        } => {
            let user = AuthService::new(&shop.api)
                .register(&name, &email, &password)
                .await?;
            match user {
                Some(user) => shop.out.line(format_args!("Welcome, {}!", user.first_name()))?,
                None => shop.out.line("Account created. Please sign in.")?,
            }
            Ok(())
        }
        ShopCommand::Logout => {
            let store = shop.store();
            store.clear_all();
            shop.finish(&store).await?;
            shop.out.line("Signed out.")?;
            Ok(())
        }
        ShopCommand::Profile { name, phone } => {
            let user = AuthService::new(&shop.api)
                .update_profile(&name, &phone)
                .await?;
            shop.out.line(format_args!("Profile updated: {} <{}>", user.name, user.email.as_str()))?;
            Ok(())
        }
        ShopCommand::Products {
            search,
            category,
            section,
            pages,
        } => {
            let query = ProductQuery {
                search,
                category,
                section,
                limit: None,
            };
            products(&mut shop, query, pages).await
        }
        ShopCommand::Product { id } => product(&mut shop, &ProductId::new(id)).await,
        ShopCommand::Cart { action } => cart(&mut shop, action).await,
        ShopCommand::Wishlist { action } => wishlist(&mut shop, action).await,
        ShopCommand::Address { action } => address(&mut shop, action).await,
        ShopCommand::Pincode { pincode } => {
            let pincode = Pincode::parse(&pincode).map_err(AddressBookError::from)?;
            let place = PostalClient::new(shop.config.postal_url.clone())
                .lookup(&pincode)
                .await?;
            shop.out.line(format_args!("{pincode}: {}, {}", place.city, place.state))?;
            Ok(())
        }
        ShopCommand::Orders => orders(&mut shop).await,
        ShopCommand::Checkout { address, mode } => checkout(&mut shop, address, mode).await,
    }
}

// =============================================================================
// Account
// =============================================================================

async fn login(shop: &mut Shop, email: &str, password: &str) -> CliResult {
    let user = AuthService::new(&shop.api).login(email, password).await?;
    shop.out.line(format_args!("Welcome back, {}!", user.first_name()))?;

    let store = shop.store();
    let outcome = store.fetch_remote_state().await;
    shop.report_sync(outcome)?;
    shop.out.line(format_args!(
        "{} item(s) in bag, {} in wishlist",
        store.cart().len(),
        store.wishlist().len()
    ))?;
    shop.finish(&store).await
}

async fn orders(shop: &mut Shop) -> CliResult {
    let orders = my_orders(&shop.api).await?;
    if orders.is_empty() {
        shop.out.line("No orders yet.")?;
    }
    for order in orders {
        let placed = order
            .created_at
            .map_or_else(|| "-".to_string(), |at| at.format("%d %b %Y").to_string());
        shop.out.line(format_args!(
            "{}  {placed}  {:<9}  {} unit(s)  {}",
            order.id,
            order.status,
            order.unit_count(),
            order.amount
        ))?;
    }
    Ok(())
}

// =============================================================================
// Catalog
// =============================================================================

async fn products(shop: &mut Shop, query: ProductQuery, pages: Option<u32>) -> CliResult {
    let bookmarks = Bookmarks::new(Arc::clone(&shop.cache));
    let key = query.to_query_string();
    let mut pager = Pager::new(shop.catalog(), query);
    pager.reload().await?;

    match pages {
        Some(pages) => {
            for _ in 1..pages {
                if !pager.has_more() {
                    break;
                }
                pager.load_more().await?;
            }
        }
        None => {
            let resume_at = bookmarks.restore(&key).unwrap_or(0);
            while pager.has_more() && (pager.products().len() as u64) < resume_at {
                pager.load_more().await?;
            }
        }
    }
    bookmarks.save(&key, pager.products().len() as u64);

    for product in pager.products() {
        let stock = if product.is_out_of_stock() {
            "  (out of stock)"
        } else if product.is_low_stock() {
            "  (few left)"
        } else {
            ""
        };
        shop.out.line(format_args!(
            "{:<26} {:<30} {}{stock}",
            product.id, product.name, product.price
        ))?;
    }
    if pager.has_more() {
        shop.out.line("... more available (use --pages)")?;
    }
    Ok(())
}

async fn product(shop: &mut Shop, id: &ProductId) -> CliResult {
    let catalog = shop.catalog();
    let product = catalog.product(id).await?;

    shop.out.line(format_args!("{} ({})", product.name, product.id))?;
    if let Some(brand) = &product.brand {
        shop.out.line(format_args!("by {brand}"))?;
    }
    match product.original_price.filter(|mrp| *mrp > product.price) {
        Some(mrp) => shop.out.line(format_args!("{} (MRP {mrp})", product.price))?,
        None => shop.out.line(product.price)?,
    }
    if !product.sizes.is_empty() {
        shop.out.line(format_args!("Sizes: {}", product.sizes.join(", ")))?;
    }
    if let Some(image) = product.primary_image() {
        shop.out.line(format_args!("Image: {}", catalog.image_url(image)))?;
    }
    if let Some(description) = &product.description {
        shop.out.line(description)?;
    }

    let related = catalog.related(&product).await?;
    if !related.is_empty() {
        shop.out.line("You may also like:")?;
        for item in related {
            shop.out.line(format_args!("  {}  {}  {}", item.id, item.name, item.price))?;
        }
    }
    Ok(())
}

// =============================================================================
// Cart and wishlist
// =============================================================================

async fn cart(shop: &mut Shop, action: CartAction) -> CliResult {
    let store = shop.store();
    match action {
        CartAction::Show => {}
        CartAction::Add {
            product_id,
            size,
            color,
        } => {
            let product = shop.catalog().product(&ProductId::new(product_id)).await?;
            if store.add_item(&product, variant(size, color)) == AddOutcome::AlreadyPresent {
                tracing::debug!(product_id = %product.id, "line already in bag");
            }
        }
        CartAction::Remove {
            product_id,
            size,
            color,
        } => store.remove_item(&ProductId::new(product_id), variant(size, color)),
        CartAction::Qty {
            product_id,
            quantity,
            size,
            color,
        } => store.update_quantity(&ProductId::new(product_id), quantity, variant(size, color)),
        CartAction::Sync => {
            let outcome = store.fetch_remote_state().await;
            shop.report_sync(outcome)?;
        }
    }
    store.settle().await;

    let lines = store.cart();
    if lines.is_empty() {
        shop.out.line("Your bag is empty.")?;
    }
    for line in &lines {
        let variant = line
            .variant
            .as_ref()
            .map(|v| format!(" [{v}]"))
            .unwrap_or_default();
        shop.out.line(format_args!(
            "{} x {}{variant}  {}",
            line.quantity,
            line.product.name,
            line.line_total()
        ))?;
    }
    if !lines.is_empty() {
        let summary = store.summary(&shop.config.pricing);
        shop.out.line(format_args!(
            "Subtotal {}  Platform fee {}  Total {}",
            summary.subtotal, summary.platform_fee, summary.total
        ))?;
    }
    shop.finish(&store).await
}

async fn wishlist(shop: &mut Shop, action: WishlistAction) -> CliResult {
    let store = shop.store();
    match action {
        WishlistAction::Show => {}
        WishlistAction::Add { product_id } => {
            let product = shop.catalog().product(&ProductId::new(product_id)).await?;
            store.add_to_wishlist(&product);
        }
        WishlistAction::Remove { product_id } => {
            store.remove_from_wishlist(&ProductId::new(product_id));
        }
    }
    store.settle().await;

    for entry in store.wishlist() {
        shop.out.line(format_args!("{}  {}  {}", entry.product.id, entry.product.name, entry.product.price))?;
    }
    shop.finish(&store).await
}

// =============================================================================
// Addresses
// =============================================================================

async fn address(shop: &mut Shop, action: AddressAction) -> CliResult {
    let mut book = AddressBook::load(Arc::clone(&shop.cache), shop.notifier.clone());
    match action {
        AddressAction::List => {}
        AddressAction::Add {
            name,
            phone,
            pincode,
            locality,
            address,
            city,
            state,
            kind,
        } => {
            let mut draft = AddressDraft {
                name,
                phone,
                locality,
                address,
                kind: match kind.to_ascii_lowercase().as_str() {
                    "work" => AddressKind::Work,
                    "other" => AddressKind::Other,
                    _ => AddressKind::Home,
                },
                ..AddressDraft::default()
            };
            let postal = PostalClient::new(shop.config.postal_url.clone());
            if draft.set_pincode(&postal, &shop.notifier, &pincode).await == PincodeInput::Rejected {
                draft.pincode = pincode;
            }
            if let Some(city) = city {
                draft.city = city;
            }
            if let Some(state) = state {
                draft.state = state;
            }
            book.save(draft)?;
        }
        AddressAction::Remove { id } => book.delete(&AddressId::new(id))?,
        AddressAction::Select { id } => book.select(&AddressId::new(id))?,
    }

    let selected = book.selected().map(|a| a.id.clone());
    for address in book.addresses() {
        let marker = if selected.as_ref() == Some(&address.id) { "*" } else { " " };
        shop.out.line(format_args!(
            "{marker} {}  {:?}  {}, {}",
            address.id,
            address.kind,
            address.name,
            address.one_line()
        ))?;
    }
    shop.flush_notices()
}

// =============================================================================
// Checkout
// =============================================================================

/// Collects the gateway result at the terminal.
///
/// The customer pays in the gateway's own UI and pastes back the payment id
/// and signature. An empty line means they gave up.
struct TerminalAuthorizer;

#[async_trait]
impl GatewayAuthorizer for TerminalAuthorizer {
    async fn authorize(&self, options: &CheckoutOptions) -> GatewayOutcome {
        let prompt = format!(
            "Pay {} paise ({}) for gateway order {}, then enter '<payment_id> <signature>':",
            options.amount, options.currency, options.order_id
        );
        let order_id = options.order_id.clone();
        let reply = tokio::task::spawn_blocking(move || {
            Out::new().line(prompt).ok()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok()?;
            Some(line)
        })
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

        let mut parts = reply.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(payment_id), Some(signature)) => GatewayOutcome::Authorized {
                order_id,
                payment_id: payment_id.to_owned(),
                signature: signature.to_owned(),
            },
            _ => GatewayOutcome::Dismissed,
        }
    }
}

async fn checkout(shop: &mut Shop, address: Option<String>, mode: PaymentMode) -> CliResult {
    let store = shop.store();
    let outcome = store.fetch_remote_state().await;
    shop.report_sync(outcome)?;

    let mut book = AddressBook::load(Arc::clone(&shop.cache), shop.notifier.clone());
    if let Some(id) = address {
        book.select(&AddressId::new(id))?;
    }
    let address = book.deliver_here()?;

    let mut flow = CheckoutFlow::new(
        store.clone(),
        Arc::new(shop.api.clone()),
        Arc::clone(&shop.cache),
        shop.config.pricing,
        shop.config.razorpay_key_id.clone(),
    );
    flow.begin()?;
    flow.select_address(address)?;
    flow.proceed_to_payment()?;
    flow.choose_payment(mode)?;
    shop.out.line(format_args!("Payable: {}", flow.amount().total))?;

    let receipt = if mode.uses_gateway() {
        match flow.pay(&TerminalAuthorizer).await? {
            PaymentResult::Confirmed(receipt) => receipt,
            PaymentResult::Dismissed => {
                shop.out.line("Payment cancelled. Your bag is unchanged.")?;
                return shop.finish(&store).await;
            }
        }
    } else {
        flow.confirm_cash_on_delivery().await?
    };

    let timings = shop.config.confirmation;
    let out = &mut shop.out;
    let mut write_error = None;
    timings
        .play(|stage| {
            let text = match stage {
                ConfirmationStage::PaymentVerified => "Payment verified",
                ConfirmationStage::SendingConfirmation => "Sending confirmation",
                ConfirmationStage::Success => "Order placed",
                ConfirmationStage::ReturnToCatalog => return,
            };
            if let Err(e) = out.line(text) {
                write_error.get_or_insert(e);
            }
        })
        .await;
    if let Some(e) = write_error {
        return Err(e.into());
    }
    shop.out.line(format_args!(
        "Order {} ({}) {} - {}",
        receipt.order_reference, receipt.mode, receipt.amount, receipt.status
    ))?;
    shop.finish(&store).await
}
