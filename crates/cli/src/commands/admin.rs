//! Back-office commands.
//!
//! # Environment Variables
//!
//! - `SHOPLANE_API_URL` - Store API base URL
//! - `SHOPLANE_ADMIN_TOKEN` - Admin bearer credential

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use rust_decimal::Decimal;
use shoplane_admin::customers::{CustomerFilter, filter_counts, filter_customers};
use shoplane_admin::inventory::{Inventory, ProductUpdate};
use shoplane_admin::ledger::Ledger;
use shoplane_admin::orders::{OrderQueue, OrderTab, invoice_number, render_invoice};
use shoplane_admin::products::{ProductDraft, available_sizes, parse_bulk};
use shoplane_admin::{AdminClient, AdminConfig, AdminError};
use shoplane_core::{Money, OrderId, OrderStatus, ProductId};

use super::{CliResult, Out};

#[derive(Subcommand)]
pub enum AdminCommand {
    /// List orders in a fulfilment tab
    Orders {
        /// `pending-labels`, `rtd`, `pending-handover`, `in-transit` or `completed`
        #[arg(short, long, default_value = "pending labels")]
        tab: OrderTab,
        /// Payment id or customer name
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Move an order forward in the pipeline
    Advance { order_id: String, status: OrderStatus },
    /// Print a tax invoice
    Invoice { order_id: String },
    /// List products with stock levels
    Inventory {
        #[arg(short, long, default_value = "")]
        search: String,
        /// Only products below the restock threshold
        #[arg(long)]
        low: bool,
        /// Only products with no stock
        #[arg(long, conflicts_with = "low")]
        out: bool,
    },
    /// Edit a listed product
    Update {
        product_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        mrp: Option<Decimal>,
        #[arg(long)]
        stock: Option<u32>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a product from the catalog
    Delete { product_id: String },
    /// List a new product
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        brand: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        mrp: Option<Decimal>,
        #[arg(long, default_value_t = 0)]
        stock: u32,
        #[arg(long)]
        section: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        sub_category: String,
        /// Comma-separated image URLs
        #[arg(long, default_value = "")]
        images: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_delimiter = ',')]
        sizes: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        colors: Vec<String>,
    },
    /// Import products from a CSV or JSON file
    Import {
        file: PathBuf,
        /// Parse and report without uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// List registered customers
    Customers {
        /// `all`, `today`, `week` or `older`
        #[arg(short, long, default_value = "all")]
        filter: CustomerFilter,
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Revenue summary
    Ledger,
}

pub async fn run(command: AdminCommand) -> CliResult {
    let config = AdminConfig::from_env()?;
    let client = AdminClient::from_config(&config);
    let mut out = Out::new();

    match command {
        AdminCommand::Orders { tab, search } => {
            let queue = OrderQueue::new(client.all_orders().await?);
            let counts: Vec<String> = OrderTab::ALL
                .iter()
                .map(|&t| format!("{} ({})", t.label(), queue.count(t)))
                .collect();
            out.line(counts.join(" | "))?;
            for order in queue.filter(tab, &search) {
                let recipient = order
                    .address
                    .as_ref()
                    .and_then(|a| a.recipient())
                    .unwrap_or("-");
                out.line(format_args!(
                    "{}  {}  {recipient}  {} unit(s)  {}",
                    order.id,
                    order.payment_reference().unwrap_or("-"),
                    order.unit_count(),
                    order.amount
                ))?;
            }
        }
        AdminCommand::Advance { order_id, status } => {
            let mut queue = OrderQueue::new(client.all_orders().await?);
            let order = queue
                .advance(&client, &OrderId::new(order_id), status)
                .await?;
            out.line(format_args!("Order {} is now {}", order.id, order.status))?;
        }
        AdminCommand::Invoice { order_id } => {
            let queue = OrderQueue::new(client.all_orders().await?);
            let id = OrderId::new(order_id);
            let order = queue
                .get(&id)
                .ok_or_else(|| AdminError::NotFound(format!("order {id}")))?;
            tracing::debug!(invoice = %invoice_number(order), "rendering invoice");
            out.line(render_invoice(order, Utc::now()))?;
        }
        AdminCommand::Inventory { search, low, out: sold_out } => {
            let inventory = Inventory::load(&client).await?;
            let products = if low {
                inventory.low_stock()
            } else if sold_out {
                inventory.out_of_stock()
            } else {
                inventory.search(&search)
            };
            for product in products {
                let stock = product
                    .stock
                    .map_or_else(|| "-".to_string(), |n| n.to_string());
                out.line(format_args!(
                    "{}  {:<30}  {:>6}  {}",
                    product.id, product.name, stock, product.price
                ))?;
            }
        }
        AdminCommand::Update {
            product_id,
            name,
            price,
            mrp,
            stock,
            description,
        } => {
            let mut inventory = Inventory::load(&client).await?;
            let update = ProductUpdate {
                name,
                brand: None,
                price: price.map(Money::new),
                original_price: mrp.map(Money::new),
                stock,
                description,
            };
            let product = inventory
                .update(&client, &ProductId::new(product_id), update)
                .await?;
            out.line(format_args!("Updated {} ({})", product.name, product.id))?;
        }
        AdminCommand::Delete { product_id } => {
            let mut inventory = Inventory::load(&client).await?;
            inventory
                .delete(&client, &ProductId::new(product_id.clone()))
                .await?;
            out.line(format_args!("Deleted {product_id}"))?;
        }
        AdminCommand::Add {
            name,
            brand,
            price,
            mrp,
            stock,
            section,
            category,
            sub_category,
            images,
            description,
            sizes,
            colors,
        } => {
            let offered = available_sizes(&section, &category, &sub_category);
            let mut draft = ProductDraft {
                brand,
                name,
                price: Some(Money::new(price)),
                original_price: mrp.map(Money::new),
                stock,
                section,
                category,
                sub_category,
                image_urls: images,
                description,
                ..ProductDraft::default()
            };
            for size in &sizes {
                draft.toggle_size(size);
            }
            for color in &colors {
                draft.add_color(color);
            }
            let product = draft.into_product().map_err(|e| {
                if offered.is_empty() {
                    e
                } else {
                    AdminError::BadRequest(format!("{e} (options: {})", offered.join(", ")))
                }
            })?;
            client.add_product(&product).await?;
            out.line(format_args!("Listed {}", product.name))?;
        }
        AdminCommand::Import { file, dry_run } => {
            let text = std::fs::read_to_string(&file)?;
            let products = parse_bulk(&text).map_err(AdminError::from)?;
            out.line(format_args!("Parsed {} product(s)", products.len()))?;
            if !dry_run {
                let added = client.bulk_add(&products).await?;
                out.line(format_args!("Imported {added} product(s)"))?;
            }
        }
        AdminCommand::Customers { filter, search } => {
            let customers = client.all_customers().await?;
            let now = Utc::now();
            let counts: Vec<String> = filter_counts(&customers, now)
                .into_iter()
                .map(|(f, n)| format!("{} ({n})", f.label()))
                .collect();
            out.line(counts.join(" | "))?;
            for customer in filter_customers(&customers, filter, &search, now) {
                let joined = customer
                    .created_at
                    .map_or_else(|| "-".to_string(), |at| at.format("%d %b %Y").to_string());
                out.line(format_args!(
                    "{}  {}  <{}>  {joined}",
                    customer.id,
                    customer.name,
                    customer.email.as_str()
                ))?;
            }
        }
        AdminCommand::Ledger => {
            let ledger = Ledger::from_orders(&client.all_orders().await?);
            out.line(format_args!(
                "Bank balance   {}  ({} orders)",
                ledger.bank_balance, ledger.settled_orders
            ))?;
            out.line(format_args!(
                "Expected cash  {}  ({} COD orders)",
                ledger.expected_cash, ledger.pending_cod_orders
            ))?;
            out.line(format_args!("Total revenue  {}", ledger.total_revenue()))?;
        }
    }
    Ok(())
}
