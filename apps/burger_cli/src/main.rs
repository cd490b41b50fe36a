use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    feed::BOARD_LIMIT,
    routing::{apply, guard, plan, Location, MemoryNavigator, Navigator},
    ClientStores, Credentials, HttpBurgerApi, Lookup,
};
use shared::{
    domain::{IngredientCategory, IngredientId, OrderNumber, OrderStatus},
    protocol::{LoginRequest, Order, ProfileUpdate, RegisterRequest},
};
use storage::{MemoryStore, Storage};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "burger", about = "Browse, assemble and order burgers")]
struct Cli {
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    Bun,
    Main,
    Sauce,
}

impl From<CategoryArg> for IngredientCategory {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Bun => Self::Bun,
            CategoryArg::Main => Self::Main,
            CategoryArg::Sauce => Self::Sauce,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog ingredients.
    Catalog {
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
    /// Show the global order feed.
    Feed,
    /// List the signed-in user's orders.
    Orders,
    /// Show one order with its priced ingredients.
    Show { number: u64 },
    /// Assemble a burger from ingredient ids and place it.
    Order {
        #[arg(required = true)]
        ingredients: Vec<String>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the profile, or update the given fields.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    ResetPassword {
        #[arg(long)]
        password: String,
        #[arg(long)]
        code: String,
    },
    /// Resolve a path through the route guards.
    Route {
        path: String,
        /// Page the path was opened from, for overlay details.
        #[arg(long)]
        background: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings()?;
    if let Some(v) = cli.api_url {
        settings.api_url = v;
    }
    if let Some(v) = cli.data_dir {
        settings.data_dir = v;
    }
    if let Some(v) = cli.timeout_secs {
        settings.request_timeout_secs = v;
    }

    let storage = open_storage(&settings.database_url()).await?;
    let credentials = Arc::new(Credentials::new(
        Arc::new(MemoryStore::new()),
        Arc::new(storage),
    ));
    let api = HttpBurgerApi::with_timeout(
        &settings.api_url,
        Arc::clone(&credentials),
        settings.request_timeout(),
    )?;
    let stores = ClientStores::new(Arc::new(api), credentials);
    stores.bootstrap().await;

    run(&stores, cli.command).await
}

async fn run(stores: &ClientStores, command: Command) -> Result<()> {
    match command {
        Command::Catalog { category } => {
            let catalog = stores.catalog.snapshot().await;
            if let Some(error) = &catalog.request.error {
                bail!("catalog unavailable: {error}");
            }
            let ingredients = match category {
                Some(category) => catalog.by_category(category.into()),
                None => catalog.ingredients.clone(),
            };
            for ingredient in ingredients {
                println!(
                    "{:<26} {:>6}  {:<5} {}",
                    ingredient.id,
                    ingredient.price,
                    category_label(ingredient.category),
                    ingredient.name
                );
            }
        }
        Command::Feed => {
            stores.feed.load_feed().await?;
            let feed = stores.feed.feed().await;
            println!("total: {}  today: {}", feed.total, feed.total_today);
            println!("ready:       {}", numbers(&feed.ready_numbers(BOARD_LIMIT)));
            println!("in progress: {}", numbers(&feed.pending_numbers(BOARD_LIMIT)));
            for order in &feed.orders {
                print_order(order);
            }
        }
        Command::Orders => {
            require_session(stores).await?;
            stores.feed.load_user_orders().await?;
            for order in &stores.feed.user_orders().await.orders {
                print_order(order);
            }
        }
        Command::Show { number } => match stores.feed.lookup_by_number(OrderNumber(number)).await {
            Lookup::Found(order) => {
                print_order(&order);
                match stores.catalog.price_order(&order).await {
                    Lookup::Found(breakdown) => {
                        for line in &breakdown.lines {
                            println!(
                                "  {} x {:<30} {:>6}",
                                line.count,
                                line.ingredient.name,
                                line.subtotal()
                            );
                        }
                        for id in &breakdown.missing {
                            println!("  ? {id}");
                        }
                        println!("  total {}", breakdown.total_price);
                    }
                    Lookup::Failed(error) => warn!("catalog unavailable: {error}"),
                    Lookup::Loading | Lookup::NotFound => {}
                }
            }
            Lookup::NotFound => bail!("order #{number} not found"),
            Lookup::Failed(error) => bail!("order #{number} unavailable: {error}"),
            Lookup::Loading => bail!("order #{number} is still loading"),
        },
        Command::Order { ingredients } => {
            for raw in ingredients {
                let id = IngredientId::new(raw);
                match stores.catalog.lookup(&id).await {
                    Lookup::Found(ingredient) => {
                        stores.construction.add_ingredient(ingredient).await;
                    }
                    Lookup::NotFound => bail!("unknown ingredient {id}"),
                    Lookup::Failed(error) => bail!("catalog unavailable: {error}"),
                    Lookup::Loading => bail!("catalog is still loading"),
                }
            }
            println!("total price: {}", stores.construction.total_price().await);
            let order = stores.checkout().await?;
            println!("order #{} placed: {}", order.number, order.name);
        }
        Command::Login { email, password } => {
            let user = stores
                .session
                .login(LoginRequest { email, password })
                .await?;
            println!("signed in as {}", user.name);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let user = stores
                .session
                .register(RegisterRequest {
                    name,
                    email,
                    password,
                })
                .await?;
            println!("registered {}", user.name);
        }
        Command::Logout => {
            if let Err(err) = stores.session.logout().await {
                warn!("server logout failed, local session cleared: {err}");
            }
            println!("signed out");
        }
        Command::Profile {
            name,
            email,
            password,
        } => {
            require_session(stores).await?;
            let update = ProfileUpdate {
                name,
                email,
                password,
            };
            let user = if update.is_empty() {
                stores.session.snapshot().await.user
            } else {
                Some(stores.session.update_profile(update).await?)
            };
            if let Some(user) = user {
                println!("{} <{}>", user.name, user.email);
            }
        }
        Command::ForgotPassword { email } => {
            stores.session.request_password_reset(&email).await?;
            println!("reset code sent; continue with reset-password");
        }
        Command::ResetPassword { password, code } => {
            let location = Location::new("/reset-password");
            let navigator = MemoryNavigator::new(location.clone());
            let session = stores.session.snapshot().await;
            if !apply(&navigator, guard(&location.route(), &session, &location)) {
                bail!("request a reset code first (forgot-password)");
            }
            stores.session.reset_password(&password, &code).await?;
            println!("password changed");
        }
        Command::Route { path, background } => {
            let mut location = Location::new(path);
            if let Some(background) = background {
                location = location.with_background(Location::new(background));
            }
            let navigator = MemoryNavigator::new(location.clone());
            let session = stores.session.snapshot().await;
            let decision = guard(&location.route(), &session, &location);
            if apply(&navigator, decision) {
                let view = plan(&navigator.current());
                println!("page: {}", view.page.pathname);
                if let Some(overlay) = view.overlay {
                    println!("overlay: {}", overlay.path());
                }
            } else {
                println!("redirect: {}", navigator.current().pathname);
            }
        }
    }
    Ok(())
}

async fn open_storage(database_url: &str) -> Result<Storage> {
    let storage = Storage::new(database_url).await?;
    storage.health_check().await?;
    let purged = storage.purge_expired().await?;
    if purged > 0 {
        debug!(purged, "storage: dropped expired entries");
    }
    Ok(storage)
}

async fn require_session(stores: &ClientStores) -> Result<()> {
    if !stores.session.snapshot().await.is_authenticated {
        bail!("sign in first (burger login --email ... --password ...)");
    }
    Ok(())
}

fn print_order(order: &Order) {
    println!(
        "#{:<7} {:<10} {}",
        order.number,
        status_label(&order.status),
        order.name
    );
}

fn numbers(numbers: &[OrderNumber]) -> String {
    numbers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn category_label(category: IngredientCategory) -> &'static str {
    match category {
        IngredientCategory::Bun => "bun",
        IngredientCategory::Main => "main",
        IngredientCategory::Sauce => "sauce",
    }
}

fn status_label(status: &OrderStatus) -> &str {
    match status {
        OrderStatus::Created => "created",
        OrderStatus::Pending => "cooking",
        OrderStatus::Done => "ready",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Other(other) => other,
    }
}
