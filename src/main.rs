use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use buedi::config::BuediConfig;
use buedi::models::{Credentials, NewUser, Notification, NotificationKind, ProfileUpdate, UserType};
use buedi::routes::{GuardDecision, RouteRequirement, guard, landing_route};
use buedi::services::feed::{SimulatedPush, spawn_notification_poller};
use buedi::services::identity::MockIdentity;
use buedi::services::toast::{Toast, Toaster};
use buedi::state::notifications::NotificationStore;
use buedi::state::session::SessionStore;
use buedi::storage::FileStore;
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("nothing to update; pass at least one profile field")]
    EmptyUpdate,
}

#[derive(Parser, Debug)]
#[command(name = "buedi", about = "BUEDI session and notification CLI")]
struct Cli {
    /// File holding the persisted session keys.
    #[arg(long, env = "BUEDI_STORAGE_PATH")]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        email: String,
        #[arg(long, env = "BUEDI_PASSWORD")]
        password: String,
    },
    /// Create an account and sign in. Accounts live only for this process.
    Register {
        email: String,
        #[arg(long, env = "BUEDI_PASSWORD")]
        password: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long = "type", default_value = "individual")]
        user_type: UserType,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    Logout,
    /// Print the signed-in user.
    Whoami,
    /// Edit the signed-in user's profile.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Exchange the refresh token for a new token pair.
    Refresh,
    /// Check a permission on the signed-in user.
    Can { permission: String },
    /// Run the route guard for a page kind.
    Visit {
        #[arg(value_enum)]
        route: RouteKind,
    },
    /// Watch simulated notifications for a few ticks.
    Notifications {
        #[arg(long, default_value_t = 3)]
        ticks: u32,
        /// Tick period override in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RouteKind {
    Any,
    Professional,
    Admin,
}

impl From<RouteKind> for RouteRequirement {
    fn from(kind: RouteKind) -> Self {
        match kind {
            RouteKind::Any => RouteRequirement::AUTHENTICATED,
            RouteKind::Professional => RouteRequirement::PROFESSIONAL,
            RouteKind::Admin => RouteRequirement::ADMIN,
        }
    }
}

/// Prints toasts to the terminal.
struct ConsoleToaster;

impl Toaster for ConsoleToaster {
    fn show(&self, toast: Toast) {
        let label = kind_label(toast.kind);
        match toast.code {
            Some(code) => println!("[{label}] {} ({code})", toast.message),
            None => println!("[{label}] {}", toast.message),
        }
    }
}

fn kind_label(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Info => "info",
        NotificationKind::Success => "ok",
        NotificationKind::Warning => "attention",
        NotificationKind::Error => "erreur",
    }
}

/// Poll period for the `notifications` command. Never zero.
fn tick_period(interval_ms: Option<u64>, default: Duration) -> Duration {
    interval_ms
        .map_or(default, Duration::from_millis)
        .max(Duration::from_millis(1))
}

/// How long to watch: `ticks` periods plus half a period of slack.
fn watch_window(every: Duration, ticks: u32) -> Duration {
    every.saturating_mul(ticks).saturating_add(every / 2)
}

fn count_unread(items: &[Notification]) -> usize {
    items.iter().filter(|n| !n.read).count()
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, CliError> {
    let mut config = BuediConfig::from_env();
    if let Some(path) = cli.storage {
        config.storage_path = path;
    }

    let storage = Arc::new(FileStore::new(config.storage_path.clone()));
    tracing::debug!(path = %storage.path().display(), "using session file");
    let store = SessionStore::new(
        Arc::new(MockIdentity::seeded(config.mock_latency)),
        storage,
        Arc::new(ConsoleToaster),
    );
    let phase = store.initialize().await;
    tracing::debug!(?phase, "session initialized");

    match cli.command {
        Command::Login { email, password } => {
            let ok = store.login(Credentials::new(email, password)).await;
            if let Some(user) = store.current_user().filter(|_| ok) {
                println!("redirect: {}", landing_route(user.user_type));
            }
            Ok(ok)
        }
        Command::Register { email, password, name, user_type, phone, location } => {
            let ok = store
                .register(NewUser { email, password, name, user_type, phone, location })
                .await;
            if let Some(user) = store.current_user().filter(|_| ok) {
                println!("redirect: {}", landing_route(user.user_type));
            }
            Ok(ok)
        }
        Command::Logout => Ok(store.logout().await),
        Command::Whoami => match store.current_user() {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
                Ok(true)
            }
            None => {
                println!("not signed in");
                Ok(false)
            }
        },
        Command::Profile { name, email, avatar, phone, location } => {
            let update = ProfileUpdate { name, email, avatar, phone, location };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            Ok(store.update_profile(update).await)
        }
        Command::Refresh => Ok(store.refresh_session().await),
        Command::Can { permission } => {
            let allowed = store.has_permission(&permission);
            println!("{permission}: {}", if allowed { "yes" } else { "no" });
            Ok(allowed)
        }
        Command::Visit { route } => match guard(&store, route.into()) {
            GuardDecision::Render => {
                println!("render");
                Ok(true)
            }
            GuardDecision::Pending => {
                println!("loading");
                Ok(false)
            }
            GuardDecision::Redirect(target) => {
                println!("redirect: {target}");
                Ok(false)
            }
        },
        Command::Notifications { ticks, interval_ms } => {
            let every = tick_period(interval_ms, config.notification_interval);
            let notifications = Arc::new(NotificationStore::new());
            let poller = spawn_notification_poller(
                notifications.clone(),
                Arc::new(SimulatedPush::new(config.notification_push_probability)),
                every,
            );
            tokio::time::sleep(watch_window(every, ticks)).await;
            poller.stop();

            let items = match store.current_user() {
                Some(user) => notifications.for_user(user.id),
                None => notifications.snapshot().items,
            };
            for n in &items {
                let link = n.link.as_deref().unwrap_or("-");
                println!("[{}] {}: {} ({link})", kind_label(n.kind), n.title, n.message);
            }
            println!("{} notification(s), {} unread", items.len(), count_unread(&items));
            Ok(true)
        }
    }
}
