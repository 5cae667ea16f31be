//! Hexagonal wiring with Portico.
//!
//! Run with `PORTICO_PROFILE=production cargo run --example hexagonal`
//! to swap the fake notifier for the email adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use portico::prelude::*;
use portico::{async_trait, logging};

// === Ports ===

trait Notifier: Send + Sync {
    fn send(&self, to: &str, msg: &str) -> String;
}

trait UserStore: Send + Sync {
    fn email_of(&self, id: u64) -> Option<String>;
}

// === Adapters ===

struct EmailNotifier;

impl Notifier for EmailNotifier {
    fn send(&self, to: &str, msg: &str) -> String {
        format!("email to {to}: {msg}")
    }
}

struct FakeNotifier;

impl Notifier for FakeNotifier {
    fn send(&self, to: &str, msg: &str) -> String {
        format!("[fake] {to} <- {msg}")
    }
}

struct Database {
    url: String,
    connected: AtomicBool,
}

#[async_trait]
impl Lifecycle for Database {
    async fn initialize(&self) -> std::result::Result<(), BoxError> {
        println!("connecting to {}", self.url);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self) -> std::result::Result<(), BoxError> {
        println!("closing {}", self.url);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct SqlUserStore {
    db: Arc<Database>,
}

impl UserStore for SqlUserStore {
    fn email_of(&self, id: u64) -> Option<String> {
        self.db
            .connected
            .load(Ordering::SeqCst)
            .then(|| format!("user{id}@example.com"))
    }
}

// === Application service ===

struct WelcomeService {
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn Notifier>,
}

impl WelcomeService {
    fn welcome(&self, id: u64) -> String {
        match self.users.email_of(id) {
            Some(email) => self.notifier.send(&email, "Welcome aboard"),
            None => format!("user {id} unavailable"),
        }
    }
}

/// One per request.
struct RequestId(u64);

fn container(profile: Profile) -> Result<Container> {
    Container::builder()
        .profile(profile)
        .instance(String::from("postgres://localhost/app"))
        .bind(
            Binding::<dyn Notifier, EmailNotifier>::new(|_| Ok(EmailNotifier), |n| n as Arc<dyn Notifier>)
                .profile(Profile::PRODUCTION),
        )
        .bind(
            Binding::<dyn Notifier, FakeNotifier>::new(|_| Ok(FakeNotifier), |n| n as Arc<dyn Notifier>)
                .profiles([Profile::TEST, Profile::DEVELOPMENT]),
        )
        .bind(
            Binding::service(|inj| {
                Ok(Database {
                    url: inj.get::<String>()?.to_string(),
                    connected: AtomicBool::new(false),
                })
            })
            .depends_on::<String>()
            .lifecycle(),
        )
        .bind(
            Binding::<dyn UserStore, SqlUserStore>::new(
                |inj| Ok(SqlUserStore { db: inj.get::<Database>()? }),
                |s| s as Arc<dyn UserStore>,
            )
            .depends_on::<Database>(),
        )
        .bind(
            Binding::service(|inj| {
                Ok(WelcomeService {
                    users: inj.get::<dyn UserStore>()?,
                    notifier: inj.get::<dyn Notifier>()?,
                })
            })
            .depends_on::<dyn UserStore>()
            .depends_on::<dyn Notifier>(),
        )
        .bind(
            Binding::service(|_| Ok(RequestId(rand_id())))
                .lifetime(Lifetime::Scoped),
        )
        .build()
}

fn rand_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> std::result::Result<(), BoxError> {
    logging::init("portico=debug");

    let profile = std::env::var("PORTICO_PROFILE")
        .map(Profile::new)
        .unwrap_or(Profile::DEVELOPMENT);
    let container = container(profile)?;
    println!("{}", container.diagnostics());

    container
        .run(|c| async move {
            let service = c.resolve::<WelcomeService>()?;
            println!("{}", service.welcome(7));

            let scope = c.create_scope();
            let request = scope.resolve::<RequestId>()?;
            println!("request #{}", request.0);
            scope.dispose().await?;

            Ok::<(), PorticoError>(())
        })
        .await??;

    Ok(())
}
