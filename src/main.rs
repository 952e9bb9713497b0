mod auth;
mod config;
mod constants;
mod error;
mod events;
mod health;
mod logging;
mod proxy;
mod router;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use clap::Parser;
use tower::ServiceExt;
use tracing::info;

use auth::AuthPlane;
use config::ConfigStore;
use config::snapshot::{ConfigSnapshot, Observer};
use constants::{BUILD_TIME, GIT_HASH, SWEEP_INTERVAL_SECS, VERSION};
use events::Hub;
use health::Monitor;
use state::AppShared;

#[derive(Parser)]
#[command(name = "muximux-portal")]
#[command(about = "Self-hosted application portal: per-app embedding reverse proxy plus a live-configuration authentication and routing plane")]
struct Args {
    /// Override the configured listen address (also settable via MUXIMUX_LISTEN).
    #[arg(short = 'l', long, env = "MUXIMUX_LISTEN")]
    listen: Option<String>,
}

/// Holds the router built from whichever config snapshot is current,
/// swapped atomically on every commit (spec.md §4.B "rebuild is O(apps)
/// and must not block in-flight requests"). The listener itself never
/// rebuilds: [`dispatch`] just forwards each request into whatever inner
/// router happens to be loaded when the request arrives, so a request that
/// started under the old table finishes against it, satisfying the
/// "old-or-new, never a blend" ordering guarantee of spec.md §5/§8.
struct RouterStore {
    current: ArcSwap<Router>,
    shared: Arc<AppShared>,
}

impl RouterStore {
    fn new(snapshot: ConfigSnapshot, shared: Arc<AppShared>) -> Arc<Self> {
        let built = router::build_router(snapshot, shared.clone());
        Arc::new(Self {
            current: ArcSwap::from_pointee(built),
            shared,
        })
    }

    fn current(&self) -> Arc<Router> {
        self.current.load_full()
    }
}

impl Observer for RouterStore {
    fn on_config_change(&self, snapshot: &ConfigSnapshot) {
        let built = router::build_router(snapshot.clone(), self.shared.clone());
        self.current.store(Arc::new(built));
    }
}

async fn dispatch(State(store): State<Arc<RouterStore>>, req: Request) -> Response {
    let router = store.current();
    match (*router).clone().oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Background loop sweeping expired sessions and OIDC pending states every
/// [`SWEEP_INTERVAL_SECS`] (spec.md §5 "Session store... >=5-minute sweep").
/// Logs and continues on error per spec.md §7 ("Background loops... never
/// terminate the process"), though `sweep_expired` itself is infallible.
async fn run_sweep_loop(auth: Arc<AuthPlane>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        auth.sweep_expired().await;
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Some(listen) = &args.listen {
        // SAFETY: single-threaded at this point, before any other code reads env.
        unsafe { std::env::set_var("MUXIMUX_LISTEN", listen) };
    }

    let hub = Arc::new(Hub::new());
    logging::init(hub.clone());

    let config_path = config::loader::config_path();
    let config = match ConfigStore::load(config_path).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "refusing to start: configuration invalid");
            std::process::exit(1);
        }
    };

    let snapshot = config.current();
    let listen_addr = snapshot.listen_addr.clone();

    let auth = Arc::new(AuthPlane::new(&snapshot));
    let monitor = Arc::new(Monitor::new(hub.clone()));
    let shared = Arc::new(AppShared::new(config.clone(), auth.clone(), monitor.clone(), hub.clone()));
    let router_store = RouterStore::new(snapshot.clone(), shared.clone());

    // Every commit notifies these three in turn: the auth plane's derived
    // snapshot, the event bus (which broadcasts `config_updated`), and the
    // router table. Order doesn't matter — each observer is independently
    // idempotent per spec.md §4.A.
    config.register(auth.clone());
    config.register(hub.clone());
    config.register(router_store.clone());

    // The sender half is never used to send (the admin API's manual-check
    // endpoint calls `Monitor::tick` directly instead) but must be kept
    // alive for the lifetime of the process: `Monitor::run`'s select loop
    // reads a closed channel as a shutdown signal, so dropping it here
    // would stop the periodic probe after its very first tick.
    let _manual_trigger_tx = {
        let monitor = monitor.clone();
        let config = config.clone();
        let interval = health::default_interval_secs(snapshot.health.default_interval_secs);
        let (manual_trigger_tx, manual_trigger_rx) = tokio::sync::mpsc::channel(1);
        tokio::spawn(async move {
            monitor.run(config, interval, manual_trigger_rx).await;
        });
        manual_trigger_tx
    };
    tokio::spawn(run_sweep_loop(auth.clone()));

    let outer = Router::new().fallback(dispatch).with_state(router_store);

    let addr: SocketAddr = listen_addr
        .parse()
        .unwrap_or_else(|err| panic!("invalid listen_addr '{listen_addr}': {err}"));
    info!("muximux-portal v{VERSION}-{GIT_HASH} (built {BUILD_TIME})");
    info!("listening on http://{addr}{}", snapshot.base_path);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));
    axum::serve(listener, outer.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap_or_else(|err| panic!("server exited: {err}"));
}
