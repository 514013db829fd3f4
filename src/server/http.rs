//! Connection loop and application state

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::CredentialStore;
use crate::config::Config;
use crate::error::Result;
use crate::ledger::HistoryLedger;
use crate::model::ModelCache;
use crate::report::ReportGenerator;
use crate::routes;
use crate::session::SessionStore;

/// Shared state for all request handlers
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialStore,
    pub ledger: HistoryLedger,
    /// Trained once, on the first prediction or explicit reload
    pub models: ModelCache,
    pub reports: ReportGenerator,
    pub sessions: SessionStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            credentials: CredentialStore::new(config.users_path(), config.auth.password_scheme),
            ledger: HistoryLedger::new(config.history_path()),
            models: ModelCache::new(&config.dataset_path, config.model.clone()),
            reports: ReportGenerator::new(config.reports_path()),
            sessions: SessionStore::with_ttl_secs(config.auth.session_ttl_secs),
            started_at: Instant::now(),
            config,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.config.listen).await?;

    info!(
        addr = %state.config.listen,
        data_dir = %state.config.data_dir.display(),
        dataset = %state.config.dataset_path.display(),
        "insurance-predictor listening"
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(routes::handle_request(req, state).await) }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}
