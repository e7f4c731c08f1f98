use crate::handlers;
use alert_bridge_core::CredentialStore;
use alert_bridge_kite::KiteClient;
use alert_bridge_pipeline::AlertDispatcher;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Broker login flow: the REST client that exchanges request tokens and the app secret.
pub struct LoginService {
    pub client: Arc<KiteClient>,
    pub api_secret: Option<SecretString>,
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AlertDispatcher>,
    pub credentials: Arc<CredentialStore>,
    pub login: Arc<LoginService>,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/chartlink", post(handlers::receive_alert))
            .route("/login", get(handlers::login_redirect))
            .route("/login/callback", get(handlers::login_callback))
            .route("/update-tpsl", post(handlers::update_trade_config))
            .route("/api/trade-config", get(handlers::list_trade_configs))
            .route("/api/monitors", get(handlers::list_monitors))
            .route(
                "/api/monitors/:id",
                get(handlers::get_monitor).delete(handlers::cancel_monitor),
            )
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Like [`serve`](Self::serve), returning once `shutdown` resolves and in-flight requests finish.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve_with_shutdown<F>(self, addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
