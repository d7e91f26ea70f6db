//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, body limit, timeout)
//! - Apply rate limiting to the proxy route only
//! - Serve portal static files as the fallback
//! - Run background maintenance (rate-limit purge, session sweep)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{any, get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::{portal, proxy, remote};
use crate::lifecycle::Shutdown;
use crate::remote::{BrowserDriver, SessionError, SessionManager, WebDriverBrowser};
use crate::security::allowlist::Allowlist;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::upstream::Dispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub allowlist: Arc<Allowlist>,
    pub limiter: Arc<RateLimiter>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Option<Arc<SessionManager>>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to set up remote browser: {0}")]
    RemoteBrowser(#[from] SessionError),
}

/// HTTP server for the embedding proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server; remote-browser mode, when enabled, talks to the
    /// configured WebDriver endpoint.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let driver: Option<Arc<dyn BrowserDriver>> = if config.remote_browser.enabled {
            Some(Arc::new(WebDriverBrowser::new(
                &config.remote_browser.webdriver_url,
                Duration::from_secs(config.upstream.timeout_secs),
            )?))
        } else {
            None
        };
        Self::build(config, driver)
    }

    /// Create a server with a caller-supplied browser driver. Remote-browser
    /// routes are enabled regardless of configuration.
    pub fn with_browser_driver(config: ProxyConfig, driver: Arc<dyn BrowserDriver>) -> Result<Self, ServerError> {
        Self::build(config, Some(driver))
    }

    fn build(config: ProxyConfig, driver: Option<Arc<dyn BrowserDriver>>) -> Result<Self, ServerError> {
        let allowlist = Arc::new(Allowlist::from_config(&config));
        let dispatcher = Arc::new(Dispatcher::new(&config.upstream, allowlist.clone())?);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let sessions = driver.map(|d| Arc::new(SessionManager::new(d, &config.remote_browser)));

        let state = AppState {
            config: Arc::new(config),
            allowlist,
            limiter,
            dispatcher,
            sessions,
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = &state.config;

        let proxy_routes = Router::new()
            .route(&config.portal.proxy_path, any(proxy::proxy_handler))
            .route_layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                rate_limit_middleware,
            ));

        let api_routes = Router::new()
            .route("/api/config", get(portal::config_handler))
            .route("/health", get(portal::health_handler))
            .route("/api/session", post(remote::start_session))
            .route(
                "/api/session/{id}",
                get(remote::session_status).delete(remote::stop_session),
            )
            .route("/api/session/{id}/frame", get(remote::session_frame))
            .route("/api/session/{id}/action", post(remote::session_action));

        let mut router = proxy_routes.merge(api_routes);
        if let Some(dir) = &config.portal.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        // Outer guard only; the dispatcher enforces the upstream deadlines.
        let request_timeout = Duration::from_secs(
            config.upstream.timeout_secs * 2 + config.upstream.connect_timeout_secs,
        );
        let max_body_size = config.security.max_body_size;

        router
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
            .with_state(state)
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            proxy_path = %self.state.config.portal.proxy_path,
            redirect_mode = ?self.state.dispatcher.redirect_mode(),
            remote_browser = self.state.sessions.is_some(),
            "HTTP server starting"
        );

        if self.state.limiter.is_enabled() {
            let interval = Duration::from_secs(self.state.config.rate_limit.cleanup_interval_secs);
            tokio::spawn(self.state.limiter.clone().run_purge(interval, shutdown.subscribe()));
        }

        if let Some(sessions) = &self.state.sessions {
            let interval = Duration::from_secs(self.state.config.remote_browser.sweep_interval_secs);
            tokio::spawn(sessions.clone().run_sweeper(interval, shutdown.subscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared state, for inspection.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(ProxyConfig::default()).unwrap()
    }

    async fn call(server: &HttpServer, uri: &str) -> axum::response::Response {
        server
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = call(&server(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_proxy_route_requires_url() {
        let response = call(&server(), "/api/proxy").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_custom_proxy_path() {
        let mut config = ProxyConfig::default();
        config.portal.proxy_path = "/p".into();
        let server = HttpServer::new(config).unwrap();

        assert_eq!(call(&server, "/p").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(call(&server, "/api/proxy").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sessions_disabled_by_default() {
        let server = server();
        assert!(server.state().sessions.is_none());
        assert_eq!(call(&server, "/api/session/abc").await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
