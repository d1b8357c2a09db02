mod handlers;
pub mod responses;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::inbound::dispatcher::EventDispatcher;
use crate::inbound::replay_guard::ReplayGuard;
use crate::inbound::verification::VerificationEngine;
use crate::outbound::webhook::delivery_client::DeliveryClient;
use crate::server::handlers::health::health_check;
use crate::server::handlers::trigger::{trigger_event, trigger_sample};
use crate::server::handlers::webhook::receive_webhook;
use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Debug, Clone)]
/// The global application state shared between all request handlers.
pub(crate) struct AppState {
    pub engine: Arc<VerificationEngine>,
    pub dispatcher: Arc<EventDispatcher>,
    /// Absent when no outbound target is configured
    pub delivery: Option<Arc<DeliveryClient>>,
    pub replay_guard: Option<Arc<ReplayGuard>>,
}

pub struct Server {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<EventDispatcher>,
}

impl Server {
    /// Creates a new HTTP server with an empty handler registry.
    pub async fn new(config: &Config) -> Result<Self> {
        Self::with_dispatcher(config, Arc::new(config.event_dispatcher())).await
    }

    /// Creates a new HTTP server that routes verified webhooks to `dispatcher`.
    pub async fn with_dispatcher(config: &Config, dispatcher: Arc<EventDispatcher>) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

        let engine = config
            .verification_engine()
            .wrap_err("Invalid webhook secret")?;

        let delivery = config
            .delivery_config()
            .map(DeliveryClient::new)
            .transpose()
            .wrap_err("Invalid webhook delivery configuration")?;
        if delivery.is_none() {
            tracing::warn!("No webhook target configured, trigger routes are disabled");
        }

        let state = AppState {
            engine: Arc::new(engine),
            dispatcher: Arc::clone(&dispatcher),
            delivery: delivery.map(Arc::new),
            replay_guard: config.replay_guard().map(Arc::new),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/webhook", post(receive_webhook))
            .route("/trigger", post(trigger_sample))
            .route("/trigger/{event}", post(trigger_event))
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(state);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            router,
            listener,
            local_addr,
            dispatcher,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Registry that receives verified webhooks; register handlers before or after `run`.
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.local_addr);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
