use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Result;
use crate::metrics::MetricsCollector;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

const LANDING_PAGE: &str = "<html>
<head><title>ClamReef Exporter</title></head>
<body>
<h1>ClamReef Exporter</h1>
<p><a href=\"/metrics\">Metrics</a></p>
</body>
</html>
";

pub fn router(collector: Arc<MetricsCollector>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .with_state(collector)
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn metrics(State(collector): State<Arc<MetricsCollector>>) -> Response {
    match collector.gather().await {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serves the exporter until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, collector: Arc<MetricsCollector>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Server is ready to handle requests at {}", listener.local_addr()?);

    axum::serve(listener, router(collector))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
