use crate::models::chat::ChatMessage;
use crate::relay::Relay;
use std::error::Error;
use std::net::SocketAddr;
use axum::{
    body::Body,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{ Html, IntoResponse },
    routing::{ get, post },
    Json,
    Router,
};
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, info };

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
struct AppState {
    relay: Relay,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub fn router(relay: Relay) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .with_state(AppState { relay })
}

pub async fn start_http_server(
    addr: SocketAddr,
    relay: Relay,
    tls: Option<TlsPaths>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = router(relay);

    match tls {
        Some(paths) => {
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                paths.cert_path,
                paths.key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &paths.cert_path,
                &paths.key_path
            ).await?;

            info!("Relay listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        }
        None => {
            let listener = tokio::net::TcpListener
                ::bind(addr).await
                .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
            info!("Relay listening on: http://{}", listener.local_addr()?);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(messages): Json<Vec<ChatMessage>>
) -> impl IntoResponse {
    debug!("Chat request with {} messages", messages.len());
    let body = Body::from_stream(state.relay.stream(messages));
    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}
