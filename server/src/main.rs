use std::env;

use axum::http::{header, HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use accessmap_stub::{app, StubState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let addr = env::var("STUB_ADDR").unwrap_or_else(|_| "127.0.0.1:8002".to_string());

    let mut router = app(StubState::new());
    if let Ok(client_url) = env::var("CLIENT_URL") {
        let cors = CorsLayer::new()
            .allow_origin(client_url.parse::<HeaderValue>()?)
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        router = router.layer(cors);
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("accessmap stub listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
