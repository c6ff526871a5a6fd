use std::sync::Arc;

use blogweb::{
    backend::{memory::MemoryBackend, supabase::SupabaseClient, Services},
    config::{BackendConfig, Config},
    generate::Gemini,
    logging, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init();

    let http = reqwest::Client::new();
    let generator = Arc::new(Gemini::new(http.clone(), config.gemini.clone()));
    let services = match &config.backend {
        BackendConfig::Supabase { url, anon_key } => {
            tracing::info!(%url, "using hosted backend");
            Services::from_backend(Arc::new(SupabaseClient::new(http, url, anon_key)?), generator)
        }
        BackendConfig::Memory => {
            tracing::info!("using in-memory backend");
            Services::from_backend(MemoryBackend::new().connect(), generator)
        }
    };

    let app_state = AppState::new(services);
    if let Err(e) = app_state.session.load().await {
        tracing::warn!("could not restore session: {e}");
    }
    let _watcher = app_state.session.watch();

    let app = blogweb::app(app_state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
