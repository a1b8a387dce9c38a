use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;

use ollamux::config::{ApiKeyTable, RouteTable, Settings};
use ollamux::util::{cors_config, init_tracing, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::parse();
    init_tracing(&settings.log_level);

    let routes = RouteTable::load_from_file(settings.models_path())?;
    let api_keys = ApiKeyTable::load_from_file(settings.keys_path())?;
    info!(
        models = routes.len(),
        api_keys = api_keys.len(),
        bind = %settings.bind,
        "starting ollamux"
    );

    let state = AppState::new(routes, api_keys);
    let cors_origins = settings.cors_origins.clone();
    let bind = settings.bind.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors_config(&cors_origins))
            .configure(ollamux::server::config_routes)
    })
    .bind(&bind)?
    .run()
    .await?;
    Ok(())
}
