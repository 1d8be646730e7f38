mod ai;
mod api;
mod app;
mod clock;
mod config;
mod db;
mod model;
mod pipelines;
mod schema;
mod scheduler;
mod snapshot_policy;
mod store;
mod upstream;
mod vector;

use app::AppState;
use config::Config;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("ARCHIVIST_CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
    let config = Config::load(&config_path).unwrap_or_else(|err| {
        eprintln!("failed to load config from {config_path}: {err}");
        std::process::exit(1);
    });

    app::enable_tracing(&config);

    let database_url = db::create_url(None).unwrap_or_else(|err| {
        eprintln!("failed to assemble database URL: {err}");
        std::process::exit(1);
    });
    let pool = db::build_pool(&database_url).expect("database connection pool must build");
    db::run_migrations(&pool).expect("database migrations must apply cleanly");

    let state = AppState::new(pool, config);

    println!("archivist running on {} threads", tokio::runtime::Handle::current().metrics().num_workers());

    if let Err(err) = app::run(state).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
