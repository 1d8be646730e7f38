use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub type Connection = PooledConnection<ConnectionManager<PgConnection>>;
pub type ConnectionPool = Pool<ConnectionManager<PgConnection>>;
pub type ConnectionResult = Result<Connection, PoolError>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Builds a connection pool, sized to the number of async worker threads so
/// that a burst of concurrent pipeline runs and HTTP requests can't starve
/// each other for a connection.
pub fn build_pool(database_url: &str) -> Result<ConnectionPool, diesel::r2d2::PoolError> {
    let num_threads = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_workers())
        .unwrap_or(1);
    let manager = ConnectionManager::new(database_url);
    Pool::builder()
        .max_size(num_threads.max(4) as u32)
        .test_on_check_out(true)
        .build(manager)
}

/// Runs embedded migrations against `pool`. Meant to run once at startup.
pub fn run_migrations(pool: &ConnectionPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Assembles a Postgres connection string from environment variables, with
/// `database_override` replacing `POSTGRES_DB` (used by tests to point at a
/// disposable database alongside the real one).
pub fn create_url(database_override: Option<&str>) -> Result<String, std::env::VarError> {
    let user = std::env::var("POSTGRES_USER")?;
    let password = std::env::var("POSTGRES_PASSWORD")?;
    let database = match database_override {
        Some(db) => db.to_owned(),
        None => std::env::var("POSTGRES_DB")?,
    };
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_owned());
    Ok(format!("postgres://{user}:{password}@{host}/{database}"))
}

/// Shared harness for integration tests that need a real (disposable)
/// database, used by `store`, `pipelines::discovery`, and `api`'s test
/// modules so each doesn't reinvent the connection/migration dance.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use diesel::RunQueryDsl;

    /// Builds and migrates a pool against the `archivist_test` database.
    /// Requires the same `POSTGRES_*` env vars the production binary reads.
    pub fn test_pool() -> ConnectionPool {
        let database_url = create_url(Some("archivist_test")).expect("POSTGRES_* env vars must be set for tests");
        let pool = build_pool(&database_url).expect("test connection pool must build");
        run_migrations(&pool).expect("test migrations must apply cleanly");
        pool
    }

    /// Clears every table so tests don't see rows left behind by earlier
    /// runs. Tests that use this still need `#[serial]` since they share one
    /// database.
    pub fn truncate_all(pool: &ConnectionPool) {
        let mut conn = pool.get().expect("pool must yield a connection");
        diesel::sql_query(
            "TRUNCATE TABLE item, snapshot, state, usage_counter, error_log, worker_metrics, analytics_cache RESTART IDENTITY CASCADE",
        )
        .execute(&mut conn)
        .expect("truncate must succeed");
    }
}
