extern crate jemallocator;

// The use of jemalloc (http://jemalloc.net/) as the global allocator is actually QUITE
// important here. The glibc standard allocator cannot handle concurrency nearly as well,
// especially with regard to heap fragmentation.
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub mod admission;
pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod executor;
pub mod plugins;
pub mod registry;
pub mod routes;
pub mod submission;

use log::info;
use persistence::SubmissionStore;
use result::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate lazy_static;

async fn init_persistence() -> Result<Arc<dyn SubmissionStore>> {
    let cfg = config::get();
    match cfg.persistence_backend.as_str() {
        "etcd" => {
            let store = persistence::etcd::EtcdSubmissionStore::connect(&cfg.etcd_endpoints).await?;
            Ok(Arc::new(store))
        }
        "sqlite" => {
            let store = persistence::sqlite::SqliteSubmissionStore::submissions(&cfg.sqlite_path).await?;
            Ok(Arc::new(store))
        }
        backend => Err(persistence::UnknownBackend {
            backend: backend.to_string(),
        }
        .into()),
    }
}

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG_STYLE", "always");
    env_logger::init();

    config::load().expect("failed to load broker configuration");
    let cfg = config::get();

    let store = init_persistence().await.expect("failed to initialize the submission store");
    registry::init(store).await;

    plugins::seed(&cfg.plugins).await;

    cluster::init(
        PathBuf::from("/var/lib/chronos/clusters"),
        PathBuf::from(&cfg.current_context_path),
    )
    .await;

    registry::rehydrate().await.expect("failed to rehydrate submissions from the store");

    info!("chronos broker starting up");

    let mut c = rocket::Config::default();
    // If you leave it to the default then it will choose
    // 127.0.0.1 which will not be reachable whe running
    // in a container. So please leave this to 0.0.0.0.
    c.address = "0.0.0.0".parse().unwrap();
    rocket::custom(c)
        .mount("/v1", routes::api_routes())
        .mount("/", routes::ops_routes())
        .launch()
        .await
        .unwrap();
}
