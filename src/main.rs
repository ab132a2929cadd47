//! Gateway binary — wire everything together and serve.
//!
//! Startup order: environment → logging → agents config → registry → task
//! store → pool warm-up → HTTP server. Every configuration problem exits
//! non-zero before the listener binds.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cognigy_a2a_gateway::config::{self, Settings, TaskStoreKind, TransportKind};
use cognigy_a2a_gateway::executor::FlowExecutor;
use cognigy_a2a_gateway::pool::ConnectionPool;
use cognigy_a2a_gateway::registry::AgentRegistry;
use cognigy_a2a_gateway::server::{
    gateway_router, AgentExecutor, InMemoryTaskStore, RedisTaskStore, RequestHandler, TaskStore,
};
use cognigy_a2a_gateway::sessions::TaskSessionRegistry;
use cognigy_a2a_gateway::upstream::{FlowAdapter, RestAdapter, SocketAdapter, SocketConnector};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(config_error) => {
            eprintln!("configuration error: {}", config_error);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&settings);
    info!(
        environment = %settings.environment,
        port = settings.port,
        "starting cognigy-a2a-gateway"
    );

    let descriptors = match config::load_agents(&settings.config_path) {
        Ok(descriptors) => descriptors,
        Err(config_error) => {
            error!(%config_error, path = %settings.config_path, "failed to load agents config");
            return ExitCode::FAILURE;
        }
    };

    let registry = match AgentRegistry::new(descriptors, &settings.public_url) {
        Ok(registry) => Arc::new(registry),
        Err(config_error) => {
            error!(%config_error, "invalid agent configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(agents = registry.len(), "agents registered");

    let store: Arc<dyn TaskStore> = match settings.task_store {
        TaskStoreKind::Memory => Arc::new(InMemoryTaskStore::new()),
        TaskStoreKind::Redis => {
            let Some(url) = settings.task_store_url.as_deref() else {
                error!("TASK_STORE_URL is required when TASK_STORE=redis");
                return ExitCode::FAILURE;
            };
            match RedisTaskStore::connect(url, &settings.task_store_prefix, settings.task_store_ttl)
                .await
            {
                Ok(store) => {
                    info!("connected to redis task store");
                    Arc::new(store)
                }
                Err(store_error) => {
                    error!(%store_error, "failed to connect to redis task store");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let sessions = Arc::new(TaskSessionRegistry::new());
    let pool = Arc::new(ConnectionPool::new(Arc::new(SocketConnector)));

    let mut executors: HashMap<String, Arc<dyn AgentExecutor>> = HashMap::new();
    for descriptor in registry.descriptors() {
        let adapter: Arc<dyn FlowAdapter> = match descriptor.transport {
            TransportKind::Rest => Arc::new(RestAdapter::for_agent(descriptor)),
            TransportKind::Socket => Arc::new(SocketAdapter::for_agent(descriptor)),
        };
        executors.insert(
            descriptor.id.clone(),
            Arc::new(FlowExecutor::new(
                descriptor.clone(),
                adapter,
                Arc::clone(&sessions),
            )),
        );
    }

    // Warm the pool for socket agents. Failures are not fatal: the pool
    // recovers on its own or marks the entry dead.
    for descriptor in registry.descriptors() {
        if descriptor.transport == TransportKind::Socket {
            if let Err(pool_error) = pool.get_or_create(descriptor).await {
                warn!(agent_id = %descriptor.id, %pool_error, "pool warm-up failed");
            }
        }
    }

    let handler = Arc::new(RequestHandler::new(
        Arc::clone(&registry),
        executors,
        store,
        Arc::clone(&pool),
    ));
    let app = gateway_router(handler, Arc::clone(&registry));

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await {
        Ok(listener) => listener,
        Err(bind_error) => {
            error!(%bind_error, port = settings.port, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    info!(port = settings.port, "gateway listening");
    if let Err(serve_error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%serve_error, "server error");
        return ExitCode::FAILURE;
    }

    info!("gateway stopped");
    ExitCode::SUCCESS
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

async fn shutdown_signal() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(%signal_error, "failed to listen for shutdown signal");
    }
}
