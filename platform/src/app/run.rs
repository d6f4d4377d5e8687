//! Main application run loop

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::deploy::executor::BuildExecutor;
use crate::deploy::git::GitFetcher;
use crate::deploy::Pipeline;
use crate::errors::PlatformError;
use crate::router::serve::serve as serve_router;
use crate::router::ArtifactRouter;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::services::deployments::DeploymentService;
use crate::workers::deployer;

/// Run the Hangar platform
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PlatformError> {
    info!("Initializing Hangar ({:?} mode)...", options.mode);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start Hangar: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PlatformError> {
    let app_state = init_app_state(options, shutdown_tx.subscribe(), shutdown_manager).await?;

    if options.mode.runs_api() {
        init_deployer_worker(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;

        init_api_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    if options.mode.runs_router() {
        init_router_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(())
}

async fn init_app_state(
    options: &AppOptions,
    shutdown_rx: broadcast::Receiver<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, PlatformError> {
    let (app_state, tasks) = AppState::init(options, shutdown_rx).await?;

    let app_state = Arc::new(app_state);
    shutdown_manager.with_app_state(
        app_state.clone(),
        Box::pin(async move {
            for task in tasks {
                if let Err(e) = task.await {
                    error!("App state task failed: {}", e);
                }
            }
        }),
    )?;

    Ok(app_state)
}

fn init_deployer_worker(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing deployer worker...");

    let pipeline = Arc::new(Pipeline::new(
        app_state.store.clone(),
        app_state.blobs.clone(),
        Arc::new(GitFetcher::new()),
        BuildExecutor::new(&options.build, app_state.hub.clone()),
        options.layout.clone(),
        app_state.hub.clone(),
    ));
    let worker_options = options.deployer.clone();
    let queue = app_state.queue.clone();
    let store = app_state.store.clone();

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            &worker_options,
            queue,
            store,
            pipeline,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)?;
    Ok(())
}

async fn init_api_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing API server...");

    let deployments = DeploymentService::new(
        app_state.store.clone(),
        app_state.queue.clone(),
        options.deployer.topic.clone(),
        options.base_domain.clone(),
    );
    let server_state = ServerState::new(Arc::new(deployments), app_state.hub.clone());

    let server_handle = serve(&options.api_server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_api_server_handle(server_handle)?;
    Ok(())
}

async fn init_router_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing artifact router...");

    let router = ArtifactRouter::new(
        app_state.blobs.clone(),
        app_state.cache.clone(),
        options.cache_ttl,
    );

    let router_handle = serve_router(&options.router_server, router, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_router_server_handle(router_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct AppStateShutdownParams {
    state: Arc<AppState>,
    state_handle: Pin<Box<dyn Future<Output = ()> + Send>>,
}

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<AppStateShutdownParams>,
    api_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    router_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    deployer_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            api_server_handle: None,
            router_server_handle: None,
            deployer_worker_handle: None,
        }
    }

    pub fn with_app_state(
        &mut self,
        state: Arc<AppState>,
        state_handle: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) -> Result<(), PlatformError> {
        if self.app_state.is_some() {
            return Err(PlatformError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(AppStateShutdownParams { state, state_handle });
        Ok(())
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PlatformError> {
        if self.deployer_worker_handle.is_some() {
            return Err(PlatformError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_api_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.api_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("api_server_handle already set".to_string()));
        }
        self.api_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_router_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.router_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("router_server_handle already set".to_string()));
        }
        self.router_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), PlatformError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PlatformError> {
        info!("Shutting down Hangar...");

        // 1. Deployer worker, finishes the in-flight deployment
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))?;
        }

        // 2. API server
        if let Some(handle) = self.api_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 3. Artifact router
        if let Some(handle) = self.router_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 4. App state, stops the log hub last so the final build output is delivered
        if let Some(app_state) = self.app_state.take() {
            app_state.state.shutdown().await?;
            app_state.state_handle.await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
