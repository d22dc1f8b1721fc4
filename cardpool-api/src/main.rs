use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cardpool_api::{router, AppState, Authenticator, Config, ProviderKind};
use cardpool_baas::{BaasProvider, MockProvider, SyncteraProvider};
use cardpool_core::{
    CardProgram, FundingRouter, PolicyService, StatusUpdater, WebhookPipeline,
    WithdrawalCoordinator,
};
use cardpool_ledger::Ledger;

const HOLD_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    let ledger = match &config.data_dir {
        Some(data_dir) => Ledger::with_binlog(data_dir).await?,
        None => Ledger::new(),
    };
    let ledger = Arc::new(ledger);

    let provider: Arc<dyn BaasProvider> = match config.provider {
        ProviderKind::Mock => Arc::new(MockProvider::new()),
        ProviderKind::Synctera => {
            let synctera = config
                .synctera
                .clone()
                .expect("config validation guarantees Synctera settings");
            Arc::new(SyncteraProvider::new(synctera)?)
        }
    };

    let policies = Arc::new(PolicyService::new(Arc::clone(&ledger)));
    let card_program = Arc::new(CardProgram::new(Arc::clone(&ledger), policies));
    let coordinator = Arc::new(WithdrawalCoordinator::new(
        Arc::clone(&ledger),
        Arc::clone(&provider),
    ));
    let funding = Arc::new(FundingRouter::new(Arc::clone(&ledger)));
    let statuses = Arc::new(StatusUpdater::new(Arc::clone(&ledger)));
    let pipeline = Arc::new(
        WebhookPipeline::new(
            Arc::clone(&ledger),
            Arc::clone(&card_program),
            Arc::clone(&coordinator),
            funding,
            statuses,
        )
        .register_provider(Arc::clone(&provider)),
    );

    card_program.spawn_hold_sweep(HOLD_SWEEP_INTERVAL);

    let state = AppState {
        ledger,
        coordinator,
        pipeline,
        auth: Arc::new(Authenticator::new(&config.jwt_secret)),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("cardpool API listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
