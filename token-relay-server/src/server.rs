use crate::{metrics::Metrics, pipeline, scanners, settings::Settings};
use blockscout_service_launcher::database;
use migration::Migrator;
use std::sync::Arc;
use token_relay_logic::{ContractDirectory, HandlerContext, PusherNotifier, RelayDatabase};

const SERVICE_NAME: &str = "token_relay";

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let db_connection = database::initialize_postgres::<Migrator>(&settings.database).await?;
    let db = RelayDatabase::new(Arc::new(db_connection));
    let notifier = PusherNotifier::from_settings(&settings.notifier)?;
    let directory = ContractDirectory::new(
        Arc::new(db.clone()),
        settings.mode.clone(),
        settings.queue.contract_cache_ttl,
    );

    let mut tasks = vec![
        scanners::start(&settings, db.clone(), notifier.clone(), directory.clone()).await?,
    ];

    if settings.queue.enabled {
        let ctx = HandlerContext {
            notifier,
            ledger: Arc::new(db.clone()),
            directory,
        };
        tasks.extend(pipeline::start(&settings, db, ctx)?);
    } else {
        tracing::warn!("queue consumers are disabled in settings");
    }

    if settings.metrics.enabled {
        let server = Metrics::new(SERVICE_NAME, &settings.metrics.route)?
            .run_server(settings.metrics.addr)?;
        tasks.push(tokio::spawn(async move {
            if let Err(err) = server.await {
                tracing::error!(err = ?err, "metrics server stopped");
            }
        }));
    }

    let (result, index, _) = futures::future::select_all(tasks).await;
    result?;
    anyhow::bail!("background task {index} stopped unexpectedly")
}
