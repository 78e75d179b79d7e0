mod cli;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use sitta::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{create_pool, create_redis_client, Cache, CacheWriterHandle},
    error::{AppError, AppResult},
    models::{HotspotId, Recommendation},
    services::{
        datasets::{self, ObserverSlice},
        evaluate,
        eval_data::{make_e2e_eval_data, EvalDataConfig},
        providers::{EbirdApiStore, PostgresStore, SightingStore, TaxonomySource},
        recommend_as_of, HistoricalSightingRecommender, HotspotRecommender, RecommenderConfig,
    },
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitta=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error[InvalidConfiguration]: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error[{}]: {}", e.kind(), e);
        std::process::exit(e.exit_code());
    }
}

/// Sighting store selected by `SIGHTING_STORE`, plus the cache writer to flush on exit
struct Backend {
    store: Arc<dyn SightingStore>,
    taxonomy: Arc<dyn TaxonomySource>,
    cache_writer: Option<CacheWriterHandle>,
}

impl Backend {
    async fn connect(config: &Config) -> AppResult<Self> {
        match config.sighting_store {
            StoreBackend::Ebird => {
                let api_key = config.ebird_api_key.clone().ok_or_else(|| {
                    AppError::invalid_config("EBIRD_API_KEY", "required by the ebird sighting store")
                })?;
                let redis_client = create_redis_client(&config.redis_url)
                    .map_err(|e| AppError::invalid_config("REDIS_URL", format!("{:#}", e)))?;
                let (cache, cache_writer) = Cache::new(redis_client);
                let store = Arc::new(EbirdApiStore::new(
                    cache,
                    api_key,
                    config.ebird_api_url.clone(),
                    config.api_max_concurrency,
                ));

                tracing::info!(api_url = %config.ebird_api_url, "Using eBird API sighting store");

                Ok(Self {
                    store: store.clone(),
                    taxonomy: store,
                    cache_writer: Some(cache_writer),
                })
            }
            StoreBackend::Postgres => {
                let store = Arc::new(connect_postgres(config).await?);
                Ok(Self {
                    store: store.clone(),
                    taxonomy: store,
                    cache_writer: None,
                })
            }
        }
    }

    async fn close(self) {
        if let Some(cache_writer) = self.cache_writer {
            cache_writer.shutdown().await;
        }
    }
}

async fn connect_postgres(config: &Config) -> AppResult<PostgresStore> {
    let pool = create_pool(config)
        .await
        .map_err(|e| AppError::DataUnavailable(format!("{:#}", e)))?;
    tracing::info!("Using PostgreSQL sighting store");
    Ok(PostgresStore::new(pool))
}

async fn run(command: Commands, config: Config) -> AppResult<()> {
    if let Commands::MakeE2eEvalData {
        observer_ids,
        start,
        limit,
        date,
        eval_file,
        horizon_days,
        cases_per_observer,
    } = command
    {
        let observers = ObserverSlice { start, limit };
        let eval_config = EvalDataConfig {
            horizon_days,
            cases_per_observer,
        };
        return make_eval_data(&config, &observer_ids, observers, date, &eval_file, eval_config)
            .await;
    }

    let backend = Backend::connect(&config).await?;
    let store = Arc::clone(&backend.store);

    let result = match command {
        Commands::Recommend {
            locations,
            date,
            life_list,
            strategy,
            historical_years,
            day_window,
            max_results,
            show_all,
        } => {
            let defaults = config.recommender_config();
            let recommender_config = RecommenderConfig {
                historical_years: historical_years.unwrap_or(defaults.historical_years),
                day_window: day_window.unwrap_or(defaults.day_window),
                max_results: max_results.unwrap_or(defaults.max_results),
                include_empty_hotspots: show_all,
                ..defaults
            };
            let recommender =
                HistoricalSightingRecommender::new(strategy.into(), store, recommender_config);
            let hotspots: Vec<HotspotId> = locations.into_iter().map(HotspotId).collect();
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());

            recommend(
                &recommender,
                backend.taxonomy.as_ref(),
                &hotspots,
                date,
                &life_list,
            )
            .await
        }
        Commands::RunE2eEval { eval_file, k } => run_eval(&config, store, &eval_file, k).await,
        Commands::Serve => serve(&config, store).await,
        Commands::MakeE2eEvalData { .. } => Ok(()),
    };

    backend.close().await;
    result
}

async fn recommend(
    recommender: &dyn HotspotRecommender,
    taxonomy: &dyn TaxonomySource,
    hotspots: &[HotspotId],
    date: NaiveDate,
    life_list_path: &Path,
) -> AppResult<()> {
    let life_list = datasets::load_life_list(life_list_path, taxonomy).await?;
    let recommendations = recommend_as_of(recommender, hotspots, date, &life_list).await?;

    if recommendations.is_empty() {
        println!("No likely lifers at the requested hotspots around {}", date);
    }
    for (rank, recommendation) in recommendations.iter().enumerate() {
        print_recommendation(rank + 1, recommendation);
    }

    Ok(())
}

fn print_recommendation(rank: usize, recommendation: &Recommendation) {
    println!(
        "{}. {}  expected lifers {:.2}  ({} checklists)",
        rank, recommendation.hotspot, recommendation.score, recommendation.checklist_count
    );
    for scored in &recommendation.species {
        println!(
            "     {:>5.1}%  {} ({})",
            scored.likelihood * 100.0,
            scored.species.common_name,
            scored.species.code
        );
    }
}

async fn make_eval_data(
    config: &Config,
    observer_ids_path: &Path,
    observers: ObserverSlice,
    as_of_date: NaiveDate,
    eval_file: &Path,
    eval_config: EvalDataConfig,
) -> AppResult<()> {
    let observer_ids = datasets::load_observer_ids(observer_ids_path, observers).await?;
    let history = connect_postgres(config).await?;

    let cases = make_e2e_eval_data(&history, &observer_ids, as_of_date, eval_config).await?;
    datasets::save_cases(eval_file, &cases).await?;

    println!(
        "Wrote {} evaluation cases for {} observers to {}",
        cases.len(),
        observer_ids.len(),
        eval_file.display()
    );

    Ok(())
}

async fn run_eval(
    config: &Config,
    store: Arc<dyn SightingStore>,
    eval_file: &Path,
    k: Option<usize>,
) -> AppResult<()> {
    let cases = datasets::load_cases(eval_file).await?;
    let mut eval_config = config.evaluation_config();
    if let Some(k) = k {
        eval_config.top_k = k;
    }

    let recommenders: Vec<Arc<dyn HotspotRecommender>> = vec![
        Arc::new(HistoricalSightingRecommender::day_window(
            Arc::clone(&store),
            config.recommender_config(),
        )),
        Arc::new(HistoricalSightingRecommender::calendar_month(
            store,
            config.recommender_config(),
        )),
    ];

    for recommender in recommenders {
        let report = evaluate(recommender, &cases, eval_config).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

async fn serve(config: &Config, store: Arc<dyn SightingStore>) -> AppResult<()> {
    let state = AppState::new(
        store,
        config.recommender_config(),
        config.evaluation_config(),
    );
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::invalid_config("HOST", format!("{}", e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
