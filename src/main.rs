use sigma_watch::analyzer::AnalyzerImpl;
use sigma_watch::config::{load_config, AppConfig, ConfigError};
use sigma_watch::loader::yahoo::DEFAULT_BASE_URL;
use sigma_watch::loader::YahooLoader;
use sigma_watch::model::{AnalysisRequest, AnalysisResult};
use sigma_watch::storage::SqliteReportStore;
use sigma_watch::{AnalysisCache, AnalysisFacade, Clock, SystemClock};

use chrono::NaiveDate;
use futures::future::join_all;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Panic occurred: {:?}", panic_info);
    }));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config: Arc<AppConfig> = match load_config(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(ConfigError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            warn!("{} not found, using defaults", config_path);
            Arc::new(AppConfig::default())
        }
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    let base_url = config.price_source_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let loader = match YahooLoader::with_base_url(base_url) {
        Ok(l) => Arc::new(l),
        Err(e) => {
            error!("Failed to build price loader: {}", e);
            return;
        }
    };

    let clock = Arc::new(SystemClock);
    let cache = AnalysisCache::with_capacity_limit(clock.clone(), config.cache_max_entries);
    let facade = Arc::new(AnalysisFacade::new(
        loader,
        Arc::new(AnalyzerImpl::new(config.bin_spec())),
        cache,
        config.fetch_timeout(),
    ));

    if let Some(dir) = config.database_path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            error!("Failed to create output directory {}: {}", dir.display(), e);
            return;
        }
    }
    let storage = match SqliteReportStore::new(&config.database_path.to_string_lossy()) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            return;
        }
    };

    loop {
        run_batch(&config, &facade, &storage, clock.today()).await;

        let Some(interval) = config.refresh_interval_seconds else {
            break;
        };
        info!("Waiting {}s for the next run (Ctrl-C to stop)...", interval);
        tokio::select! {
            _ = sleep(Duration::from_secs(interval)) => {
                info!("Timer triggered.");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down.");
                break;
            }
        }
    }
}

/// Analyzes every configured (index, change kind) pair concurrently.
async fn run_batch(
    config: &AppConfig,
    facade: &Arc<AnalysisFacade>,
    storage: &Arc<Mutex<SqliteReportStore>>,
    today: NaiveDate,
) {
    let range = match config.date_range(today) {
        Ok(r) => r,
        Err(e) => {
            error!("Invalid date range: {}", e);
            return;
        }
    };

    let requests: Vec<AnalysisRequest> = config
        .indices
        .iter()
        .flat_map(|&index| {
            config
                .change_kinds
                .iter()
                .map(move |&kind| AnalysisRequest { index, range, kind })
        })
        .collect();
    info!("Analyses to run: {}", requests.len());

    let tasks: Vec<_> = requests
        .into_iter()
        .map(|request| process_request(request, facade.clone(), storage.clone(), today))
        .collect();
    join_all(tasks).await;
}

async fn process_request(
    request: AnalysisRequest,
    facade: Arc<AnalysisFacade>,
    storage: Arc<Mutex<SqliteReportStore>>,
    today: NaiveDate,
) {
    info!("Processing {}", request);
    let result = match facade.analyze_request(request).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Analysis failed: {}", e);
            return;
        }
    };

    log_report(&result);

    match storage.lock().await.save_result(&result, today) {
        Ok(id) => info!("Saved {} as run {}", request, id),
        Err(e) => warn!("Report save failed for {}: {}", request, e),
    }
}

fn log_report(result: &AnalysisResult) {
    let s = &result.summary;
    info!(
        "{} {}: {} points from {} to {}, mean = {:.6}%, stdev = {:.6}%",
        result.index, result.change_kind, s.count, s.date_range.0, s.date_range.1, s.mean, s.stdev
    );
    for rejected in &result.rejected {
        warn!("  {} excluded: {}", rejected.date, rejected.reason);
    }
    if result.is_degenerate() {
        warn!("  insufficient variance to compute z-scores");
        return;
    }

    for bin in &result.bins {
        info!(
            "  ({:>9.4}, {:>9.4}]  observed {:>6}  expected {:>9.1}",
            bin.lower_bound, bin.upper_bound, bin.observed_count, bin.expected_count
        );
    }
    for row in &result.exceedances {
        info!(
            "  |Z| > {:>2}σ  {:>5} ({:>5.2}%)  expected {:>7.1} ({:>5.2}%)  diff {:>+7.1} ({:>+5.2}%)",
            row.threshold_sigma,
            row.observed_count,
            row.observed_pct,
            row.expected_count,
            row.expected_pct,
            row.diff_count(),
            row.diff_pct()
        );
    }
}
