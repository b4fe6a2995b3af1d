use std::{
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use turnstile::{
    AdmissionOutcome, FastStore, KeyPrefix, RequestThreshold, Turnstile, TurnstileOptions, UserId,
    WindowSizeSeconds,
    local::{LocalFastStore, LocalPredictionSource},
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Provider {
    Local,
    Redis,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "turnstile-stress",
    about = "Load test harness for the turnstile admission pipeline"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Provider::Local)]
    provider: Provider,

    #[arg(long, value_enum, default_value_t = KeyDist::Uniform)]
    key_dist: KeyDist,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 30)]
    duration_s: u64,

    #[arg(long, default_value_t = 60)]
    window_s: u64,

    #[arg(long, default_value_t = 100)]
    threshold: u64,

    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    /// Share of scored users predicted allowed.
    #[arg(long, default_value_t = 0.9)]
    allow_ratio: f64,

    /// Share of users that have a prediction row at all.
    #[arg(long, default_value_t = 1.0)]
    scored_ratio: f64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    #[arg(long)]
    target_qps: Option<u64>,

    #[arg(long, default_value_t = 10_000)]
    log_cap: u64,

    /// Skip the warm-up pass so the first request per user misses the cache.
    #[arg(long, default_value_t = false)]
    cold: bool,

    #[arg(long, default_value = "redis://127.0.0.1:16379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rate_limited: AtomicU64,
    prediction_blocked: AtomicU64,
    unlogged: AtomicU64,
    errors: AtomicU64,
}

fn build_users(args: &Args) -> Vec<UserId> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        _ => args.key_space.max(1),
    };
    (0..n)
        .map(|i| UserId::try_from(format!("user_{i}")).unwrap())
        .collect()
}

fn build_source(args: &Args, users: &[UserId]) -> LocalPredictionSource {
    let mut rng = rand::rng();
    let source = LocalPredictionSource::new();

    for user_id in users {
        if rng.random_bool(args.scored_ratio.clamp(0.0, 1.0)) {
            source.record(
                user_id.clone(),
                1_000,
                rng.random_bool(args.allow_ratio.clamp(0.0, 1.0)),
            );
        }
    }

    source
}

fn build_options(args: &Args) -> TurnstileOptions {
    let mut options = TurnstileOptions::default();
    options.prefix = KeyPrefix::try_from(args.redis_prefix.clone()).unwrap();
    options.rate_limit.window_size_seconds = WindowSizeSeconds::try_from(args.window_s).unwrap();
    options.rate_limit.threshold = RequestThreshold::try_from(args.threshold).unwrap();
    options.request_log.max_entries = NonZeroU64::new(args.log_cap);
    options
}

#[cfg(feature = "redis-tokio")]
async fn redis_store(args: &Args) -> Arc<dyn FastStore> {
    use turnstile::redis::{RedisFastStore, TurnstileRedisClient};

    let client = TurnstileRedisClient::open(&args.redis_url, args.tasks.clamp(1, 16))
        .await
        .unwrap();
    Arc::new(RedisFastStore::new(client))
}

#[cfg(not(feature = "redis-tokio"))]
async fn redis_store(_: &Args) -> Arc<dyn FastStore> {
    eprintln!("redis provider requires: cargo run -p turnstile-stress --features redis-tokio -- ...");
    std::process::exit(2);
}

fn pick_user<'a>(args: &Args, users: &'a [UserId], rng: &mut impl Rng) -> &'a UserId {
    match args.key_dist {
        KeyDist::Hot => &users[0],
        KeyDist::Uniform => &users[rng.random_range(0..users.len())],
        KeyDist::Skewed => {
            if users.len() == 1 || rng.random_bool(args.hot_fraction.clamp(0.0, 1.0)) {
                &users[0]
            } else {
                &users[rng.random_range(1..users.len())]
            }
        }
    }
}

fn print_results(args: &Args, elapsed: Duration, ops: u64, hist: &Histogram<u64>, counts: &Counts) {
    println!(
        "provider={:?} mode={:?} tasks={} duration_s={}",
        args.provider, args.mode, args.tasks, args.duration_s
    );
    println!(
        "window_s={} threshold={} key_dist={:?} key_space={} cold={}",
        args.window_s, args.threshold, args.key_dist, args.key_space, args.cold
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!(
        "allowed={} rate_limited={} prediction_blocked={} unlogged={} errors={}",
        counts.allowed.load(Ordering::Relaxed),
        counts.rate_limited.load(Ordering::Relaxed),
        counts.prediction_blocked.load(Ordering::Relaxed),
        counts.unlogged.load(Ordering::Relaxed),
        counts.errors.load(Ordering::Relaxed)
    );

    if hist.is_empty() {
        println!("no latency samples collected");
        return;
    }

    println!(
        "lat_us p50={} p95={} p99={} p999={} max={}",
        hist.value_at_quantile(0.50),
        hist.value_at_quantile(0.95),
        hist.value_at_quantile(0.99),
        hist.value_at_quantile(0.999),
        hist.max()
    );
    println!("sample_every={} samples={}", args.sample_every, hist.len());
}

async fn run(args: Args) {
    let users = Arc::new(build_users(&args));
    let source = Arc::new(build_source(&args, &users));

    let fast: Arc<dyn FastStore> = match args.provider {
        Provider::Local => Arc::new(LocalFastStore::new()),
        Provider::Redis => redis_store(&args).await,
    };

    let gate = Turnstile::new(build_options(&args), fast, source);

    if !args.cold {
        match gate.warmer().warm_all().await {
            Ok(report) => tracing::info!(warmed = report.warmed, "stress, cache warmed"),
            Err(err) => tracing::warn!(error = ?err, "stress, warm-up failed, starting cold"),
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let total_ops = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);
    let per_task_qps = args
        .target_qps
        .filter(|_| args.mode == Mode::TargetQps)
        .map(|qps| (qps / args.tasks.max(1) as u64).max(1));

    let mut join = Vec::with_capacity(args.tasks);
    for _ in 0..args.tasks {
        let pipeline = gate.pipeline().clone();
        let users = Arc::clone(&users);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let total_ops = Arc::clone(&total_ops);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut rng = StdRng::from_rng(&mut rand::rng());
            let mut i = 0_u64;
            let mut next_deadline = Instant::now();

            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                if let Some(qps) = per_task_qps {
                    let now = Instant::now();
                    if now < next_deadline {
                        tokio::time::sleep(next_deadline - now).await;
                    }
                    next_deadline += Duration::from_nanos(1_000_000_000 / qps);
                }

                i = i.wrapping_add(1);
                let user_id = pick_user(&args, &users, &mut rng);
                let t0 = (args.sample_every <= 1 || i.is_multiple_of(args.sample_every))
                    .then(Instant::now);

                let result = pipeline.admit(user_id, "/api/predict").await;

                if let Some(t0) = t0 {
                    let _ = hist.record((t0.elapsed().as_micros() as u64).max(1));
                }

                total_ops.fetch_add(1, Ordering::Relaxed);
                match result {
                    Ok(decision) => {
                        let counter = match decision.outcome {
                            AdmissionOutcome::Allowed => &counts.allowed,
                            AdmissionOutcome::RateLimited => &counts.rate_limited,
                            AdmissionOutcome::PredictionBlocked => &counts.prediction_blocked,
                        };
                        counter.fetch_add(1, Ordering::Relaxed);
                        if !decision.logged {
                            counts.unlogged.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(err) => {
                        tracing::debug!(user_id = %user_id, error = ?err, "stress, admission failed");
                        counts.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        merged.add(&j.await.unwrap()).unwrap();
    }

    let elapsed = started.elapsed();
    print_results(
        &args,
        elapsed,
        total_ops.load(Ordering::Relaxed),
        &merged,
        &counts,
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.tasks.clamp(2, 64))
        .build()
        .unwrap();

    rt.block_on(run(args));
}
