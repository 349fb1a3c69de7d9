#![forbid(unsafe_code)]
//! Matcher and registry benchmarks for Visage.
//!
//! Scenarios:
//! - `identify`: nearest-neighbour scan over a populated registry
//! - `insert`: durable enrollment writes through `RegistryStore`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use visage_core::{IdentityRecord, Matcher, Registry, RegistryStore, DEFAULT_DIMENSION};

const DEFAULT_REGISTRY_SIZE: usize = 10_000;
const DEFAULT_INSERT_COUNT: usize = 256;
const DEFAULT_WARMUP_RUNS: usize = 8;
const DEFAULT_MEASURED_RUNS: usize = 50;
const INSERT_MEASURED_RUNS: usize = 3;

#[derive(Clone, Copy)]
struct BenchConfig {
    dimension: usize,
    registry_size: usize,
    insert_count: usize,
    warmup_runs: usize,
    measured_runs: usize,
}

fn main() {
    if cfg!(debug_assertions) && env::var("VISAGE_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p visage-bench`\""
        );
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let config = load_config();
    let scenario = env::var("VISAGE_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    let ok = match scenario.as_str() {
        "all" => run_identify_bench(mode, config) && run_insert_bench(mode, config),
        "identify" => run_identify_bench(mode, config),
        "insert" => run_insert_bench(mode, config),
        _ => {
            eprintln!(
                "error=invalid_scenario scenario=\"{scenario}\" allowed=\"all,identify,insert\""
            );
            false
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn load_config() -> BenchConfig {
    BenchConfig {
        dimension: read_usize_env_with_min("VISAGE_BENCH_DIMENSION", DEFAULT_DIMENSION, 1),
        registry_size: read_usize_env_with_min(
            "VISAGE_BENCH_REGISTRY_SIZE",
            DEFAULT_REGISTRY_SIZE,
            1,
        ),
        insert_count: read_usize_env_with_min("VISAGE_BENCH_INSERT_COUNT", DEFAULT_INSERT_COUNT, 1),
        warmup_runs: read_usize_env_with_min("VISAGE_BENCH_WARMUP_RUNS", DEFAULT_WARMUP_RUNS, 0),
        measured_runs: read_usize_env_with_min(
            "VISAGE_BENCH_MEASURED_RUNS",
            DEFAULT_MEASURED_RUNS,
            1,
        ),
    }
}

fn run_identify_bench(mode: &str, config: BenchConfig) -> bool {
    let registry = match build_registry(config.registry_size, config.dimension) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("error=registry_build_failed detail=\"{error}\"");
            return false;
        }
    };
    let matcher = Matcher::default();
    // Probe the last record so the scan never short-circuits on an early hit.
    let query = deterministic_vector(config.registry_size as u64 - 1, config.dimension);

    for _ in 0..config.warmup_runs {
        if run_identify_once(&matcher, &registry, &query).is_none() {
            return false;
        }
    }

    let mut elapsed_samples = Vec::with_capacity(config.measured_runs);
    let mut total_duration = Duration::from_secs(0);
    let mut last_match = String::from("unknown");
    let mut last_confidence = 0.0f32;

    for _ in 0..config.measured_runs {
        let Some((elapsed, user_id, confidence)) = run_identify_once(&matcher, &registry, &query)
        else {
            return false;
        };
        elapsed_samples.push(elapsed.as_secs_f64() * 1_000.0);
        total_duration += elapsed;
        last_match = user_id;
        last_confidence = confidence;
    }

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_samples);
    let qps = config.measured_runs as f64 / total_duration.as_secs_f64();

    println!(
        "bench=identify mode={mode} registry_size={} dimension={} warmup_runs={} measured_runs={} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} match={last_match} confidence={last_confidence:.2}",
        config.registry_size,
        config.dimension,
        config.warmup_runs,
        config.measured_runs
    );

    true
}

fn run_identify_once(
    matcher: &Matcher,
    registry: &Registry,
    query: &[f32],
) -> Option<(Duration, String, f32)> {
    let started_at = Instant::now();
    let outcome = match matcher.identify(registry, query) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("error=identify_failed detail=\"{error}\"");
            return None;
        }
    };
    let elapsed = started_at.elapsed();
    let user_id = outcome.user_id().unwrap_or("unknown").to_string();
    Some((elapsed, user_id, outcome.confidence()))
}

fn run_insert_bench(mode: &str, config: BenchConfig) -> bool {
    let root = temp_root();
    if let Err(error) = fs::create_dir_all(&root) {
        eprintln!(
            "error=insert_bench_setup_failed root={} detail=\"{error}\"",
            root.display()
        );
        return false;
    }

    let mut latencies_ms = Vec::with_capacity(INSERT_MEASURED_RUNS * config.insert_count);
    let mut total_duration = Duration::from_secs(0);
    let mut snapshot_bytes = 0u64;

    for run in 0..INSERT_MEASURED_RUNS {
        let path = root.join(format!("registry_{run}.json"));
        let Some((elapsed, samples)) = run_insert_once(&path, config) else {
            clean_root(&root);
            return false;
        };
        total_duration += elapsed;
        latencies_ms.extend(samples);
        snapshot_bytes = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
    }
    clean_root(&root);

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&latencies_ms);
    let p99_ms = percentile_ms(&latencies_ms, 0.99);
    let qps = latencies_ms.len() as f64 / total_duration.as_secs_f64();

    println!(
        "bench=durable_insert mode={mode} inserts={} dimension={} measured_runs={INSERT_MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} p99_ms={p99_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} snapshot_mb={:.3}",
        config.insert_count,
        config.dimension,
        snapshot_bytes as f64 / (1024.0 * 1024.0)
    );

    true
}

fn run_insert_once(path: &Path, config: BenchConfig) -> Option<(Duration, Vec<f64>)> {
    let mut store = match RegistryStore::open(path, config.dimension) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("error=store_open_failed detail=\"{error}\"");
            return None;
        }
    };

    let mut samples = Vec::with_capacity(config.insert_count);
    let started_at = Instant::now();
    for id in 0..config.insert_count {
        let record = match bench_record(id, config.dimension) {
            Ok(value) => value,
            Err(error) => {
                eprintln!("error=record_build_failed id={id} detail=\"{error}\"");
                return None;
            }
        };
        let insert_started = Instant::now();
        if let Err(error) = store.insert(record) {
            eprintln!("error=store_insert_failed id={id} detail=\"{error}\"");
            return None;
        }
        samples.push(insert_started.elapsed().as_secs_f64() * 1_000.0);
    }

    Some((started_at.elapsed(), samples))
}

fn build_registry(size: usize, dimension: usize) -> Result<Registry, String> {
    let mut registry = Registry::new(dimension).map_err(|error| error.to_string())?;
    for id in 0..size {
        let record = bench_record(id, dimension)?;
        registry.insert(record).map_err(|error| error.to_string())?;
    }
    Ok(registry)
}

fn bench_record(id: usize, dimension: usize) -> Result<IdentityRecord, String> {
    IdentityRecord::new(
        format!("user-{id}"),
        format!("Bench User {id}"),
        deterministic_vector(id as u64, dimension),
    )
    .map_err(|error| error.to_string())
}

fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = if samples_ms.is_empty() {
        0.0
    } else {
        samples_ms.iter().sum::<f64>() / samples_ms.len() as f64
    };
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }

    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

fn deterministic_vector(seed: u64, dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|index| {
            let mixed = (seed as usize)
                .wrapping_mul(31)
                .wrapping_add(index.wrapping_mul(17))
                % 10_000;
            mixed as f32 / 10_000.0
        })
        .collect()
}

fn read_usize_env_with_min(key: &str, default: usize, min: usize) -> usize {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.parse::<usize>() {
        Ok(parsed) if parsed >= min => parsed,
        _ => default,
    }
}

fn temp_root() -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    env::temp_dir().join(format!("visage_bench_{}_{stamp}", process::id()))
}

fn clean_root(root: &Path) {
    if let Err(error) = fs::remove_dir_all(root) {
        eprintln!(
            "warning=bench_cleanup_failed root={} detail=\"{error}\"",
            root.display()
        );
    }
}
