//! Behaviour of computation caches across instances and processes

use datacache::{
    CacheError, ComputationCache, ComputeResult, Histogram, Inputs, StoreUnit, Table, Value,
    Values,
};
use serde_json::json;
use serial_test::serial;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn values<const N: usize>(pairs: [(&str, Value); N]) -> Values {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

static PI_CALLS: AtomicUsize = AtomicUsize::new(0);

fn calc_pi(inputs: &Inputs<'_>) -> ComputeResult {
    PI_CALLS.fetch_add(1, Ordering::SeqCst);
    let n: u64 = inputs.kwarg_as("n")?;
    let pi: f64 = (0..n)
        .map(|k| (if k % 2 == 0 { 4.0 } else { -4.0 }) / (2 * k + 1) as f64)
        .sum();
    Ok(values([("pi", Value::from(pi))]))
}

fn pi_cache(path: &Path, n: u64) -> ComputationCache {
    ComputationCache::builder("pi", calc_pi)
        .location(path)
        .names(["pi"])
        .kwarg("n", n)
        .capture_output(false)
        .build()
        .unwrap()
}

#[test]
fn fresh_computation_is_reused_by_new_instances() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pi.dcache");

    let first = pi_cache(&path, 1000);
    let pi = first.get("pi").unwrap().as_f64().unwrap();
    assert!((pi - std::f64::consts::PI).abs() < 1e-2);
    assert!(path.exists());
    let calls = PI_CALLS.load(Ordering::SeqCst);

    let second = pi_cache(&path, 1000);
    assert_eq!(second.get("pi").unwrap().as_f64().unwrap(), pi);
    assert_eq!(second.ctime().unwrap(), first.ctime().unwrap());
    assert_eq!(PI_CALLS.load(Ordering::SeqCst), calls);
}

static FORCED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn forced(_: &Inputs<'_>) -> ComputeResult {
    let n = FORCED_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(values([("call", Value::from(n as u64))]))
}

#[test]
fn forced_update_recomputes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("forced.dcache");
    let make = |force| {
        ComputationCache::builder("forced", forced)
            .location(&path)
            .names(["call"])
            .capture_output(false)
            .force_update(force)
            .build()
            .unwrap()
    };

    let first: u64 = make(false).get_as("call").unwrap();
    let second: u64 = make(true).get_as("call").unwrap();
    assert_eq!(second, first + 1);

    // the forced result was persisted and is what later instances see
    let third: u64 = make(false).get_as("call").unwrap();
    assert_eq!(third, second);
    assert_eq!(FORCED_CALLS.load(Ordering::SeqCst), 2);
}

static DRIFT_CALLS: AtomicUsize = AtomicUsize::new(0);
static WITH_SIGMA: AtomicBool = AtomicBool::new(false);

fn fit(_: &Inputs<'_>) -> ComputeResult {
    DRIFT_CALLS.fetch_add(1, Ordering::SeqCst);
    let mut out = values([("mean", Value::from(5279.6))]);
    if WITH_SIGMA.load(Ordering::SeqCst) {
        out.insert("sigma".to_string(), Value::from(12.4));
    }
    Ok(out)
}

#[test]
fn schema_drift_invalidates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fit.dcache");
    let make = |names: &[&str]| {
        ComputationCache::builder("fit", fit)
            .location(&path)
            .names(names.iter().copied())
            .capture_output(false)
            .build()
            .unwrap()
    };

    make(&["mean"]).load().unwrap();
    make(&["mean"]).load().unwrap();
    assert_eq!(DRIFT_CALLS.load(Ordering::SeqCst), 1);

    // same function and arguments, only the declared names differ
    WITH_SIGMA.store(true, Ordering::SeqCst);
    let widened = make(&["mean", "sigma"]);
    assert_eq!(widened.retrieve().unwrap(), None);
    assert_eq!(widened.get_as::<f64>("sigma").unwrap(), 12.4);
    assert_eq!(DRIFT_CALLS.load(Ordering::SeqCst), 2);
}

static VERSION_CALLS: AtomicUsize = AtomicUsize::new(0);

fn efficiency(_: &Inputs<'_>) -> ComputeResult {
    let n = VERSION_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(values([("efficiency", Value::from(0.8 + n as f64 / 100.0))]))
}

#[test]
fn function_identity_change_invalidates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("efficiency.dcache");
    let make = |id: &str| {
        ComputationCache::builder("efficiency", efficiency)
            .location(&path)
            .names(["efficiency"])
            .function_id(id)
            .capture_output(false)
            .build()
            .unwrap()
    };

    let v1: f64 = make("selection::efficiency::v1").get_as("efficiency").unwrap();
    let again: f64 = make("selection::efficiency::v1").get_as("efficiency").unwrap();
    assert_eq!(again, v1);
    assert_eq!(VERSION_CALLS.load(Ordering::SeqCst), 1);

    let v2 = make("selection::efficiency::v2");
    assert_eq!(v2.retrieve().unwrap(), None);
    assert!(v2.get_as::<f64>("efficiency").unwrap() > v1);
    assert_eq!(VERSION_CALLS.load(Ordering::SeqCst), 2);
}

static SMEAR_CALLS: AtomicUsize = AtomicUsize::new(0);

fn smeared_width(inputs: &Inputs<'_>) -> ComputeResult {
    SMEAR_CALLS.fetch_add(1, Ordering::SeqCst);
    let resolution: f64 = inputs.kwarg_as("resolution")?;
    Ok(values([("width", Value::from((144.0 + resolution * resolution).sqrt()))]))
}

#[test]
fn keyword_argument_change_invalidates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("smear.dcache");
    let make = |resolution: f64| {
        ComputationCache::builder("smear", smeared_width)
            .location(&path)
            .names(["width"])
            .kwarg("resolution", resolution)
            .capture_output(false)
            .build()
            .unwrap()
    };

    assert_eq!(make(5.0).get_as::<f64>("width").unwrap(), 13.0);
    assert_eq!(make(5.0).get_as::<f64>("width").unwrap(), 13.0);
    assert_eq!(SMEAR_CALLS.load(Ordering::SeqCst), 1);

    let changed = make(9.0);
    assert_eq!(changed.retrieve().unwrap(), None);
    assert_eq!(changed.get_as::<f64>("width").unwrap(), 15.0);
    assert_eq!(SMEAR_CALLS.load(Ordering::SeqCst), 2);
}

static ARG_CALLS: AtomicUsize = AtomicUsize::new(0);

fn scaled(inputs: &Inputs<'_>) -> ComputeResult {
    ARG_CALLS.fetch_add(1, Ordering::SeqCst);
    let factor: f64 = inputs.arg_as(0)?;
    Ok(values([("value", Value::from(2.0 * factor))]))
}

#[test]
fn plain_argument_change_invalidates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scaled.dcache");
    let make = |factor: f64| {
        ComputationCache::builder("scaled", scaled)
            .location(&path)
            .names(["value"])
            .arg(factor)
            .capture_output(false)
            .build()
            .unwrap()
    };

    assert_eq!(make(1.5).get_as::<f64>("value").unwrap(), 3.0);
    assert_eq!(make(1.5).get_as::<f64>("value").unwrap(), 3.0);
    assert_eq!(ARG_CALLS.load(Ordering::SeqCst), 1);

    assert_eq!(make(2.5).get_as::<f64>("value").unwrap(), 5.0);
    assert_eq!(ARG_CALLS.load(Ordering::SeqCst), 2);
}

static UPSTREAM_CALLS: AtomicUsize = AtomicUsize::new(0);
static DOWNSTREAM_CALLS: AtomicUsize = AtomicUsize::new(0);

fn upstream(_: &Inputs<'_>) -> ComputeResult {
    UPSTREAM_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(values([("yield", Value::from(1520.0))]))
}

fn downstream(inputs: &Inputs<'_>) -> ComputeResult {
    DOWNSTREAM_CALLS.fetch_add(1, Ordering::SeqCst);
    let signal: f64 = inputs.dep_kwarg("signal")?.get_as("yield")?;
    Ok(values([("ratio", Value::from(signal / 4.0))]))
}

#[test]
fn dependency_update_propagates() {
    let temp = TempDir::new().unwrap();
    let up_path = temp.path().join("upstream.dcache");
    let down_path = temp.path().join("downstream.dcache");
    let make_up = || {
        Arc::new(
            ComputationCache::builder("upstream", upstream)
                .location(&up_path)
                .names(["yield"])
                .capture_output(false)
                .build()
                .unwrap(),
        )
    };
    let make_down = |up: Arc<ComputationCache>| {
        ComputationCache::builder("downstream", downstream)
            .location(&down_path)
            .names(["ratio"])
            .dep_kwarg("signal", up)
            .capture_output(false)
            .build()
            .unwrap()
    };

    assert_eq!(make_down(make_up()).get_as::<f64>("ratio").unwrap(), 380.0);
    assert_eq!(DOWNSTREAM_CALLS.load(Ordering::SeqCst), 1);

    // untouched dependency: reused
    make_down(make_up()).load().unwrap();
    assert_eq!(DOWNSTREAM_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(UPSTREAM_CALLS.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(10));
    make_up().execute().unwrap();

    let down = make_down(make_up());
    assert_eq!(down.retrieve().unwrap(), None);
    down.load().unwrap();
    assert_eq!(DOWNSTREAM_CALLS.load(Ordering::SeqCst), 2);
    assert_eq!(UPSTREAM_CALLS.load(Ordering::SeqCst), 2);

    // recomputed dependent is newer than its dependency
    let up = make_up();
    assert!(make_down(up.clone()).ctime().unwrap() >= up.ctime().unwrap());
}

fn too_many(_: &Inputs<'_>) -> ComputeResult {
    Ok(values([("a", Value::from(1)), ("b", Value::from(2))]))
}

fn too_few(_: &Inputs<'_>) -> ComputeResult {
    Ok(values([("a", Value::from(1))]))
}

#[test]
fn produced_keys_must_match_exactly() {
    let temp = TempDir::new().unwrap();

    let superset = ComputationCache::builder("superset", too_many)
        .location(temp.path().join("superset.dcache"))
        .names(["a"])
        .capture_output(false)
        .build()
        .unwrap();
    match superset.load().unwrap_err() {
        CacheError::SchemaViolation { actual, .. } => assert!(actual.contains("b")),
        other => panic!("unexpected error: {other}"),
    }

    let subset = ComputationCache::builder("subset", too_few)
        .location(temp.path().join("subset.dcache"))
        .names(["a", "b"])
        .capture_output(false)
        .build()
        .unwrap();
    assert!(matches!(
        subset.get("a"),
        Err(CacheError::SchemaViolation { .. })
    ));
    assert!(!temp.path().join("subset.dcache").exists());
}

fn failing(_: &Inputs<'_>) -> ComputeResult {
    Err("boom: fit did not converge".into())
}

#[test]
fn failure_keeps_original_message() {
    let temp = TempDir::new().unwrap();
    let cache = ComputationCache::builder("failing", failing)
        .location(temp.path().join("failing.dcache"))
        .names(["x"])
        .capture_output(false)
        .build()
        .unwrap();

    let err = cache.get("x").unwrap_err();
    assert!(err.is_computation());
    assert!(err.to_string().contains("boom"));
    assert!(!cache.is_loaded());
}

#[test]
#[serial]
fn captured_failure_is_rerun_and_surfaced() {
    let temp = TempDir::new().unwrap();
    let cache = ComputationCache::builder("failing", failing)
        .location(temp.path().join("failing.dcache"))
        .names(["x"])
        .print_output(false)
        .build()
        .unwrap();

    let err = cache.execute().unwrap_err();
    assert!(err.to_string().contains("boom"));
}

fn diverging(_: &Inputs<'_>) -> ComputeResult {
    panic!("minimizer diverged");
}

#[test]
#[serial]
#[should_panic(expected = "minimizer diverged")]
fn captured_panic_propagates() {
    let temp = TempDir::new().unwrap();
    let cache = ComputationCache::builder("diverging", diverging)
        .location(temp.path().join("diverging.dcache"))
        .names(["x"])
        .print_output(false)
        .build()
        .unwrap();
    let _ = cache.load();
}

static READ_CALLS: AtomicUsize = AtomicUsize::new(0);

fn read_once(_: &Inputs<'_>) -> ComputeResult {
    READ_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(values([("bins", Value::from(json!([1, 2, 3])))]))
}

#[test]
fn repeated_reads_are_idempotent() {
    let temp = TempDir::new().unwrap();
    let cache = ComputationCache::builder("reads", read_once)
        .location(temp.path().join("reads.dcache"))
        .names(["bins"])
        .capture_output(false)
        .build()
        .unwrap();

    let first = cache.get("bins").unwrap();
    let ctime = cache.ctime().unwrap();
    for _ in 0..3 {
        assert_eq!(cache.get("bins").unwrap(), first);
    }
    assert_eq!(cache.ctime().unwrap(), ctime);
    assert_eq!(cache.load().unwrap().len(), 4);
    assert_eq!(READ_CALLS.load(Ordering::SeqCst), 1);
}

fn heterogeneous(_: &Inputs<'_>) -> ComputeResult {
    let table = Table::from_columns([
        ("q2", vec![0.1, 1.1, 2.5, 4.0]),
        ("weight", vec![1.0, 0.98, 1.02, f64::NAN]),
    ])?;
    let mut hist = Histogram::uniform(10, 5200.0, 5400.0)?;
    for mass in [5279.3, 5281.0, 5366.8, 5100.0] {
        hist.fill(mass);
    }
    Ok(values([
        ("data", Value::from(table)),
        ("mass", Value::from(hist)),
        (
            "fit",
            Value::from(json!({
                "params": {"mean": 5279.6, "sigma": [12.4, 0.3]},
                "converged": true,
                "labels": ["signal", "comb", null],
            })),
        ),
    ]))
}

#[test]
fn heterogeneous_values_roundtrip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mixed.dcache");
    let make = || {
        ComputationCache::builder("mixed", heterogeneous)
            .location(&path)
            .names(["data", "mass", "fit"])
            .capture_output(false)
            .build()
            .unwrap()
    };

    let computed = make().load().unwrap();
    let restored = make().retrieve().unwrap().unwrap();

    let table = restored["data"].as_table().unwrap();
    assert_eq!(table.columns(), ["q2", "weight"]);
    assert_eq!(table.column("q2").unwrap(), [0.1, 1.1, 2.5, 4.0]);
    assert!(table.column("weight").unwrap()[3].is_nan());

    assert_eq!(restored["mass"], computed["mass"]);
    assert_eq!(restored["mass"].as_histogram().unwrap().underflow(), 1.0);
    assert_eq!(restored["fit"], computed["fit"]);

    let unit = StoreUnit::open(&path).unwrap();
    let kinds: Vec<_> = unit.entries().map(|(_, kind)| kind.as_str()).collect();
    assert!(kinds.contains(&"table"));
    assert!(kinds.contains(&"histogram"));
}

fn chatty(_: &Inputs<'_>) -> ComputeResult {
    writeln!(io::stdout(), "processing 3 files")?;
    writeln!(io::stderr(), "warning: missing branch B_PT")?;
    Ok(values([("n", Value::from(3))]))
}

fn chatty_cache(path: &Path) -> ComputationCache {
    ComputationCache::builder("chatty", chatty)
        .location(path)
        .names(["n"])
        .print_output(false)
        .build()
        .unwrap()
}

#[test]
#[serial]
fn captured_output_is_stored() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("chatty.dcache");

    let cache = chatty_cache(&path);
    let stdout = cache.stdout().unwrap().unwrap();
    assert!(stdout.contains("processing 3 files"));
    assert!(cache
        .stderr()
        .unwrap()
        .unwrap()
        .contains("warning: missing branch B_PT"));

    let reused = chatty_cache(&path);
    assert!(reused.retrieve().unwrap().is_some());
    assert_eq!(reused.stdout().unwrap(), Some(stdout));
}

#[test]
fn truncated_file_recomputes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mixed.dcache");
    let make = || {
        ComputationCache::builder("mixed", heterogeneous)
            .location(&path)
            .names(["data", "mass", "fit"])
            .capture_output(false)
            .build()
            .unwrap()
    };

    make().load().unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

    let cache = make();
    assert_eq!(cache.retrieve().unwrap(), None);
    assert!(cache.get("mass").is_ok());
    assert!(make().retrieve().unwrap().is_some());
}
