//! Integration tests for datacache

mod cache;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use datacache::{ComputationCache, ComputeResult, Inputs, Table, Value, Values};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn datacache() -> Command {
        let mut cmd = cargo_bin_cmd!("datacache");
        cmd.arg("--no-local");
        cmd
    }

    fn selection(inputs: &Inputs<'_>) -> ComputeResult {
        let cut: f64 = inputs.kwarg_as("cut")?;
        let table = Table::from_columns([
            ("B_M", vec![5279.0, 5281.5, 5366.9]),
            ("B_PT", vec![cut, 2.0 * cut, 3.0 * cut]),
        ])?;
        println!("selected {} candidates", table.n_rows());
        Ok(Values::from([
            ("data".to_string(), Value::from(table)),
            ("efficiency".to_string(), Value::from(0.875)),
        ]))
    }

    /// Write a cache file through the library and return its path
    fn make_cache(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("selection.dcache");
        let cache = ComputationCache::builder("selection", selection)
            .location(&path)
            .names(["data", "efficiency"])
            .kwarg("cut", 1500.0)
            .capture_output(false)
            .build()
            .unwrap();
        cache.load().unwrap();
        path
    }

    #[test]
    fn help_displays() {
        datacache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("memoization cache"))
            .stdout(predicate::str::contains("inspect"));
    }

    #[test]
    fn version_displays() {
        datacache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("datacache"));
    }

    #[test]
    fn inspect_lists_entries() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .arg("inspect")
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("data"))
            .stdout(predicate::str::contains("3 rows x 2 columns"))
            .stdout(predicate::str::contains("selection"))
            .stdout(predicate::str::contains("Recipe:"));
    }

    #[test]
    fn inspect_json() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        let output = datacache()
            .args(["inspect", "--format", "json"])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["kwargs"]["cut"], serde_json::json!(1500.0));
        assert_eq!(json["recipe"].as_str().unwrap().len(), 12);
        let names: Vec<_> = json["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ctime", "data", "efficiency", "stderr", "stdout"]);
    }

    #[test]
    fn inspect_plain_skips_records() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .args(["inspect", "--format", "plain"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("efficiency"))
            .stdout(predicate::str::contains("kwargs").not());
    }

    #[test]
    fn inspect_missing_file() {
        let temp = TempDir::new().unwrap();

        datacache()
            .arg("inspect")
            .arg(temp.path().join("absent.dcache"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn get_prints_json() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .arg("get")
            .arg(&path)
            .args(["efficiency", "--compact"])
            .assert()
            .success()
            .stdout("0.875\n");
    }

    #[test]
    fn get_unknown_entry() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .arg("get")
            .arg(&path)
            .arg("yields")
            .assert()
            .failure()
            .stderr(predicate::str::contains("yields"));
    }

    #[test]
    fn output_without_capture() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .arg("output")
            .arg(&path)
            .assert()
            .success()
            .stderr(predicate::str::contains("No stdout was captured"));
    }

    #[test]
    fn gc_dry_run_keeps_fresh_caches() {
        let temp = TempDir::new().unwrap();
        let path = make_cache(temp.path());

        datacache()
            .arg("gc")
            .arg(temp.path())
            .args(["--days", "1", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No caches older than 1 days"));
        assert!(path.exists());
    }

    #[test]
    fn gc_disabled() {
        let temp = TempDir::new().unwrap();

        datacache()
            .arg("gc")
            .arg(temp.path())
            .args(["--days", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("disabled"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");

        datacache()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();

        datacache()
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("gc_days = 30"));
    }

    #[test]
    fn config_set_then_show() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");

        datacache()
            .arg("--config")
            .arg(&config)
            .args(["config", "set", "cache.gc_days", "7"])
            .assert()
            .success();

        datacache()
            .env("DATACACHE_CONFIG", &config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gc_days = 7"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[cache]\ngc_days = \"weekly\"\n").unwrap();

        datacache()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }
}
