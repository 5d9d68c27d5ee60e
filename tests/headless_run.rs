use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use drift::app;
use drift::cli::Args;

fn unique_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "drift_headless_{}_{}",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    p
}

fn args(config: &str, json: Option<String>, seed: u64) -> Args {
    Args {
        config: config.to_string(),
        seed: Some(seed),
        duration: Some(120.0),
        tick_ms: Some(50),
        realtime: false,
        json,
    }
}

#[test]
fn offline_run_writes_a_json_lines_log() {
    let config = unique_path("config.toml");
    let json = unique_path("log.jsonl");
    let stop = Arc::new(AtomicBool::new(false));

    let summary = app::run(
        &args(
            &config.to_string_lossy(),
            Some(json.to_string_lossy().to_string()),
            11,
        ),
        &stop,
    )
    .expect("run");
    assert!(config.exists(), "default config should be written");
    assert_eq!(summary.ticks, 2_400);
    assert_eq!(summary.performed_ms, 120_000);
    assert!(!summary.interrupted);
    assert!(summary.triggers.get("Texture").copied().unwrap_or(0) >= 1);

    let text = fs::read_to_string(&json).expect("log");
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(records.len(), summary.records);
    let inits = records.iter().filter(|r| r["event"] == "init").count();
    let disposes = records.iter().filter(|r| r["event"] == "dispose").count();
    assert_eq!(inits, 3);
    assert_eq!(disposes, 3);
    assert!(
        records
            .windows(2)
            .all(|w| w[0]["at_ms"].as_u64() <= w[1]["at_ms"].as_u64())
    );

    let _ = fs::remove_file(&config);
    let _ = fs::remove_file(&json);
}

#[test]
fn same_seed_same_performance() {
    let config = unique_path("seeded.toml");
    let stop = Arc::new(AtomicBool::new(false));
    let a = app::run(&args(&config.to_string_lossy(), None, 5), &stop).expect("run a");
    let b = app::run(&args(&config.to_string_lossy(), None, 5), &stop).expect("run b");
    assert_eq!(a.triggers, b.triggers);
    assert_eq!(a.records, b.records);
    assert_eq!(a.final_state, b.final_state);
    let _ = fs::remove_file(&config);
}

#[test]
fn stop_flag_interrupts_the_run() {
    let config = unique_path("interrupted.toml");
    let stop = Arc::new(AtomicBool::new(true));
    let summary = app::run(&args(&config.to_string_lossy(), None, 1), &stop).expect("run");
    assert!(summary.interrupted);
    assert_eq!(summary.ticks, 0);
    let _ = fs::remove_file(&config);
}
