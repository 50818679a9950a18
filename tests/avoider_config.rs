use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use ttc_avoider::config::AvoiderConfig;
use ttc_avoider::transport::TtcEncoding;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TTC_CONFIG",
        "TTC_CAMERA_URL",
        "TTC_FRAME_ADDR",
        "TTC_TTC_ADDR",
        "TTC_ENCODING",
        "TTC_TRAIL_SIZE",
        "TTC_MIN_PERIOD_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AvoiderConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.url, "stub://scaled");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.estimator.window_size, 5);
    assert_eq!(cfg.estimator.threshold_ratio, 0.1);
    assert_eq!(cfg.servers.frame_addr, "0.0.0.0:11111");
    assert_eq!(cfg.servers.ttc_addr, "0.0.0.0:22222");

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": { "url": "stub://hallway", "width": 320, "height": 240, "fps": 15 },
            "features": { "max_corners": 60, "quality_level": 0.2 },
            "tracking": { "window_size": 21, "max_level": 3 },
            "estimator": { "window_size": 7, "threshold_ratio": 0.2 },
            "render": { "trail_size": 10 },
            "cycle": { "min_period_ms": 50 },
            "servers": { "frame_addr": "127.0.0.1:9001", "ttc_encoding": "json", "jpeg_quality": 70 }
        }"#,
    );

    std::env::set_var("TTC_CONFIG", file.path());
    std::env::set_var("TTC_TTC_ADDR", "127.0.0.1:9002");
    std::env::set_var("TTC_TRAIL_SIZE", "4");
    std::env::set_var("TTC_MIN_PERIOD_MS", "0");

    let cfg = AvoiderConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://hallway");
    assert_eq!(
        (cfg.camera.width, cfg.camera.height, cfg.camera.fps),
        (320, 240, 15)
    );
    assert_eq!(cfg.features.max_corners, 60);
    assert_eq!(cfg.features.quality_level, 0.2);
    assert_eq!(cfg.features.block_size, 7);
    assert_eq!(cfg.tracking.window_size, 21);
    assert_eq!(cfg.tracking.max_level, 3);
    assert_eq!(cfg.tracking.max_iterations, 10);
    assert_eq!(cfg.estimator.window_size, 7);
    assert_eq!(cfg.estimator.threshold_ratio, 0.2);
    assert_eq!(cfg.trail_size, 4);
    assert_eq!(cfg.min_period, Duration::ZERO);
    assert_eq!(cfg.servers.frame_addr, "127.0.0.1:9001");
    assert_eq!(cfg.servers.ttc_addr, "127.0.0.1:9002");
    assert_eq!(cfg.servers.ttc_encoding, TtcEncoding::Json);
    assert_eq!(cfg.servers.jpeg_quality, 70);

    clear_env();
}

#[test]
fn env_encoding_overrides_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "servers": { "ttc_encoding": "json" } }"#);
    std::env::set_var("TTC_CONFIG", file.path());
    std::env::set_var("TTC_ENCODING", "binary");

    let cfg = AvoiderConfig::load().expect("load config");
    assert_eq!(cfg.servers.ttc_encoding, TtcEncoding::Binary);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "estimator": { "window_size": 0 } }"#);
    std::env::set_var("TTC_CONFIG", file.path());
    assert!(AvoiderConfig::load().is_err());
    clear_env();

    std::env::set_var("TTC_ENCODING", "base64");
    assert!(AvoiderConfig::load().is_err());
    clear_env();

    std::env::set_var("TTC_TRAIL_SIZE", "many");
    assert!(AvoiderConfig::load().is_err());
    clear_env();

    std::env::set_var("TTC_FRAME_ADDR", "localhost");
    assert!(AvoiderConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TTC_CONFIG", "/nonexistent/ttc-config.json");
    assert!(AvoiderConfig::load().is_err());

    let file = write_config("{ not json");
    std::env::set_var("TTC_CONFIG", file.path());
    assert!(AvoiderConfig::load().is_err());

    clear_env();
}
