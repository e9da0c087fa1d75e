use std::path::Path;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use pedestrian_assistant::config::AssistantConfig;
use pedestrian_assistant::Delegate;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PEDESTRIAN_CONFIG",
        "PEDESTRIAN_MODEL_PATH",
        "PEDESTRIAN_LABELS_PATH",
        "PEDESTRIAN_THRESHOLD",
        "PEDESTRIAN_NUM_THREADS",
        "PEDESTRIAN_MAX_RESULTS",
        "PEDESTRIAN_DELEGATE",
        "PEDESTRIAN_BACKEND",
        "PEDESTRIAN_SOURCE",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AssistantConfig::load().expect("load config");
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.detector.confidence_threshold(), 0.5);
    assert_eq!(cfg.detector.num_threads(), 2);
    assert_eq!(cfg.detector.max_results(), 3);
    assert_eq!(cfg.detector.delegate(), Delegate::Cpu);
    assert_eq!(cfg.source.uri, "stub://camera");
    assert_eq!(cfg.source.rotation_degrees, 90);
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "detector": {
                "backend": "stub",
                "model_path": "models/street.onnx",
                "threshold": 0.6,
                "num_threads": 4,
                "max_results": 5,
                "delegate": "gpu"
            },
            "source": {
                "uri": "stub://front",
                "target_fps": 15,
                "width": 320,
                "height": 240,
                "rotation_degrees": 270
            }
        }"#,
    );

    std::env::set_var("PEDESTRIAN_CONFIG", file.path());
    std::env::set_var("PEDESTRIAN_THRESHOLD", "0.75");
    std::env::set_var("PEDESTRIAN_DELEGATE", "NNAPI");
    std::env::set_var("PEDESTRIAN_MAX_RESULTS", "");

    let cfg = AssistantConfig::load().expect("load config");

    assert_eq!(cfg.detector.model_path(), Path::new("models/street.onnx"));
    assert_eq!(cfg.detector.confidence_threshold(), 0.75);
    assert_eq!(cfg.detector.num_threads(), 4);
    assert_eq!(cfg.detector.max_results(), 5);
    assert_eq!(cfg.detector.delegate(), Delegate::Nnapi);
    assert_eq!(cfg.source.uri, "stub://front");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.source.rotation_degrees, 270);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[detector]
threshold = 0.4
labels_path = "models/labels.txt"

[source]
uri = "stub://rear"
"#,
    );
    std::env::set_var("PEDESTRIAN_BACKEND", "stub");
    std::env::set_var("PEDESTRIAN_SOURCE", "stub://side");

    let cfg = AssistantConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.detector.confidence_threshold(), 0.4);
    assert_eq!(
        cfg.detector.labels_path(),
        Some(Path::new("models/labels.txt"))
    );
    assert_eq!(cfg.detector.max_results(), 3);
    assert_eq!(cfg.source.uri, "stub://side");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PEDESTRIAN_THRESHOLD", "1.5");
    assert!(AssistantConfig::load().is_err());
    clear_env();

    std::env::set_var("PEDESTRIAN_NUM_THREADS", "0");
    assert!(AssistantConfig::load().is_err());
    clear_env();

    std::env::set_var("PEDESTRIAN_DELEGATE", "tpu");
    assert!(AssistantConfig::load().is_err());
    clear_env();

    let unknown = write_config(".json", r#"{ "detector": { "thresh": 0.5 } }"#);
    assert!(AssistantConfig::load_from(Some(unknown.path())).is_err());

    let rotation = write_config(".json", r#"{ "source": { "rotation_degrees": 45 } }"#);
    assert!(AssistantConfig::load_from(Some(rotation.path())).is_err());

    assert!(AssistantConfig::load_from(Some(Path::new("/nonexistent/assistant.json"))).is_err());
}
