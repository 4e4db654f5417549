//! Config load validation tests for nmos-testing-config.
// crates/nmos-testing-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards, defaults, and surface loading.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;

use nmos_testing_config::ConfigError;
use nmos_testing_config::DEFAULT_OMIT_PATH;
use nmos_testing_config::TestingConfig;
use nmos_testing_core::BoundaryStrictness;
use nmos_testing_core::ExpansionPolicy;
use nmos_testing_core::HttpMethod;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

const MINIMAL: &str = r#"
[apis.node]
base_url = "http://127.0.0.1:8080/x-nmos/node/v1.2/"
version = "v1.2"
surface = "node.json"
"#;

fn assert_invalid(result: Result<TestingConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn with_section(extra: &str) -> String {
    format!("{MINIMAL}\n{extra}")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(TestingConfig::load(Some(path)), "config path component too long")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(TestingConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(TestingConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn defaults_match_protocol_constants() -> TestResult {
    let config = TestingConfig::from_toml_str(MINIMAL).map_err(|err| err.to_string())?;
    let session = &config.session;
    if session.heartbeat_interval_ms != 5_000 || session.heartbeat_timeout_ms != 12_000 {
        return Err("unexpected heartbeat defaults".to_string());
    }
    if config.session.open_timeout_ms != 1_000 || config.session.pre_timeout_margin_ms != 1_000 {
        return Err("unexpected open/margin defaults".to_string());
    }
    if config.session.boundary_strictness != BoundaryStrictness::WindowEnd {
        return Err("boundary strictness should default to window_end".to_string());
    }
    if config.crawler.expansion != ExpansionPolicy::First {
        return Err("expansion should default to first".to_string());
    }
    if config.crawler.omit_paths != [DEFAULT_OMIT_PATH] {
        return Err(format!("unexpected omit paths {:?}", config.crawler.omit_paths));
    }
    Ok(())
}

#[test]
fn policies_parse_from_snake_case() -> TestResult {
    let text = with_section(
        "[crawler]\nexpansion = \"all\"\nomit_paths = []\n[session]\nboundary_strictness = \
         \"every_poll\"\n",
    );
    let config = TestingConfig::from_toml_str(&text).map_err(|err| err.to_string())?;
    if config.crawler.expansion != ExpansionPolicy::All {
        return Err("expected expansion all".to_string());
    }
    if config.session.boundary_strictness != BoundaryStrictness::EveryPoll {
        return Err("expected every_poll".to_string());
    }
    if !config.crawler.omit_paths.is_empty() {
        return Err("explicit empty omit list must be kept".to_string());
    }
    Ok(())
}

#[test]
fn rejects_missing_apis() -> TestResult {
    assert_invalid(TestingConfig::from_toml_str(""), "at least one [apis.<name>]")
}

#[test]
fn rejects_non_http_base_url() -> TestResult {
    let text = MINIMAL.replace("http://127.0.0.1:8080", "ftp://127.0.0.1:8080");
    assert_invalid(TestingConfig::from_toml_str(&text), "must use http:// or https://")
}

#[test]
fn rejects_malformed_version() -> TestResult {
    let text = MINIMAL.replace("version = \"v1.2\"", "version = \"1.2\"");
    assert_invalid(TestingConfig::from_toml_str(&text), "version must look like")
}

#[test]
fn rejects_unknown_fields() -> TestResult {
    let text = with_section("[http]\ntimeout = 5\n");
    assert_invalid(TestingConfig::from_toml_str(&text), "config parse error")
}

#[test]
fn rejects_interval_not_below_timeout() -> TestResult {
    let text =
        with_section("[session]\nheartbeat_interval_ms = 12000\nheartbeat_timeout_ms = 12000\n");
    assert_invalid(TestingConfig::from_toml_str(&text), "must be less than heartbeat_timeout_ms")
}

#[test]
fn rejects_zero_poll_interval() -> TestResult {
    let text = with_section("[session]\npoll_interval_ms = 0\n");
    assert_invalid(
        TestingConfig::from_toml_str(&text),
        "poll_interval_ms must be greater than zero",
    )
}

#[test]
fn rejects_poll_interval_above_heartbeat() -> TestResult {
    let text = with_section("[session]\npoll_interval_ms = 6000\n");
    assert_invalid(TestingConfig::from_toml_str(&text), "must not exceed heartbeat_interval_ms")
}

#[test]
fn rejects_relative_omit_path() -> TestResult {
    let text = with_section("[crawler]\nomit_paths = [\"senders\"]\n");
    assert_invalid(TestingConfig::from_toml_str(&text), "must start with '/'")
}

#[test]
fn load_resolves_surfaces_relative_to_config_dir() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let manifest = r#"{"resources": [
        {"path": "/senders", "method": "GET", "responses": {"200": "senders.json"}},
        {"path": "/senders/{senderId}", "method": "GET", "responses": {"200": "sender.json"}}
    ]}"#;
    fs::write(dir.path().join("node.json"), manifest).map_err(|err| err.to_string())?;
    let config_text = with_section("[schemas]\nroot = \"schemas\"\n[log]\npath = \"run.log\"\n");
    let config_path = dir.path().join("nmos-testing.toml");
    fs::write(&config_path, config_text).map_err(|err| err.to_string())?;

    let config = TestingConfig::load(Some(&config_path)).map_err(|err| err.to_string())?;
    if config.schema_root() != dir.path().join("schemas") {
        return Err(format!("unexpected schema root {}", config.schema_root().display()));
    }
    if config.log_path() != Some(dir.path().join("run.log")) {
        return Err("log path should resolve against config dir".to_string());
    }
    let surfaces = config.load_surfaces().map_err(|err| err.to_string())?;
    let node = surfaces.get("node").ok_or("missing node surface")?;
    if node.base_url() != "http://127.0.0.1:8080/x-nmos/node/v1.2" {
        return Err(format!("unexpected base url {}", node.base_url()));
    }
    if node.spec_branch() != "v1.2.x" {
        return Err(format!("unexpected branch {}", node.spec_branch()));
    }
    let item = node.resource(HttpMethod::Get, "/senders/{senderId}").ok_or("missing resource")?;
    if item.params.len() != 1 || item.params[0].name != "senderId" {
        return Err("params should derive from template".to_string());
    }
    Ok(())
}

#[test]
fn load_surfaces_reports_missing_manifest() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let config_path = dir.path().join("nmos-testing.toml");
    fs::write(&config_path, MINIMAL).map_err(|err| err.to_string())?;
    let config = TestingConfig::load(Some(&config_path)).map_err(|err| err.to_string())?;
    match config.load_surfaces() {
        Err(ConfigError::Io(message)) if message.contains("apis.node.surface") => Ok(()),
        Err(other) => Err(format!("unexpected error {other}")),
        Ok(_) => Err("expected missing manifest error".to_string()),
    }
}
