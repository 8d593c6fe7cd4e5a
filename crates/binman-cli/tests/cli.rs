use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

fn binman(args: &[&str]) -> std::io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_binman"))
        .args(args)
        .env_remove("BINMAN_CONFIG")
        .env("RUST_LOG", "error")
        .output()
}

#[test]
fn config_command_prints_effective_configuration() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.yaml");
    fs::write(
        &path,
        "config:\n  releasepath: /opt/binman\nreleases:\n  - repo: anchore/syft\n    os: linux\n    arch: arm64\n",
    )?;
    let config = path.display().to_string();

    let output = binman(&["--config", &config, "--output", "json", "config"])?;
    assert!(output.status.success(), "{output:?}");
    let document: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(document["config"]["releasepath"], "/opt/binman");
    assert_eq!(document["releases"][0]["repo"], "anchore/syft");
    assert_eq!(document["releases"][0]["source"], "github.com");
    assert_eq!(document["releases"][0]["arch"], "arm64");

    let output = binman(&["--config", &config, "config"])?;
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout)?;
    assert!(text.contains("releasepath: /opt/binman"));
    assert!(text.contains("querytype: release"));
    Ok(())
}

#[test]
fn missing_configuration_exits_with_validation_code() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let config = temp.path().join("absent.yaml").display().to_string();
    let output = binman(&["--config", &config, "sync"])?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stderr)?.contains("not found"));
    Ok(())
}

#[test]
fn invalid_configuration_names_the_problem() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.yaml");
    fs::write(
        &path,
        "releases:\n  - repo: anchore/syft\n  - repo: anchore/syft\n",
    )?;
    let output = binman(&["--config", &path.display().to_string(), "sync"])?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stderr)?.contains("duplicate release entry: anchore/syft"));
    Ok(())
}

#[test]
fn get_rejects_malformed_repository() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let config = temp.path().join("absent.yaml").display().to_string();
    let output = binman(&["--config", &config, "get", "syft"])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[cfg(unix)]
#[test]
fn config_edit_runs_the_editor_on_the_file() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("config.yaml");
    let config = path.display().to_string();

    let output = Command::new(env!("CARGO_BIN_EXE_binman"))
        .args(["--config", &config, "config", "edit"])
        .env("EDITOR", "true")
        .env("RUST_LOG", "error")
        .output()?;
    assert!(output.status.success(), "{output:?}");
    assert!(fs::read_to_string(&path)?.contains("releasepath"));

    let output = Command::new(env!("CARGO_BIN_EXE_binman"))
        .args(["--config", &config, "config", "edit"])
        .env("EDITOR", "")
        .env("RUST_LOG", "error")
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}
