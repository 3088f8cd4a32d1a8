//! Integration tests for the command line (-e/--formula, -r/--reconstruct)

use std::path::Path;
use std::process::Command;

fn run_command(config_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_tickcell"))
        // Tests must be deterministic and not depend on a user's ~/.config/tickcell/config.toml.
        .arg("--config")
        .arg(config_dir.join("config.toml"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn sales_csv(dir: &Path) -> String {
    let path = dir.join("sales.csv");
    std::fs::write(&path, "Region,Revenue\nEast,100\nWest,250\nNorth,50\n").unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_transform_single_span() {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path());
    let (stdout, stderr, code) = run_command(dir.path(), &["-e", "=`sum(Revenue)`", &csv]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "cell: Sheet1!A6",
            r#"wrapper: =LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0)"#,
            "value: 400",
            "source: =`sum(Revenue)`",
        ]
    );
}

#[test]
fn test_transform_two_spans() {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path());
    let (stdout, _, code) = run_command(
        dir.path(),
        &["-e", "=`sum(Revenue)` / `count(Region)`", &csv],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains(
        r#"wrapper: =LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip1, SNIPPET("count(Region)", A1:B4), _snip0 / _snip1)"#
    ));
    assert!(stdout.contains("value: 133.333333"));
    assert!(stdout.contains("source: =`sum(Revenue)` / `count(Region)`"));
}

#[test]
fn test_transform_spills_column() {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path());
    let (stdout, _, code) = run_command(
        dir.path(),
        &["-e", "=`Revenue.filter(|r| r > 60)`", &csv],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("value:\n100\n250\n"));
}

#[test]
fn test_reconstruct() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_command(
        dir.path(),
        &["-r", r#"=LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0)"#],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "=`sum(Revenue)`");
}

#[test]
fn test_reconstruct_rejects_plain_formula() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_command(dir.path(), &["-r", "=SUM(A1:A3)"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not a wrapper formula"));
}

#[test]
fn test_unknown_header_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path());
    let (stdout, stderr, code) = run_command(dir.path(), &["-e", "=`sum(Revnue)`", &csv]);
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("formula rejected"));
    assert!(stderr.contains("Revnue"));
}

#[test]
fn test_operation_limit_from_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "max_operations = 1000\n").unwrap();
    let (stdout, _, code) = run_command(
        dir.path(),
        &["-e", "=`let x = 0; loop { x += 1; }`"],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("value: #CALC!"));
}

#[test]
fn test_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "cache_capacity = \"lots\"\n").unwrap();
    let (_, stderr, code) = run_command(dir.path(), &["-e", "=`1 + 1`"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("failed to load"));
}

#[test]
fn test_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_command(dir.path(), &[]);
    assert_eq!(code, 2);
    assert!(stderr.contains("Nothing to do"));
}
