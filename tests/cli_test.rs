//! End-to-end CLI tests
//!
//! Drive the `codemend` binary against a small C++ tree in a temp directory.
//! The Advisor is disabled so runs are deterministic and offline; build and
//! test commands are replaced with `true`/`false` where the gate matters.

use std::path::Path;
use std::process::Command;

const PLAYER_CPP: &str = r#"#include "Player.h"

// Base stats: 150 hp
void Player::reset() {
    hp = 150;
    speed = 2.5f;
    gold = 9000;
    log("Player reset");
}
"#;

const ENEMY_CPP: &str = r#"void Enemy::spawn() {
    hp = 150;
    range = 35;
}
"#;

fn codemend_bin() -> &'static str {
    env!("CARGO_BIN_EXE_codemend")
}

fn setup_project(build: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir_all(src.join("tests")).unwrap();
    std::fs::write(src.join("player.cpp"), PLAYER_CPP).unwrap();
    std::fs::write(src.join("enemy.cpp"), ENEMY_CPP).unwrap();
    std::fs::write(src.join("tests/test_player.cpp"), "int x = 4242;\n").unwrap();
    std::fs::write(
        dir.path().join("codemend.toml"),
        format!("[advisor]\nenabled = false\n\n[safety]\nrequire_tests = false\n\n{}", build),
    )
    .unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(codemend_bin())
        .args(args)
        .arg(dir)
        .env_remove("RUST_LOG")
        .env_remove("CODEMEND_CONFIG")
        .output()
        .expect("Failed to run codemend");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn read_json(dir: &Path, name: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join(".codemend").join(name)).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_scan_writes_health_report() {
    let dir = setup_project("");
    let (code, stdout, _) = run(dir.path(), &["scan"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Scanned 2 files"));

    let report = read_json(dir.path(), "health_report.json");
    assert_eq!(report["files_scanned"], 2);
    // 150, 2.5f, 9000 in player.cpp; 150, 35 in enemy.cpp; the test file is excluded
    assert_eq!(report["summary"]["magic_numbers"], 5);
    assert_eq!(report["summary"]["string_literals"], 1);
    assert_eq!(report["summary"]["duplicates"], 0);
    assert_eq!(report["issues"]["magic_numbers"][0]["id"], "MAGIC_0001");
}

#[test]
fn test_triage_requires_scan() {
    let dir = setup_project("");
    let (code, _, stderr) = run(dir.path(), &["triage"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("health_report.json"));
}

#[test]
fn test_triage_batch_size_override() {
    let dir = setup_project("");
    run(dir.path(), &["scan"]);
    let (code, _, _) = run(dir.path(), &["triage", "--batch-size", "2"]);
    assert_eq!(code, 0);

    let queue = read_json(dir.path(), "triage_queue.json");
    let batches = queue["batches"].as_array().unwrap();
    let sizes: Vec<u64> = batches.iter().map(|b| b["issue_count"].as_u64().unwrap()).collect();
    assert_eq!(sizes, vec![2, 2, 1, 1]);
    assert_eq!(batches[0]["type"], "magic_numbers");
    assert_eq!(batches[0]["batch_id"], "BATCH_001_MAGIC_NUMBERS_002");
    assert_eq!(batches[3]["type"], "string_literals");
}

#[test]
fn test_preview_run_touches_no_source() {
    let dir = setup_project("");
    let (code, _, _) = run(dir.path(), &["run"]);
    assert_eq!(code, 0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/player.cpp")).unwrap(),
        PLAYER_CPP
    );
    assert!(!dir.path().join("config/game_config.json").exists());

    let surgery = read_json(dir.path(), "surgery_results.json");
    assert_eq!(surgery["preview"], true);
    assert!(dir.path().join(".codemend/CODEMEND_REPORT.md").exists());
}

#[test]
fn test_unsupported_kind_fails() {
    let dir = setup_project("");
    run(dir.path(), &["scan"]);
    run(dir.path(), &["triage"]);
    let (code, _, stderr) = run(dir.path(), &["surgery", "--kind", "long_functions"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("only magic_numbers"));
}

#[test]
fn test_malformed_config_is_fatal() {
    let dir = setup_project("");
    std::fs::write(dir.path().join("codemend.toml"), "[limits\n").unwrap();
    let (code, _, stderr) = run(dir.path(), &["scan"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("codemend.toml"));
}

#[test]
fn test_init_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run(dir.path(), &["init"]);
    assert_eq!(code, 0);
    let text = std::fs::read_to_string(dir.path().join("codemend.toml")).unwrap();
    assert!(text.contains("[safety]"));
}

#[cfg(unix)]
#[test]
fn test_apply_run_with_passing_gate_keeps_changes() {
    let dir = setup_project("[build]\nbuild_command = [\"true\"]\n");
    let (code, _, stderr) = run(dir.path(), &["run", "--apply"]);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let player = std::fs::read_to_string(dir.path().join("src/player.cpp")).unwrap();
    assert!(player.contains("#include \"Config/Config.h\""));
    assert!(player.contains("hp = config.general.value_"));
    // Comment text is never rewritten
    assert!(player.contains("// Base stats: 150 hp"));
    assert!(dir.path().join("config/game_config.json").exists());
    assert!(dir.path().join("include/Config/Config.h").exists());

    let validation = read_json(dir.path(), "validation_report.json");
    assert_eq!(validation["build_status"], "success");
    assert_eq!(validation["test_status"], "skipped");
    assert_eq!(validation["final_state"], "build_ok");

    let report = std::fs::read_to_string(dir.path().join(".codemend/CODEMEND_REPORT.md")).unwrap();
    assert!(report.contains("### Build: PASSED"));
    assert!(report.contains("## Modified Files"));
}

#[cfg(unix)]
#[test]
fn test_apply_run_with_failing_build_rolls_back() {
    let dir = setup_project("[build]\nbuild_command = [\"false\"]\n");
    let (code, _, _) = run(dir.path(), &["run", "--apply"]);
    assert_eq!(code, 1);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/player.cpp")).unwrap(),
        PLAYER_CPP
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/enemy.cpp")).unwrap(),
        ENEMY_CPP
    );
    assert!(!dir.path().join("config/game_config.json").exists());
    assert!(!dir.path().join("include/Config/Config.h").exists());
    assert!(!dir.path().join("src/Config/Config.cpp").exists());

    let validation = read_json(dir.path(), "validation_report.json");
    assert_eq!(validation["build_status"], "failed");
    assert_eq!(validation["final_state"], "build_failed");
    assert_eq!(validation["rollback"]["files_restored"].as_array().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_required_tests_failing_rolls_back() {
    let dir = setup_project(
        "[build]\nbuild_command = [\"true\"]\ntest_command = [\"sh\", \"-c\", \"echo '[  FAILED  ] Combat.Crit'; exit 1\"]\n",
    );
    let toml = std::fs::read_to_string(dir.path().join("codemend.toml"))
        .unwrap()
        .replace("require_tests = false", "require_tests = true");
    std::fs::write(dir.path().join("codemend.toml"), toml).unwrap();

    let (code, _, _) = run(dir.path(), &["run", "--apply"]);
    assert_eq!(code, 1);
    let validation = read_json(dir.path(), "validation_report.json");
    assert_eq!(validation["test_status"], "failed");
    assert_eq!(validation["test_failures"][0], "Combat.Crit");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("src/player.cpp")).unwrap(),
        PLAYER_CPP
    );
}

#[cfg(unix)]
#[test]
fn test_verify_writes_baseline() {
    let dir = setup_project("[build]\nbuild_command = [\"sh\", \"-c\", \"echo 'a.cpp: warning: unused'\"]\n");
    let (code, _, _) = run(dir.path(), &["verify"]);
    assert_eq!(code, 0);
    let baseline = read_json(dir.path(), "validation_baseline.json");
    assert_eq!(baseline["warnings_after"], 1);
}

#[cfg(unix)]
#[test]
fn test_commands_after_auto_rollback_leave_new_work_alone() {
    let dir = setup_project("[build]\nbuild_command = [\"false\"]\n");
    let (code, _, _) = run(dir.path(), &["run", "--apply"]);
    assert_eq!(code, 1);
    assert_eq!(read_json(dir.path(), "surgery_results.json")["rolled_back"], true);

    let edited = PLAYER_CPP.replace("hp = 150;", "hp = 175;");
    std::fs::write(dir.path().join("src/player.cpp"), &edited).unwrap();
    let toml = std::fs::read_to_string(dir.path().join("codemend.toml"))
        .unwrap()
        .replace("build_command = [\"false\"]", "build_command = [\"true\"]");
    std::fs::write(dir.path().join("codemend.toml"), toml).unwrap();

    let (code, stdout, _) = run(dir.path(), &["validate"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("rolled back"));
    assert_eq!(read_json(dir.path(), "validation_report.json")["build_status"], "failed");

    let (code, _, _) = run(dir.path(), &["rollback"]);
    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(dir.path().join("src/player.cpp")).unwrap(), edited);
}
