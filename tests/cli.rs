use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_script(source: &str) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(".lua")
        .tempfile()
        .expect("temp script");
    tmp.write_all(source.as_bytes()).expect("write script");
    tmp
}

#[test]
fn cli_runs_update_every_frame_and_prints_result() {
    let script = write_script(
        r#"
local total = 0
function update(dt)
  total = total + dt
  local v = Vector3.add(Vector3(total, 0, 0), {0, 1, 0})
  result = Vector3.x(v) + Vector3.y(v)
end
"#,
    );
    let mut cmd = Command::cargo_bin("crown-lua").expect("binary exists");
    cmd.arg(script.path())
        .args(["--frames", "4", "--dt", "0.5", "--summary-only"]);
    cmd.assert()
        .success()
        .stdout(contains("Ran 4 frame(s)"))
        .stdout(contains("Camera position (0.00, 1.00, 5.00)"))
        .stdout(contains("result = 3"))
        .stdout(contains("frame 0").not());
}

#[test]
fn cli_reports_temporaries_returned_through_globals() {
    let script = write_script(
        r#"
function update(dt)
  result = Quaternion.rotate(Quaternion(Vector3(0, 0, 1), 0), Vector3(1, 2, 3))
end
"#,
    );
    let mut cmd = Command::cargo_bin("crown-lua").expect("binary exists");
    cmd.arg(script.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("result = (1.00, 2.00, 3.00)"));
}

#[test]
fn cli_moves_camera_with_held_keys() {
    let script = write_script("Camera.set_speed(Camera.speed() * 2)\n");
    let mut cmd = Command::cargo_bin("crown-lua").expect("binary exists");
    cmd.arg(script.path())
        .args(["--frames", "2", "--dt", "0.25", "--hold", "W"]);
    cmd.assert()
        .success()
        .stdout(contains("frame 0: camera=(0.00, 1.00, 2.50)"))
        .stdout(contains("frame 1: camera=(0.00, 1.00, 0.00)"))
        .stdout(contains("Camera position (0.00, 1.00, 0.00)"));
}

#[test]
fn cli_counts_frames_where_update_fails() {
    let script = write_script("function update(dt) error('bad frame') end\n");
    let mut cmd = Command::cargo_bin("crown-lua").expect("binary exists");
    cmd.arg(script.path()).args(["--frames", "3", "--summary-only"]);
    cmd.assert()
        .success()
        .stdout(contains("update failed on 3 frame(s)"));
}

#[test]
fn cli_fails_on_script_errors_and_bad_arguments() {
    let script = write_script("return (1 +\n");
    Command::cargo_bin("crown-lua")
        .expect("binary exists")
        .arg(script.path())
        .assert()
        .failure()
        .stderr(contains("failed to run"));

    Command::cargo_bin("crown-lua")
        .expect("binary exists")
        .arg(script.path())
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));

    Command::cargo_bin("crown-lua")
        .expect("binary exists")
        .assert()
        .failure()
        .stderr(contains("Usage: crown-lua"));
}
