use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast sim config: no settle time, every cavity 45 kHz cold target.
const BASE: &str = r#"
[stepper]
poll_ms = 1
motion_timeout_ms = 1000

[autotune]
settle_ms = 0

[monitor]
interval_ms = 1

[sim]
detune_hz = 0.0
df_cold_hz = 45000.0
nsteps_park = 777.0
"#;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, format!("{BASE}\n{extra}")).unwrap();
    path
}

fn tuner(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("tuner_cli").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok: 296 cavities", "stdout")]
#[case(&["cold", "--cm", "02", "--cavity", "1"], 0, "CM02 cavity 1: Cold via frequency tuning", "stdout")]
#[case(&["park", "--cm", "H1", "--cavity", "4"], 0, "CMH1 cavity 4: Parked via frequency tuning, recorded NSTEPS_PARK", "stdout")]
#[case(&["cold"], 2, "required", "stderr")]
#[case(&["cold", "--cm", "02", "--cavity", "9"], 2, "9", "stderr")]
#[case(&["cold", "--cm", "99"], 1, "Cryomodule 99 does not exist", "stderr")]
#[case(&["migrate-park-steps", "--cm", "05"], 0, "CM05 cavity 8: NSTEPS_COLD = 777", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = tuner(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[sim]\nhw_mode = \"offline\"", &[], 5, "hardware mode Offline")]
#[case(
    "[[sim.cavity]]\ncm = \"02\"\ncavity = 1\ndf_cold_hz = 0.0\nnsteps_cold = 120000.0\ntune_config = \"parked\"",
    &[],
    6,
    "needs the cavity at resonance"
)]
#[case(
    "[[sim.cavity]]\ncm = \"02\"\ncavity = 1\ndf_cold_hz = 0.0\nnsteps_cold = 120000.0\ntune_config = \"parked\"",
    &["--count-current"],
    0,
    "Cold via step tuning, recorded DF_COLD"
)]
#[case(
    "[[sim.cavity]]\ncm = \"02\"\ncavity = 1\ndf_cold_hz = 0.0\nnsteps_cold = 9000000.0",
    &[],
    3,
    "exceeds the 5000000 step limit"
)]
fn landing_failures_map_to_exit_codes(
    #[case] extra: &str,
    #[case] flags: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
) {
    let dir = tempdir().unwrap();
    // A second [sim] table would be a TOML error, so offline mode is
    // injected by replacing the base section.
    let cfg = if extra.starts_with("[sim]") {
        let path = dir.path().join("cfg.toml");
        let text = BASE.replace("[sim]", extra);
        fs::write(&path, text).unwrap();
        path
    } else {
        write_config(&dir, extra)
    };

    let mut cmd = tuner(&cfg);
    cmd.args(["cold", "--cm", "02", "--cavity", "1"]).args(flags);
    cmd.assert()
        .code(exit_code)
        .stdout(predicate::str::contains(needle));
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[stepper]\nmax_steps = 0\n").unwrap();
    tuner(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("stepper.max_steps must be >= 1"));
}

#[test]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    tuner(&dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file could not be read"));
}

#[test]
fn report_prints_table_and_writes_csv() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        "[[sim.cavity]]\ncm = \"02\"\ncavity = 2\ntune_config = \"cold\"\nhw_mode = \"maintenance_done\"",
    );
    let csv = dir.path().join("report.csv");

    tuner(&cfg)
        .args(["report", "--cm", "02", "--csv"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tune Config"))
        .stdout(predicate::str::contains("Maintenance Done"));

    let text = fs::read_to_string(&csv).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(
        lines[0],
        "Cryomodule,Cavity,Tune Config,Steps to Cold Landing,DF Cold,HW Mode"
    );
    assert!(lines[2].starts_with("02,2,Cold,"));
}

#[test]
fn import_averages_clean_windows_only() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let archive = dir.path().join("archive.csv");
    fs::write(
        &archive,
        "channel,timestamp_s,value\n\
         ACCL:L1B:0210:RFMODE,10,4\n\
         ACCL:L1B:0210:RFSTATE,10,1\n\
         ACCL:L1B:0210:DFBEST,20,-48000\n\
         ACCL:L1B:0210:DFBEST,30,-50000\n\
         ACCL:L1B:0210:DFBEST,500,1\n\
         ACCL:L1B:0220:RFMODE,10,4\n\
         ACCL:L1B:0220:RFMODE,40,2\n\
         ACCL:L1B:0220:RFSTATE,10,1\n\
         ACCL:L1B:0220:DFBEST,20,-48000\n",
    )
    .unwrap();

    tuner(&cfg)
        .args(["import", "--start", "0", "--end", "100", "--cm", "02", "--archive"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("CM02 cavity 1: DF_COLD = -49000 Hz"))
        .stdout(predicate::str::contains(
            "CM02 cavity 2: skipped (RF mode had 2 distinct values)",
        ))
        .stdout(predicate::str::contains(
            "CM02 cavity 3: skipped (RF mode had 0 distinct values)",
        ));
}

#[test]
fn import_reports_bad_archive_header() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let archive = dir.path().join("archive.csv");
    fs::write(&archive, "pv,time,value\nX,1,2\n").unwrap();

    tuner(&cfg)
        .args(["import", "--start", "0", "--end", "1", "--archive"])
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers in archive CSV"));
}
