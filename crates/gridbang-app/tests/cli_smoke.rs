use std::fs;
use std::process::{Command, Output};

use anyhow::Result;
use serde::Deserialize;
use tempfile::tempdir;

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct ConfigDto {
    width: u32,
    height: u32,
    rng_seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TickRecordDto {
    tick: u64,
    commands_fired: usize,
    notes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReportSummaryDto {
    ticks_simulated: u64,
    notes_emitted: usize,
}

#[derive(Debug, Deserialize)]
struct HeadlessReportDto {
    config: ConfigDto,
    ticks: Vec<TickRecordDto>,
    summary: ReportSummaryDto,
    final_grid: String,
}

fn gridbang() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gridbang"));
    cmd.env("RUST_LOG", "off")
        .env_remove("GRIDBANG_SEED")
        .env_remove("GRIDBANG_TICKS");
    cmd
}

fn stdout_of(output: Output) -> String {
    assert!(output.status.success(), "gridbang failed: {output:?}");
    String::from_utf8(output.stdout).expect("utf8 stdout")
}

#[test]
fn run_prints_notes_and_writes_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let program = dir.path().join("melody.txt");
    fs::write(&program, "G11.R0b.O0?3?1\n")?;
    let report_path = dir.path().join("out/report.json");
    let saved = dir.path().join("final.txt");

    let output = gridbang()
        .arg("run")
        .arg(&program)
        .args(["--ticks", "8", "--width", "4", "--height", "16"])
        .arg("--report")
        .arg(&report_path)
        .arg("--save")
        .arg(&saved)
        .output()?;
    let stdout = stdout_of(output);
    assert_eq!(stdout.lines().count(), 6, "{stdout}");
    assert!(stdout.lines().all(|l| l.starts_with("tick")));

    let report: HeadlessReportDto = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    assert_eq!(report.config.width, 4);
    assert_eq!(report.config.rng_seed, Some(42));
    assert_eq!(report.summary.ticks_simulated, 8);
    assert_eq!(report.summary.notes_emitted, 6);
    assert_eq!(report.ticks.len(), 8);
    assert_eq!(report.ticks[0].tick, 1);
    assert!(report.ticks.iter().all(|t| t.commands_fired >= 1));
    assert!(report.ticks[..2].iter().all(|t| t.notes.is_empty()));

    let text = fs::read_to_string(&saved)?;
    assert_eq!(text, report.final_grid);
    assert_eq!(text.lines().count(), 4);
    assert_eq!(&text[..3], "G11");
    assert_eq!(&text[4..7], "R0b");
    assert_eq!(&text[8..14], "O0?3?1");
    Ok(())
}

#[test]
fn seed_from_environment_is_reproducible() -> Result<()> {
    let dir = tempdir()?;
    let program = dir.path().join("dice.txt");
    fs::write(&program, "G1..R0z.O0?3?1")?;

    let run = |seed: &str| -> Result<String> {
        let output = gridbang()
            .env("GRIDBANG_SEED", seed)
            .env("GRIDBANG_TICKS", "24")
            .arg("run")
            .arg(&program)
            .output()?;
        Ok(stdout_of(output))
    };
    let first = run("1234")?;
    assert_eq!(first.lines().count(), 22);
    assert_eq!(first, run("1234")?);
    assert_ne!(first, run("4321")?);
    Ok(())
}

#[test]
fn dump_prints_ruler_and_cells() -> Result<()> {
    let dir = tempdir()?;
    let program = dir.path().join("tiny.txt");
    fs::write(&program, "1>\n")?;

    let output = gridbang()
        .arg("dump")
        .arg(&program)
        .args(["--width", "1", "--height", "4"])
        .output()?;
    assert_eq!(stdout_of(output), "0123456789abcdef\n1>..\n");
    Ok(())
}

#[test]
fn config_file_sets_dimensions() -> Result<()> {
    let dir = tempdir()?;
    let program = dir.path().join("tiny.txt");
    fs::write(&program, "1>")?;
    let config = dir.path().join("grid.json");
    fs::write(&config, r#"{"width": 2, "height": 3}"#)?;

    let output = gridbang()
        .arg("dump")
        .arg(&program)
        .arg("--config")
        .arg(&config)
        .output()?;
    assert_eq!(stdout_of(output), "0123456789abcdef\n1>....\n");
    Ok(())
}

#[test]
fn missing_program_fails() -> Result<()> {
    let output = gridbang()
        .args(["run", "/nonexistent/gridbang/program.txt"])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
