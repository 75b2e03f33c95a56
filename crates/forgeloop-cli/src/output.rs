use anyhow::Result;
use colored::Colorize;
use forgeloop_ai::{AgentReport, LastRunRecord};
use forgeloop_build::CompileReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}

fn status(ok: bool) -> colored::ColoredString {
    if ok { "ok".green().bold() } else { "failed".red().bold() }
}

pub fn print_agent_report(report: &AgentReport) {
    println!("{} {}", "Agent run".bold(), report.job_id.dimmed());
    println!("{}", report.summary);
    let calls = report.tool_log.iter().filter(|e| e.is_call()).count();
    println!(
        "exit: {}  turns: {}  tool calls: {}",
        report.exit_reason.describe(),
        report.turns,
        calls
    );
    if !report.diff_preview.is_empty() {
        println!("\n{}", "Changes".bold());
        println!("{}", report.diff_preview);
    }
}

pub fn print_compile_report(report: &CompileReport) {
    println!("{} {}: {}", "Repair loop".bold(), status(report.ok), report.message);
    for round in &report.rounds {
        let tests = match &round.tests {
            Some(result) => status(result.is_success()).to_string(),
            None => "-".dimmed().to_string(),
        };
        println!(
            "  round {}: analyze {}  tests {}  fixes {}",
            round.round,
            status(round.analyze.is_success()),
            tests,
            round.fixes_applied.len()
        );
        for fix in &round.fixes_applied {
            println!("    {} {fix}", "+".green());
        }
        for note in &round.notes {
            println!("    {} {note}", "·".dimmed());
        }
    }
}

pub fn print_last_run(record: &LastRunRecord) {
    println!(
        "{} {} ({})",
        "Last run".bold(),
        record.job_id.dimmed(),
        record.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}", record.summary);
    println!(
        "exit: {}  turns: {}  validate-only: {}",
        record.exit_reason.describe(),
        record.turns,
        record.validate_only
    );
    if !record.diff_preview.is_empty() {
        println!("\n{}", "Changes".bold());
        println!("{}", record.diff_preview);
    }
}
