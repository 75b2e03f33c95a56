use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("no api key") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Set your API key with:");
        eprintln!("  {} export OPENAI_API_KEY=<value>", "$".dimmed());
    }

    if msg.contains("binary not found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Point FLUTTER_BIN at the toolchain or add it to PATH.");
    }

    if msg.contains("no agent run recorded") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Start one with:");
        eprintln!("  {} forgeloop agent <spec.json>", "$".dimmed());
    }

    std::process::exit(1);
}
