// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/ban_threshold.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/ban_threshold.yaml --seed 1234

mod group_chat;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use simple_logger::SimpleLogger;

use group_chat::{ScenarioFile, ScenarioRunner};

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/ban_threshold.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/ban_threshold.yaml --seed 1234", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    // Parse optional seed
    let seed: Option<u64> = if args.len() >= 4 && args[2] == "--seed" {
        match args[3].parse() {
            Ok(seed) => Some(seed),
            Err(e) => {
                eprintln!("Invalid seed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    if path.is_file() {
        if !run_scenario_file(path, seed) {
            std::process::exit(1);
        }
    } else if path.is_dir() {
        run_scenario_directory(path, seed);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<u64>) {
    let mut scenarios = Vec::new();

    // Find all .yaml files
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("yaml")
                || path.extension().and_then(|s| s.to_str()) == Some("yml")
            {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                 ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut failures = 0;
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!(
            "\n{}/{} Running: {}\n",
            i + 1,
            scenarios.len(),
            scenario_path.display()
        );
        if !run_scenario_file(scenario_path, seed) {
            failures += 1;
        }
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    if failures > 0 {
        eprintln!("{} scenario(s) failed validation", failures);
        std::process::exit(1);
    }
}

fn run_scenario_file(path: &Path, seed: Option<u64>) -> bool {
    println!("Loading scenario from: {}", path.display());

    // Load and parse YAML
    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    // Print scenario header
    println!("\n╔════════════════════════════════════════════════════════╗");
    if let Some(ref name) = scenario.meta.name {
        println!("║  {}  {}", name, " ".repeat(54_usize.saturating_sub(name.len())));
    } else {
        println!("║  Scenario: {}  ", path.file_stem().unwrap().to_str().unwrap());
    }
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    println!("Configuration:");
    println!("  Groups: {}", scenario.groups.len());
    println!("  Threshold: {}", scenario.config.moderation.threshold);
    println!(
        "  Inline Filtered Terms: {}",
        scenario.config.moderation.filtered_terms.len()
    );
    println!("\nStarting sessions...\n");

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Run all group sessions
    let runner = ScenarioRunner::new(scenario, base_dir, seed);
    let result = match runner.run() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Scenario failed to start: {}", e);
            return false;
        }
    };

    // Print results
    result.print_summary();

    if result.all_valid() {
        println!("\n✓ Scenario complete!\n");
        true
    } else {
        false
    }
}
