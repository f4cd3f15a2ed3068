use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

const DEFAULT_TEMPLATE_PATH: &str = "infra/dist/beacon_stack.template.json";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the beacon stack workspace",
    long_about = "A unified CLI for validating and synthesizing the Beacon\n\
                  stack and running CI checks in this workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack config
    Validate {
        /// Stack config file
        #[arg(long, env = "BEACON_STACK_CONFIG", default_value = "infra/beacon_stack.toml")]
        config: String,
    },
    /// Render the deployment template into infra/dist
    Synth {
        /// Stack config file
        #[arg(long, env = "BEACON_STACK_CONFIG", default_value = "infra/beacon_stack.toml")]
        config: String,
        /// Output file path
        #[arg(long, default_value = DEFAULT_TEMPLATE_PATH)]
        output: String,
    },
    /// Run CI checks (fmt, clippy, tests, synth)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Validate and synthesize the reference stack
    Synth,
    /// Run check + synth
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_stack_cli(config: &str, args: &[&str]) {
    let mut cargo_args = vec![
        "run",
        "-q",
        "-p",
        "beacon_stack_cli",
        "--bin",
        "beacon-stack",
        "--",
        "--config",
        config,
    ];
    cargo_args.extend_from_slice(args);
    run_cargo(&cargo_args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test beacon_stack_core");
    run_cargo(&["test", "-p", "beacon_stack_core"]);

    step("Test beacon_stack_cli");
    run_cargo(&["test", "-p", "beacon_stack_cli"]);
}

fn ci_synth() {
    step("Validate reference stack");
    run_stack_cli("infra/beacon_stack.toml", &["validate"]);

    step("Synthesize reference stack");
    run_stack_cli(
        "infra/beacon_stack.toml",
        &["synth", "--output", DEFAULT_TEMPLATE_PATH],
    );

    step("Check demo request against reference stack");
    run_stack_cli(
        "infra/beacon_stack.toml",
        &["check-request", "--request", "demos/sequence_query.json"],
    );
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            run_stack_cli(&config, &["validate"]);
        }
        Commands::Synth { config, output } => {
            run_stack_cli(&config, &["synth", "--output", &output]);
            eprintln!("\nSynthesized template:\n- {output}");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Synth => ci_synth(),
                CiJob::All => {
                    ci_check();
                    ci_synth();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
