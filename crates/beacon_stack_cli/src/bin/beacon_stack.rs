use std::path::PathBuf;

use anyhow::{bail, Context};
use beacon_stack_cli::adapters::caller_account::CallerAccountResolver;
use beacon_stack_cli::adapters::function_names::FunctionNameLister;
use beacon_stack_cli::commands::{assemble, check_request, synth_template, validation_report, write_template};
use beacon_stack_cli::config::StackConfig;
use beacon_stack_cli::logging::init_logging;
use beacon_stack_cli::preflight::{seed_registry, verify_caller_account};
use beacon_stack_core::StackDescriptor;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "beacon-stack",
    about = "Assemble and validate the Beacon query function stack",
    long_about = "Builds the deployment descriptor for the Beacon query function\n\
                  (execution role + containerized function), validates its\n\
                  permission boundary, and renders a deployment template."
)]
struct Cli {
    /// Stack config file; the built-in reference stack is used when omitted
    #[arg(long, global = true, env = "BEACON_STACK_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the stack and report every violated constraint
    Validate,
    /// Render the deployment template
    Synth {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the descriptor fingerprint
    Fingerprint,
    /// Check that a sequence query could be served by the deployed function
    CheckRequest {
        /// JSON file holding the request payload
        #[arg(long)]
        request: PathBuf,
        /// Function to invoke; defaults to the only binding in the stack
        #[arg(long)]
        function: Option<String>,
    },
    /// Validate against functions that already exist in the target region
    Preflight {
        /// Function names owned by a previous deployment of this stack
        #[arg(long = "owned")]
        owned: Vec<String>,
    },
}

struct AwsLambdaFunctionLister {
    lambda_client: aws_sdk_lambda::Client,
}

impl FunctionNameLister for AwsLambdaFunctionLister {
    fn list_function_names(&self) -> Result<Vec<String>, String> {
        let client = self.lambda_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut names = Vec::new();
                let mut marker: Option<String> = None;
                loop {
                    let page = client
                        .list_functions()
                        .set_marker(marker.take())
                        .send()
                        .await
                        .map_err(|error| format!("failed to list lambda functions: {error}"))?;
                    names.extend(
                        page.functions()
                            .iter()
                            .filter_map(|function| function.function_name())
                            .map(str::to_string),
                    );
                    match page.next_marker() {
                        Some(next) => marker = Some(next.to_string()),
                        None => break,
                    }
                }
                Ok::<_, String>(names)
            })
        })
    }
}

struct AwsStsCallerAccount {
    sts_client: aws_sdk_sts::Client,
}

impl CallerAccountResolver for AwsStsCallerAccount {
    fn caller_account(&self) -> Result<String, String> {
        let client = self.sts_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let identity = client
                    .get_caller_identity()
                    .send()
                    .await
                    .map_err(|error| format!("failed to get caller identity: {error}"))?;
                identity
                    .account()
                    .map(str::to_string)
                    .ok_or_else(|| "caller identity carries no account".to_string())
            })
        })
    }
}

fn default_function_name(descriptor: &StackDescriptor) -> anyhow::Result<String> {
    match descriptor.bindings() {
        [only] => Ok(only.name().to_string()),
        bindings => bail!(
            "stack declares {} functions, pass --function to pick one",
            bindings.len()
        ),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let config = StackConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate => {
            let descriptor = assemble(&config, None)?;
            print_json(&validation_report(&descriptor))?;
        }
        Commands::Synth { output } => {
            let descriptor = assemble(&config, None)?;
            match output {
                Some(path) => write_template(&descriptor, &path)?,
                None => print!("{}", synth_template(&descriptor)?),
            }
        }
        Commands::Fingerprint => {
            let descriptor = assemble(&config, None)?;
            println!("{}", descriptor.fingerprint());
        }
        Commands::CheckRequest { request, function } => {
            let descriptor = assemble(&config, None)?;
            let function = match function {
                Some(name) => name,
                None => default_function_name(&descriptor)?,
            };
            let payload = std::fs::read_to_string(&request)
                .with_context(|| format!("failed to read request '{}'", request.display()))?;
            let query = check_request(&descriptor, &function, &payload)?;
            print_json(&serde_json::to_value(&query).context("failed to serialize query")?)?;
        }
        Commands::Preflight { owned } => {
            let target = config.target();
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_sdk_lambda::config::Region::new(target.region.clone()))
                .load()
                .await;
            let caller = AwsStsCallerAccount {
                sts_client: aws_sdk_sts::Client::new(&aws_config),
            };
            verify_caller_account(&target, &caller)?;

            let lister = AwsLambdaFunctionLister {
                lambda_client: aws_sdk_lambda::Client::new(&aws_config),
            };

            let registry = seed_registry(&target, &lister, &owned)?;
            let descriptor = assemble(&config, Some(registry))?;
            print_json(&validation_report(&descriptor))?;
        }
    }

    Ok(())
}
