use clap::Parser;
use colored::*;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::cli::{CliArgs, Commands, OutputFormat, OutputFormatter};
use crate::engine::QueryService;
use crate::plugins::{MockPluginClient, PluginRegistry};
use crate::utils::{
    config::ServiceConfig,
    error::{GateError, GateResult},
    logging::init_logging,
    types::{OrgRole, QueryBatchRequest, SignedInUser},
};

/// Plugin id served in-process by the deterministic mock client
pub const TESTDATA_PLUGIN_ID: &str = "testdata";

/// Options for one `query` invocation
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub format: OutputFormat,
    pub handle_expressions: bool,
    pub skip_cache: bool,
    pub org_id: i64,
    pub login: String,
    pub verbose: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            handle_expressions: true,
            skip_cache: false,
            org_id: 1,
            login: "admin".to_string(),
            verbose: false,
        }
    }
}

/// Main CLI runner that handles command execution
pub struct CliRunner {
    config: ServiceConfig,
    service: QueryService,
}

impl CliRunner {
    /// Wire a runner from a parsed config
    pub fn new(config: ServiceConfig) -> GateResult<Self> {
        let mut registry = PluginRegistry::new();
        if !config.plugins.contains_key(TESTDATA_PLUGIN_ID) {
            registry.register(TESTDATA_PLUGIN_ID, Arc::new(MockPluginClient::new()))?;
        }
        let service = QueryService::from_config(&config, registry)?;

        Ok(Self { config, service })
    }

    pub fn from_file(path: &str) -> GateResult<Self> {
        Self::new(ServiceConfig::from_file(path)?)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Execute a JSON batch document and return formatted results
    pub async fn execute_query(&self, raw_batch: &str, options: &QueryOptions) -> GateResult<String> {
        let batch: QueryBatchRequest = serde_json::from_str(raw_batch)
            .map_err(|e| GateError::bad_query(format!("invalid batch document: {}", e)))?;

        if options.verbose {
            eprintln!(
                "{}",
                OutputFormatter::format_info(&format!(
                    "Dispatching {} queries for range {} to {}",
                    batch.queries.len(),
                    batch.from,
                    batch.to
                ))
            );
        }

        let user = SignedInUser::new(1, options.org_id, &options.login).with_role(OrgRole::Admin);
        let cancel = CancellationToken::new();
        let response = self
            .service
            .query_data(&cancel, &user, options.skip_cache, &batch, options.handle_expressions)
            .await?;

        if options.verbose {
            eprintln!(
                "{}",
                OutputFormatter::format_info(&format!("Received {} responses", response.len()))
            );
        }

        Ok(OutputFormatter::format_response(&response, &options.format))
    }

    /// List configured data sources
    pub fn list_sources(&self, detailed: bool) -> String {
        if self.config.data_sources.is_empty() {
            return OutputFormatter::format_info("No data sources are configured.");
        }

        let mut output = String::new();
        output.push_str(&format!("{}\n", "Configured Data Sources:".bold()));

        for ds in &self.config.data_sources {
            output.push_str(&format!(
                "  {} {} ({})\n",
                "•".green(),
                ds.uid.cyan().bold(),
                ds.ds_type
            ));
            if detailed {
                output.push_str(&format!("    Id: {}\n", ds.id));
                output.push_str(&format!("    Org: {}\n", ds.org_id));
                if !ds.name.is_empty() {
                    output.push_str(&format!("    Name: {}\n", ds.name));
                }
                if !ds.url.is_empty() {
                    output.push_str(&format!("    Url: {}\n", ds.url.yellow()));
                }
                let backed = ds.ds_type == TESTDATA_PLUGIN_ID || self.config.plugins.contains_key(&ds.ds_type);
                output.push_str(&format!(
                    "    Plugin: {}\n",
                    if backed { "Registered".green() } else { "Missing".red() }
                ));
                let pass_through = ds
                    .json_data
                    .get("oauthPassThru")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                output.push_str(&format!(
                    "    OAuth Passthrough: {}\n",
                    if pass_through { "Yes".green() } else { "No".red() }
                ));
            }
        }

        output
    }

    /// Summarise a config that already passed validation
    pub fn check(&self) -> String {
        format!(
            "{} {} data sources, {} plugin endpoints, expressions {}",
            "OK".green().bold(),
            self.config.data_sources.len(),
            self.config.plugins.len(),
            match &self.config.expressions.endpoint {
                Some(endpoint) => endpoint.as_str(),
                None => "disabled",
            }
        )
    }
}

/// Read a batch document from a file, or stdin for `-`
pub async fn read_batch(source: &str) -> GateResult<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .map_err(|e| GateError::Internal(format!("cannot read stdin: {}", e)))?;
        return Ok(raw);
    }

    tokio::fs::read_to_string(source)
        .await
        .map_err(|e| GateError::Internal(format!("cannot read {}: {}", source, e)))
}

async fn run_command(command: Commands) -> GateResult<String> {
    match command {
        Commands::Query {
            config,
            batch,
            format,
            no_expressions,
            skip_cache,
            org_id,
            login,
            verbose,
        } => {
            let config = ServiceConfig::from_file(&config)?;
            init_logging(&config.logging);
            let runner = CliRunner::new(config)?;

            let raw = read_batch(&batch).await?;
            let options = QueryOptions {
                format,
                handle_expressions: !no_expressions,
                skip_cache,
                org_id,
                login,
                verbose,
            };
            runner.execute_query(&raw, &options).await
        }

        Commands::Sources { config, detailed } => {
            let runner = CliRunner::from_file(&config)?;
            Ok(runner.list_sources(detailed))
        }

        Commands::Check { config } => {
            let runner = CliRunner::from_file(&config)?;
            Ok(runner.check())
        }
    }
}

/// Main entry point for CLI execution
pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    match run_command(args.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", OutputFormatter::format_error(&e));
            std::process::exit(1);
        }
    }
}
