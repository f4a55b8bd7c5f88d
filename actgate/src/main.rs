//! # Actgate CLI Entry Point
//!
//! The main executable for the Actgate gateway. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and sets up logging.
//! 2. **Configuration**: Loads the settings file and wires the schema cache and the invoker.
//! 3. **Execution**: Delegates the request to `actgate_core`.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.
//!
//! Log verbosity is controlled with `RUST_LOG`, and defaults to `info`.

mod cli;
mod config;
mod formatter;

use actgate_core::schema::ServiceKey;
use actgate_core::schema::cache::SchemaCache;
use clap::Parser;
use cli::{Cli, Commands, DescribeCommands, ListCommands};
use formatter::{FormattedString, SchemaDocs, ServiceList};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let settings = or_exit(config::load_or_default(&args.config));

    match args.command {
        Commands::Call {
            service,
            method,
            body,
            correlation_id,
        } => {
            let correlation_id =
                correlation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let invoker = or_exit(config::invoker(&settings));

            match invoker.invoke(&service, &method, body, &correlation_id).await {
                Ok(value) => println!("{}", FormattedString::from(value)),
                Err(err) => {
                    eprintln!("{}", FormattedString::from(err));
                    process::exit(1);
                }
            }
        }
        Commands::List { sub } => match sub {
            ListCommands::Services { component } => {
                let cache = or_exit(config::schema_cache(&settings));
                list_services(&cache, &component).await
            }
        },
        Commands::Describe { sub } => match sub {
            DescribeCommands::Service { service } => {
                let cache = or_exit(config::schema_cache(&settings));
                describe_service(&cache, &service).await
            }
        },
        Commands::Schema { service, method } => {
            let cache = or_exit(config::schema_cache(&settings));
            print_schema(&cache, &service, method.as_deref()).await
        }
    }
}

fn or_exit<T>(result: anyhow::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{}", FormattedString::from(err));
            process::exit(1);
        }
    }
}

async fn list_services(cache: &Arc<SchemaCache>, component: &str) {
    match cache.list_services(component).await {
        Ok(services) => println!("{}", FormattedString::from(ServiceList(services))),
        Err(e) => {
            eprintln!("{}", FormattedString::from(e));
            process::exit(1);
        }
    }
}

async fn describe_service(cache: &Arc<SchemaCache>, service: &ServiceKey) {
    match cache.describe_service(service).await {
        Ok(service) => println!("{}", FormattedString::from(service)),
        Err(e) => {
            eprintln!("{}", FormattedString::from(e));
            process::exit(1);
        }
    }
}

async fn print_schema(cache: &Arc<SchemaCache>, service: &ServiceKey, method: Option<&str>) {
    match cache.json_schema(service, method).await {
        Ok(docs) => println!("{}", FormattedString::from(SchemaDocs(docs))),
        Err(e) => {
            eprintln!("{}", FormattedString::from(e));
            process::exit(1);
        }
    }
}
