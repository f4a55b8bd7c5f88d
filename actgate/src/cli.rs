//! # CLI
//!
//! This module defines the command-line interface of `actgate` using `clap`.
//!
//! Service keys are validated here (`component:service`), as are JSON bodies, so the engine
//! only ever sees well-formed input.
use std::path::PathBuf;

use actgate_core::schema::ServiceKey;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "actgate", version, about = "Dynamic-schema gRPC gateway")]
pub struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = "actgate.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Perform a unary gRPC call on a component
    ///
    /// The component's schema is fetched and compiled on first use, then cached.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// actgate call router:Echo Ping --body '{"text": "hi"}'
    /// ```
    Call {
        /// Service (component:Service)
        #[arg(value_parser = parse_service_key)]
        service: ServiceKey,
        /// Method name, as declared by the service
        method: String,
        /// JSON body of the request
        #[arg(long, value_parser = parse_body, default_value = "{}")]
        body: serde_json::Value,
        /// Identifier copied into the request's correlation field. A random one is used when unset.
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// List available services or other resources
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },

    /// Describe a service in detail
    Describe {
        #[command(subcommand)]
        sub: DescribeCommands,
    },

    /// Print the JSON-Schema documents of a service or of one of its methods
    Schema {
        /// Service (component:Service)
        #[arg(value_parser = parse_service_key)]
        service: ServiceKey,
        /// Restrict the output to one method's input and output types
        #[arg(short, long)]
        method: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services declared by a component's schema
    Services {
        /// Producing component (e.g. router)
        component: String,
    },
}

#[derive(Subcommand)]
pub enum DescribeCommands {
    /// Describe a specific service (list its methods)
    Service {
        /// Service (component:Service)
        #[arg(value_parser = parse_service_key)]
        service: ServiceKey,
    },
}

fn parse_service_key(value: &str) -> Result<ServiceKey, String> {
    value.parse().map_err(|e| format!("{e}"))
}

fn parse_body(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|e| format!("Invalid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_defaults_to_an_empty_body() {
        let cli = Cli::parse_from(["actgate", "call", "router:Echo", "Ping"]);

        assert_eq!(cli.config, PathBuf::from("actgate.toml"));
        match cli.command {
            Commands::Call {
                service,
                method,
                body,
                correlation_id,
            } => {
                assert_eq!(service, ServiceKey::new("router", "Echo"));
                assert_eq!(method, "Ping");
                assert_eq!(body, serde_json::json!({}));
                assert_eq!(correlation_id, None);
            }
            _ => panic!("Expected a call command"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["actgate", "list", "services", "router", "-c", "gw.toml"]);

        assert_eq!(cli.config, PathBuf::from("gw.toml"));
    }

    #[test]
    fn rejects_malformed_keys_and_bodies() {
        assert!(Cli::try_parse_from(["actgate", "call", "router", "Ping"]).is_err());
        assert!(
            Cli::try_parse_from(["actgate", "call", "router:Echo", "Ping", "--body", "{nope"])
                .is_err()
        );
    }
}
