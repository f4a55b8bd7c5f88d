use actgate_core::ErrorKind;
use actgate_core::invoker::InvokeError;
use actgate_core::schema::cache::BuildError;
use actgate_core::schema::json_schema::JsonSchemaDoc;
use actgate_core::schema::{ProtoService, ServiceKey};
use colored::*;
use std::collections::BTreeMap;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<ServiceKey>);

pub struct SchemaDocs(pub BTreeMap<String, JsonSchemaDoc>);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn headline(kind: ErrorKind) -> ColoredString {
    let title = match kind {
        ErrorKind::NotFound => "Not Found:",
        ErrorKind::InvalidInput => "Invalid Input:",
        ErrorKind::Compilation => "Schema Compilation Failed:",
        ErrorKind::Transport => "Call Failed:",
        ErrorKind::Application => "Rejected:",
    };
    if kind.is_client_error() {
        title.yellow().bold()
    } else {
        title.red().bold()
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(pretty(&value))
    }
}

impl From<InvokeError> for FormattedString {
    fn from(err: InvokeError) -> Self {
        let mut out = format!("{}\n\n'{}'", headline(err.kind()), err);

        if let InvokeError::Application { response, .. } = &err {
            out.push_str(&format!("\n\n{}\n{}", "Response:".cyan(), pretty(response)));
        }
        if let Some(request) = err.request() {
            out.push_str(&format!("\n\n{}\n{}", "Request:".cyan(), pretty(request)));
        }
        FormattedString(out)
    }
}

impl From<BuildError> for FormattedString {
    fn from(err: BuildError) -> Self {
        FormattedString(format!("{}\n\n'{}'", headline(err.kind()), err))
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        FormattedString(format!("{}\n\n'{:#}'", "Configuration Error:".red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.to_string().green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<ProtoService> for FormattedString {
    fn from(service: ProtoService) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name.to_string().green()
        ));

        for method in &service.methods {
            out.push_str(&format!(
                "  {} {}({}) {} ({});\n",
                "rpc".cyan(),
                method.method_name.green(),
                method.input_type.yellow(),
                "returns".cyan(),
                method.output_type.yellow()
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<SchemaDocs> for FormattedString {
    fn from(SchemaDocs(docs): SchemaDocs) -> Self {
        if docs.is_empty() {
            return FormattedString("No JSON-Schema documents found.".yellow().to_string());
        }

        let out = docs
            .values()
            .map(|doc| format!("{}\n{}", doc.type_name.green().bold(), pretty(&doc.schema)))
            .collect::<Vec<_>>()
            .join("\n\n");
        FormattedString(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actgate_core::schema::ProtoMethod;

    #[test]
    fn formats_a_service_signature() {
        let service = ProtoService {
            name: ServiceKey::new("router", "Echo"),
            methods: vec![ProtoMethod {
                method_name: "Ping".to_string(),
                input_type: "router.EchoRequest".to_string(),
                output_type: "router.EchoResponse".to_string(),
            }],
        };

        colored::control::set_override(false);
        let out = FormattedString::from(service).0;

        assert!(out.contains("router:Echo"));
        assert!(out.contains("rpc Ping(router.EchoRequest) returns (router.EchoResponse);"));
    }

    #[test]
    fn empty_service_list_says_so() {
        colored::control::set_override(false);
        let out = FormattedString::from(ServiceList(Vec::new())).0;

        assert_eq!(out, "No services found.");
    }
}
