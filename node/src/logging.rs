//! Log setup shared by `serve` and the operator commands.
//!
//! Every event goes to stderr. Operator commands print their result as JSON
//! on stdout, which has to stay clean enough to pipe into other tools.
//! `RUST_LOG` replaces the profile's default directives when it is set.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, multi-field lines for a terminal.
    Pretty,
    /// One JSON object per event, fields flattened into the top level.
    Json,
}

/// Which default verbosity a command starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// The long-running devnet node: submissions, commits, HTTP traces.
    Node,
    /// One-shot operator actions: only warnings unless asked for more.
    Operator,
}

impl LogProfile {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub fn default_directives(self) -> &'static str {
        match self {
            LogProfile::Node => {
                "edu_vault_node=info,edu_vault_contracts=info,tower_http=debug"
            }
            LogProfile::Operator => "edu_vault_node=warn,edu_vault_protocol=warn",
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed or if
/// `RUST_LOG` cannot be parsed.
pub fn init_logging(profile: LogProfile, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(profile.default_directives())?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!(?profile, ?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_directives_are_valid_filters() {
        for profile in [LogProfile::Node, LogProfile::Operator] {
            let filter = EnvFilter::try_new(profile.default_directives());
            assert!(filter.is_ok(), "{:?}: {:?}", profile, filter.err());
        }
    }

    #[test]
    fn operator_profile_is_quieter_than_node() {
        assert!(LogProfile::Operator.default_directives().contains("edu_vault_node=warn"));
        assert!(LogProfile::Node.default_directives().contains("edu_vault_node=info"));
    }
}
