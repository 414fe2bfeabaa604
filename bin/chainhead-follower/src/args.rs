use std::{env, path::PathBuf};

use argh::FromArgs;

/// Configs overridable by environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvArgs {
    /// OpenTelemetry OTLP endpoint URL
    pub otlp_url: Option<String>,
    /// Service label to include in service name
    pub service_label: Option<String>,
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        Self {
            otlp_url: env::var("STRATA_OTLP_URL").ok(),
            service_label: env::var("STRATA_SVC_LABEL").ok(),
        }
    }
}

#[derive(Debug, Clone, Default, FromArgs)]
#[argh(description = "Follows a node's chain head over the chainHead JSON-RPC methods")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to TOML config")]
    pub config: Option<PathBuf>,

    #[argh(option, short = 'u', description = "node websocket url")]
    pub rpc_url: Option<String>,

    #[argh(
        option,
        short = 'v',
        description = "method group version to use instead of detecting it"
    )]
    pub method_version: Option<String>,

    #[argh(switch, description = "do not ask the node for runtime updates")]
    pub no_runtime: bool,
}
