use strata_config::{Config, FollowerConfig};

use crate::{
    args::{Args, EnvArgs},
    errors::{AppError, Result},
};

/// Loads the config file if one was given, then applies command line and
/// environment overrides.
pub(crate) fn resolve_config(args: &Args, env_args: &EnvArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let rpc_url = args
                .rpc_url
                .clone()
                .ok_or_else(|| AppError::InvalidArgs("no --config or --rpc-url provided".into()))?;
            Config::new(FollowerConfig::new(rpc_url))
        }
    };

    apply_overrides(&mut config, args, env_args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args, env_args: &EnvArgs) {
    if let Some(rpc_url) = &args.rpc_url {
        config.follower.rpc_url = rpc_url.clone();
    }
    if let Some(version) = &args.method_version {
        config.follower.fixed_version = Some(version.clone());
    }
    if args.no_runtime {
        config.follower.with_runtime = false;
    }

    if let Some(url) = &env_args.otlp_url {
        config.logging.otlp_url = Some(url.clone());
    }
    if let Some(label) = &env_args.service_label {
        config.logging.service_label = Some(label.clone());
    }
}
