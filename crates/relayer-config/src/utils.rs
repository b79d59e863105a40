// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> crossbridge_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(crossbridge_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`CrossbridgeRelayerConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> crossbridge_relayer_utils::Result<CrossbridgeRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of CROSSBRIDGE).
    let builder = builder.add_source(
        config::Environment::with_prefix("CROSSBRIDGE").separator("_"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        CrossbridgeRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files from the given directory.
///
/// it is the same as using the [`search_config_files`] and
/// [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> crossbridge_relayer_utils::Result<CrossbridgeRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration. All failures here are
/// configuration-fatal, the process must not start on a bad config.
pub fn postloading_process(
    mut config: CrossbridgeRelayerConfig,
) -> crossbridge_relayer_utils::Result<CrossbridgeRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    // make all chain names lower case.
    let old_evm = std::mem::take(&mut config.evm);
    for (name, chain) in old_evm {
        config.evm.insert(name.to_lowercase(), chain);
    }

    let mut seen_domains = HashSet::new();
    for (name, chain) in config.enabled_chains() {
        if !seen_domains.insert(chain.domain_id) {
            tracing::error!(
                %name,
                domain_id = %chain.domain_id,
                "two enabled chains share one domain id",
            );
            return Err(crossbridge_relayer_utils::Error::Generic(
                "duplicate domain id in the config",
            ));
        }
        if chain.private_key.is_none() {
            tracing::error!(%name, "enabled chain has no private key");
            return Err(crossbridge_relayer_utils::Error::MissingSecrets);
        }
        if chain.resources.is_empty() {
            tracing::error!(%name, "enabled chain has no resources");
            return Err(crossbridge_relayer_utils::Error::Generic(
                "enabled chain with an empty resource table",
            ));
        }
    }

    if config.enabled_chains().count() == 0 {
        tracing::warn!("no enabled chains in the config, nothing to relay");
    }

    Ok(config)
}
