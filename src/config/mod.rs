mod settings;

use config::{Config, Environment, File};

use crate::utils::Result;

pub use settings::{
    BrokerSettings, LogSettings, PartialBrokerSettings, PartialLogSettings, PartialSettings,
    Settings,
};

/// Prefix for environment overrides, e.g. `DLQSUB_BROKER__MAX_QUEUE_SIZE=20`.
pub const ENV_PREFIX: &str = "DLQSUB";

/// Loads the configuration from `config/default` (any supported format,
/// optional) and the environment, merged onto the defaults.
pub fn load_config() -> Result<Settings> {
    load_config_from("config/default")
}

/// Like [`load_config`] but reading the file source from `path`.
///
/// The result is validated; out-of-range broker settings are an error.
pub fn load_config_from(path: &str) -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge_defaults();
    settings.broker.validate()?;
    Ok(settings)
}
