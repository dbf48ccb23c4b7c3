//! 🔧 App Configuration: the sacred TOML-and-env-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Three layers, later wins:
//! 1. The historical bare env vars (`AES_ENDPOINT`, `REGION`, `MOVIES_INDEX_NAME`),
//!    so an old deployment keeps working without renaming anything.
//! 2. `STRIX_*` env vars, `__` for nesting (`STRIX_SERVICE__ENDPOINT`).
//! 3. An optional TOML file.

use anyhow::Context;
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::buffer::{IndexNaming, IndexTargetConfig};
use crate::classifier::ProjectionConfig;
use crate::transport::ServiceConfig;
use crate::wire::DecoderConfig;

/// 📦 One struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🎬 Where decoded rows go. `index_root` has no default; name your index.
    pub primary: IndexTargetConfig,
    /// 📈 Where monitoring deltas go. Defaults to daily `logs-YYYY.MM.DD` with type `log`.
    #[serde(default = "default_monitoring")]
    pub monitoring: IndexTargetConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
    /// 🌍 IANA zone used for the daily index date. Unknown names fail at load time.
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,
}

fn default_monitoring() -> IndexTargetConfig {
    IndexTargetConfig {
        index_root: "logs".to_string(),
        index_type: "log".to_string(),
        naming: IndexNaming::Daily,
    }
}

fn default_time_zone() -> Tz {
    chrono_tz::UTC
}

/// 🕰️ The env names the original deployment templates set, mapped onto config keys.
fn legacy_env() -> Env {
    Env::raw()
        .only(&["AES_ENDPOINT", "REGION", "MOVIES_INDEX_NAME"])
        .map(|key| {
            let key = key.as_str();
            if key.eq_ignore_ascii_case("AES_ENDPOINT") {
                "service.endpoint".into()
            } else if key.eq_ignore_ascii_case("REGION") {
                "service.region".into()
            } else if key.eq_ignore_ascii_case("MOVIES_INDEX_NAME") {
                "primary.index_root".into()
            } else {
                key.into()
            }
        })
}

/// 🚀 Load the config from env vars and, if given, a TOML file. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable, if `primary.index_root` is missing,
/// or if `time_zone` is not a zone chrono-tz has heard of.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(legacy_env())
        .merge(Env::prefixed("STRIX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (STRIX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (STRIX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut the_file = NamedTempFile::new()
            .expect("💀 Failed to create a temp file. The filesystem said 'new phone who dis'.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 Failed to write test config. The disk is having a moment.");
        the_file
    }

    #[test]
    fn the_one_where_a_full_config_file_lands_every_knob() -> anyhow::Result<()> {
        let the_file = write_test_config(
            r#"
            time_zone = "Asia/Tokyo"

            [primary]
            index_root = "movies"
            index_type = "movie"

            [monitoring]
            index_root = "clicks"
            naming = "daily"

            [service]
            endpoint = "search.example.com"
            region = "ap-northeast-1"
            api_key = "c2VjcmV0"

            [decoder]
            rebind_nested_keys = false

            [projection]
            counters = ["clicks"]
            subject_field = "movie_id"
            "#,
        );

        let the_config = load_config(Some(the_file.path()))?;

        assert_eq!(the_config.primary.index_root, "movies");
        assert_eq!(the_config.primary.naming, IndexNaming::Static);
        assert_eq!(the_config.monitoring.index_root, "clicks");
        assert_eq!(the_config.monitoring.index_type, "_doc");
        assert_eq!(the_config.monitoring.naming, IndexNaming::Daily);
        assert_eq!(the_config.service.region, "ap-northeast-1");
        assert_eq!(the_config.service.api_key.as_deref(), Some("c2VjcmV0"));
        assert!(!the_config.decoder.rebind_nested_keys);
        assert_eq!(the_config.decoder.legacy_integer_key, "I");
        assert_eq!(the_config.projection.counters, vec!["clicks".to_string()]);
        assert_eq!(the_config.projection.timestamp_field, "@timestamp");
        assert_eq!(the_config.time_zone, chrono_tz::Asia::Tokyo);
        Ok(())
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() -> anyhow::Result<()> {
        let the_file = write_test_config(
            r#"
            [primary]
            index_root = "movies"
            "#,
        );

        let the_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()?;

        assert_eq!(the_config.primary.index_type, "_doc");
        assert_eq!(the_config.monitoring.index_root, "logs");
        assert_eq!(the_config.monitoring.index_type, "log");
        assert_eq!(the_config.monitoring.naming, IndexNaming::Daily);
        assert_eq!(the_config.service.endpoint, None);
        assert_eq!(the_config.service.region, "us-west-2");
        assert_eq!(
            the_config.projection.counters,
            vec!["clicks".to_string(), "purchases".to_string()]
        );
        assert_eq!(the_config.time_zone, chrono_tz::UTC);
        Ok(())
    }

    #[test]
    fn the_one_where_a_made_up_time_zone_is_rejected_at_the_door() {
        let the_file = write_test_config(
            r#"
            time_zone = "Mars/Olympus_Mons"

            [primary]
            index_root = "movies"
            "#,
        );

        let the_outcome: Result<AppConfig, _> = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract();
        assert!(the_outcome.is_err(), "Olympus Mons has no tz database entry. Yet.");
    }

    #[test]
    fn the_one_where_old_env_names_and_new_ones_and_toml_all_show_up() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AES_ENDPOINT", "legacy.example.com");
            jail.set_env("REGION", "eu-west-1");
            jail.set_env("MOVIES_INDEX_NAME", "movies-legacy");
            jail.set_env("STRIX_SERVICE__REGION", "eu-central-1");
            jail.set_env("STRIX_PRIMARY__INDEX_TYPE", "movie");
            jail.set_env("STRIX_MONITORING__INDEX_ROOT", "clicks");

            // -- 🏚️ legacy names alone, then STRIX_* overriding where both speak
            let the_config = load_config(None).map_err(|err| format!("{err:#}"))?;
            assert_eq!(the_config.service.endpoint.as_deref(), Some("legacy.example.com"));
            assert_eq!(the_config.service.region, "eu-central-1");
            assert_eq!(the_config.primary.index_root, "movies-legacy");
            assert_eq!(the_config.primary.index_type, "movie");
            assert_eq!(the_config.monitoring.index_root, "clicks");

            // -- 📄 and the TOML file has the final word
            jail.create_file(
                "strix.toml",
                r#"
                [primary]
                index_root = "movies"

                [service]
                endpoint = "search.example.com"
                "#,
            )?;
            let the_config =
                load_config(Some(Path::new("strix.toml"))).map_err(|err| format!("{err:#}"))?;
            assert_eq!(the_config.service.endpoint.as_deref(), Some("search.example.com"));
            assert_eq!(the_config.service.region, "eu-central-1");
            assert_eq!(the_config.primary.index_root, "movies");
            assert_eq!(the_config.primary.index_type, "movie");
            Ok(())
        });
    }
}
