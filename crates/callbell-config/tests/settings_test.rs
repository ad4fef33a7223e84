#![allow(clippy::unwrap_used)]
// Settings loading: TOML file, environment overrides, and save round trip.

use std::path::Path;

use figment::Jail;
use pretty_assertions::assert_eq;

use callbell_config::{Settings, load_settings_from, save_settings_to, to_configuration};

#[test]
fn test_missing_file_yields_defaults() {
    Jail::expect_with(|_jail| {
        let settings = load_settings_from(Path::new("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        Ok(())
    });
}

#[test]
fn test_toml_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
                [connection]
                base_url = "https://responder.example.org"
                facility_id = "St-Mary-North"
                room_number = "4B"
                api_key = "plain"

                [retry]
                max_retries = 5
            "#,
        )?;

        let settings = load_settings_from(Path::new("config.toml")).unwrap();

        assert_eq!(settings.connection.facility_id, "St-Mary-North");
        assert_eq!(settings.connection.room_number.as_deref(), Some("4B"));
        assert_eq!(settings.connection.timeout, 30);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.base_delay_secs, 2);

        let config = to_configuration(&settings, "bed-4").unwrap();
        assert_eq!(config.base_url.host_str(), Some("responder.example.org"));
        Ok(())
    });
}

#[test]
fn test_environment_wins_over_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
                [connection]
                facility_id = "from-file"
            "#,
        )?;
        jail.set_env("CALLBELL_CONNECTION__FACILITY_ID", "from-env");
        jail.set_env("CALLBELL_RETRY__BASE_DELAY_SECS", "7");

        let settings = load_settings_from(Path::new("config.toml")).unwrap();

        assert_eq!(settings.connection.facility_id, "from-env");
        assert_eq!(settings.retry.base_delay_secs, 7);
        Ok(())
    });
}

#[test]
fn test_api_key_env_is_resolved_first() {
    Jail::expect_with(|jail| {
        jail.set_env("WARD_API_KEY", "from-env-var");
        let mut settings = Settings::default();
        settings.connection.api_key = Some("plain".into());
        settings.connection.api_key_env = Some("WARD_API_KEY".into());

        let config = to_configuration(&settings, "bed-4").unwrap();

        assert_eq!(secrecy::ExposeSecret::expose_secret(&config.api_key), "from-env-var");
        Ok(())
    });
}

#[test]
fn test_saved_settings_load_back() {
    // Inside a jail so concurrently set CALLBELL_ variables cannot leak in.
    Jail::expect_with(|jail| {
        let path = jail.directory().join("nested").join("config.toml");
        let mut settings = Settings::default();
        settings.connection.facility_id = "East".into();
        settings.connection.device_id = Some("bed-22".into());

        save_settings_to(&settings, &path).unwrap();
        let loaded = load_settings_from(&path).unwrap();

        assert_eq!(loaded, settings);
        Ok(())
    });
}
