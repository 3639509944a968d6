use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::schema::Config;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;

/// Upper bound for every configured retention window: 100 years.
pub const MAX_RETENTION_DAYS: u32 = 36_500;
const MAX_RETENTION_SECS: u64 = MAX_RETENTION_DAYS as u64 * 24 * 60 * 60;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses a YAML (or JSON) config and validates it.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let intervals = &config.intervals;
    if intervals.worker_secs == 0
        || intervals.scanner_secs == 0
        || intervals.janitor_secs == 0
        || intervals.retention_secs == 0
    {
        return Err(ConfigError::Validation {
            message: "Intervals must be greater than zero".to_string(),
        });
    }

    let retention = &config.retention;
    if retention.postpone_secs > MAX_RETENTION_SECS
        || retention.janitor_window_secs > MAX_RETENTION_SECS
    {
        return Err(ConfigError::Validation {
            message: format!(
                "Retention windows must not exceed {} seconds",
                MAX_RETENTION_SECS
            ),
        });
    }

    let mut ids = HashSet::new();
    for endpoint in &config.endpoints {
        if endpoint.id.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "Endpoint ID must not be empty".to_string(),
            });
        }
        if !ids.insert(endpoint.id.as_str()) {
            return Err(invalid(endpoint, "Duplicate endpoint ID"));
        }

        validate_endpoint(endpoint)?;
    }

    Ok(())
}

fn invalid(endpoint: &Endpoint, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEndpoint {
        id: endpoint.id.clone(),
        reason: reason.into(),
    }
}

fn validate_endpoint(endpoint: &Endpoint) -> Result<(), ConfigError> {
    if endpoint.root.as_os_str().is_empty() {
        return Err(invalid(endpoint, "Root must not be empty"));
    }

    if let Some(days) = endpoint.defaults.retention_days {
        if days > MAX_RETENTION_DAYS {
            return Err(invalid(
                endpoint,
                format!(
                    "retention_days {} exceeds the maximum of {}",
                    days, MAX_RETENTION_DAYS
                ),
            ));
        }
    }

    let subfolder = Path::new(&endpoint.subfolder);
    let escapes = subfolder.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(invalid(
            endpoint,
            format!("Subfolder '{}' must be a relative path", endpoint.subfolder),
        ));
    }

    for pattern in &endpoint.exclude {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(invalid(
                endpoint,
                format!("Invalid exclude pattern '{}': {}", pattern, e),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointKind;
    use crate::record::{Access, Purpose};

    #[test]
    fn test_load_valid_config() {
        let config_yaml = r#"
database_path: /var/lib/medialib/medialib.db
intervals:
  worker_secs: 10
endpoints:
  - id: drop
    name: Drop folder
    kind: drop_folder
    root: /srv/drop
    capabilities: { scan: true, import: true }
    extensions: [jpg, png]
    defaults:
      keep_original: true
      tags: [inbox]
  - id: images
    kind: image
    root: /srv/images
    subfolder: "{year}/{month}"
  - id: public
    kind: export
    root: /srv/public
    capabilities: { export: true }
    defaults:
      access: public
      wants: [proxy, primary]
"#;

        let config = load_config_from_str(config_yaml).unwrap();
        assert_eq!(config.intervals.worker_secs, 10);
        assert_eq!(config.intervals.janitor_secs, 720);
        assert_eq!(config.retention.postpone_secs, 86400);
        assert_eq!(config.endpoints.len(), 3);

        let drop = &config.endpoints[0];
        assert_eq!(drop.kind, EndpointKind::DropFolder);
        assert!(drop.capabilities.scan && drop.capabilities.import);
        assert!(!drop.capabilities.export);
        assert!(drop.defaults.keep_original);
        assert_eq!(drop.subfolder, "{date}");

        assert_eq!(config.endpoints[1].subfolder, "{year}/{month}");
        let public = &config.endpoints[2];
        assert_eq!(public.defaults.access, Access::Public);
        assert_eq!(public.defaults.wants, vec![Purpose::Proxy, Purpose::Primary]);
    }

    #[test]
    fn test_load_json_config() {
        let config_json = r#"{"endpoints": [{"id": "drop", "root": "/srv/drop"}]}"#;
        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.endpoints[0].id, "drop");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.intervals.retention_secs, 1440);
        assert!(config.database_path().is_some());
    }

    #[test]
    fn test_duplicate_endpoint_ids() {
        let config_yaml = r#"
endpoints:
  - { id: drop, root: /a }
  - { id: drop, root: /b }
"#;
        let result = load_config_from_str(config_yaml);
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint { .. })));
    }

    #[test]
    fn test_empty_id_and_root() {
        assert!(load_config_from_str("endpoints: [{ id: '', root: /a }]").is_err());
        assert!(load_config_from_str("endpoints: [{ id: a, root: '' }]").is_err());
    }

    #[test]
    fn test_absolute_subfolder_rejected() {
        let result = load_config_from_str("endpoints: [{ id: a, root: /a, subfolder: /etc }]");
        assert!(result.is_err());
        let result = load_config_from_str("endpoints: [{ id: a, root: /a, subfolder: '../x' }]");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let result = load_config_from_str("endpoints: [{ id: a, root: /a, exclude: ['[abc'] }]");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(load_config_from_str("intervals: { worker_secs: 0 }").is_err());
    }

    #[test]
    fn test_out_of_range_retention_rejected() {
        let result = load_config_from_str(
            "endpoints: [{ id: a, root: /a, defaults: { retention_days: 4294967295 } }]",
        );
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint { .. })));
        assert!(load_config_from_str(
            "endpoints: [{ id: a, root: /a, defaults: { retention_days: 36500 } }]"
        )
        .is_ok());

        let result = load_config_from_str("retention: { postpone_secs: 18446744073709551615 }");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
        let result = load_config_from_str("retention: { janitor_window_secs: 9223372036854775807 }");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_unparseable_config() {
        let result = load_config_from_str("endpoints: [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/medialib.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
