//! Configuration of an instrumentation run.
//!
//! # Examples
//!
//! ```rust
//! use cilcover::instrument::{InstrumentConfig, SourceScope};
//!
//! let config = InstrumentConfig::default()
//!     .with_hits_file("/work/coverage/hits")
//!     .with_scope(SourceScope::new("/work", ["/work/src/Program.cs"]))
//!     .with_companion("/tools/CilCover.HitServices.dll");
//! assert_eq!(config.backup_suffix, ".uninstrumented");
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::instrument::scope::SourceScope;

/// Suffix appended to a file's path to name its pristine backup.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".uninstrumented";
/// Module attribute marking an instrumented module.
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "CilCover.InstrumentedAttribute";

/// `void (string, int32)`
const HIT_SIGNATURE: [u8; 5] = [0x00, 0x02, 0x01, 0x0E, 0x08];
/// `void (string)`
const INIT_SIGNATURE: [u8; 4] = [0x00, 0x01, 0x01, 0x0E];

/// The hit recording API the injected code calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeApi {
    /// Assembly defining the API
    pub scope: String,
    /// Full name of the declaring type
    pub type_name: String,
    /// `static void Hit(string hitsFile, int id)`, called by every probe
    pub hit_method: String,
    /// `static void Init(string hitsFile)`, called from the module initializer
    pub init_method: String,
}

impl ProbeApi {
    /// Signature blob of the hit method.
    #[must_use]
    pub fn hit_signature(&self) -> Vec<u8> {
        HIT_SIGNATURE.to_vec()
    }

    /// Signature blob of the initializer method.
    #[must_use]
    pub fn init_signature(&self) -> Vec<u8> {
        INIT_SIGNATURE.to_vec()
    }
}

impl Default for ProbeApi {
    fn default() -> Self {
        ProbeApi {
            scope: "CilCover.HitServices".to_string(),
            type_name: "CilCover.HitServices.HitService".to_string(),
            hit_method: "Hit".to_string(),
            init_method: "Init".to_string(),
        }
    }
}

/// Settings shared by every module of a run.
///
/// Fields missing from a deserialized configuration take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstrumentConfig {
    /// Path of the hits file, embedded verbatim into every probe
    pub hits_file: String,
    /// Source files to instrument
    pub scope: SourceScope,
    /// Hit recording companion copied next to each instrumented module.
    /// `None` leaves deployment of the companion to the caller.
    pub companion: Option<PathBuf>,
    /// API implemented by the companion
    pub probe: ProbeApi,
    /// Suffix naming backup files
    pub backup_suffix: String,
    /// Full name of the module attribute marking instrumented modules
    pub marker_attribute: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            hits_file: String::new(),
            scope: SourceScope::default(),
            companion: None,
            probe: ProbeApi::default(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
        }
    }
}

impl InstrumentConfig {
    /// Set the hits file path.
    #[must_use]
    pub fn with_hits_file(mut self, hits_file: impl Into<String>) -> Self {
        self.hits_file = hits_file.into();
        self
    }

    /// Set the source scope.
    #[must_use]
    pub fn with_scope(mut self, scope: SourceScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the companion binary to deploy.
    #[must_use]
    pub fn with_companion(mut self, companion: impl Into<PathBuf>) -> Self {
        self.companion = Some(companion.into());
        self
    }

    /// Set the hit recording API.
    #[must_use]
    pub fn with_probe_api(mut self, probe: ProbeApi) -> Self {
        self.probe = probe;
        self
    }

    /// Set the backup file suffix.
    #[must_use]
    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// Set the marker attribute name.
    #[must_use]
    pub fn with_marker_attribute(mut self, name: impl Into<String>) -> Self {
        self.marker_attribute = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InstrumentConfig::default();
        assert!(config.companion.is_none());
        assert_eq!(config.marker_attribute, "CilCover.InstrumentedAttribute");
        assert_eq!(config.probe.hit_method, "Hit");
        assert_eq!(config.probe.hit_signature(), vec![0x00, 0x02, 0x01, 0x0E, 0x08]);
    }

    #[test]
    fn builder_overrides() {
        let config = InstrumentConfig::default()
            .with_hits_file("/tmp/hits")
            .with_backup_suffix(".orig")
            .with_marker_attribute("Test.Marker")
            .with_companion("/tools/Hits.dll");
        assert_eq!(config.hits_file, "/tmp/hits");
        assert_eq!(config.backup_suffix, ".orig");
        assert_eq!(config.marker_attribute, "Test.Marker");
        assert_eq!(config.companion, Some(PathBuf::from("/tools/Hits.dll")));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: InstrumentConfig = serde_json::from_str(
            r#"{
                "hitsFile": "/tmp/hits",
                "scope": { "root": "/work/", "files": ["/work/A.cs"] },
                "probe": { "hitMethod": "Record" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.hits_file, "/tmp/hits");
        assert!(config.scope.contains("/work/A.cs"));
        assert_eq!(config.probe.hit_method, "Record");
        assert_eq!(config.probe.init_method, "Init");
        assert_eq!(config.backup_suffix, DEFAULT_BACKUP_SUFFIX);
        assert!(config.companion.is_none());

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<InstrumentConfig>(&json).unwrap(), config);
    }
}
