// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build configuration.

Configuration is a YAML document naming the archive metadata, the upstream
sources to harvest, and the packages to add:

```yaml
archive_info:
  origin: Example
  label: Example Repo
  suite: stable
  codename: bookworm
  architectures: amd64 arm64
  components: main
  description: Example package archive

sources:
  - https://repo.example.com
  - url: http://archive.ubuntu.com/ubuntu
    suite: focal
    component: main
    architectures: [amd64]

packages:
  - ./dist/hello_1.0-1_amd64.deb
  - https://github.com/example/hello/releases/download/v1.0/hello_1.0-1_amd64.deb
```
*/

use {
    crate::{
        error::{RepoError, Result},
        harvest::SourceDescriptor,
        repository::release::ArchiveInfo,
    },
    serde::Deserialize,
    std::path::Path,
};

/// Archive metadata as it appears in configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveInfoConfig {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub suite: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub architectures: String,
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub description: String,
}

impl From<ArchiveInfoConfig> for ArchiveInfo {
    fn from(c: ArchiveInfoConfig) -> Self {
        ArchiveInfo {
            origin: c.origin,
            label: c.label,
            suite: c.suite,
            version: c.version,
            codename: c.codename,
            architectures: c.architectures,
            components: c.components,
            description: c.description,
            ..Default::default()
        }
    }
}

/// One harvest source: either a bare URL (flat repository) or a descriptor
/// object for a hierarchical one.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SourceConfig {
    Url(String),
    Detailed {
        url: String,
        suite: String,
        #[serde(default)]
        component: String,
        #[serde(default)]
        architectures: Vec<String>,
    },
}

impl SourceConfig {
    pub fn to_descriptor(&self) -> SourceDescriptor {
        match self {
            Self::Url(url) => SourceDescriptor::Flat { url: url.clone() },
            Self::Detailed {
                url,
                suite,
                component,
                architectures,
            } => SourceDescriptor::Hierarchical {
                url: url.clone(),
                suite: suite.clone(),
                component: component.clone(),
                architectures: architectures.clone(),
            },
        }
    }
}

/// Top-level build configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub archive_info: ArchiveInfoConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Local paths or URLs of `.deb` files to add to the repository.
    #[serde(default)]
    pub packages: Vec<String>,
}

impl Config {
    /// Parse a configuration document.
    pub fn from_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RepoError::IoPath(path.as_ref().display().to_string(), e))?;

        Self::from_str(&data)
    }

    /// The configured harvest sources as descriptors.
    pub fn source_descriptors(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(|s| s.to_descriptor()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_sources() -> Result<()> {
        let config = Config::from_str(
            "archive_info:\n  origin: Example\n  suite: stable\n  architectures: amd64\nsources:\n  - https://repo.example.com\n  - url: http://archive.ubuntu.com/ubuntu\n    suite: focal\n    component: main\n    architectures: [amd64, arm64]\npackages:\n  - ./hello_1.0-1_amd64.deb\n",
        )?;

        assert_eq!(config.archive_info.origin, "Example");
        assert_eq!(config.packages, vec!["./hello_1.0-1_amd64.deb"]);

        let descriptors = config.source_descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(
            descriptors[0],
            SourceDescriptor::Flat {
                url: "https://repo.example.com".to_string()
            }
        );
        assert_eq!(
            descriptors[1],
            SourceDescriptor::Hierarchical {
                url: "http://archive.ubuntu.com/ubuntu".to_string(),
                suite: "focal".to_string(),
                component: "main".to_string(),
                architectures: vec!["amd64".to_string(), "arm64".to_string()],
            }
        );

        Ok(())
    }

    #[test]
    fn empty_sections_default() -> Result<()> {
        let config = Config::from_str("archive_info:\n  origin: X\n")?;

        assert!(config.sources.is_empty());
        assert!(config.packages.is_empty());

        Ok(())
    }

    #[test]
    fn archive_info_conversion() {
        let info: ArchiveInfo = ArchiveInfoConfig {
            origin: "X".to_string(),
            architectures: "amd64 all".to_string(),
            ..Default::default()
        }
        .into();

        assert_eq!(info.origin, "X");
        assert_eq!(info.architectures, "amd64 all");
        assert!(info.date.is_empty());
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        assert!(matches!(
            Config::from_str("archive_info: ["),
            Err(RepoError::Config(_))
        ));
    }
}
