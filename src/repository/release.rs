// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file primitives.

See <https://wiki.debian.org/DebianRepository/Format#Release_file>.
*/

use {
    crate::{
        control::parse_paragraphs,
        error::{RepoError, Result},
    },
    chrono::Utc,
};

/// Formatter string for dates in release files (RFC 1123 with numeric zone).
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Archive-level metadata written to the `Release` file.
///
/// Empty fields are omitted from the output entirely.
#[derive(Clone, Debug, Default)]
pub struct ArchiveInfo {
    /// Repository origin, e.g. `Debian` or an organization name.
    pub origin: String,

    /// Short label for the repository.
    pub label: String,

    /// Suite name, e.g. `stable`.
    pub suite: String,

    /// Release version, e.g. `12.0`.
    pub version: String,

    /// Release codename, e.g. `bookworm`.
    pub codename: String,

    /// Creation date override. When empty, the current UTC time is used.
    pub date: String,

    /// Expiry timestamp in [DATE_FORMAT].
    pub valid_until: String,

    /// Space-separated architecture list.
    pub architectures: String,

    /// Space-separated component list.
    pub components: String,

    /// Free-form description.
    pub description: String,

    /// Prevents default selection for upgrades when set.
    pub not_automatic: bool,

    /// Allows upgrades of already-installed packages despite
    /// [Self::not_automatic].
    pub but_automatic_upgrades: bool,

    /// Advertises index acquisition by content hash.
    pub acquire_by_hash: bool,
}

/// A checksummed file listed in a `Release` manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseEntry {
    /// Path relative to the directory holding the `Release` file.
    pub path: String,

    /// File size in bytes.
    pub size: u64,

    /// Hex sha256 of the file contents.
    pub sha256: String,
}

impl ArchiveInfo {
    /// The `Date` value to emit: the configured override or the current
    /// UTC time.
    fn date_value(&self) -> String {
        if self.date.is_empty() {
            Utc::now().format(DATE_FORMAT).to_string()
        } else {
            self.date.clone()
        }
    }

    /// Render the `Release` manifest listing the given index files.
    ///
    /// Entries are emitted in the order given; hierarchical callers sort
    /// them by path first for determinism.
    pub fn render_release(&self, entries: &[ReleaseEntry]) -> Vec<u8> {
        let mut out = String::new();

        let mut field = |name: &str, value: &str| {
            if !value.is_empty() {
                out.push_str(name);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        };

        field("Origin", &self.origin);
        field("Label", &self.label);
        field("Suite", &self.suite);
        field("Version", &self.version);
        field("Codename", &self.codename);
        field("Date", &self.date_value());
        field("Valid-Until", &self.valid_until);
        field("Architectures", &self.architectures);
        field("Components", &self.components);
        field("Description", &self.description);

        if self.not_automatic {
            field("NotAutomatic", "yes");
        }
        if self.but_automatic_upgrades {
            field("ButAutomaticUpgrades", "yes");
        }
        if self.acquire_by_hash {
            field("Acquire-By-Hash", "yes");
        }

        out.push_str("SHA256:\n");
        for entry in entries {
            out.push_str(&format!(" {} {} {}\n", entry.sha256, entry.size, entry.path));
        }

        out.into_bytes()
    }

    /// Parse archive metadata from `Release` file content.
    ///
    /// Checksum sections are ignored; they are regenerated on write.
    pub fn parse(content: &str) -> Result<Self> {
        let paragraphs = parse_paragraphs(content)?;
        let paragraph = paragraphs
            .first()
            .ok_or_else(|| RepoError::ControlParse("empty Release file".to_string()))?;

        let get = |name: &str| {
            paragraph
                .field_str(name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        let get_bool = |name: &str| paragraph.field_bool(name).unwrap_or(false);

        Ok(Self {
            origin: get("Origin"),
            label: get("Label"),
            suite: get("Suite"),
            version: get("Version"),
            codename: get("Codename"),
            date: get("Date"),
            valid_until: get("Valid-Until"),
            architectures: get("Architectures"),
            components: get("Components"),
            description: get("Description"),
            not_automatic: get_bool("NotAutomatic"),
            but_automatic_upgrades: get_bool("ButAutomaticUpgrades"),
            acquire_by_hash: get_bool("Acquire-By-Hash"),
        })
    }
}
