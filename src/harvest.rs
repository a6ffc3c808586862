// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Harvesting of package metadata from upstream repositories.

A harvest pulls `Packages` stanzas from flat or hierarchical repositories
and admits them into a [PackageSet] keyed by `(name, version, architecture)`.
Relative `Filename` values are rewritten to absolute URLs against the source
base.

Harvesting is best-effort per source: a failed fetch is logged and the
source skipped. A duplicate key across successfully fetched sources is fatal
to the containing build.

A content-hash cache maps absolute URL to file digest, semantic content
digest, size and control stanza so previously seen assets are never
downloaded twice.
*/

use {
    crate::{
        error::{RepoError, Result},
        package::Package,
        repository::{
            index::{IndexEntry, IndexFiles},
            release::ArchiveInfo,
        },
        validate::Admission,
    },
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, HashMap},
        io::{Read, Write},
        path::Path,
    },
};

/// A remote repository to harvest from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceDescriptor {
    /// A flat repository: the index lives at `<base>/Packages.gz`.
    Flat { url: String },

    /// A standard hierarchical repository with indices at
    /// `<base>/dists/<suite>/<component>/binary-<arch>/Packages.gz`.
    Hierarchical {
        url: String,
        suite: String,
        component: String,
        architectures: Vec<String>,
    },
}

impl SourceDescriptor {
    /// The base URL with a trailing slash.
    pub fn base_url(&self) -> String {
        let url = match self {
            Self::Flat { url } => url,
            Self::Hierarchical { url, .. } => url,
        };

        if url.ends_with('/') {
            url.clone()
        } else {
            format!("{}/", url)
        }
    }

    /// URLs of every `Packages.gz` index this source publishes.
    pub fn index_urls(&self) -> Result<Vec<String>> {
        let base = self.base_url();

        match self {
            Self::Flat { .. } => Ok(vec![format!("{}Packages.gz", base)]),
            Self::Hierarchical {
                suite,
                component,
                architectures,
                ..
            } => {
                if architectures.is_empty() {
                    return Err(RepoError::Config(format!(
                        "architectures required for suite {}",
                        suite
                    )));
                }

                Ok(architectures
                    .iter()
                    .map(|arch| {
                        format!(
                            "{}dists/{}/{}/binary-{}/Packages.gz",
                            base, suite, component, arch
                        )
                    })
                    .collect())
            }
        }
    }
}

/// Cached knowledge about a remote `.deb` asset.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CachedAsset {
    /// Hex sha256 of the asset bytes.
    pub file_sha256: String,

    /// Semantic content digest of the parsed package.
    pub content_digest: String,

    /// Asset size in bytes.
    pub size: u64,

    /// Control stanza extracted from the asset.
    pub control: String,
}

/// Content-hash cache keyed by absolute asset URL, persisted as JSON.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AssetCache {
    entries: BTreeMap<String, CachedAsset>,
}

impl AssetCache {
    /// Load a cache file, returning an empty cache when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read(path.as_ref()) {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| RepoError::Config(format!("cache file parse error: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(RepoError::IoPath(
                path.as_ref().display().to_string(),
                e,
            )),
        }
    }

    /// Persist the cache as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| RepoError::Config(format!("cache serialization error: {}", e)))?;

        std::fs::write(path.as_ref(), data)
            .map_err(|e| RepoError::IoPath(path.as_ref().display().to_string(), e))
    }

    pub fn get(&self, url: &str) -> Option<&CachedAsset> {
        self.entries.get(url)
    }

    pub fn insert(&mut self, url: String, asset: CachedAsset) {
        self.entries.insert(url, asset);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A package admitted from a harvested index stanza.
#[derive(Clone, Debug)]
pub struct HarvestedPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,

    /// Control stanza verbatim, minus the index-level `Filename`, `Size`
    /// and `SHA256` fields.
    pub control: String,

    /// Absolute URL of the `.deb` asset.
    pub filename: String,

    /// Asset size in bytes.
    pub size: u64,

    /// Hex sha256 of the asset bytes.
    pub file_sha256: String,

    /// Semantic content digest, when known (from the cache or a download).
    pub content_digest: Option<String>,
}

/// Extract `Package`, `Version` and `Architecture` values from control
/// stanza text.
fn parse_control_identity(control: &str) -> (String, String, String) {
    let mut name = String::new();
    let mut version = String::new();
    let mut architecture = String::new();

    for line in control.lines() {
        if let Some(v) = line.strip_prefix("Package: ") {
            name = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("Version: ") {
            version = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("Architecture: ") {
            architecture = v.trim().to_string();
        }
    }

    (name, version, architecture)
}

impl HarvestedPackage {
    /// Parse one `Packages` stanza, rewriting a relative `Filename` against
    /// the base URL and adopting a cached content digest when available.
    fn from_stanza(stanza: &str, base_url: &str, cache: &AssetCache) -> Self {
        let mut filename = String::new();
        let mut size = 0u64;
        let mut file_sha256 = String::new();
        let mut control_lines: Vec<&str> = vec![];

        for line in stanza.lines() {
            if let Some(v) = line.strip_prefix("Filename: ") {
                filename = v.trim().to_string();
            } else if let Some(v) = line.strip_prefix("Size: ") {
                size = v.trim().parse().unwrap_or(0);
            } else if let Some(v) = line.strip_prefix("SHA256: ") {
                file_sha256 = v.trim().to_string();
            } else {
                control_lines.push(line);
            }
        }

        let control = format!("{}\n", control_lines.join("\n"));
        let (name, version, architecture) = parse_control_identity(&control);

        if !filename.starts_with("http") {
            filename = format!("{}{}", base_url, filename);
        }

        let content_digest = cache.get(&filename).map(|c| c.content_digest.clone());

        Self {
            name,
            version,
            architecture,
            control,
            filename,
            size,
            file_sha256,
            content_digest,
        }
    }

    /// The identity key used for uniqueness checks.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.name, self.version, self.architecture)
    }

    /// This package's entry in a generated `Packages` index.
    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            control: self.control.clone(),
            filename: self.filename.clone(),
            size: self.size,
            sha256: self.file_sha256.clone(),
        }
    }
}

/// An insertion-ordered set of harvested packages with unique identity
/// triples.
#[derive(Debug, Default)]
pub struct PackageSet {
    packages: Vec<HarvestedPackage>,
    key_index: HashMap<String, usize>,
}

impl PackageSet {
    /// Insert a package. Fails with [RepoError::DuplicateKey] when the
    /// identity triple is already present.
    pub fn add(&mut self, package: HarvestedPackage) -> Result<()> {
        if package.name.is_empty() {
            // Stanzas without a Package field carry nothing indexable.
            return Ok(());
        }

        let key = package.key();

        if self.key_index.contains_key(&key) {
            return Err(RepoError::DuplicateKey(key));
        }

        self.key_index.insert(key, self.packages.len());
        self.packages.push(package);

        Ok(())
    }

    /// Merge another set into this one, preserving insertion order.
    pub fn merge(&mut self, other: PackageSet) -> Result<()> {
        for package in other.packages {
            self.add(package)?;
        }

        Ok(())
    }

    /// Find a package by identity triple.
    pub fn get(&self, name: &str, version: &str, architecture: &str) -> Option<&HarvestedPackage> {
        let key = format!("{}|{}|{}", name, version, architecture);

        self.key_index.get(&key).map(|i| &self.packages[*i])
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate packages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &HarvestedPackage> {
        self.packages.iter()
    }

    /// Build the flat index artifacts for this set.
    pub fn compute_indices(
        &self,
        info: &ArchiveInfo,
        signing_key: Option<&pgp::SignedSecretKey>,
    ) -> Result<IndexFiles> {
        let entries = self
            .packages
            .iter()
            .map(|p| p.index_entry())
            .collect::<Vec<_>>();

        IndexFiles::build(&entries, info, signing_key)
    }
}

/// HTTP client for harvesting indices and assets.
pub struct Harvester {
    client: reqwest::Client,
    token: Option<String>,
}

impl Harvester {
    /// Construct a harvester, optionally carrying a bearer token for
    /// authenticated asset hosts.
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);

        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("token {}", token));
        }

        builder
    }

    /// Fetch a URL into memory, treating any non-200 status as a soft
    /// failure.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response =
            self.request(url)
                .send()
                .await
                .map_err(|e| RepoError::HarvestFetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(RepoError::HarvestFetchFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        Ok(response
            .bytes()
            .await
            .map_err(|e| RepoError::HarvestFetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_vec())
    }

    /// Fetch and decode a `Packages.gz` index.
    async fn fetch_index(&self, url: &str) -> Result<String> {
        let data = self.fetch_bytes(url).await?;

        let text = if url.ends_with(".gz") {
            let mut decoded = vec![];
            flate2::read::GzDecoder::new(data.as_slice())
                .read_to_end(&mut decoded)
                .map_err(|e| RepoError::HarvestFetchFailed {
                    url: url.to_string(),
                    reason: format!("gzip decode: {}", e),
                })?;
            decoded
        } else {
            data
        };

        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Harvest every source into a merged [PackageSet].
    ///
    /// Individual source failures are logged and skipped. Fetches run
    /// concurrently and are joined before admission so the merged insertion
    /// order follows the order of `sources`.
    pub async fn harvest(
        &self,
        sources: &[SourceDescriptor],
        cache: &AssetCache,
    ) -> Result<PackageSet> {
        let fetches = sources
            .iter()
            .map(|source| self.fetch_source(source, cache));
        let results = futures::future::join_all(fetches).await;

        let mut merged = PackageSet::default();

        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(set) => {
                    merged.merge(set)?;
                }
                Err(e) => {
                    log::warn!("skipping source {}: {}", source.base_url(), e);
                }
            }
        }

        Ok(merged)
    }

    /// Harvest a single source into a private [PackageSet].
    async fn fetch_source(
        &self,
        source: &SourceDescriptor,
        cache: &AssetCache,
    ) -> Result<PackageSet> {
        log::info!("harvesting {}", source.base_url());

        let base_url = source.base_url();
        let mut set = PackageSet::default();

        for url in source.index_urls()? {
            let text = self.fetch_index(&url).await?;

            for stanza in text.split("\n\n") {
                if stanza.trim().is_empty() {
                    continue;
                }

                set.add(HarvestedPackage::from_stanza(stanza, &base_url, cache))?;
            }
        }

        Ok(set)
    }

    /// Download a `.deb` asset, parse it and admit it as a harvested
    /// package, populating the cache.
    ///
    /// A cache hit skips the download entirely.
    pub async fn fetch_asset(
        &self,
        url: &str,
        cache: &mut AssetCache,
    ) -> Result<HarvestedPackage> {
        if let Some(cached) = cache.get(url) {
            let (name, version, architecture) = parse_control_identity(&cached.control);

            return Ok(HarvestedPackage {
                name,
                version,
                architecture,
                control: cached.control.clone(),
                filename: url.to_string(),
                size: cached.size,
                file_sha256: cached.file_sha256.clone(),
                content_digest: Some(cached.content_digest.clone()),
            });
        }

        let data = self.fetch_bytes(url).await?;

        // Parsing wants a seekable read path; stage the download in a
        // temporary file that is removed on every exit path.
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(&data)?;

        let package = Package::parse(std::fs::File::open(tmp.path())?)?;

        let control = package.control_text();
        let content_digest = package
            .parsed_digest()
            .expect("parsed packages record their digest")
            .to_string();
        let file_sha256 = package
            .file_sha256()
            .expect("parsed packages record their file hash")
            .to_string();

        cache.insert(
            url.to_string(),
            CachedAsset {
                file_sha256: file_sha256.clone(),
                content_digest: content_digest.clone(),
                size: data.len() as u64,
                control: control.clone(),
            },
        );

        Ok(HarvestedPackage {
            name: package.metadata.name.clone(),
            version: package.metadata.version.clone(),
            architecture: package.metadata.architecture.clone(),
            control,
            filename: url.to_string(),
            size: data.len() as u64,
            file_sha256,
            content_digest: Some(content_digest),
        })
    }

    /// Resolve the semantic content digest of a harvested package,
    /// downloading its asset when the cache has no answer.
    pub async fn content_digest(
        &self,
        package: &HarvestedPackage,
        cache: &mut AssetCache,
    ) -> Result<String> {
        if let Some(digest) = &package.content_digest {
            return Ok(digest.clone());
        }

        Ok(self
            .fetch_asset(&package.filename, cache)
            .await?
            .content_digest
            .expect("fetched assets always carry a digest"))
    }

    /// Assess a local candidate package against the harvested master set.
    ///
    /// Mirrors the ingress validator but resolves the master side's content
    /// digest through the cache or a download.
    pub async fn assess_against_harvest(
        &self,
        set: &PackageSet,
        candidate: Package,
        cache: &mut AssetCache,
    ) -> Result<Admission> {
        let existing = set.get(
            &candidate.metadata.name,
            &candidate.metadata.version,
            &candidate.metadata.architecture,
        );

        match existing {
            None => Ok(Admission::Fresh(candidate)),
            Some(existing) => {
                let existing_digest = self.content_digest(existing, cache).await?;

                if existing_digest == candidate.digest() {
                    Ok(Admission::DuplicateIdentical(candidate))
                } else {
                    Ok(Admission::Conflict {
                        candidate,
                        existing_digest,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "Package: hello\nVersion: 1.0-1\nArchitecture: amd64\nMaintainer: Dev <d@e>\nFilename: pool/h/hello_1.0-1_amd64.deb\nSize: 2048\nSHA256: aabb\nDescription: Greets\n\nPackage: world\nVersion: 2.0\nArchitecture: all\nFilename: https://cdn.example.com/world_2.0_all.deb\nSize: 100\nSHA256: ccdd\n\n";

    fn parse_index(text: &str, base: &str, cache: &AssetCache) -> Result<PackageSet> {
        let mut set = PackageSet::default();
        for stanza in text.split("\n\n") {
            if stanza.trim().is_empty() {
                continue;
            }
            set.add(HarvestedPackage::from_stanza(stanza, base, cache))?;
        }
        Ok(set)
    }

    #[test]
    fn stanza_parsing_rewrites_relative_filenames() -> Result<()> {
        let set = parse_index(INDEX, "https://repo.example.com/", &AssetCache::default())?;

        assert_eq!(set.len(), 2);

        let hello = set.get("hello", "1.0-1", "amd64").unwrap();
        assert_eq!(
            hello.filename,
            "https://repo.example.com/pool/h/hello_1.0-1_amd64.deb"
        );
        assert_eq!(hello.size, 2048);
        assert_eq!(hello.file_sha256, "aabb");

        // The index-only fields are stripped from the control stanza.
        assert!(!hello.control.contains("Filename:"));
        assert!(!hello.control.contains("Size:"));
        assert!(!hello.control.contains("SHA256:"));
        assert!(hello.control.contains("Maintainer: Dev <d@e>\n"));

        // Absolute URLs are left alone.
        let world = set.get("world", "2.0", "all").unwrap();
        assert_eq!(world.filename, "https://cdn.example.com/world_2.0_all.deb");

        Ok(())
    }

    #[test]
    fn cached_content_digest_is_adopted() -> Result<()> {
        let mut cache = AssetCache::default();
        cache.insert(
            "https://repo.example.com/pool/h/hello_1.0-1_amd64.deb".to_string(),
            CachedAsset {
                file_sha256: "aabb".to_string(),
                content_digest: "feedface".to_string(),
                size: 2048,
                control: "Package: hello\n".to_string(),
            },
        );

        let set = parse_index(INDEX, "https://repo.example.com/", &cache)?;

        assert_eq!(
            set.get("hello", "1.0-1", "amd64").unwrap().content_digest,
            Some("feedface".to_string())
        );
        assert_eq!(set.get("world", "2.0", "all").unwrap().content_digest, None);

        Ok(())
    }

    #[test]
    fn duplicate_key_within_index_errors() {
        let text = format!("{}{}", INDEX, INDEX);

        assert!(matches!(
            parse_index(&text, "https://repo.example.com/", &AssetCache::default()),
            Err(RepoError::DuplicateKey(_))
        ));
    }

    #[test]
    fn merge_conflict_is_fatal() -> Result<()> {
        let cache = AssetCache::default();
        let a = parse_index(INDEX, "https://a.example.com/", &cache)?;
        let b = parse_index(INDEX, "https://b.example.com/", &cache)?;

        let mut merged = PackageSet::default();
        merged.merge(a)?;

        assert!(matches!(
            merged.merge(b),
            Err(RepoError::DuplicateKey(_))
        ));

        Ok(())
    }

    #[test]
    fn source_descriptor_index_urls() -> Result<()> {
        let flat = SourceDescriptor::Flat {
            url: "https://repo.example.com".to_string(),
        };
        assert_eq!(
            flat.index_urls()?,
            vec!["https://repo.example.com/Packages.gz"]
        );

        let hierarchical = SourceDescriptor::Hierarchical {
            url: "http://archive.ubuntu.com/ubuntu/".to_string(),
            suite: "focal".to_string(),
            component: "main".to_string(),
            architectures: vec!["amd64".to_string(), "arm64".to_string()],
        };
        assert_eq!(
            hierarchical.index_urls()?,
            vec![
                "http://archive.ubuntu.com/ubuntu/dists/focal/main/binary-amd64/Packages.gz",
                "http://archive.ubuntu.com/ubuntu/dists/focal/main/binary-arm64/Packages.gz",
            ]
        );

        let missing = SourceDescriptor::Hierarchical {
            url: "http://archive.ubuntu.com/ubuntu/".to_string(),
            suite: "focal".to_string(),
            component: "main".to_string(),
            architectures: vec![],
        };
        assert!(missing.index_urls().is_err());

        Ok(())
    }

    #[test]
    fn computed_indices_preserve_insertion_order() -> Result<()> {
        let set = parse_index(INDEX, "https://repo.example.com/", &AssetCache::default())?;

        let files = set.compute_indices(&ArchiveInfo::default(), None)?;
        let text = String::from_utf8_lossy(&files.packages).into_owned();

        let hello_pos = text.find("Package: hello").unwrap();
        let world_pos = text.find("Package: world").unwrap();
        assert!(hello_pos < world_pos);
        assert!(text.contains(
            "Filename: https://repo.example.com/pool/h/hello_1.0-1_amd64.deb\nSize: 2048\nSHA256: aabb\n"
        ));

        Ok(())
    }

    #[test]
    fn cache_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cache.json");

        let mut cache = AssetCache::default();
        cache.insert(
            "https://x/a.deb".to_string(),
            CachedAsset {
                file_sha256: "aa".to_string(),
                content_digest: "bb".to_string(),
                size: 10,
                control: "Package: a\n".to_string(),
            },
        );
        cache.save(&path)?;

        let loaded = AssetCache::load(&path)?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("https://x/a.deb").unwrap().size, 10);

        // Missing file loads as empty.
        assert!(AssetCache::load(dir.path().join("absent.json"))?.is_empty());

        Ok(())
    }
}
