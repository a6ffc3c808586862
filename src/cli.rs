// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Command line interface.

Two commands:

- `build` harvests the configured sources, admits configured packages, and
  writes the flat index artifacts to the output directory, optionally
  uploading them to a release tag.
- `add` inserts local `.deb` files into a repository tarball with a
  configurable conflict strategy.
*/

use {
    crate::{
        config::Config,
        error::{RepoError, Result},
        github::ReleaseClient,
        harvest::{AssetCache, HarvestedPackage, Harvester},
        package::Package,
        package_version::bump_version,
        repository::Repository,
        signing::load_signing_key,
        validate::{assess_file, Admission},
    },
    clap::{Arg, ArgMatches, Command},
    sha2::{Digest, Sha256},
    std::path::{Path, PathBuf},
};

const ENV_TOKEN: &str = "GITHUB_TOKEN";
const ENV_SIGNING_KEY: &str = "GPG_PRIVATE_KEY";

/// Conflict resolution strategy for `add`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// Fail on any content conflict.
    Strict,

    /// Bump the version past the newest matching upstream release and
    /// insert.
    Bump,

    /// Replace the existing record.
    Overwrite,
}

impl std::str::FromStr for Strategy {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(Self::Strict),
            "bump" => Ok(Self::Bump),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(RepoError::Config(format!(
                "unknown strategy: {} (expected strict, bump, or overwrite)",
                other
            ))),
        }
    }
}

/// Apply an admission verdict to a repository under the given strategy.
pub fn admit_with_strategy(
    repository: &mut Repository,
    admission: Admission,
    strategy: Strategy,
) -> Result<()> {
    match admission {
        Admission::Fresh(package) => {
            repository.append(package)?;

            Ok(())
        }
        Admission::DuplicateIdentical(package) => {
            log::info!(
                "{} already present with identical content",
                package.standard_filename()
            );

            Ok(())
        }
        Admission::Conflict { candidate, .. } => match strategy {
            Strategy::Strict => Err(RepoError::ConflictDifferentContent(
                candidate.metadata.name.clone(),
                candidate.metadata.version.clone(),
                candidate.metadata.architecture.clone(),
            )),
            Strategy::Overwrite => {
                repository.overwrite(candidate);

                Ok(())
            }
            Strategy::Bump => {
                let mut candidate = candidate;

                let latest = repository
                    .by_upstream(
                        &candidate.metadata.name,
                        candidate.upstream_version(),
                        &candidate.metadata.architecture,
                    )
                    .first()
                    .map(|p| p.metadata.version.clone());

                let base = latest.unwrap_or_else(|| candidate.metadata.version.clone());
                candidate.set("Version", &bump_version(&base));

                repository.append(candidate)?;

                Ok(())
            }
        },
    }
}

pub fn command() -> Command {
    Command::new("debrepo")
        .about("Build and manage Debian package repositories")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("build")
                .about("Build repository indices from configured sources")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("PATH")
                        .default_value("apt-repo.yaml")
                        .help("Path to the repository configuration file"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("DIR")
                        .default_value("dist")
                        .help("Output directory for the repository indices"),
                )
                .arg(
                    Arg::new("cache-file")
                        .long("cache-file")
                        .value_name("PATH")
                        .default_value("repo-cache.json")
                        .help("Path to the asset cache file"),
                )
                .arg(
                    Arg::new("upload")
                        .long("upload")
                        .value_name("OWNER/REPO")
                        .help("Upload the index artifacts to this repository's release"),
                )
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .value_name("TAG")
                        .help("Release tag receiving uploaded artifacts"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Add local .deb files to a repository tarball")
                .arg(
                    Arg::new("repo")
                        .long("repo")
                        .value_name("PATH")
                        .required(true)
                        .help("Path to the repository tarball (created if missing)"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_name("NAME")
                        .default_value("strict")
                        .help("Conflict resolution strategy (strict, bump, overwrite)"),
                )
                .arg(
                    Arg::new("debs")
                        .value_name("DEB")
                        .num_args(1..)
                        .required(true)
                        .help(".deb files to add"),
                ),
        )
}

/// Parse arguments and dispatch.
pub async fn run() -> Result<()> {
    let matches = command().get_matches();

    match matches.subcommand() {
        Some(("build", args)) => command_build(args).await,
        Some(("add", args)) => command_add(args),
        _ => unreachable!("subcommand is required"),
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

async fn command_build(args: &ArgMatches) -> Result<()> {
    let config_path = args.get_one::<String>("config").expect("has default");
    let output_dir = PathBuf::from(args.get_one::<String>("output").expect("has default"));
    let cache_path = args.get_one::<String>("cache-file").expect("has default");

    let config = Config::from_path(config_path)?;
    let mut cache = AssetCache::load(cache_path)?;

    let signing_key = match env_non_empty(ENV_SIGNING_KEY) {
        Some(armored) => Some(load_signing_key(&armored)?),
        None => None,
    };

    let harvester = Harvester::new(env_non_empty(ENV_TOKEN));

    let mut set = harvester
        .harvest(&config.source_descriptors(), &cache)
        .await?;

    // Packages named in the configuration: URLs are fetched and indexed in
    // place; local files are validated against the harvested master set and
    // copied next to the indices. Codec and fetch errors skip the file;
    // content conflicts are fatal to the build.
    let mut local_files: Vec<(String, Vec<u8>)> = vec![];

    for entry in &config.packages {
        match admit_configured_package(entry, &harvester, &mut set, &mut cache, &mut local_files)
            .await
        {
            Ok(()) => {}
            Err(e @ RepoError::ConflictDifferentContent(..))
            | Err(e @ RepoError::DuplicateKey(..)) => {
                return Err(e);
            }
            Err(e) => {
                log::warn!("skipping package {}: {}", entry, e);
            }
        }
    }

    let index_files = set.compute_indices(&config.archive_info.clone().into(), signing_key.as_ref())?;

    index_files.save_to(&output_dir)?;
    crate::repository::filesystem::write_files(
        &output_dir,
        local_files.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
    )?;

    cache.save(cache_path)?;

    log::info!(
        "indexed {} packages into {}",
        set.len(),
        output_dir.display()
    );

    if let Some(slug) = args.get_one::<String>("upload") {
        let tag = args
            .get_one::<String>("tag")
            .ok_or_else(|| RepoError::Config("--upload requires --tag".to_string()))?;
        let (owner, repo) = slug
            .split_once('/')
            .ok_or_else(|| RepoError::Config("--upload expects OWNER/REPO".to_string()))?;

        let client = ReleaseClient::new(env_non_empty(ENV_TOKEN));

        client.upload_index(owner, repo, tag, &index_files).await?;

        for (name, data) in &local_files {
            client
                .upload_asset(owner, repo, tag, name, data.clone())
                .await?;
            log::info!("uploaded {}", name);
        }
    }

    Ok(())
}

/// Admit one configured package (URL or local path) into the harvested set.
async fn admit_configured_package(
    entry: &str,
    harvester: &Harvester,
    set: &mut crate::harvest::PackageSet,
    cache: &mut AssetCache,
    local_files: &mut Vec<(String, Vec<u8>)>,
) -> Result<()> {
    if entry.starts_with("http://") || entry.starts_with("https://") {
        let package = harvester.fetch_asset(entry, cache).await?;

        if let Some(existing) = set.get(&package.name, &package.version, &package.architecture) {
            let existing_digest = harvester.content_digest(existing, cache).await?;

            if Some(existing_digest) == package.content_digest {
                log::info!("{} already indexed with identical content", entry);
                return Ok(());
            }

            return Err(RepoError::ConflictDifferentContent(
                package.name,
                package.version,
                package.architecture,
            ));
        }

        set.add(package)
    } else {
        let data =
            std::fs::read(entry).map_err(|e| RepoError::IoPath(entry.to_string(), e))?;
        let candidate = Package::parse_bytes(&data)?;

        match harvester.assess_against_harvest(set, candidate, cache).await? {
            Admission::Fresh(package) => {
                let filename = package.standard_filename();

                set.add(HarvestedPackage {
                    name: package.metadata.name.clone(),
                    version: package.metadata.version.clone(),
                    architecture: package.metadata.architecture.clone(),
                    control: package.control_text(),
                    filename: filename.clone(),
                    size: data.len() as u64,
                    file_sha256: hex::encode(Sha256::digest(&data)),
                    content_digest: Some(package.digest()),
                })?;

                local_files.push((filename, data));

                Ok(())
            }
            Admission::DuplicateIdentical(package) => {
                log::info!(
                    "{} already indexed with identical content",
                    package.standard_filename()
                );

                Ok(())
            }
            Admission::Conflict { candidate, .. } => Err(RepoError::ConflictDifferentContent(
                candidate.metadata.name.clone(),
                candidate.metadata.version.clone(),
                candidate.metadata.architecture.clone(),
            )),
        }
    }
}

fn command_add(args: &ArgMatches) -> Result<()> {
    let repo_path = Path::new(args.get_one::<String>("repo").expect("required"));
    let strategy: Strategy = args
        .get_one::<String>("strategy")
        .expect("has default")
        .parse()?;

    let mut repository = if repo_path.exists() {
        let file = std::fs::File::open(repo_path)
            .map_err(|e| RepoError::IoPath(repo_path.display().to_string(), e))?;

        Repository::from_tarball(file)?
    } else {
        let mut repository = Repository::default();
        repository.archive_info.origin = "debrepo".to_string();
        repository.archive_info.label = "Managed Repository".to_string();
        repository
    };

    if let Some(armored) = env_non_empty(ENV_SIGNING_KEY) {
        repository.signing_key = Some(load_signing_key(&armored)?);
    }

    for deb in args
        .get_many::<String>("debs")
        .expect("at least one required")
    {
        let admission = assess_file(deb, &repository)?;
        admit_with_strategy(&mut repository, admission, strategy)?;
    }

    let file = std::fs::File::create(repo_path)
        .map_err(|e| RepoError::IoPath(repo_path.display().to_string(), e))?;

    repository.write_tarball(file)?;

    log::info!(
        "repository {} now holds {} packages",
        repo_path.display(),
        repository.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::package::PayloadFile,
        crate::validate::assess_package,
    };

    fn hello_package(version: &str) -> Package {
        let mut p = Package::new("hello", version, "amd64").unwrap();
        p.metadata.maintainer = "Dev <d@e>".to_string();
        p.metadata.description = "Greets".to_string();
        p.files.push(PayloadFile {
            dest_path: "/usr/bin/hello".to_string(),
            mode: 0o755,
            data: b"#!/bin/sh\necho hi\n".to_vec(),
            is_conffile: false,
            mtime: 0,
        });
        p
    }

    #[test]
    fn command_parses_build_flags() {
        let matches = command()
            .try_get_matches_from([
                "debrepo",
                "build",
                "--config",
                "repo.yaml",
                "--output",
                "out",
                "--cache-file",
                "cache.json",
            ])
            .unwrap();

        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "build");
        assert_eq!(args.get_one::<String>("config").unwrap(), "repo.yaml");
        assert_eq!(args.get_one::<String>("output").unwrap(), "out");
    }

    #[test]
    fn command_requires_debs_for_add() {
        assert!(command()
            .try_get_matches_from(["debrepo", "add", "--repo", "repo.tar.gz"])
            .is_err());
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("strict".parse::<Strategy>().unwrap(), Strategy::Strict);
        assert_eq!("bump".parse::<Strategy>().unwrap(), Strategy::Bump);
        assert_eq!(
            "overwrite".parse::<Strategy>().unwrap(),
            Strategy::Overwrite
        );
        assert!("safe".parse::<Strategy>().is_err());
    }

    #[test]
    fn strict_strategy_fails_on_conflict() -> Result<()> {
        let mut repo = Repository::default();
        repo.append(hello_package("1.0-1"))?;

        let mut changed = hello_package("1.0-1");
        changed.files[0].data[0] ^= 1;

        let admission = assess_package(changed, &repo);
        assert!(matches!(
            admit_with_strategy(&mut repo, admission, Strategy::Strict),
            Err(RepoError::ConflictDifferentContent(..))
        ));

        Ok(())
    }

    #[test]
    fn bump_strategy_inserts_next_iteration() -> Result<()> {
        let mut repo = Repository::default();
        repo.append(hello_package("1.0-1"))?;
        repo.append(hello_package("1.0-2"))?;

        let mut changed = hello_package("1.0-1");
        changed.files[0].data[0] ^= 1;

        let admission = assess_package(changed, &repo);
        admit_with_strategy(&mut repo, admission, Strategy::Bump)?;

        assert_eq!(repo.len(), 3);
        assert!(repo.get("hello", "1.0-3", "amd64").is_some());

        Ok(())
    }

    #[test]
    fn overwrite_strategy_replaces() -> Result<()> {
        let mut repo = Repository::default();
        repo.append(hello_package("1.0-1"))?;

        let mut changed = hello_package("1.0-1");
        changed.files[0].data = b"#!/bin/sh\necho replaced\n".to_vec();
        let expected = changed.digest();

        let admission = assess_package(changed, &repo);
        admit_with_strategy(&mut repo, admission, Strategy::Overwrite)?;

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("hello", "1.0-1", "amd64").unwrap().digest(), expected);

        Ok(())
    }

    #[test]
    fn identical_admission_is_a_no_op() -> Result<()> {
        let mut repo = Repository::default();
        repo.append(hello_package("1.0-1"))?;

        let admission = assess_package(hello_package("1.0-1"), &repo);
        admit_with_strategy(&mut repo, admission, Strategy::Strict)?;

        assert_eq!(repo.len(), 1);

        Ok(())
    }
}
