// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Release-asset hosting client.

A thin collaborator around the code-hosting provider's release API: list a
repository's releases, discover `.deb` asset URLs, and upload repository
artifacts to a release tag (deleting a same-named asset first so uploads
are repeatable).
*/

use {
    crate::{
        error::{RepoError, Result},
        repository::index::IndexFiles,
    },
    serde::Deserialize,
};

const API_BASE: &str = "https://api.github.com";
const UPLOADS_BASE: &str = "https://uploads.github.com";

/// A release as returned by the hosting API.
#[derive(Clone, Debug, Deserialize)]
pub struct Release {
    pub id: i64,
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// A release asset.
#[derive(Clone, Debug, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub browser_download_url: String,
}

/// Client for release-asset operations against one hosting account.
pub struct ReleaseClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl ReleaseClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("User-Agent", "debian-repo-builder");

        if let Some(token) = &self.token {
            builder.header("Authorization", format!("token {}", token))
        } else {
            builder
        }
    }

    /// List the releases of `owner/repo`.
    pub async fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{}/{}/releases", API_BASE, owner, repo);

        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(RepoError::ReleaseAsset(format!(
                "listing releases of {}/{}: status {}",
                owner,
                repo,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Resolve a release by its tag name.
    pub async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let url = format!("{}/repos/{}/{}/releases/tags/{}", API_BASE, owner, repo, tag);

        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(RepoError::ReleaseAsset(format!(
                "release not found: {}",
                tag
            )));
        }

        Ok(response.json().await?)
    }

    /// Download URLs of every `.deb` asset across a repository's releases.
    ///
    /// With a limit, at most that many releases contribute assets, newest
    /// first.
    pub async fn deb_asset_urls(
        &self,
        owner: &str,
        repo: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let releases = self.list_releases(owner, repo).await?;

        let mut urls = vec![];

        for release in releases.iter().take(limit.unwrap_or(usize::MAX)) {
            for asset in &release.assets {
                if asset.name.ends_with(".deb") {
                    urls.push(asset.browser_download_url.clone());
                }
            }
        }

        Ok(urls)
    }

    /// Delete an asset by id.
    async fn delete_asset(&self, owner: &str, repo: &str, asset_id: i64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/releases/assets/{}",
            API_BASE, owner, repo, asset_id
        );

        self.authorize(self.client.delete(&url)).send().await?;

        Ok(())
    }

    /// Upload bytes as a release asset, replacing any same-named asset.
    pub async fn upload_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let release = self.release_by_tag(owner, repo, tag).await?;

        if let Some(existing) = release.assets.iter().find(|a| a.name == filename) {
            self.delete_asset(owner, repo, existing.id).await?;
        }

        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets?name={}",
            UPLOADS_BASE, owner, repo, release.id, filename
        );

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(RepoError::ReleaseAsset(format!(
                "upload of {} failed: status {}",
                filename,
                response.status()
            )));
        }

        Ok(())
    }

    /// Upload the index artifacts to a release tag.
    pub async fn upload_index(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        index: &IndexFiles,
    ) -> Result<()> {
        if index.release.is_empty() {
            return Err(RepoError::ReleaseAsset(
                "incomplete repository: Release missing".to_string(),
            ));
        }

        for (name, data) in index.iter_named() {
            self.upload_asset(owner, repo, tag, name, data.to_vec())
                .await?;
            log::info!("uploaded {}", name);
        }

        Ok(())
    }
}

/// The public download URL an asset will have once uploaded to a release.
pub fn predicted_download_url(owner: &str, repo: &str, tag: &str, filename: &str) -> String {
    format!(
        "https://github.com/{}/{}/releases/download/{}/{}",
        owner, repo, tag, filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_deserialization() {
        let json = r#"[{"id": 7, "tag_name": "v1.0", "assets": [{"id": 9, "name": "hello_1.0-1_amd64.deb", "browser_download_url": "https://example.com/hello_1.0-1_amd64.deb"}]}]"#;

        let releases: Vec<Release> = serde_json::from_str(json).unwrap();

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].tag_name, "v1.0");
        assert_eq!(releases[0].assets[0].name, "hello_1.0-1_amd64.deb");
    }

    #[test]
    fn predicted_url_shape() {
        assert_eq!(
            predicted_download_url("owner", "repo", "v1.0", "hello_1.0-1_amd64.deb"),
            "https://github.com/owner/repo/releases/download/v1.0/hello_1.0-1_amd64.deb"
        );
    }
}
