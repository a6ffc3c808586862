// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem emission target. */

use {
    crate::error::{RepoError, Result},
    std::path::Path,
};

/// Write named files under a root directory.
///
/// Parent directories are created as needed and every file is written with
/// mode 0644. Relative member names may contain `/` separators.
pub fn write_files<'a, 'b>(
    root: &Path,
    files: impl Iterator<Item = (&'a str, &'b [u8])>,
) -> Result<()> {
    for (name, data) in files {
        let dest = root.join(name);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepoError::IoPath(parent.display().to_string(), e))?;
        }

        std::fs::write(&dest, data)
            .map_err(|e| RepoError::IoPath(dest.display().to_string(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o644))
                .map_err(|e| RepoError::IoPath(dest.display().to_string(), e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_members() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let members: Vec<(String, Vec<u8>)> = vec![
            ("Packages".to_string(), b"data".to_vec()),
            (
                "dists/stable/main/binary-amd64/Packages".to_string(),
                b"nested".to_vec(),
            ),
        ];

        write_files(
            dir.path(),
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )?;

        assert_eq!(std::fs::read(dir.path().join("Packages"))?, b"data");
        assert_eq!(
            std::fs::read(dir.path().join("dists/stable/main/binary-amd64/Packages"))?,
            b"nested"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(dir.path().join("Packages"))?
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o644);
        }

        Ok(())
    }
}
