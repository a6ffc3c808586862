// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writing .deb package archives. */

use {
    crate::{
        deb::{
            gzip_bytes, DEBIAN_BINARY_BODY, MEMBER_CONTROL_TAR_GZ, MEMBER_DATA_TAR_GZ,
            MEMBER_DEBIAN_BINARY,
        },
        error::Result,
    },
    std::io::{Read, Write},
};

/// A file destined for an inner tar archive.
pub struct TarMember<'a> {
    /// Path inside the archive, without the `./` prefix.
    pub path: String,

    /// Permission bits.
    pub mode: u32,

    /// Modification time, seconds since the epoch.
    pub mtime: u64,

    /// File contents.
    pub data: &'a [u8],
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &str,
) -> Result<()> {
    // Debian archives in the wild have entry names beginning with `./`. We
    // cannot call `header.set_path()` with a `./` prefix because it would
    // normalize the prefix away, so the name buffer is written directly.
    let value = format!("./{}", path);
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Too long for the header: emit a GNU longname extension entry.
        let mut header2 = tar::Header::new_gnu();
        let name = b"././@LongLink";
        header2.as_gnu_mut().unwrap().name[..name.len()].clone_from_slice(&name[..]);
        header2.set_mode(0o644);
        header2.set_uid(0);
        header2.set_gid(0);
        header2.set_mtime(0);
        header2.set_size(value_bytes.len() as u64 + 1);
        header2.set_entry_type(tar::EntryType::new(b'L'));
        header2.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&header2, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write an inner tar archive holding the given members, in order.
///
/// Only regular file entries are emitted; the file tree is implied by the
/// entry paths.
pub fn write_inner_tar<W: Write>(writer: W, members: &[TarMember<'_>]) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    for member in members {
        let mut header = new_tar_header(member.mtime)?;
        set_header_path(&mut builder, &mut header, &member.path)?;
        header.set_mode(member.mode);
        header.set_size(member.data.len() as u64);
        header.set_cksum();
        builder.append(&header, member.data)?;
    }

    builder.finish()?;

    Ok(())
}

/// Build a gzip-compressed inner tar archive.
pub fn build_inner_tar_gz(members: &[TarMember<'_>]) -> Result<Vec<u8>> {
    let mut tar_data = vec![];
    write_inner_tar(&mut tar_data, members)?;

    gzip_bytes(&tar_data)
}

fn append_ar_member<W: Write>(
    builder: &mut ar::Builder<W>,
    name: &str,
    data: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    builder.append(&header, data)?;

    Ok(())
}

/// Assemble the outer `.deb` container from prepared member bodies.
///
/// Members are emitted in the canonical order with mode 0644 and a single
/// modification time.
pub fn write_deb_archive<W: Write>(
    writer: &mut W,
    control_tar_gz: &[u8],
    data_tar_gz: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut builder = ar::Builder::new(writer);

    append_ar_member(&mut builder, MEMBER_DEBIAN_BINARY, DEBIAN_BINARY_BODY, mtime)?;
    append_ar_member(&mut builder, MEMBER_CONTROL_TAR_GZ, control_tar_gz, mtime)?;
    append_ar_member(&mut builder, MEMBER_DATA_TAR_GZ, data_tar_gz, mtime)?;

    Ok(())
}
