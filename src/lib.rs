// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository building primitives.

This crate builds and manages Debian-style package archives (APT
repositories). It consumes `.deb` package files, aggregates them with
metadata harvested from upstream repositories, and emits the canonical
index files that Debian-derived package managers consume.

The defining property is content immutability with stateless
reconciliation: given the same configuration and inputs, the output is
deterministic; re-publishing an already-published version either matches
the stored content exactly (a no-op) or fails.

# A Tour of Functionality

`.deb` files are read and written by the [deb] module: the outer `ar`
container in [deb::reader], the inner compressed tar archives in both
[deb::reader] and [deb::builder].

Control files consist of paragraphs of key-value metadata. Low-level
primitives live in [control]: [control::ControlParagraph] holds an ordered
series of [control::ControlField] and [control::ControlParagraphReader]
streams paragraphs out of index files.

[package::Package] is the structured model of one binary package. It
parses from and serializes to `.deb` bytes and computes the semantic
content digest used for immutability decisions. [package_version] handles
Debian version strings: parsing, the full comparison algorithm, and the
version bump operation.

[repository::Repository] holds an ordered package collection with
append-once semantics, emitting flat repositories to directories or
tarballs; [repository::pool::HierarchicalRepository] emits the standard
`dists/` + `pool/` layout. Release manifests are modeled in
[repository::release] and clearsigned via [signing], which wraps the
repository signing key.

[validate] decides whether a candidate `.deb` is fresh, an identical
re-upload, or a conflict against a reference repository. [harvest] pulls
package stanzas from remote flat or hierarchical repositories with a
content-hash cache, and [github] is a thin client for release-asset
hosting. [config] loads the YAML build configuration and [cli] is the
`debrepo` command line surface.
*/

pub mod cli;
pub mod config;
pub mod control;
pub mod deb;
pub mod error;
pub mod github;
pub mod harvest;
pub mod package;
pub mod package_version;
pub mod repository;
pub mod signing;
pub mod validate;
