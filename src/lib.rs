//! Library to backup files, MySQL databases and LDAP directories.
//!
//! A backup run of a [`job::Job`] stages its sources (see [`sources`]) into a
//! working directory, packs them with [`archive`], optionally encrypts the
//! tarball with [`crypto`] and hands it to one of the storage [`backends`].
//! Restoring reverses that pipeline for the newest backup found on the target.

#![forbid(unsafe_code)]

pub mod archive;
pub mod backends;
pub mod cli;
pub mod command;
pub mod config;
pub mod crypto;
pub mod job;
pub mod naming;
pub mod sources;
pub mod util;
