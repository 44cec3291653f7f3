//! Builders for the binary formats and catalog rows tests run against

pub(crate) mod archive;
pub(crate) mod catalog;
pub(crate) mod cryxml;
pub(crate) mod dcb;
pub(crate) mod game;

pub(crate) use archive::ArchiveBuilder;
