// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Quayside publishes zipped static-site projects.
//!
//! A deploy request carries a zip archive and a project name. Quayside
//! extracts the archive, repairs the tree the way uploaders actually break
//! it (wrapper folders, version-control droppings, OS clutter), publishes
//! the result as a version-controlled repository on a remote host, and asks
//! a static-site host to build and serve it. A handful of auxiliary
//! endpoints edit individual files in published repositories and proxy a
//! text-completion service.
//!
//! The interesting piece is [`normalize`]: a deterministic, in-place repair
//! of an extracted archive tree. Everything else is sequential orchestration
//! against external services, with the policy for tolerated versus fatal
//! failures concentrated in [`publish`].

pub mod archive;
pub mod config;
pub mod normalize;
pub mod publish;
pub mod remote;
pub mod repo;
pub mod server;

pub use crate::{
    archive::extract_archive,
    config::{default_config_path, Config},
    normalize::TreeNormalizer,
    publish::{Publication, PublishRequest, Publisher},
    server::{build_router, serve, AppState},
};
