//! # mkc - Multipass-backed Kubernetes cluster manager
//!
//! Facade crate that re-exports the mkc workspace crates so consumers can
//! depend on a single `mkc` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | mkc-core | Config tree + merge, quantities, node resolution, cluster model |
//! | [`runtime`] | mkc-runtime | Shell execution, multipass gateway, lifecycle orchestration |
//! | [`cli`] | mkc-cli | Clap commands, display rows, output rendering |

pub use mkc_cli as cli;
pub use mkc_core as core;
pub use mkc_runtime as runtime;
