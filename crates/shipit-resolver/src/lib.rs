//! Startup configuration resolution for Shipit services.
//!
//! A deployed process carries exactly two identifiers in its environment: a
//! reference to its infrastructure stack and a reference to its secret
//! record. This crate turns those into one validated, immutable
//! [`ResolvedConfig`](shipit_core::ResolvedConfig) before the process serves
//! any work, failing fast with the complete defect set otherwise.

pub mod env;
pub mod http;
pub mod resolver;
pub mod sources;

pub use env::{EnvInputs, SECRET_REF_VAR, STACK_REF_VAR};
pub use resolver::{DEFAULT_FETCH_TIMEOUT, Resolver};
pub use sources::{SecretFetcher, StackDescriber};
