//! autodev forge clients
//!
//! HTTP implementations of the collaborator seams defined in
//! `autodev-core`: `GithubForge` for the tracking/hosting forge and
//! `OllamaBackend` for the change-generation service.

pub mod github;
pub mod ollama;

pub use github::{ForgeConfig, GithubForge};
pub use ollama::{OllamaBackend, OllamaConfig};
