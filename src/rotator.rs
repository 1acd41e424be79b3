//! Network identity rotation (e.g. reconnecting a VPN to a new exit).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RotatorConfig;
use crate::rate_limit::Retryable;

#[derive(Error, Debug)]
pub enum RotateError {
    #[error("Failed to spawn rotation command: {0}")]
    Spawn(String),

    #[error("Rotation command failed: {0}")]
    CommandFailed(String),
}

impl Retryable for RotateError {
    fn is_retryable(&self) -> bool {
        matches!(self, RotateError::CommandFailed(_))
    }
}

#[async_trait]
pub trait IdentityRotator: Send + Sync {
    /// Switch to a fresh network identity. Returns once the new identity is usable.
    async fn rotate(&self) -> Result<(), RotateError>;
}

/// Runs the configured command, then waits for the new route to settle
pub struct CommandRotator {
    command: String,
    args: Vec<String>,
    settle_delay: Duration,
}

impl CommandRotator {
    pub fn new(command: impl Into<String>, args: Vec<String>, settle_delay: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            settle_delay,
        }
    }

    /// `None` when no rotation command is configured
    pub fn from_config(config: &RotatorConfig, settle_delay: Duration) -> Option<Self> {
        config
            .command
            .as_ref()
            .filter(|command| !command.trim().is_empty())
            .map(|command| Self::new(command.clone(), config.args.clone(), settle_delay))
    }
}

#[async_trait]
impl IdentityRotator for CommandRotator {
    async fn rotate(&self) -> Result<(), RotateError> {
        debug!("Running rotation command: {} {:?}", self.command, self.args);

        let output = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RotateError::Spawn(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RotateError::CommandFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        tokio::time::sleep(self.settle_delay).await;
        info!("Network identity rotated");
        Ok(())
    }
}

/// Used when no rotation command is configured
#[derive(Debug, Default)]
pub struct NoopRotator;

#[async_trait]
impl IdentityRotator for NoopRotator {
    async fn rotate(&self) -> Result<(), RotateError> {
        debug!("No rotation command configured, keeping current identity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_command() {
        let config = RotatorConfig::default();
        assert!(CommandRotator::from_config(&config, Duration::ZERO).is_none());

        let blank = RotatorConfig {
            command: Some("  ".to_string()),
            args: vec![],
        };
        assert!(CommandRotator::from_config(&blank, Duration::ZERO).is_none());

        let configured = RotatorConfig {
            command: Some("vpn-rotate".to_string()),
            args: vec!["--random".to_string()],
        };
        let rotator = CommandRotator::from_config(&configured, Duration::ZERO).unwrap();
        assert_eq!(rotator.command, "vpn-rotate");
        assert_eq!(rotator.args, vec!["--random"]);
    }

    #[test]
    fn test_spawn_failure_is_not_retried() {
        assert!(!RotateError::Spawn("missing".into()).is_retryable());
        assert!(RotateError::CommandFailed("exit 1".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_error() {
        let rotator = CommandRotator::new("employerfinder-no-such-binary", vec![], Duration::ZERO);
        assert!(matches!(rotator.rotate().await, Err(RotateError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_noop_rotator_succeeds() {
        assert!(NoopRotator.rotate().await.is_ok());
    }
}
