//! AWS credential handling behind a narrow facade.
//!
//! The orchestrator never talks to AWS directly; it depends on the
//! [`AwsFacade`] trait for role assumption and identity queries. The
//! production implementation is [`StsFacade`]; tests substitute a mock.

pub mod sts;
pub mod validator;

use async_trait::async_trait;

use crate::config::AssumeRole;
use crate::environment::DeployEnvironment;
use crate::error::Result;

pub use sts::StsFacade;
pub use validator::{AccountValidator, ExpectedAccount};

/// Temporary credentials produced by assuming a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumedCredentials {
    /// Access key id of the session.
    pub access_key_id: String,
    /// Secret access key of the session.
    pub secret_access_key: String,
    /// Session token of the session.
    pub session_token: String,
}

impl AssumedCredentials {
    /// Exports the credentials into an environment copy so tool
    /// subprocesses inherit the assumed identity.
    pub fn apply_to(&self, environment: &mut DeployEnvironment) {
        environment.set_var("AWS_ACCESS_KEY_ID", &self.access_key_id);
        environment.set_var("AWS_SECRET_ACCESS_KEY", &self.secret_access_key);
        environment.set_var("AWS_SESSION_TOKEN", &self.session_token);
    }
}

/// Narrow facade over the AWS SDK.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AwsFacade: Send + Sync {
    /// Assumes an IAM role, returning session credentials.
    async fn assume_role<'a>(
        &'a self,
        role: &'a AssumeRole,
        region: Option<&'a str>,
    ) -> Result<AssumedCredentials>;

    /// Returns the account id of the active identity.
    async fn account_id<'a>(
        &'a self,
        credentials: Option<&'a AssumedCredentials>,
        region: Option<&'a str>,
    ) -> Result<String>;

    /// Returns the aliases of the active account.
    async fn account_aliases<'a>(
        &'a self,
        credentials: Option<&'a AssumedCredentials>,
        region: Option<&'a str>,
    ) -> Result<Vec<String>>;
}
