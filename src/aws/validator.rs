//! Account credential validation.
//!
//! Runs inside the assume-role scope of a deployment, before any module
//! executes: verifies the active AWS account id and alias against the
//! deployment's expectations and surfaces the account id for environment
//! gating.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CredentialError, Result};

use super::{AssumedCredentials, AwsFacade};

/// Expected account identity for one deployment and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedAccount {
    /// Expected account id, if configured.
    pub account_id: Option<String>,
    /// Expected account alias, if configured.
    pub account_alias: Option<String>,
}

impl ExpectedAccount {
    /// Returns true when any expectation is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.account_id.is_some() || self.account_alias.is_some()
    }
}

/// Validates the active AWS identity against configuration.
#[derive(Clone)]
pub struct AccountValidator {
    facade: Arc<dyn AwsFacade>,
}

impl AccountValidator {
    /// Creates a validator over the given facade.
    #[must_use]
    pub fn new(facade: Arc<dyn AwsFacade>) -> Self {
        Self { facade }
    }

    /// Validates the active identity and returns the account id when it
    /// could be determined.
    ///
    /// When an expectation is configured, the identity queries must
    /// succeed and match; a mismatch is fatal. Without expectations the
    /// account id is still fetched for gating, but a failed query only
    /// logs and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on account id/alias mismatch, or when an identity
    /// query required by configuration fails.
    pub async fn validate(
        &self,
        expected: &ExpectedAccount,
        credentials: Option<&AssumedCredentials>,
        region: Option<&str>,
    ) -> Result<Option<String>> {
        let account_id = if expected.account_id.is_some() {
            Some(self.facade.account_id(credentials, region).await?)
        } else {
            match self.facade.account_id(credentials, region).await {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Account id unavailable ({e}); account gating will not match");
                    None
                }
            }
        };

        if let (Some(expected_id), Some(actual)) = (&expected.account_id, &account_id) {
            if expected_id != actual {
                return Err(CredentialError::AccountIdMismatch {
                    expected: expected_id.clone(),
                    actual: actual.clone(),
                }
                .into());
            }
            info!("Verified account id: {actual}");
        }

        if let Some(expected_alias) = &expected.account_alias {
            let aliases = self.facade.account_aliases(credentials, region).await?;
            if !aliases.iter().any(|alias| alias == expected_alias) {
                return Err(CredentialError::AccountAliasMismatch {
                    expected: expected_alias.clone(),
                    aliases: aliases.join(", "),
                }
                .into());
            }
            info!("Verified account alias: {expected_alias}");
        }

        Ok(account_id)
    }
}

impl std::fmt::Debug for AccountValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::MockAwsFacade;
    use crate::error::RunwayError;

    fn expected(id: Option<&str>, alias: Option<&str>) -> ExpectedAccount {
        ExpectedAccount {
            account_id: id.map(ToString::to_string),
            account_alias: alias.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn test_matching_account_id_passes() {
        let mut facade = MockAwsFacade::new();
        facade
            .expect_account_id()
            .returning(|_, _| Ok(String::from("111111111111")));

        let validator = AccountValidator::new(Arc::new(facade));
        let account = validator
            .validate(&expected(Some("111111111111"), None), None, None)
            .await
            .unwrap();
        assert_eq!(account.as_deref(), Some("111111111111"));
    }

    #[tokio::test]
    async fn test_mismatched_account_id_is_fatal() {
        let mut facade = MockAwsFacade::new();
        facade
            .expect_account_id()
            .returning(|_, _| Ok(String::from("222222222222")));

        let validator = AccountValidator::new(Arc::new(facade));
        let err = validator
            .validate(&expected(Some("111111111111"), None), None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunwayError::Credential(CredentialError::AccountIdMismatch { .. })
        ));
        let message = err.to_string();
        assert!(message.contains("111111111111"));
        assert!(message.contains("222222222222"));
    }

    #[tokio::test]
    async fn test_alias_membership_checked() {
        let mut facade = MockAwsFacade::new();
        facade
            .expect_account_id()
            .returning(|_, _| Ok(String::from("111111111111")));
        facade
            .expect_account_aliases()
            .returning(|_, _| Ok(vec![String::from("team-dev"), String::from("team-shared")]));

        let validator = AccountValidator::new(Arc::new(facade));
        assert!(validator
            .validate(&expected(None, Some("team-dev")), None, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_alias_mismatch_is_fatal() {
        let mut facade = MockAwsFacade::new();
        facade
            .expect_account_id()
            .returning(|_, _| Ok(String::from("111111111111")));
        facade
            .expect_account_aliases()
            .returning(|_, _| Ok(vec![String::from("team-dev")]));

        let validator = AccountValidator::new(Arc::new(facade));
        let err = validator
            .validate(&expected(None, Some("team-prod")), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Credential(CredentialError::AccountAliasMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_identity_failure_is_tolerated() {
        let mut facade = MockAwsFacade::new();
        facade.expect_account_id().returning(|_, _| {
            Err(CredentialError::IdentityUnavailable {
                message: String::from("no credentials"),
            }
            .into())
        });

        let validator = AccountValidator::new(Arc::new(facade));
        let account = validator
            .validate(&ExpectedAccount::default(), None, None)
            .await
            .unwrap();
        assert!(account.is_none());
    }
}
