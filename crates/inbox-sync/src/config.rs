//! Configuration for the sync engine.

use std::env;

use crm_gateway::Channel;

use crate::error::SyncError;

/// Configuration for a [`SyncStore`](crate::SyncStore).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tenant of the signed-in operator. Push events for any other tenant
    /// are dropped.
    pub tenant_id: String,

    /// Channel used for sends that do not name one.
    pub default_channel: Channel,
}

impl SyncConfig {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            default_channel: Channel::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `CRM_TENANT_ID` - Tenant of the signed-in operator
    ///
    /// Optional environment variables:
    /// - `CRM_DEFAULT_CHANNEL` - Channel for sends (default: whatsapp)
    pub fn from_env() -> Result<Self, SyncError> {
        let tenant_id = env::var("CRM_TENANT_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SyncError::Config("CRM_TENANT_ID not set".to_string()))?;

        let default_channel = env::var("CRM_DEFAULT_CHANNEL")
            .map(Channel::from)
            .unwrap_or_default();

        Ok(Self {
            tenant_id,
            default_channel,
        })
    }

    pub fn with_default_channel(mut self, channel: Channel) -> Self {
        self.default_channel = channel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_to_whatsapp() {
        let config = SyncConfig::new("t1");
        assert_eq!(config.tenant_id, "t1");
        assert_eq!(config.default_channel, Channel::Whatsapp);

        let config = config.with_default_channel(Channel::Telegram);
        assert_eq!(config.default_channel, Channel::Telegram);
    }
}
