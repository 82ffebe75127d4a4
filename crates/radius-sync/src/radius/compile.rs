//! Entitlement → attribute-row compilation
//!
//! | status   | password row | group membership | Framed-IP-Address |
//! |----------|--------------|------------------|-------------------|
//! | active   | present      | profile group    | if static IP      |
//! | isolated | present      | isolation group  | deleted           |
//! | blocked  | deleted      | deleted          | deleted           |

use super::{
    CLEARTEXT_PASSWORD, FRAMED_IP_ADDRESS, GroupMembership, GroupPlan, RadiusAttribute,
    RadiusChange, SESSION_TIMEOUT, SIMULTANEOUS_USE, UserPlan,
};
use crate::config::AttributeConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{Profile, Subscriber, SubscriberStatus, Voucher, VoucherStatus};

/// Deterministic group owned by a single voucher
///
/// Each voucher carries its own Session-Timeout and rate limit, which a
/// shared profile group cannot express, so the group name is rebuilt from
/// the profile name and the code whenever rows are written or removed.
pub fn voucher_group_name(profile_name: &str, code: &str) -> String {
    let profile: String = profile_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", profile, code)
}

#[derive(Debug, Clone, Default)]
pub struct AttributeCompiler {
    config: AttributeConfig,
}

impl AttributeCompiler {
    pub fn new(config: AttributeConfig) -> Self {
        AttributeCompiler { config }
    }

    pub fn isolation_group(&self) -> &str {
        &self.config.isolation_group
    }

    fn password_rows(&self, password: &str, profile: Option<&Profile>) -> Vec<RadiusAttribute> {
        let mut check = vec![RadiusAttribute::set(CLEARTEXT_PASSWORD, password)];
        if let Some(limit) = profile.and_then(|p| p.shared_users) {
            check.push(RadiusAttribute::set(SIMULTANEOUS_USE, limit));
        }
        check
    }

    /// Rows for a subscriber in `status`
    ///
    /// `profile` is required for `active`; it is optional otherwise and only
    /// contributes the `Simultaneous-Use` limit.
    pub fn subscriber(
        &self,
        subscriber: &Subscriber,
        status: SubscriberStatus,
        profile: Option<&Profile>,
    ) -> SyncResult<RadiusChange> {
        let user = match status {
            SubscriberStatus::Active => {
                let profile =
                    profile.ok_or_else(|| SyncError::not_found("Profile", subscriber.profile_id))?;
                if profile.group_name == self.config.isolation_group {
                    return Err(SyncError::Validation(format!(
                        "profile '{}' uses the isolation group '{}'",
                        profile.name, profile.group_name
                    )));
                }

                let reply = subscriber
                    .ip_address
                    .map(|ip| vec![RadiusAttribute::set(FRAMED_IP_ADDRESS, ip)])
                    .unwrap_or_default();

                UserPlan::Replace {
                    check: self.password_rows(&subscriber.password, Some(profile)),
                    reply,
                    groups: vec![GroupMembership::new(&profile.group_name)],
                }
            }
            // Dropping Framed-IP-Address makes the NAS hand out a pool address
            SubscriberStatus::Isolated => UserPlan::Replace {
                check: self.password_rows(&subscriber.password, profile),
                reply: Vec::new(),
                groups: vec![GroupMembership::new(&self.config.isolation_group)],
            },
            SubscriberStatus::Blocked => UserPlan::Purge,
        };

        Ok(RadiusChange {
            username: subscriber.username.clone(),
            user,
            group: None,
            drop_groups: Vec::new(),
        })
    }

    /// Rows for a voucher: its password, its private group and that
    /// group's reply attributes. Expired vouchers lose everything.
    pub fn voucher(&self, voucher: &Voucher, profile: &Profile) -> RadiusChange {
        let groupname = voucher_group_name(&profile.name, &voucher.code);

        if voucher.status == VoucherStatus::Expired {
            return self.removal(&voucher.code, Some(groupname));
        }

        let mut reply = vec![RadiusAttribute::set(
            &self.config.vendor_group_attribute,
            &profile.group_name,
        )];
        if let Some(rate_limit) = profile.rate_limit.as_deref().filter(|r| !r.is_empty()) {
            reply.push(RadiusAttribute::set(
                &self.config.rate_limit_attribute,
                rate_limit,
            ));
        }
        reply.push(RadiusAttribute::set(SESSION_TIMEOUT, profile.validity_secs()));

        RadiusChange {
            username: voucher.code.clone(),
            user: UserPlan::Replace {
                check: self.password_rows(&voucher.code, Some(profile)),
                reply: Vec::new(),
                groups: vec![GroupMembership::new(&groupname)],
            },
            group: Some(GroupPlan { groupname, reply }),
            drop_groups: Vec::new(),
        }
    }

    /// Delete every row of `username`, plus the voucher group if it has one
    pub fn removal(&self, username: &str, voucher_group: Option<String>) -> RadiusChange {
        RadiusChange {
            username: username.to_string(),
            user: UserPlan::Purge,
            group: None,
            drop_groups: voucher_group.into_iter().collect(),
        }
    }
}
