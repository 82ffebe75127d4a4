//! Hotspot voucher activation
//!
//! ```text
//! WAITING ──first Access-Accept──▶ ACTIVE ──Access-Accept after expires_at──▶ EXPIRED
//! ```
//!
//! The validity clock starts at first use, not at printing time. The
//! post-auth hook of the RADIUS server reports every authentication result;
//! only Access-Accept for a known voucher code changes anything.

use crate::billing::{
    BillingRepository, CATEGORY_AGENT_COMMISSION, CATEGORY_VOUCHER_SALE,
    voucher_commission_reference, voucher_sale_reference,
};
use crate::error::{SyncError, SyncResult};
use crate::model::{LedgerEntry, LedgerKind, Profile, Voucher, VoucherStatus};
use crate::sync::Synchronizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACCESS_ACCEPT: &str = "Access-Accept";

/// Body posted by the RADIUS server's post-auth hook
#[derive(Debug, Clone, Deserialize)]
pub struct PostAuthRequest {
    pub username: String,
    /// Reply sent to the NAS, e.g. `Access-Accept`
    pub reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAuthAction {
    /// Voucher is within its validity period
    Allow,
    /// Voucher was just activated
    FirstLogin,
    /// Voucher is expired; the caller must reject the session
    Reject,
    /// Not a voucher, or not an Access-Accept
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthResponse {
    pub success: bool,
    pub action: PostAuthAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PostAuthResponse {
    fn new(action: PostAuthAction, expires_at: Option<DateTime<Utc>>) -> Self {
        PostAuthResponse {
            success: true,
            action,
            expires_at,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Response for a hook request that could not be evaluated
    pub fn failure(message: impl Into<String>) -> Self {
        PostAuthResponse {
            success: false,
            action: PostAuthAction::Reject,
            expires_at: None,
            message: Some(message.into()),
        }
    }
}

/// Result of [`VoucherActivator::expire`]
#[derive(Debug)]
pub struct Expiry {
    /// The voucher moved to EXPIRED with this call
    pub changed: bool,
    /// Removal of its RADIUS rows; live sessions must stay up unless `Ok`
    pub purge: SyncResult<()>,
}

pub struct VoucherActivator {
    billing: Arc<dyn BillingRepository>,
    sync: Arc<Synchronizer>,
}

impl VoucherActivator {
    pub fn new(billing: Arc<dyn BillingRepository>, sync: Arc<Synchronizer>) -> Self {
        VoucherActivator { billing, sync }
    }

    pub async fn handle_post_auth(
        &self,
        request: &PostAuthRequest,
        now: DateTime<Utc>,
    ) -> SyncResult<PostAuthResponse> {
        if request.reply.trim() != ACCESS_ACCEPT {
            return Ok(PostAuthResponse::new(PostAuthAction::Ignore, None)
                .with_message(format!("Ignoring {}", request.reply)));
        }

        let Some(mut voucher) = self.billing.voucher(&request.username).await? else {
            debug!(username = %request.username, "Post-auth for non-voucher user");
            return Ok(PostAuthResponse::new(PostAuthAction::Ignore, None)
                .with_message("Not a voucher"));
        };

        if voucher.status == VoucherStatus::Expired {
            return Ok(PostAuthResponse::new(PostAuthAction::Reject, voucher.expires_at)
                .with_message("Voucher has expired"));
        }

        if voucher.first_login_at.is_none() {
            let profile = self
                .billing
                .profile(voucher.profile_id)
                .await?
                .ok_or_else(|| SyncError::not_found("Profile", voucher.profile_id))?;
            let expires_at = profile
                .validity()
                .and_then(|validity| now.checked_add_signed(validity))
                .ok_or_else(|| {
                    SyncError::Validation(format!(
                        "validity of profile '{}' overflows",
                        profile.name
                    ))
                })?;

            if self
                .billing
                .activate_voucher(&voucher.code, now, expires_at)
                .await?
            {
                info!(
                    code = %voucher.code,
                    expires_at = %expires_at,
                    "Voucher activated on first login"
                );
                self.book_sale(&voucher, &profile, now).await;
                return Ok(PostAuthResponse::new(PostAuthAction::FirstLogin, Some(expires_at)));
            }

            // A concurrent request activated it first; continue with its values
            voucher = self
                .billing
                .voucher(&voucher.code)
                .await?
                .ok_or_else(|| SyncError::not_found("Voucher", &voucher.code))?;
        }

        match voucher.expires_at {
            Some(expires_at) if now > expires_at => {
                self.expire(&voucher).await?;
                Ok(PostAuthResponse::new(PostAuthAction::Reject, Some(expires_at))
                    .with_message("Voucher has expired"))
            }
            expires_at => Ok(PostAuthResponse::new(PostAuthAction::Allow, expires_at)),
        }
    }

    /// Mark `voucher` EXPIRED and remove its RADIUS rows
    ///
    /// The status change stands even when row removal fails; the failure
    /// is returned in [`Expiry::purge`].
    pub async fn expire(&self, voucher: &Voucher) -> SyncResult<Expiry> {
        let changed = self.billing.expire_voucher(&voucher.code).await?;
        if changed {
            info!(code = %voucher.code, "Voucher expired");
        }

        let expired = Voucher {
            status: VoucherStatus::Expired,
            ..voucher.clone()
        };
        let purge = self.sync.sync_voucher_to_radius(&expired).await;
        if let Err(e) = &purge {
            warn!(code = %voucher.code, error = %e, "Expired voucher left in RADIUS tables");
        }
        Ok(Expiry { changed, purge })
    }

    /// Income entry, plus the reseller's commission when the voucher came
    /// from an agent batch. Failures are logged; the activation stands.
    async fn book_sale(&self, voucher: &Voucher, profile: &Profile, now: DateTime<Utc>) {
        let mut entries = Vec::with_capacity(2);
        entries.push(LedgerEntry {
            reference: voucher_sale_reference(&voucher.code),
            kind: LedgerKind::Income,
            category: CATEGORY_VOUCHER_SALE.to_string(),
            amount: profile.selling_price,
            description: format!("Voucher {} ({})", voucher.code, profile.name),
            agent_id: voucher.agent_id,
            created_at: now,
        });
        if let Some(agent_id) = voucher.agent_id
            && profile.agent_commission > 0
        {
            entries.push(LedgerEntry {
                reference: voucher_commission_reference(&voucher.code),
                kind: LedgerKind::Expense,
                category: CATEGORY_AGENT_COMMISSION.to_string(),
                amount: profile.agent_commission,
                description: format!("Commission for voucher {}", voucher.code),
                agent_id: Some(agent_id),
                created_at: now,
            });
        }

        for entry in entries {
            match self.billing.ledger_entry_exists(&entry.reference).await {
                Ok(true) => {
                    debug!(reference = %entry.reference, "Ledger entry already booked");
                }
                Ok(false) => {
                    if let Err(e) = self.billing.insert_ledger_entry(&entry).await {
                        warn!(reference = %entry.reference, error = %e, "Ledger entry not booked");
                    }
                }
                Err(e) => {
                    warn!(reference = %entry.reference, error = %e, "Ledger lookup failed");
                }
            }
        }
    }
}
