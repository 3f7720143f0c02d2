// Manual FromRow implementations for PostgreSQL.
//
// Enum columns are stored as lowercase TEXT and permission sets as TEXT[],
// so rows are decoded by hand rather than derived.
#[cfg(feature = "sqlx-postgres")]
mod postgres_impls {
    use sqlx::postgres::PgRow;
    use sqlx::{FromRow, Row};

    use crate::permission::PermissionMask;
    use crate::types::{
        AdvertiserAssociationInvitation, AgencyDelegation, AssociationStatus, AssociationType,
        DelegationStatus, InvitationStatus, InvitationUsageLog, Organization,
        OrganizationAssociation, OrganizationType, Profile, RoleRecord, UsageFailureReason,
        UsageOutcome,
    };

    fn decode<T>(column: &str, value: &str, parsed: Option<T>) -> Result<T, sqlx::Error> {
        parsed.ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("unexpected value {:?}", value).into(),
        })
    }

    fn count(column: &str, value: i32) -> Result<u32, sqlx::Error> {
        u32::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    }

    impl FromRow<'_, PgRow> for Organization {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let org_type: String = row.try_get("type")?;
            Ok(Self {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                org_type: decode("type", &org_type, OrganizationType::parse(&org_type))?,
            })
        }
    }

    impl FromRow<'_, PgRow> for Profile {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                user_id: row.try_get("user_id")?,
                organization_id: row.try_get("organization_id")?,
                role_id: row.try_get("role_id")?,
                email: row.try_get("email")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for RoleRecord {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            Ok(Self {
                role_id: row.try_get("role_id")?,
                name: row.try_get("name")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for OrganizationAssociation {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let kind: String = row.try_get("association_type")?;
            let status: String = row.try_get("status")?;
            Ok(Self {
                association_id: row.try_get("association_id")?,
                advertiser_org_id: row.try_get("advertiser_org_id")?,
                affiliate_org_id: row.try_get("affiliate_org_id")?,
                association_type: decode(
                    "association_type",
                    &kind,
                    AssociationType::parse(&kind),
                )?,
                status: decode("status", &status, AssociationStatus::parse(&status))?,
                visible_to_advertiser: row.try_get("visible_to_advertiser")?,
                visible_to_affiliate: row.try_get("visible_to_affiliate")?,
                all_affiliates_visible: row.try_get("all_affiliates_visible")?,
                visible_affiliate_ids: row.try_get("visible_affiliate_ids")?,
                all_campaigns_visible: row.try_get("all_campaigns_visible")?,
                visible_campaign_ids: row.try_get("visible_campaign_ids")?,
                message: row.try_get("message")?,
                created_by_user_id: row.try_get("created_by_user_id")?,
                updated_by_user_id: row.try_get("updated_by_user_id")?,
                approved_by_user_id: row.try_get("approved_by_user_id")?,
                approved_at: row.try_get("approved_at")?,
                suspended_by_org_id: row.try_get("suspended_by_org_id")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for AgencyDelegation {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let status: String = row.try_get("status")?;
            let permissions: Vec<String> = row.try_get("permissions")?;
            Ok(Self {
                delegation_id: row.try_get("delegation_id")?,
                agency_org_id: row.try_get("agency_org_id")?,
                advertiser_org_id: row.try_get("advertiser_org_id")?,
                status: decode("status", &status, DelegationStatus::parse(&status))?,
                permissions: PermissionMask::parse_all(&permissions).map_err(|e| {
                    sqlx::Error::ColumnDecode {
                        index: "permissions".to_string(),
                        source: e.into(),
                    }
                })?,
                expires_at: row.try_get("expires_at")?,
                message: row.try_get("message")?,
                created_by_user_id: row.try_get("created_by_user_id")?,
                updated_by_user_id: row.try_get("updated_by_user_id")?,
                accepted_by_user_id: row.try_get("accepted_by_user_id")?,
                accepted_at: row.try_get("accepted_at")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for AdvertiserAssociationInvitation {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let status: String = row.try_get("status")?;
            let max_uses: Option<i32> = row.try_get("max_uses")?;
            Ok(Self {
                invitation_id: row.try_get("invitation_id")?,
                advertiser_org_id: row.try_get("advertiser_org_id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                token: row.try_get("token")?,
                status: decode("status", &status, InvitationStatus::parse(&status))?,
                expires_at: row.try_get("expires_at")?,
                max_uses: max_uses.map(|m| count("max_uses", m)).transpose()?,
                usage_count: count("usage_count", row.try_get("usage_count")?)?,
                default_message: row.try_get("default_message")?,
                allowed_affiliate_org_types: vec![OrganizationType::Affiliate],
                allowed_affiliate_org_ids: row.try_get("allowed_affiliate_org_ids")?,
                created_by_user_id: row.try_get("created_by_user_id")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    }

    impl FromRow<'_, PgRow> for InvitationUsageLog {
        fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
            let outcome: String = row.try_get("outcome")?;
            let reason: Option<String> = row.try_get("failure_reason")?;
            let outcome = match outcome.as_str() {
                "succeeded" => UsageOutcome::Succeeded,
                "failed" => UsageOutcome::Failed,
                other => return decode("outcome", other, None),
            };
            Ok(Self {
                log_id: row.try_get("log_id")?,
                invitation_id: row.try_get("invitation_id")?,
                consumed_by_user_id: row.try_get("consumed_by_user_id")?,
                consumed_by_affiliate_org_id: row.try_get("consumed_by_affiliate_org_id")?,
                resulting_association_id: row.try_get("resulting_association_id")?,
                ip_address: row.try_get("ip_address")?,
                user_agent: row.try_get("user_agent")?,
                outcome,
                failure_reason: reason
                    .map(|r| decode("failure_reason", &r, UsageFailureReason::parse(&r)))
                    .transpose()?,
                consumed_at: row.try_get("consumed_at")?,
            })
        }
    }
}
