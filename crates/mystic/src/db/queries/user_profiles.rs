use super::*;

impl Database {
    /// Fetches the profile for `user_id`, creating it with defaults on first
    /// authenticated access. An insert that loses a creation race falls back
    /// to re-fetching, so duplicate profiles are impossible.
    pub async fn get_or_create_profile(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<UserProfile> {
        self.transaction(|tx| async move {
            if let Some(profile) = user_profile::Entity::find_by_id(user_id.clone())
                .one(&*tx)
                .await?
            {
                return Ok(profile);
            }

            let now = Utc::now();
            user_profile::Entity::insert(user_profile::ActiveModel {
                id: ActiveValue::set(user_id.clone()),
                email: ActiveValue::set(email.to_string()),
                is_premium: ActiveValue::set(false),
                plan_type: ActiveValue::set(PlanType::None),
                readings_count: ActiveValue::set(0),
                free_readings_remaining: ActiveValue::set(DEFAULT_FREE_READINGS),
                last_reading_date: ActiveValue::set(None),
                created_at: ActiveValue::set(now),
                updated_at: ActiveValue::set(now),
            })
            .on_conflict(
                OnConflict::column(user_profile::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*tx)
            .await?;

            Ok(user_profile::Entity::find_by_id(user_id.clone())
                .one(&*tx)
                .await?
                .context("profile missing after insert")?)
        })
        .await
    }

    pub async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        self.transaction(|tx| async move {
            Ok(user_profile::Entity::find_by_id(user_id.clone())
                .one(&*tx)
                .await?)
        })
        .await
    }

    /// Commits one successful reading against the profile.
    ///
    /// For non-premium users the decrement is conditioned on quota remaining
    /// at commit time; two concurrent requests may both pass the entitlement
    /// check against the same stale counter, and this conditional write is
    /// the only thing keeping it from going negative.
    pub async fn commit_reading_usage(
        &self,
        user_id: &UserId,
        now: DateTimeUtc,
    ) -> Result<UsageCommit> {
        self.transaction(|tx| async move {
            let profile = user_profile::Entity::find_by_id(user_id.clone())
                .one(&*tx)
                .await?
                .context("no profile for user")?;

            if profile.is_premium {
                user_profile::Entity::update_many()
                    .col_expr(
                        user_profile::Column::ReadingsCount,
                        Expr::col(user_profile::Column::ReadingsCount).add(1),
                    )
                    .col_expr(user_profile::Column::LastReadingDate, Expr::value(now))
                    .col_expr(user_profile::Column::UpdatedAt, Expr::value(now))
                    .filter(user_profile::Column::Id.eq(user_id.clone()))
                    .exec(&*tx)
                    .await?;
                return Ok(UsageCommit::Committed);
            }

            let result = user_profile::Entity::update_many()
                .col_expr(
                    user_profile::Column::FreeReadingsRemaining,
                    Expr::col(user_profile::Column::FreeReadingsRemaining).sub(1),
                )
                .col_expr(
                    user_profile::Column::ReadingsCount,
                    Expr::col(user_profile::Column::ReadingsCount).add(1),
                )
                .col_expr(user_profile::Column::LastReadingDate, Expr::value(now))
                .col_expr(user_profile::Column::UpdatedAt, Expr::value(now))
                .filter(user_profile::Column::Id.eq(user_id.clone()))
                .filter(user_profile::Column::FreeReadingsRemaining.gt(0))
                .exec(&*tx)
                .await?;

            if result.rows_affected == 0 {
                Ok(UsageCommit::QuotaExhausted)
            } else {
                Ok(UsageCommit::Committed)
            }
        })
        .await
    }

    /// Flips premium status. Called by the payment webhook collaborator once
    /// a subscription becomes active or lapses.
    pub async fn set_premium(&self, user_id: &UserId, plan_type: PlanType) -> Result<()> {
        self.transaction(|tx| async move {
            let result = user_profile::Entity::update_many()
                .col_expr(
                    user_profile::Column::IsPremium,
                    Expr::value(plan_type != PlanType::None),
                )
                .col_expr(user_profile::Column::PlanType, Expr::value(plan_type))
                .col_expr(user_profile::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(user_profile::Column::Id.eq(user_id.clone()))
                .exec(&*tx)
                .await?;

            if result.rows_affected == 0 {
                Err(anyhow!("no profile for user {user_id}"))?;
            }
            Ok(())
        })
        .await
    }
}
