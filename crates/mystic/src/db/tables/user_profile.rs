use crate::db::UserId;
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// A user's quota and premium state. Created lazily on first authenticated
/// access, mutated only by the post-success usage commit, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: UserId,
    pub email: String,
    pub is_premium: bool,
    pub plan_type: PlanType,
    pub readings_count: i32,
    pub free_readings_remaining: i32,
    pub last_reading_date: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// The subscription tier advertised to the user. Informs labeling only;
/// quota enforcement reads `is_premium`.
#[derive(Eq, PartialEq, Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Default, Hash, Serialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    #[default]
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "basic")]
    Basic,
    #[sea_orm(string_value = "premium")]
    Premium,
}
