use crate::db::UserProfile;

/// Number of readings an anonymous caller may consume before being asked to
/// sign up, tracked client-side only.
pub const ANONYMOUS_FREE_READINGS: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entitlement {
    Allow,
    Deny { requires_upgrade: bool },
}

/// Decides whether a profile may consume one more reading. Premium accounts
/// are never quota-limited, whatever their remaining counter says.
pub fn check(profile: &UserProfile) -> Entitlement {
    if profile.is_premium || profile.free_readings_remaining > 0 {
        Entitlement::Allow
    } else {
        Entitlement::Deny {
            requires_upgrade: true,
        }
    }
}

pub fn check_anonymous(readings_used: i32) -> Entitlement {
    if readings_used < ANONYMOUS_FREE_READINGS {
        Entitlement::Allow
    } else {
        Entitlement::Deny {
            requires_upgrade: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PlanType, UserId};
    use chrono::Utc;

    fn profile(is_premium: bool, free_readings_remaining: i32) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            id: UserId::new("user-1"),
            email: "user@example.com".to_string(),
            is_premium,
            plan_type: if is_premium {
                PlanType::Premium
            } else {
                PlanType::None
            },
            readings_count: 0,
            free_readings_remaining,
            last_reading_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_allows_while_free_readings_remain() {
        assert_eq!(check(&profile(false, 5)), Entitlement::Allow);
        assert_eq!(check(&profile(false, 1)), Entitlement::Allow);
    }

    #[test]
    fn test_denies_with_upgrade_once_exhausted() {
        assert_eq!(
            check(&profile(false, 0)),
            Entitlement::Deny {
                requires_upgrade: true
            }
        );
    }

    #[test]
    fn test_premium_bypasses_quota_even_with_legacy_counters() {
        assert_eq!(check(&profile(true, 0)), Entitlement::Allow);
        assert_eq!(check(&profile(true, -3)), Entitlement::Allow);
    }

    #[test]
    fn test_check_is_pure() {
        let subject = profile(false, 2);
        let first = check(&subject);
        let second = check(&subject);
        assert_eq!(first, second);
        assert_eq!(subject.free_readings_remaining, 2);
    }

    #[test]
    fn test_anonymous_ceiling() {
        assert_eq!(check_anonymous(0), Entitlement::Allow);
        assert_eq!(check_anonymous(ANONYMOUS_FREE_READINGS - 1), Entitlement::Allow);
        assert_eq!(
            check_anonymous(ANONYMOUS_FREE_READINGS),
            Entitlement::Deny {
                requires_upgrade: true
            }
        );
    }
}
