//! Campaign targeting evaluation
//!
//! Pure, synchronous decision of whether a campaign should display for a
//! visitor's live context. A campaign passes when it is active and all three
//! checks pass:
//!
//! 1. **Visitor type**: `all`, `first-time` (not returning) or `returning`.
//!    Unrecognized types never match.
//! 2. **Trigger**: time on page is at least the trigger value, normalized to seconds.
//! 3. **URL conditions**: combined with `match-all` / `match-any`; an empty
//!    condition list always passes. Comparisons are case-insensitive.

use crate::config::{TargetingConfig, UnknownFieldPolicy};
use crate::types::{
    Campaign, CampaignRules, CampaignTrigger, Condition, ConditionField, MatchType, Operator,
    VisitorContext, VisitorType,
};

/// Tunables for the evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetingOptions {
    /// Outcome for condition fields other than the two URL fields
    pub unknown_fields: UnknownFieldPolicy,
}

impl From<&TargetingConfig> for TargetingOptions {
    fn from(config: &TargetingConfig) -> Self {
        Self {
            unknown_fields: config.unknown_condition_fields,
        }
    }
}

/// Why a campaign did or did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingOutcome {
    Matched,
    Inactive,
    VisitorTypeMismatch,
    TriggerNotMet,
    ConditionsNotMet,
}

impl TargetingOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, TargetingOutcome::Matched)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetingOutcome::Matched => "matched",
            TargetingOutcome::Inactive => "inactive",
            TargetingOutcome::VisitorTypeMismatch => "visitor type mismatch",
            TargetingOutcome::TriggerNotMet => "trigger not met",
            TargetingOutcome::ConditionsNotMet => "conditions not met",
        }
    }
}

/// Decide whether `campaign` should display for `context`.
pub fn evaluate_targeting(campaign: &Campaign, context: &VisitorContext) -> bool {
    explain_targeting(campaign, context, &TargetingOptions::default()).is_match()
}

/// Like [`evaluate_targeting`], reporting the first check that failed.
pub fn explain_targeting(
    campaign: &Campaign,
    context: &VisitorContext,
    options: &TargetingOptions,
) -> TargetingOutcome {
    if !campaign.is_active() {
        return TargetingOutcome::Inactive;
    }

    let targeting = &campaign.targeting;

    if !check_visitor_type(&targeting.visitor_type, context.is_returning) {
        return TargetingOutcome::VisitorTypeMismatch;
    }

    if !check_time_on_page(&targeting.trigger, context.time_on_page_secs) {
        return TargetingOutcome::TriggerNotMet;
    }

    if !check_url_conditions(
        &targeting.rules,
        &context.current_url,
        &context.referrer_url,
        options,
    ) {
        return TargetingOutcome::ConditionsNotMet;
    }

    TargetingOutcome::Matched
}

/// Return the first campaign, in caller priority order, that targets `context`.
pub fn find_matching_campaign<'a>(
    campaigns: &'a [Campaign],
    context: &VisitorContext,
) -> Option<&'a Campaign> {
    find_matching_campaign_with(campaigns, context, &TargetingOptions::default())
}

/// [`find_matching_campaign`] with explicit options.
pub fn find_matching_campaign_with<'a>(
    campaigns: &'a [Campaign],
    context: &VisitorContext,
    options: &TargetingOptions,
) -> Option<&'a Campaign> {
    campaigns
        .iter()
        .find(|campaign| explain_targeting(campaign, context, options).is_match())
}

fn check_visitor_type(target: &VisitorType, is_returning: bool) -> bool {
    match target {
        VisitorType::All => true,
        VisitorType::FirstTime => !is_returning,
        VisitorType::Returning => is_returning,
        VisitorType::Unknown(_) => false,
    }
}

fn check_time_on_page(trigger: &CampaignTrigger, time_on_page_secs: f64) -> bool {
    time_on_page_secs >= trigger.required_secs()
}

fn check_url_conditions(
    rules: &CampaignRules,
    current_url: &str,
    referrer_url: &str,
    options: &TargetingOptions,
) -> bool {
    if rules.conditions.is_empty() {
        return true;
    }

    let current_url = current_url.to_lowercase();
    let referrer_url = referrer_url.to_lowercase();
    let mut results = rules
        .conditions
        .iter()
        .map(|condition| check_url_condition(condition, &current_url, &referrer_url, options));

    match rules.match_type {
        MatchType::All => results.all(|passed| passed),
        MatchType::Any => results.any(|passed| passed),
    }
}

/// Evaluate one condition against already lower-cased URLs.
fn check_url_condition(
    condition: &Condition,
    current_url: &str,
    referrer_url: &str,
    options: &TargetingOptions,
) -> bool {
    let url = match &condition.field {
        ConditionField::CurrentPageUrl => current_url,
        ConditionField::ReferrerUrl => referrer_url,
        ConditionField::Other(field) => {
            tracing::debug!(
                field = %field,
                policy = ?options.unknown_fields,
                "Unevaluated condition field"
            );
            return options.unknown_fields == UnknownFieldPolicy::Pass;
        }
    };

    let value = condition.value.to_lowercase();

    match &condition.operator {
        Operator::Contains => url.contains(&value),
        Operator::Equals | Operator::Is => url == value,
        Operator::StartsWith => url.starts_with(&value),
        Operator::EndsWith => url.ends_with(&value),
        Operator::Unknown(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignTargeting, CampaignType, TimeUnit};

    fn campaign(
        id: i64,
        visitor_type: VisitorType,
        trigger: CampaignTrigger,
        rules: CampaignRules,
    ) -> Campaign {
        Campaign {
            id,
            status: "active".to_string(),
            campaign_type: CampaignType::Recurring,
            targeting: CampaignTargeting {
                visitor_type,
                trigger,
                rules,
            },
        }
    }

    fn open_campaign(id: i64) -> Campaign {
        campaign(
            id,
            VisitorType::All,
            CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
            CampaignRules::default(),
        )
    }

    fn context(is_returning: bool, secs: f64, url: &str) -> VisitorContext {
        VisitorContext {
            is_returning,
            time_on_page_secs: secs,
            current_url: url.to_string(),
            referrer_url: "https://search.example.com/?q=shoes".to_string(),
        }
    }

    fn rules(match_type: MatchType, conditions: Vec<Condition>) -> CampaignRules {
        CampaignRules {
            match_type,
            conditions,
        }
    }

    #[test]
    fn test_inactive_campaign_never_matches() {
        let mut c = open_campaign(1);
        for status in ["paused", "draft", "ACTIVE", ""] {
            c.status = status.to_string();
            assert!(!evaluate_targeting(&c, &context(false, 1000.0, "https://x.com")));
            assert!(!evaluate_targeting(&c, &context(true, 0.0, "")));
        }
    }

    #[test]
    fn test_visitor_type() {
        let trigger = CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds);
        let first = campaign(1, VisitorType::FirstTime, trigger.clone(), CampaignRules::default());
        let returning = campaign(
            2,
            VisitorType::Returning,
            trigger.clone(),
            CampaignRules::default(),
        );
        let unknown = campaign(
            3,
            VisitorType::Unknown("vip".into()),
            trigger,
            CampaignRules::default(),
        );

        let returning_ctx = context(true, 10.0, "https://x.com");
        let new_ctx = context(false, 10.0, "https://x.com");

        assert!(!evaluate_targeting(&first, &returning_ctx));
        assert!(evaluate_targeting(&returning, &returning_ctx));
        assert!(evaluate_targeting(&first, &new_ctx));
        assert!(!evaluate_targeting(&returning, &new_ctx));
        assert!(!evaluate_targeting(&unknown, &new_ctx));
        assert!(!evaluate_targeting(&unknown, &returning_ctx));
    }

    #[test]
    fn test_trigger_normalization() {
        let minutes = campaign(
            1,
            VisitorType::All,
            CampaignTrigger::time_on_page(2.0, TimeUnit::Minutes),
            CampaignRules::default(),
        );
        assert!(!evaluate_targeting(&minutes, &context(false, 119.9, "")));
        assert!(evaluate_targeting(&minutes, &context(false, 120.0, "")));

        let seconds = campaign(
            2,
            VisitorType::All,
            CampaignTrigger::time_on_page(30.0, TimeUnit::Seconds),
            CampaignRules::default(),
        );
        assert!(!evaluate_targeting(&seconds, &context(false, 29.0, "")));
        assert!(evaluate_targeting(&seconds, &context(false, 30.0, "")));
    }

    #[test]
    fn test_url_match_is_case_insensitive() {
        let c = campaign(
            1,
            VisitorType::All,
            CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
            rules(
                MatchType::All,
                vec![Condition::new(ConditionField::CurrentPageUrl, Operator::Contains, "PRICING")],
            ),
        );
        assert!(evaluate_targeting(&c, &context(false, 0.0, "https://x.com/Pricing")));
    }

    #[test]
    fn test_operators() {
        let url = "https://shop.example.com/cart";
        let check = |operator: Operator, value: &str| {
            check_url_condition(
                &Condition::new(ConditionField::CurrentPageUrl, operator, value),
                url,
                "",
                &TargetingOptions::default(),
            )
        };

        assert!(check(Operator::Contains, "example"));
        assert!(check(Operator::Equals, "https://shop.example.com/cart"));
        assert!(check(Operator::Is, "HTTPS://SHOP.EXAMPLE.COM/CART"));
        assert!(check(Operator::StartsWith, "https://shop"));
        assert!(check(Operator::EndsWith, "/cart"));
        assert!(!check(Operator::EndsWith, "/checkout"));
        assert!(!check(Operator::Unknown("matches-regex".into()), ".*"));
    }

    #[test]
    fn test_referrer_condition() {
        let condition = Condition::new(
            ConditionField::ReferrerUrl,
            Operator::StartsWith,
            "https://search",
        );
        assert!(check_url_condition(
            &condition,
            "https://x.com",
            "https://search.example.com",
            &TargetingOptions::default()
        ));
        assert!(!check_url_condition(
            &condition,
            "https://search.example.com",
            "direct",
            &TargetingOptions::default()
        ));
    }

    #[test]
    fn test_match_all_vs_match_any() {
        let conditions = vec![
            Condition::new(ConditionField::CurrentPageUrl, Operator::Contains, "cart"),
            Condition::new(ConditionField::CurrentPageUrl, Operator::Contains, "checkout"),
        ];
        let ctx = context(false, 0.0, "https://shop.example.com/cart");
        let trigger = CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds);

        let all = campaign(
            1,
            VisitorType::All,
            trigger.clone(),
            rules(MatchType::All, conditions.clone()),
        );
        let any = campaign(2, VisitorType::All, trigger, rules(MatchType::Any, conditions));

        assert!(!evaluate_targeting(&all, &ctx));
        assert!(evaluate_targeting(&any, &ctx));
    }

    #[test]
    fn test_empty_conditions_always_pass() {
        let ctx = context(false, 0.0, "");
        for match_type in [MatchType::All, MatchType::Any] {
            let c = campaign(
                1,
                VisitorType::All,
                CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
                rules(match_type, vec![]),
            );
            assert!(evaluate_targeting(&c, &ctx));
        }
    }

    #[test]
    fn test_unknown_field_policy() {
        let c = campaign(
            1,
            VisitorType::All,
            CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
            rules(
                MatchType::All,
                vec![Condition::new(
                    ConditionField::Other("device-type".into()),
                    Operator::Is,
                    "mobile",
                )],
            ),
        );
        let ctx = context(false, 0.0, "https://x.com");

        assert!(evaluate_targeting(&c, &ctx));

        let strict = TargetingOptions {
            unknown_fields: UnknownFieldPolicy::Fail,
        };
        assert_eq!(
            explain_targeting(&c, &ctx, &strict),
            TargetingOutcome::ConditionsNotMet
        );
    }

    #[test]
    fn test_first_match_wins() {
        let campaigns = vec![
            campaign(
                1,
                VisitorType::Returning,
                CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
                CampaignRules::default(),
            ),
            open_campaign(2),
            open_campaign(3),
        ];

        let found = find_matching_campaign(&campaigns, &context(false, 5.0, "https://x.com"));
        assert_eq!(found.map(|c| c.id), Some(2));

        let none = find_matching_campaign(&campaigns[..1], &context(false, 5.0, "https://x.com"));
        assert!(none.is_none());
    }

    #[test]
    fn test_cart_scenario() {
        let cart = campaign(
            1,
            VisitorType::FirstTime,
            CampaignTrigger::time_on_page(30.0, TimeUnit::Seconds),
            rules(
                MatchType::All,
                vec![Condition::new(ConditionField::CurrentPageUrl, Operator::Contains, "cart")],
            ),
        );

        let ctx = context(false, 45.0, "https://shop.example.com/cart");
        assert!(evaluate_targeting(&cart, &ctx));

        let early = context(false, 10.0, "https://shop.example.com/cart");
        assert_eq!(
            explain_targeting(&cart, &early, &TargetingOptions::default()),
            TargetingOutcome::TriggerNotMet
        );
    }
}
