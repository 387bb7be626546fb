//! Offline targeting evaluation against a campaigns file

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use engage_core::campaign::{FrequencyGuard, FrequencyPolicy};
use engage_core::targeting::{explain_targeting, TargetingOptions, TargetingOutcome};
use engage_core::{Campaign, Config, SqliteStore, VisitorContext};
use serde::{Deserialize, Serialize};

/// A campaigns file holds either one campaign or a list, as the campaign API returns them.
#[derive(Deserialize)]
#[serde(untagged)]
enum CampaignFile {
    Many(Vec<Campaign>),
    One(Box<Campaign>),
}

impl CampaignFile {
    fn into_campaigns(self) -> Vec<Campaign> {
        match self {
            CampaignFile::Many(campaigns) => campaigns,
            CampaignFile::One(campaign) => vec![*campaign],
        }
    }
}

#[derive(Debug, Serialize)]
struct Verdict {
    id: i64,
    outcome: &'static str,
    /// `None` when no visitor was given to check frequency for
    allowed: Option<bool>,
}

impl Verdict {
    fn selectable(&self) -> bool {
        self.outcome == TargetingOutcome::Matched.as_str() && self.allowed != Some(false)
    }
}

#[derive(Serialize)]
struct Report<'a> {
    context: &'a VisitorContext,
    results: Vec<Verdict>,
    selected: Option<i64>,
}

/// Load campaigns from a JSON file
pub fn load_campaigns(path: &Path) -> Result<Vec<Campaign>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read campaigns from {}", path.display()))?;
    let file: CampaignFile = serde_json::from_str(&content)
        .with_context(|| format!("invalid campaigns file {}", path.display()))?;
    Ok(file.into_campaigns())
}

pub fn run(
    config: &Config,
    campaigns_path: &Path,
    context: &VisitorContext,
    visitor: Option<&str>,
    format: &str,
) -> Result<()> {
    let campaigns = load_campaigns(campaigns_path)?;
    let options = TargetingOptions::from(&config.targeting);

    let guard = match visitor {
        Some(_) => {
            let db = crate::open_database()?;
            Some(FrequencyGuard::new(
                Arc::new(SqliteStore::durable(db)),
                FrequencyPolicy::from(&config.frequency),
            ))
        }
        None => None,
    };

    let results: Vec<Verdict> = campaigns
        .iter()
        .map(|campaign| {
            let outcome = explain_targeting(campaign, context, &options);
            let allowed = match (&guard, visitor) {
                (Some(guard), Some(visitor_id)) => Some(guard.can_show(campaign, visitor_id)),
                _ => None,
            };
            Verdict {
                id: campaign.id,
                outcome: outcome.as_str(),
                allowed,
            }
        })
        .collect();

    let selected = results.iter().find(|v| v.selectable()).map(|v| v.id);
    tracing::info!(
        campaigns = results.len(),
        selected = ?selected,
        "Evaluated campaigns"
    );

    if format == "json" {
        let report = Report {
            context,
            results,
            selected,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Context: {} visitor, {:.1}s on page",
        if context.is_returning {
            "returning"
        } else {
            "first-time"
        },
        context.time_on_page_secs
    );
    println!("  URL:      {}", context.current_url);
    println!("  Referrer: {}", context.referrer_url);
    println!();

    if results.is_empty() {
        println!("No campaigns in {}", campaigns_path.display());
        return Ok(());
    }

    for verdict in &results {
        let (marker, note) = match verdict.allowed {
            Some(false) if verdict.outcome == TargetingOutcome::Matched.as_str() => {
                ("x", ", suppressed by frequency cap")
            }
            _ if verdict.selectable() => ("+", ""),
            _ => ("-", ""),
        };
        println!("  [{}] #{} {}{}", marker, verdict.id, verdict.outcome, note);
    }
    println!();

    match selected {
        Some(id) => println!("Selected campaign: #{}", id),
        None => println!("No campaign matches."),
    }

    Ok(())
}
