//! Filtering and aggregation over a normalized lead dataset.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use crate::errors::AppError;
use crate::models::NormalizedLead;
use crate::normalizer::WorkflowStage;

/// Creation-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Last7Days,
    Last30Days,
    YearToDate,
    #[default]
    All,
}

impl Period {
    /// Earliest creation instant included, `None` for an unbounded window.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Last7Days => Some(now - Duration::days(7)),
            Period::Last30Days => Some(now - Duration::days(30)),
            Period::YearToDate => Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0).single(),
            Period::All => None,
        }
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(Period::Last7Days),
            "30d" => Ok(Period::Last30Days),
            "ytd" => Ok(Period::YearToDate),
            "" | "all" => Ok(Period::All),
            other => Err(AppError::BadRequest(format!(
                "unknown period '{}', expected one of 7d, 30d, ytd, all",
                other
            ))),
        }
    }
}

/// Query string accepted by the lead endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadQuery {
    pub period: Option<String>,
    /// Comma-separated cleaned pipeline labels.
    pub pipelines: Option<String>,
    /// Comma-separated statuses.
    pub statuses: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    pub period: Period,
    pub pipelines: Option<BTreeSet<String>>,
    pub statuses: Option<BTreeSet<String>>,
}

impl LeadFilter {
    pub fn from_query(query: &LeadQuery) -> Result<Self, AppError> {
        let period = match &query.period {
            Some(p) => p.parse()?,
            None => Period::All,
        };

        Ok(Self {
            period,
            pipelines: query.pipelines.as_deref().map(split_list),
            statuses: query.statuses.as_deref().map(split_list),
        })
    }

    pub fn matches(&self, lead: &NormalizedLead, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.period.start(now) {
            match lead.created_at {
                Some(created) if created >= start => {}
                _ => return false,
            }
        }

        if let Some(pipelines) = &self.pipelines {
            if !pipelines.contains(&lead.pipeline) {
                return false;
            }
        }

        if let Some(statuses) = &self.statuses {
            match &lead.status {
                Some(status) if statuses.contains(status) => {}
                _ => return false,
            }
        }

        true
    }

    /// Matching leads, newest first; leads without a creation instant go last.
    pub fn apply<'a>(
        &self,
        leads: &'a [NormalizedLead],
        now: DateTime<Utc>,
    ) -> Vec<&'a NormalizedLead> {
        let mut selected: Vec<&NormalizedLead> =
            leads.iter().filter(|lead| self.matches(lead, now)).collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: WorkflowStage,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: usize,
}

/// Headline figures over a set of leads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadSummary {
    pub total: usize,
    pub won: usize,
    pub lost: usize,
    pub open: usize,
    pub closed: usize,
    pub late: usize,
    /// Percentages, 0 when there are no leads.
    pub won_rate: f64,
    pub lost_rate: f64,
    pub by_pipeline: Vec<LabelCount>,
    pub by_step_group: Vec<LabelCount>,
    /// Every stage in funnel order, `Other` last, including empty stages.
    pub funnel: Vec<StageCount>,
    pub by_day: Vec<DayCount>,
}

impl LeadSummary {
    pub fn from_leads(leads: &[&NormalizedLead]) -> Self {
        let total = leads.len();
        let status_count = |status: &str| {
            leads
                .iter()
                .filter(|lead| lead.status.as_deref() == Some(status))
                .count()
        };
        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };

        let won = status_count("won");
        let lost = status_count("lost");

        let mut stages: HashMap<WorkflowStage, usize> = HashMap::new();
        let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for lead in leads {
            *stages.entry(lead.workflow_stage).or_default() += 1;
            if let Some(created) = lead.created_at {
                *days.entry(created.date_naive()).or_default() += 1;
            }
        }

        Self {
            total,
            won,
            lost,
            open: status_count("open"),
            closed: status_count("closed"),
            late: status_count("late"),
            won_rate: rate(won),
            lost_rate: rate(lost),
            by_pipeline: count_by(leads, |lead| lead.pipeline.as_str()),
            by_step_group: count_by(leads, |lead| lead.step_group.as_str()),
            funnel: WorkflowStage::FUNNEL
                .iter()
                .map(|stage| StageCount {
                    stage: *stage,
                    count: stages.get(stage).copied().unwrap_or(0),
                })
                .collect(),
            by_day: days
                .into_iter()
                .map(|(day, count)| DayCount { day, count })
                .collect(),
        }
    }
}

/// Counts per label, largest first, ties broken alphabetically.
fn count_by<'a, F>(leads: &[&'a NormalizedLead], key: F) -> Vec<LabelCount>
where
    F: Fn(&'a NormalizedLead) -> &'a str,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for lead in leads {
        *counts.entry(key(*lead)).or_default() += 1;
    }

    let mut out: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}

/// Distinct pipelines and statuses present in a dataset, sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub pipelines: Vec<String>,
    pub statuses: Vec<String>,
}

impl FilterOptions {
    pub fn from_leads(leads: &[NormalizedLead]) -> Self {
        let pipelines: BTreeSet<&str> = leads.iter().map(|l| l.pipeline.as_str()).collect();
        let statuses: BTreeSet<&str> = leads.iter().filter_map(|l| l.status.as_deref()).collect();
        Self {
            pipelines: pipelines.into_iter().map(str::to_string).collect(),
            statuses: statuses.into_iter().map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler;
    use crate::models::RawOpportunity;
    use crate::normalizer::FieldNormalizer;

    fn lead(pipeline: &str, step: &str, status: &str, created: Option<&str>) -> NormalizedLead {
        let raw = RawOpportunity {
            pipeline: Some(pipeline.to_string()),
            step: Some(step.to_string()),
            status: Some(status.to_string()),
            created: created.map(str::to_string),
            ..Default::default()
        };
        assembler::normalize_record(&FieldNormalizer::builtin().unwrap(), &raw)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("7d".parse::<Period>().unwrap(), Period::Last7Days);
        assert_eq!("YTD".parse::<Period>().unwrap(), Period::YearToDate);
        assert_eq!("all".parse::<Period>().unwrap(), Period::All);
        assert!(matches!(
            "fortnight".parse::<Period>(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_period_start() {
        assert_eq!(
            Period::YearToDate.start(now()),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(Period::All.start(now()), None);
        assert_eq!(
            Period::Last7Days.start(now()),
            Some(Utc.with_ymd_and_hms(2025, 6, 8, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_filter_by_period_excludes_undated_leads() {
        let leads = vec![
            lead("Pipeline Jean Commercial", "Piste", "open", Some("2025-06-14T10:00:00Z")),
            lead("Pipeline Jean Commercial", "Piste", "open", Some("2025-05-01T10:00:00Z")),
            lead("Pipeline Jean Commercial", "Piste", "open", None),
        ];

        let filter = LeadFilter {
            period: Period::Last7Days,
            ..Default::default()
        };
        assert_eq!(filter.apply(&leads, now()).len(), 1);

        let all = LeadFilter::default().apply(&leads, now());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].created_at, leads[0].created_at);
        assert_eq!(all[2].created_at, None);
    }

    #[test]
    fn test_filter_by_pipeline_and_status() {
        let leads = vec![
            lead("Pipeline Jean Commercial", "Piste", "won", None),
            lead("Pipeline Marie Commercial", "Piste", "won", None),
            lead("Pipeline Jean Commercial", "Piste", "lost", None),
        ];

        let filter = LeadFilter::from_query(&LeadQuery {
            period: None,
            pipelines: Some("Jean, ".to_string()),
            statuses: Some("won".to_string()),
        })
        .unwrap();

        let selected = filter.apply(&leads, now());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].pipeline, "Jean");
        assert_eq!(selected[0].status.as_deref(), Some("won"));
    }

    #[test]
    fn test_summary() {
        let leads = vec![
            lead("Pipeline Jean Commercial", "Transfert Opp", "won", Some("2025-06-14T10:00:00Z")),
            lead("Pipeline Jean Commercial", "Devis Signé", "lost", Some("2025-06-14T18:00:00Z")),
            lead("Pipeline Marie Commercial", "Négo/Envoi devis", "open", Some("2025-06-13T09:00:00Z")),
            lead("Pipeline Marie Commercial", "Piste", "open", None),
        ];
        let refs: Vec<&NormalizedLead> = leads.iter().collect();

        let summary = LeadSummary::from_leads(&refs);

        assert_eq!(summary.total, 4);
        assert_eq!((summary.won, summary.lost, summary.open), (1, 1, 2));
        assert_eq!(summary.won_rate, 25.0);
        assert_eq!(summary.by_pipeline[0].count, 2);
        assert_eq!(summary.by_pipeline[0].label, "Jean");
        assert_eq!(summary.funnel.len(), WorkflowStage::FUNNEL.len());
        assert_eq!(summary.funnel[0].stage, WorkflowStage::Lead);
        assert_eq!(summary.funnel[0].count, 1);
        assert_eq!(summary.funnel[2].count, 1);
        assert_eq!(summary.funnel[5].count, 1);
        assert_eq!(summary.funnel[6].stage, WorkflowStage::Other);
        assert_eq!(summary.funnel[6].count, 1);
        assert_eq!(summary.by_day.len(), 2);
        assert_eq!(summary.by_day[1].count, 2);
    }

    #[test]
    fn test_empty_summary_has_zero_rates() {
        let summary = LeadSummary::from_leads(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.won_rate, 0.0);
        assert!(summary.funnel.iter().all(|s| s.count == 0));
    }

    #[test]
    fn test_filter_options() {
        let leads = vec![
            lead("Pipeline Marie Commercial", "Piste", "open", None),
            lead("Pipeline Jean Commercial", "Piste", "won", None),
            lead("Pipeline Jean Commercial", "Piste", "open", None),
        ];
        let options = FilterOptions::from_leads(&leads);
        assert_eq!(options.pipelines, vec!["Jean", "Marie"]);
        assert_eq!(options.statuses, vec!["open", "won"]);
    }
}
