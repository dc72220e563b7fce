use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::str::FromStr;

use crate::errors::AppError;
use crate::geo;
use crate::models::{NormalizedLead, RawOpportunity};
use crate::normalizer::FieldNormalizer;

/// Normalizes every raw opportunity, one lead per record, in input order.
pub fn assemble(normalizer: &FieldNormalizer, raw: &[RawOpportunity]) -> Vec<NormalizedLead> {
    raw.iter()
        .map(|record| normalize_record(normalizer, record))
        .collect()
}

pub fn normalize_record(normalizer: &FieldNormalizer, record: &RawOpportunity) -> NormalizedLead {
    let created_at = record.created.as_deref().and_then(parse_created);
    if created_at.is_none() {
        if let Some(raw) = &record.created {
            absorb(record, "created", &format!("unparseable timestamp '{}'", raw));
        }
    }

    let amount = record.amount.as_deref().and_then(|value| {
        let parsed = BigDecimal::from_str(value.trim()).ok();
        if parsed.is_none() {
            absorb(record, "amount.value", &format!("not a decimal: '{}'", value));
        }
        parsed
    });

    let pipeline = normalizer.clean_pipeline_label(record.pipeline.as_deref());
    let step_group = normalizer.canonical_step_group(record.step.as_deref());
    let workflow_stage = normalizer.to_workflow_stage(&step_group);
    let (postal_code, department_code, department_name) = geo::resolve(record.name.as_deref());

    NormalizedLead {
        id: record.id.clone(),
        number: record.number.clone(),
        name: record.name.clone(),
        created_at,
        status: record.status.clone(),
        pipeline,
        raw_step: record.step.clone(),
        step_group,
        workflow_stage,
        postal_code,
        department_code,
        department_name,
        probability: record.probability,
        amount,
        currency: record.currency.clone(),
        source: record.source.clone(),
    }
}

/// Removes leads whose cleaned pipeline label is `excluded_pipeline`.
pub fn exclude_pipeline(leads: Vec<NormalizedLead>, excluded_pipeline: &str) -> Vec<NormalizedLead> {
    let before = leads.len();
    let kept: Vec<NormalizedLead> = leads
        .into_iter()
        .filter(|lead| lead.pipeline != excluded_pipeline)
        .collect();
    tracing::debug!(
        "Excluded {} leads from pipeline '{}'",
        before - kept.len(),
        excluded_pipeline
    );
    kept
}

/// Parses a CRM timestamp into UTC.
///
/// Accepts RFC 3339, naive date-times (read as UTC) and bare dates (midnight UTC).
pub fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn absorb(record: &RawOpportunity, field: &str, reason: &str) {
    let issue = AppError::MalformedRecord {
        record_id: record.id.clone(),
        field: field.to_string(),
        reason: reason.to_string(),
    };
    tracing::debug!("{}", issue);
}
