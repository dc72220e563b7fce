//! Canonicalization of free-form CRM labels.
//!
//! Pipeline labels lose their organizational boilerplate, step labels collapse onto
//! canonical step groups through an alias table, and step groups classify into the
//! ordered workflow stages of the sales funnel.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::errors::AppError;

/// Sentinel for missing pipeline and step labels.
pub const UNKNOWN: &str = "Unknown";

/// Boilerplate words dropped from pipeline labels. Matched as whole words only.
pub const PIPELINE_NOISE: &[&str] = &["Pipeline", "Commerciale", "Commercial"];

/// Raw step spellings seen in the CRM and their canonical step group.
/// Labels absent from this list are already canonical.
pub const STEP_ALIASES: &[(&str, &str)] = &[
    // follow-up / handoff
    ("Relance Opp", "Relance / Transfert"),
    ("Relance opp", "Relance / Transfert"),
    ("Transfert Opp", "Relance / Transfert"),
    ("Trnasfert Opp", "Relance / Transfert"),
    ("Transfert opp", "Relance / Transfert"),
    // signed quote
    ("Devis Signé", "Devis signé"),
    ("DEVIS SIGNÉ ANT ET ROMY", "Devis signé"),
    ("Devis signé", "Devis signé"),
    // negotiation
    ("Négo/Envoi devis", "Négociation"),
    ("Devis/Négociation", "Négociation"),
    // video call / meeting
    ("VISIO/RDV", "VISIO / RDV"),
    ("RDV/Visio", "VISIO / RDV"),
    ("Visio / RDV", "VISIO / RDV"),
    // first contact
    ("Premier appel Tel", "Premier contact"),
    ("Premier contact téléphonique", "Premier contact"),
    ("Contact tél/Mail", "Premier contact"),
    // refused
    ("Refus Timing", "Refus"),
    ("Refus Timing à rappeler", "Refus"),
    ("Refus Argent", "Refus"),
    ("Refus Offre", "Refus"),
];

/// Ordered funnel stage. `Ord` follows funnel order; `Other` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkflowStage {
    Lead,
    LeadIntake,
    NoAnswerFirstContact,
    VideoCallMeeting,
    QuoteSent,
    RefusedQuoteSigned,
    Other,
}

impl WorkflowStage {
    /// Every stage in funnel display order.
    pub const FUNNEL: [WorkflowStage; 7] = [
        WorkflowStage::Lead,
        WorkflowStage::LeadIntake,
        WorkflowStage::NoAnswerFirstContact,
        WorkflowStage::VideoCallMeeting,
        WorkflowStage::QuoteSent,
        WorkflowStage::RefusedQuoteSigned,
        WorkflowStage::Other,
    ];

    /// Classifies a canonical step group. Total: anything unrecognized is `Other`.
    ///
    /// Follow-up/handoff steps are placed in `NoAnswerFirstContact` even though they
    /// happen mid-pipeline; that is the business's chosen reading of the funnel.
    pub fn from_step_group(step_group: &str) -> Self {
        match step_group.trim() {
            "Piste" | "Lead" => WorkflowStage::Lead,
            "Prise en charge lead" | "Lead intake" => WorkflowStage::LeadIntake,
            "NRP" | "No-answer" | "Premier contact" | "First contact" => {
                WorkflowStage::NoAnswerFirstContact
            }
            "Relance / Transfert" | "Follow-up / Handoff" => WorkflowStage::NoAnswerFirstContact,
            "VISIO / RDV" | "Video call / Meeting" => WorkflowStage::VideoCallMeeting,
            "Envoi de devis" | "Quote sent" => WorkflowStage::QuoteSent,
            "Refus" | "Refused" | "Devis signé" | "Signed quote" => {
                WorkflowStage::RefusedQuoteSigned
            }
            _ => WorkflowStage::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkflowStage::Lead => "Lead",
            WorkflowStage::LeadIntake => "Lead intake",
            WorkflowStage::NoAnswerFirstContact => "No-answer / First contact",
            WorkflowStage::VideoCallMeeting => "Video call / Meeting",
            WorkflowStage::QuoteSent => "Quote sent",
            WorkflowStage::RefusedQuoteSigned => "Refused / Quote signed",
            WorkflowStage::Other => "Other",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for WorkflowStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Many-to-one map from raw step spellings to canonical step groups.
#[derive(Debug, Clone)]
pub struct StepAliasTable {
    aliases: HashMap<String, String>,
}

impl StepAliasTable {
    /// Builds and validates a table.
    ///
    /// Rejects duplicate raw labels, and canonical labels that are themselves aliased
    /// to something else (which would make the mapping non-idempotent).
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, AppError> {
        let mut aliases = HashMap::with_capacity(pairs.len());
        for (raw, canonical) in pairs {
            if aliases
                .insert(raw.to_string(), canonical.to_string())
                .is_some()
            {
                return Err(AppError::Configuration(format!(
                    "duplicate step alias '{}'",
                    raw
                )));
            }
        }

        for canonical in aliases.values() {
            if let Some(target) = aliases.get(canonical) {
                if target != canonical {
                    return Err(AppError::Configuration(format!(
                        "canonical step group '{}' is aliased to '{}'",
                        canonical, target
                    )));
                }
            }
        }

        Ok(Self { aliases })
    }

    pub fn builtin() -> Result<Self, AppError> {
        Self::from_pairs(STEP_ALIASES)
    }

    /// Canonical group for `raw`. Unmapped labels fall through unchanged.
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        match self.aliases.get(raw) {
            Some(canonical) => canonical.as_str(),
            None => raw,
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn raw_labels(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }
}

/// Pipeline and step canonicalization, built once at startup.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    aliases: StepAliasTable,
    noise: Vec<String>,
}

impl FieldNormalizer {
    pub fn new(aliases: StepAliasTable, noise: &[&str]) -> Self {
        Self {
            aliases,
            noise: noise.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn builtin() -> Result<Self, AppError> {
        let aliases = StepAliasTable::builtin()?;
        tracing::debug!("Step alias table loaded: {} aliases", aliases.len());
        Ok(Self::new(aliases, PIPELINE_NOISE))
    }

    pub fn aliases(&self) -> &StepAliasTable {
        &self.aliases
    }

    /// Drops boilerplate words and collapses whitespace.
    /// Missing labels, and labels made only of boilerplate, become `UNKNOWN`.
    ///
    /// Only whole words are dropped: "Commercialisation Nord" is kept as is.
    pub fn clean_pipeline_label(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return UNKNOWN.to_string();
        };

        let cleaned = raw
            .split_whitespace()
            .filter(|word| !self.noise.iter().any(|noise| noise.as_str() == *word))
            .collect::<Vec<_>>()
            .join(" ");
        if cleaned.is_empty() {
            UNKNOWN.to_string()
        } else {
            cleaned
        }
    }

    /// Canonical step group for a raw step label; missing labels become `UNKNOWN`.
    pub fn canonical_step_group(&self, raw: Option<&str>) -> String {
        match raw {
            Some(raw) => self.aliases.resolve(raw).to_string(),
            None => UNKNOWN.to_string(),
        }
    }

    pub fn to_workflow_stage(&self, step_group: &str) -> WorkflowStage {
        WorkflowStage::from_step_group(step_group)
    }
}
