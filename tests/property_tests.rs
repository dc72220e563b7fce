/// Property-based tests using proptest
/// Tests invariants that should hold for every CRM payload, however odd
use proptest::prelude::*;
use sellsy_leads::assembler::{assemble, exclude_pipeline};
use sellsy_leads::geo::{department_name, extract_postal_code, postal_to_department, resolve};
use sellsy_leads::models::RawOpportunity;
use sellsy_leads::normalizer::{FieldNormalizer, WorkflowStage};

fn normalizer() -> FieldNormalizer {
    FieldNormalizer::builtin().unwrap()
}

// Property: postal code extraction never panics and only yields 5 digits
proptest! {
    #[test]
    fn postal_extraction_never_panics(text in "\\PC*") {
        if let Some(code) = extract_postal_code(&text) {
            prop_assert_eq!(code.len(), 5);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
            prop_assert!(text.contains(&code));
        }
    }

    #[test]
    fn embedded_postal_code_is_found(
        prefix in "[A-Za-z ]{0,20}",
        code in "[0-9]{5}",
        suffix in "[A-Za-z ]{0,20}"
    ) {
        let text = format!("{} {} {}", prefix, code, suffix);
        prop_assert_eq!(extract_postal_code(&text), Some(code));
    }

    #[test]
    fn longer_digit_runs_are_not_postal_codes(digits in "[0-9]{6,12}") {
        prop_assert_eq!(extract_postal_code(&digits), None);
    }
}

// Property: department derivation
proptest! {
    #[test]
    fn department_is_two_digit_prefix(code in "(0[1-9]|1[0-9]|[3-9][0-9])[0-9]{3}") {
        let department = postal_to_department(&code).unwrap();
        prop_assert_eq!(department.as_str(), &code[..2]);
    }

    #[test]
    fn corsica_splits_on_third_digit(rest in "[0-9]{3}") {
        let code = format!("20{}", rest);
        let third = rest.chars().next().unwrap();
        let expected = if third <= '4' { "2A" } else { "2B" };

        let department = postal_to_department(&code).unwrap();
        prop_assert_eq!(department.as_str(), expected);
        prop_assert!(department_name(&department).is_some());
    }

    #[test]
    fn resolve_is_consistent(text in "\\PC{0,40}") {
        let (postal, code, name) = resolve(Some(text.as_str()));
        match postal {
            None => {
                prop_assert!(code.is_none());
                prop_assert!(name.is_none());
            }
            Some(_) => {
                prop_assert!(code.is_some());
                prop_assert!(name.is_some());
            }
        }
    }
}

// Property: step groups and workflow stages
proptest! {
    #[test]
    fn workflow_stage_is_total(label in "\\PC*") {
        let stage = normalizer().to_workflow_stage(&label);
        prop_assert!(WorkflowStage::FUNNEL.contains(&stage));
    }

    #[test]
    fn step_grouping_is_idempotent(step in "\\PC{0,30}") {
        let normalizer = normalizer();
        let once = normalizer.canonical_step_group(Some(step.as_str()));
        let twice = normalizer.canonical_step_group(Some(once.as_str()));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn pipeline_label_never_empty(label in "\\PC{0,40}") {
        let cleaned = normalizer().clean_pipeline_label(Some(label.as_str()));
        prop_assert!(!cleaned.is_empty());
        prop_assert_eq!(cleaned.trim(), cleaned.as_str());
        prop_assert!(!cleaned.contains("  "));
    }
}

fn raw_opportunity() -> impl Strategy<Value = RawOpportunity> {
    (
        proptest::option::of("[0-9]{1,6}"),
        proptest::option::of("\\PC{0,30}"),
        proptest::option::of("\\PC{0,25}"),
        proptest::option::of("\\PC{0,20}"),
        proptest::option::of("\\PC{0,12}"),
    )
        .prop_map(|(id, name, created, pipeline, amount)| RawOpportunity {
            id,
            name,
            created,
            pipeline,
            amount,
            ..Default::default()
        })
}

// Property: assembly is one-to-one and order-preserving
proptest! {
    #[test]
    fn assemble_is_one_to_one(records in proptest::collection::vec(raw_opportunity(), 0..40)) {
        let leads = assemble(&normalizer(), &records);

        prop_assert_eq!(leads.len(), records.len());
        for (lead, record) in leads.iter().zip(&records) {
            prop_assert_eq!(&lead.id, &record.id);
            prop_assert_eq!(&lead.name, &record.name);
        }
    }

    #[test]
    fn exclusion_only_removes_excluded_pipeline(
        records in proptest::collection::vec(raw_opportunity(), 0..40)
    ) {
        let leads = assemble(&normalizer(), &records);
        let total = leads.len();
        let excluded = leads.iter().filter(|l| l.pipeline == "Unknown").count();

        let kept = exclude_pipeline(leads, "Unknown");

        prop_assert_eq!(kept.len(), total - excluded);
        prop_assert!(kept.iter().all(|l| l.pipeline != "Unknown"));
    }
}
