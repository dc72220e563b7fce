//! Postal code extraction and French department resolution.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// A standalone run of exactly five ASCII digits.
static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{5})(?:[^0-9]|$)").unwrap());

/// Metropolitan departments, keyed by their 2-character code.
pub const DEPARTMENTS: &[(&str, &str)] = &[
    ("01", "Ain"),
    ("02", "Aisne"),
    ("03", "Allier"),
    ("04", "Alpes-de-Haute-Provence"),
    ("05", "Hautes-Alpes"),
    ("06", "Alpes-Maritimes"),
    ("07", "Ardèche"),
    ("08", "Ardennes"),
    ("09", "Ariège"),
    ("10", "Aube"),
    ("11", "Aude"),
    ("12", "Aveyron"),
    ("13", "Bouches-du-Rhône"),
    ("14", "Calvados"),
    ("15", "Cantal"),
    ("16", "Charente"),
    ("17", "Charente-Maritime"),
    ("18", "Cher"),
    ("19", "Corrèze"),
    ("2A", "Corse-du-Sud"),
    ("2B", "Haute-Corse"),
    ("21", "Côte-d'Or"),
    ("22", "Côtes-d'Armor"),
    ("23", "Creuse"),
    ("24", "Dordogne"),
    ("25", "Doubs"),
    ("26", "Drôme"),
    ("27", "Eure"),
    ("28", "Eure-et-Loir"),
    ("29", "Finistère"),
    ("30", "Gard"),
    ("31", "Haute-Garonne"),
    ("32", "Gers"),
    ("33", "Gironde"),
    ("34", "Hérault"),
    ("35", "Ille-et-Vilaine"),
    ("36", "Indre"),
    ("37", "Indre-et-Loire"),
    ("38", "Isère"),
    ("39", "Jura"),
    ("40", "Landes"),
    ("41", "Loir-et-Cher"),
    ("42", "Loire"),
    ("43", "Haute-Loire"),
    ("44", "Loire-Atlantique"),
    ("45", "Loiret"),
    ("46", "Lot"),
    ("47", "Lot-et-Garonne"),
    ("48", "Lozère"),
    ("49", "Maine-et-Loire"),
    ("50", "Manche"),
    ("51", "Marne"),
    ("52", "Haute-Marne"),
    ("53", "Mayenne"),
    ("54", "Meurthe-et-Moselle"),
    ("55", "Meuse"),
    ("56", "Morbihan"),
    ("57", "Moselle"),
    ("58", "Nièvre"),
    ("59", "Nord"),
    ("60", "Oise"),
    ("61", "Orne"),
    ("62", "Pas-de-Calais"),
    ("63", "Puy-de-Dôme"),
    ("64", "Pyrénées-Atlantiques"),
    ("65", "Hautes-Pyrénées"),
    ("66", "Pyrénées-Orientales"),
    ("67", "Bas-Rhin"),
    ("68", "Haut-Rhin"),
    ("69", "Rhône"),
    ("70", "Haute-Saône"),
    ("71", "Saône-et-Loire"),
    ("72", "Sarthe"),
    ("73", "Savoie"),
    ("74", "Haute-Savoie"),
    ("75", "Paris"),
    ("76", "Seine-Maritime"),
    ("77", "Seine-et-Marne"),
    ("78", "Yvelines"),
    ("79", "Deux-Sèvres"),
    ("80", "Somme"),
    ("81", "Tarn"),
    ("82", "Tarn-et-Garonne"),
    ("83", "Var"),
    ("84", "Vaucluse"),
    ("85", "Vendée"),
    ("86", "Vienne"),
    ("87", "Haute-Vienne"),
    ("88", "Vosges"),
    ("89", "Yonne"),
    ("90", "Territoire de Belfort"),
    ("91", "Essonne"),
    ("92", "Hauts-de-Seine"),
    ("93", "Seine-Saint-Denis"),
    ("94", "Val-de-Marne"),
    ("95", "Val-d'Oise"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Department {
    pub code: &'static str,
    pub name: &'static str,
}

pub fn departments() -> impl Iterator<Item = Department> {
    DEPARTMENTS
        .iter()
        .map(|&(code, name)| Department { code, name })
}

pub fn department_name(code: &str) -> Option<&'static str> {
    DEPARTMENTS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// First standalone 5-digit token in `text`.
pub fn extract_postal_code(text: &str) -> Option<String> {
    POSTAL_CODE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Department code for a postal code: its first two characters, except in the
/// Corsican "20" range where the third digit splits 0-4 into "2A" and 5-9 into "2B".
///
/// The prefix is not checked against `DEPARTMENTS`.
pub fn postal_to_department(code: &str) -> Option<String> {
    let mut chars = code.chars();
    let prefix: String = chars.by_ref().take(2).collect();
    if prefix.chars().count() < 2 {
        return None;
    }

    if prefix != "20" {
        return Some(prefix);
    }

    match chars.next().and_then(|c| c.to_digit(10)) {
        Some(0..=4) => Some("2A".to_string()),
        Some(_) => Some("2B".to_string()),
        None => None,
    }
}

/// Postal code, department code and display name for a free-text field.
/// The name falls back to the raw code when the code is not in the table.
pub fn resolve(text: Option<&str>) -> (Option<String>, Option<String>, Option<String>) {
    let postal_code = text.and_then(extract_postal_code);
    let department_code = postal_code.as_deref().and_then(postal_to_department);
    let name = department_code.as_deref().map(|code| {
        department_name(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_string())
    });
    (postal_code, department_code, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_postal_code() {
        assert_eq!(
            extract_postal_code("Dupont 75013 Paris").as_deref(),
            Some("75013")
        );
        assert_eq!(extract_postal_code("69001").as_deref(), Some("69001"));
        assert_eq!(extract_postal_code("no digits here"), None);
        assert_eq!(extract_postal_code("123456"), None);
        assert_eq!(extract_postal_code("1234"), None);
        assert_eq!(extract_postal_code(""), None);
    }

    #[test]
    fn test_extract_skips_longer_runs() {
        assert_eq!(
            extract_postal_code("tel 0612345678 - 33000 Bordeaux").as_deref(),
            Some("33000")
        );
        assert_eq!(
            extract_postal_code("Martin (13008), Marseille").as_deref(),
            Some("13008")
        );
        assert_eq!(
            extract_postal_code("lot 20090/20600").as_deref(),
            Some("20090")
        );
    }

    #[test]
    fn test_postal_to_department() {
        assert_eq!(postal_to_department("75013").as_deref(), Some("75"));
        assert_eq!(postal_to_department("01000").as_deref(), Some("01"));
        assert_eq!(postal_to_department("20090").as_deref(), Some("2A"));
        assert_eq!(postal_to_department("20400").as_deref(), Some("2A"));
        assert_eq!(postal_to_department("20500").as_deref(), Some("2B"));
        assert_eq!(postal_to_department("20600").as_deref(), Some("2B"));
        assert_eq!(postal_to_department("7"), None);
        assert_eq!(postal_to_department(""), None);
        assert_eq!(postal_to_department("20"), None);
    }

    #[test]
    fn test_unassigned_prefix_is_kept() {
        assert_eq!(postal_to_department("98000").as_deref(), Some("98"));
        assert_eq!(department_name("98"), None);

        let (postal, code, name) = resolve(Some("Monaco 98000"));
        assert_eq!(postal.as_deref(), Some("98000"));
        assert_eq!(code.as_deref(), Some("98"));
        assert_eq!(name.as_deref(), Some("98"));
    }

    #[test]
    fn test_department_table() {
        assert_eq!(DEPARTMENTS.len(), 96);
        assert_eq!(department_name("2A"), Some("Corse-du-Sud"));
        assert_eq!(department_name("2B"), Some("Haute-Corse"));
        assert_eq!(department_name("75"), Some("Paris"));
        assert_eq!(department_name("20"), None);
        assert!(departments().all(|d| d.code.len() == 2));
    }

    #[test]
    fn test_resolve_without_text() {
        assert_eq!(resolve(None), (None, None, None));
        assert_eq!(resolve(Some("Jean Dupont")), (None, None, None));
    }
}
