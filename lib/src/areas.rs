//! Classify procedures into clinical areas by keywords in their description.
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

/// A named set of keywords. A description belongs to the area if it contains any keyword,
/// ignoring case.
#[derive(Debug, Clone, Copy)]
pub struct Area {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

pub const CHEMOTHERAPY: Area = Area {
    name: "Quimioterapia",
    keywords: &["QUIMIO"],
};
pub const RADIOTHERAPY: Area = Area {
    name: "Radioterapia",
    keywords: &["RADIO"],
};
pub const MENTAL_HEALTH: Area = Area {
    name: "Saúde Mental",
    keywords: &["PSICO", "MENTAL", "PSIQUIAT", "CAPS"],
};
pub const PRIMARY_CARE: Area = Area {
    name: "Atenção Básica",
    keywords: &["CONSULTA", "ATENDIMENTO", "ACOMPANHAMENTO", "PREVENTIV"],
};

/// Areas reported on individually. A procedure can belong to several.
pub const CRITICAL_AREAS: [Area; 4] = [CHEMOTHERAPY, RADIOTHERAPY, MENTAL_HEALTH, PRIMARY_CARE];

pub const CARDIOLOGY: Area = Area {
    name: "Cardiologia",
    keywords: &["CARDIO", "CORAÇÃO", "CORONAR", "VASCULAR"],
};
pub const ONCOLOGY: Area = Area {
    name: "Oncologia",
    keywords: &["ONCO", "CANCER", "TUMOR", "QUIMIO", "RADIO"],
};
/// Label for procedures in no specialty.
pub const OTHER_SPECIALTY: &str = "Outros";

/// Matches descriptions against one area's keywords.
pub struct AreaMatcher {
    area: Area,
    automaton: AhoCorasick,
}

impl AreaMatcher {
    pub fn new(area: Area) -> Self {
        let keywords: Vec<String> = area.keywords.iter().map(|k| k.to_lowercase()).collect();
        AreaMatcher {
            area,
            automaton: AhoCorasick::new(keywords),
        }
    }

    pub fn area(&self) -> &Area {
        &self.area
    }

    pub fn is_match(&self, description: &str) -> bool {
        self.automaton.is_match(&description.to_lowercase())
    }
}

pub static CRITICAL_MATCHERS: Lazy<Vec<AreaMatcher>> =
    Lazy::new(|| CRITICAL_AREAS.iter().copied().map(AreaMatcher::new).collect());

static CARDIOLOGY_MATCHER: Lazy<AreaMatcher> = Lazy::new(|| AreaMatcher::new(CARDIOLOGY));
static ONCOLOGY_MATCHER: Lazy<AreaMatcher> = Lazy::new(|| AreaMatcher::new(ONCOLOGY));

/// The specialty of a procedure. Oncology takes precedence over cardiology.
pub fn specialty(description: Option<&str>) -> &'static str {
    let Some(description) = description else {
        return OTHER_SPECIALTY;
    };
    if ONCOLOGY_MATCHER.is_match(description) {
        ONCOLOGY.name
    } else if CARDIOLOGY_MATCHER.is_match(description) {
        CARDIOLOGY.name
    } else {
        OTHER_SPECIALTY
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords_ignore_case() {
        let mental = AreaMatcher::new(MENTAL_HEALTH);
        assert!(mental.is_match("ATENDIMENTO EM PSICOTERAPIA"));
        assert!(mental.is_match("acompanhamento caps"));
        assert!(!mental.is_match("RADIOGRAFIA DE TORAX"));
    }

    #[test]
    fn areas_overlap() {
        let matched: Vec<_> = CRITICAL_MATCHERS
            .iter()
            .filter(|m| m.is_match("CONSULTA EM RADIOTERAPIA"))
            .map(|m| m.area().name)
            .collect();
        assert_eq!(matched, vec!["Radioterapia", "Atenção Básica"]);
    }

    #[test]
    fn oncology_wins() {
        assert_eq!(specialty(Some("RADIOTERAPIA CARDIOVASCULAR")), "Oncologia");
        assert_eq!(specialty(Some("cirurgia do coração")), "Cardiologia");
        assert_eq!(specialty(Some("CONSULTA MEDICA")), OTHER_SPECIALTY);
        assert_eq!(specialty(None), OTHER_SPECIALTY);
    }
}
