//! Educational catalogue of the conditions the classifier can report.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionInfo {
    /// URL slug, e.g. "basal-cell-carcinoma"
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Classifier label, e.g. "basal cell carcinoma"
    pub label: &'static str,
    pub description: &'static str,
    pub severity: &'static str,
    pub prevalence: &'static str,
    pub related: &'static [&'static str],
    pub learn_more_url: &'static str,
    #[serde(skip_serializing_if = "is_empty")]
    pub treatments: &'static [&'static str],
    #[serde(skip_serializing_if = "is_empty")]
    pub warning_signs: &'static [&'static str],
}

fn is_empty(items: &&[&str]) -> bool {
    items.is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Severity,
    Prevalence,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "severity" => Ok(SortKey::Severity),
            "prevalence" => Ok(SortKey::Prevalence),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

const EDUCATION_URL: &str = "/education/conditions";

pub static CONDITIONS: [ConditionInfo; 9] = [
    ConditionInfo {
        id: "actinic-keratosis",
        name: "Actinic Keratosis",
        label: "actinic keratosis",
        description: "Actinic keratoses are dry scaly patches of skin that have been damaged by the sun. The patches are not usually serious, but there's a small chance they could become skin cancer.",
        severity: "Moderate",
        prevalence: "Common",
        related: &["squamous-cell-carcinoma", "basal-cell-carcinoma"],
        learn_more_url: "https://www.nhs.uk/conditions/actinic-keratoses",
        treatments: &[
            "Prescription creams and gels",
            "Freezing the patches (cryotherapy)",
            "Surgery to cut out or scrape away the patches",
            "Photodynamic therapy (PDT)",
        ],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "basal-cell-carcinoma",
        name: "Basal Cell Carcinoma",
        label: "basal cell carcinoma",
        description: "Basal cell carcinoma is a type of skin cancer that begins in the basal cells, the cells within the skin that produce new skin cells as old ones die off.",
        severity: "High",
        prevalence: "Very common",
        related: &["squamous-cell-carcinoma", "actinic-keratosis"],
        learn_more_url: "https://www.mayoclinic.org/diseases-conditions/basal-cell-carcinoma/symptoms-causes/syc-20354187",
        treatments: &[],
        warning_signs: &[
            "A shiny, skin-colored bump that's translucent",
            "A brown, black or blue lesion with a raised border",
            "A flat, scaly patch with a raised edge",
            "A white, waxy, scar-like lesion",
        ],
    },
    ConditionInfo {
        id: "dermatofibroma",
        name: "Dermatofibroma",
        label: "dermatofibroma",
        description: "Dermatofibromas are harmless growths within the skin that usually have a small diameter.",
        severity: "Low",
        prevalence: "Common",
        related: &["nevus"],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "melanoma",
        name: "Melanoma",
        label: "melanoma",
        description: "Melanoma, the most serious type of skin cancer, develops in the cells that produce melanin, the pigment that gives your skin its color.",
        severity: "Very high",
        prevalence: "Less common",
        related: &["nevus", "basal-cell-carcinoma"],
        learn_more_url: "https://www.mayoclinic.org/diseases-conditions/melanoma/symptoms-causes/syc-20374884",
        treatments: &[],
        warning_signs: &[
            "A change in an existing mole",
            "The development of a new pigmented or unusual-looking growth on your skin",
        ],
    },
    ConditionInfo {
        id: "nevus",
        name: "Nevus",
        label: "nevus",
        description: "Nevus (plural: nevi) is the medical term for a mole. Nevi are very common. Most people have between 10 and 40.",
        severity: "Low",
        prevalence: "Very common",
        related: &["melanoma", "dermatofibroma"],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "pigmented-benign-keratosis",
        name: "Pigmented Benign Keratosis",
        label: "pigmented benign keratosis",
        description: "Pigmented benign keratosis refers to a group of non-cancerous skin growths that appear as thickened, wartlike lesions on the skin.",
        severity: "Low",
        prevalence: "Common",
        related: &["seborrheic-keratosis", "actinic-keratosis"],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "seborrheic-keratosis",
        name: "Seborrheic Keratosis",
        label: "seborrheic keratosis",
        description: "A seborrheic keratosis is a common noncancerous skin growth. People tend to get more of them as they get older.",
        severity: "Low",
        prevalence: "Very common",
        related: &["pigmented-benign-keratosis"],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "squamous-cell-carcinoma",
        name: "Squamous Cell Carcinoma",
        label: "squamous cell carcinoma",
        description: "Squamous cell carcinoma of the skin is a common form of skin cancer that develops in the squamous cells that make up the middle and outer layers of the skin.",
        severity: "High",
        prevalence: "Common",
        related: &["basal-cell-carcinoma", "actinic-keratosis"],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
    ConditionInfo {
        id: "vascular-lesion",
        name: "Vascular Lesion",
        label: "vascular lesion",
        description: "Vascular lesions are relatively common abnormalities of the skin and underlying tissues, more commonly known as birthmarks.",
        severity: "Varies",
        prevalence: "Less common",
        related: &[],
        learn_more_url: EDUCATION_URL,
        treatments: &[],
        warning_signs: &[],
    },
];

/// Shown for labels outside the catalogue (including "unknown").
pub static DEFAULT_CONDITION: ConditionInfo = ConditionInfo {
    id: "unknown",
    name: "Unknown",
    label: "unknown",
    description: "A skin condition that requires professional evaluation.",
    severity: "Unknown",
    prevalence: "Unknown",
    related: &[],
    learn_more_url: EDUCATION_URL,
    treatments: &[],
    warning_signs: &[],
};

const COMMON_RECOMMENDATIONS: [&str; 4] = [
    "Schedule an appointment with a dermatologist for a professional evaluation",
    "Take clear photos of the affected area to show your doctor",
    "Protect your skin from sun exposure and use SPF 30+ sunscreen daily",
    "Perform regular skin self-examinations",
];

/// Lookup by classifier label, case-insensitive
pub fn condition_info(label: &str) -> &'static ConditionInfo {
    let label = label.trim().to_lowercase();
    CONDITIONS
        .iter()
        .find(|c| c.label == label)
        .unwrap_or(&DEFAULT_CONDITION)
}

pub fn condition_by_id(id: &str) -> Option<&'static ConditionInfo> {
    CONDITIONS.iter().find(|c| c.id == id)
}

pub fn related_conditions(id: &str) -> Vec<&'static ConditionInfo> {
    condition_by_id(id)
        .map(|c| c.related.iter().filter_map(|r| condition_by_id(r)).collect())
        .unwrap_or_default()
}

/// Common advice followed by any advice specific to the condition
pub fn recommendations(label: &str) -> Vec<&'static str> {
    let specific: &[&str] = match label.trim().to_lowercase().as_str() {
        "actinic keratosis" => &[
            "Avoid direct sun exposure, especially during peak hours (10 AM to 4 PM)",
            "Use skin moisturizers regularly to reduce dryness",
        ],
        "basal cell carcinoma" => &[
            "Seek medical attention within the next 2-3 weeks",
            "Avoid picking at or irritating the lesion",
        ],
        "melanoma" => &[
            "Seek medical attention as soon as possible (within 1 week)",
            "Check for any other suspicious spots on your skin",
        ],
        _ => &[],
    };
    COMMON_RECOMMENDATIONS.iter().chain(specific).copied().collect()
}

fn severity_rank(severity: &str) -> u8 {
    match severity.to_lowercase().as_str() {
        "low" => 1,
        "moderate" => 2,
        "high" => 3,
        "very high" => 4,
        _ => 0,
    }
}

fn prevalence_rank(prevalence: &str) -> u8 {
    match prevalence.to_lowercase().as_str() {
        "rare" => 1,
        "less common" => 2,
        "common" => 3,
        "very common" => 4,
        _ => 0,
    }
}

/// Filter by name substring (case-insensitive) and sort.
/// Severity and prevalence sort descending; ties keep name order.
pub fn search_conditions(query: &str, sort: SortKey) -> Vec<&'static ConditionInfo> {
    let query = query.trim().to_lowercase();
    let mut found: Vec<_> = CONDITIONS
        .iter()
        .filter(|c| query.is_empty() || c.name.to_lowercase().contains(&query))
        .collect();

    found.sort_by(|a, b| a.name.cmp(b.name));
    match sort {
        SortKey::Name => {}
        SortKey::Severity => found.sort_by_key(|c| std::cmp::Reverse(severity_rank(c.severity))),
        SortKey::Prevalence => found.sort_by_key(|c| std::cmp::Reverse(prevalence_rank(c.prevalence))),
    }
    found
}
