use tracing::info;

use super::envelope::{ComplianceAnswer, ResponseData, ResponseEnvelope, ResponseType};
use super::keywords::{KeywordSet, Language, CONSTRAINT, GOAL, PLANT, SITE, SOIL_MOISTURE};
use super::mode::Mode;
use super::schema::MAX_QUESTIONS;
use super::work_order::WorkOrder;
use crate::docs::types::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fact {
    Site,
    Goal,
    Constraints,
    SoilMoisture,
    Plant,
}

impl Fact {
    fn keywords(&self) -> &'static KeywordSet {
        match self {
            Self::Site => &*SITE,
            Self::Goal => &*GOAL,
            Self::Constraints => &*CONSTRAINT,
            Self::SoilMoisture => &*SOIL_MOISTURE,
            Self::Plant => &*PLANT,
        }
    }

    fn question(&self, language: Language) -> &'static str {
        match (language, self) {
            (Language::English, Self::Site) => {
                "What kind of site is this (street, park, square, courtyard, roof)?"
            }
            (Language::English, Self::Goal) => {
                "What should the planting achieve (shade, biodiversity, cooling, water retention)?"
            }
            (Language::English, Self::Constraints) => {
                "Which constraints apply (soil, space, sun, budget, maintenance, underground utilities)?"
            }
            (Language::English, Self::SoilMoisture) => {
                "What are the soil and moisture conditions (clay, sand, peat; wet or dry)?"
            }
            (Language::English, Self::Plant) => {
                "Which plant or species should the specification cover?"
            }
            (Language::Dutch, Self::Site) => {
                "Om wat voor locatie gaat het (straat, park, plein, binnentuin, dak)?"
            }
            (Language::Dutch, Self::Goal) => {
                "Wat moet de beplanting opleveren (schaduw, biodiversiteit, verkoeling, waterberging)?"
            }
            (Language::Dutch, Self::Constraints) => {
                "Welke randvoorwaarden gelden er (bodem, ruimte, zon, budget, onderhoud, kabels en leidingen)?"
            }
            (Language::Dutch, Self::SoilMoisture) => {
                "Wat zijn de bodem- en vochtomstandigheden (klei, zand, veen; nat of droog)?"
            }
            (Language::Dutch, Self::Plant) => {
                "Voor welke plant of soort moet het bestek worden opgesteld?"
            }
        }
    }
}

fn compliance_message(language: Language) -> &'static str {
    match language {
        Language::English => {
            "No policy document is attached. Attach the relevant policy manual to check compliance."
        }
        Language::Dutch => {
            "Er is geen beleidsdocument toegevoegd. Voeg het relevante beleidsdocument toe om te toetsen."
        }
    }
}

/// Returns an envelope when the request is too under-specified to generate
/// for. A returned envelope ends the pipeline before retrieval.
pub fn check(order: &WorkOrder) -> Option<ResponseEnvelope> {
    let language = order.user_language;

    if order.mode == Mode::PolicyCompliance {
        if order.has_selected(SourceType::PolicyManual) {
            return None;
        }
        info!(mode = %order.mode, "no policy document selected, answering Unknown");
        return Some(ResponseEnvelope::new(
            order.mode,
            ResponseType::Answer,
            ResponseData::Compliance(ComplianceAnswer {
                status: "Unknown".to_string(),
                message: Some(compliance_message(language).to_string()),
                issues: vec![],
            }),
            None,
        ));
    }

    let (required, all_or_nothing): (&[Fact], bool) = match order.mode {
        Mode::GeneralResearch => (&[Fact::Site, Fact::Goal, Fact::Constraints], false),
        Mode::SuitabilityScoring => (&[Fact::Site, Fact::SoilMoisture], true),
        Mode::SpecWriter => (&[Fact::Plant, Fact::Site], true),
        Mode::PolicyCompliance => return None,
    };

    let missing: Vec<Fact> = required
        .iter()
        .copied()
        .filter(|fact| !fact.keywords().matches(&order.user_query))
        .collect();
    if missing.is_empty() {
        return None;
    }

    let asked: &[Fact] = if all_or_nothing { required } else { &missing };
    let questions: Vec<String> = asked
        .iter()
        .take(MAX_QUESTIONS)
        .map(|fact| fact.question(language).to_string())
        .collect();

    info!(
        mode = %order.mode,
        missing = missing.len(),
        questions = questions.len(),
        "context insufficient, asking clarifying questions"
    );
    Some(ResponseEnvelope::clarifying(order.mode, questions))
}
