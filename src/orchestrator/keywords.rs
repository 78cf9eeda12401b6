use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "nl")]
    Dutch,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Dutch => "nl",
        }
    }
}

pub type Table = &'static [(Language, &'static [&'static str])];

/// A list of regex fragments per language, compiled once into a single
/// case-insensitive alternation anchored at a word start.
pub struct KeywordSet {
    pub name: &'static str,
    pattern: Regex,
}

impl KeywordSet {
    pub fn new(name: &'static str, table: Table) -> Self {
        let alternatives = table
            .iter()
            .flat_map(|(_, patterns)| patterns.iter().copied())
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})", alternatives))
            .expect("keyword tables are valid regex");
        Self { name, pattern }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }
}

// ── Mode resolution ────────────────────────────────────────────────

pub static COMPLIANCE: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "compliance",
        &[
            (
                Language::English,
                &[
                    r"allow(?:ed|s)?\b",
                    r"permit(?:ted|s)?\b",
                    r"complian(?:t|ce)\b",
                    r"compl(?:y|ies)\b",
                    r"polic(?:y|ies)\b",
                    r"regulat(?:ion|ions|ory)\b",
                    r"setbacks?\b",
                    r"(?:minimum |required )?distance (?:to|from)\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"toegestaan\b",
                    r"vergunning",
                    r"beleid",
                    r"regelgeving\b",
                    r"voldoe(?:t|n)?\b",
                    r"conform\b",
                    r"(?:minimale )?afstand tot\b",
                ],
            ),
        ],
    )
});

pub static SPECIFICATION: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "specification",
        &[
            (
                Language::English,
                &[
                    r"specs?\b",
                    r"specifications?\b",
                    r"execution[- ]spec",
                    r"planting spec",
                    r"tender text\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"bestek",
                    r"specificaties?\b",
                    r"uitvoeringsbestek",
                    r"uitvoeringsspecificatie",
                ],
            ),
        ],
    )
});

pub static SCORING: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "scoring",
        &[
            (
                Language::English,
                &[
                    r"scor(?:e|es|ed|ing)\b",
                    r"shortlist",
                    r"recommend",
                    r"compar(?:e|es|ing|ison)\b",
                    r"alternatives?\b",
                    r"rank(?:ing|ed)?\b",
                    r"best options?\b",
                    r"vs\.?(?:\s|$)",
                    r"versus\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"vergelijk",
                    r"aanbevel",
                    r"alternatie(?:f|ven)\b",
                    r"beste keuze\b",
                    r"rangschik",
                ],
            ),
        ],
    )
});

// ── Context sufficiency ────────────────────────────────────────────

pub static SITE: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "site",
        &[
            (
                Language::English,
                &[
                    r"streets?(?:cape)?\b",
                    r"roads?(?:side)?\b",
                    r"avenues?\b",
                    r"boulevards?\b",
                    r"parks?\b",
                    r"squares?\b",
                    r"plazas?\b",
                    r"courtyards?\b",
                    r"gardens?\b",
                    r"parking",
                    r"verges?\b",
                    r"schoolyards?\b",
                    r"campus\b",
                    r"rooftops?\b",
                    r"roof gardens?\b",
                    r"balcon(?:y|ies)\b",
                    r"riverbanks?\b",
                    r"waterfronts?\b",
                    r"urban\b",
                    r"sites?\b",
                    r"locations?\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"straat",
                    r"park",
                    r"plein",
                    r"laan\b",
                    r"tuin",
                    r"parkeer",
                    r"berm",
                    r"schoolplein",
                    r"binnentuin",
                    r"stad",
                    r"locatie",
                    r"dak",
                    r"oever",
                ],
            ),
        ],
    )
});

pub static GOAL: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "goal",
        &[
            (
                Language::English,
                &[
                    r"shad(?:e|ing)\b",
                    r"cool(?:ing)?\b",
                    r"biodiversity\b",
                    r"pollinat",
                    r"habitat",
                    r"screen(?:ing)?\b",
                    r"privacy\b",
                    r"ornamental\b",
                    r"aesthetic",
                    r"stormwater\b",
                    r"water retention\b",
                    r"air quality\b",
                    r"noise\b",
                    r"fruit\b",
                    r"food\b",
                    r"windbreaks?\b",
                    r"heat\b",
                    r"goals?\b",
                    r"purpose\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"schaduw",
                    r"verkoel",
                    r"biodiversiteit",
                    r"bestuiv",
                    r"privacy",
                    r"sier",
                    r"waterberging",
                    r"luchtkwaliteit",
                    r"geluid",
                    r"hitte",
                    r"doel",
                ],
            ),
        ],
    )
});

pub static CONSTRAINT: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "constraint",
        &[
            (
                Language::English,
                &[
                    r"soils?\b",
                    r"clay\b",
                    r"sand(?:y)?\b",
                    r"drought",
                    r"wet\b",
                    r"salt",
                    r"wind(?:y)?\b",
                    r"space\b",
                    r"width\b",
                    r"height\b",
                    r"narrow\b",
                    r"limited\b",
                    r"budget\b",
                    r"maintenance\b",
                    r"cables?\b",
                    r"utilit(?:y|ies)\b",
                    r"pavement\b",
                    r"paved\b",
                    r"full sun\b",
                    r"roots?\b",
                    r"hardiness\b",
                    r"constraints?\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"grond",
                    r"bodem",
                    r"klei",
                    r"zand",
                    r"droogte",
                    r"zout",
                    r"ruimte",
                    r"breedte",
                    r"hoogte",
                    r"smal",
                    r"beperk",
                    r"budget",
                    r"onderhoud",
                    r"kabels?\b",
                    r"leidingen",
                    r"verhard",
                    r"wortel",
                ],
            ),
        ],
    )
});

pub static SOIL_MOISTURE: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "soil_moisture",
        &[
            (
                Language::English,
                &[
                    r"soils?\b",
                    r"clay\b",
                    r"sand(?:y)?\b",
                    r"loam(?:y)?\b",
                    r"peat(?:y)?\b",
                    r"moist(?:ure)?\b",
                    r"wet\b",
                    r"dry\b",
                    r"drought",
                    r"waterlogged\b",
                    r"drainage\b",
                    r"ph\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"grond",
                    r"bodem",
                    r"klei",
                    r"zand",
                    r"leem",
                    r"veen",
                    r"vochtig",
                    r"nat\b",
                    r"droog",
                    r"drainage",
                ],
            ),
        ],
    )
});

pub static PLANT: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "plant",
        &[
            (
                Language::English,
                &[
                    r"trees?\b",
                    r"shrubs?\b",
                    r"hedges?\b",
                    r"perennials?\b",
                    r"grass(?:es)?\b",
                    r"climbers?\b",
                    r"plants?\b",
                    r"planting\b",
                    r"species\b",
                    r"cultivars?\b",
                    r"oaks?\b",
                    r"maples?\b",
                    r"lindens?\b",
                    r"tilia\b",
                    r"acer\b",
                    r"quercus\b",
                ],
            ),
            (
                Language::Dutch,
                &[
                    r"boom",
                    r"bomen",
                    r"heester",
                    r"haag",
                    r"vaste planten?\b",
                    r"plant",
                    r"soort",
                    r"eik",
                    r"esdoorn",
                    r"linde",
                ],
            ),
        ],
    )
});

// ── Language detection ─────────────────────────────────────────────

static ENGLISH_MARKERS: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "english_markers",
        &[(
            Language::English,
            &[
                r"the\b", r"a\b", r"an\b", r"is\b", r"are\b", r"which\b", r"what\b", r"for\b",
                r"with\b", r"how\b", r"this\b", r"of\b", r"can\b",
            ],
        )],
    )
});

static DUTCH_MARKERS: LazyLock<KeywordSet> = LazyLock::new(|| {
    KeywordSet::new(
        "dutch_markers",
        &[(
            Language::Dutch,
            &[
                r"de\b", r"het\b", r"een\b", r"is\b", r"zijn\b", r"welke\b", r"wat\b", r"voor\b",
                r"met\b", r"hoe\b", r"deze\b", r"van\b", r"mag\b", r"niet\b",
            ],
        )],
    )
});

/// Best-effort language guess. Dutch wins only on strictly more marker hits.
pub fn detect_language(text: &str) -> Language {
    if DUTCH_MARKERS.count(text) > ENGLISH_MARKERS.count(text) {
        Language::Dutch
    } else {
        Language::English
    }
}
