//! Knowledge Graph Seed Data
//!
//! The original `scripts/populate_graphrag_tables.py` seeded the graph from
//! a fixed clinical ontology fragment used by the literal scenarios in §8.
//! This module is its equivalent: `seed_graph()` is run once by
//! `ensure_tables()` (only when `rag_entities` is empty) so those scenarios
//! are reproducible against a freshly bootstrapped database (§9.2).

pub struct ConditionCluster {
    pub condition: &'static str,
    pub medications: &'static [&'static str],
    pub symptoms: &'static [&'static str],
    pub anatomy: &'static [&'static str],
    pub procedures: &'static [&'static str],
}

/// One cluster per condition: medications `treated_by`, symptoms
/// `presents_with`, anatomy `affects`, procedures `diagnosed_by` — the
/// edge types named in §3.
pub const CONDITIONS: &[ConditionCluster] = &[
    ConditionCluster {
        condition: "diabetes mellitus type 2",
        medications: &["metformin", "insulin glargine", "glipizide", "sitagliptin"],
        symptoms: &[
            "hyperglycemia",
            "polyuria",
            "polydipsia",
            "fatigue",
            "blurred vision",
            "neuropathy",
        ],
        anatomy: &["pancreas", "liver", "kidney"],
        procedures: &["glucose monitoring", "HbA1c test", "foot examination"],
    },
    ConditionCluster {
        condition: "hypertension",
        medications: &[
            "lisinopril",
            "amlodipine",
            "hydrochlorothiazide",
            "metoprolol",
            "losartan",
        ],
        symptoms: &[
            "elevated blood pressure",
            "headache",
            "dizziness",
            "chest pain",
        ],
        anatomy: &["heart", "blood vessels", "kidney"],
        procedures: &[
            "blood pressure monitoring",
            "echocardiogram",
            "renal function test",
        ],
    },
    ConditionCluster {
        condition: "congestive heart failure",
        medications: &[
            "furosemide",
            "carvedilol",
            "lisinopril",
            "spironolactone",
            "digoxin",
        ],
        symptoms: &[
            "shortness of breath",
            "dyspnea",
            "edema",
            "fatigue",
            "orthopnea",
            "jugular venous distension",
        ],
        anatomy: &["heart", "lungs", "lower extremities"],
        procedures: &[
            "echocardiogram",
            "BNP test",
            "chest x-ray",
            "cardiac catheterization",
        ],
    },
    ConditionCluster {
        condition: "pneumonia",
        medications: &["amoxicillin", "azithromycin", "levofloxacin", "ceftriaxone"],
        symptoms: &[
            "cough",
            "fever",
            "dyspnea",
            "chest pain",
            "productive sputum",
            "chills",
        ],
        anatomy: &["lungs", "bronchi", "pleura"],
        procedures: &[
            "chest x-ray",
            "sputum culture",
            "blood culture",
            "CT scan chest",
        ],
    },
    ConditionCluster {
        condition: "chronic obstructive pulmonary disease",
        medications: &[
            "tiotropium",
            "fluticasone",
            "albuterol",
            "salmeterol",
            "prednisone",
        ],
        symptoms: &[
            "dyspnea",
            "chronic cough",
            "wheezing",
            "exercise intolerance",
            "barrel chest",
        ],
        anatomy: &["lungs", "bronchi", "diaphragm"],
        procedures: &[
            "pulmonary function test",
            "spirometry",
            "chest x-ray",
            "ABG analysis",
        ],
    },
    ConditionCluster {
        condition: "acute myocardial infarction",
        medications: &[
            "aspirin",
            "heparin",
            "nitroglycerin",
            "morphine",
            "clopidogrel",
            "atorvastatin",
        ],
        symptoms: &[
            "chest pain",
            "diaphoresis",
            "nausea",
            "shortness of breath",
            "arm pain",
            "jaw pain",
        ],
        anatomy: &["heart", "coronary arteries", "left ventricle"],
        procedures: &[
            "ECG",
            "cardiac catheterization",
            "troponin test",
            "coronary angiography",
            "PCI",
        ],
    },
    ConditionCluster {
        condition: "atrial fibrillation",
        medications: &[
            "warfarin",
            "apixaban",
            "rivaroxaban",
            "metoprolol",
            "diltiazem",
            "amiodarone",
        ],
        symptoms: &[
            "palpitations",
            "irregular heartbeat",
            "fatigue",
            "dizziness",
            "syncope",
        ],
        anatomy: &["heart", "atria", "AV node"],
        procedures: &[
            "ECG",
            "Holter monitor",
            "echocardiogram",
            "cardioversion",
            "ablation",
        ],
    },
    ConditionCluster {
        condition: "chronic kidney disease",
        medications: &["epoetin alfa", "sevelamer", "calcitriol", "sodium bicarbonate"],
        symptoms: &[
            "fatigue",
            "edema",
            "anemia",
            "nausea",
            "decreased urine output",
            "pruritus",
        ],
        anatomy: &["kidney", "ureter", "bladder"],
        procedures: &[
            "GFR test",
            "creatinine test",
            "renal ultrasound",
            "kidney biopsy",
            "dialysis",
        ],
    },
    ConditionCluster {
        condition: "sepsis",
        medications: &[
            "vancomycin",
            "piperacillin-tazobactam",
            "norepinephrine",
            "hydrocortisone",
        ],
        symptoms: &[
            "fever",
            "tachycardia",
            "hypotension",
            "altered mental status",
            "tachypnea",
        ],
        anatomy: &["blood", "multiple organ systems"],
        procedures: &[
            "blood culture",
            "lactate test",
            "procalcitonin",
            "central line placement",
        ],
    },
    ConditionCluster {
        condition: "stroke",
        medications: &["alteplase", "aspirin", "clopidogrel", "atorvastatin", "heparin"],
        symptoms: &[
            "hemiparesis",
            "aphasia",
            "facial droop",
            "dysarthria",
            "visual disturbance",
            "ataxia",
        ],
        anatomy: &["brain", "cerebral arteries", "carotid artery"],
        procedures: &[
            "CT head",
            "MRI brain",
            "carotid ultrasound",
            "thrombectomy",
            "tPA administration",
        ],
    },
];

/// Links a seeded entity back to a synthetic originating FHIR resource id
/// (the `resource_id` column §3 sets aside for exactly this), so at least
/// one entity shares an identity with a FHIR document that retrieval tests
/// insert under that id — letting hybrid fusion actually observe a result
/// found by both the FHIR and knowledge-graph sources (§4.7, §8 scenario 4).
pub const ENTITY_RESOURCE_LINKS: &[(&str, &str)] = &[("chest pain", "doc-chest-pain")];

/// Cross-condition comorbidity edges, free-form relationship types.
pub const COMORBIDITIES: &[(&str, &str, &str)] = &[
    ("diabetes mellitus type 2", "hypertension", "comorbid_with"),
    (
        "diabetes mellitus type 2",
        "chronic kidney disease",
        "leads_to",
    ),
    ("hypertension", "stroke", "risk_factor_for"),
    (
        "hypertension",
        "congestive heart failure",
        "contributes_to",
    ),
    ("atrial fibrillation", "stroke", "risk_factor_for"),
    (
        "congestive heart failure",
        "chronic kidney disease",
        "associated_with",
    ),
    (
        "acute myocardial infarction",
        "congestive heart failure",
        "can_cause",
    ),
    ("sepsis", "acute myocardial infarction", "can_trigger"),
];
