use serde::{Deserialize, Serialize};

/// Kind of work-integration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiaeKind {
    Ei,
    Ai,
    Aci,
    Aciphc,
    Etti,
    Eiti,
    Geiq,
    Ea,
    Eatt,
}

impl SiaeKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ei => "EI",
            Self::Ai => "AI",
            Self::Aci => "ACI",
            Self::Aciphc => "ACIPHC",
            Self::Etti => "ETTI",
            Self::Eiti => "EITI",
            Self::Geiq => "GEIQ",
            Self::Ea => "EA",
            Self::Eatt => "EATT",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ei => "Entreprise d'insertion",
            Self::Ai => "Association intermédiaire",
            Self::Aci => "Atelier chantier d'insertion",
            Self::Aciphc => "Atelier chantier d'insertion premières heures en chantier",
            Self::Etti => "Entreprise de travail temporaire d'insertion",
            Self::Eiti => "Entreprise d'insertion par le travail indépendant",
            Self::Geiq => "Groupement d'employeurs pour l'insertion et la qualification",
            Self::Ea => "Entreprise adaptée",
            Self::Eatt => "Entreprise adaptée de travail temporaire",
        }
    }

    /// Hiring in these structures requires an eligibility diagnosis and a PASS IAE.
    pub const fn is_subject_to_eligibility_rules(self) -> bool {
        !matches!(self, Self::Geiq | Self::Ea | Self::Eatt)
    }

    /// ASP `ref_type_employeur` code.
    pub const fn asp_employer_type(self) -> &'static str {
        match self {
            Self::Ei => "1",
            Self::Etti => "2",
            Self::Ai => "3",
            Self::Aci => "4",
            Self::Ea => "6",
            _ => "7",
        }
    }

    /// ASP measure code (`Rme_code_mesure_disp`), for kinds reported to ASP.
    pub const fn asp_measure(self) -> Option<&'static str> {
        match self {
            Self::Ei => Some("EI_DC"),
            Self::Ai => Some("AI_DC"),
            Self::Aci => Some("ACI_DC"),
            Self::Etti => Some("ETTI_DC"),
            Self::Eiti => Some("EITI_DC"),
            _ => None,
        }
    }

    /// Only AI and ACI may prolong an approval for particular difficulties.
    pub const fn allows_particular_difficulties_prolongation(self) -> bool {
        matches!(self, Self::Ai | Self::Aci)
    }
}

/// Employer side of a job application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Siae {
    pub id: u64,
    pub siret: String,
    pub kind: SiaeKind,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub department: String,
    /// Staff addresses notified of new applications.
    #[serde(default)]
    pub member_emails: Vec<String>,
}

impl Siae {
    pub fn display_name(&self) -> &str {
        if self.brand.trim().is_empty() {
            &self.name
        } else {
            &self.brand
        }
    }

    pub fn is_subject_to_eligibility_rules(&self) -> bool {
        self.kind.is_subject_to_eligibility_rules()
    }

    pub fn siren(&self) -> &str {
        self.siret.get(..9).unwrap_or(&self.siret)
    }

    pub fn has_valid_siret(&self) -> bool {
        self.siret.len() == 14 && self.siret.chars().all(|c| c.is_ascii_digit())
    }
}
