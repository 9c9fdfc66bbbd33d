use serde::{Deserialize, Serialize};

macro_rules! lane_types {
    ($($variant:ident => ($code:literal, $label:literal)),+ $(,)?) => {
        /// Lane types of the ASP `ref_type_voie` reference file.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum LaneType {
            $(
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl LaneType {
            pub const ALL: &'static [LaneType] = &[$(LaneType::$variant),+];

            /// ASP code, as sent in employee records.
            pub const fn code(self) -> &'static str {
                match self {
                    $(LaneType::$variant => $code,)+
                }
            }

            pub const fn label(self) -> &'static str {
                match self {
                    $(LaneType::$variant => $label,)+
                }
            }
        }
    };
}

lane_types! {
    Aer => ("AER", "Aérodrome"),
    Agl => ("AGL", "Agglomération"),
    Aire => ("AIRE", "Aire"),
    All => ("ALL", "Allée"),
    Ach => ("ACH", "Ancien chemin"),
    Art => ("ART", "Ancienne route"),
    Av => ("AV", "Avenue"),
    Begi => ("BEGI", "Beguinage"),
    Bd => ("BD", "Boulevard"),
    Brg => ("BRG", "Bourg"),
    Cpg => ("CPG", "Camping"),
    Car => ("CAR", "Carrefour"),
    Ctre => ("CTRE", "Centre"),
    Ccal => ("CCAL", "Centre commercial"),
    Cht => ("CHT", "Chateau"),
    Chs => ("CHS", "Chaussee"),
    Chem => ("CHEM", "Chemin"),
    Chv => ("CHV", "Chemin vicinal"),
    Cite => ("CITE", "Cité"),
    Clos => ("CLOS", "Clos"),
    Ctr => ("CTR", "Contour"),
    Cor => ("COR", "Corniche"),
    Cote => ("COTE", "Coteaux"),
    Cour => ("COUR", "Cour"),
    Crs => ("CRS", "Cours"),
    Dsc => ("DSC", "Descente"),
    Dom => ("DOM", "Domaine"),
    Ecl => ("ECL", "Ecluse"),
    Esc => ("ESC", "Escalier"),
    Espa => ("ESPA", "Espace"),
    Esp => ("ESP", "Esplanade"),
    Fg => ("FG", "Faubourg"),
    Frm => ("FRM", "Ferme"),
    Fon => ("FON", "Fontaine"),
    Gal => ("GAL", "Galerie"),
    Gare => ("GARE", "Gare"),
    Gbd => ("GBD", "Grand boulevard"),
    Gpl => ("GPL", "Grande place"),
    Gr => ("GR", "Grande rue"),
    Gri => ("GRI", "Grille"),
    Ham => ("HAM", "Hameau"),
    Imm => ("IMM", "Immeuble(s)"),
    Imp => ("IMP", "Impasse"),
    Jard => ("JARD", "Jardin"),
    Ld => ("LD", "Lieu-dit"),
    Lot => ("LOT", "Lotissement"),
    Mail => ("MAIL", "Mail"),
    Mais => ("MAIS", "Maison"),
    Mas => ("MAS", "Mas"),
    Mte => ("MTE", "Montee"),
    Parc => ("PARC", "Parc"),
    Prv => ("PRV", "Parvis"),
    Pas => ("PAS", "Passage"),
    Ple => ("PLE", "Passerelle"),
    Pch => ("PCH", "Petit chemin"),
    Prt => ("PRT", "Petite route"),
    Ptr => ("PTR", "Petite rue"),
    Pl => ("PL", "Place"),
    Ptte => ("PTTE", "Placette"),
    Pln => ("PLN", "Plaine"),
    Plan => ("PLAN", "Plan"),
    Plt => ("PLT", "Plateau"),
    Pont => ("PONT", "Pont"),
    Port => ("PORT", "Port"),
    Prom => ("PROM", "Promenade"),
    Quai => ("QUAI", "Quai"),
    Quar => ("QUAR", "Quartier"),
    Rpe => ("RPE", "Rampe"),
    Remp => ("REMP", "Rempart"),
    Res => ("RES", "Residence"),
    Roc => ("ROC", "Rocade"),
    Rpt => ("RPT", "Rond-point"),
    Rtd => ("RTD", "Rotonde"),
    Rte => ("RTE", "Route"),
    Rue => ("RUE", "Rue"),
    Rle => ("RLE", "Ruelle"),
    Sen => ("SEN", "Sente"),
    Sent => ("SENT", "Sentier"),
    Sq => ("SQ", "Square"),
    Tpl => ("TPL", "Terre plein"),
    Trav => ("TRAV", "Traverse"),
    Ven => ("VEN", "Venelle"),
    Vte => ("VTE", "Vieille route"),
    Vche => ("VCHE", "Vieux chemin"),
    Vill => ("VILL", "Villa"),
    Vlge => ("VLGE", "Village"),
    Voie => ("VOIE", "Voie"),
    Zone => ("ZONE", "Zone"),
    Za => ("ZA", "Zone d'activite"),
    Zac => ("ZAC", "Zone d'amenagement concerte"),
    Zad => ("ZAD", "Zone d'amenagement differe"),
    Zi => ("ZI", "Zone industrielle"),
    Zup => ("ZUP", "Zone urbanisation prio"),
}

impl LaneType {
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|lane| lane.code().eq_ignore_ascii_case(code))
    }

    /// Lookup by label, ignoring case and accents ("allée" matches "Allée").
    pub fn with_similar_label(label: &str) -> Option<Self> {
        let wanted = fold(label);
        Self::ALL
            .iter()
            .copied()
            .find(|lane| fold(lane.label()) == wanted)
    }

    /// Resolve the label of a geocoding result: code, label, then known aliases.
    pub fn resolve(value: &str) -> Option<Self> {
        Self::from_code(value)
            .or_else(|| Self::with_similar_label(value))
            .or_else(|| find_lane_type_alias(value))
    }
}

/// Geocoding sometimes returns abbreviated or pluralized lane labels ("r", "Allees").
pub fn find_lane_type_alias(alias: &str) -> Option<LaneType> {
    let alias = fold(alias);

    if alias.starts_with("grand") {
        let rest = alias.trim_start_matches("grande").trim_start_matches("grand");
        let mut chars = rest.chars();
        if matches!(chars.next(), Some(' ' | '-' | '\'')) && chars.as_str().starts_with("rue") {
            return Some(LaneType::Gr);
        }
    }
    if alias.starts_with("lieu") || alias.starts_with("lie") {
        let rest = alias.trim_start_matches("lieu").trim_start_matches("lie");
        let mut chars = rest.chars();
        if matches!(chars.next(), Some(' ' | '-')) && chars.as_str().starts_with("dit") {
            return Some(LaneType::Ld);
        }
    }

    const PREFIXES: &[(&str, LaneType)] = &[
        ("r", LaneType::Rue),
        ("che", LaneType::Chem),
        ("qu", LaneType::Quai),
        ("voies", LaneType::Voie),
        ("domaines", LaneType::Dom),
        ("allees", LaneType::All),
    ];

    PREFIXES
        .iter()
        .find(|(prefix, _)| alias.starts_with(prefix))
        .map(|(_, lane)| *lane)
}

/// Lowercase and strip the French diacritics found in lane labels.
fn fold(value: &str) -> String {
    value
        .trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Street number extensions (`ref_extension_voie`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneExtension {
    B,
    T,
    Q,
    C,
}

impl LaneExtension {
    pub const fn label(self) -> &'static str {
        match self {
            Self::B => "Bis",
            Self::T => "Ter",
            Self::Q => "Quater",
            Self::C => "Quinquies",
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::B => "B",
            Self::T => "T",
            Self::Q => "Q",
            Self::C => "C",
        }
    }

    /// Accepts either the one-letter code or the label, case-insensitively.
    pub fn with_similar_name_or_value(value: &str) -> Option<Self> {
        let value = value.trim();
        [Self::B, Self::T, Self::Q, Self::C].into_iter().find(|ext| {
            value.eq_ignore_ascii_case(ext.code()) || value.eq_ignore_ascii_case(ext.label())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_codes_and_labels() {
        assert_eq!(LaneType::from_code("rte"), Some(LaneType::Rte));
        assert_eq!(LaneType::with_similar_label("allée"), Some(LaneType::All));
        assert_eq!(LaneType::with_similar_label("Cite"), Some(LaneType::Cite));
        assert_eq!(LaneType::Chem.code(), "CHEM");
    }

    #[test]
    fn aliases_cover_common_geocoding_variants() {
        assert_eq!(find_lane_type_alias("r"), Some(LaneType::Rue));
        assert_eq!(find_lane_type_alias("Chem."), Some(LaneType::Chem));
        assert_eq!(find_lane_type_alias("Grande-Rue"), Some(LaneType::Gr));
        assert_eq!(find_lane_type_alias("grand rue"), Some(LaneType::Gr));
        assert_eq!(find_lane_type_alias("Quai"), Some(LaneType::Quai));
        assert_eq!(find_lane_type_alias("Allées"), Some(LaneType::All));
        assert_eq!(find_lane_type_alias("lieu-dit"), Some(LaneType::Ld));
        assert_eq!(find_lane_type_alias("lie dit"), Some(LaneType::Ld));
        assert_eq!(find_lane_type_alias("avenue"), None);
    }

    #[test]
    fn resolve_prefers_exact_matches_over_aliases() {
        // "rte" is a code and must not fall through to the "r" alias.
        assert_eq!(LaneType::resolve("RTE"), Some(LaneType::Rte));
        assert_eq!(LaneType::resolve("Rond-point"), Some(LaneType::Rpt));
        assert_eq!(LaneType::resolve("rues"), Some(LaneType::Rue));
    }

    #[test]
    fn lane_extension_matches_code_or_label() {
        assert_eq!(LaneExtension::with_similar_name_or_value("b"), Some(LaneExtension::B));
        assert_eq!(
            LaneExtension::with_similar_name_or_value("QUINQUIES"),
            Some(LaneExtension::C)
        );
        assert_eq!(LaneExtension::with_similar_name_or_value("bis repetita"), None);
    }
}
