//! Search preferences supplied once per run.
//!
//! Every option carries the label the form shows (and the prompts quote), and a
//! snake_case key used in JSON. Parsing accepts either.

use serde::{Deserialize, Serialize};

/// Implements `key`, `label`, `ALL` and `parse` for a fieldless option enum.
macro_rules! option_enum {
    ($name:ident { $($variant:ident => ($key:literal, $label:literal)),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn key(self) -> &'static str {
                match self { $($name::$variant => $key),+ }
            }

            pub fn label(self) -> &'static str {
                match self { $($name::$variant => $label),+ }
            }

            /// Matches a key or a label, ignoring case and surrounding whitespace.
            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.key().eq_ignore_ascii_case(raw) || v.label().eq_ignore_ascii_case(raw))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkArrangement {
    #[default]
    Any,
    Remote,
    Hybrid,
    OnSite,
}

option_enum!(WorkArrangement {
    Any => ("any", "Any"),
    Remote => ("remote", "Remote"),
    Hybrid => ("hybrid", "Hybrid"),
    OnSite => ("on_site", "On-site"),
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    #[default]
    Any,
    Entry,
    Mid,
    Senior,
    Lead,
}

option_enum!(ExperienceLevel {
    Any => ("any", "Any"),
    Entry => ("entry", "Entry Level (0-2 years)"),
    Mid => ("mid", "Mid Level (3-5 years)"),
    Senior => ("senior", "Senior (5-8 years)"),
    Lead => ("lead", "Lead/Principal (8+ years)"),
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryBand {
    #[default]
    NotSpecified,
    From40To60,
    From60To80,
    From80To100,
    From100To130,
    From130To160,
    From160To200,
    Above200,
}

option_enum!(SalaryBand {
    NotSpecified => ("not_specified", "Not specified"),
    From40To60 => ("from40_to60", "$40,000 - $60,000"),
    From60To80 => ("from60_to80", "$60,000 - $80,000"),
    From80To100 => ("from80_to100", "$80,000 - $100,000"),
    From100To130 => ("from100_to130", "$100,000 - $130,000"),
    From130To160 => ("from130_to160", "$130,000 - $160,000"),
    From160To200 => ("from160_to200", "$160,000 - $200,000"),
    Above200 => ("above200", "$200,000+"),
});

/// Immutable inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPreferences {
    pub topic: String,
    pub work_arrangement: WorkArrangement,
    pub experience_level: ExperienceLevel,
    pub salary_band: SalaryBand,
    pub deep_search: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_keys_and_labels() {
        assert_eq!(WorkArrangement::parse("On-site"), Some(WorkArrangement::OnSite));
        assert_eq!(WorkArrangement::parse("on_site"), Some(WorkArrangement::OnSite));
        assert_eq!(WorkArrangement::parse(" remote "), Some(WorkArrangement::Remote));
        assert_eq!(
            ExperienceLevel::parse("Senior (5-8 years)"),
            Some(ExperienceLevel::Senior)
        );
        assert_eq!(SalaryBand::parse("$200,000+"), Some(SalaryBand::Above200));
        assert_eq!(WorkArrangement::parse("Mars"), None);
    }

    #[test]
    fn test_serde_keys_match_option_keys() {
        for band in SalaryBand::ALL {
            let json = serde_json::to_string(band).unwrap();
            assert_eq!(json, format!("\"{}\"", band.key()));
        }
        for level in ExperienceLevel::ALL {
            let json = serde_json::to_string(level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.key()));
        }
        for arrangement in WorkArrangement::ALL {
            let json = serde_json::to_string(arrangement).unwrap();
            assert_eq!(json, format!("\"{}\"", arrangement.key()));
        }
    }

    #[test]
    fn test_defaults_are_unconstrained() {
        assert_eq!(WorkArrangement::default(), WorkArrangement::Any);
        assert_eq!(ExperienceLevel::default(), ExperienceLevel::Any);
        assert_eq!(SalaryBand::default(), SalaryBand::NotSpecified);
    }
}
