// src/sheets/purpose.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse role of a sheet, inferred from its tab name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeTag {
    Input,
    Output,
    Config,
    Master,
    Data,
}

impl PurposeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurposeTag::Input => "input",
            PurposeTag::Output => "output",
            PurposeTag::Config => "config",
            PurposeTag::Master => "master",
            PurposeTag::Data => "data",
        }
    }
}

impl fmt::Display for PurposeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurposeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(PurposeTag::Input),
            "output" => Ok(PurposeTag::Output),
            "config" => Ok(PurposeTag::Config),
            "master" => Ok(PurposeTag::Master),
            "data" => Ok(PurposeTag::Data),
            other => Err(format!("unknown purpose tag '{}'", other)),
        }
    }
}

// Checked in order; first hit wins.
const RULES: &[(PurposeTag, &[&str])] = &[
    (PurposeTag::Input, &["input", "入力"]),
    (PurposeTag::Output, &["output", "出力"]),
    (PurposeTag::Config, &["config", "設定"]),
    (PurposeTag::Master, &["master", "マスタ"]),
];

pub fn classify(sheet_name: &str) -> PurposeTag {
    let lowered = sheet_name.to_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(tag, _)| *tag)
        .unwrap_or(PurposeTag::Data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_name_fragment() {
        assert_eq!(classify("Input"), PurposeTag::Input);
        assert_eq!(classify("customer_input_2024"), PurposeTag::Input);
        assert_eq!(classify("OUTPUT"), PurposeTag::Output);
        assert_eq!(classify("App Config"), PurposeTag::Config);
        assert_eq!(classify("Product Master"), PurposeTag::Master);
        assert_eq!(classify("Sheet1"), PurposeTag::Data);
    }

    #[test]
    fn classifies_japanese_names() {
        assert_eq!(classify("入力シート"), PurposeTag::Input);
        assert_eq!(classify("出力"), PurposeTag::Output);
        assert_eq!(classify("設定"), PurposeTag::Config);
        assert_eq!(classify("商品マスタ"), PurposeTag::Master);
    }

    #[test]
    fn earlier_rule_wins() {
        assert_eq!(classify("input-output map"), PurposeTag::Input);
        assert_eq!(classify("master config"), PurposeTag::Config);
    }

    #[test]
    fn tag_round_trips_through_str() {
        for tag in [
            PurposeTag::Input,
            PurposeTag::Output,
            PurposeTag::Config,
            PurposeTag::Master,
            PurposeTag::Data,
        ] {
            assert_eq!(tag.as_str().parse::<PurposeTag>().unwrap(), tag);
        }
        assert!("other".parse::<PurposeTag>().is_err());
    }
}
