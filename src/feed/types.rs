//! Raw TWSE warrant record
//!
//! The open-data endpoint names its fields in Traditional Chinese and sends
//! every value as loosely formatted text. This struct is the only place that
//! vocabulary appears; everything past it works with canonical rows.

use serde::{Deserialize, Deserializer, Serialize};

/// One element of the TWSE warrant trade dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawWarrantRecord {
    /// 出表日期 - report output date (ROC calendar, `YYYMMDD`)
    #[serde(rename = "出表日期", default, deserialize_with = "deserialize_loose_text")]
    pub out_date: Option<String>,

    /// 交易日期 - trade date (ROC calendar, `YYYMMDD`)
    #[serde(rename = "交易日期", default, deserialize_with = "deserialize_loose_text")]
    pub trade_date: Option<String>,

    /// 權證代號 - warrant code
    #[serde(rename = "權證代號", default, deserialize_with = "deserialize_loose_text")]
    pub warrant_code: Option<String>,

    /// 權證名稱 - warrant name
    #[serde(rename = "權證名稱", default, deserialize_with = "deserialize_loose_text")]
    pub warrant_name: Option<String>,

    /// 成交金額 - turnover
    #[serde(rename = "成交金額", default, deserialize_with = "deserialize_loose_text")]
    pub turnover: Option<String>,

    /// 成交張數 - volume (lots)
    #[serde(rename = "成交張數", default, deserialize_with = "deserialize_loose_text")]
    pub volume: Option<String>,
}

impl RawWarrantRecord {
    /// Decode one payload element; anything that is not an object is skipped
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Accept a string or a number as text; anything else is treated as absent
fn deserialize_loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LooseText {
        Str(String),
        Int(i64),
        Float(f64),
        Other(serde_json::Value),
    }

    Ok(match Option::<LooseText>::deserialize(deserializer)? {
        None => None,
        Some(LooseText::Str(s)) => Some(s),
        Some(LooseText::Int(i)) => Some(i.to_string()),
        Some(LooseText::Float(f)) => Some(f.to_string()),
        Some(LooseText::Other(_)) => None,
    })
}
