//! Typed views of the XCI replies, serialized to JSON with the gateway's public field names.
use serde::{Deserialize, Serialize};

/// Reputation verdict for one address (`xci>gbudb>result`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct IpResult {
    pub ip: String,
    #[serde(rename = "Type")]
    pub range_type: String,
    pub range: String,
    pub code: i64,
    pub probability: f64,
    pub confidence: f64,
    pub bad: i64,
    pub good: i64,
}

/// Verdict for one scanned message (`xci>scanner>result`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScanResult {
    pub code: i64,
    pub xhdr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<ScanLogEntry>,
}

/// The `<log><s .../></log>` record attached to a scan result when logging was requested.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScanLogEntry {
    pub timestamp: String,
    pub message: String,
    pub code: i64,
    pub rule: String,
    pub performance: ScanPerformance,
    pub gbudb: ScanReputation,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScanPerformance {
    pub setup_time: i64,
    pub scan_time: i64,
    pub bytes: i64,
    pub evaluators: i64,
}

/// Reputation of the source address as the engine saw it during the scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScanReputation {
    pub ordinal: i64,
    pub ip: String,
    pub flag: String,
    pub confidence: f64,
    pub probability: f64,
    pub result: String,
}

/// Aggregate engine statistics (`xci>report>response>stats`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ReportStats {
    pub node_id: String,
    pub basetime: i64,
    pub elapsed: i64,
    pub class: String,
    pub version: Version,
    pub timers: Timers,
    pub gbudb: GbudbStats,
    pub rules: Rules,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Version {
    pub engine: String,
    pub platform: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Timers {
    pub run: RunTimer,
    pub sync: Timer,
    pub save: Timer,
    pub condense: Timer,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RunTimer {
    pub started: i64,
    pub elapsed: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Timer {
    pub latest: i64,
    pub elapsed: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GbudbStats {
    pub size: GbudbSize,
    pub records: GbudbRecords,
    pub utilization: GbudbUtilization,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GbudbSize {
    pub bytes: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GbudbRecords {
    pub count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GbudbUtilization {
    pub percent: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Rules {
    pub rulesbase: RuleStamp,
    pub active: RuleStamp,
    pub update: RuleUpdate,
    pub latest: LatestRule,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleStamp {
    pub utc: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleUpdate {
    pub ready: String,
    pub utc: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LatestRule {
    pub rule: String,
}
