//! Decoding of XCI replies.
//!
//! A reply is walked once into an [`XciEnvelope`] holding every subtree the gateway knows
//! about, then projected onto the one the request asked for. Parsing stops at the first
//! syntax error but everything resolved up to that point is kept; missing or malformed
//! values stay at their zero value.
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{IpResult, ReportStats, ScanResult};

/// Payload returned for a projection name the gateway does not know.
pub const NO_RESPONSE: &[u8] = b"no response";

/// Which part of the reply a request consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Scan,
    TestIp,
    Report,
}

impl FromStr for ResponseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(ResponseKind::Scan),
            "testip" => Ok(ResponseKind::TestIp),
            "report" => Ok(ResponseKind::Report),
            other => Err(format!("unknown response kind: {other}")),
        }
    }
}

/// Every subtree of `<snf>` the gateway reads, decoded in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XciEnvelope {
    pub gbudb: IpResult,
    pub scanner: ScanResult,
    pub report: ReportStats,
}

/// One projection of the envelope, serialized without a wrapping tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XciReply {
    Scan(ScanResult),
    TestIp(IpResult),
    Report(ReportStats),
}

#[derive(Debug, Error)]
#[error("malformed xci reply: {reason}")]
pub struct DecodeError {
    /// Fields resolved before the parser gave up.
    pub partial: XciEnvelope,
    pub reason: String,
}

impl XciEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self, DecodeError> {
        let mut envelope = XciEnvelope::default();
        match walk(raw, &mut envelope) {
            Ok(()) => Ok(envelope),
            Err(e) => Err(DecodeError {
                partial: envelope,
                reason: e.to_string(),
            }),
        }
    }

    pub fn project(self, kind: ResponseKind) -> XciReply {
        match kind {
            ResponseKind::Scan => XciReply::Scan(self.scanner),
            ResponseKind::TestIp => XciReply::TestIp(self.gbudb),
            ResponseKind::Report => XciReply::Report(self.report),
        }
    }
}

/// Decode `raw` and serialize the `kind` projection to JSON. Never fails.
pub fn decode(raw: &[u8], kind: ResponseKind, cid: &str) -> Vec<u8> {
    if raw.is_empty() {
        warn!(cid, ?kind, "empty xci reply");
    }
    let envelope = match XciEnvelope::parse(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(cid, ?kind, error = %e.reason, "xci reply did not parse, using partial result");
            e.partial
        }
    };
    let reply = envelope.project(kind);
    debug!(cid, ?reply, "decoded xci reply");
    serde_json::to_vec(&reply).unwrap_or_else(|e| {
        warn!(cid, error = %e, "failed to serialize xci reply");
        NO_RESPONSE.to_vec()
    })
}

/// Like [`decode`], with the projection given by name (`scan`, `testip`, `report`).
pub fn decode_named(raw: &[u8], kind: &str, cid: &str) -> Vec<u8> {
    match kind.parse::<ResponseKind>() {
        Ok(kind) => decode(raw, kind, cid),
        Err(e) => {
            warn!(cid, "{e}");
            NO_RESPONSE.to_vec()
        }
    }
}

fn walk(raw: &[u8], envelope: &mut XciEnvelope) -> quick_xml::Result<()> {
    // Text is not trimmed: xhdr is handed to the caller exactly as snf-server wrote it.
    // Whitespace between elements lands on paths apply_text ignores.
    let mut reader = Reader::from_reader(raw);

    // Element names below the root, outermost first.
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if seen_root {
                    stack.push(local_name(&e));
                    apply_attributes(envelope, &stack, &e)?;
                } else {
                    seen_root = true;
                }
            }
            Event::Empty(e) => {
                if seen_root {
                    stack.push(local_name(&e));
                    apply_attributes(envelope, &stack, &e)?;
                    stack.pop();
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                apply_text(envelope, &stack, &text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c);
                apply_text(envelope, &stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn apply_attributes(
    envelope: &mut XciEnvelope,
    stack: &[String],
    e: &BytesStart<'_>,
) -> quick_xml::Result<()> {
    let path: Vec<&str> = stack.iter().map(String::as_str).collect();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?;
        apply_attr(envelope, &path, &key, &value);
    }
    Ok(())
}

fn apply_attr(envelope: &mut XciEnvelope, path: &[&str], key: &str, value: &str) {
    match path {
        ["xci", "gbudb", "result"] => {
            let ip = &mut envelope.gbudb;
            match key {
                "ip" => ip.ip = value.to_string(),
                "type" => ip.range_type = value.to_string(),
                "range" => ip.range = value.to_string(),
                "code" => ip.code = int(value),
                "p" => ip.probability = float(value),
                "c" => ip.confidence = float(value),
                "b" => ip.bad = int(value),
                "g" => ip.good = int(value),
                _ => {}
            }
        }
        ["xci", "scanner", "result"] => {
            if key == "code" {
                envelope.scanner.code = int(value);
            }
        }
        ["xci", "scanner", "result", "log", "s", rest @ ..] => {
            let log = envelope.scanner.log.get_or_insert_with(Default::default);
            match (rest, key) {
                ([], "u") => log.timestamp = value.to_string(),
                ([], "m") => log.message = value.to_string(),
                ([], "s") => log.code = int(value),
                ([], "r") => log.rule = value.to_string(),
                (["p"], "s") => log.performance.setup_time = int(value),
                (["p"], "t") => log.performance.scan_time = int(value),
                (["p"], "l") => log.performance.bytes = int(value),
                (["p"], "d") => log.performance.evaluators = int(value),
                (["g"], "o") => log.gbudb.ordinal = int(value),
                (["g"], "i") => log.gbudb.ip = value.to_string(),
                (["g"], "t") => log.gbudb.flag = value.to_string(),
                (["g"], "c") => log.gbudb.confidence = float(value),
                (["g"], "p") => log.gbudb.probability = float(value),
                (["g"], "r") => log.gbudb.result = value.to_string(),
                _ => {}
            }
        }
        ["xci", "report", "response", "stats", rest @ ..] => {
            let stats = &mut envelope.report;
            match (rest, key) {
                ([], "nodeid") => stats.node_id = value.to_string(),
                ([], "basetime") => stats.basetime = int(value),
                ([], "elapsed") => stats.elapsed = int(value),
                ([], "class") => stats.class = value.to_string(),
                (["timers", "run"], "started") => stats.timers.run.started = int(value),
                (["timers", "run"], "elapsed") => stats.timers.run.elapsed = int(value),
                (["timers", "sync"], "latest") => stats.timers.sync.latest = int(value),
                (["timers", "sync"], "elapsed") => stats.timers.sync.elapsed = int(value),
                (["timers", "save"], "latest") => stats.timers.save.latest = int(value),
                (["timers", "save"], "elapsed") => stats.timers.save.elapsed = int(value),
                (["timers", "condense"], "latest") => stats.timers.condense.latest = int(value),
                (["timers", "condense"], "elapsed") => stats.timers.condense.elapsed = int(value),
                (["gbudb", "size"], "bytes") => stats.gbudb.size.bytes = int(value),
                (["gbudb", "records"], "count") => stats.gbudb.records.count = int(value),
                (["gbudb", "utilization"], "percent") => {
                    stats.gbudb.utilization.percent = float(value)
                }
                (["rules", "rulesbase"], "utc") => stats.rules.rulesbase.utc = int(value),
                (["rules", "active"], "utc") => stats.rules.active.utc = int(value),
                (["rules", "update"], "ready") => stats.rules.update.ready = value.to_string(),
                (["rules", "update"], "utc") => stats.rules.update.utc = int(value),
                (["rules", "latest"], "rule") => stats.rules.latest.rule = value.to_string(),
                _ => {}
            }
        }
        _ => {}
    }
}

fn apply_text(envelope: &mut XciEnvelope, stack: &[String], text: &str) {
    let path: Vec<&str> = stack.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["xci", "scanner", "result", "xhdr"] => envelope.scanner.xhdr.push_str(text),
        ["xci", "report", "response", "stats", "version", "engine"] => {
            envelope.report.version.engine.push_str(text)
        }
        ["xci", "report", "response", "stats", "version", "platform"] => {
            envelope.report.version.platform.push_str(text)
        }
        _ => {}
    }
}

fn int(value: &str) -> i64 {
    value.trim().parse().unwrap_or_else(|_| {
        debug!(value, "non-integer attribute value, using 0");
        0
    })
}

fn float(value: &str) -> f64 {
    value.trim().parse().unwrap_or_else(|_| {
        debug!(value, "non-numeric attribute value, using 0");
        0.0
    })
}
