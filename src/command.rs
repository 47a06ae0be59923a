//! Rendering of XCI commands.
//!
//! Every command is a single `<snf><xci>...</xci></snf>` document with one empty element
//! carrying the parameters as attributes. Attribute values are escaped, so a crafted ip or
//! file path cannot add markup to the command.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use quick_xml::escape::escape;

/// Time window for a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Second,
    Minute,
    Hour,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Second => "second",
            Interval::Minute => "minute",
            Interval::Hour => "hour",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "second" => Ok(Interval::Second),
            "minute" => Ok(Interval::Minute),
            "hour" => Ok(Interval::Hour),
            other => Err(format!(
                "invalid interval {other:?}: must be one of second, minute, hour"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XciCommand {
    Scan {
        file_path: PathBuf,
        ip: Option<String>,
        log_enabled: bool,
        xhdr_enabled: bool,
    },
    TestIp {
        ip: String,
    },
    Report {
        interval: Interval,
    },
}

impl XciCommand {
    /// Short operation name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            XciCommand::Scan { .. } => "scan",
            XciCommand::TestIp { .. } => "testip",
            XciCommand::Report { .. } => "report",
        }
    }
}

/// Render `cmd` as the XCI text sent to snf-server.
pub fn build(cmd: &XciCommand) -> String {
    match cmd {
        XciCommand::Scan {
            file_path,
            ip,
            log_enabled,
            xhdr_enabled,
        } => {
            let file = file_path.to_string_lossy();
            let mut attrs = vec![
                ("xhdr", yes_no(*xhdr_enabled)),
                ("log", yes_no(*log_enabled)),
                ("file", &*file),
            ];
            if let Some(ip) = ip.as_deref().filter(|ip| !ip.is_empty()) {
                attrs.push(("ip", ip));
            }
            envelope(&["scanner"], &empty_element("scan", &attrs))
        }
        XciCommand::TestIp { ip } => {
            envelope(&["gbudb"], &empty_element("test", &[("ip", ip.as_str())]))
        }
        XciCommand::Report { interval } => envelope(
            &["report", "request"],
            &empty_element("status", &[("class", interval.as_str())]),
        ),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn empty_element(name: &str, attrs: &[(&str, &str)]) -> String {
    let mut out = format!("<{name}");
    for (key, value) in attrs {
        out.push_str(&format!(" {key}=\"{}\"", escape(*value)));
    }
    out.push_str("/>");
    out
}

/// Nest `inner` inside `<snf><xci>` and then `path`, outermost first.
fn envelope(path: &[&str], inner: &str) -> String {
    let mut open = String::from("<snf><xci>");
    let mut close = String::new();
    for name in path {
        open.push_str(&format!("<{name}>"));
        close.insert_str(0, &format!("</{name}>"));
    }
    format!("{open}{inner}{close}</xci></snf>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(ip: Option<&str>) -> XciCommand {
        XciCommand::Scan {
            file_path: PathBuf::from("/usr/share/snf-server/storage/snf-abc123"),
            ip: ip.map(str::to_string),
            log_enabled: true,
            xhdr_enabled: false,
        }
    }

    #[test]
    fn scan_with_ip() {
        assert_eq!(
            build(&scan(Some("203.0.113.5"))),
            "<snf><xci><scanner><scan xhdr=\"no\" log=\"yes\" \
             file=\"/usr/share/snf-server/storage/snf-abc123\" ip=\"203.0.113.5\"/>\
             </scanner></xci></snf>"
        );
    }

    #[test]
    fn scan_without_ip_omits_attribute() {
        for ip in [None, Some("")] {
            let xci = build(&scan(ip));
            assert!(!xci.contains("ip="), "unexpected ip attribute in {xci}");
            assert!(xci.contains("file=\"/usr/share/snf-server/storage/snf-abc123\""));
        }
    }

    #[test]
    fn scan_flags_render_yes_no() {
        let xci = build(&XciCommand::Scan {
            file_path: PathBuf::from("/tmp/x"),
            ip: None,
            log_enabled: false,
            xhdr_enabled: true,
        });
        assert!(xci.contains("xhdr=\"yes\" log=\"no\""));
    }

    #[test]
    fn test_ip_command() {
        let xci = build(&XciCommand::TestIp {
            ip: "192.0.2.10".into(),
        });
        assert_eq!(
            xci,
            "<snf><xci><gbudb><test ip=\"192.0.2.10\"/></gbudb></xci></snf>"
        );
    }

    #[test]
    fn report_command() {
        let xci = build(&XciCommand::Report {
            interval: Interval::Hour,
        });
        assert_eq!(
            xci,
            "<snf><xci><report><request><status class=\"hour\"/></request></report></xci></snf>"
        );
    }

    #[test]
    fn attribute_values_are_escaped() {
        let xci = build(&XciCommand::TestIp {
            ip: "1.2.3.4\"/><scanner".into(),
        });
        assert!(!xci.contains("<scanner"));
        assert!(xci.contains("&quot;/&gt;&lt;scanner"));
    }

    #[test]
    fn interval_parsing() {
        assert_eq!("second".parse::<Interval>(), Ok(Interval::Second));
        assert_eq!("minute".parse::<Interval>(), Ok(Interval::Minute));
        assert_eq!("hour".parse::<Interval>(), Ok(Interval::Hour));
        assert!("day".parse::<Interval>().is_err());
        assert!("Hour".parse::<Interval>().is_err());
        assert!("".parse::<Interval>().is_err());
    }
}
