//! Turns a Quark-Engine JSON report into the summary used for browsing crimes and jumping to their call sites.
//! Only crimes detected with full confidence are kept for browsing; the rest are counted.

use std::{
    collections::BTreeMap,
    fmt::{Display, Write},
    path::Path,
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// The only confidence level that is kept for browsing.
pub const MAX_CONFIDENCE: u8 = 100;

// The report as written by `quark -o`. Fields that aren't used are ignored.
#[derive(Deserialize, Debug)]
struct RawReport {
    #[serde(default)]
    md5: String,
    #[serde(default)]
    apk_filename: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    threat_level: String,
    #[serde(default)]
    total_score: f64,
    #[serde(default)]
    crimes: Vec<RawCrime>,
}

#[derive(Deserialize, Debug)]
struct RawCrime {
    crime: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    weight: f64,
    confidence: String,
    // Each entry maps `"<class>; <method> <signature>"` to the two calls found in that method.
    #[serde(default)]
    register: Vec<BTreeMap<String, RawApiPair>>,
}

#[derive(Deserialize, Debug)]
struct RawApiPair {
    first: Vec<String>,
    second: Vec<String>,
}

/// A parsed confidence level such as `80%`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Confidence(pub u8);

impl Confidence {
    pub fn parse(value: &str) -> Option<Self> {
        let percent: u8 = value.trim().strip_suffix('%')?.trim().parse().ok()?;
        (percent <= MAX_CONFIDENCE).then_some(Self(percent))
    }

    pub fn is_max(&self) -> bool {
        self.0 == MAX_CONFIDENCE
    }
}

impl Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// One API call of a pair, as the tokens of the smali instruction, e.g.
/// `["invoke-virtual", "Landroid/telephony/TelephonyManager;->getDeviceId()Ljava/lang/String;"]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApiDescriptor(pub Vec<String>);

impl ApiDescriptor {
    /// The first token: the opcode.
    pub fn opcode(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The last token: the method being called.
    pub fn target(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

/// The method the API calls were found in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Function {
    /// Class descriptor without the trailing `;`, e.g. `Lcom/example/Foo`.
    pub class: String,
    /// Method name immediately followed by its signature, e.g. `send(Ljava/lang/String;)V`.
    pub method: String,
}

/// One place in the app where a crime's pair of API calls occurs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiCall {
    /// `c<crime index>-f<register index>`.
    pub id: String,
    pub function: Function,
    pub apis: [ApiDescriptor; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Crime {
    /// `c<crime index>`, the index being the position in the original report.
    pub id: String,
    pub crime: String,
    pub score: f64,
    pub weight: f64,
    pub confidence: Confidence,
    pub api_calls: Vec<ApiCall>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReportHeader {
    pub md5: String,
    pub apk_filename: String,
    pub size_bytes: u64,
    pub threat_level: String,
    pub total_score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SummaryReport {
    pub header: ReportHeader,
    /// Crimes at [MAX_CONFIDENCE], in report order. Each has at least one API call.
    pub crimes: Vec<Crime>,
    /// Number of crimes left out for having a lower confidence, by their confidence as written in the report.
    pub omitted: BTreeMap<String, usize>,
    /// Number of full confidence crimes left out because no call site was recorded for them.
    pub without_calls: usize,
}

impl SummaryReport {
    pub fn crime(&self, id: &str) -> Option<&Crime> {
        self.crimes.iter().find(|crime| crime.id == id)
    }

    /// Finds an API call by its id, along with the crime it belongs to.
    pub fn api_call(&self, id: &str) -> Option<(&Crime, &ApiCall)> {
        let (crime_id, _) = id.split_once('-')?;
        let crime = self.crime(crime_id)?;
        crime
            .api_calls
            .iter()
            .find(|call| call.id == id)
            .map(|call| (crime, call))
    }
}

// Splits `Lcom/example/Foo; send (Ljava/lang/String;)V` into class and method.
fn parse_parent_function(parent: &str) -> Function {
    let mut tokens = parent.split(' ');
    let class = tokens.next().unwrap_or_default().replace(';', "");
    let method = tokens.collect::<String>();

    Function { class, method }
}

fn summarize(raw: RawReport) -> SummaryReport {
    let mut summary = SummaryReport {
        header: ReportHeader {
            md5: raw.md5,
            apk_filename: raw.apk_filename,
            size_bytes: raw.size_bytes,
            threat_level: raw.threat_level,
            total_score: raw.total_score,
        },
        ..Default::default()
    };

    for (crime_index, raw_crime) in raw.crimes.into_iter().enumerate() {
        let confidence = match Confidence::parse(&raw_crime.confidence) {
            Some(confidence) if confidence.is_max() => confidence,
            _ => {
                *summary.omitted.entry(raw_crime.confidence).or_default() += 1;
                continue;
            }
        };

        let crime_id = format!("c{crime_index}");
        let api_calls: Vec<ApiCall> = raw_crime
            .register
            .into_iter()
            .enumerate()
            .filter_map(|(register_index, entry)| {
                let (parent, pair) = entry.into_iter().next()?;
                Some(ApiCall {
                    id: format!("{crime_id}-f{register_index}"),
                    function: parse_parent_function(&parent),
                    apis: [ApiDescriptor(pair.first), ApiDescriptor(pair.second)],
                })
            })
            .collect();

        if api_calls.is_empty() {
            debug!("Crime {crime_id} ({}) has no recorded call sites", raw_crime.crime);
            summary.without_calls += 1;
            continue;
        }

        summary.crimes.push(Crime {
            id: crime_id,
            crime: raw_crime.crime,
            score: raw_crime.score,
            weight: raw_crime.weight,
            confidence,
            api_calls,
        });
    }

    summary
}

/// Transforms the JSON text of a Quark report.
pub fn parse_report(json: &str) -> Result<SummaryReport> {
    let raw: RawReport = serde_json::from_str(json).context("Quark report was invalid JSON")?;
    Ok(summarize(raw))
}

pub fn load_report(path: impl AsRef<Path>) -> Result<SummaryReport> {
    let json = std::fs::read_to_string(path).context("Reading Quark report")?;
    parse_report(&json)
}

/// Renders the report as plain text, one crime per block.
pub fn render_summary(report: &SummaryReport) -> String {
    let mut out = String::new();
    let header = &report.header;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "APK:          {}", header.apk_filename);
    let _ = writeln!(out, "MD5:          {}", header.md5);
    let _ = writeln!(out, "Size:         {} bytes", header.size_bytes);
    let _ = writeln!(out, "Threat level: {}", header.threat_level);
    let _ = writeln!(out, "Total score:  {}", header.total_score);
    let _ = writeln!(out);

    if report.crimes.is_empty() {
        let _ = writeln!(out, "No crimes detected with {} confidence", Confidence(MAX_CONFIDENCE));
    }

    for crime in &report.crimes {
        let _ = writeln!(
            out,
            "[{}] {} (score {}, weight {}, confidence {})",
            crime.id, crime.crime, crime.score, crime.weight, crime.confidence
        );
        for call in &crime.api_calls {
            let _ = writeln!(out, "    [{}] {}->{}", call.id, call.function.class, call.function.method);
            for api in &call.apis {
                let _ = writeln!(out, "        {}", api.0.join(" "));
            }
        }
    }

    if !report.omitted.is_empty() || report.without_calls > 0 {
        let _ = writeln!(out);
        for (confidence, count) in &report.omitted {
            let _ = writeln!(out, "Omitted {count} crime(s) with {confidence} confidence");
        }
        if report.without_calls > 0 {
            let _ = writeln!(out, "Omitted {} crime(s) with no call sites", report.without_calls);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "md5": "14d9f1a92dd984d6040cc41ed06e273e",
        "apk_filename": "sample.apk",
        "size_bytes": 166917,
        "threat_level": "High Risk",
        "total_score": 2.5,
        "crimes": [
            {
                "crime": "Send SMS",
                "score": 1,
                "weight": 1.0,
                "confidence": "100%",
                "permissions": ["android.permission.SEND_SMS"],
                "register": [
                    {
                        "Lcom/example/Sms; send (Ljava/lang/String;)V": {
                            "first": ["invoke-static", "Landroid/telephony/SmsManager;->getDefault()Landroid/telephony/SmsManager;"],
                            "second": ["invoke-virtual", "Landroid/telephony/SmsManager;->sendTextMessage(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;Landroid/app/PendingIntent;Landroid/app/PendingIntent;)V"]
                        }
                    },
                    {
                        "Lcom/example/Sms$1; run ()V": {
                            "first": ["invoke-static", "Landroid/telephony/SmsManager;->getDefault()Landroid/telephony/SmsManager;"],
                            "second": ["invoke-virtual", "Landroid/telephony/SmsManager;->divideMessage(Ljava/lang/String;)Ljava/util/ArrayList;"]
                        }
                    }
                ]
            },
            {
                "crime": "Read contacts",
                "score": 0.5,
                "weight": 0.25,
                "confidence": "80%",
                "register": []
            },
            {
                "crime": "Get location",
                "score": 1,
                "weight": 0.5,
                "confidence": "100%",
                "register": []
            },
            {
                "crime": "Open camera",
                "score": 1,
                "weight": 0.5,
                "confidence": "100%",
                "register": [
                    {
                        "Lcom/example/Cam; open (I)Z": {
                            "first": ["invoke-static", "Landroid/hardware/Camera;->open(I)Landroid/hardware/Camera;"],
                            "second": ["invoke-virtual", "Landroid/hardware/Camera;->startPreview()V"]
                        }
                    }
                ]
            },
            {
                "crime": "Load dex",
                "score": 0.1,
                "weight": 0.0625,
                "confidence": "20%"
            }
        ]
    }"#;

    #[test]
    fn keeps_only_full_confidence_crimes_with_calls() {
        let report = parse_report(REPORT).unwrap();

        let ids: Vec<&str> = report.crimes.iter().map(|crime| crime.id.as_str()).collect();
        assert_eq!(ids, ["c0", "c3"]);
        assert!(report.crimes.iter().all(|crime| crime.confidence.is_max() && !crime.api_calls.is_empty()));
        assert_eq!(report.omitted, BTreeMap::from([("20%".to_string(), 1), ("80%".to_string(), 1)]));
        assert_eq!(report.without_calls, 1);
    }

    #[test]
    fn splits_parent_function() {
        let report = parse_report(REPORT).unwrap();
        let (crime, call) = report.api_call("c0-f1").unwrap();

        assert_eq!(crime.crime, "Send SMS");
        assert_eq!(
            call.function,
            Function {
                class: "Lcom/example/Sms$1".to_string(),
                method: "run()V".to_string(),
            }
        );
        assert_eq!(call.apis[0].opcode(), Some("invoke-static"));
        assert_eq!(
            call.apis[1].target(),
            Some("Landroid/telephony/SmsManager;->divideMessage(Ljava/lang/String;)Ljava/util/ArrayList;")
        );
    }

    #[test]
    fn reads_header() {
        let report = parse_report(REPORT).unwrap();
        assert_eq!(report.header.apk_filename, "sample.apk");
        assert_eq!(report.header.size_bytes, 166917);
        assert_eq!(report.header.threat_level, "High Risk");
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let report = parse_report(REPORT).unwrap();
        assert!(report.api_call("c1-f0").is_none());
        assert!(report.api_call("c0-f9").is_none());
        assert!(report.api_call("c0").is_none());
    }

    #[test]
    fn parses_confidence() {
        assert_eq!(Confidence::parse("100%"), Some(Confidence(100)));
        assert_eq!(Confidence::parse(" 40 %"), Some(Confidence(40)));
        assert_eq!(Confidence::parse("120%"), None);
        assert_eq!(Confidence::parse("high"), None);
    }

    #[test]
    fn summary_lists_crimes_and_omissions() {
        let summary = render_summary(&parse_report(REPORT).unwrap());

        assert!(summary.contains("[c0] Send SMS (score 1, weight 1, confidence 100%)"));
        assert!(summary.contains("    [c3-f0] Lcom/example/Cam->open(I)Z"));
        assert!(summary.contains("Omitted 1 crime(s) with 80% confidence"));
        assert!(summary.contains("Omitted 1 crime(s) with no call sites"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_report("{\"crimes\": 3}").is_err());
    }
}
