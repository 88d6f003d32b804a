//! Wire codec for the device line protocol.
//!
//! Every frame is one line of text: a command keyword optionally followed by
//! a comma and a payload. Outbound payloads are comma-joined positional
//! fields; the `data` reply carries its snapshot as JSON.
//!
//! ```text
//! -> getData
//! <- data,{"detections":[...],"position":{...},"stats":{...}}
//! -> setCameraOffset,0.1,-0.05,0.3,meters,0,12.5
//! -> getCameraOffset
//! <- getCameraOffset,0.1,-0.05,0.3,meters,0,12.5
//! -> setColorCorrection,50,-20,0
//! ```
//!
//! [`encode`] is pure: identical commands always produce identical frames.
//! [`decode`] never substitutes defaults for bad fields; a recognized frame
//! with a bad field is [`DecodedMessage::Malformed`].

use std::fmt;

use crate::types::{ColorCorrection, LengthUnit, Offset, QueryKind, QueryResult, TelemetrySnapshot};

/// Tag of the telemetry reply.
pub const DATA_TAG: &str = "data";

/// Keyword of the telemetry poll.
pub const FETCH_KEYWORD: &str = "getData";

/// Outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Poll for the latest telemetry snapshot
    FetchTelemetry,
    /// Ask for a configuration value; the reply is correlated by kind
    Query(QueryKind),
    SetCameraOffset(Offset),
    SetGpsOffset(Offset),
    SetColorCorrection(ColorCorrection),
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::FetchTelemetry => FETCH_KEYWORD,
            Command::Query(kind) => kind.keyword(),
            Command::SetCameraOffset(_) => "setCameraOffset",
            Command::SetGpsOffset(_) => "setGpsOffset",
            Command::SetColorCorrection(_) => "setColorCorrection",
        }
    }

    /// Query kind whose reply answers this command, if any.
    pub fn expects_reply(&self) -> Option<QueryKind> {
        match self {
            Command::Query(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Encoded outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    keyword: &'static str,
    payload: String,
}

impl Frame {
    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    /// Comma-joined fields after the keyword; empty for bare commands.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The full line as written to the transport, without terminator.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            f.write_str(self.keyword)
        } else {
            write!(f, "{},{}", self.keyword, self.payload)
        }
    }
}

/// Encode a command into its wire frame.
pub fn encode(command: &Command) -> Frame {
    let payload = match command {
        Command::FetchTelemetry | Command::Query(_) => String::new(),
        Command::SetCameraOffset(offset) => {
            let mut fields = offset_fields(offset);
            if let Some(elevation) = offset.elevation_offset {
                fields.push(elevation.to_string());
            }
            fields.join(",")
        }
        Command::SetGpsOffset(offset) => offset_fields(offset).join(","),
        Command::SetColorCorrection(cc) => format!("{},{},{}", cc.h(), cc.s(), cc.v()),
    };

    Frame { keyword: command.keyword(), payload }
}

fn offset_fields(offset: &Offset) -> Vec<String> {
    vec![
        offset.x.to_string(),
        offset.y.to_string(),
        offset.z.to_string(),
        offset.unit.to_string(),
        offset.heading_offset.to_string(),
    ]
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Telemetry(TelemetrySnapshot),
    QueryResult(QueryResult),
    /// Tag this codec does not know; the caller decides whether to log it
    Unrecognized(String),
    /// Known tag with an unusable payload
    Malformed { tag: String, reason: String },
}

/// Decode one inbound line.
pub fn decode(line: &str) -> DecodedMessage {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, payload) = match line.split_once(',') {
        Some((tag, payload)) => (tag.trim(), payload),
        None => (line.trim(), ""),
    };

    let decoded = if tag == DATA_TAG {
        decode_snapshot(payload).map(DecodedMessage::Telemetry)
    } else if let Some(kind) = QueryKind::from_keyword(tag) {
        decode_query(kind, payload).map(DecodedMessage::QueryResult)
    } else {
        return DecodedMessage::Unrecognized(tag.to_string());
    };

    decoded.unwrap_or_else(|reason| DecodedMessage::Malformed { tag: tag.to_string(), reason })
}

fn decode_snapshot(payload: &str) -> Result<TelemetrySnapshot, String> {
    if payload.trim().is_empty() {
        return Err("empty telemetry payload".to_string());
    }
    let snapshot: TelemetrySnapshot =
        serde_json::from_str(payload).map_err(|e| format!("invalid telemetry json: {e}"))?;
    snapshot.validate().map_err(|e| e.to_string())?;
    Ok(snapshot)
}

fn decode_query(kind: QueryKind, payload: &str) -> Result<QueryResult, String> {
    let fields: Vec<&str> = payload.split(',').map(str::trim).collect();

    match kind {
        QueryKind::CameraOffset => {
            expect_arity(&fields, 6)?;
            let mut offset = decode_offset(&fields[..5])?;
            offset.elevation_offset = Some(parse_number("elevationOffset", fields[5])?);
            Ok(QueryResult::CameraOffset(offset))
        }
        QueryKind::GpsOffset => {
            expect_arity(&fields, 5)?;
            Ok(QueryResult::GpsOffset(decode_offset(&fields)?))
        }
        QueryKind::ColorCorrection => {
            expect_arity(&fields, 3)?;
            let h = parse_channel("h", fields[0])?;
            let s = parse_channel("s", fields[1])?;
            let v = parse_channel("v", fields[2])?;
            ColorCorrection::new(h, s, v)
                .map(QueryResult::ColorCorrection)
                .map_err(|e| e.to_string())
        }
    }
}

fn expect_arity(fields: &[&str], expected: usize) -> Result<(), String> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} fields, found {}", fields.len()))
    }
}

fn decode_offset(fields: &[&str]) -> Result<Offset, String> {
    let unit: LengthUnit = fields[3].parse().map_err(|e: crate::LinkError| e.to_string())?;
    Ok(Offset {
        x: parse_number("x", fields[0])?,
        y: parse_number("y", fields[1])?,
        z: parse_number("z", fields[2])?,
        unit,
        heading_offset: parse_number("headingOffset", fields[4])?,
        elevation_offset: None,
    })
}

fn parse_number(name: &str, raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(format!("{name} is not finite: {value}")),
        Err(e) => Err(format!("{name} is not a number ('{raw}'): {e}")),
    }
}

fn parse_channel(name: &str, raw: &str) -> Result<i16, String> {
    raw.parse::<i16>().map_err(|e| format!("{name} is not an integer ('{raw}'): {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Depth, DetectionClass};

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn reply_line(kind: QueryKind, frame: &Frame) -> String {
            format!("{},{}", kind.keyword(), frame.payload())
        }

        proptest! {
          #[test]
          fn camera_offset_survives_set_then_reply(
            x in -10.0f64..10.0, y in -10.0f64..10.0, z in -10.0f64..10.0,
            heading in -360.0f64..360.0, elevation in -90.0f64..90.0
          ) {
            let offset = Offset::camera(x, y, z, heading, elevation);
            let frame = encode(&Command::SetCameraOffset(offset));

            let decoded = decode(&reply_line(QueryKind::CameraOffset, &frame));
            prop_assert_eq!(decoded, DecodedMessage::QueryResult(QueryResult::CameraOffset(offset)));
          }

          #[test]
          fn gps_offset_survives_set_then_reply(
            x in -10.0f64..10.0, y in -10.0f64..10.0, z in -10.0f64..10.0,
            heading in -360.0f64..360.0
          ) {
            let offset = Offset::gps(x, y, z, heading);
            let frame = encode(&Command::SetGpsOffset(offset));

            let decoded = decode(&reply_line(QueryKind::GpsOffset, &frame));
            prop_assert_eq!(decoded, DecodedMessage::QueryResult(QueryResult::GpsOffset(offset)));
          }
        }
    }

    #[test]
    fn color_correction_payload_is_exact() {
        let cc = ColorCorrection::new(50, -20, 0).unwrap();
        let frame = encode(&Command::SetColorCorrection(cc));

        assert_eq!(frame.payload(), "50,-20,0");
        assert_eq!(frame.to_line(), "setColorCorrection,50,-20,0");
    }

    #[test]
    fn color_reset_is_zero_triplet() {
        let frame = encode(&Command::SetColorCorrection(ColorCorrection::NEUTRAL));
        assert_eq!(frame.payload(), "0,0,0");
    }

    #[test]
    fn offset_commands_use_fixed_field_order() {
        let camera = encode(&Command::SetCameraOffset(Offset::camera(0.1, -0.05, 0.3, 0.0, 12.5)));
        assert_eq!(camera.to_line(), "setCameraOffset,0.1,-0.05,0.3,meters,0,12.5");

        let gps = encode(&Command::SetGpsOffset(Offset::camera(1.0, 2.0, 3.0, 90.0, 45.0)));
        assert_eq!(gps.to_line(), "setGpsOffset,1,2,3,meters,90");
    }

    #[test]
    fn bare_commands_have_no_payload() {
        assert_eq!(encode(&Command::FetchTelemetry).to_line(), "getData");
        assert_eq!(encode(&Command::Query(QueryKind::GpsOffset)).to_line(), "getGpsOffset");
        assert_eq!(Command::Query(QueryKind::GpsOffset).expects_reply(), Some(QueryKind::GpsOffset));
        assert_eq!(Command::FetchTelemetry.expects_reply(), None);
    }

    #[test]
    fn encode_is_deterministic() {
        let command = Command::SetCameraOffset(Offset::camera(0.25, 0.5, 0.75, 1.0, 2.0));
        assert_eq!(encode(&command), encode(&command));
    }

    #[test]
    fn decodes_telemetry_with_unlocalized_detection() {
        let line = r#"data,{"detections":[{"class":0,"prob":0.91,"depth":-1,"screenLocation":{"x":10,"y":20,"width":30,"height":40},"mapLocation":{"x":[0.5],"y":[1.5]}}],"position":{"x":0.1,"y":0.2,"z":0.0,"azimuth":90,"elevation":0,"rotation":0},"stats":{"fps":29.5,"invokeTime":0.01,"runTime":12.0,"cpuTemp":48.5,"videoWidth":640,"videoHeight":480,"gpsConnected":true}}"#;

        let DecodedMessage::Telemetry(snapshot) = decode(line) else {
            panic!("expected telemetry");
        };

        let detection = &snapshot.detections[0];
        assert_eq!(detection.class, DetectionClass::MobileGoal);
        assert_eq!(detection.depth, Depth::NotLocalized);
        assert!(!detection.is_renderable());
        assert_eq!(snapshot.renderable_detections().count(), 0);
        assert_eq!(snapshot.gps_fix().map(|p| p.azimuth), Some(90.0));
    }

    #[test]
    fn unknown_tag_is_unrecognized_not_an_error() {
        assert_eq!(decode("hello,1,2"), DecodedMessage::Unrecognized("hello".to_string()));
        assert_eq!(decode(""), DecodedMessage::Unrecognized(String::new()));
    }

    #[test]
    fn bad_numeric_fields_are_malformed() {
        for line in [
            "getGpsOffset,1,,3,meters,0",
            "getGpsOffset,1,abc,3,meters,0",
            "getGpsOffset,1,2,3,meters",
            "getGpsOffset,1,2,3,feet,0",
            "getCameraOffset,1,2,3,meters,0,NaN",
            "getColorCorrection,1.5,0,0",
            "getColorCorrection,0,0,101",
        ] {
            assert!(
                matches!(decode(line), DecodedMessage::Malformed { .. }),
                "expected malformed for {line}"
            );
        }
    }

    #[test]
    fn bad_telemetry_payloads_are_malformed() {
        for line in [
            "data",
            "data,{not json",
            r#"data,{"detections":[{"class":9,"depth":1,"mapLocation":{"x":[],"y":[]}}],"position":{"x":0,"y":0,"z":0,"azimuth":0,"elevation":0,"rotation":0}}"#,
            r#"data,{"detections":[{"class":1,"depth":-3,"mapLocation":{"x":[],"y":[]}}],"position":{"x":0,"y":0,"z":0,"azimuth":0,"elevation":0,"rotation":0}}"#,
            r#"data,{"detections":[{"class":1,"depth":1,"mapLocation":{"x":[1,2],"y":[1]}}],"position":{"x":0,"y":0,"z":0,"azimuth":0,"elevation":0,"rotation":0}}"#,
            r#"data,{"detections":[]}"#,
        ] {
            match decode(line) {
                DecodedMessage::Malformed { tag, .. } => assert_eq!(tag, DATA_TAG),
                other => panic!("expected malformed for {line}, got {other:?}"),
            }
        }
    }

    #[test]
    fn tolerates_carriage_return_terminator() {
        let decoded = decode("getColorCorrection,5,-5,0\r\n");
        assert_eq!(
            decoded,
            DecodedMessage::QueryResult(QueryResult::ColorCorrection(
                ColorCorrection::new(5, -5, 0).unwrap()
            ))
        );
    }
}
