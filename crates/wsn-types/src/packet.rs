use crate::address::Address;
use crate::error::WsnError;

/// A parsed wire packet: `"<origin>,<destination>,<payload>"`. Destination
/// `""` means broadcast. No escaping is performed — addresses must not
/// contain commas, and the payload is everything after the second comma, so
/// it alone is free to reuse `/`, `+` and `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket {
    pub origin: Address,
    pub destination: Address,
    pub payload: String,
}

impl WirePacket {
    pub fn new(origin: Address, destination: Address, payload: impl Into<String>) -> Self {
        WirePacket {
            origin,
            destination,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{},{},{}", self.origin, self.destination, self.payload)
    }

    pub fn decode(wire: &str) -> Result<Self, WsnError> {
        let mut parts = wire.splitn(3, ',');
        let origin = parts
            .next()
            .ok_or_else(|| WsnError::Topology(format!("malformed packet: {wire}")))?;
        let destination = parts
            .next()
            .ok_or_else(|| WsnError::Topology(format!("malformed packet: {wire}")))?;
        let payload = parts
            .next()
            .ok_or_else(|| WsnError::Topology(format!("malformed packet: {wire}")))?;
        Ok(WirePacket {
            origin: Address::new(origin),
            destination: Address::new(destination),
            payload: payload.to_string(),
        })
    }
}

/// Neighbour-discovery / metric-sharing payload shapes, shared across the
/// three routing protocols. Each protocol only ever produces a subset of
/// these; a payload that doesn't match any expected shape for the running
/// protocol is logged and ignored rather than treated as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `"Hello"` or `"Hello+<hopcount>"`.
    Hello { hop_count: Option<u32> },
    /// `"ETX+<float>"` or `"ETX+dummy"`.
    Etx { value: Option<f64> },
    /// `"DAP+<vector>"` or `"DAP+dummy"`, vector pipe-separated.
    Dap { vector: Option<Vec<f64>> },
    /// `"<source>/<measurement>/<timestamp>"`.
    Measurement {
        source: Address,
        measurement: String,
        timestamp: f64,
    },
}

impl Payload {
    pub fn is_hello(s: &str) -> bool {
        s.contains("Hello")
    }
    pub fn is_etx(s: &str) -> bool {
        s.contains("ETX")
    }
    pub fn is_dap(s: &str) -> bool {
        s.contains("DAP")
    }

    pub fn format_hello(hop_count: Option<u32>) -> String {
        match hop_count {
            Some(h) => format!("Hello+{h}"),
            None => "Hello".to_string(),
        }
    }

    pub fn format_etx(value: f64) -> String {
        format!("ETX+{value}")
    }

    pub fn format_etx_probe() -> String {
        "ETX+dummy".to_string()
    }

    pub fn format_dap(vector: &[f64]) -> String {
        let encoded = vector
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("|");
        format!("DAP+{encoded}")
    }

    pub fn format_dap_probe() -> String {
        "DAP+dummy".to_string()
    }

    pub fn format_measurement(source: &Address, measurement: &str, timestamp: f64) -> String {
        format!("{source}/{measurement}/{timestamp}")
    }

    /// Parses a payload string for a given protocol family. Returns `None`
    /// for a shape the caller doesn't recognize — callers log and drop it.
    pub fn parse(s: &str) -> Option<Payload> {
        if let Some(rest) = s.strip_prefix("Hello") {
            return if let Some(count) = rest.strip_prefix('+') {
                count
                    .parse::<u32>()
                    .ok()
                    .map(|h| Payload::Hello { hop_count: Some(h) })
            } else if rest.is_empty() {
                Some(Payload::Hello { hop_count: None })
            } else {
                None
            };
        }
        if let Some(rest) = s.strip_prefix("ETX+") {
            return if rest == "dummy" {
                Some(Payload::Etx { value: None })
            } else {
                rest.parse::<f64>().ok().map(|v| Payload::Etx { value: Some(v) })
            };
        }
        if let Some(rest) = s.strip_prefix("DAP+") {
            return if rest == "dummy" {
                Some(Payload::Dap { vector: None })
            } else {
                let parsed: Option<Vec<f64>> =
                    rest.split('|').map(|v| v.parse::<f64>().ok()).collect();
                parsed.map(|vector| Payload::Dap {
                    vector: Some(vector),
                })
            };
        }
        let mut parts = s.splitn(3, '/');
        let source = parts.next()?;
        let measurement = parts.next()?;
        let timestamp = parts.next()?.parse::<f64>().ok()?;
        if source.is_empty() || measurement.is_empty() {
            return None;
        }
        Some(Payload::Measurement {
            source: Address::new(source),
            measurement: measurement.to_string(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_packet() {
        let wire = "0,1,Hello+2";
        let packet = WirePacket::decode(wire).unwrap();
        assert_eq!(packet.origin.as_str(), "0");
        assert_eq!(packet.destination.as_str(), "1");
        assert_eq!(packet.payload, "Hello+2");
        assert_eq!(packet.encode(), wire);
    }

    #[test]
    fn broadcast_destination_is_empty_not_absent() {
        let packet = WirePacket::decode("0,,Hello+0").unwrap();
        assert!(packet.destination.is_broadcast());
    }

    #[test]
    fn parses_measurement_payload() {
        match Payload::parse("1/X/12.50").unwrap() {
            Payload::Measurement {
                source,
                measurement,
                timestamp,
            } => {
                assert_eq!(source.as_str(), "1");
                assert_eq!(measurement, "X");
                assert_eq!(timestamp, 12.5);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parses_dap_vector_round_trip() {
        let original = vec![0.1, 0.2, 0.7];
        let encoded = Payload::format_dap(&original);
        match Payload::parse(&encoded).unwrap() {
            Payload::Dap {
                vector: Some(vector),
            } => {
                for (a, b) in original.iter().zip(vector.iter()) {
                    assert!((a - b).abs() < 1e-12);
                }
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn dummy_probes_parse_without_value() {
        assert_eq!(Payload::parse("ETX+dummy").unwrap(), Payload::Etx { value: None });
        assert_eq!(
            Payload::parse("DAP+dummy").unwrap(),
            Payload::Dap { vector: None }
        );
    }
}
