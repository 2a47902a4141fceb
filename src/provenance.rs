//! Provenance records for table collections.
//!
//! A provenance row pairs an RFC-3339 timestamp with a JSON document
//! recording what produced the tables.  Records are only appended when the
//! caller asks for them: a wall-clock timestamp would otherwise break
//! seed-determinism of the output tables.
//!
//! * [`crate::TableCollection::add_provenance`]
//! * [`ProvenanceRecord`], a builder for the JSON document.

use serde::Serialize;

/// The current wall-clock time, RFC-3339 formatted.
pub fn timestamp_now() -> String {
    humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string()
}

#[derive(Clone, Debug, Serialize)]
struct Software {
    name: &'static str,
    version: &'static str,
}

#[derive(Clone, Debug, Serialize)]
struct Environment {
    os: &'static str,
    arch: &'static str,
}

/// A provenance document in the conventional
/// `{software, parameters, environment}` shape.
#[derive(Clone, Debug, Serialize)]
pub struct ProvenanceRecord {
    schema_version: &'static str,
    software: Software,
    parameters: serde_json::Value,
    environment: Environment,
}

impl ProvenanceRecord {
    /// Build a record around arbitrary JSON `parameters`.
    pub fn new(parameters: serde_json::Value) -> Self {
        Self {
            schema_version: "1.0.0",
            software: Software {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            },
            parameters,
            environment: Environment {
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
            },
        }
    }

    /// Serialise to the JSON string stored in the provenance table.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("provenance record serialises")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shape() {
        let rec = ProvenanceRecord::new(serde_json::json!({"seed": 42}));
        let s = rec.to_json();
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["software"]["name"], "coalsim");
        assert_eq!(v["parameters"]["seed"], 42);
        assert!(v["environment"]["os"].is_string());
    }

    #[test]
    fn test_add_provenance() {
        let mut tables = crate::TableCollection::new(1.0).unwrap();
        let rec = ProvenanceRecord::new(serde_json::json!({"seed": 1}));
        let id = tables.add_provenance(&rec.to_json()).unwrap();
        assert_eq!(id, crate::ProvenanceId::from(0));
        let row = tables.provenances().row(id).unwrap();
        assert!(row.record.contains("\"seed\":1"));
        assert!(!row.timestamp.is_empty());
        assert!(tables.add_provenance("").is_err());
    }
}
