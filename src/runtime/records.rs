//! Typed records for runtime inventory queries
//!
//! Listing commands are always invoked with `--format '{{json .}}'`, which
//! emits one JSON object per line. Each record type below deserializes one
//! such line; matching and filtering happen on the typed fields, never on
//! rendered table text.

use crate::runtime::error::RuntimeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One line of `ps -a --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: String,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerRecord {
    /// Whether the record names this container. The `Names` field may carry
    /// several comma-separated names when a container is linked.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.split(',').any(|n| n.trim() == name)
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running") || self.status.starts_with("Up")
    }
}

/// One line of `images --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Repository", default)]
    pub repository: String,
    #[serde(rename = "Tag", default)]
    pub tag: String,
}

impl ImageRecord {
    /// `repository:tag` when both are known, otherwise the image id.
    /// Untagged layers report `<none>` and can only be addressed by id.
    pub fn reference(&self) -> String {
        if self.repository.is_empty() || self.repository == "<none>" {
            self.id.clone()
        } else if self.tag.is_empty() || self.tag == "<none>" {
            self.repository.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }
}

/// One line of `volume ls --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRecord {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Driver", default)]
    pub driver: String,
}

/// One line of `network ls --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Driver", default)]
    pub driver: String,
}

impl NetworkRecord {
    /// The runtime's built-in networks cannot be removed.
    pub fn is_builtin(&self) -> bool {
        matches!(self.name.as_str(), "bridge" | "host" | "none")
    }
}

/// One line of `stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsRecord {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "CPUPerc", default)]
    pub cpu_percent: String,
    #[serde(rename = "MemUsage", default)]
    pub memory_usage: String,
    #[serde(rename = "MemPerc", default)]
    pub memory_percent: String,
    #[serde(rename = "PIDs", default)]
    pub pids: String,
}

/// Parses line-oriented JSON output into typed records, skipping blank lines.
pub fn parse_record_lines<T>(raw: &str, what: &str) -> Result<Vec<T>, RuntimeError>
where
    T: DeserializeOwned,
{
    let mut records = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| RuntimeError::Parse {
            what: format!("{} record", what),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_LINE: &str = r#"{"Command":"\"docker-entrypoint.s…\"","CreatedAt":"2025-06-01 10:00:00 +0000 UTC","ID":"abc123def456","Image":"pgvector-local:latest","Labels":"","LocalVolumes":"1","Mounts":"pgvector_data","Names":"pgvector","Networks":"bridge","Ports":"0.0.0.0:5432->5432/tcp","RunningFor":"2 minutes ago","Size":"0B","State":"running","Status":"Up 2 minutes"}"#;

    const IMAGE_LINE: &str = r#"{"Containers":"N/A","CreatedAt":"2025-06-01 09:58:00 +0000 UTC","CreatedSince":"2 minutes ago","Digest":"<none>","ID":"11aa22bb33cc","Repository":"pgvector-local","SharedSize":"N/A","Size":"435MB","Tag":"latest","UniqueSize":"N/A","VirtualSize":"435.1MB"}"#;

    const VOLUME_LINE: &str = r#"{"Availability":"N/A","Driver":"local","Group":"N/A","Labels":"","Links":"N/A","Mountpoint":"/var/lib/docker/volumes/pgvector_data/_data","Name":"pgvector_data","Scope":"local","Size":"N/A","Status":"N/A"}"#;

    const STATS_LINE: &str = r#"{"BlockIO":"0B / 8.19kB","CPUPerc":"0.03%","Container":"abc123","ID":"abc123","MemPerc":"1.12%","MemUsage":"23.4MiB / 2GiB","Name":"pgvector","NetIO":"1.3kB / 126B","PIDs":"6"}"#;

    #[test]
    fn test_parse_container_record() {
        let records: Vec<ContainerRecord> = parse_record_lines(PS_LINE, "container").unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.names, "pgvector");
        assert_eq!(record.image, "pgvector-local:latest");
        assert!(record.is_running());
        assert!(record.has_name("pgvector"));
        assert!(!record.has_name("pgvector-old"));
    }

    #[test]
    fn test_exited_container_is_not_running() {
        let line = r#"{"ID":"dd","Names":"ollama","Image":"ollama-local:latest","State":"exited","Status":"Exited (1) 5 seconds ago"}"#;
        let records: Vec<ContainerRecord> = parse_record_lines(line, "container").unwrap();
        assert!(!records[0].is_running());
    }

    #[test]
    fn test_comma_separated_names() {
        let line = r#"{"ID":"ee","Names":"primary,alias","State":"running","Status":"Up"}"#;
        let records: Vec<ContainerRecord> = parse_record_lines(line, "container").unwrap();
        assert!(records[0].has_name("primary"));
        assert!(records[0].has_name("alias"));
        assert!(!records[0].has_name("prim"));
    }

    #[test]
    fn test_image_reference() {
        let records: Vec<ImageRecord> = parse_record_lines(IMAGE_LINE, "image").unwrap();
        assert_eq!(records[0].reference(), "pgvector-local:latest");

        let dangling = ImageRecord {
            id: "deadbeef".to_string(),
            repository: "<none>".to_string(),
            tag: "<none>".to_string(),
        };
        assert_eq!(dangling.reference(), "deadbeef");
    }

    #[test]
    fn test_parse_volume_record() {
        let records: Vec<VolumeRecord> = parse_record_lines(VOLUME_LINE, "volume").unwrap();
        assert_eq!(records[0].name, "pgvector_data");
        assert_eq!(records[0].driver, "local");
    }

    #[test]
    fn test_parse_stats_record() {
        let records: Vec<StatsRecord> = parse_record_lines(STATS_LINE, "stats").unwrap();
        assert_eq!(records[0].name, "pgvector");
        assert_eq!(records[0].cpu_percent, "0.03%");
        assert_eq!(records[0].memory_usage, "23.4MiB / 2GiB");
    }

    #[test]
    fn test_builtin_networks() {
        for name in ["bridge", "host", "none"] {
            let record = NetworkRecord {
                id: "x".to_string(),
                name: name.to_string(),
                driver: "bridge".to_string(),
            };
            assert!(record.is_builtin());
        }
        let custom = NetworkRecord {
            id: "y".to_string(),
            name: "pgvector_net".to_string(),
            driver: "bridge".to_string(),
        };
        assert!(!custom.is_builtin());
    }

    #[test]
    fn test_parse_skips_blank_lines_and_rejects_garbage() {
        let ok: Vec<VolumeRecord> =
            parse_record_lines(&format!("\n{}\n\n", VOLUME_LINE), "volume").unwrap();
        assert_eq!(ok.len(), 1);

        let err = parse_record_lines::<VolumeRecord>("not-json", "volume");
        assert!(matches!(err, Err(RuntimeError::Parse { .. })));
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let records: Vec<ContainerRecord> =
            parse_record_lines(r#"{"Names":"bare"}"#, "container").unwrap();
        assert_eq!(records[0].names, "bare");
        assert_eq!(records[0].id, "");
        assert!(!records[0].is_running());
    }
}
