//! Cloud collaborators backed by the `aws` command line tool.
//!
//! Every call shells out to `aws ... --region <r> --output json` and parses
//! the JSON it prints. Credentials come from the usual AWS environment and
//! profile files.

use chrono::{DateTime, TimeZone, Utc};
use sari_core::collab::{
    CatalogClient, DiscoveredDatabase, Endpoint, ParameterStore, PropertyStore,
    SecurityGroupRef, StoredValue, SubnetRef,
};
use sari_core::{Result, SariError};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: PathBuf,
    region: String,
}

impl AwsCli {
    /// Locate `aws` on the PATH.
    pub fn new(region: impl Into<String>) -> Result<Self> {
        let binary = which::which("aws")
            .map_err(|_| SariError::Collaborator("aws CLI not found on PATH".to_string()))?;
        Ok(Self::with_binary(binary, region))
    }

    pub fn with_binary(binary: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Value> {
        tracing::debug!(region = %self.region, "aws {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .args(["--region", &self.region, "--output", "json"])
            .output()
            .map_err(|e| SariError::Collaborator(format!("failed to run aws: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SariError::Collaborator(stderr.trim().to_string()));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| {
            SariError::Collaborator(format!("unexpected output from aws {}: {e}", args[0]))
        })
    }
}

impl CatalogClient for AwsCli {
    fn region(&self) -> &str {
        &self.region
    }

    fn account_id(&self) -> Result<String> {
        let identity = self.run(&["sts", "get-caller-identity"])?;
        identity["Account"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SariError::Collaborator("caller identity has no Account".to_string()))
    }

    fn list_databases(&self, engine: &str) -> Result<Vec<DiscoveredDatabase>> {
        let listing = self.run(&["rds", "describe-db-instances"])?;
        let instances = listing["DBInstances"].as_array().cloned().unwrap_or_default();
        Ok(instances
            .iter()
            .filter(|db| db["Engine"].as_str() == Some(engine))
            .filter_map(parse_instance)
            .collect())
    }
}

impl ParameterStore for AwsCli {
    fn get_secret(&self, name: &str) -> Result<StoredValue> {
        let response = self.run(&["ssm", "get-parameter", "--name", name, "--with-decryption"])?;
        let parameter = &response["Parameter"];
        let value = parameter["Value"]
            .as_str()
            .ok_or_else(|| SariError::Collaborator(format!("parameter {name} has no value")))?;
        Ok(StoredValue {
            value: value.to_string(),
            last_modified: parse_timestamp(&parameter["LastModifiedDate"]),
        })
    }
}

impl PropertyStore for AwsCli {
    fn get_property(&self, container: &str, key: &str, property: &str) -> Result<StoredValue> {
        let body = tempfile::NamedTempFile::new()?;
        let outfile = body.path().to_string_lossy().to_string();
        let response = self.run(&[
            "s3api",
            "get-object",
            "--bucket",
            container,
            "--key",
            key,
            &outfile,
        ])?;
        let content = std::fs::read_to_string(body.path())?;
        let value = parse_properties(&content, property).ok_or_else(|| {
            SariError::Collaborator(format!("no property '{property}' in s3://{container}/{key}"))
        })?;
        Ok(StoredValue {
            value,
            last_modified: parse_timestamp(&response["LastModified"]),
        })
    }
}

/// One `DBInstances` entry. Entries without an identifier are skipped.
fn parse_instance(db: &Value) -> Option<DiscoveredDatabase> {
    let text = |v: &Value| v.as_str().map(str::to_string);
    let id = text(&db["DBInstanceIdentifier"])?;

    let endpoint = match (&db["Endpoint"]["Address"], db["Endpoint"]["Port"].as_u64()) {
        (Value::String(address), Some(port)) => u16::try_from(port).ok().map(|port| Endpoint {
            address: address.clone(),
            port,
        }),
        _ => None,
    };

    let security_groups = db["VpcSecurityGroups"]
        .as_array()
        .map(|groups| {
            groups
                .iter()
                .filter_map(|g| {
                    Some(SecurityGroupRef {
                        id: text(&g["VpcSecurityGroupId"])?,
                        active: g["Status"].as_str() == Some("active"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let subnets = db["DBSubnetGroup"]["Subnets"]
        .as_array()
        .map(|subnets| {
            subnets
                .iter()
                .filter_map(|s| {
                    Some(SubnetRef {
                        id: text(&s["SubnetIdentifier"])?,
                        availability_zone: text(&s["SubnetAvailabilityZone"]["Name"])
                            .unwrap_or_default(),
                        active: s["SubnetStatus"].as_str() == Some("Active"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(DiscoveredDatabase {
        id,
        db_name: text(&db["DBName"]),
        master_username: text(&db["MasterUsername"]),
        endpoint,
        resource_id: text(&db["DbiResourceId"]),
        availability_zone: text(&db["AvailabilityZone"]),
        security_groups,
        subnets,
    })
}

/// The CLI prints ISO 8601 (v2), RFC 2822 (older s3api) or epoch seconds (v1).
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_rfc2822(s))
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            let secs = n.as_f64()?;
            Utc.timestamp_opt(secs.trunc() as i64, 0).single()
        }
        _ => None,
    }
}

/// Value of `name` in a `key = value` properties document.
fn parse_properties(content: &str, name: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            return None;
        }
        let (key, value) = line.split_once('=')?;
        if key.trim() != name {
            return None;
        }
        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        Some(unquoted.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instance_metadata_is_parsed() {
        let db = json!({
            "DBInstanceIdentifier": "borders",
            "Engine": "mysql",
            "DBName": "borders",
            "MasterUsername": "root",
            "Endpoint": {"Address": "borders.cfxxae8cilce.eu-west-2.rds.amazonaws.com", "Port": 3306},
            "DbiResourceId": "db-ABCDEFGHIJ",
            "AvailabilityZone": "eu-west-2a",
            "VpcSecurityGroups": [
                {"VpcSecurityGroupId": "sg-0a1b2c", "Status": "active"},
                {"VpcSecurityGroupId": "sg-old", "Status": "inactive"}
            ],
            "DBSubnetGroup": {"Subnets": [
                {"SubnetIdentifier": "subnet-123", "SubnetAvailabilityZone": {"Name": "eu-west-2a"}, "SubnetStatus": "Active"}
            ]}
        });
        let parsed = parse_instance(&db).unwrap();
        assert_eq!(parsed.id, "borders");
        assert_eq!(
            parsed.endpoint.unwrap().to_string(),
            "borders.cfxxae8cilce.eu-west-2.rds.amazonaws.com:3306"
        );
        assert_eq!(parsed.resource_id.as_deref(), Some("db-ABCDEFGHIJ"));
        assert_eq!(parsed.security_groups.len(), 2);
        assert!(!parsed.security_groups[1].active);
        assert_eq!(parsed.subnets[0].availability_zone, "eu-west-2a");
        assert!(parsed.subnets[0].active);
    }

    #[test]
    fn creating_instance_has_no_endpoint() {
        let parsed = parse_instance(&json!({"DBInstanceIdentifier": "new", "Engine": "mysql"})).unwrap();
        assert!(parsed.endpoint.is_none());
        assert!(parsed.security_groups.is_empty());
    }

    #[test]
    fn timestamps_in_every_cli_format() {
        let expected = Utc.with_ymd_and_hms(2020, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp(&json!("2020-05-01T10:00:00+01:00")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("Fri, 01 May 2020 09:00:00 GMT")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!(1588323600.25)), Some(expected));
        assert_eq!(parse_timestamp(&Value::Null), None);
    }

    #[test]
    fn properties_lookup() {
        let content = "# credentials\ndb.user = root\ndb.password = \"vigilant swirles\"\n";
        assert_eq!(
            parse_properties(content, "db.password").as_deref(),
            Some("vigilant swirles")
        );
        assert_eq!(parse_properties(content, "db.user").as_deref(), Some("root"));
        assert_eq!(parse_properties(content, "db.host"), None);
    }

    #[cfg(unix)]
    fn fake_aws(script: &str) -> (tempfile::TempDir, AwsCli) {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aws");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        let cli = AwsCli::with_binary(path, "eu-west-2");
        (dir, cli)
    }

    #[cfg(unix)]
    #[test]
    fn account_id_from_caller_identity() {
        let (_dir, cli) = fake_aws(r#"echo '{"UserId": "AIDA", "Account": "123456789012"}'"#);
        assert_eq!(cli.account_id().unwrap(), "123456789012");
    }

    #[cfg(unix)]
    #[test]
    fn engine_filter_applies() {
        let (_dir, cli) = fake_aws(
            r#"echo '{"DBInstances": [{"DBInstanceIdentifier": "borders", "Engine": "mysql"}, {"DBInstanceIdentifier": "pg", "Engine": "postgres"}]}'"#,
        );
        let ids: Vec<String> = cli
            .list_databases("mysql")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["borders"]);
    }

    #[cfg(unix)]
    #[test]
    fn cli_failure_carries_stderr() {
        let (_dir, cli) = fake_aws(
            "echo 'An error occurred (ParameterNotFound) when calling the GetParameter operation' >&2\nexit 254",
        );
        let err = cli.get_secret("borders.master_password").unwrap_err();
        assert_eq!(
            err.to_string(),
            "An error occurred (ParameterNotFound) when calling the GetParameter operation"
        );
    }
}
