//! Argument-shape validators shared by the CLI and the event entry points.
//!
//! They look only at their input, so a rejected request never touches the
//! registry or the inventory.

use std::net::IpAddr;

use serde_json::{Map, Value};

use crate::error::{ClustermError, Result};

fn unexpected_arg_count(expected: &str, got: usize) -> ClustermError {
    ClustermError::UnexpectedArgCount {
        expected: expected.to_string(),
        got,
    }
}

pub fn validate_one_arg(args: &[String]) -> Result<()> {
    if args.len() != 1 {
        return Err(unexpected_arg_count("1", args.len()));
    }
    Ok(())
}

pub fn validate_multi_node_names(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(unexpected_arg_count(">=1", args.len()));
    }
    Ok(())
}

/// At least one address, every one an IP literal. Fails on the first bad entry.
pub fn validate_multi_node_addrs(args: &[String]) -> Result<Vec<IpAddr>> {
    if args.is_empty() {
        return Err(unexpected_arg_count(">=1", args.len()));
    }
    args.iter()
        .map(|addr| {
            addr.parse::<IpAddr>()
                .map_err(|_| ClustermError::InvalidIpAddr(addr.clone()))
        })
        .collect()
}

pub fn validate_zero_args(args: &[String]) -> Result<()> {
    if !args.is_empty() {
        return Err(unexpected_arg_count("0", args.len()));
    }
    Ok(())
}

fn parse_extra_vars(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ClustermError::InvalidExtraVars(format!(
            "got {other}"
        ))),
        Err(e) => Err(ClustermError::InvalidExtraVars(e.to_string())),
    }
}

/// Check extra vars are empty or a JSON object.
pub fn validate_extra_vars(raw: &str) -> Result<()> {
    parse_extra_vars(raw).map(|_| ())
}

/// Merge event extra vars over the global ones. Event keys win.
pub fn merge_extra_vars(globals: &str, extra_vars: &str) -> Result<String> {
    let mut merged = parse_extra_vars(globals)?;
    merged.extend(parse_extra_vars(extra_vars)?);
    Ok(Value::Object(merged).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_arg() {
        assert!(validate_one_arg(&args(&["n1"])).is_ok());
        for bad in [args(&[]), args(&["n1", "n2"])] {
            let err = validate_one_arg(&bad).unwrap_err();
            assert!(matches!(
                err,
                ClustermError::UnexpectedArgCount { ref expected, got } if expected == "1" && got == bad.len()
            ));
        }
    }

    #[test]
    fn multi_node_names() {
        assert!(validate_multi_node_names(&args(&["n1"])).is_ok());
        assert!(validate_multi_node_names(&args(&["n1", "n2", "n3"])).is_ok());
        let err = validate_multi_node_names(&[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected number of arguments, expected: >=1 got: 0"
        );
    }

    #[test]
    fn multi_node_addrs_accepts_ip_literals() {
        let addrs = validate_multi_node_addrs(&args(&["10.0.0.1", "fe80::1"])).unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].to_string(), "10.0.0.1");
    }

    #[test]
    fn multi_node_addrs_names_first_bad_entry() {
        let err =
            validate_multi_node_addrs(&args(&["10.0.0.1", "host-a", "10.0.0.300"])).unwrap_err();
        assert!(matches!(err, ClustermError::InvalidIpAddr(a) if a == "host-a"));

        assert!(matches!(
            validate_multi_node_addrs(&[]),
            Err(ClustermError::UnexpectedArgCount { got: 0, .. })
        ));
    }

    #[test]
    fn zero_args() {
        assert!(validate_zero_args(&[]).is_ok());
        assert!(matches!(
            validate_zero_args(&args(&["x"])),
            Err(ClustermError::UnexpectedArgCount { ref expected, got: 1 }) if expected == "0"
        ));
    }

    #[test]
    fn merge_extra_vars_event_wins() {
        let merged = merge_extra_vars(
            r#"{"env": "prod", "ntp": "pool.ntp.org"}"#,
            r#"{"env": "staging"}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["env"], "staging");
        assert_eq!(value["ntp"], "pool.ntp.org");
    }

    #[test]
    fn merge_extra_vars_accepts_empty_inputs() {
        assert_eq!(merge_extra_vars("", "  ").unwrap(), "{}");
        assert_eq!(merge_extra_vars("{}", r#"{"a":1}"#).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn extra_vars_must_be_an_object() {
        assert!(validate_extra_vars("[1, 2]").is_err());
        assert!(validate_extra_vars("not json").is_err());
        assert!(matches!(
            merge_extra_vars("{}", "42"),
            Err(ClustermError::InvalidExtraVars(_))
        ));
        assert!(validate_extra_vars(r#"{"k": "v"}"#).is_ok());
    }
}
